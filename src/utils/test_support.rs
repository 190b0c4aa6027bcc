/// Returns true (and says why) when the sandbox forbids binding a loopback port for mock servers.
pub fn should_skip_httpmock() -> bool {
    match std::net::TcpListener::bind(("127.0.0.1", 0)) {
        Ok(_) => false,
        Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
            eprintln!("skipping mock-server test: binding 127.0.0.1 is not permitted");
            true
        }
        Err(err) => panic!("failed to bind 127.0.0.1 for mock-server tests: {err}"),
    }
}
