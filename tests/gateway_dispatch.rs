use futures_util::TryStreamExt;
use httpmock::Method::POST;
use httpmock::MockServer;
use llm_meter::{ChatCompletionRequest, Dispatched, Dispatcher, GatewayConfig, MeterError};
use serde_json::{Value, json};

fn config_for(upstream: &MockServer) -> GatewayConfig {
    let raw = format!(
        r#"
        [endpoints.fireworks]
        base_url = "{base}"

        [endpoints.local]
        base_url = "{base}/"

        [pricing.standard.fireworks]
        "accounts/fireworks/models/deepseek-v3" = 0.9

        [pricing.standard.local]
        "search-model" = {{ input = 1, output = 1, searches = 5 }}
        "#,
        base = upstream.url("/inference/v1"),
    );
    GatewayConfig::from_toml_str(&raw).expect("config")
}

#[tokio::test]
async fn flat_rate_backend_response_is_metered() -> llm_meter::Result<()> {
    if llm_meter::utils::test_support::should_skip_httpmock() {
        return Ok(());
    }

    let upstream = MockServer::start_async().await;
    let mock = upstream
        .mock_async(|when, then| {
            when.method(POST)
                .path("/inference/v1/chat/completions")
                .header("authorization", "Bearer fw-key");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"id":"x","usage":{"prompt_tokens":1000,"completion_tokens":1000}}"#);
        })
        .await;

    let dispatcher = Dispatcher::from_config(&config_for(&upstream))?;
    let request = ChatCompletionRequest::new("accounts/fireworks/models/deepseek-v3")
        .with_field("messages", json!([{"role": "user", "content": "hi"}]));
    let Dispatched::Completed(response) = dispatcher.dispatch("fw-key", "fireworks", &request).await?
    else {
        panic!("expected a completed response");
    };

    let cost = response["cost"].as_f64().expect("cost");
    assert!((cost - 0.0018).abs() < 1e-12);
    assert_eq!(response["id"], json!("x"));
    mock.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn each_request_uses_its_own_credential() -> llm_meter::Result<()> {
    if llm_meter::utils::test_support::should_skip_httpmock() {
        return Ok(());
    }

    let upstream = MockServer::start_async().await;
    let alice = upstream
        .mock_async(|when, then| {
            when.method(POST)
                .path("/inference/v1/chat/completions")
                .header("authorization", "Bearer alice");
            then.status(200).body(r#"{"owner":"alice"}"#);
        })
        .await;
    let bob = upstream
        .mock_async(|when, then| {
            when.method(POST)
                .path("/inference/v1/chat/completions")
                .header("authorization", "Bearer bob");
            then.status(200).body(r#"{"owner":"bob"}"#);
        })
        .await;

    let dispatcher = Dispatcher::from_config(&config_for(&upstream))?;
    let request = ChatCompletionRequest::new("unpriced-model");
    let (first, second) = tokio::join!(
        dispatcher.dispatch("alice", "local", &request),
        dispatcher.dispatch("bob", "local", &request),
    );

    for (outcome, owner) in [(first?, "alice"), (second?, "bob")] {
        let Dispatched::Completed(response) = outcome else {
            panic!("expected a completed response");
        };
        assert_eq!(response["owner"], json!(owner));
        assert_eq!(response["cost"], json!(0.0));
    }
    alice.assert_async().await;
    bob.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn streamed_chunks_carry_their_own_cost() -> llm_meter::Result<()> {
    if llm_meter::utils::test_support::should_skip_httpmock() {
        return Ok(());
    }

    let sse = concat!(
        ": keep-alive\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\n",
        "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":500,\"completion_tokens\":500}}\n\n",
        "data: [DONE]\n\n",
    );
    let upstream = MockServer::start_async().await;
    upstream
        .mock_async(|when, then| {
            when.method(POST)
                .path("/inference/v1/chat/completions")
                .header("accept", "text/event-stream");
            then.status(200)
                .header("content-type", "text/event-stream")
                .body(sse);
        })
        .await;

    let dispatcher = Dispatcher::from_config(&config_for(&upstream))?;
    let request = ChatCompletionRequest::new("search-model").with_stream(true);
    let Dispatched::Streamed(chunks) = dispatcher.dispatch("key", "local", &request).await? else {
        panic!("expected a stream");
    };
    let chunks = chunks.try_collect::<Vec<_>>().await?;
    assert_eq!(chunks.len(), 2);

    let parsed = chunks
        .iter()
        .map(|raw| serde_json::from_str::<Value>(raw))
        .collect::<Result<Vec<_>, _>>()?;
    assert_eq!(parsed[0]["cost"], json!(0.0));
    let cost = parsed[1]["cost"].as_f64().expect("cost");
    assert!((cost - 0.001).abs() < 1e-12);
    Ok(())
}

#[tokio::test]
async fn upstream_rejection_surfaces_as_api_error() -> llm_meter::Result<()> {
    if llm_meter::utils::test_support::should_skip_httpmock() {
        return Ok(());
    }

    let upstream = MockServer::start_async().await;
    upstream
        .mock_async(|when, then| {
            when.method(POST).path("/inference/v1/chat/completions");
            then.status(429).body("rate limited");
        })
        .await;

    let dispatcher = Dispatcher::from_config(&config_for(&upstream))?;
    let err = dispatcher
        .dispatch("key", "fireworks", &ChatCompletionRequest::new("m").with_stream(true))
        .await
        .unwrap_err();
    match err {
        MeterError::Api { status, body } => {
            assert_eq!(status.as_u16(), 429);
            assert_eq!(body, "rate limited");
        }
        other => panic!("unexpected error: {other}"),
    }
    Ok(())
}
