use futures_util::StreamExt;
use serde::de::DeserializeOwned;

use crate::{MeterError, Result};

const MAX_ERROR_BODY_BYTES: usize = 64 * 1024;

/// Reads at most `max_bytes` of the body, marking the text when it was cut short.
pub(crate) async fn response_text_truncated(response: reqwest::Response, max_bytes: usize) -> String {
    let max_bytes = max_bytes.max(1);
    let mut bytes = Vec::<u8>::new();
    let mut truncated = false;

    let mut body = response.bytes_stream();
    while let Some(next) = body.next().await {
        let Ok(chunk) = next else {
            break;
        };
        let remaining = max_bytes.saturating_sub(bytes.len());
        if chunk.len() > remaining {
            bytes.extend_from_slice(&chunk[..remaining]);
            truncated = true;
            break;
        }
        bytes.extend_from_slice(&chunk);
    }

    let mut text = String::from_utf8_lossy(&bytes).into_owned();
    if truncated {
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str("...(truncated)");
    }
    text
}

/// Sends the request and turns non-2xx statuses into `MeterError::Api`.
pub(crate) async fn send_checked(req: reqwest::RequestBuilder) -> Result<reqwest::Response> {
    let response = req.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response_text_truncated(response, MAX_ERROR_BODY_BYTES).await;
        return Err(MeterError::Api { status, body });
    }
    Ok(response)
}

pub(crate) async fn send_checked_json<T: DeserializeOwned>(
    req: reqwest::RequestBuilder,
) -> Result<T> {
    let response = send_checked(req).await?;
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}
