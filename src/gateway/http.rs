//! HTTP surface: `POST /:routing_key/v1/chat/completions` in front of the [`Dispatcher`].

use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::TryStreamExt;
use futures_util::stream;
use serde::Serialize;
use serde_json::Value;

use super::dispatch::{Dispatched, Dispatcher};
use super::metering::MeteredStream;
use super::request::ChatCompletionRequest;
use crate::MeterError;

const DONE_FRAME: &[u8] = b"data: [DONE]\n\n";

#[derive(Clone)]
pub struct GatewayHttpState {
    dispatcher: Dispatcher,
}

impl GatewayHttpState {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }
}

pub fn router(state: GatewayHttpState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/:routing_key/v1/chat/completions",
            post(handle_chat_completions),
        )
        .with_state(state)
}

async fn health(State(state): State<GatewayHttpState>) -> Json<Value> {
    let mut routes = state
        .dispatcher
        .endpoints()
        .routing_keys()
        .map(str::to_string)
        .collect::<Vec<_>>();
    routes.sort();
    Json(serde_json::json!({ "status": "ok", "routes": routes }))
}

async fn handle_chat_completions(
    State(state): State<GatewayHttpState>,
    Path(routing_key): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(credential) = extract_bearer(&headers) else {
        return openai_error(
            StatusCode::UNAUTHORIZED,
            "invalid_request_error",
            Some("missing_authorization"),
            "Authorization token is missing",
        )
        .into_response();
    };

    let request = match serde_json::from_slice::<Value>(&body)
        .map_err(|err| MeterError::InvalidRequest(format!("invalid JSON body: {err}")))
        .and_then(ChatCompletionRequest::from_value)
    {
        Ok(request) => request,
        Err(err) => return error_response(err),
    };

    let mode = if request.is_stream() { "streaming" } else { "regular" };
    tracing::info!(routing_key = %routing_key, "handling {mode} request");
    tracing::info!(model = ?request.model, "creating chat completions for {routing_key}");

    match state
        .dispatcher
        .dispatch(&credential, &routing_key, &request)
        .await
    {
        Ok(Dispatched::Completed(response)) => Json(response).into_response(),
        Ok(Dispatched::Streamed(chunks)) => event_stream_response(chunks),
        Err(err) => {
            tracing::warn!(routing_key = %routing_key, error = %err, "chat completion failed");
            error_response(err)
        }
    }
}

/// Frames each payload as `data: <payload>\n\n` and ends with `data: [DONE]` unless the source
/// failed, in which case the body is aborted without a completion marker.
fn event_stream_response(chunks: MeteredStream) -> Response {
    let framed = stream::try_unfold((chunks, false), |(mut chunks, finished)| async move {
        if finished {
            return Ok(None);
        }
        match chunks.try_next().await {
            Ok(Some(payload)) => Ok(Some((
                Bytes::from(format!("data: {payload}\n\n")),
                (chunks, false),
            ))),
            Ok(None) => Ok(Some((Bytes::from_static(DONE_FRAME), (chunks, true)))),
            Err(err) => {
                tracing::warn!(error = %err, "backend stream terminated");
                Err(err)
            }
        }
    });

    let mut response = Response::new(Body::from_stream(framed));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    response
}

fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())?
        .trim();
    let rest = auth
        .strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))?;
    let token = rest.trim();
    (!token.is_empty()).then(|| token.to_string())
}

#[derive(Debug, Serialize)]
struct OpenAiErrorDetail {
    message: String,
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct OpenAiErrorResponse {
    error: OpenAiErrorDetail,
}

fn openai_error(
    status: StatusCode,
    kind: &'static str,
    code: Option<&'static str>,
    message: impl std::fmt::Display,
) -> (StatusCode, Json<OpenAiErrorResponse>) {
    (
        status,
        Json(OpenAiErrorResponse {
            error: OpenAiErrorDetail {
                message: message.to_string(),
                kind,
                code,
            },
        }),
    )
}

fn error_response(err: MeterError) -> Response {
    match err {
        MeterError::UnknownRoute { .. } => openai_error(
            StatusCode::NOT_FOUND,
            "invalid_request_error",
            Some("route_not_found"),
            err,
        )
        .into_response(),
        MeterError::InvalidRequest(message) => openai_error(
            StatusCode::BAD_REQUEST,
            "invalid_request_error",
            Some("invalid_request"),
            message,
        )
        .into_response(),
        MeterError::Api { status, body } => {
            // Upstream errors pass through with their own status and body.
            match serde_json::from_str::<Value>(&body) {
                Ok(value) if value.is_object() => (status, Json(value)).into_response(),
                _ => openai_error(status, "api_error", Some("backend_error"), body).into_response(),
            }
        }
        err if err.is_backend() => openai_error(
            StatusCode::BAD_GATEWAY,
            "api_error",
            Some("backend_error"),
            err,
        )
        .into_response(),
        err => openai_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "api_error",
            Some("internal_error"),
            err,
        )
        .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer  sk-1 "));
        assert_eq!(extract_bearer(&headers).as_deref(), Some("sk-1"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("bearer sk-2"));
        assert_eq!(extract_bearer(&headers).as_deref(), Some("sk-2"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_bearer(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(extract_bearer(&headers), None);
    }

    #[test]
    fn maps_errors_to_status_codes() {
        let cases = [
            (
                MeterError::UnknownRoute {
                    routing_key: "nope".to_string(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                MeterError::InvalidRequest("bad".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                MeterError::Api {
                    status: StatusCode::TOO_MANY_REQUESTS,
                    body: "slow down".to_string(),
                },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                MeterError::InvalidResponse("garbage".to_string()),
                StatusCode::BAD_GATEWAY,
            ),
            (
                MeterError::Config("broken".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(error_response(err).status(), status);
        }
    }
}
