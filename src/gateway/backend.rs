use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::Value;

use super::endpoints::Endpoint;
use super::metering::ChunkStream;
use super::request::ChatCompletionRequest;
use crate::utils::http::{send_checked, send_checked_json};
use crate::utils::sse::sse_data_stream_from_response;
use crate::{MeterError, Result};

const CHAT_COMPLETIONS_PATH: &str = "chat/completions";

/// A chat-completion backend bound to one endpoint and one credential.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, request: &ChatCompletionRequest) -> Result<Value>;

    async fn complete_stream(&self, request: &ChatCompletionRequest) -> Result<ChunkStream>;
}

/// Builds a fresh backend per request from the caller's credential.
pub trait BackendConnector: Send + Sync {
    fn connect(&self, endpoint: &Endpoint, credential: &str) -> Result<Box<dyn CompletionBackend>>;
}

/// Connects OpenAI-compatible HTTP backends. The pooled `reqwest::Client` holds no credentials.
#[derive(Clone, Debug)]
pub struct HttpConnector {
    client: reqwest::Client,
}

impl HttpConnector {
    pub fn new(connect_timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|err| MeterError::Config(format!("backend http client error: {err}")))?;
        Ok(Self { client })
    }
}

impl BackendConnector for HttpConnector {
    fn connect(&self, endpoint: &Endpoint, credential: &str) -> Result<Box<dyn CompletionBackend>> {
        Ok(Box::new(HttpBackend {
            client: self.client.clone(),
            url: endpoint.url(CHAT_COMPLETIONS_PATH),
            credential: credential.to_string(),
        }))
    }
}

#[derive(Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    url: String,
    credential: String,
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend")
            .field("url", &self.url)
            .field("credential", &"<redacted>")
            .finish()
    }
}

impl HttpBackend {
    fn post(&self, body: &ChatCompletionRequest) -> reqwest::RequestBuilder {
        self.client
            .post(&self.url)
            .bearer_auth(&self.credential)
            .json(body)
    }
}

#[async_trait]
impl CompletionBackend for HttpBackend {
    async fn complete(&self, request: &ChatCompletionRequest) -> Result<Value> {
        send_checked_json(self.post(&request.to_backend_body(false))).await
    }

    async fn complete_stream(&self, request: &ChatCompletionRequest) -> Result<ChunkStream> {
        let req = self
            .post(&request.to_backend_body(true))
            .header("accept", "text/event-stream");
        let response = send_checked(req).await?;
        let chunks = sse_data_stream_from_response(response).map(|data| -> Result<Value> {
            let data = data?;
            Ok(serde_json::from_str::<Value>(&data)?)
        });
        Ok(chunks.boxed())
    }
}
