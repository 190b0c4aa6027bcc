use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use super::backend::{BackendConnector, HttpConnector};
use super::config::GatewayConfig;
use super::costing::PricingTable;
use super::endpoints::EndpointRegistry;
use super::metering::{CostMeter, MeteredStream};
use super::request::ChatCompletionRequest;
use crate::Result;

/// Outcome of a dispatched request: the metered chunk stream or the augmented response.
pub enum Dispatched {
    Streamed(MeteredStream),
    Completed(Value),
}

impl std::fmt::Debug for Dispatched {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Streamed(_) => f.write_str("Dispatched::Streamed(..)"),
            Self::Completed(value) => f.debug_tuple("Dispatched::Completed").field(value).finish(),
        }
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    endpoints: Arc<EndpointRegistry>,
    pricing: Arc<PricingTable>,
    connector: Arc<dyn BackendConnector>,
}

impl Dispatcher {
    pub fn new(
        endpoints: Arc<EndpointRegistry>,
        pricing: Arc<PricingTable>,
        connector: Arc<dyn BackendConnector>,
    ) -> Self {
        Self {
            endpoints,
            pricing,
            connector,
        }
    }

    /// Builds the registry, pricing table and HTTP connector described by `config`.
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let endpoints = EndpointRegistry::from_config(&config.endpoints)?;
        let pricing = PricingTable::from_config(&config.pricing)?;
        let connector = HttpConnector::new(config.connect_timeout_seconds.map(Duration::from_secs))?;
        Ok(Self::new(
            Arc::new(endpoints),
            Arc::new(pricing),
            Arc::new(connector),
        ))
    }

    pub fn endpoints(&self) -> &EndpointRegistry {
        &self.endpoints
    }

    /// Resolves `routing_key`, calls the backend with `credential` and meters the result.
    ///
    /// An unknown routing key fails before any backend is contacted. Backend failures are
    /// returned unchanged. A non-streaming call runs on its own task and completes even if the
    /// returned future is dropped; a stream stops reading upstream once it is dropped.
    pub async fn dispatch(
        &self,
        credential: &str,
        routing_key: &str,
        request: &ChatCompletionRequest,
    ) -> Result<Dispatched> {
        let endpoint = self.endpoints.resolve(routing_key)?;
        let backend = self.connector.connect(endpoint, credential)?;
        let meter = CostMeter::new(self.pricing.clone(), routing_key, request.model.clone());

        if request.is_stream() {
            let chunks = backend.complete_stream(request).await?;
            return Ok(Dispatched::Streamed(meter.meter_stream(chunks)));
        }

        let request = request.clone();
        let completion = tokio::spawn(async move {
            let response = backend.complete(&request).await?;
            meter.augment(&response)
        });
        Ok(Dispatched::Completed(completion.await??))
    }
}
