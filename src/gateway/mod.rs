//! Completion dispatch and cost metering.

pub mod backend;
pub mod config;
pub mod costing;
pub mod dispatch;
pub mod endpoints;
pub mod metering;
pub mod request;
pub mod usage;

#[cfg(feature = "gateway")]
pub mod http;
#[cfg(feature = "gateway")]
pub mod telemetry;
#[cfg(feature = "gateway-otel")]
pub mod otel;

pub use backend::{BackendConnector, CompletionBackend, HttpBackend, HttpConnector};
pub use config::{EndpointConfig, GatewayConfig, PricingConfig, PricingEntryConfig};
pub use costing::{PricingEntry, PricingTable, PricingTableError, UsageSnapshot};
pub use dispatch::{Dispatched, Dispatcher};
pub use endpoints::{Endpoint, EndpointRegistry};
pub use metering::{ChunkStream, CostMeter, MeteredStream, augment};
pub use request::ChatCompletionRequest;
pub use usage::usage_from_payload;

#[cfg(feature = "gateway")]
pub use http::{GatewayHttpState, router};
