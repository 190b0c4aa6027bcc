//! A metered chat-completion gateway: requests are forwarded to an OpenAI-compatible backend
//! chosen by routing key, and every response (or streamed chunk) comes back with a `cost` field
//! computed from its token usage.

mod error;
pub mod gateway;
pub mod utils;

pub use error::{MeterError, Result};
pub use gateway::{
    ChatCompletionRequest, Dispatched, Dispatcher, GatewayConfig, PricingEntry, PricingTable,
    UsageSnapshot,
};
