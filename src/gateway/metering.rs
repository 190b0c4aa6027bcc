use std::sync::Arc;

use futures_util::TryStreamExt;
use futures_util::stream::{self, BoxStream};
use serde_json::Value;

use super::costing::PricingTable;
use super::usage::usage_from_payload;
use crate::{MeterError, Result};

/// Backend chunks, decoded but not yet metered.
pub type ChunkStream = BoxStream<'static, Result<Value>>;
/// Serialized chunks with `cost` attached, ready for event-stream framing.
pub type MeteredStream = BoxStream<'static, Result<String>>;

/// Prices payloads for one request: the routing key and the model named in the request.
#[derive(Clone, Debug)]
pub struct CostMeter {
    pricing: Arc<PricingTable>,
    routing_key: String,
    model: Option<String>,
}

impl CostMeter {
    pub fn new(
        pricing: Arc<PricingTable>,
        routing_key: impl Into<String>,
        model: Option<String>,
    ) -> Self {
        Self {
            pricing,
            routing_key: routing_key.into(),
            model,
        }
    }

    pub fn cost_of(&self, payload: &Value) -> f64 {
        self.pricing.compute_cost(
            &self.routing_key,
            self.model.as_deref(),
            &usage_from_payload(payload),
        )
    }

    /// Copy of `response` with its total cost attached.
    pub fn augment(&self, response: &Value) -> Result<Value> {
        augment(
            response,
            &self.pricing,
            &self.routing_key,
            self.model.as_deref(),
        )
    }

    pub fn meter_chunk(&self, mut chunk: Value) -> Result<String> {
        let cost = self.cost_of(&chunk);
        attach_cost(&mut chunk, cost)?;
        Ok(serde_json::to_string(&chunk)?)
    }

    /// Meters chunks one at a time as they are pulled. The output ends when `source` ends, or
    /// right after yielding the first error.
    pub fn meter_stream(self, source: ChunkStream) -> MeteredStream {
        Box::pin(stream::try_unfold(
            (source, self),
            |(mut source, meter)| async move {
                let Some(chunk) = source.try_next().await? else {
                    return Ok(None);
                };
                let payload = meter.meter_chunk(chunk)?;
                Ok(Some((payload, (source, meter))))
            },
        ))
    }
}

/// Non-stream entry point: `response` plus a `cost` computed from its usage totals.
pub fn augment(
    response: &Value,
    pricing: &PricingTable,
    routing_key: &str,
    model: Option<&str>,
) -> Result<Value> {
    let cost = pricing.compute_cost(routing_key, model, &usage_from_payload(response));
    let mut augmented = response.clone();
    attach_cost(&mut augmented, cost)?;
    Ok(augmented)
}

fn attach_cost(payload: &mut Value, cost: f64) -> Result<()> {
    let Some(obj) = payload.as_object_mut() else {
        return Err(MeterError::InvalidResponse(
            "expected a JSON object from backend".to_string(),
        ));
    };
    let cost = serde_json::Number::from_f64(cost)
        .map(Value::Number)
        .ok_or_else(|| MeterError::InvalidResponse(format!("cost is not finite: {cost}")))?;
    obj.insert("cost".to_string(), cost);
    Ok(())
}
