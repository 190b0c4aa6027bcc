use serde_json::Value;

use super::costing::UsageSnapshot;

/// Reads the `usage` object of an OpenAI-shaped completion or chunk. Missing counters are zero.
pub fn usage_from_payload(payload: &Value) -> UsageSnapshot {
    payload
        .get("usage")
        .map(parse_openai_usage)
        .unwrap_or_default()
}

pub fn parse_openai_usage(value: &Value) -> UsageSnapshot {
    let Some(obj) = value.as_object() else {
        return UsageSnapshot::default();
    };
    let prompt_tokens = obj
        .get("prompt_tokens")
        .or_else(|| obj.get("input_tokens"))
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let completion_tokens = obj
        .get("completion_tokens")
        .or_else(|| obj.get("output_tokens"))
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let cached_tokens = obj
        .get("prompt_tokens_details")
        .or_else(|| obj.get("input_tokens_details"))
        .and_then(|details| details.get("cached_tokens"))
        .and_then(Value::as_u64)
        .unwrap_or(0);

    UsageSnapshot::new(prompt_tokens, completion_tokens).with_cached_tokens(cached_tokens)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn reads_chat_completion_usage() {
        let payload = json!({
            "id": "chatcmpl-1",
            "usage": {
                "prompt_tokens": 100,
                "completion_tokens": 50,
                "total_tokens": 150,
                "prompt_tokens_details": { "cached_tokens": 30 }
            }
        });
        assert_eq!(
            usage_from_payload(&payload),
            UsageSnapshot::new(100, 50).with_cached_tokens(30)
        );
    }

    #[test]
    fn accepts_responses_style_field_names() {
        let usage = parse_openai_usage(&json!({
            "input_tokens": 7,
            "output_tokens": 3,
            "input_tokens_details": { "cached_tokens": 2 }
        }));
        assert_eq!(usage, UsageSnapshot::new(7, 3).with_cached_tokens(2));
    }

    #[test]
    fn missing_or_null_usage_is_zero() {
        assert_eq!(usage_from_payload(&json!({"choices": []})), UsageSnapshot::default());
        assert_eq!(usage_from_payload(&json!({"usage": null})), UsageSnapshot::default());
        assert_eq!(
            usage_from_payload(&json!({"usage": {"prompt_tokens": "12"}})),
            UsageSnapshot::default()
        );
    }
}
