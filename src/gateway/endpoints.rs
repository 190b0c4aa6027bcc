use std::collections::{BTreeMap, HashMap};

use super::config::EndpointConfig;
use crate::{MeterError, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    base_url: String,
}

impl Endpoint {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into();
        let trimmed = base_url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(MeterError::Config("endpoint base_url must not be empty".to_string()));
        }
        let parsed = reqwest::Url::parse(trimmed).map_err(|err| {
            MeterError::Config(format!("invalid endpoint base_url {trimmed:?}: {err}"))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(MeterError::Config(format!(
                "endpoint base_url {trimmed:?} must use http or https"
            )));
        }
        Ok(Self {
            base_url: trimmed.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

/// Routing key to backend endpoint. Fixed once built.
#[derive(Clone, Debug, Default)]
pub struct EndpointRegistry {
    endpoints: HashMap<String, Endpoint>,
}

impl EndpointRegistry {
    pub fn from_config(endpoints: &BTreeMap<String, EndpointConfig>) -> Result<Self> {
        let endpoints = endpoints
            .iter()
            .map(|(routing_key, config)| {
                Endpoint::new(config.base_url.as_str()).map(|endpoint| (routing_key.clone(), endpoint))
            })
            .collect::<Result<HashMap<_, _>>>()?;
        Ok(Self { endpoints })
    }

    pub fn resolve(&self, routing_key: &str) -> Result<&Endpoint> {
        self.endpoints
            .get(routing_key)
            .ok_or_else(|| MeterError::UnknownRoute {
                routing_key: routing_key.to_string(),
            })
    }

    pub fn routing_keys(&self) -> impl Iterator<Item = &str> {
        self.endpoints.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayConfig;

    #[test]
    fn resolves_builtin_endpoints() {
        let registry =
            EndpointRegistry::from_config(&GatewayConfig::default().endpoints).expect("registry");
        assert_eq!(
            registry.resolve("fireworks").expect("fireworks").base_url(),
            "https://api.fireworks.ai/inference/v1"
        );
        assert_eq!(
            registry
                .resolve("openai")
                .expect("openai")
                .url("/chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn unknown_routing_key_names_the_key() {
        let registry =
            EndpointRegistry::from_config(&GatewayConfig::default().endpoints).expect("registry");
        let err = registry.resolve("invalid-type").unwrap_err();
        assert!(matches!(err, MeterError::UnknownRoute { .. }));
        assert_eq!(err.to_string(), "API mapping for invalid-type not found");
    }

    #[test]
    fn trims_trailing_slash_and_rejects_bad_urls() {
        let endpoint = Endpoint::new("http://localhost:8000/v1/").expect("endpoint");
        assert_eq!(endpoint.base_url(), "http://localhost:8000/v1");

        assert!(Endpoint::new("  ").is_err());
        assert!(Endpoint::new("not a url").is_err());
        assert!(Endpoint::new("ftp://example.com").is_err());
    }
}
