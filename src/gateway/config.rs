use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{MeterError, Result};

const BUILTIN_ENDPOINTS: &[(&str, &str)] = &[
    ("fireworks", "https://api.fireworks.ai/inference/v1"),
    ("openai", "https://api.openai.com/v1"),
    ("perplexity", "https://api.perplexity.ai"),
];

// Per million tokens.
const BUILTIN_FLAT_RATES: &[(&str, &str, f64)] = &[
    ("fireworks", "accounts/fireworks/models/deepseek-v3", 0.9),
    ("fireworks", "accounts/fireworks/models/deepseek-r1", 8.0),
    ("fireworks", "accounts/fireworks/models/llama-v3p1-8b-instruct", 0.2),
    ("fireworks", "accounts/fireworks/models/llama-v3p1-405b-instruct", 3.0),
    ("fireworks", "accounts/fireworks/models/llama-v3p3-70b-instruct", 0.9),
];

// (provider, model, input, output, searches per 1000)
const BUILTIN_SPLIT_RATES: &[(&str, &str, f64, f64, Option<f64>)] = &[
    ("openai", "gpt-4o", 2.5, 10.0, None),
    ("openai", "gpt-4o-2024-11-20", 2.5, 5.0, None),
    ("openai", "gpt-4o-2024-05-13", 2.5, 15.0, None),
    ("openai", "gpt-4o-mini", 0.15, 0.6, None),
    ("openai", "gpt-4o-mini-2024-07-18", 0.15, 0.6, None),
    ("perplexity", "sonar-reasoning", 1.0, 5.0, Some(5.0)),
    ("perplexity", "sonar-pro", 3.0, 15.0, Some(5.0)),
    ("perplexity", "sonar", 1.0, 1.0, Some(5.0)),
];

const BUILTIN_CACHE_INPUT_RATES: &[(&str, &str, f64)] = &[
    ("openai", "gpt-4o", 1.25),
    ("openai", "gpt-4o-2024-11-20", 1.25),
    ("openai", "gpt-4o-mini", 0.075),
    ("openai", "gpt-4o-mini-2024-07-18", 0.075),
];

/// Process-wide gateway configuration. Sections missing from a config file fall back to the
/// built-in tables.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "builtin_endpoints")]
    pub endpoints: BTreeMap<String, EndpointConfig>,
    #[serde(default = "PricingConfig::builtin")]
    pub pricing: PricingConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_seconds: Option<u64>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            endpoints: builtin_endpoints(),
            pricing: PricingConfig::builtin(),
            connect_timeout_seconds: None,
        }
    }
}

impl GatewayConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|err| MeterError::Config(format!("invalid toml: {err}")))
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|err| MeterError::Config(format!("invalid json: {err}")))
    }

    /// Loads `.json` files as JSON and everything else as TOML.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&raw)
        } else {
            Self::from_toml_str(&raw)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub base_url: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PricingConfig {
    #[serde(default)]
    pub standard: BTreeMap<String, BTreeMap<String, PricingEntryConfig>>,
    #[serde(default)]
    pub cache: BTreeMap<String, BTreeMap<String, PricingEntryConfig>>,
}

impl PricingConfig {
    pub fn builtin() -> Self {
        let mut config = Self::default();
        for (provider, model, rate) in BUILTIN_FLAT_RATES {
            config
                .standard
                .entry((*provider).to_string())
                .or_default()
                .insert((*model).to_string(), PricingEntryConfig::Flat(*rate));
        }
        for (provider, model, input, output, searches) in BUILTIN_SPLIT_RATES {
            config
                .standard
                .entry((*provider).to_string())
                .or_default()
                .insert(
                    (*model).to_string(),
                    PricingEntryConfig::Split {
                        input: Some(*input),
                        output: Some(*output),
                        searches: *searches,
                    },
                );
        }
        for (provider, model, input) in BUILTIN_CACHE_INPUT_RATES {
            config
                .cache
                .entry((*provider).to_string())
                .or_default()
                .insert(
                    (*model).to_string(),
                    PricingEntryConfig::Split {
                        input: Some(*input),
                        output: None,
                        searches: None,
                    },
                );
        }
        config
    }
}

/// A bare number is a flat rate; a table carries separate input/output/search rates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PricingEntryConfig {
    Flat(f64),
    Split {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        searches: Option<f64>,
    },
}

fn builtin_endpoints() -> BTreeMap<String, EndpointConfig> {
    BUILTIN_ENDPOINTS
        .iter()
        .map(|(name, base_url)| {
            (
                (*name).to_string(),
                EndpointConfig {
                    base_url: (*base_url).to_string(),
                },
            )
        })
        .collect()
}
