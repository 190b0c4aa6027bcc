use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

use super::config::{PricingConfig, PricingEntryConfig};

/// Rates in the pricing table are quoted per this many tokens.
pub const TOKENS_PER_RATE_UNIT: f64 = 1_000_000.0;
/// Search rates are quoted per this many searches.
pub const SEARCHES_PER_RATE_UNIT: f64 = 1_000.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PricingEntry {
    /// One per-million-token rate applied to input and output tokens alike.
    Flat(f64),
    Split {
        input: f64,
        output: f64,
        searches: f64,
    },
}

impl PricingEntry {
    pub fn input_rate(&self) -> f64 {
        match self {
            Self::Flat(rate) => *rate,
            Self::Split { input, .. } => *input,
        }
    }

    pub fn search_rate(&self) -> f64 {
        match self {
            Self::Flat(_) => 0.0,
            Self::Split { searches, .. } => *searches,
        }
    }
}

#[derive(Debug, Error)]
pub enum PricingTableError {
    #[error("invalid pricing entry for {provider}/{model}: missing input/output/searches rate")]
    MissingRates { provider: String, model: String },
    #[error("invalid pricing entry for {provider}/{model}: invalid rate value for {field}")]
    InvalidRate {
        provider: String,
        model: String,
        field: &'static str,
    },
    #[error("invalid cache pricing entry for {provider}/{model}: only an `input` rate is allowed")]
    InvalidCacheEntry { provider: String, model: String },
}

/// Token counters reported by a backend for one response or one stream chunk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UsageSnapshot {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cached_tokens: u64,
    pub searches: u64,
}

impl UsageSnapshot {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            ..Self::default()
        }
    }

    pub fn with_cached_tokens(mut self, cached_tokens: u64) -> Self {
        self.cached_tokens = cached_tokens;
        self
    }

    pub fn with_searches(mut self, searches: u64) -> Self {
        self.searches = searches;
        self
    }

    /// Prompt tokens billed at the standard rate.
    pub fn effective_prompt_tokens(&self) -> u64 {
        self.prompt_tokens.saturating_sub(self.cached_tokens)
    }
}

type ProviderPricing = HashMap<String, HashMap<String, PricingEntry>>;
type ProviderCacheRates = HashMap<String, HashMap<String, f64>>;

/// Standard-rate entries and cache-hit input rates, keyed by routing key, then model name.
#[derive(Clone, Debug, Default)]
pub struct PricingTable {
    standard: ProviderPricing,
    cache: ProviderCacheRates,
}

impl PricingTable {
    pub fn from_config(config: &PricingConfig) -> Result<Self, PricingTableError> {
        Ok(Self {
            standard: load_provider_pricing(&config.standard)?,
            cache: load_cache_rates(&config.cache)?,
        })
    }

    pub fn with_standard_entry(
        mut self,
        provider: impl Into<String>,
        model: impl Into<String>,
        entry: PricingEntry,
    ) -> Self {
        self.standard
            .entry(provider.into())
            .or_default()
            .insert(model.into(), entry);
        self
    }

    pub fn standard_entry(&self, provider: &str, model: &str) -> Option<&PricingEntry> {
        self.standard.get(provider)?.get(model)
    }

    /// Input rate for cached prompt tokens, if the model has a cache-hit price.
    pub fn cache_input_rate(&self, provider: &str, model: &str) -> Option<f64> {
        self.cache.get(provider)?.get(model).copied()
    }

    /// Cost of `usage` for `model` served by `provider`.
    ///
    /// Models without a standard-rate entry cost nothing. Cached prompt tokens are billed at the
    /// cache input rate when one exists; the remaining prompt tokens and all completion tokens are
    /// billed at the standard rate.
    pub fn compute_cost(&self, provider: &str, model: Option<&str>, usage: &UsageSnapshot) -> f64 {
        let Some(model) = model.filter(|model| !model.is_empty()) else {
            return 0.0;
        };
        let Some(standard) = self.standard_entry(provider, model) else {
            return 0.0;
        };

        let effective_prompt_tokens = usage.effective_prompt_tokens() as f64;
        let completion_tokens = usage.completion_tokens as f64;
        let mut cost = 0.0;

        if usage.cached_tokens > 0 {
            if let Some(cache_rate) = self.cache_input_rate(provider, model) {
                cost += usage.cached_tokens as f64 * cache_rate / TOKENS_PER_RATE_UNIT;
            }
        }

        cost += match standard {
            PricingEntry::Flat(rate) => {
                (effective_prompt_tokens + completion_tokens) * rate / TOKENS_PER_RATE_UNIT
            }
            PricingEntry::Split { input, output, .. } => {
                (effective_prompt_tokens * input + completion_tokens * output)
                    / TOKENS_PER_RATE_UNIT
            }
        };

        if usage.searches > 0 {
            cost += usage.searches as f64 * standard.search_rate() / SEARCHES_PER_RATE_UNIT;
        }

        cost
    }
}

fn load_provider_pricing(
    raw: &BTreeMap<String, BTreeMap<String, PricingEntryConfig>>,
) -> Result<ProviderPricing, PricingTableError> {
    let mut out = ProviderPricing::new();
    for (provider, models) in raw {
        let mut entries = HashMap::with_capacity(models.len());
        for (model, entry) in models {
            entries.insert(model.clone(), parse_entry(provider, model, entry)?);
        }
        out.insert(provider.clone(), entries);
    }
    Ok(out)
}

/// Cache entries price only the cached part of the prompt, so they must be `{ input = rate }`.
fn load_cache_rates(
    raw: &BTreeMap<String, BTreeMap<String, PricingEntryConfig>>,
) -> Result<ProviderCacheRates, PricingTableError> {
    let mut out = ProviderCacheRates::new();
    for (provider, models) in raw {
        let mut rates = HashMap::with_capacity(models.len());
        for (model, entry) in models {
            let PricingEntryConfig::Split {
                input: Some(_),
                output: None,
                searches: None,
            } = entry
            else {
                return Err(PricingTableError::InvalidCacheEntry {
                    provider: provider.clone(),
                    model: model.clone(),
                });
            };
            let rate = parse_entry(provider, model, entry)?.input_rate();
            rates.insert(model.clone(), rate);
        }
        out.insert(provider.clone(), rates);
    }
    Ok(out)
}

fn parse_entry(
    provider: &str,
    model: &str,
    entry: &PricingEntryConfig,
) -> Result<PricingEntry, PricingTableError> {
    let check = |value: f64, field: &'static str| {
        if value.is_finite() && value >= 0.0 {
            Ok(value)
        } else {
            Err(PricingTableError::InvalidRate {
                provider: provider.to_string(),
                model: model.to_string(),
                field,
            })
        }
    };

    match *entry {
        PricingEntryConfig::Flat(rate) => Ok(PricingEntry::Flat(check(rate, "rate")?)),
        PricingEntryConfig::Split {
            input,
            output,
            searches,
        } => {
            if input.is_none() && output.is_none() && searches.is_none() {
                return Err(PricingTableError::MissingRates {
                    provider: provider.to_string(),
                    model: model.to_string(),
                });
            }
            Ok(PricingEntry::Split {
                input: check(input.unwrap_or(0.0), "input")?,
                output: check(output.unwrap_or(0.0), "output")?,
                searches: check(searches.unwrap_or(0.0), "searches")?,
            })
        }
    }
}
