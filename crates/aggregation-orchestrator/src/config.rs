use anyhow::{Context, Result};
use cache_manager::{TtlPolicy, NS_ANALYST, NS_MACRO, NS_NEWS, NS_STOCKS};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Everything the aggregation layer reads from the environment
#[derive(Debug, Clone)]
pub struct MarketlyConfig {
    // Cache
    pub redis_url: Option<String>,
    pub cache_prefix: String,
    pub cache_ttl_default: Duration,
    pub cache_ttl_overrides: Vec<(String, Duration)>,

    // Provider credentials (a missing key disables that provider)
    pub finnhub_api_key: Option<String>,
    pub twelve_api_key: Option<String>,
    pub fmp_api_key: Option<String>,
    pub rapidapi_key: Option<String>,
    pub fred_api_key: Option<String>,

    // Timeouts
    pub provider_timeout: Duration,
    pub adapter_deadline: Duration,

    // Scoring
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,
    pub scoring_timeout: Duration,
    pub scoring_max_payload_bytes: usize,
}

impl MarketlyConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any variable lookup; blank values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut cache_ttl_overrides = Vec::new();
        for namespace in [NS_STOCKS, NS_ANALYST, NS_NEWS, NS_MACRO] {
            let name = format!("CACHE_TTL_{}_SECS", namespace.to_uppercase());
            if let Some(value) = get(&name) {
                cache_ttl_overrides.push((namespace.to_string(), secs_or(&name, Some(value), 0)?));
            }
        }

        Ok(Self {
            redis_url: get("REDIS_URL"),
            cache_prefix: get("MARKETLY_CACHE_PREFIX")
                .unwrap_or_else(|| cache_manager::DEFAULT_PREFIX.to_string()),
            cache_ttl_default: secs_or("CACHE_TTL_DEFAULT_SECS", get("CACHE_TTL_DEFAULT_SECS"), 3600)?,
            cache_ttl_overrides,

            finnhub_api_key: get("FINNHUB_API_KEY"),
            twelve_api_key: get("TWELVE_API_KEY"),
            fmp_api_key: get("FMPSDK_API_KEY"),
            rapidapi_key: get("RAPIDAPI_KEY"),
            fred_api_key: get("FRED_API_KEY"),

            provider_timeout: secs_or("PROVIDER_TIMEOUT_SECS", get("PROVIDER_TIMEOUT_SECS"), 10)?,
            adapter_deadline: secs_or("ADAPTER_DEADLINE_SECS", get("ADAPTER_DEADLINE_SECS"), 45)?,

            openai_api_key: get("OPENAI_API_KEY"),
            openai_base_url: get("OPENAI_BASE_URL")
                .unwrap_or_else(|| scoring_client::openai::DEFAULT_BASE_URL.to_string()),
            openai_model: get("OPENAI_MODEL")
                .unwrap_or_else(|| scoring_client::openai::DEFAULT_MODEL.to_string()),
            scoring_timeout: secs_or("SCORING_TIMEOUT_SECS", get("SCORING_TIMEOUT_SECS"), 60)?,
            scoring_max_payload_bytes: parse_opt("SCORING_MAX_PAYLOAD_BYTES", get("SCORING_MAX_PAYLOAD_BYTES"))?
                .unwrap_or(scoring_client::DEFAULT_MAX_PAYLOAD_BYTES),
        })
    }

    pub fn ttl_policy(&self) -> TtlPolicy {
        self.cache_ttl_overrides
            .iter()
            .fold(
                TtlPolicy::default().with_default(self.cache_ttl_default),
                |policy, (namespace, ttl)| policy.with_namespace(namespace, *ttl),
            )
    }
}

fn parse_opt<T>(name: &str, value: Option<String>) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .map(|v| v.parse::<T>().with_context(|| format!("{} has invalid value {:?}", name, v)))
        .transpose()
}

fn secs_or(name: &str, value: Option<String>, default: u64) -> Result<Duration> {
    let secs = parse_opt::<u64>(name, value)?.unwrap_or(default);
    anyhow::ensure!(secs > 0, "{} must be greater than zero", name);
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<MarketlyConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        MarketlyConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();

        assert!(config.redis_url.is_none());
        assert_eq!(config.cache_prefix, "marketly");
        assert_eq!(config.provider_timeout, Duration::from_secs(10));
        assert_eq!(config.adapter_deadline, Duration::from_secs(45));
        assert_eq!(config.scoring_max_payload_bytes, 20_000);
        assert_eq!(config.openai_model, "gpt-5-nano-2025-08-07");
        assert_eq!(config.ttl_policy().ttl_for(NS_MACRO), Duration::from_secs(7 * 24 * 3600));
    }

    #[test]
    fn test_overrides_and_blank_keys() {
        let config = config_from(&[
            ("FINNHUB_API_KEY", "abc"),
            ("FMPSDK_API_KEY", "   "),
            ("CACHE_TTL_NEWS_SECS", "600"),
            ("CACHE_TTL_DEFAULT_SECS", "120"),
            ("MARKETLY_CACHE_PREFIX", "staging"),
        ])
        .unwrap();

        assert_eq!(config.finnhub_api_key.as_deref(), Some("abc"));
        assert!(config.fmp_api_key.is_none());
        assert_eq!(config.cache_prefix, "staging");

        let policy = config.ttl_policy();
        assert_eq!(policy.ttl_for(NS_NEWS), Duration::from_secs(600));
        assert_eq!(policy.ttl_for(NS_STOCKS), Duration::from_secs(86_400));
        assert_eq!(policy.ttl_for("other"), Duration::from_secs(120));
    }

    #[test]
    fn test_invalid_numbers_are_errors() {
        assert!(config_from(&[("PROVIDER_TIMEOUT_SECS", "ten")]).is_err());
        assert!(config_from(&[("ADAPTER_DEADLINE_SECS", "0")]).is_err());
        assert!(config_from(&[("CACHE_TTL_MACRO_SECS", "-5")]).is_err());
    }
}
