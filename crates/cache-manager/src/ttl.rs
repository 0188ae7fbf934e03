use std::collections::HashMap;
use std::time::Duration;

pub const NS_STOCKS: &str = "stocks";
pub const NS_ANALYST: &str = "analyst";
pub const NS_NEWS: &str = "news";
pub const NS_MACRO: &str = "macro";

const HOUR: u64 = 60 * 60;

/// Per-namespace default TTLs with a global fallback
#[derive(Debug, Clone)]
pub struct TtlPolicy {
    default_ttl: Duration,
    presets: HashMap<String, Duration>,
}

impl Default for TtlPolicy {
    /// stocks 24h, analyst 12h, news 3h, macro 7d, everything else 1h
    fn default() -> Self {
        let presets = [
            (NS_STOCKS, 24 * HOUR),
            (NS_ANALYST, 12 * HOUR),
            (NS_NEWS, 3 * HOUR),
            (NS_MACRO, 7 * 24 * HOUR),
        ]
        .into_iter()
        .map(|(ns, secs)| (ns.to_string(), Duration::from_secs(secs)))
        .collect();

        Self {
            default_ttl: Duration::from_secs(HOUR),
            presets,
        }
    }
}

impl TtlPolicy {
    pub fn with_default(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Override or add the preset for one namespace
    pub fn with_namespace(mut self, namespace: &str, ttl: Duration) -> Self {
        self.presets.insert(namespace.to_string(), ttl);
        self
    }

    pub fn ttl_for(&self, namespace: &str) -> Duration {
        self.presets
            .get(namespace)
            .copied()
            .unwrap_or(self.default_ttl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let policy = TtlPolicy::default();
        assert_eq!(policy.ttl_for(NS_MACRO), Duration::from_secs(604_800));
        assert_eq!(policy.ttl_for(NS_NEWS), Duration::from_secs(10_800));
        assert_eq!(policy.ttl_for(NS_STOCKS), Duration::from_secs(86_400));
        assert_eq!(policy.ttl_for(NS_ANALYST), Duration::from_secs(43_200));
        assert_eq!(policy.ttl_for("unknown"), Duration::from_secs(3_600));
    }

    #[test]
    fn test_overrides() {
        let policy = TtlPolicy::default()
            .with_default(Duration::from_secs(60))
            .with_namespace(NS_NEWS, Duration::from_secs(600));
        assert_eq!(policy.ttl_for(NS_NEWS), Duration::from_secs(600));
        assert_eq!(policy.ttl_for("other"), Duration::from_secs(60));
    }
}
