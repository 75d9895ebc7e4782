//! TTL selection per lookup outcome.

use std::time::Duration;

use crate::config::CacheConfig;

/// Semantic outcome of a lookup, used to pick a TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Confirmed valid record.
    Positive,
    /// Confirmed negative answer (not found, expired, invalid format).
    Negative,
    /// Transient failure. Never cached.
    Transient,
}

/// TTLs for each cacheable outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    pub positive: Duration,
    pub negative: Duration,
}

impl TtlPolicy {
    pub fn new(positive: Duration, negative: Duration) -> Self {
        Self { positive, negative }
    }

    /// TTL for `outcome`, or `None` when it must not be cached.
    pub fn ttl_for(&self, outcome: CacheOutcome) -> Option<Duration> {
        match outcome {
            CacheOutcome::Positive => Some(self.positive),
            CacheOutcome::Negative => Some(self.negative),
            CacheOutcome::Transient => None,
        }
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(86_400), Duration::from_secs(3_600))
    }
}

impl From<&CacheConfig> for TtlPolicy {
    fn from(config: &CacheConfig) -> Self {
        Self::new(
            Duration::from_secs(config.positive_ttl_secs),
            Duration::from_secs(config.negative_ttl_secs),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_is_never_cached() {
        let policy = TtlPolicy::default();
        assert_eq!(policy.ttl_for(CacheOutcome::Positive), Some(Duration::from_secs(86_400)));
        assert_eq!(policy.ttl_for(CacheOutcome::Negative), Some(Duration::from_secs(3_600)));
        assert_eq!(policy.ttl_for(CacheOutcome::Transient), None);
    }
}
