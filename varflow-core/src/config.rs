//! Engine Configuration
//!
//! Settings are passed explicitly to [`Graph::with_config`](crate::Graph::with_config)
//! and apply to every node of that graph. There is no process-wide state:
//! two graphs in the same process can run with different policies.
//!
//! Configuration can be decoded from JSON; missing fields take their
//! defaults.
//!
//! ```rust
//! use varflow_core::{CachingPolicy, EngineConfig};
//!
//! let config = EngineConfig::from_json(r#"{ "caching": "never" }"#).unwrap();
//! assert_eq!(config.caching, CachingPolicy::Never);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// How the per-node caching flag is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachingPolicy {
    /// Each node caches unless caching was disabled on it.
    #[default]
    PerNode,
    /// Every node caches, regardless of its flag.
    Always,
    /// No node caches; every read recomputes.
    Never,
}

impl CachingPolicy {
    /// Effective caching for a node whose own flag is `node_flag`.
    pub fn caches(self, node_flag: bool) -> bool {
        match self {
            CachingPolicy::PerNode => node_flag,
            CachingPolicy::Always => true,
            CachingPolicy::Never => false,
        }
    }
}

/// What to do when an operator produces NaN or infinity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NonFinitePolicy {
    /// Fail the evaluation.
    #[default]
    Reject,
    /// Pass the value through.
    Allow,
}

/// When unreachable nodes are removed from the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReclaimPolicy {
    /// As soon as the last handle is dropped.
    #[default]
    Eager,
    /// Only when [`Graph::collect`](crate::Graph::collect) is called.
    Manual,
}

/// Per-graph engine settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub caching: CachingPolicy,
    pub non_finite: NonFinitePolicy,
    pub reclaim: ReclaimPolicy,
}

impl EngineConfig {
    /// Decode a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_caching(mut self, caching: CachingPolicy) -> Self {
        self.caching = caching;
        self
    }

    pub fn with_non_finite(mut self, non_finite: NonFinitePolicy) -> Self {
        self.non_finite = non_finite;
        self
    }

    pub fn with_reclaim(mut self, reclaim: ReclaimPolicy) -> Self {
        self.reclaim = reclaim;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.caching, CachingPolicy::PerNode);
        assert_eq!(config.non_finite, NonFinitePolicy::Reject);
        assert_eq!(config.reclaim, ReclaimPolicy::Eager);
    }

    #[test]
    fn from_json_fills_missing_fields() {
        let config = EngineConfig::from_json(r#"{"reclaim": "manual"}"#).unwrap();
        assert_eq!(config.reclaim, ReclaimPolicy::Manual);
        assert_eq!(config.caching, CachingPolicy::PerNode);

        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn from_json_rejects_unknown_policy() {
        assert!(EngineConfig::from_json(r#"{"caching": "sometimes"}"#).is_err());
    }

    #[test]
    fn caching_policy_overrides_node_flag() {
        assert!(CachingPolicy::PerNode.caches(true));
        assert!(!CachingPolicy::PerNode.caches(false));
        assert!(CachingPolicy::Always.caches(false));
        assert!(!CachingPolicy::Never.caches(true));
    }
}
