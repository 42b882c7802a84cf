//! Router-wide configuration (`router.*`).

use crate::lsa::AgeLimits;
use crate::RouterId;
use serde::{Deserialize, Serialize};

/// Aging and timing parameters (`router.timers.*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimersConfig {
    /// Age at which LSAs expire (`router.timers.max_age_secs`).
    #[serde(default = "TimersConfig::default_max_age_secs")]
    pub max_age_secs: u16,
    /// Age at which self-originated LSAs are re-issued (`router.timers.ls_refresh_secs`).
    #[serde(default = "TimersConfig::default_ls_refresh_secs")]
    pub ls_refresh_secs: u16,
    /// Age gap that makes two instances distinct (`router.timers.max_age_diff_secs`).
    #[serde(default = "TimersConfig::default_max_age_diff_secs")]
    pub max_age_diff_secs: u16,
    /// Minimum spacing between accepted instances (`router.timers.min_ls_arrival_secs`).
    #[serde(default = "TimersConfig::default_min_ls_arrival_secs")]
    pub min_ls_arrival_secs: u16,
    /// Longest a MaxAge LSA waits for acknowledgements before removal
    /// (`router.timers.maxage_flush_grace_secs`).
    #[serde(default = "TimersConfig::default_maxage_flush_grace_secs")]
    pub maxage_flush_grace_secs: u64,
    /// Aging tick period in milliseconds (`router.timers.tick_interval_ms`).
    #[serde(default = "TimersConfig::default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Default for TimersConfig {
    fn default() -> Self {
        Self {
            max_age_secs: 3600,
            ls_refresh_secs: 1800,
            max_age_diff_secs: 900,
            min_ls_arrival_secs: 1,
            maxage_flush_grace_secs: 60,
            tick_interval_ms: 1000,
        }
    }
}

impl TimersConfig {
    fn default_max_age_secs() -> u16 { 3600 }
    fn default_ls_refresh_secs() -> u16 { 1800 }
    fn default_max_age_diff_secs() -> u16 { 900 }
    fn default_min_ls_arrival_secs() -> u16 { 1 }
    fn default_maxage_flush_grace_secs() -> u64 { 60 }
    fn default_tick_interval_ms() -> u64 { 1000 }

    /// Thresholds for the aging engine.
    pub fn age_limits(&self) -> AgeLimits {
        AgeLimits {
            max_age: self.max_age_secs,
            ls_refresh_time: self.ls_refresh_secs,
            max_age_diff: self.max_age_diff_secs,
        }
    }

    /// Take every field of `other` that differs from the default.
    pub(super) fn merge(&mut self, other: TimersConfig) {
        let default = TimersConfig::default();
        if other.max_age_secs != default.max_age_secs {
            self.max_age_secs = other.max_age_secs;
        }
        if other.ls_refresh_secs != default.ls_refresh_secs {
            self.ls_refresh_secs = other.ls_refresh_secs;
        }
        if other.max_age_diff_secs != default.max_age_diff_secs {
            self.max_age_diff_secs = other.max_age_diff_secs;
        }
        if other.min_ls_arrival_secs != default.min_ls_arrival_secs {
            self.min_ls_arrival_secs = other.min_ls_arrival_secs;
        }
        if other.maxage_flush_grace_secs != default.maxage_flush_grace_secs {
            self.maxage_flush_grace_secs = other.maxage_flush_grace_secs;
        }
        if other.tick_interval_ms != default.tick_interval_ms {
            self.tick_interval_ms = other.tick_interval_ms;
        }
    }
}

/// Adjacency behaviour (`router.adjacency.*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjacencyConfig {
    /// Exchange restarts tolerated before the adjacency is torn down
    /// (`router.adjacency.max_exchange_restarts`).
    #[serde(default = "AdjacencyConfig::default_max_exchange_restarts")]
    pub max_exchange_restarts: u32,
}

impl Default for AdjacencyConfig {
    fn default() -> Self {
        Self {
            max_exchange_restarts: 5,
        }
    }
}

impl AdjacencyConfig {
    fn default_max_exchange_restarts() -> u32 { 5 }
}

/// Router configuration (`router.*`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Router ID (`router.router_id`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub router_id: Option<RouterId>,

    #[serde(default)]
    pub timers: TimersConfig,

    #[serde(default)]
    pub adjacency: AdjacencyConfig,
}
