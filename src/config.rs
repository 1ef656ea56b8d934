//! Parameterization for PartitionManager, Producer, and Consumer
//! instances: numeric defaults plus YAML loading, the way
//! `ServerConfig::from_file` parameterizes the teacher's server.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::batching::AdaptiveBatcher;
use crate::error::{MofkaError, Result};

/// Server-side per-partition knobs (spec.md §4.4 "Adaptive batching").
///
/// Threaded straight into `MemoryPartitionManager::new` — the
/// `AdaptiveBatcher` it builds is seeded and bounded from these fields
/// rather than from `AdaptiveBatcher`'s own built-in defaults, and its
/// feed loop idles for `idle_poll_millis` between arrival-wait polls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionManagerConfig {
    /// Starting soft-limit for adaptive batch sizing, in events.
    #[serde(default = "default_adaptive_seed")]
    pub adaptive_batch_seed: usize,
    /// EWMA smoothing factor applied to the adaptive soft limit.
    #[serde(default = "default_ewma_alpha")]
    pub ewma_alpha: f64,
    /// Lower bound the adaptive soft limit is clamped to.
    #[serde(default = "default_batch_floor")]
    pub batch_floor: usize,
    /// Upper bound the adaptive soft limit is clamped to.
    #[serde(default = "default_batch_ceiling")]
    pub batch_ceiling: usize,
    /// How long (milliseconds) a feeder idles between arrival-wait
    /// polls once its backlog is empty.
    #[serde(default = "default_idle_poll_millis")]
    pub idle_poll_millis: u64,
}

fn default_adaptive_seed() -> usize {
    AdaptiveBatcher::new().current()
}

fn default_ewma_alpha() -> f64 {
    0.2
}

fn default_batch_floor() -> usize {
    32
}

fn default_batch_ceiling() -> usize {
    65_536
}

fn default_idle_poll_millis() -> u64 {
    50
}

impl Default for PartitionManagerConfig {
    fn default() -> Self {
        Self {
            adaptive_batch_seed: default_adaptive_seed(),
            ewma_alpha: default_ewma_alpha(),
            batch_floor: default_batch_floor(),
            batch_ceiling: default_batch_ceiling(),
            idle_poll_millis: default_idle_poll_millis(),
        }
    }
}

/// Producer-side knobs (spec.md §4.7 owned state).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducerConfig {
    #[serde(default = "default_batch_size")]
    pub default_batch_size: usize,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    #[serde(default)]
    pub strict_ordering: bool,
}

fn default_batch_size() -> usize {
    32
}

fn default_max_in_flight() -> usize {
    4
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            default_batch_size: default_batch_size(),
            max_in_flight: default_max_in_flight(),
            strict_ordering: false,
        }
    }
}

/// Consumer-side knobs (spec.md §4.8 owned state).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerConfig {
    #[serde(default = "default_batch_size")]
    pub default_batch_size: usize,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            default_batch_size: default_batch_size(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

fn load_yaml<T: for<'de> Deserialize<'de>>(path: impl AsRef<Path>) -> Result<T> {
    let content = fs::read_to_string(path.as_ref()).map_err(|e| {
        MofkaError::Protocol(format!("failed to read config file {:?}: {e}", path.as_ref()))
    })?;
    serde_yaml::from_str(&content)
        .map_err(|e| MofkaError::Protocol(format!("failed to parse config YAML: {e}")))
}

impl PartitionManagerConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        load_yaml(path)
    }
}

impl ProducerConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        load_yaml(path)
    }
}

impl ConsumerConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        load_yaml(path)
    }
}
