//! Service configuration
//!
//! `Config` is an immutable value constructed once by the collaborator (the
//! CLI loads it from TOML) and passed by reference into the core. The core
//! reads no environment variables and never mutates configuration after
//! construction.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::errors::{Result, SpecdexError};

/// Relative bm25 column weights for the full-text index.
///
/// Column order must match the `endpoints_fts` schema:
/// path, summary, description, operation_id, tags, category.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct FtsWeights {
    pub path: f64,
    pub summary: f64,
    pub description: f64,
    pub operation_id: f64,
    pub tags: f64,
    pub category: f64,
}

impl Default for FtsWeights {
    fn default() -> Self {
        // Ranking default: path outweighs summary outweighs prose fields.
        Self {
            path: 10.0,
            summary: 5.0,
            description: 2.0,
            operation_id: 2.0,
            tags: 1.0,
            category: 1.0,
        }
    }
}

/// Circuit breaker tuning for the retrieval plane.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures of one operation kind before the breaker opens.
    pub failure_threshold: u32,
    /// Seconds the breaker stays open before admitting a probe request.
    pub cooldown_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_secs: 30,
        }
    }
}

/// Specdex configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Read connections kept in the pool (clamped to 1..=20).
    pub read_pool_size: usize,
    /// Per-retrieval-operation timeout in seconds.
    pub retrieval_timeout_secs: u64,
    /// Per-ingest timeout in seconds.
    pub ingest_timeout_secs: u64,
    /// Full-text ranking weights.
    pub fts_weights: FtsWeights,
    /// Circuit breaker settings.
    pub breaker: BreakerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            read_pool_size: 8,
            retrieval_timeout_secs: 30,
            ingest_timeout_secs: 60,
            fts_weights: FtsWeights::default(),
            breaker: BreakerConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| SpecdexError::Config(format!("Failed to read config: {}", e)))?;

        let mut config: Config = toml::from_str(&content)
            .map_err(|e| SpecdexError::Config(format!("Invalid config TOML: {}", e)))?;

        config.read_pool_size = config.read_pool_size.clamp(1, 20);
        Ok(config)
    }

    pub fn retrieval_timeout(&self) -> Duration {
        Duration::from_secs(self.retrieval_timeout_secs)
    }

    pub fn ingest_timeout(&self) -> Duration {
        Duration::from_secs(self.ingest_timeout_secs)
    }
}
