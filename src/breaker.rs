//! Circuit breaker for the retrieval plane
//!
//! Tracks consecutive transient failures per operation kind. Past the
//! threshold the breaker opens and operations short-circuit without touching
//! the store; after the cool-down one probe request is admitted and its
//! outcome decides whether the breaker closes again.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::warn;

use crate::config::BreakerConfig;
use crate::errors::{Result, SpecdexError};

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    open_until: Option<Instant>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    states: DashMap<&'static str, BreakerState>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            states: DashMap::new(),
        }
    }

    /// Gate an operation. Returns the short-circuit error while open; admits
    /// a probe once the cool-down has elapsed.
    pub fn admit(&self, kind: &'static str) -> Result<()> {
        let mut state = self.states.entry(kind).or_default();
        if let Some(open_until) = state.open_until {
            if Instant::now() < open_until {
                return Err(SpecdexError::StoreUnavailable(format!(
                    "{} circuit open after {} consecutive failures",
                    kind, state.consecutive_failures
                )));
            }
            // Half-open: admit this request as the probe.
            state.open_until = None;
        }
        Ok(())
    }

    /// Record an operation outcome. Domain errors (not found, bad arguments)
    /// are normal results and never trip the breaker.
    pub fn record<T>(&self, kind: &'static str, outcome: &Result<T>) {
        let failed = match outcome {
            Ok(_) => false,
            Err(err) => counts_as_failure(err),
        };

        let mut state = self.states.entry(kind).or_default();
        if !failed {
            state.consecutive_failures = 0;
            return;
        }

        state.consecutive_failures += 1;
        if state.consecutive_failures >= self.config.failure_threshold {
            let cooldown = Duration::from_secs(self.config.cooldown_secs);
            state.open_until = Some(Instant::now() + cooldown);
            warn!(
                kind,
                failures = state.consecutive_failures,
                cooldown_secs = self.config.cooldown_secs,
                "circuit breaker opened"
            );
        }
    }
}

fn counts_as_failure(err: &SpecdexError) -> bool {
    matches!(
        err,
        SpecdexError::StoreUnavailable(_)
            | SpecdexError::Timeout(_)
            | SpecdexError::StoreIntegrity(_)
            | SpecdexError::Sqlite(_)
            | SpecdexError::Io(_)
    )
}
