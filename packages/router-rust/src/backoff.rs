//! Backoff policies applied between same-instance attempts.
//!
//! - [`ZeroBackoff`]: retry immediately
//! - [`ConstantBackoff`]: fixed delay
//! - [`ExponentialBackoff`]: growing delay with optional jitter, capped at a maximum

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use waypoint_core::BackoffPolicy;

// ---------------------------------------------------------------------------
// BackoffConfig
// ---------------------------------------------------------------------------

/// Serializable backoff description, turned into a policy with [`BackoffConfig::build`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum BackoffConfig {
    #[default]
    Zero,
    Constant {
        delay_ms: u64,
    },
    Exponential {
        initial_ms: u64,
        max_ms: u64,
        multiplier: f64,
        /// Randomization factor in `[0, 1]`; the delay is drawn from
        /// `[d * (1 - jitter), d * (1 + jitter)]` before capping.
        #[serde(default)]
        jitter: f64,
    },
}

impl BackoffConfig {
    /// Checks the parameters, returning a description of the first problem.
    ///
    /// # Errors
    ///
    /// Returns a message when the multiplier is below 1, the jitter lies
    /// outside `[0, 1]`, or the initial delay exceeds the maximum.
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            Self::Zero | Self::Constant { .. } => Ok(()),
            Self::Exponential {
                initial_ms,
                max_ms,
                multiplier,
                jitter,
            } => {
                if multiplier.is_nan() || multiplier < 1.0 {
                    return Err(format!("backoff multiplier must be >= 1 (got {multiplier})"));
                }
                if !(0.0..=1.0).contains(&jitter) {
                    return Err(format!("backoff jitter must be within [0, 1] (got {jitter})"));
                }
                if initial_ms > max_ms {
                    return Err(format!(
                        "backoff initial delay {initial_ms}ms exceeds max {max_ms}ms"
                    ));
                }
                Ok(())
            }
        }
    }

    #[must_use]
    pub fn build(&self) -> Box<dyn BackoffPolicy> {
        match *self {
            Self::Zero => Box::new(ZeroBackoff),
            Self::Constant { delay_ms } => {
                Box::new(ConstantBackoff::new(Duration::from_millis(delay_ms)))
            }
            Self::Exponential {
                initial_ms,
                max_ms,
                multiplier,
                jitter,
            } => Box::new(ExponentialBackoff {
                initial: Duration::from_millis(initial_ms),
                max: Duration::from_millis(max_ms),
                multiplier,
                jitter,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Policies
// ---------------------------------------------------------------------------

/// Retries immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroBackoff;

impl BackoffPolicy for ZeroBackoff {
    fn next_delay(&self, _attempt: u32) -> Option<Duration> {
        Some(Duration::ZERO)
    }
}

/// Waits the same delay after every failed attempt.
#[derive(Debug, Clone, Copy)]
pub struct ConstantBackoff {
    delay: Duration,
}

impl ConstantBackoff {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl BackoffPolicy for ConstantBackoff {
    fn next_delay(&self, _attempt: u32) -> Option<Duration> {
        Some(self.delay)
    }
}

/// `initial * multiplier^(attempt - 1)`, randomized by `jitter` and capped at `max`.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
    pub jitter: f64,
}

impl ExponentialBackoff {
    /// Uncapped-then-capped delay in nanoseconds, before jitter.
    #[allow(clippy::cast_precision_loss)]
    fn base_nanos(&self, attempt: u32) -> f64 {
        let exp = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let base = self.initial.as_nanos() as f64 * self.multiplier.powi(exp);
        base.min(self.max.as_nanos() as f64)
    }
}

impl BackoffPolicy for ExponentialBackoff {
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        let base = self.base_nanos(attempt);
        let nanos = if self.jitter > 0.0 && base > 0.0 {
            let delta = base * self.jitter;
            rand::rng().random_range((base - delta)..=(base + delta))
        } else {
            base
        };
        let capped = nanos.clamp(0.0, self.max.as_nanos() as f64);
        Some(Duration::from_nanos(capped.round() as u64))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
