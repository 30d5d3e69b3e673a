//! Nested retry loop around the rest of the chain.
//!
//! A call runs up to `switch_rounds + 1` rounds. Each round selects an
//! endpoint afresh and then makes up to `same_attempts + 1` attempts against
//! it, waiting on the backoff policy between attempts that failed. The first
//! successful attempt ends the whole sequence, and a failed selection ends it
//! with the selection error.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use waypoint_core::{BackoffPolicy, CallContext, ConfigProvider, InvocationError, Response};

use super::endpoint::EndpointSelector;
use crate::chain::Chain;

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Retry limits for one (source, target) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    /// Extra rounds, each on a freshly selected instance.
    pub switch_rounds: u32,
    /// Extra attempts on the same instance within one round.
    pub same_attempts: u32,
}

impl RetryPolicy {
    #[must_use]
    pub fn new(switch_rounds: u32, same_attempts: u32) -> Self {
        Self {
            switch_rounds,
            same_attempts,
        }
    }

    #[must_use]
    pub fn from_config(config: &dyn ConfigProvider, source: &str, target: &str) -> Self {
        Self::new(
            config.retry_on_next(source, target),
            config.retry_on_same(source, target),
        )
    }

    #[must_use]
    pub fn rounds(&self) -> u32 {
        self.switch_rounds.saturating_add(1)
    }

    #[must_use]
    pub fn attempts_per_round(&self) -> u32 {
        self.same_attempts.saturating_add(1)
    }

    /// Worst-case number of chain advances for one call.
    #[must_use]
    pub fn max_attempts(&self) -> u64 {
        u64::from(self.rounds()) * u64::from(self.attempts_per_round())
    }
}

// ---------------------------------------------------------------------------
// RetryState
// ---------------------------------------------------------------------------

/// How a round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoundOutcome {
    Succeeded,
    Exhausted,
    Cancelled,
}

/// Progress of one call through its rounds and attempts.
#[derive(Debug)]
struct RetryState {
    policy: RetryPolicy,
    /// Rounds started so far.
    round: u32,
    /// Attempts made in the current round.
    attempt: u32,
    /// Attempts made across all rounds.
    total_attempts: u32,
    last_response: Option<Response>,
}

impl RetryState {
    fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            round: 0,
            attempt: 0,
            total_attempts: 0,
            last_response: None,
        }
    }

    /// Starts the next round, or returns `false` when none is left.
    fn start_round(&mut self) -> bool {
        if self.round >= self.policy.rounds() {
            return false;
        }
        self.round += 1;
        self.attempt = 0;
        true
    }

    fn round_exhausted(&self) -> bool {
        self.attempt >= self.policy.attempts_per_round()
    }

    fn start_attempt(&mut self) {
        self.attempt += 1;
        self.total_attempts += 1;
    }

    /// Keeps `response` as the latest one. Returns `true` if it succeeded.
    fn record(&mut self, response: Response) -> bool {
        let ok = response.is_ok();
        self.last_response = Some(response);
        ok
    }

    fn last_error(&self) -> Option<&InvocationError> {
        self.last_response.as_ref().and_then(Response::error)
    }

    /// The final response: the last one captured, or an empty one.
    fn finish(self) -> Response {
        self.last_response.unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// RetryOrchestrator
// ---------------------------------------------------------------------------

/// Drives selection and the chain through the retry rounds of one call.
#[derive(Clone)]
pub struct RetryOrchestrator {
    selector: EndpointSelector,
}

impl RetryOrchestrator {
    #[must_use]
    pub fn new(selector: EndpointSelector) -> Self {
        Self { selector }
    }

    /// Runs the call to completion and returns its single response.
    ///
    /// The chain position on entry is replayed by every attempt.
    pub async fn run(
        &self,
        chain: &mut Chain,
        ctx: &mut CallContext,
        policy: RetryPolicy,
        backoff: &dyn BackoffPolicy,
    ) -> Response {
        let start = chain.position();
        let mut state = RetryState::new(policy);

        while state.start_round() {
            if ctx.is_cancelled() {
                return Response::from_error(InvocationError::Cancelled);
            }

            let endpoint = match self.selector.select(ctx) {
                Ok(endpoint) => endpoint,
                Err(err) => {
                    tracing::warn!(
                        source = %ctx.source_service,
                        target_service = %ctx.target_service,
                        round = state.round,
                        error = %err,
                        "selection failed, abandoning retries"
                    );
                    return Response::from_error(err);
                }
            };
            if state.round > 1 {
                metrics::counter!(
                    "waypoint_lb_retry_rounds_total",
                    "target" => ctx.target_service.clone()
                )
                .increment(1);
            }

            match run_round(chain, ctx, start, &endpoint, &mut state, backoff).await {
                RoundOutcome::Succeeded => break,
                RoundOutcome::Cancelled => {
                    return Response::from_error(InvocationError::Cancelled);
                }
                RoundOutcome::Exhausted => {
                    let marker = InvocationError::RetryExhausted {
                        attempts: state.attempt,
                    };
                    tracing::warn!(
                        source = %ctx.source_service,
                        target_service = %ctx.target_service,
                        round = state.round,
                        endpoint = %endpoint,
                        last_error = ?state.last_error().map(ToString::to_string),
                        "{marker}"
                    );
                    self.selector.release_session(ctx);
                }
            }
        }

        tracing::debug!(
            target_service = %ctx.target_service,
            rounds = state.round,
            attempts = state.total_attempts,
            "retry sequence finished"
        );
        state.finish()
    }
}

/// Attempts against one endpoint until success, exhaustion or cancellation.
async fn run_round(
    chain: &mut Chain,
    ctx: &mut CallContext,
    start: usize,
    endpoint: &str,
    state: &mut RetryState,
    backoff: &dyn BackoffPolicy,
) -> RoundOutcome {
    let cancel = ctx.cancel.clone();
    loop {
        if state.round_exhausted() {
            return RoundOutcome::Exhausted;
        }
        if cancel.is_cancelled() {
            return RoundOutcome::Cancelled;
        }

        state.start_attempt();
        metrics::counter!("waypoint_lb_attempts_total", "target" => ctx.target_service.clone())
            .increment(1);
        chain.reset_to(start);
        ctx.endpoint = endpoint.to_string();
        let response = chain.next(ctx).await;

        if let Some(err) = response.error() {
            tracing::debug!(
                target_service = %ctx.target_service,
                round = state.round,
                attempt = state.attempt,
                endpoint,
                error = %err,
                "attempt failed"
            );
        }
        if state.record(response) {
            return RoundOutcome::Succeeded;
        }
        if state.round_exhausted() {
            return RoundOutcome::Exhausted;
        }

        let Some(delay) = backoff.next_delay(state.attempt) else {
            return RoundOutcome::Exhausted;
        };
        if !wait(delay, &cancel).await {
            return RoundOutcome::Cancelled;
        }
    }
}

/// Sleeps for `delay`. Returns `false` if the call was cancelled meanwhile.
async fn wait(delay: Duration, cancel: &CancellationToken) -> bool {
    if delay.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        () = tokio::time::sleep(delay) => true,
        () = cancel.cancelled() => false,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
