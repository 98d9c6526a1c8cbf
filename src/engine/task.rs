//! The life of a single admitted request.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use alloy::primitives::TxHash;

use super::EngineContext;
use crate::admission::AdmissionGuard;
use crate::types::config::pipeline::NodeMode;
use crate::types::request::{short_id, Request};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Admitted,
    WaitingExecution,
    SecurityCheck,
    Fetching,
    Submitting,
    WaitingFulfillment,
    Finalizing,
    Done,
    Rejected,
    Failed,
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Admitted => "admitted",
            Self::WaitingExecution => "waiting_execution",
            Self::SecurityCheck => "security_check",
            Self::Fetching => "fetching",
            Self::Submitting => "submitting",
            Self::WaitingFulfillment => "waiting_fulfillment",
            Self::Finalizing => "finalizing",
            Self::Done => "done",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Why a request left the state machine early.
#[derive(Debug)]
struct Exit {
    terminal: RequestState,
    at: RequestState,
    reason: String,
}

impl Exit {
    fn rejected(at: RequestState, reason: impl fmt::Display) -> Self {
        Self {
            terminal: RequestState::Rejected,
            at,
            reason: reason.to_string(),
        }
    }

    fn failed(at: RequestState, reason: impl fmt::Display) -> Self {
        Self {
            terminal: RequestState::Failed,
            at,
            reason: reason.to_string(),
        }
    }
}

/// Sleep until the absolute unix time `target`. Returns at once if it passed.
pub async fn sleep_until_unix(target: u64) {
    let deadline = UNIX_EPOCH + Duration::from_secs(target);
    if let Ok(remaining) = deadline.duration_since(SystemTime::now()) {
        tokio::time::sleep(remaining).await;
    }
}

/// Drive `request` to a terminal state. The guard keeps the id admitted for
/// as long as this future lives.
///
/// Rejected and failed requests stay admitted and stored until their
/// fulfillment deadline, then are retired, so replays of the same event
/// are not executed again.
pub async fn process(
    ctx: Arc<EngineContext>,
    request: Request,
    _admission: AdmissionGuard,
) -> RequestState {
    let id = short_id(&request.id);
    enter(RequestState::Admitted, &id);

    match drive(&ctx, &request, &id).await {
        Ok(tx_hash) => {
            tracing::info!(request_id = %id, tx = %tx_hash, "Request fulfilled");
            if let Err(e) = ctx.store.remove(request.id).await {
                tracing::error!(request_id = %id, "Could not retire fulfilled request: {}", e);
            }
            RequestState::Done
        }
        Err(exit) => {
            match exit.terminal {
                RequestState::Rejected => tracing::warn!(
                    request_id = %id,
                    state = %exit.at,
                    "Request rejected: {}",
                    exit.reason
                ),
                _ => tracing::error!(
                    request_id = %id,
                    state = %exit.at,
                    "Request failed: {}",
                    exit.reason
                ),
            }

            sleep_until_unix(request.fulfillment_timestamp).await;
            tracing::debug!(request_id = %id, state = %exit.terminal, "Retiring request");
            if let Err(e) = ctx.store.remove(request.id).await {
                tracing::error!(request_id = %id, "Could not retire request: {}", e);
            }
            exit.terminal
        }
    }
}

fn enter(state: RequestState, id: &str) -> RequestState {
    tracing::trace!(request_id = %id, "-> {}", state);
    state
}

async fn drive(ctx: &EngineContext, request: &Request, id: &str) -> Result<TxHash, Exit> {
    let executes = ctx.mode == NodeMode::Oracle && !request.submitted;

    if executes {
        enter(RequestState::WaitingExecution, id);
        sleep_until_unix(request.execution_timestamp).await;

        let state = enter(RequestState::SecurityCheck, id);
        match ctx.filter.validate_url(&request.data_source) {
            Ok(true) => {}
            Ok(false) => return Err(Exit::rejected(state, "data source violates security policy")),
            Err(e) => return Err(Exit::rejected(state, e)),
        }

        let state = enter(RequestState::Fetching, id);
        let result = ctx
            .resolver
            .resolve(&request.data_source, &request.selector)
            .await
            .map_err(|e| Exit::failed(state, e))?;
        tracing::debug!(request_id = %id, result = %result, "Request executed");

        let state = enter(RequestState::Submitting, id);
        let tx_hash = ctx
            .submitter
            .submit_result(request.id, result.to_string())
            .await
            .map_err(|e| Exit::failed(state, e))?;
        tracing::debug!(request_id = %id, tx = %tx_hash, "Result submitted");

        if let Err(e) = ctx.store.mark_submitted(request.id).await {
            tracing::error!(request_id = %id, "Could not record submission: {}", e);
        }
    }

    enter(RequestState::WaitingFulfillment, id);
    sleep_until_unix(request.fulfillment_timestamp).await;

    let state = enter(RequestState::Finalizing, id);
    ctx.submitter
        .finalize(request.id)
        .await
        .map_err(|e| Exit::failed(state, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::request::unix_now;
    use std::time::Instant;

    #[test]
    fn test_state_names() {
        assert_eq!(RequestState::Admitted.to_string(), "admitted");
        assert_eq!(RequestState::WaitingExecution.to_string(), "waiting_execution");
        assert_eq!(RequestState::Done.to_string(), "done");
    }

    #[tokio::test]
    async fn test_past_deadline_does_not_sleep() {
        let started = Instant::now();
        sleep_until_unix(unix_now() - 100).await;
        sleep_until_unix(0).await;
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_sleeps_until_absolute_deadline() {
        let target = unix_now() + 1;
        sleep_until_unix(target).await;
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap();
        assert!(now >= Duration::from_secs(target));
    }
}
