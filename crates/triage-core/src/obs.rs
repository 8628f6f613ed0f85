//! Structured observability hooks for triage run lifecycle events.
//!
//! This module provides:
//! - Run and node spans for use with [`tracing::Instrument`]
//! - Emission functions for key lifecycle events: run start, node finish,
//!   routing decision, degraded fetch, rejected match, run finish
//!
//! Events are emitted at `info!` level, failures at `warn!`. Filtering goes
//! through `RUST_LOG` or `TRIAGE_LOG`; see [`crate::telemetry`].

use tracing::{info, warn};

use crate::domain::Source;
use crate::routing::Transition;

/// Span covering one run. Attach with `.instrument(run_span(..))`; the run
/// future crosses awaits, so an entered guard cannot be held across it.
pub fn run_span(run_id: &str, ticket_id: &str) -> tracing::Span {
    tracing::info_span!("triage.run", run_id = %run_id, ticket_id = %ticket_id)
}

/// Span covering one node execution, including fan-out branches.
pub fn node_span(run_id: &str, node: &str) -> tracing::Span {
    tracing::debug_span!("triage.node", run_id = %run_id, node = %node)
}

/// Emit event: run started for a ticket.
///
/// ```ignore
/// emit_run_started("3f2c…", "TKT-101");
/// // logs: event=run.started run_id=3f2c… ticket_id=TKT-101
/// ```
pub fn emit_run_started(run_id: &str, ticket_id: &str) {
    info!(event = "run.started", run_id = %run_id, ticket_id = %ticket_id);
}

/// Emit event: a node returned and its delta was merged.
pub fn emit_node_finished(run_id: &str, node: &str, duration_ms: u64, errored: bool) {
    info!(
        event = "node.finished",
        run_id = %run_id,
        node = %node,
        duration_ms = duration_ms,
        errored = errored,
    );
}

/// Emit event: the routing policy picked a transition.
pub fn emit_route_decided(run_id: &str, attempt: u32, confidence: f64, transition: &Transition) {
    info!(
        event = "route.decided",
        run_id = %run_id,
        attempt = attempt,
        confidence = confidence,
        transition = %transition,
    );
}

/// Emit event: a fetch branch failed and the round continues without it.
pub fn emit_fetch_degraded(run_id: &str, source: Source, error: &dyn std::fmt::Display) {
    warn!(event = "fetch.degraded", run_id = %run_id, source = %source, error = %error);
}

/// Emit event: a correlation match referenced data that was never fetched.
pub fn emit_match_rejected(run_id: &str, claimed: &str) {
    warn!(event = "correlation.match_rejected", run_id = %run_id, claimed = %claimed);
}

/// Emit event: run finished with duration, node count, and outcome.
pub fn emit_run_finished(
    run_id: &str,
    duration_ms: u64,
    nodes_run: usize,
    errors: usize,
    complete: bool,
) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        nodes_run = nodes_run,
        errors = errors,
        complete = complete,
    );
}

/// Emit event: the run ended on a structural error (warning level).
pub fn emit_run_fatal(run_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "run.fatal", run_id = %run_id, error = %error);
}
