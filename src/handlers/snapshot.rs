//! Snapshot endpoint handler.
//!
//! Serves the aggregator's last published `(connection_state, history,
//! aggregates)` triple as JSON. Reads never block the ingestion path.

use axum::{extract::State, Json};
use sysmon_stream::EngineSnapshot;
use tracing::{debug, instrument};

use crate::state::SharedState;

/// Handler for the /snapshot endpoint.
#[instrument(skip(state))]
pub async fn snapshot_handler(State(state): State<SharedState>) -> Json<EngineSnapshot> {
    let snapshot = state.aggregator.snapshot();
    debug!(
        samples = snapshot.history.len(),
        state = %snapshot.connection_state,
        "Processing /snapshot request"
    );
    Json(EngineSnapshot::clone(&snapshot))
}
