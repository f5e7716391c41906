//! HTTP API endpoints

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub participants: usize,
}

/// Liveness check with the number of joined participants.
///
/// GET /api/health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        participants: state.hub.participant_count().await,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct ParticipantsResponse {
    pub participants: Vec<String>,
}

/// Display names of everyone currently joined, sorted.
///
/// GET /api/participants
pub async fn participants(State(state): State<Arc<AppState>>) -> Json<ParticipantsResponse> {
    Json(ParticipantsResponse {
        participants: state.hub.participants().await,
    })
}
