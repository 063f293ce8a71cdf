use axum::{extract::State, Json};

use crate::presence::Participant;
use crate::AppState;

/// GET /users returns the participants currently in the room, ordered by connection id.
pub async fn get_users(State(state): State<AppState>) -> Json<Vec<Participant>> {
    Json(state.presence.snapshot())
}
