// ============================
// crates/backend-lib/src/handlers/meeting.rs
// ============================
//! Meeting creation and lookup, used by clients before they open the
//! signaling socket.
use crate::{error::AppError, AppState};
use axum::{
    extract::{Query, State},
    Json,
};
use meeting_relay_common::{MeetingInfo, StartMeetingRequest, StartMeetingResponse};
use serde::Deserialize;
use std::sync::Arc;

/// Query of `GET /meeting/join`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinParams {
    pub meeting_id: String,
}

/// `POST /meeting/start`
pub async fn start_meeting(
    State(state): State<Arc<AppState>>,
    Json(body): Json<StartMeetingRequest>,
) -> Json<StartMeetingResponse> {
    let meeting_id = state.registry.create_meeting(&body.name, &body.user_id);
    Json(StartMeetingResponse { meeting_id })
}

/// `GET /meeting/join?meetingId=...`
pub async fn join_meeting(
    State(state): State<Arc<AppState>>,
    Query(params): Query<JoinParams>,
) -> Result<Json<MeetingInfo>, AppError> {
    state.registry.get_metadata(&params.meeting_id).map(Json)
}

/// `GET /echo`
pub async fn echo() -> &'static str {
    "Echo From server"
}

/// `GET /health`
pub async fn health() -> &'static str {
    "Healthy"
}
