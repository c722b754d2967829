use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use seals_core::{GameSession, LeaderboardEntry, ProgressDelta, Team, WinnerRecord};
use serde::{Deserialize, Serialize};

use crate::app::App;
use crate::common::ProtocolError;
use crate::service::{CreateSession, JoinSession, Joined, WinnerOutcome};
use crate::util::clamp;

const MAX_LEADERBOARD_LIMIT: usize = 100;

pub fn routes() -> Router<App> {
    Router::new()
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/join", post(join_session))
        .route("/api/sessions/{session_id}", get(get_session))
        .route("/api/sessions/{session_id}/start", post(start_session))
        .route("/api/sessions/{session_id}/pause", post(pause_session))
        .route("/api/sessions/{session_id}/resume", post(resume_session))
        .route("/api/sessions/{session_id}/end", post(end_session))
        .route("/api/sessions/{session_id}/leave", post(leave_session))
        .route(
            "/api/sessions/{session_id}/teams/{team_id}/progress",
            post(report_progress),
        )
        .route("/api/rooms/{room_code}", get(find_room))
        .route("/api/leaderboard", get(leaderboard))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTeamResponse {
    pub session: GameSession,
    pub team: Team,
}

impl From<Joined> for SessionTeamResponse {
    fn from(joined: Joined) -> Self {
        Self {
            session: joined.session,
            team: joined.team,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamRequest {
    pub team_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub session: GameSession,
    pub already_started: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressResponse {
    pub team: Team,
    pub completed: bool,
    /// Final standing decided by this report, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub standing: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<WinnerRecord>,
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<usize>,
}

async fn create_session(
    State(app): State<App>,
    Json(req): Json<CreateSession>,
) -> Result<Json<SessionTeamResponse>, ProtocolError> {
    Ok(Json(app.sessions.create_session(req).await?.into()))
}

async fn join_session(
    State(app): State<App>,
    Json(req): Json<JoinSession>,
) -> Result<Json<SessionTeamResponse>, ProtocolError> {
    Ok(Json(app.sessions.join_session(req).await?.into()))
}

async fn get_session(
    State(app): State<App>,
    Path(session_id): Path<String>,
) -> Result<Json<GameSession>, ProtocolError> {
    Ok(Json(app.sessions.get_session(&session_id).await?))
}

async fn start_session(
    State(app): State<App>,
    Path(session_id): Path<String>,
    Json(req): Json<TeamRequest>,
) -> Result<Json<StartResponse>, ProtocolError> {
    let outcome = app.sessions.start_session(&session_id, &req.team_id).await?;
    Ok(Json(StartResponse {
        session: outcome.session,
        already_started: !outcome.newly_started,
    }))
}

async fn pause_session(
    State(app): State<App>,
    Path(session_id): Path<String>,
    Json(req): Json<TeamRequest>,
) -> Result<Json<GameSession>, ProtocolError> {
    Ok(Json(app.sessions.pause_session(&session_id, &req.team_id).await?))
}

async fn resume_session(
    State(app): State<App>,
    Path(session_id): Path<String>,
    Json(req): Json<TeamRequest>,
) -> Result<Json<GameSession>, ProtocolError> {
    Ok(Json(app.sessions.resume_session(&session_id, &req.team_id).await?))
}

async fn end_session(
    State(app): State<App>,
    Path(session_id): Path<String>,
    Json(req): Json<TeamRequest>,
) -> Result<Json<GameSession>, ProtocolError> {
    Ok(Json(app.sessions.end_session(&session_id, &req.team_id).await?))
}

async fn leave_session(
    State(app): State<App>,
    Path(session_id): Path<String>,
    Json(req): Json<TeamRequest>,
) -> Result<Json<GameSession>, ProtocolError> {
    Ok(Json(app.sessions.leave_session(&session_id, &req.team_id).await?))
}

async fn report_progress(
    State(app): State<App>,
    Path((session_id, team_id)): Path<(String, String)>,
    Json(delta): Json<ProgressDelta>,
) -> Result<Json<ProgressResponse>, ProtocolError> {
    let receipt = app.progress.commit(&session_id, &team_id, &delta).await?;
    let (standing, winner) = match receipt.winner {
        Some(WinnerOutcome::Won(record)) => (Some("winner"), Some(record)),
        Some(WinnerOutcome::RaceLost { winner }) => (Some("completed"), Some(winner)),
        Some(WinnerOutcome::NoContest) => (Some("completed"), None),
        Some(WinnerOutcome::Deferred) => (Some("deferred"), None),
        Some(WinnerOutcome::AlreadyRecorded | WinnerOutcome::Incomplete) | None => (None, None),
    };
    Ok(Json(ProgressResponse {
        team: receipt.team,
        completed: receipt.completed,
        standing,
        winner,
    }))
}

async fn find_room(
    State(app): State<App>,
    Path(room_code): Path<String>,
) -> Result<Json<GameSession>, ProtocolError> {
    Ok(Json(app.sessions.find_session_by_room_code(&room_code).await?))
}

async fn leaderboard(
    State(app): State<App>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<Vec<LeaderboardEntry>>, ProtocolError> {
    let limit = clamp(
        query.limit.unwrap_or(app.config.leaderboard_limit),
        &(1..=MAX_LEADERBOARD_LIMIT),
    );
    Ok(Json(app.leaderboard.top(limit).await?))
}
