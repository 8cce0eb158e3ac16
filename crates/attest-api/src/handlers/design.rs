//! Handlers for `/api/design` — design-effectiveness evaluation sessions.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/api/design/{rcm_id}/sessions` | Gated; own sessions (all for admins) |
//! | `POST` | `/api/design/{rcm_id}/sessions` | Gated; 409 on duplicate name |
//! | `POST` | `/api/design/{rcm_id}/save` | Gated; lazy header creation |
//! | `GET`  | `/api/design/sessions/{header_id}/lines` | Owner or admin |
//! | `POST` | `/api/design/sessions/{header_id}/progress` | Owner or admin |
//! | `POST` | `/api/design/sessions/{header_id}/complete` | Owner or admin |

use axum::{
  Json,
  extract::{Path, State},
  http::HeaderMap,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use attest_core::{
  Error as CoreError,
  evaluation::{DesignAssessment, DesignLine, DesignLineKey, EvaluationHeader},
  store::ControlStore,
};

use crate::{
  AppState, activity,
  auth::Identity,
  error::ApiError,
  handlers::{ensure_access, require_non_empty},
};

/// Load a design header and check both the RCM gate and ownership: members
/// may only touch their own sessions, admins any.
async fn owned_header<S: ControlStore>(
  store: &S,
  who: &Identity,
  header_id: Uuid,
) -> Result<EvaluationHeader, ApiError> {
  let header = store
    .get_design_header(header_id)
    .await?
    .ok_or(CoreError::HeaderNotFound(header_id))?;

  ensure_access(store, who, header.rcm_id).await?;
  if !who.is_admin && header.user_id != who.user_id {
    return Err(CoreError::AccessDenied.into());
  }

  Ok(header)
}

// ─── Sessions ────────────────────────────────────────────────────────────────

/// `GET /api/design/{rcm_id}/sessions`
pub async fn list_sessions<S>(
  State(state): State<AppState<S>>,
  who: Identity,
  Path(rcm_id): Path<Uuid>,
) -> Result<Json<Vec<EvaluationHeader>>, ApiError>
where
  S: ControlStore + Clone + Send + Sync + 'static,
{
  ensure_access(state.store.as_ref(), &who, rcm_id).await?;
  let sessions = state
    .store
    .list_design_sessions(rcm_id, who.user_id)
    .await?;
  Ok(Json(sessions))
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionBody {
  pub session_name: String,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
  pub success:   bool,
  pub message:   String,
  pub header_id: Uuid,
}

/// `POST /api/design/{rcm_id}/sessions`
pub async fn create_session<S>(
  State(state): State<AppState<S>>,
  who: Identity,
  headers: HeaderMap,
  Path(rcm_id): Path<Uuid>,
  Json(body): Json<CreateSessionBody>,
) -> Result<Json<CreateSessionResponse>, ApiError>
where
  S: ControlStore + Clone + Send + Sync + 'static,
{
  ensure_access(state.store.as_ref(), &who, rcm_id).await?;
  require_non_empty(&body.session_name, "session_name")?;

  let header = state
    .store
    .create_design_session(rcm_id, who.user_id, body.session_name.trim().to_owned())
    .await?;

  activity::record(
    state.store.as_ref(),
    &who,
    "DESIGN_SESSION_CREATE",
    format!("created design session {}", header.session_name),
    "/api/design/sessions",
    &headers,
    Some(serde_json::json!({ "rcm_id": rcm_id, "header_id": header.header_id })),
  )
  .await;

  Ok(Json(CreateSessionResponse {
    success:   true,
    message:   "evaluation session created".into(),
    header_id: header.header_id,
  }))
}

// ─── Line saves ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SaveLineBody {
  pub control_code:       String,
  pub evaluation_session: String,
  pub evaluation_data:    DesignAssessment,
}

#[derive(Debug, Serialize)]
pub struct SaveLineResponse {
  pub success:   bool,
  pub message:   String,
  pub header_id: Uuid,
  pub line_id:   Uuid,
}

/// `POST /api/design/{rcm_id}/save`
pub async fn save_line<S>(
  State(state): State<AppState<S>>,
  who: Identity,
  headers: HeaderMap,
  Path(rcm_id): Path<Uuid>,
  Json(body): Json<SaveLineBody>,
) -> Result<Json<SaveLineResponse>, ApiError>
where
  S: ControlStore + Clone + Send + Sync + 'static,
{
  ensure_access(state.store.as_ref(), &who, rcm_id).await?;
  require_non_empty(&body.control_code, "control_code")?;
  require_non_empty(&body.evaluation_session, "evaluation_session")?;

  let saved = state
    .store
    .save_design_line(
      DesignLineKey {
        rcm_id,
        user_id:      who.user_id,
        session_name: body.evaluation_session.trim().to_owned(),
        control_code: body.control_code.trim().to_owned(),
      },
      body.evaluation_data,
    )
    .await?;

  activity::record(
    state.store.as_ref(),
    &who,
    "DESIGN_SAVE",
    format!("saved design evaluation for {}", body.control_code.trim()),
    "/api/design/save",
    &headers,
    Some(serde_json::json!({ "rcm_id": rcm_id, "line_id": saved.line_id })),
  )
  .await;

  Ok(Json(SaveLineResponse {
    success:   true,
    message:   "design evaluation saved".into(),
    header_id: saved.header_id,
    line_id:   saved.line_id,
  }))
}

/// `GET /api/design/sessions/{header_id}/lines`
pub async fn list_lines<S>(
  State(state): State<AppState<S>>,
  who: Identity,
  Path(header_id): Path<Uuid>,
) -> Result<Json<Vec<DesignLine>>, ApiError>
where
  S: ControlStore + Clone + Send + Sync + 'static,
{
  owned_header(state.store.as_ref(), &who, header_id).await?;
  Ok(Json(state.store.list_design_lines(header_id).await?))
}

// ─── Progress & completion ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ProgressBody {
  pub evaluated_controls: u32,
  pub progress_pct:       f64,
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
  pub success: bool,
  pub message: String,
}

/// `POST /api/design/sessions/{header_id}/progress`
///
/// The counters are caller-maintained by design; the server never derives
/// them from line counts.
pub async fn update_progress<S>(
  State(state): State<AppState<S>>,
  who: Identity,
  Path(header_id): Path<Uuid>,
  Json(body): Json<ProgressBody>,
) -> Result<Json<ActionResponse>, ApiError>
where
  S: ControlStore + Clone + Send + Sync + 'static,
{
  owned_header(state.store.as_ref(), &who, header_id).await?;
  state
    .store
    .update_design_progress(header_id, body.evaluated_controls, body.progress_pct)
    .await?;

  Ok(Json(ActionResponse { success: true, message: "progress updated".into() }))
}

/// `POST /api/design/sessions/{header_id}/complete`
pub async fn complete<S>(
  State(state): State<AppState<S>>,
  who: Identity,
  headers: HeaderMap,
  Path(header_id): Path<Uuid>,
) -> Result<Json<ActionResponse>, ApiError>
where
  S: ControlStore + Clone + Send + Sync + 'static,
{
  let header = owned_header(state.store.as_ref(), &who, header_id).await?;
  state.store.complete_design_session(header_id).await?;

  activity::record(
    state.store.as_ref(),
    &who,
    "DESIGN_SESSION_COMPLETE",
    format!("completed design session {}", header.session_name),
    "/api/design/sessions",
    &headers,
    Some(serde_json::json!({ "header_id": header_id })),
  )
  .await;

  Ok(Json(ActionResponse { success: true, message: "session completed".into() }))
}
