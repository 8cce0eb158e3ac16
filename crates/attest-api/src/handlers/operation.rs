//! Handlers for `/api/operation` — operating-effectiveness evaluation.
//!
//! Operating evaluation is performed against a completed design session; a
//! save naming a design session that does not exist for the RCM is the one
//! hard precondition failure in the whole API.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/api/operation/{rcm_id}/design-sessions` | Gated |
//! | `POST` | `/api/operation/{rcm_id}/save` | Gated; 404 without the design session |
//! | `GET`  | `/api/operation/sessions/{header_id}/lines` | Owner or admin |

use axum::{
  Json,
  extract::{Path, State},
  http::HeaderMap,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use attest_core::{
  Error as CoreError,
  evaluation::{
    DesignSessionRef, OperationAssessment, OperationLine, OperationLineKey,
  },
  store::ControlStore,
};

use crate::{
  AppState, activity,
  auth::Identity,
  error::ApiError,
  handlers::{ensure_access, require_non_empty},
};

/// `GET /api/operation/{rcm_id}/design-sessions`
pub async fn design_sessions<S>(
  State(state): State<AppState<S>>,
  who: Identity,
  Path(rcm_id): Path<Uuid>,
) -> Result<Json<Vec<DesignSessionRef>>, ApiError>
where
  S: ControlStore + Clone + Send + Sync + 'static,
{
  ensure_access(state.store.as_ref(), &who, rcm_id).await?;
  let sessions = state.store.list_completed_design_sessions(rcm_id).await?;
  Ok(Json(sessions))
}

#[derive(Debug, Deserialize)]
pub struct SaveLineBody {
  pub control_code:    String,
  pub design_session:  String,
  pub evaluation_data: OperationAssessment,
}

#[derive(Debug, Serialize)]
pub struct SaveLineResponse {
  pub success:   bool,
  pub message:   String,
  pub header_id: Uuid,
  pub line_id:   Uuid,
}

/// `POST /api/operation/{rcm_id}/save`
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
  require_non_empty(&body.design_session, "design_session")?;

  let saved = state
    .store
    .save_operation_line(
      OperationLineKey {
        rcm_id,
        user_id:        who.user_id,
        design_session: body.design_session.trim().to_owned(),
        control_code:   body.control_code.trim().to_owned(),
      },
      body.evaluation_data,
    )
    .await?;

  activity::record(
    state.store.as_ref(),
    &who,
    "OPERATION_SAVE",
    format!("saved operating evaluation for {}", body.control_code.trim()),
    "/api/operation/save",
    &headers,
    Some(serde_json::json!({ "rcm_id": rcm_id, "line_id": saved.line_id })),
  )
  .await;

  Ok(Json(SaveLineResponse {
    success:   true,
    message:   "operating evaluation saved".into(),
    header_id: saved.header_id,
    line_id:   saved.line_id,
  }))
}

/// `GET /api/operation/sessions/{header_id}/lines`
pub async fn list_lines<S>(
  State(state): State<AppState<S>>,
  who: Identity,
  Path(header_id): Path<Uuid>,
) -> Result<Json<Vec<OperationLine>>, ApiError>
where
  S: ControlStore + Clone + Send + Sync + 'static,
{
  let header = state
    .store
    .get_operation_header(header_id)
    .await?
    .ok_or(CoreError::HeaderNotFound(header_id))?;

  ensure_access(state.store.as_ref(), &who, header.header.rcm_id).await?;
  if !who.is_admin && header.header.user_id != who.user_id {
    return Err(CoreError::AccessDenied.into());
  }

  Ok(Json(state.store.list_operation_lines(header_id).await?))
}
