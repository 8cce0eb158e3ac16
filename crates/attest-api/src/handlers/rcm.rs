//! Handlers for `/api/rcms` — listing, inspection, import, deletion, grants.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`    | `/api/rcms` | Optional `?category=ELC\|TLC\|ITGC` |
//! | `POST`   | `/api/rcms/import` | Admin; body: [`ImportBody`] |
//! | `GET`    | `/api/rcms/{id}` | Gated; RCM info + controls |
//! | `GET`    | `/api/rcms/{id}/status` | Gated; progress summary |
//! | `DELETE` | `/api/rcms/{id}` | Admin; soft delete |
//! | `POST`   | `/api/rcms/{id}/grants` | Admin; body: [`GrantBody`] |
//! | `DELETE` | `/api/rcms/{id}/grants/{user_id}` | Admin; soft revoke |

use std::collections::BTreeMap;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::HeaderMap,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use attest_core::{
  Error as CoreError,
  rcm::{
    Control, ControlCategory, NewGrant, NewRcm, PermissionType, Rcm,
    RcmSummary,
  },
  store::ControlStore,
};
use attest_sheet::{Sheet, auto_map_headers};

use crate::{
  AppState, activity,
  auth::Identity,
  error::ApiError,
  handlers::{ensure_access, require_non_empty},
  import::{self, IntegratedImport},
};

// ─── List ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub category: Option<ControlCategory>,
}

/// `GET /api/rcms[?category=<category>]`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  who: Identity,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<RcmSummary>>, ApiError>
where
  S: ControlStore + Clone + Send + Sync + 'static,
{
  let rcms = state
    .store
    .list_rcms_for(who.user_id, params.category)
    .await?;
  Ok(Json(rcms))
}

// ─── Get one ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct RcmDetailResponse {
  #[serde(flatten)]
  pub rcm:      Rcm,
  pub controls: Vec<Control>,
}

/// `GET /api/rcms/{id}`
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  who: Identity,
  Path(id): Path<Uuid>,
) -> Result<Json<RcmDetailResponse>, ApiError>
where
  S: ControlStore + Clone + Send + Sync + 'static,
{
  ensure_access(state.store.as_ref(), &who, id).await?;

  let rcm = state
    .store
    .get_rcm(id)
    .await?
    .ok_or(CoreError::RcmNotFound(id))?;
  let controls = state.store.list_controls(id).await?;

  Ok(Json(RcmDetailResponse { rcm, controls }))
}

// ─── Status ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct RcmStatusResponse {
  pub success:        bool,
  pub rcm_id:         Uuid,
  pub name:           String,
  pub category:       ControlCategory,
  pub total_controls: u32,
  pub uploaded_at:    DateTime<Utc>,
  pub completed_at:   Option<DateTime<Utc>>,
}

/// `GET /api/rcms/{id}/status`
pub async fn status<S>(
  State(state): State<AppState<S>>,
  who: Identity,
  Path(id): Path<Uuid>,
) -> Result<Json<RcmStatusResponse>, ApiError>
where
  S: ControlStore + Clone + Send + Sync + 'static,
{
  ensure_access(state.store.as_ref(), &who, id).await?;

  let rcm = state
    .store
    .get_rcm(id)
    .await?
    .ok_or(CoreError::RcmNotFound(id))?;
  let total_controls = state.store.control_count(id).await?;

  Ok(Json(RcmStatusResponse {
    success: true,
    rcm_id: rcm.rcm_id,
    name: rcm.name,
    category: rcm.category,
    total_controls,
    uploaded_at: rcm.uploaded_at,
    completed_at: rcm.completed_at,
  }))
}

// ─── Import ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
  Individual,
  Integrated,
}

#[derive(Debug, Deserialize)]
pub struct ImportBody {
  pub mode:            ImportMode,
  pub rcm_name:        String,
  /// Required in individual mode; ignored in integrated mode.
  pub category:        Option<ControlCategory>,
  pub description:     Option<String>,
  pub target_user_id:  Uuid,
  pub source_filename: Option<String>,
  pub sheet:           Sheet,
}

#[derive(Debug, Serialize)]
pub struct ImportResponse {
  pub success:        bool,
  pub message:        String,
  /// The created RCM in individual mode; the first created RCM otherwise.
  pub rcm_id:         Option<Uuid>,
  pub rcm_ids:        BTreeMap<ControlCategory, Uuid>,
  pub controls_count: usize,
}

/// `POST /api/rcms/import`
pub async fn import<S>(
  State(state): State<AppState<S>>,
  who: Identity,
  headers: HeaderMap,
  Json(body): Json<ImportBody>,
) -> Result<Json<ImportResponse>, ApiError>
where
  S: ControlStore + Clone + Send + Sync + 'static,
{
  who.require_admin()?;
  require_non_empty(&body.rcm_name, "rcm_name")?;

  let store = state.store.as_ref();

  // The designated grant target must be a real user before anything commits.
  store
    .get_user(body.target_user_id)
    .await?
    .ok_or(CoreError::UserNotFound(body.target_user_id))?;

  let mapping = auto_map_headers(body.sheet.headers());

  let response = match body.mode {
    ImportMode::Individual => {
      let category = body.category.ok_or_else(|| {
        CoreError::Validation("category is required for individual import".into())
      })?;

      let rcm = store
        .create_rcm(NewRcm {
          name:            body.rcm_name.trim().to_owned(),
          category,
          description:     body.description.clone(),
          uploaded_by:     who.user_id,
          source_filename: body.source_filename.clone(),
        })
        .await?;

      let count = import::import_single(
        store,
        rcm.rcm_id,
        body.target_user_id,
        who.user_id,
        &body.sheet,
        &mapping,
      )
      .await?;

      ImportResponse {
        success:        true,
        message:        format!("rcm imported with {count} controls"),
        rcm_id:         Some(rcm.rcm_id),
        rcm_ids:        BTreeMap::from([(category, rcm.rcm_id)]),
        controls_count: count,
      }
    }

    ImportMode::Integrated => {
      let outcome = import::import_integrated(
        store,
        IntegratedImport {
          base_name:       body.rcm_name.trim().to_owned(),
          description:     body.description.clone(),
          uploaded_by:     who.user_id,
          target_user:     body.target_user_id,
          source_filename: body.source_filename.clone(),
        },
        &body.sheet,
        &mapping,
      )
      .await?;

      ImportResponse {
        success:        true,
        message:        format!(
          "rcm imported across {} categories with {} controls",
          outcome.rcm_ids.len(),
          outcome.controls_count
        ),
        rcm_id:         outcome.rcm_ids.values().next().copied(),
        rcm_ids:        outcome.rcm_ids,
        controls_count: outcome.controls_count,
      }
    }
  };

  activity::record(
    store,
    &who,
    "RCM_IMPORT",
    format!("imported rcm {}", body.rcm_name.trim()),
    "/api/rcms/import",
    &headers,
    Some(serde_json::json!({
      "rcm_ids": &response.rcm_ids,
      "controls_count": response.controls_count,
    })),
  )
  .await;

  Ok(Json(response))
}

// ─── Delete ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ActionResponse {
  pub success: bool,
  pub message: String,
}

/// `DELETE /api/rcms/{id}` — soft delete.
pub async fn delete_one<S>(
  State(state): State<AppState<S>>,
  who: Identity,
  headers: HeaderMap,
  Path(id): Path<Uuid>,
) -> Result<Json<ActionResponse>, ApiError>
where
  S: ControlStore + Clone + Send + Sync + 'static,
{
  who.require_admin()?;
  state.store.deactivate_rcm(id).await?;

  activity::record(
    state.store.as_ref(),
    &who,
    "RCM_DELETE",
    format!("deactivated rcm {id}"),
    "/api/rcms",
    &headers,
    Some(serde_json::json!({ "rcm_id": id })),
  )
  .await;

  Ok(Json(ActionResponse {
    success: true,
    message: "rcm deactivated".into(),
  }))
}

// ─── Grants ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct GrantBody {
  pub user_id:    Uuid,
  #[serde(default = "default_permission")]
  pub permission: PermissionType,
}

fn default_permission() -> PermissionType { PermissionType::Read }

/// `POST /api/rcms/{id}/grants` — idempotent grant.
pub async fn grant<S>(
  State(state): State<AppState<S>>,
  who: Identity,
  headers: HeaderMap,
  Path(id): Path<Uuid>,
  Json(body): Json<GrantBody>,
) -> Result<Json<ActionResponse>, ApiError>
where
  S: ControlStore + Clone + Send + Sync + 'static,
{
  who.require_admin()?;

  let store = state.store.as_ref();
  store.get_rcm(id).await?.ok_or(CoreError::RcmNotFound(id))?;
  store
    .get_user(body.user_id)
    .await?
    .ok_or(CoreError::UserNotFound(body.user_id))?;

  store
    .grant_access(NewGrant {
      user_id:    body.user_id,
      rcm_id:     id,
      permission: body.permission,
      granted_by: who.user_id,
    })
    .await?;

  activity::record(
    store,
    &who,
    "RCM_GRANT",
    format!("granted rcm {id} to user {}", body.user_id),
    "/api/rcms",
    &headers,
    None,
  )
  .await;

  Ok(Json(ActionResponse { success: true, message: "access granted".into() }))
}

/// `DELETE /api/rcms/{id}/grants/{user_id}` — soft revoke.
pub async fn revoke<S>(
  State(state): State<AppState<S>>,
  who: Identity,
  headers: HeaderMap,
  Path((id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ActionResponse>, ApiError>
where
  S: ControlStore + Clone + Send + Sync + 'static,
{
  who.require_admin()?;
  state.store.revoke_access(user_id, id).await?;

  activity::record(
    state.store.as_ref(),
    &who,
    "RCM_REVOKE",
    format!("revoked rcm {id} from user {user_id}"),
    "/api/rcms",
    &headers,
    None,
  )
  .await;

  Ok(Json(ActionResponse { success: true, message: "access revoked".into() }))
}
