//! Handlers for `/api/users` — admin-only user management.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/api/users` | Active users, validity-window filtered |
//! | `POST` | `/api/users` | Body: [`CreateUserBody`]; hashes the password |

use axum::{Json, extract::State, http::HeaderMap};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use attest_core::{store::ControlStore, user::{NewUser, User}};

use crate::{
  AppState, activity,
  auth::{Identity, hash_password},
  error::ApiError,
  handlers::require_non_empty,
};

/// `GET /api/users`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  who: Identity,
) -> Result<Json<Vec<User>>, ApiError>
where
  S: ControlStore + Clone + Send + Sync + 'static,
{
  who.require_admin()?;
  Ok(Json(state.store.list_active_users().await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateUserBody {
  pub email:        String,
  pub display_name: String,
  #[serde(default)]
  pub company:      String,
  pub password:     String,
  #[serde(default)]
  pub is_admin:     bool,
  pub expires_at:   Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct CreateUserResponse {
  pub success: bool,
  pub message: String,
  pub user_id: Uuid,
}

/// `POST /api/users`
pub async fn create<S>(
  State(state): State<AppState<S>>,
  who: Identity,
  headers: HeaderMap,
  Json(body): Json<CreateUserBody>,
) -> Result<Json<CreateUserResponse>, ApiError>
where
  S: ControlStore + Clone + Send + Sync + 'static,
{
  who.require_admin()?;
  require_non_empty(&body.email, "email")?;
  require_non_empty(&body.display_name, "display_name")?;
  require_non_empty(&body.password, "password")?;

  let user = state
    .store
    .add_user(NewUser {
      email:         body.email.trim().to_owned(),
      display_name:  body.display_name,
      company:       body.company,
      password_hash: hash_password(&body.password)?,
      is_admin:      body.is_admin,
      expires_at:    body.expires_at,
    })
    .await?;

  activity::record(
    state.store.as_ref(),
    &who,
    "USER_CREATE",
    format!("created user {}", user.email),
    "/api/users",
    &headers,
    Some(serde_json::json!({ "user_id": user.user_id })),
  )
  .await;

  Ok(Json(CreateUserResponse {
    success: true,
    message: "user created".into(),
    user_id: user.user_id,
  }))
}
