//! JSON HTTP API for Attest.
//!
//! Exposes an axum [`Router`] backed by any
//! [`attest_core::store::ControlStore`]. Every RCM-scoped route calls the
//! access gate before touching data, and identity travels as explicit
//! request state — there is no server-side session.

pub mod activity;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod import;

pub use error::ApiError;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  routing::{delete, get, post},
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use attest_core::store::ControlStore;

use handlers::{design, operation, rcm, users};

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and the
/// `ATTEST_*` environment.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  pub host:       String,
  pub port:       u16,
  pub store_path: PathBuf,
}

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
#[derive(Clone)]
pub struct AppState<S: ControlStore> {
  pub store:  Arc<S>,
  pub config: Arc<ServerConfig>,
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the axum [`Router`] for the Attest API.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: ControlStore + Clone + Send + Sync + 'static,
{
  Router::new()
    // Users (admin only)
    .route("/api/users", get(users::list::<S>).post(users::create::<S>))
    // RCMs
    .route("/api/rcms", get(rcm::list::<S>))
    .route("/api/rcms/import", post(rcm::import::<S>))
    .route(
      "/api/rcms/{id}",
      get(rcm::get_one::<S>).delete(rcm::delete_one::<S>),
    )
    .route("/api/rcms/{id}/status", get(rcm::status::<S>))
    .route("/api/rcms/{id}/grants", post(rcm::grant::<S>))
    .route("/api/rcms/{id}/grants/{user_id}", delete(rcm::revoke::<S>))
    // Design evaluation
    .route(
      "/api/design/{rcm_id}/sessions",
      get(design::list_sessions::<S>).post(design::create_session::<S>),
    )
    .route("/api/design/{rcm_id}/save", post(design::save_line::<S>))
    .route(
      "/api/design/sessions/{header_id}/lines",
      get(design::list_lines::<S>),
    )
    .route(
      "/api/design/sessions/{header_id}/progress",
      post(design::update_progress::<S>),
    )
    .route(
      "/api/design/sessions/{header_id}/complete",
      post(design::complete::<S>),
    )
    // Operating evaluation
    .route(
      "/api/operation/{rcm_id}/design-sessions",
      get(operation::design_sessions::<S>),
    )
    .route("/api/operation/{rcm_id}/save", post(operation::save_line::<S>))
    .route(
      "/api/operation/sessions/{header_id}/lines",
      get(operation::list_lines::<S>),
    )
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

// ─── Integration tests ───────────────────────────────────────────────────────
