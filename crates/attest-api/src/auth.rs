//! HTTP Basic-auth identity extractor.
//!
//! Credentials are an email plus password, verified against the stored
//! argon2 PHC hash. The resolved [`Identity`] is threaded explicitly into
//! handlers; no ambient session state exists anywhere in the API.

use argon2::{
  Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
  password_hash::SaltString,
};
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use chrono::Utc;
use rand_core::OsRng;
use uuid::Uuid;

use attest_core::{Error as CoreError, store::ControlStore};

use crate::{AppState, error::ApiError};

/// The resolved caller of the current request.
#[derive(Debug, Clone)]
pub struct Identity {
  pub user_id:      Uuid,
  pub email:        String,
  pub display_name: String,
  pub is_admin:     bool,
}

impl Identity {
  /// Admin-only endpoints call this before touching anything.
  pub fn require_admin(&self) -> Result<(), ApiError> {
    if self.is_admin {
      Ok(())
    } else {
      Err(CoreError::AccessDenied.into())
    }
  }
}

/// Produce an argon2 PHC string for a new password.
pub fn hash_password(password: &str) -> Result<String, ApiError> {
  let salt = SaltString::generate(&mut OsRng);
  Argon2::default()
    .hash_password(password.as_bytes(), &salt)
    .map(|hash| hash.to_string())
    .map_err(|e| CoreError::storage(format!("argon2 error: {e}")).into())
}

fn decode_basic(header_val: &str) -> Option<(String, String)> {
  let encoded = header_val.strip_prefix("Basic ")?;
  let decoded = B64.decode(encoded).ok()?;
  let creds = std::str::from_utf8(&decoded).ok()?;
  let (email, password) = creds.split_once(':')?;
  Some((email.to_owned(), password.to_owned()))
}

impl<S> FromRequestParts<AppState<S>> for Identity
where
  S: ControlStore + Clone + Send + Sync + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    let header_val = parts
      .headers
      .get(axum::http::header::AUTHORIZATION)
      .and_then(|v| v.to_str().ok())
      .ok_or(ApiError::Unauthorized)?;

    let (email, password) =
      decode_basic(header_val).ok_or(ApiError::Unauthorized)?;

    let creds = state
      .store
      .find_credentials(email)
      .await
      .map_err(ApiError::from)?
      .ok_or(ApiError::Unauthorized)?;

    if !creds.user.is_valid_at(Utc::now()) {
      return Err(ApiError::Unauthorized);
    }

    let parsed_hash = PasswordHash::new(&creds.password_hash)
      .map_err(|_| ApiError::Unauthorized)?;

    Argon2::default()
      .verify_password(password.as_bytes(), &parsed_hash)
      .map_err(|_| ApiError::Unauthorized)?;

    Ok(Identity {
      user_id:      creds.user.user_id,
      email:        creds.user.email,
      display_name: creds.user.display_name,
      is_admin:     creds.user.is_admin,
    })
  }
}
