//! Request handlers, grouped the way the routes are mounted.

pub mod design;
pub mod operation;
pub mod rcm;
pub mod users;

use uuid::Uuid;

use attest_core::{Error as CoreError, store::ControlStore};

use crate::{auth::Identity, error::ApiError};

/// The server-side gate: every RCM-scoped handler calls this before touching
/// data. Denial reveals nothing about the RCM, not even whether it exists.
pub async fn ensure_access<S: ControlStore>(
  store: &S,
  who: &Identity,
  rcm_id: Uuid,
) -> Result<(), ApiError> {
  if store.has_access(who.user_id, rcm_id).await? {
    Ok(())
  } else {
    Err(CoreError::AccessDenied.into())
  }
}

/// Reject blank required strings with a uniform validation error.
pub fn require_non_empty(value: &str, field: &str) -> Result<(), ApiError> {
  if value.trim().is_empty() {
    Err(CoreError::Validation(format!("{field} is required")).into())
  } else {
    Ok(())
  }
}
