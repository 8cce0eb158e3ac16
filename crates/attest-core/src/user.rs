//! User records and the identity inputs the store accepts.
//!
//! Passwords never appear in plain text here: callers hash before building a
//! [`NewUser`], and reads that need the hash go through [`UserCredentials`]
//! so an ordinary [`User`] can be serialised to clients safely.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered user. The admin flag grants unconditional access to every
/// RCM, independent of explicit grants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
  pub user_id:       Uuid,
  pub email:         String,
  pub display_name:  String,
  pub company:       String,
  pub is_admin:      bool,
  pub created_at:    DateTime<Utc>,
  /// End of the account's validity window; `None` means open-ended.
  pub expires_at:    Option<DateTime<Utc>>,
  pub last_login_at: Option<DateTime<Utc>>,
}

impl User {
  /// Whether the account is inside its validity window at `now`.
  pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
    self.expires_at.is_none_or(|end| end > now)
  }
}

/// A user bundled with their stored password hash (argon2 PHC string).
/// Returned only by credential lookups; never serialised to clients.
#[derive(Debug, Clone)]
pub struct UserCredentials {
  pub user:          User,
  pub password_hash: String,
}

/// Input to [`crate::store::ControlStore::add_user`].
/// `created_at` is always set by the store; it is not accepted from callers.
#[derive(Debug, Clone)]
pub struct NewUser {
  pub email:         String,
  pub display_name:  String,
  pub company:       String,
  /// argon2 PHC string, e.g. `$argon2id$v=19$…`
  pub password_hash: String,
  pub is_admin:      bool,
  pub expires_at:    Option<DateTime<Utc>>,
}
