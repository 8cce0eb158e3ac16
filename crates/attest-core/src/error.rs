//! Error taxonomy shared by every layer of Attest.
//!
//! Storage backends and the HTTP layer both speak this enum so that access
//! denials, missing resources, and create conflicts survive the trip from a
//! SQL statement to an HTTP status code without downcasting.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  /// Caller-supplied input failed validation before any state was touched.
  #[error("validation error: {0}")]
  Validation(String),

  /// The caller holds no active grant for the RCM (and is not an admin).
  /// The message deliberately carries no resource detail.
  #[error("access denied")]
  AccessDenied,

  #[error("user not found: {0}")]
  UserNotFound(Uuid),

  #[error("rcm not found: {0}")]
  RcmNotFound(Uuid),

  #[error("evaluation header not found: {0}")]
  HeaderNotFound(Uuid),

  #[error("email already registered: {0}")]
  EmailTaken(String),

  /// Explicit session creation hit the (rcm, user, session-name) unique
  /// constraint. The lazy path in `save_design_line` reuses the existing
  /// header instead of raising this.
  #[error("evaluation session {session:?} already exists for rcm {rcm_id}")]
  SessionExists { rcm_id: Uuid, session: String },

  /// Operating evaluation requires a prior design session for the same RCM;
  /// its absence aborts the save before any row is written.
  #[error("design session {session:?} not found for rcm {rcm_id}")]
  DesignSessionNotFound { rcm_id: Uuid, session: String },

  /// Integrated import was requested but no header matched the category
  /// keyword list.
  #[error("integrated import requires a category column")]
  MissingCategoryColumn,

  #[error("unknown control category: {0:?}")]
  UnknownCategory(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  /// A persisted value (uuid, timestamp, enum tag) failed to decode.
  #[error("stored value could not be decoded: {0}")]
  Decode(String),

  /// Any other failure raised by the storage backend.
  #[error("storage error: {0}")]
  Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Wrap an arbitrary backend error as [`Error::Storage`].
  pub fn storage(
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
  ) -> Self {
    Self::Storage(err.into())
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
