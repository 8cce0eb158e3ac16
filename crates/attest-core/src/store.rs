//! The `ControlStore` trait.
//!
//! The trait is implemented by storage backends (e.g. `attest-store-sqlite`).
//! Higher layers (`attest-api`) depend on this abstraction, not on any
//! concrete backend.
//!
//! All methods return `Send` futures so the trait can be used in
//! multi-threaded async runtimes (e.g. tokio with `axum`), and all of them
//! return [`crate::Result`] so access denials, conflicts, and missing
//! resources keep their identity across the store boundary.

use std::future::Future;

use uuid::Uuid;

use crate::{
  Result,
  activity::NewActivity,
  evaluation::{
    DesignAssessment, DesignLine, DesignLineKey, DesignSessionRef,
    EvaluationHeader, OperationAssessment, OperationHeader, OperationLine,
    OperationLineKey, SavedLine,
  },
  rcm::{Control, ControlCategory, ControlDefinition, NewGrant, NewRcm, Rcm, RcmSummary},
  user::{NewUser, User, UserCredentials},
};

/// Abstraction over an Attest storage backend.
///
/// Every mutating method runs its statements inside one backend transaction:
/// a failure aborts the whole operation with nothing committed. There is no
/// retry logic at this layer.
pub trait ControlStore: Send + Sync {
  // ── Users ─────────────────────────────────────────────────────────────

  /// Persist a new user. Fails with [`crate::Error::EmailTaken`] when the
  /// email is already registered.
  fn add_user(
    &self,
    input: NewUser,
  ) -> impl Future<Output = Result<User>> + Send + '_;

  /// Retrieve a user by id. Returns `None` if not found.
  fn get_user(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<User>>> + Send + '_;

  /// Look up a user and their password hash by email, for authentication.
  fn find_credentials(
    &self,
    email: String,
  ) -> impl Future<Output = Result<Option<UserCredentials>>> + Send + '_;

  /// All users currently inside their validity window, ordered by company
  /// then display name.
  fn list_active_users(
    &self,
  ) -> impl Future<Output = Result<Vec<User>>> + Send + '_;

  /// Stamp `last_login_at` for a user.
  fn record_login(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<()>> + Send + '_;

  // ── RCMs ──────────────────────────────────────────────────────────────

  fn create_rcm(
    &self,
    input: NewRcm,
  ) -> impl Future<Output = Result<Rcm>> + Send + '_;

  /// Retrieve an RCM by id (active or not). Returns `None` if not found.
  fn get_rcm(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Rcm>>> + Send + '_;

  /// Active RCMs visible to `user_id`, optionally restricted to one
  /// category. Admins see every active RCM; everyone else only those with
  /// an active grant. Ordered by category, newest upload first.
  fn list_rcms_for(
    &self,
    user_id: Uuid,
    category: Option<ControlCategory>,
  ) -> impl Future<Output = Result<Vec<RcmSummary>>> + Send + '_;

  /// Soft-delete: flips `is_active` off. The controls and any evaluation
  /// history stay in place.
  fn deactivate_rcm(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<()>> + Send + '_;

  // ── Controls ──────────────────────────────────────────────────────────

  /// Insert or update one control, keyed by `(rcm_id, control_code)`.
  /// Within an import batch, a repeated code means last row wins.
  fn upsert_control(
    &self,
    rcm_id: Uuid,
    definition: ControlDefinition,
  ) -> impl Future<Output = Result<()>> + Send + '_;

  /// All controls of an RCM, ordered by control code.
  fn list_controls(
    &self,
    rcm_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Control>>> + Send + '_;

  fn control_count(
    &self,
    rcm_id: Uuid,
  ) -> impl Future<Output = Result<u32>> + Send + '_;

  // ── Access control gate ───────────────────────────────────────────────

  /// The binary permission check consulted before every RCM-scoped read or
  /// write: admins always pass; everyone else needs an active grant row.
  fn has_access(
    &self,
    user_id: Uuid,
    rcm_id: Uuid,
  ) -> impl Future<Output = Result<bool>> + Send + '_;

  /// Grant access, idempotently: an existing row (active or revoked) is
  /// updated in place rather than duplicated.
  fn grant_access(
    &self,
    grant: NewGrant,
  ) -> impl Future<Output = Result<()>> + Send + '_;

  /// Soft-revoke: the grant row stays, `is_active` flips off.
  fn revoke_access(
    &self,
    user_id: Uuid,
    rcm_id: Uuid,
  ) -> impl Future<Output = Result<()>> + Send + '_;

  // ── Design evaluation ─────────────────────────────────────────────────

  /// Sessions for an RCM: all of them for admins, only the caller's own
  /// otherwise. Most recent first.
  fn list_design_sessions(
    &self,
    rcm_id: Uuid,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Vec<EvaluationHeader>>> + Send + '_;

  /// Explicit session creation. Snapshots `total_controls` from the RCM's
  /// current control count. A duplicate `(rcm, user, name)` fails with
  /// [`crate::Error::SessionExists`] — callers must treat that as a
  /// conflict, not overwrite.
  fn create_design_session(
    &self,
    rcm_id: Uuid,
    user_id: Uuid,
    session_name: String,
  ) -> impl Future<Output = Result<EvaluationHeader>> + Send + '_;

  fn get_design_header(
    &self,
    header_id: Uuid,
  ) -> impl Future<Output = Result<Option<EvaluationHeader>>> + Send + '_;

  /// Upsert one design line. The header is resolved by the key's triple
  /// and lazily created when absent — the lazy path does not snapshot
  /// `total_controls`. Bumps the header's `last_updated`; progress
  /// counters are left to the caller.
  fn save_design_line(
    &self,
    key: DesignLineKey,
    assessment: DesignAssessment,
  ) -> impl Future<Output = Result<SavedLine>> + Send + '_;

  /// All lines of a header, ordered by control code.
  fn list_design_lines(
    &self,
    header_id: Uuid,
  ) -> impl Future<Output = Result<Vec<DesignLine>>> + Send + '_;

  /// Write the caller-maintained progress counters.
  fn update_design_progress(
    &self,
    header_id: Uuid,
    evaluated_controls: u32,
    progress_pct: f64,
  ) -> impl Future<Output = Result<()>> + Send + '_;

  /// Caller-triggered `IN_PROGRESS -> COMPLETED` transition; stamps the
  /// completion date.
  fn complete_design_session(
    &self,
    header_id: Uuid,
  ) -> impl Future<Output = Result<()>> + Send + '_;

  // ── Operating evaluation ──────────────────────────────────────────────

  /// Completed design sessions of an RCM, offered as the basis for
  /// operating evaluation. Distinct by name, newest first.
  fn list_completed_design_sessions(
    &self,
    rcm_id: Uuid,
  ) -> impl Future<Output = Result<Vec<DesignSessionRef>>> + Send + '_;

  fn get_operation_header(
    &self,
    header_id: Uuid,
  ) -> impl Future<Output = Result<Option<OperationHeader>>> + Send + '_;

  /// Upsert one operating line. Resolving the referenced design header by
  /// `(rcm, design_session)` is a hard precondition: absence fails with
  /// [`crate::Error::DesignSessionNotFound`] and writes nothing.
  fn save_operation_line(
    &self,
    key: OperationLineKey,
    assessment: OperationAssessment,
  ) -> impl Future<Output = Result<SavedLine>> + Send + '_;

  fn list_operation_lines(
    &self,
    header_id: Uuid,
  ) -> impl Future<Output = Result<Vec<OperationLine>>> + Send + '_;

  // ── Activity log ──────────────────────────────────────────────────────

  /// Append one activity entry. Callers treat failures as non-fatal.
  fn record_activity(
    &self,
    record: NewActivity,
  ) -> impl Future<Output = Result<()>> + Send + '_;
}
