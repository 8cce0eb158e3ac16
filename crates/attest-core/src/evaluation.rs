//! Evaluation sessions: headers, lines, and the inputs that mutate them.
//!
//! A header is one named evaluation pass over an RCM's controls, scoped to
//! one user. Lines are upserted per `(header, control_code)`. The progress
//! counters on a header are caller-maintained; nothing here derives them
//! from line counts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Status ──────────────────────────────────────────────────────────────────

/// Lifecycle of an evaluation header. The transition to `Completed` is
/// caller-set via an explicit call, never inferred from line counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvaluationStatus {
  InProgress,
  Completed,
}

impl EvaluationStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::InProgress => "IN_PROGRESS",
      Self::Completed => "COMPLETED",
    }
  }
}

// ─── Headers ─────────────────────────────────────────────────────────────────

/// One evaluation session. Unique per `(rcm_id, user_id, session_name)`.
///
/// `total_controls` is a snapshot taken when the header is created through
/// the explicit path; the lazy path leaves it at zero. `evaluated_controls`
/// and `progress_pct` are whatever the caller last wrote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationHeader {
  pub header_id:          Uuid,
  pub rcm_id:             Uuid,
  pub user_id:            Uuid,
  pub session_name:       String,
  pub status:             EvaluationStatus,
  pub total_controls:     u32,
  pub evaluated_controls: u32,
  pub progress_pct:       f64,
  pub started_at:         DateTime<Utc>,
  pub last_updated:       DateTime<Utc>,
  pub completed_at:       Option<DateTime<Utc>>,
}

/// An operating-evaluation header. Identical to a design header except that
/// it references the design session the testing was performed against —
/// the hard precondition of every operation save.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationHeader {
  #[serde(flatten)]
  pub header:           EvaluationHeader,
  pub design_header_id: Uuid,
}

/// A completed design session as offered to operating evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesignSessionRef {
  pub session_name: String,
  pub status:       EvaluationStatus,
  pub started_at:   DateTime<Utc>,
}

// ─── Assessments ─────────────────────────────────────────────────────────────

/// Design-effectiveness judgment for one control. Every field is optional
/// narrative text; evaluators save partial work freely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignAssessment {
  pub description_adequacy:   Option<String>,
  pub improvement_suggestion: Option<String>,
  pub overall_effectiveness:  Option<String>,
  pub evaluation_rationale:   Option<String>,
  pub recommended_actions:    Option<String>,
}

/// Operating-effectiveness result for one control, from sample testing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationAssessment {
  pub sample_size:     Option<u32>,
  pub exception_count: Option<u32>,
  pub test_result:     Option<String>,
  pub test_procedure:  Option<String>,
  pub findings:        Option<String>,
}

// ─── Lines ───────────────────────────────────────────────────────────────────

/// A persisted design-evaluation line. Unique per `(header, control_code)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesignLine {
  pub line_id:      Uuid,
  pub header_id:    Uuid,
  pub control_code: String,
  #[serde(flatten)]
  pub assessment:   DesignAssessment,
  pub evaluated_at: DateTime<Utc>,
  pub last_updated: DateTime<Utc>,
}

/// A persisted operating-evaluation line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationLine {
  pub line_id:      Uuid,
  pub header_id:    Uuid,
  pub control_code: String,
  #[serde(flatten)]
  pub assessment:   OperationAssessment,
  pub evaluated_at: DateTime<Utc>,
  pub last_updated: DateTime<Utc>,
}

// ─── Save keys ───────────────────────────────────────────────────────────────

/// Addresses one design line by its natural key. The header is resolved by
/// `(rcm_id, user_id, session_name)` and lazily created when absent.
#[derive(Debug, Clone)]
pub struct DesignLineKey {
  pub rcm_id:       Uuid,
  pub user_id:      Uuid,
  pub session_name: String,
  pub control_code: String,
}

/// Addresses one operation line. `design_session` names the design session
/// for the same RCM that the operating test was performed against.
#[derive(Debug, Clone)]
pub struct OperationLineKey {
  pub rcm_id:         Uuid,
  pub user_id:        Uuid,
  pub design_session: String,
  pub control_code:   String,
}

/// Identifiers produced by a line save.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SavedLine {
  pub header_id: Uuid,
  pub line_id:   Uuid,
}
