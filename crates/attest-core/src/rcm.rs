//! RCM (Risk and Control Matrix) records, their controls, and access grants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Error;

// ─── Category ────────────────────────────────────────────────────────────────

/// The closed three-way control classification. Immutable after an RCM is
/// created — there is no update path.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum ControlCategory {
  /// Entity-Level Controls.
  Elc,
  /// Transaction-Level Controls.
  Tlc,
  /// IT General Controls.
  Itgc,
}

impl ControlCategory {
  pub const ALL: [ControlCategory; 3] = [Self::Elc, Self::Tlc, Self::Itgc];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Elc => "ELC",
      Self::Tlc => "TLC",
      Self::Itgc => "ITGC",
    }
  }

  /// Parse a spreadsheet cell: trimmed and upper-cased, it must be exactly
  /// one of the three category tags. Anything else is `None` — integrated
  /// import silently drops such rows.
  pub fn from_cell(raw: &str) -> Option<Self> {
    match raw.trim().to_uppercase().as_str() {
      "ELC" => Some(Self::Elc),
      "TLC" => Some(Self::Tlc),
      "ITGC" => Some(Self::Itgc),
      _ => None,
    }
  }
}

impl std::fmt::Display for ControlCategory {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

impl std::str::FromStr for ControlCategory {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::from_cell(s).ok_or_else(|| Error::UnknownCategory(s.to_owned()))
  }
}

// ─── RCM ─────────────────────────────────────────────────────────────────────

/// The catalog of controls for one category, owned by its uploader.
/// Deletion is soft: `is_active` flips to `false`, rows are never removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rcm {
  pub rcm_id:          Uuid,
  pub name:            String,
  pub category:        ControlCategory,
  pub description:     Option<String>,
  pub uploaded_by:     Uuid,
  pub uploaded_at:     DateTime<Utc>,
  /// Name of the spreadsheet the controls were imported from, if any.
  pub source_filename: Option<String>,
  pub is_active:       bool,
  pub completed_at:    Option<DateTime<Utc>>,
}

/// Input to [`crate::store::ControlStore::create_rcm`].
#[derive(Debug, Clone)]
pub struct NewRcm {
  pub name:            String,
  pub category:        ControlCategory,
  pub description:     Option<String>,
  pub uploaded_by:     Uuid,
  pub source_filename: Option<String>,
}

// ─── Controls ────────────────────────────────────────────────────────────────

/// The descriptive fields of a control as they arrive from a mapped
/// spreadsheet row. All fields are free text; a missing cell is the empty
/// string, never null. Only `control_code` is required to be non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlDefinition {
  pub control_code:                  String,
  pub control_name:                  String,
  pub control_description:           String,
  pub key_control:                   String,
  pub control_frequency:             String,
  pub control_type:                  String,
  pub control_nature:                String,
  pub process_area:                  String,
  pub risk_description:              String,
  pub risk_impact:                   String,
  pub risk_likelihood:               String,
  pub population:                    String,
  pub population_completeness_check: String,
  pub population_count:              String,
  pub test_procedure:                String,
  pub control_owner:                 String,
  pub control_performer:             String,
  pub evidence_type:                 String,
}

impl ControlDefinition {
  /// Convenience constructor with every descriptive field empty.
  pub fn new(control_code: impl Into<String>) -> Self {
    Self { control_code: control_code.into(), ..Self::default() }
  }
}

/// A persisted control row. Unique per `(rcm_id, control_code)`; re-imports
/// update the definition in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Control {
  pub control_id: Uuid,
  pub rcm_id:     Uuid,
  #[serde(flatten)]
  pub definition: ControlDefinition,
}

// ─── Grants ──────────────────────────────────────────────────────────────────

/// Permission carried by a grant row. Only `READ` is meaningful today; the
/// tag exists so revocation and future write grants share one row shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PermissionType {
  Read,
}

impl PermissionType {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Read => "READ",
    }
  }
}

/// Input to [`crate::store::ControlStore::grant_access`]. Granting the same
/// (user, rcm) pair again updates the existing row rather than erroring.
#[derive(Debug, Clone)]
pub struct NewGrant {
  pub user_id:    Uuid,
  pub rcm_id:     Uuid,
  pub permission: PermissionType,
  pub granted_by: Uuid,
}

// ─── Listing view ────────────────────────────────────────────────────────────

/// How the caller came to see an RCM in a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RcmRole {
  /// Visible because the caller is an admin.
  Admin,
  /// Visible through an active READ grant.
  Read,
}

/// One row of [`crate::store::ControlStore::list_rcms_for`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RcmSummary {
  #[serde(flatten)]
  pub rcm:        Rcm,
  pub permission: RcmRole,
}

// ─── Tests ───────────────────────────────────────────────────────────────────
