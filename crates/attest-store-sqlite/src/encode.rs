//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. Enum tags are stored as
//! their canonical uppercase strings (`ELC`, `IN_PROGRESS`, `READ`). UUIDs
//! are stored as hyphenated lowercase strings. Flags are INTEGER 0/1.

use attest_core::{
  Error, Result,
  evaluation::{
    DesignAssessment, DesignLine, EvaluationHeader, EvaluationStatus,
    OperationAssessment, OperationHeader, OperationLine,
  },
  rcm::{Control, ControlCategory, ControlDefinition, PermissionType, Rcm},
  user::User,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> {
  Uuid::parse_str(s).map_err(|e| Error::Decode(format!("bad uuid {s:?}: {e}")))
}

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::Decode(format!("bad timestamp {s:?}: {e}")))
}

pub fn decode_dt_opt(s: Option<&str>) -> Result<Option<DateTime<Utc>>> {
  s.map(decode_dt).transpose()
}

// ─── Enum tags ───────────────────────────────────────────────────────────────

pub fn encode_category(c: ControlCategory) -> &'static str { c.as_str() }

pub fn decode_category(s: &str) -> Result<ControlCategory> {
  ControlCategory::from_cell(s)
    .ok_or_else(|| Error::Decode(format!("unknown category tag: {s:?}")))
}

pub fn decode_status(s: &str) -> Result<EvaluationStatus> {
  match s {
    "IN_PROGRESS" => Ok(EvaluationStatus::InProgress),
    "COMPLETED" => Ok(EvaluationStatus::Completed),
    other => Err(Error::Decode(format!("unknown status tag: {other:?}"))),
  }
}

pub fn encode_permission(p: PermissionType) -> &'static str { p.as_str() }

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `users` row.
pub struct RawUser {
  pub user_id:       String,
  pub email:         String,
  pub display_name:  String,
  pub company:       String,
  pub is_admin:      bool,
  pub created_at:    String,
  pub expires_at:    Option<String>,
  pub last_login_at: Option<String>,
}

impl RawUser {
  /// The column list matching this struct's field order.
  pub const COLUMNS: &'static str = "user_id, email, display_name, company, \
     is_admin, created_at, expires_at, last_login_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      user_id:       row.get(0)?,
      email:         row.get(1)?,
      display_name:  row.get(2)?,
      company:       row.get(3)?,
      is_admin:      row.get(4)?,
      created_at:    row.get(5)?,
      expires_at:    row.get(6)?,
      last_login_at: row.get(7)?,
    })
  }

  pub fn into_user(self) -> Result<User> {
    Ok(User {
      user_id:       decode_uuid(&self.user_id)?,
      email:         self.email,
      display_name:  self.display_name,
      company:       self.company,
      is_admin:      self.is_admin,
      created_at:    decode_dt(&self.created_at)?,
      expires_at:    decode_dt_opt(self.expires_at.as_deref())?,
      last_login_at: decode_dt_opt(self.last_login_at.as_deref())?,
    })
  }
}

/// Raw strings read directly from an `rcms` row.
pub struct RawRcm {
  pub rcm_id:          String,
  pub name:            String,
  pub category:        String,
  pub description:     Option<String>,
  pub uploaded_by:     String,
  pub uploaded_at:     String,
  pub source_filename: Option<String>,
  pub is_active:       bool,
  pub completed_at:    Option<String>,
}

impl RawRcm {
  pub const COLUMNS: &'static str = "rcm_id, name, category, description, \
     uploaded_by, uploaded_at, source_filename, is_active, completed_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      rcm_id:          row.get(0)?,
      name:            row.get(1)?,
      category:        row.get(2)?,
      description:     row.get(3)?,
      uploaded_by:     row.get(4)?,
      uploaded_at:     row.get(5)?,
      source_filename: row.get(6)?,
      is_active:       row.get(7)?,
      completed_at:    row.get(8)?,
    })
  }

  pub fn into_rcm(self) -> Result<Rcm> {
    Ok(Rcm {
      rcm_id:          decode_uuid(&self.rcm_id)?,
      name:            self.name,
      category:        decode_category(&self.category)?,
      description:     self.description,
      uploaded_by:     decode_uuid(&self.uploaded_by)?,
      uploaded_at:     decode_dt(&self.uploaded_at)?,
      source_filename: self.source_filename,
      is_active:       self.is_active,
      completed_at:    decode_dt_opt(self.completed_at.as_deref())?,
    })
  }
}

/// Raw strings read directly from an `rcm_controls` row.
pub struct RawControl {
  pub control_id: String,
  pub rcm_id:     String,
  pub definition: ControlDefinition,
}

impl RawControl {
  pub const COLUMNS: &'static str = "control_id, rcm_id, control_code, \
     control_name, control_description, key_control, control_frequency, \
     control_type, control_nature, process_area, risk_description, \
     risk_impact, risk_likelihood, population, \
     population_completeness_check, population_count, test_procedure, \
     control_owner, control_performer, evidence_type";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      control_id: row.get(0)?,
      rcm_id:     row.get(1)?,
      definition: ControlDefinition {
        control_code:                  row.get(2)?,
        control_name:                  row.get(3)?,
        control_description:           row.get(4)?,
        key_control:                   row.get(5)?,
        control_frequency:             row.get(6)?,
        control_type:                  row.get(7)?,
        control_nature:                row.get(8)?,
        process_area:                  row.get(9)?,
        risk_description:              row.get(10)?,
        risk_impact:                   row.get(11)?,
        risk_likelihood:               row.get(12)?,
        population:                    row.get(13)?,
        population_completeness_check: row.get(14)?,
        population_count:              row.get(15)?,
        test_procedure:                row.get(16)?,
        control_owner:                 row.get(17)?,
        control_performer:             row.get(18)?,
        evidence_type:                 row.get(19)?,
      },
    })
  }

  pub fn into_control(self) -> Result<Control> {
    Ok(Control {
      control_id: decode_uuid(&self.control_id)?,
      rcm_id:     decode_uuid(&self.rcm_id)?,
      definition: self.definition,
    })
  }
}

/// Raw strings read from a design or operation evaluation header row
/// (the shared columns).
pub struct RawHeader {
  pub header_id:          String,
  pub rcm_id:             String,
  pub user_id:            String,
  pub session_name:       String,
  pub status:             String,
  pub total_controls:     i64,
  pub evaluated_controls: i64,
  pub progress_pct:       f64,
  pub started_at:         String,
  pub last_updated:       String,
  pub completed_at:       Option<String>,
}

impl RawHeader {
  pub const COLUMNS: &'static str = "header_id, rcm_id, user_id, \
     session_name, status, total_controls, evaluated_controls, \
     progress_pct, started_at, last_updated, completed_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      header_id:          row.get(0)?,
      rcm_id:             row.get(1)?,
      user_id:            row.get(2)?,
      session_name:       row.get(3)?,
      status:             row.get(4)?,
      total_controls:     row.get(5)?,
      evaluated_controls: row.get(6)?,
      progress_pct:       row.get(7)?,
      started_at:         row.get(8)?,
      last_updated:       row.get(9)?,
      completed_at:       row.get(10)?,
    })
  }

  pub fn into_header(self) -> Result<EvaluationHeader> {
    Ok(EvaluationHeader {
      header_id:          decode_uuid(&self.header_id)?,
      rcm_id:             decode_uuid(&self.rcm_id)?,
      user_id:            decode_uuid(&self.user_id)?,
      session_name:       self.session_name,
      status:             decode_status(&self.status)?,
      total_controls:     decode_count(self.total_controls)?,
      evaluated_controls: decode_count(self.evaluated_controls)?,
      progress_pct:       self.progress_pct,
      started_at:         decode_dt(&self.started_at)?,
      last_updated:       decode_dt(&self.last_updated)?,
      completed_at:       decode_dt_opt(self.completed_at.as_deref())?,
    })
  }
}

/// An operation header row: the shared columns plus `design_header_id`.
pub struct RawOperationHeader {
  pub shared:           RawHeader,
  pub design_header_id: String,
}

impl RawOperationHeader {
  pub const COLUMNS: &'static str = "header_id, rcm_id, user_id, \
     session_name, status, total_controls, evaluated_controls, \
     progress_pct, started_at, last_updated, completed_at, design_header_id";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      shared:           RawHeader::from_row(row)?,
      design_header_id: row.get(11)?,
    })
  }

  pub fn into_header(self) -> Result<OperationHeader> {
    Ok(OperationHeader {
      design_header_id: decode_uuid(&self.design_header_id)?,
      header:           self.shared.into_header()?,
    })
  }
}

/// Raw strings read directly from a `design_eval_lines` row.
pub struct RawDesignLine {
  pub line_id:      String,
  pub header_id:    String,
  pub control_code: String,
  pub assessment:   DesignAssessment,
  pub evaluated_at: String,
  pub last_updated: String,
}

impl RawDesignLine {
  pub const COLUMNS: &'static str = "line_id, header_id, control_code, \
     description_adequacy, improvement_suggestion, overall_effectiveness, \
     evaluation_rationale, recommended_actions, evaluated_at, last_updated";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      line_id:      row.get(0)?,
      header_id:    row.get(1)?,
      control_code: row.get(2)?,
      assessment:   DesignAssessment {
        description_adequacy:   row.get(3)?,
        improvement_suggestion: row.get(4)?,
        overall_effectiveness:  row.get(5)?,
        evaluation_rationale:   row.get(6)?,
        recommended_actions:    row.get(7)?,
      },
      evaluated_at: row.get(8)?,
      last_updated: row.get(9)?,
    })
  }

  pub fn into_line(self) -> Result<DesignLine> {
    Ok(DesignLine {
      line_id:      decode_uuid(&self.line_id)?,
      header_id:    decode_uuid(&self.header_id)?,
      control_code: self.control_code,
      assessment:   self.assessment,
      evaluated_at: decode_dt(&self.evaluated_at)?,
      last_updated: decode_dt(&self.last_updated)?,
    })
  }
}

/// Raw strings read directly from an `operation_eval_lines` row.
pub struct RawOperationLine {
  pub line_id:      String,
  pub header_id:    String,
  pub control_code: String,
  pub assessment:   OperationAssessment,
  pub evaluated_at: String,
  pub last_updated: String,
}

impl RawOperationLine {
  pub const COLUMNS: &'static str = "line_id, header_id, control_code, \
     sample_size, exception_count, test_result, test_procedure, findings, \
     evaluated_at, last_updated";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    let sample_size: Option<i64> = row.get(3)?;
    let exception_count: Option<i64> = row.get(4)?;
    Ok(Self {
      line_id:      row.get(0)?,
      header_id:    row.get(1)?,
      control_code: row.get(2)?,
      assessment:   OperationAssessment {
        sample_size:     sample_size.map(|v| v as u32),
        exception_count: exception_count.map(|v| v as u32),
        test_result:     row.get(5)?,
        test_procedure:  row.get(6)?,
        findings:        row.get(7)?,
      },
      evaluated_at: row.get(8)?,
      last_updated: row.get(9)?,
    })
  }

  pub fn into_line(self) -> Result<OperationLine> {
    Ok(OperationLine {
      line_id:      decode_uuid(&self.line_id)?,
      header_id:    decode_uuid(&self.header_id)?,
      control_code: self.control_code,
      assessment:   self.assessment,
      evaluated_at: decode_dt(&self.evaluated_at)?,
      last_updated: decode_dt(&self.last_updated)?,
    })
  }
}

// ─── Counters ────────────────────────────────────────────────────────────────

pub fn decode_count(v: i64) -> Result<u32> {
  u32::try_from(v).map_err(|_| Error::Decode(format!("negative counter: {v}")))
}
