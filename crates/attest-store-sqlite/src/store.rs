//! [`SqliteStore`] — the SQLite implementation of [`ControlStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use attest_core::{
  Error, Result,
  activity::NewActivity,
  evaluation::{
    DesignAssessment, DesignLine, DesignLineKey, DesignSessionRef,
    EvaluationHeader, EvaluationStatus, OperationAssessment, OperationHeader,
    OperationLine, OperationLineKey, SavedLine,
  },
  rcm::{
    Control, ControlCategory, ControlDefinition, NewGrant, NewRcm, Rcm,
    RcmRole, RcmSummary,
  },
  store::ControlStore,
  user::{NewUser, User, UserCredentials},
};

use crate::{
  encode::{
    RawControl, RawDesignLine, RawHeader, RawOperationHeader,
    RawOperationLine, RawRcm, RawUser, decode_dt, decode_status, decode_uuid,
    encode_category, encode_dt, encode_permission, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// An Attest store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted, and all
/// statements run serialised on its dedicated thread.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path)
      .await
      .map_err(Error::storage)?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory()
      .await
      .map_err(Error::storage)?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await
      .map_err(Error::storage)
  }
}

// ─── ControlStore impl ───────────────────────────────────────────────────────

impl ControlStore for SqliteStore {
  // ── Users ─────────────────────────────────────────────────────────────────

  async fn add_user(&self, input: NewUser) -> Result<User> {
    let user = User {
      user_id:       Uuid::new_v4(),
      email:         input.email,
      display_name:  input.display_name,
      company:       input.company,
      is_admin:      input.is_admin,
      created_at:    Utc::now(),
      expires_at:    input.expires_at,
      last_login_at: None,
    };

    let id_str      = encode_uuid(user.user_id);
    let email       = user.email.clone();
    let name        = user.display_name.clone();
    let company     = user.company.clone();
    let hash        = input.password_hash;
    let is_admin    = user.is_admin;
    let created_str = encode_dt(user.created_at);
    let expires_str = user.expires_at.map(encode_dt);

    self
      .conn
      .call(move |conn| {
        let taken: bool = conn
          .query_row(
            "SELECT 1 FROM users WHERE email = ?1",
            rusqlite::params![email],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);

        if taken {
          return Ok(Err(Error::EmailTaken(email)));
        }

        conn.execute(
          "INSERT INTO users (
             user_id, email, display_name, company, password_hash,
             is_admin, created_at, expires_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            id_str, email, name, company, hash, is_admin, created_str,
            expires_str,
          ],
        )?;
        Ok(Ok(()))
      })
      .await
      .map_err(Error::storage)??;

    Ok(user)
  }

  async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
    let id_str = encode_uuid(id);
    let sql = format!("SELECT {} FROM users WHERE user_id = ?1", RawUser::COLUMNS);

    let raw: Option<RawUser> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(&sql, rusqlite::params![id_str], RawUser::from_row)
            .optional()?,
        )
      })
      .await
      .map_err(Error::storage)?;

    raw.map(RawUser::into_user).transpose()
  }

  async fn find_credentials(
    &self,
    email: String,
  ) -> Result<Option<UserCredentials>> {
    let sql = format!(
      "SELECT {}, password_hash FROM users WHERE email = ?1",
      RawUser::COLUMNS
    );

    let raw: Option<(RawUser, String)> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(&sql, rusqlite::params![email], |row| {
              Ok((RawUser::from_row(row)?, row.get(8)?))
            })
            .optional()?,
        )
      })
      .await
      .map_err(Error::storage)?;

    raw
      .map(|(raw, password_hash)| {
        Ok(UserCredentials { user: raw.into_user()?, password_hash })
      })
      .transpose()
  }

  async fn list_active_users(&self) -> Result<Vec<User>> {
    let now_str = encode_dt(Utc::now());
    let sql = format!(
      "SELECT {} FROM users
       WHERE expires_at IS NULL OR expires_at > ?1
       ORDER BY company, display_name",
      RawUser::COLUMNS
    );

    let raws: Vec<RawUser> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![now_str], RawUser::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await
      .map_err(Error::storage)?;

    raws.into_iter().map(RawUser::into_user).collect()
  }

  async fn record_login(&self, id: Uuid) -> Result<()> {
    let id_str  = encode_uuid(id);
    let now_str = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE users SET last_login_at = ?1 WHERE user_id = ?2",
          rusqlite::params![now_str, id_str],
        )?;
        Ok(())
      })
      .await
      .map_err(Error::storage)
  }

  // ── RCMs ──────────────────────────────────────────────────────────────────

  async fn create_rcm(&self, input: NewRcm) -> Result<Rcm> {
    let rcm = Rcm {
      rcm_id:          Uuid::new_v4(),
      name:            input.name,
      category:        input.category,
      description:     input.description,
      uploaded_by:     input.uploaded_by,
      uploaded_at:     Utc::now(),
      source_filename: input.source_filename,
      is_active:       true,
      completed_at:    None,
    };

    let id_str       = encode_uuid(rcm.rcm_id);
    let name         = rcm.name.clone();
    let category     = encode_category(rcm.category).to_owned();
    let description  = rcm.description.clone();
    let uploader_str = encode_uuid(rcm.uploaded_by);
    let at_str       = encode_dt(rcm.uploaded_at);
    let filename     = rcm.source_filename.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO rcms (
             rcm_id, name, category, description, uploaded_by, uploaded_at,
             source_filename, is_active
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1)",
          rusqlite::params![
            id_str, name, category, description, uploader_str, at_str,
            filename,
          ],
        )?;
        Ok(())
      })
      .await
      .map_err(Error::storage)?;

    Ok(rcm)
  }

  async fn get_rcm(&self, id: Uuid) -> Result<Option<Rcm>> {
    let id_str = encode_uuid(id);
    let sql = format!("SELECT {} FROM rcms WHERE rcm_id = ?1", RawRcm::COLUMNS);

    let raw: Option<RawRcm> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(&sql, rusqlite::params![id_str], RawRcm::from_row)
            .optional()?,
        )
      })
      .await
      .map_err(Error::storage)?;

    raw.map(RawRcm::into_rcm).transpose()
  }

  async fn list_rcms_for(
    &self,
    user_id: Uuid,
    category: Option<ControlCategory>,
  ) -> Result<Vec<RcmSummary>> {
    let user_str     = encode_uuid(user_id);
    let category_str = category.map(encode_category).map(str::to_owned);

    let (is_admin, raws): (bool, Vec<RawRcm>) = self
      .conn
      .call(move |conn| {
        let is_admin: bool = conn
          .query_row(
            "SELECT is_admin FROM users WHERE user_id = ?1",
            rusqlite::params![user_str],
            |r| r.get(0),
          )
          .optional()?
          .unwrap_or(false);

        let rows = if is_admin {
          let sql = format!(
            "SELECT {} FROM rcms
             WHERE is_active = 1 AND (?1 IS NULL OR category = ?1)
             ORDER BY category, uploaded_at DESC",
            RawRcm::COLUMNS
          );
          let mut stmt = conn.prepare(&sql)?;
          stmt
            .query_map(rusqlite::params![category_str], RawRcm::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
          let mut stmt = conn.prepare(
            "SELECT r.rcm_id, r.name, r.category, r.description,
                    r.uploaded_by, r.uploaded_at, r.source_filename,
                    r.is_active, r.completed_at
             FROM rcms r
             INNER JOIN rcm_grants g ON g.rcm_id = r.rcm_id
             WHERE g.user_id = ?1 AND g.is_active = 1 AND r.is_active = 1
               AND (?2 IS NULL OR r.category = ?2)
             ORDER BY r.category, r.uploaded_at DESC",
          )?;
          stmt
            .query_map(
              rusqlite::params![user_str, category_str],
              RawRcm::from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };

        Ok((is_admin, rows))
      })
      .await
      .map_err(Error::storage)?;

    let permission = if is_admin { RcmRole::Admin } else { RcmRole::Read };
    raws
      .into_iter()
      .map(|raw| Ok(RcmSummary { rcm: raw.into_rcm()?, permission }))
      .collect()
  }

  async fn deactivate_rcm(&self, id: Uuid) -> Result<()> {
    let id_str = encode_uuid(id);

    let changed: usize = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE rcms SET is_active = 0 WHERE rcm_id = ?1",
          rusqlite::params![id_str],
        )?)
      })
      .await
      .map_err(Error::storage)?;

    if changed == 0 {
      return Err(Error::RcmNotFound(id));
    }
    Ok(())
  }

  // ── Controls ──────────────────────────────────────────────────────────────

  async fn upsert_control(
    &self,
    rcm_id: Uuid,
    definition: ControlDefinition,
  ) -> Result<()> {
    let control_id_str = encode_uuid(Uuid::new_v4());
    let rcm_str        = encode_uuid(rcm_id);
    let d              = definition;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO rcm_controls (
             control_id, rcm_id, control_code, control_name,
             control_description, key_control, control_frequency,
             control_type, control_nature, process_area, risk_description,
             risk_impact, risk_likelihood, population,
             population_completeness_check, population_count,
             test_procedure, control_owner, control_performer, evidence_type
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                     ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)
           ON CONFLICT (rcm_id, control_code) DO UPDATE SET
             control_name                  = excluded.control_name,
             control_description           = excluded.control_description,
             key_control                   = excluded.key_control,
             control_frequency             = excluded.control_frequency,
             control_type                  = excluded.control_type,
             control_nature                = excluded.control_nature,
             process_area                  = excluded.process_area,
             risk_description              = excluded.risk_description,
             risk_impact                   = excluded.risk_impact,
             risk_likelihood               = excluded.risk_likelihood,
             population                    = excluded.population,
             population_completeness_check = excluded.population_completeness_check,
             population_count              = excluded.population_count,
             test_procedure                = excluded.test_procedure,
             control_owner                 = excluded.control_owner,
             control_performer             = excluded.control_performer,
             evidence_type                 = excluded.evidence_type",
          rusqlite::params![
            control_id_str,
            rcm_str,
            d.control_code,
            d.control_name,
            d.control_description,
            d.key_control,
            d.control_frequency,
            d.control_type,
            d.control_nature,
            d.process_area,
            d.risk_description,
            d.risk_impact,
            d.risk_likelihood,
            d.population,
            d.population_completeness_check,
            d.population_count,
            d.test_procedure,
            d.control_owner,
            d.control_performer,
            d.evidence_type,
          ],
        )?;
        Ok(())
      })
      .await
      .map_err(Error::storage)
  }

  async fn list_controls(&self, rcm_id: Uuid) -> Result<Vec<Control>> {
    let rcm_str = encode_uuid(rcm_id);
    let sql = format!(
      "SELECT {} FROM rcm_controls WHERE rcm_id = ?1 ORDER BY control_code",
      RawControl::COLUMNS
    );

    let raws: Vec<RawControl> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![rcm_str], RawControl::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await
      .map_err(Error::storage)?;

    raws.into_iter().map(RawControl::into_control).collect()
  }

  async fn control_count(&self, rcm_id: Uuid) -> Result<u32> {
    let rcm_str = encode_uuid(rcm_id);

    let count: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*) FROM rcm_controls WHERE rcm_id = ?1",
          rusqlite::params![rcm_str],
          |r| r.get(0),
        )?)
      })
      .await
      .map_err(Error::storage)?;

    Ok(count as u32)
  }

  // ── Access control gate ───────────────────────────────────────────────────

  async fn has_access(&self, user_id: Uuid, rcm_id: Uuid) -> Result<bool> {
    let user_str = encode_uuid(user_id);
    let rcm_str  = encode_uuid(rcm_id);

    self
      .conn
      .call(move |conn| {
        let is_admin: Option<bool> = conn
          .query_row(
            "SELECT is_admin FROM users WHERE user_id = ?1",
            rusqlite::params![user_str],
            |r| r.get(0),
          )
          .optional()?;

        if is_admin == Some(true) {
          return Ok(true);
        }

        let granted: bool = conn
          .query_row(
            "SELECT 1 FROM rcm_grants
             WHERE user_id = ?1 AND rcm_id = ?2 AND is_active = 1",
            rusqlite::params![user_str, rcm_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);

        Ok(granted)
      })
      .await
      .map_err(Error::storage)
  }

  async fn grant_access(&self, grant: NewGrant) -> Result<()> {
    let grant_id_str   = encode_uuid(Uuid::new_v4());
    let user_str       = encode_uuid(grant.user_id);
    let rcm_str        = encode_uuid(grant.rcm_id);
    let permission_str = encode_permission(grant.permission).to_owned();
    let granted_by_str = encode_uuid(grant.granted_by);
    let at_str         = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO rcm_grants (
             grant_id, user_id, rcm_id, permission, granted_by, granted_at,
             is_active
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)
           ON CONFLICT (user_id, rcm_id) DO UPDATE SET
             permission = excluded.permission,
             granted_by = excluded.granted_by,
             granted_at = excluded.granted_at,
             is_active  = 1",
          rusqlite::params![
            grant_id_str, user_str, rcm_str, permission_str, granted_by_str,
            at_str,
          ],
        )?;
        Ok(())
      })
      .await
      .map_err(Error::storage)
  }

  async fn revoke_access(&self, user_id: Uuid, rcm_id: Uuid) -> Result<()> {
    let user_str = encode_uuid(user_id);
    let rcm_str  = encode_uuid(rcm_id);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE rcm_grants SET is_active = 0
           WHERE user_id = ?1 AND rcm_id = ?2",
          rusqlite::params![user_str, rcm_str],
        )?;
        Ok(())
      })
      .await
      .map_err(Error::storage)
  }

  // ── Design evaluation ─────────────────────────────────────────────────────

  async fn list_design_sessions(
    &self,
    rcm_id: Uuid,
    user_id: Uuid,
  ) -> Result<Vec<EvaluationHeader>> {
    let rcm_str  = encode_uuid(rcm_id);
    let user_str = encode_uuid(user_id);

    let raws: Vec<RawHeader> = self
      .conn
      .call(move |conn| {
        let is_admin: bool = conn
          .query_row(
            "SELECT is_admin FROM users WHERE user_id = ?1",
            rusqlite::params![user_str],
            |r| r.get(0),
          )
          .optional()?
          .unwrap_or(false);

        let rows = if is_admin {
          let sql = format!(
            "SELECT {} FROM design_eval_headers
             WHERE rcm_id = ?1
             ORDER BY started_at DESC",
            RawHeader::COLUMNS
          );
          let mut stmt = conn.prepare(&sql)?;
          stmt
            .query_map(rusqlite::params![rcm_str], RawHeader::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
          let sql = format!(
            "SELECT {} FROM design_eval_headers
             WHERE rcm_id = ?1 AND user_id = ?2
             ORDER BY started_at DESC",
            RawHeader::COLUMNS
          );
          let mut stmt = conn.prepare(&sql)?;
          stmt
            .query_map(
              rusqlite::params![rcm_str, user_str],
              RawHeader::from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };

        Ok(rows)
      })
      .await
      .map_err(Error::storage)?;

    raws.into_iter().map(RawHeader::into_header).collect()
  }

  async fn create_design_session(
    &self,
    rcm_id: Uuid,
    user_id: Uuid,
    session_name: String,
  ) -> Result<EvaluationHeader> {
    let header_id = Uuid::new_v4();
    let now       = Utc::now();

    let header_str = encode_uuid(header_id);
    let rcm_str    = encode_uuid(rcm_id);
    let user_str   = encode_uuid(user_id);
    let name       = session_name.clone();
    let now_str    = encode_dt(now);

    let total: u32 = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let rcm_exists: bool = tx
          .query_row(
            "SELECT 1 FROM rcms WHERE rcm_id = ?1",
            rusqlite::params![rcm_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);

        if !rcm_exists {
          return Ok(Err(Error::RcmNotFound(rcm_id)));
        }

        let duplicate: bool = tx
          .query_row(
            "SELECT 1 FROM design_eval_headers
             WHERE rcm_id = ?1 AND user_id = ?2 AND session_name = ?3",
            rusqlite::params![rcm_str, user_str, name],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);

        if duplicate {
          return Ok(Err(Error::SessionExists { rcm_id, session: name }));
        }

        // Snapshot of the control count at creation time; never recomputed.
        let total: i64 = tx.query_row(
          "SELECT COUNT(*) FROM rcm_controls WHERE rcm_id = ?1",
          rusqlite::params![rcm_str],
          |r| r.get(0),
        )?;

        tx.execute(
          "INSERT INTO design_eval_headers (
             header_id, rcm_id, user_id, session_name, status,
             total_controls, started_at, last_updated
           ) VALUES (?1, ?2, ?3, ?4, 'IN_PROGRESS', ?5, ?6, ?6)",
          rusqlite::params![header_str, rcm_str, user_str, name, total, now_str],
        )?;

        tx.commit()?;
        Ok(Ok(total as u32))
      })
      .await
      .map_err(Error::storage)??;

    Ok(EvaluationHeader {
      header_id,
      rcm_id,
      user_id,
      session_name,
      status: EvaluationStatus::InProgress,
      total_controls: total,
      evaluated_controls: 0,
      progress_pct: 0.0,
      started_at: now,
      last_updated: now,
      completed_at: None,
    })
  }

  async fn get_design_header(
    &self,
    header_id: Uuid,
  ) -> Result<Option<EvaluationHeader>> {
    let header_str = encode_uuid(header_id);
    let sql = format!(
      "SELECT {} FROM design_eval_headers WHERE header_id = ?1",
      RawHeader::COLUMNS
    );

    let raw: Option<RawHeader> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(&sql, rusqlite::params![header_str], RawHeader::from_row)
            .optional()?,
        )
      })
      .await
      .map_err(Error::storage)?;

    raw.map(RawHeader::into_header).transpose()
  }

  async fn save_design_line(
    &self,
    key: DesignLineKey,
    assessment: DesignAssessment,
  ) -> Result<SavedLine> {
    let new_header_str = encode_uuid(Uuid::new_v4());
    let new_line_str   = encode_uuid(Uuid::new_v4());
    let rcm_str        = encode_uuid(key.rcm_id);
    let user_str       = encode_uuid(key.user_id);
    let now_str        = encode_dt(Utc::now());
    let rcm_id         = key.rcm_id;

    let (header_str, line_str): (String, String) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let rcm_exists: bool = tx
          .query_row(
            "SELECT 1 FROM rcms WHERE rcm_id = ?1",
            rusqlite::params![rcm_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);

        if !rcm_exists {
          return Ok(Err(Error::RcmNotFound(rcm_id)));
        }

        // Resolve or lazily create the header. The lazy path deliberately
        // leaves total_controls at 0 — only explicit creation snapshots it.
        let existing_header: Option<String> = tx
          .query_row(
            "SELECT header_id FROM design_eval_headers
             WHERE rcm_id = ?1 AND user_id = ?2 AND session_name = ?3",
            rusqlite::params![rcm_str, user_str, key.session_name],
            |r| r.get(0),
          )
          .optional()?;

        let header_str = match existing_header {
          Some(id) => id,
          None => {
            tx.execute(
              "INSERT INTO design_eval_headers (
                 header_id, rcm_id, user_id, session_name, status,
                 started_at, last_updated
               ) VALUES (?1, ?2, ?3, ?4, 'IN_PROGRESS', ?5, ?5)",
              rusqlite::params![
                new_header_str, rcm_str, user_str, key.session_name, now_str,
              ],
            )?;
            new_header_str
          }
        };

        let existing_line: Option<String> = tx
          .query_row(
            "SELECT line_id FROM design_eval_lines
             WHERE header_id = ?1 AND control_code = ?2",
            rusqlite::params![header_str, key.control_code],
            |r| r.get(0),
          )
          .optional()?;

        let line_str = match existing_line {
          Some(id) => {
            tx.execute(
              "UPDATE design_eval_lines SET
                 description_adequacy   = ?1,
                 improvement_suggestion = ?2,
                 overall_effectiveness  = ?3,
                 evaluation_rationale   = ?4,
                 recommended_actions    = ?5,
                 last_updated           = ?6
               WHERE line_id = ?7",
              rusqlite::params![
                assessment.description_adequacy,
                assessment.improvement_suggestion,
                assessment.overall_effectiveness,
                assessment.evaluation_rationale,
                assessment.recommended_actions,
                now_str,
                id,
              ],
            )?;
            id
          }
          None => {
            tx.execute(
              "INSERT INTO design_eval_lines (
                 line_id, header_id, control_code, description_adequacy,
                 improvement_suggestion, overall_effectiveness,
                 evaluation_rationale, recommended_actions, evaluated_at,
                 last_updated
               ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
              rusqlite::params![
                new_line_str,
                header_str,
                key.control_code,
                assessment.description_adequacy,
                assessment.improvement_suggestion,
                assessment.overall_effectiveness,
                assessment.evaluation_rationale,
                assessment.recommended_actions,
                now_str,
              ],
            )?;
            new_line_str
          }
        };

        // Touch the header; progress counters stay caller-maintained.
        tx.execute(
          "UPDATE design_eval_headers SET last_updated = ?1 WHERE header_id = ?2",
          rusqlite::params![now_str, header_str],
        )?;

        tx.commit()?;
        Ok(Ok((header_str, line_str)))
      })
      .await
      .map_err(Error::storage)??;

    Ok(SavedLine {
      header_id: decode_uuid(&header_str)?,
      line_id:   decode_uuid(&line_str)?,
    })
  }

  async fn list_design_lines(&self, header_id: Uuid) -> Result<Vec<DesignLine>> {
    let header_str = encode_uuid(header_id);
    let sql = format!(
      "SELECT {} FROM design_eval_lines
       WHERE header_id = ?1 ORDER BY control_code",
      RawDesignLine::COLUMNS
    );

    let raws: Vec<RawDesignLine> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![header_str], RawDesignLine::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await
      .map_err(Error::storage)?;

    raws.into_iter().map(RawDesignLine::into_line).collect()
  }

  async fn update_design_progress(
    &self,
    header_id: Uuid,
    evaluated_controls: u32,
    progress_pct: f64,
  ) -> Result<()> {
    let header_str = encode_uuid(header_id);
    let now_str    = encode_dt(Utc::now());

    let changed: usize = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE design_eval_headers SET
             evaluated_controls = ?1,
             progress_pct       = ?2,
             last_updated       = ?3
           WHERE header_id = ?4",
          rusqlite::params![
            i64::from(evaluated_controls),
            progress_pct,
            now_str,
            header_str,
          ],
        )?)
      })
      .await
      .map_err(Error::storage)?;

    if changed == 0 {
      return Err(Error::HeaderNotFound(header_id));
    }
    Ok(())
  }

  async fn complete_design_session(&self, header_id: Uuid) -> Result<()> {
    let header_str = encode_uuid(header_id);
    let now_str    = encode_dt(Utc::now());

    let changed: usize = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE design_eval_headers SET
             status       = 'COMPLETED',
             completed_at = ?1,
             last_updated = ?1
           WHERE header_id = ?2",
          rusqlite::params![now_str, header_str],
        )?)
      })
      .await
      .map_err(Error::storage)?;

    if changed == 0 {
      return Err(Error::HeaderNotFound(header_id));
    }
    Ok(())
  }

  // ── Operating evaluation ──────────────────────────────────────────────────

  async fn list_completed_design_sessions(
    &self,
    rcm_id: Uuid,
  ) -> Result<Vec<DesignSessionRef>> {
    let rcm_str = encode_uuid(rcm_id);

    let raws: Vec<(String, String, String)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT session_name, status, MAX(started_at) AS started_at
           FROM design_eval_headers
           WHERE rcm_id = ?1 AND status = 'COMPLETED'
           GROUP BY session_name
           ORDER BY started_at DESC",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![rcm_str], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await
      .map_err(Error::storage)?;

    raws
      .into_iter()
      .map(|(session_name, status, started_at)| {
        Ok(DesignSessionRef {
          session_name,
          status: decode_status(&status)?,
          started_at: decode_dt(&started_at)?,
        })
      })
      .collect()
  }

  async fn get_operation_header(
    &self,
    header_id: Uuid,
  ) -> Result<Option<OperationHeader>> {
    let header_str = encode_uuid(header_id);
    let sql = format!(
      "SELECT {} FROM operation_eval_headers WHERE header_id = ?1",
      RawOperationHeader::COLUMNS
    );

    let raw: Option<RawOperationHeader> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &sql,
              rusqlite::params![header_str],
              RawOperationHeader::from_row,
            )
            .optional()?,
        )
      })
      .await
      .map_err(Error::storage)?;

    raw.map(RawOperationHeader::into_header).transpose()
  }

  async fn save_operation_line(
    &self,
    key: OperationLineKey,
    assessment: OperationAssessment,
  ) -> Result<SavedLine> {
    let new_header_str = encode_uuid(Uuid::new_v4());
    let new_line_str   = encode_uuid(Uuid::new_v4());
    let rcm_str        = encode_uuid(key.rcm_id);
    let user_str       = encode_uuid(key.user_id);
    let now_str        = encode_dt(Utc::now());
    let rcm_id         = key.rcm_id;

    let (header_str, line_str): (String, String) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        // Hard precondition: the referenced design session must exist for
        // this RCM. Several users may share the name; the newest wins.
        let design_header: Option<String> = tx
          .query_row(
            "SELECT header_id FROM design_eval_headers
             WHERE rcm_id = ?1 AND session_name = ?2
             ORDER BY started_at DESC
             LIMIT 1",
            rusqlite::params![rcm_str, key.design_session],
            |r| r.get(0),
          )
          .optional()?;

        let Some(design_str) = design_header else {
          return Ok(Err(Error::DesignSessionNotFound {
            rcm_id,
            session: key.design_session,
          }));
        };

        let existing_header: Option<String> = tx
          .query_row(
            "SELECT header_id FROM operation_eval_headers
             WHERE design_header_id = ?1 AND user_id = ?2",
            rusqlite::params![design_str, user_str],
            |r| r.get(0),
          )
          .optional()?;

        let header_str = match existing_header {
          Some(id) => id,
          None => {
            tx.execute(
              "INSERT INTO operation_eval_headers (
                 header_id, rcm_id, design_header_id, user_id, session_name,
                 status, started_at, last_updated
               ) VALUES (?1, ?2, ?3, ?4, ?5, 'IN_PROGRESS', ?6, ?6)",
              rusqlite::params![
                new_header_str, rcm_str, design_str, user_str,
                key.design_session, now_str,
              ],
            )?;
            new_header_str
          }
        };

        let existing_line: Option<String> = tx
          .query_row(
            "SELECT line_id FROM operation_eval_lines
             WHERE header_id = ?1 AND control_code = ?2",
            rusqlite::params![header_str, key.control_code],
            |r| r.get(0),
          )
          .optional()?;

        let sample_size     = assessment.sample_size.map(i64::from);
        let exception_count = assessment.exception_count.map(i64::from);

        let line_str = match existing_line {
          Some(id) => {
            tx.execute(
              "UPDATE operation_eval_lines SET
                 sample_size     = ?1,
                 exception_count = ?2,
                 test_result     = ?3,
                 test_procedure  = ?4,
                 findings        = ?5,
                 last_updated    = ?6
               WHERE line_id = ?7",
              rusqlite::params![
                sample_size,
                exception_count,
                assessment.test_result,
                assessment.test_procedure,
                assessment.findings,
                now_str,
                id,
              ],
            )?;
            id
          }
          None => {
            tx.execute(
              "INSERT INTO operation_eval_lines (
                 line_id, header_id, control_code, sample_size,
                 exception_count, test_result, test_procedure, findings,
                 evaluated_at, last_updated
               ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
              rusqlite::params![
                new_line_str,
                header_str,
                key.control_code,
                sample_size,
                exception_count,
                assessment.test_result,
                assessment.test_procedure,
                assessment.findings,
                now_str,
              ],
            )?;
            new_line_str
          }
        };

        tx.execute(
          "UPDATE operation_eval_headers SET last_updated = ?1
           WHERE header_id = ?2",
          rusqlite::params![now_str, header_str],
        )?;

        tx.commit()?;
        Ok(Ok((header_str, line_str)))
      })
      .await
      .map_err(Error::storage)??;

    Ok(SavedLine {
      header_id: decode_uuid(&header_str)?,
      line_id:   decode_uuid(&line_str)?,
    })
  }

  async fn list_operation_lines(
    &self,
    header_id: Uuid,
  ) -> Result<Vec<OperationLine>> {
    let header_str = encode_uuid(header_id);
    let sql = format!(
      "SELECT {} FROM operation_eval_lines
       WHERE header_id = ?1 ORDER BY control_code",
      RawOperationLine::COLUMNS
    );

    let raws: Vec<RawOperationLine> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![header_str], RawOperationLine::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await
      .map_err(Error::storage)?;

    raws.into_iter().map(RawOperationLine::into_line).collect()
  }

  // ── Activity log ──────────────────────────────────────────────────────────

  async fn record_activity(&self, record: NewActivity) -> Result<()> {
    let activity_str = encode_uuid(Uuid::new_v4());
    let user_str     = record.user_id.map(encode_uuid);
    let now_str      = encode_dt(Utc::now());
    let detail_str   = record
      .detail
      .as_ref()
      .map(serde_json::to_string)
      .transpose()?;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO activity_log (
             activity_id, user_id, email, action, description, url_path,
             ip_address, user_agent, detail, recorded_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
          rusqlite::params![
            activity_str,
            user_str,
            record.email,
            record.action,
            record.description,
            record.url_path,
            record.ip_address,
            record.user_agent,
            detail_str,
            now_str,
          ],
        )?;
        Ok(())
      })
      .await
      .map_err(Error::storage)
  }
}
