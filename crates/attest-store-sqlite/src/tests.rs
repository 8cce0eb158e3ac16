//! Integration tests for `SqliteStore` against an in-memory database.

use attest_core::{
  Error,
  evaluation::{
    DesignAssessment, DesignLineKey, EvaluationStatus, OperationAssessment,
    OperationLineKey,
  },
  rcm::{ControlCategory, ControlDefinition, NewGrant, NewRcm, PermissionType, RcmRole},
  store::ControlStore,
  user::{NewUser, User},
};
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn new_user(email: &str, is_admin: bool) -> NewUser {
  NewUser {
    email:         email.into(),
    display_name:  email.split('@').next().unwrap().into(),
    company:       "Acme Audit".into(),
    password_hash: "$argon2id$v=19$m=19456,t=2,p=1$c2FsdHNhbHQ$aGFzaGhhc2g".into(),
    is_admin,
    expires_at:    None,
  }
}

async fn admin(s: &SqliteStore) -> User {
  s.add_user(new_user("admin@example.com", true)).await.unwrap()
}

async fn member(s: &SqliteStore, email: &str) -> User {
  s.add_user(new_user(email, false)).await.unwrap()
}

async fn make_rcm(
  s: &SqliteStore,
  uploader: &User,
  name: &str,
  category: ControlCategory,
) -> attest_core::rcm::Rcm {
  s.create_rcm(NewRcm {
    name: name.into(),
    category,
    description: None,
    uploaded_by: uploader.user_id,
    source_filename: Some("controls.xlsx".into()),
  })
  .await
  .unwrap()
}

fn definition(code: &str, name: &str) -> ControlDefinition {
  ControlDefinition {
    control_name: name.into(),
    ..ControlDefinition::new(code)
  }
}

fn read_grant(user: &User, rcm: &attest_core::rcm::Rcm, by: &User) -> NewGrant {
  NewGrant {
    user_id:    user.user_id,
    rcm_id:     rcm.rcm_id,
    permission: PermissionType::Read,
    granted_by: by.user_id,
  }
}

// ─── Users ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn add_and_get_user() {
  let s = store().await;

  let user = member(&s, "alice@example.com").await;
  let fetched = s.get_user(user.user_id).await.unwrap().unwrap();

  assert_eq!(fetched.email, "alice@example.com");
  assert_eq!(fetched.display_name, "alice");
  assert!(!fetched.is_admin);
  assert!(fetched.last_login_at.is_none());
}

#[tokio::test]
async fn duplicate_email_is_a_conflict() {
  let s = store().await;
  member(&s, "alice@example.com").await;

  let err = s
    .add_user(new_user("alice@example.com", false))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::EmailTaken(e) if e == "alice@example.com"));
}

#[tokio::test]
async fn find_credentials_returns_hash() {
  let s = store().await;
  let user = member(&s, "alice@example.com").await;

  let creds = s
    .find_credentials("alice@example.com".into())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(creds.user.user_id, user.user_id);
  assert!(creds.password_hash.starts_with("$argon2id$"));

  let missing = s.find_credentials("nobody@example.com".into()).await.unwrap();
  assert!(missing.is_none());
}

#[tokio::test]
async fn expired_users_are_not_listed_as_active() {
  let s = store().await;
  member(&s, "alice@example.com").await;

  let mut expired = new_user("gone@example.com", false);
  expired.expires_at = Some(Utc::now() - Duration::days(1));
  s.add_user(expired).await.unwrap();

  let active = s.list_active_users().await.unwrap();
  assert_eq!(active.len(), 1);
  assert_eq!(active[0].email, "alice@example.com");
}

#[tokio::test]
async fn record_login_stamps_timestamp() {
  let s = store().await;
  let user = member(&s, "alice@example.com").await;

  s.record_login(user.user_id).await.unwrap();
  let fetched = s.get_user(user.user_id).await.unwrap().unwrap();
  assert!(fetched.last_login_at.is_some());
}

// ─── RCMs ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_and_get_rcm() {
  let s = store().await;
  let uploader = admin(&s).await;

  let rcm = make_rcm(&s, &uploader, "FY25 ITGC", ControlCategory::Itgc).await;
  let fetched = s.get_rcm(rcm.rcm_id).await.unwrap().unwrap();

  assert_eq!(fetched.name, "FY25 ITGC");
  assert_eq!(fetched.category, ControlCategory::Itgc);
  assert!(fetched.is_active);
  assert!(fetched.completed_at.is_none());
}

#[tokio::test]
async fn deactivate_rcm_is_soft_and_reported_when_missing() {
  let s = store().await;
  let uploader = admin(&s).await;
  let rcm = make_rcm(&s, &uploader, "FY25 ELC", ControlCategory::Elc).await;

  s.deactivate_rcm(rcm.rcm_id).await.unwrap();

  // The row still exists, just inactive.
  let fetched = s.get_rcm(rcm.rcm_id).await.unwrap().unwrap();
  assert!(!fetched.is_active);

  let err = s.deactivate_rcm(Uuid::new_v4()).await.unwrap_err();
  assert!(matches!(err, Error::RcmNotFound(_)));
}

#[tokio::test]
async fn admins_list_every_active_rcm() {
  let s = store().await;
  let boss = admin(&s).await;
  make_rcm(&s, &boss, "A", ControlCategory::Elc).await;
  make_rcm(&s, &boss, "B", ControlCategory::Tlc).await;
  let hidden = make_rcm(&s, &boss, "C", ControlCategory::Itgc).await;
  s.deactivate_rcm(hidden.rcm_id).await.unwrap();

  let listed = s.list_rcms_for(boss.user_id, None).await.unwrap();
  assert_eq!(listed.len(), 2);
  assert!(listed.iter().all(|r| r.permission == RcmRole::Admin));
}

#[tokio::test]
async fn members_list_only_granted_rcms() {
  let s = store().await;
  let boss = admin(&s).await;
  let alice = member(&s, "alice@example.com").await;

  let mine = make_rcm(&s, &boss, "Mine", ControlCategory::Elc).await;
  make_rcm(&s, &boss, "Not mine", ControlCategory::Elc).await;
  s.grant_access(read_grant(&alice, &mine, &boss)).await.unwrap();

  let listed = s.list_rcms_for(alice.user_id, None).await.unwrap();
  assert_eq!(listed.len(), 1);
  assert_eq!(listed[0].rcm.rcm_id, mine.rcm_id);
  assert_eq!(listed[0].permission, RcmRole::Read);
}

#[tokio::test]
async fn listing_filters_by_category() {
  let s = store().await;
  let boss = admin(&s).await;
  make_rcm(&s, &boss, "A", ControlCategory::Elc).await;
  make_rcm(&s, &boss, "B", ControlCategory::Tlc).await;

  let listed = s
    .list_rcms_for(boss.user_id, Some(ControlCategory::Tlc))
    .await
    .unwrap();
  assert_eq!(listed.len(), 1);
  assert_eq!(listed[0].rcm.category, ControlCategory::Tlc);
}

// ─── Controls ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn upsert_control_is_idempotent_on_code() {
  let s = store().await;
  let boss = admin(&s).await;
  let rcm = make_rcm(&s, &boss, "FY25 ITGC", ControlCategory::Itgc).await;

  s.upsert_control(rcm.rcm_id, definition("ITGC-001", "Access control"))
    .await
    .unwrap();
  s.upsert_control(rcm.rcm_id, definition("ITGC-001", "Access reviews"))
    .await
    .unwrap();

  let controls = s.list_controls(rcm.rcm_id).await.unwrap();
  assert_eq!(controls.len(), 1);
  assert_eq!(controls[0].definition.control_name, "Access reviews");
  assert_eq!(s.control_count(rcm.rcm_id).await.unwrap(), 1);
}

#[tokio::test]
async fn controls_are_listed_in_code_order() {
  let s = store().await;
  let boss = admin(&s).await;
  let rcm = make_rcm(&s, &boss, "FY25 ITGC", ControlCategory::Itgc).await;

  for code in ["ITGC-003", "ITGC-001", "ITGC-002"] {
    s.upsert_control(rcm.rcm_id, definition(code, "x")).await.unwrap();
  }

  let codes: Vec<_> = s
    .list_controls(rcm.rcm_id)
    .await
    .unwrap()
    .into_iter()
    .map(|c| c.definition.control_code)
    .collect();
  assert_eq!(codes, ["ITGC-001", "ITGC-002", "ITGC-003"]);
}

// ─── Access gate ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn admins_always_pass_the_gate() {
  let s = store().await;
  let boss = admin(&s).await;
  let rcm = make_rcm(&s, &boss, "FY25 ELC", ControlCategory::Elc).await;

  assert!(s.has_access(boss.user_id, rcm.rcm_id).await.unwrap());
}

#[tokio::test]
async fn members_need_an_active_grant() {
  let s = store().await;
  let boss = admin(&s).await;
  let alice = member(&s, "alice@example.com").await;
  let rcm = make_rcm(&s, &boss, "FY25 ELC", ControlCategory::Elc).await;

  assert!(!s.has_access(alice.user_id, rcm.rcm_id).await.unwrap());

  s.grant_access(read_grant(&alice, &rcm, &boss)).await.unwrap();
  assert!(s.has_access(alice.user_id, rcm.rcm_id).await.unwrap());

  s.revoke_access(alice.user_id, rcm.rcm_id).await.unwrap();
  assert!(!s.has_access(alice.user_id, rcm.rcm_id).await.unwrap());
}

#[tokio::test]
async fn regrant_reactivates_the_existing_row() {
  let s = store().await;
  let boss = admin(&s).await;
  let alice = member(&s, "alice@example.com").await;
  let rcm = make_rcm(&s, &boss, "FY25 ELC", ControlCategory::Elc).await;

  s.grant_access(read_grant(&alice, &rcm, &boss)).await.unwrap();
  // Granting again must update in place, not error on the unique pair.
  s.grant_access(read_grant(&alice, &rcm, &boss)).await.unwrap();

  s.revoke_access(alice.user_id, rcm.rcm_id).await.unwrap();
  s.grant_access(read_grant(&alice, &rcm, &boss)).await.unwrap();
  assert!(s.has_access(alice.user_id, rcm.rcm_id).await.unwrap());
}

// ─── Design sessions ─────────────────────────────────────────────────────────

#[tokio::test]
async fn explicit_session_snapshots_control_count() {
  let s = store().await;
  let boss = admin(&s).await;
  let rcm = make_rcm(&s, &boss, "FY25 ITGC", ControlCategory::Itgc).await;
  for code in ["ITGC-001", "ITGC-002", "ITGC-003"] {
    s.upsert_control(rcm.rcm_id, definition(code, "x")).await.unwrap();
  }

  let header = s
    .create_design_session(rcm.rcm_id, boss.user_id, "FY25 interim".into())
    .await
    .unwrap();

  assert_eq!(header.status, EvaluationStatus::InProgress);
  assert_eq!(header.total_controls, 3);
  assert_eq!(header.evaluated_controls, 0);

  // Adding a control afterwards must not change the snapshot.
  s.upsert_control(rcm.rcm_id, definition("ITGC-004", "x")).await.unwrap();
  let fetched = s.get_design_header(header.header_id).await.unwrap().unwrap();
  assert_eq!(fetched.total_controls, 3);
}

#[tokio::test]
async fn duplicate_session_name_is_a_conflict() {
  let s = store().await;
  let boss = admin(&s).await;
  let rcm = make_rcm(&s, &boss, "FY25 ITGC", ControlCategory::Itgc).await;

  s.create_design_session(rcm.rcm_id, boss.user_id, "FY25 interim".into())
    .await
    .unwrap();
  let err = s
    .create_design_session(rcm.rcm_id, boss.user_id, "FY25 interim".into())
    .await
    .unwrap_err();

  assert!(
    matches!(err, Error::SessionExists { session, .. } if session == "FY25 interim")
  );
}

#[tokio::test]
async fn same_name_is_fine_for_another_user() {
  let s = store().await;
  let boss = admin(&s).await;
  let alice = member(&s, "alice@example.com").await;
  let rcm = make_rcm(&s, &boss, "FY25 ITGC", ControlCategory::Itgc).await;

  s.create_design_session(rcm.rcm_id, boss.user_id, "FY25 interim".into())
    .await
    .unwrap();
  s.create_design_session(rcm.rcm_id, alice.user_id, "FY25 interim".into())
    .await
    .unwrap();
}

#[tokio::test]
async fn create_session_for_missing_rcm_fails() {
  let s = store().await;
  let boss = admin(&s).await;

  let err = s
    .create_design_session(Uuid::new_v4(), boss.user_id, "x".into())
    .await
    .unwrap_err();
  assert!(matches!(err, Error::RcmNotFound(_)));
}

#[tokio::test]
async fn session_listing_is_scoped_and_newest_first() {
  let s = store().await;
  let boss = admin(&s).await;
  let alice = member(&s, "alice@example.com").await;
  let rcm = make_rcm(&s, &boss, "FY25 ITGC", ControlCategory::Itgc).await;

  s.create_design_session(rcm.rcm_id, alice.user_id, "first".into())
    .await
    .unwrap();
  s.create_design_session(rcm.rcm_id, alice.user_id, "second".into())
    .await
    .unwrap();
  s.create_design_session(rcm.rcm_id, boss.user_id, "admin own".into())
    .await
    .unwrap();

  // Admins see everyone's sessions.
  let all = s.list_design_sessions(rcm.rcm_id, boss.user_id).await.unwrap();
  assert_eq!(all.len(), 3);

  // Members see only their own, newest first.
  let own = s.list_design_sessions(rcm.rcm_id, alice.user_id).await.unwrap();
  assert_eq!(own.len(), 2);
  assert_eq!(own[0].session_name, "second");
  assert_eq!(own[1].session_name, "first");
}

// ─── Design line saves ───────────────────────────────────────────────────────

fn design_key(rcm: Uuid, user: Uuid, session: &str, code: &str) -> DesignLineKey {
  DesignLineKey {
    rcm_id:       rcm,
    user_id:      user,
    session_name: session.into(),
    control_code: code.into(),
  }
}

fn effective() -> DesignAssessment {
  DesignAssessment {
    overall_effectiveness: Some("effective".into()),
    evaluation_rationale: Some("documented and approved".into()),
    ..DesignAssessment::default()
  }
}

#[tokio::test]
async fn lazy_header_creation_does_not_snapshot_totals() {
  let s = store().await;
  let boss = admin(&s).await;
  let rcm = make_rcm(&s, &boss, "FY25 ITGC", ControlCategory::Itgc).await;
  s.upsert_control(rcm.rcm_id, definition("ITGC-001", "x")).await.unwrap();

  let saved = s
    .save_design_line(
      design_key(rcm.rcm_id, boss.user_id, "lazy", "ITGC-001"),
      effective(),
    )
    .await
    .unwrap();

  // The lazy path leaves total_controls at 0, unlike explicit creation.
  let header = s.get_design_header(saved.header_id).await.unwrap().unwrap();
  assert_eq!(header.total_controls, 0);
  assert_eq!(header.status, EvaluationStatus::InProgress);
  assert_eq!(header.session_name, "lazy");
}

#[tokio::test]
async fn save_into_explicit_session_reuses_its_header() {
  let s = store().await;
  let boss = admin(&s).await;
  let rcm = make_rcm(&s, &boss, "FY25 ITGC", ControlCategory::Itgc).await;
  s.upsert_control(rcm.rcm_id, definition("ITGC-001", "x")).await.unwrap();

  let header = s
    .create_design_session(rcm.rcm_id, boss.user_id, "FY25 interim".into())
    .await
    .unwrap();
  let saved = s
    .save_design_line(
      design_key(rcm.rcm_id, boss.user_id, "FY25 interim", "ITGC-001"),
      effective(),
    )
    .await
    .unwrap();

  assert_eq!(saved.header_id, header.header_id);
  let fetched = s.get_design_header(header.header_id).await.unwrap().unwrap();
  assert_eq!(fetched.total_controls, 1);
}

#[tokio::test]
async fn design_line_upsert_is_idempotent() {
  let s = store().await;
  let boss = admin(&s).await;
  let rcm = make_rcm(&s, &boss, "FY25 ITGC", ControlCategory::Itgc).await;

  let key = design_key(rcm.rcm_id, boss.user_id, "s1", "ITGC-001");
  let first = s.save_design_line(key.clone(), effective()).await.unwrap();

  let revised = DesignAssessment {
    overall_effectiveness: Some("ineffective".into()),
    recommended_actions: Some("add reviewer sign-off".into()),
    ..DesignAssessment::default()
  };
  let second = s.save_design_line(key, revised.clone()).await.unwrap();

  assert_eq!(first.header_id, second.header_id);
  assert_eq!(first.line_id, second.line_id);

  let lines = s.list_design_lines(first.header_id).await.unwrap();
  assert_eq!(lines.len(), 1);
  assert_eq!(lines[0].assessment, revised);
}

#[tokio::test]
async fn line_saves_do_not_touch_progress_counters() {
  let s = store().await;
  let boss = admin(&s).await;
  let rcm = make_rcm(&s, &boss, "FY25 ITGC", ControlCategory::Itgc).await;
  s.upsert_control(rcm.rcm_id, definition("ITGC-001", "x")).await.unwrap();

  let header = s
    .create_design_session(rcm.rcm_id, boss.user_id, "s1".into())
    .await
    .unwrap();
  s.save_design_line(
    design_key(rcm.rcm_id, boss.user_id, "s1", "ITGC-001"),
    effective(),
  )
  .await
  .unwrap();

  let fetched = s.get_design_header(header.header_id).await.unwrap().unwrap();
  assert_eq!(fetched.evaluated_controls, 0);
  assert_eq!(fetched.progress_pct, 0.0);
}

#[tokio::test]
async fn progress_and_completion_are_caller_set() {
  let s = store().await;
  let boss = admin(&s).await;
  let rcm = make_rcm(&s, &boss, "FY25 ITGC", ControlCategory::Itgc).await;

  let header = s
    .create_design_session(rcm.rcm_id, boss.user_id, "s1".into())
    .await
    .unwrap();

  s.update_design_progress(header.header_id, 2, 66.7).await.unwrap();
  s.complete_design_session(header.header_id).await.unwrap();

  let fetched = s.get_design_header(header.header_id).await.unwrap().unwrap();
  assert_eq!(fetched.evaluated_controls, 2);
  assert_eq!(fetched.progress_pct, 66.7);
  assert_eq!(fetched.status, EvaluationStatus::Completed);
  assert!(fetched.completed_at.is_some());

  let err = s.update_design_progress(Uuid::new_v4(), 1, 1.0).await.unwrap_err();
  assert!(matches!(err, Error::HeaderNotFound(_)));
}

// ─── Operating evaluation ────────────────────────────────────────────────────

fn op_key(rcm: Uuid, user: Uuid, design: &str, code: &str) -> OperationLineKey {
  OperationLineKey {
    rcm_id:         rcm,
    user_id:        user,
    design_session: design.into(),
    control_code:   code.into(),
  }
}

fn sampled() -> OperationAssessment {
  OperationAssessment {
    sample_size:     Some(25),
    exception_count: Some(0),
    test_result:     Some("pass".into()),
    ..OperationAssessment::default()
  }
}

#[tokio::test]
async fn operation_save_requires_a_design_session() {
  let s = store().await;
  let boss = admin(&s).await;
  let rcm = make_rcm(&s, &boss, "FY25 ITGC", ControlCategory::Itgc).await;

  let err = s
    .save_operation_line(
      op_key(rcm.rcm_id, boss.user_id, "no such session", "ITGC-001"),
      sampled(),
    )
    .await
    .unwrap_err();

  assert!(matches!(
    err,
    Error::DesignSessionNotFound { session, .. } if session == "no such session"
  ));
}

#[tokio::test]
async fn operation_save_links_to_the_design_header() {
  let s = store().await;
  let boss = admin(&s).await;
  let rcm = make_rcm(&s, &boss, "FY25 ITGC", ControlCategory::Itgc).await;

  let design = s
    .create_design_session(rcm.rcm_id, boss.user_id, "FY25 interim".into())
    .await
    .unwrap();
  s.complete_design_session(design.header_id).await.unwrap();

  let saved = s
    .save_operation_line(
      op_key(rcm.rcm_id, boss.user_id, "FY25 interim", "ITGC-001"),
      sampled(),
    )
    .await
    .unwrap();

  let header = s
    .get_operation_header(saved.header_id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(header.design_header_id, design.header_id);
  assert_eq!(header.header.session_name, "FY25 interim");
  assert_eq!(header.header.status, EvaluationStatus::InProgress);
}

#[tokio::test]
async fn operation_line_upsert_is_idempotent() {
  let s = store().await;
  let boss = admin(&s).await;
  let rcm = make_rcm(&s, &boss, "FY25 ITGC", ControlCategory::Itgc).await;
  let design = s
    .create_design_session(rcm.rcm_id, boss.user_id, "s1".into())
    .await
    .unwrap();
  s.complete_design_session(design.header_id).await.unwrap();

  let key = op_key(rcm.rcm_id, boss.user_id, "s1", "ITGC-001");
  let first = s.save_operation_line(key.clone(), sampled()).await.unwrap();

  let revised = OperationAssessment {
    sample_size:     Some(40),
    exception_count: Some(3),
    test_result:     Some("fail".into()),
    findings:        Some("three unapproved changes".into()),
    ..OperationAssessment::default()
  };
  let second = s.save_operation_line(key, revised.clone()).await.unwrap();

  assert_eq!(first.header_id, second.header_id);
  assert_eq!(first.line_id, second.line_id);

  let lines = s.list_operation_lines(first.header_id).await.unwrap();
  assert_eq!(lines.len(), 1);
  assert_eq!(lines[0].assessment, revised);
}

#[tokio::test]
async fn completed_design_sessions_are_distinct_and_newest_first() {
  let s = store().await;
  let boss = admin(&s).await;
  let alice = member(&s, "alice@example.com").await;
  let rcm = make_rcm(&s, &boss, "FY25 ITGC", ControlCategory::Itgc).await;

  let a = s
    .create_design_session(rcm.rcm_id, boss.user_id, "interim".into())
    .await
    .unwrap();
  s.complete_design_session(a.header_id).await.unwrap();

  // Same name, different user: one entry in the completed list.
  let b = s
    .create_design_session(rcm.rcm_id, alice.user_id, "interim".into())
    .await
    .unwrap();
  s.complete_design_session(b.header_id).await.unwrap();

  let c = s
    .create_design_session(rcm.rcm_id, boss.user_id, "year-end".into())
    .await
    .unwrap();
  s.complete_design_session(c.header_id).await.unwrap();

  // Still in progress: excluded.
  s.create_design_session(rcm.rcm_id, boss.user_id, "draft".into())
    .await
    .unwrap();

  let sessions = s.list_completed_design_sessions(rcm.rcm_id).await.unwrap();
  let names: Vec<_> = sessions.iter().map(|r| r.session_name.as_str()).collect();
  assert_eq!(names, ["year-end", "interim"]);
  assert!(sessions.iter().all(|r| r.status == EvaluationStatus::Completed));
}

// ─── Activity log ────────────────────────────────────────────────────────────

#[tokio::test]
async fn activity_records_are_accepted() {
  let s = store().await;
  let boss = admin(&s).await;

  s.record_activity(attest_core::activity::NewActivity {
    user_id:     Some(boss.user_id),
    email:       boss.email.clone(),
    action:      "RCM_IMPORT".into(),
    description: "imported FY25 ITGC".into(),
    url_path:    "/api/rcms/import".into(),
    ip_address:  Some("127.0.0.1".into()),
    user_agent:  Some("attest-tests".into()),
    detail:      Some(serde_json::json!({ "controls": 3 })),
  })
  .await
  .unwrap();
}
