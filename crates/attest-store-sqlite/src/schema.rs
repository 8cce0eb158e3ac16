//! SQL schema for the Attest SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! the `PRAGMA user_version` number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS users (
    user_id       TEXT PRIMARY KEY,
    email         TEXT NOT NULL UNIQUE,
    display_name  TEXT NOT NULL,
    company       TEXT NOT NULL DEFAULT '',
    password_hash TEXT NOT NULL,   -- argon2 PHC string
    is_admin      INTEGER NOT NULL DEFAULT 0,
    created_at    TEXT NOT NULL,   -- ISO 8601 UTC; server-assigned
    expires_at    TEXT,            -- end of validity window; NULL = open-ended
    last_login_at TEXT
);

CREATE TABLE IF NOT EXISTS rcms (
    rcm_id          TEXT PRIMARY KEY,
    name            TEXT NOT NULL,  -- not unique: concurrent uploads may repeat it
    category        TEXT NOT NULL CHECK (category IN ('ELC','TLC','ITGC')),
    description     TEXT,
    uploaded_by     TEXT NOT NULL REFERENCES users(user_id),
    uploaded_at     TEXT NOT NULL,
    source_filename TEXT,
    is_active       INTEGER NOT NULL DEFAULT 1,
    completed_at    TEXT
);

CREATE TABLE IF NOT EXISTS rcm_controls (
    control_id                    TEXT PRIMARY KEY,
    rcm_id                        TEXT NOT NULL REFERENCES rcms(rcm_id),
    control_code                  TEXT NOT NULL,
    control_name                  TEXT NOT NULL DEFAULT '',
    control_description           TEXT NOT NULL DEFAULT '',
    key_control                   TEXT NOT NULL DEFAULT '',
    control_frequency             TEXT NOT NULL DEFAULT '',
    control_type                  TEXT NOT NULL DEFAULT '',
    control_nature                TEXT NOT NULL DEFAULT '',
    process_area                  TEXT NOT NULL DEFAULT '',
    risk_description              TEXT NOT NULL DEFAULT '',
    risk_impact                   TEXT NOT NULL DEFAULT '',
    risk_likelihood               TEXT NOT NULL DEFAULT '',
    population                    TEXT NOT NULL DEFAULT '',
    population_completeness_check TEXT NOT NULL DEFAULT '',
    population_count              TEXT NOT NULL DEFAULT '',
    test_procedure                TEXT NOT NULL DEFAULT '',
    control_owner                 TEXT NOT NULL DEFAULT '',
    control_performer             TEXT NOT NULL DEFAULT '',
    evidence_type                 TEXT NOT NULL DEFAULT '',
    UNIQUE (rcm_id, control_code)
);

-- Grants are soft-revoked, never deleted; re-granting updates the row.
CREATE TABLE IF NOT EXISTS rcm_grants (
    grant_id   TEXT PRIMARY KEY,
    user_id    TEXT NOT NULL REFERENCES users(user_id),
    rcm_id     TEXT NOT NULL REFERENCES rcms(rcm_id),
    permission TEXT NOT NULL DEFAULT 'READ',
    granted_by TEXT REFERENCES users(user_id),
    granted_at TEXT NOT NULL,
    is_active  INTEGER NOT NULL DEFAULT 1,
    UNIQUE (user_id, rcm_id)
);

CREATE TABLE IF NOT EXISTS design_eval_headers (
    header_id          TEXT PRIMARY KEY,
    rcm_id             TEXT NOT NULL REFERENCES rcms(rcm_id),
    user_id            TEXT NOT NULL REFERENCES users(user_id),
    session_name       TEXT NOT NULL,
    status             TEXT NOT NULL DEFAULT 'IN_PROGRESS',
    -- total_controls is snapshotted on explicit creation only; the lazy
    -- path in save_design_line leaves it at 0.
    total_controls     INTEGER NOT NULL DEFAULT 0,
    evaluated_controls INTEGER NOT NULL DEFAULT 0,
    progress_pct       REAL NOT NULL DEFAULT 0.0,
    started_at         TEXT NOT NULL,
    last_updated       TEXT NOT NULL,
    completed_at       TEXT,
    UNIQUE (rcm_id, user_id, session_name)
);

CREATE TABLE IF NOT EXISTS design_eval_lines (
    line_id                TEXT PRIMARY KEY,
    header_id              TEXT NOT NULL REFERENCES design_eval_headers(header_id),
    control_code           TEXT NOT NULL,
    description_adequacy   TEXT,
    improvement_suggestion TEXT,
    overall_effectiveness  TEXT,
    evaluation_rationale   TEXT,
    recommended_actions    TEXT,
    evaluated_at           TEXT NOT NULL,
    last_updated           TEXT NOT NULL,
    UNIQUE (header_id, control_code)
);

CREATE TABLE IF NOT EXISTS operation_eval_headers (
    header_id          TEXT PRIMARY KEY,
    rcm_id             TEXT NOT NULL REFERENCES rcms(rcm_id),
    design_header_id   TEXT NOT NULL REFERENCES design_eval_headers(header_id),
    user_id            TEXT NOT NULL REFERENCES users(user_id),
    session_name       TEXT NOT NULL,
    status             TEXT NOT NULL DEFAULT 'IN_PROGRESS',
    total_controls     INTEGER NOT NULL DEFAULT 0,
    evaluated_controls INTEGER NOT NULL DEFAULT 0,
    progress_pct       REAL NOT NULL DEFAULT 0.0,
    started_at         TEXT NOT NULL,
    last_updated       TEXT NOT NULL,
    completed_at       TEXT,
    UNIQUE (rcm_id, user_id, session_name)
);

CREATE TABLE IF NOT EXISTS operation_eval_lines (
    line_id         TEXT PRIMARY KEY,
    header_id       TEXT NOT NULL REFERENCES operation_eval_headers(header_id),
    control_code    TEXT NOT NULL,
    sample_size     INTEGER,
    exception_count INTEGER,
    test_result     TEXT,
    test_procedure  TEXT,
    findings        TEXT,
    evaluated_at    TEXT NOT NULL,
    last_updated    TEXT NOT NULL,
    UNIQUE (header_id, control_code)
);

-- Append-only; writes are fire-and-forget.
CREATE TABLE IF NOT EXISTS activity_log (
    activity_id TEXT PRIMARY KEY,
    user_id     TEXT,
    email       TEXT NOT NULL DEFAULT '',
    action      TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    url_path    TEXT NOT NULL DEFAULT '',
    ip_address  TEXT,
    user_agent  TEXT,
    detail      TEXT,              -- JSON payload
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS controls_rcm_idx        ON rcm_controls(rcm_id);
CREATE INDEX IF NOT EXISTS grants_user_idx         ON rcm_grants(user_id);
CREATE INDEX IF NOT EXISTS design_headers_rcm_idx  ON design_eval_headers(rcm_id);
CREATE INDEX IF NOT EXISTS design_lines_header_idx ON design_eval_lines(header_id);
CREATE INDEX IF NOT EXISTS op_headers_rcm_idx      ON operation_eval_headers(rcm_id);
CREATE INDEX IF NOT EXISTS op_lines_header_idx     ON operation_eval_lines(header_id);
CREATE INDEX IF NOT EXISTS activity_user_idx       ON activity_log(user_id);

PRAGMA user_version = 1;
";
