//! SQL schema for the SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.
//!
//! Rows reference each other by id only; there are no foreign keys. Rosters
//! and student histories tolerate dangling ids, and account deletion must not
//! be blocked by inscription history.

use meninas_core::{activity::ActivityStatus, inscription::InscriptionStatus};

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS users (
    user_id       TEXT PRIMARY KEY,
    full_name     TEXT NOT NULL,
    email         TEXT NOT NULL COLLATE NOCASE UNIQUE,
    password_hash TEXT,            -- NULL once anonymized
    role          TEXT NOT NULL CHECK (role IN ('student', 'admin', 'super-admin')),
    is_active     INTEGER NOT NULL DEFAULT 1,
    phone         TEXT,
    school        TEXT,
    grade         TEXT,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

-- Only a digest of each bearer token is stored.
CREATE TABLE IF NOT EXISTS sessions (
    token_digest TEXT PRIMARY KEY,
    user_id      TEXT NOT NULL,
    role         TEXT NOT NULL,
    created_at   TEXT NOT NULL,
    expires_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS activities (
    activity_id           TEXT PRIMARY KEY,
    name                  TEXT NOT NULL,
    kind                  TEXT NOT NULL,
    description           TEXT NOT NULL,
    starts_at             TEXT NOT NULL,
    ends_at               TEXT,
    location              TEXT NOT NULL,
    online_link           TEXT,
    total_seats           INTEGER NOT NULL CHECK (total_seats >= 0),
    enrollment_opens_at   TEXT NOT NULL,
    enrollment_closes_at  TEXT NOT NULL,
    cancellation_deadline TEXT,
    status                TEXT NOT NULL DEFAULT 'draft',
    created_by            TEXT NOT NULL,
    confirmed_count       INTEGER NOT NULL DEFAULT 0 CHECK (confirmed_count >= 0),
    created_at            TEXT NOT NULL,
    updated_at            TEXT NOT NULL,
    CHECK (enrollment_closes_at >= enrollment_opens_at)
);

CREATE TABLE IF NOT EXISTS inscriptions (
    inscription_id TEXT PRIMARY KEY,
    activity_id    TEXT NOT NULL,
    student_id     TEXT NOT NULL,
    status         TEXT NOT NULL DEFAULT 'confirmed',
    enrolled_at    TEXT NOT NULL,
    updated_at     TEXT NOT NULL
);

-- At most one live inscription per (activity, student). Cancelled rows are
-- history and may repeat.
CREATE UNIQUE INDEX IF NOT EXISTS inscriptions_live_pair_idx
    ON inscriptions(activity_id, student_id)
    WHERE status NOT IN ('cancelled_by_student', 'cancelled_by_admin');

CREATE INDEX IF NOT EXISTS inscriptions_activity_idx ON inscriptions(activity_id, status);
CREATE INDEX IF NOT EXISTS inscriptions_student_idx  ON inscriptions(student_id);
CREATE INDEX IF NOT EXISTS sessions_user_idx         ON sessions(user_id);
CREATE INDEX IF NOT EXISTS activities_starts_idx     ON activities(starts_at);

PRAGMA user_version = 1;
";

/// SQL fragment matching live (non-cancelled) inscription statuses.
pub const LIVE_STATUS: &str =
  "status NOT IN ('cancelled_by_student', 'cancelled_by_admin')";

fn quoted_list<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
  names
    .into_iter()
    .map(|n| format!("'{n}'"))
    .collect::<Vec<_>>()
    .join(", ")
}

/// SQL fragment matching the activity statuses shown in the public catalogue.
pub fn listed_status() -> String {
  let listed = ActivityStatus::ALL
    .into_iter()
    .filter(|s| s.is_listed())
    .map(ActivityStatus::as_str);
  format!("status IN ({})", quoted_list(listed))
}

/// SQL fragment matching inscriptions that count against an activity's seats.
pub fn seat_holding_status() -> String {
  let holding = InscriptionStatus::ALL
    .into_iter()
    .filter(|s| s.holds_seat())
    .map(InscriptionStatus::as_str);
  format!("status IN ({})", quoted_list(holding))
}

/// Escape `term` for use in a `LIKE ... ESCAPE '\\'` pattern so it matches
/// literally.
pub fn escape_like(term: &str) -> String {
  let mut escaped = String::with_capacity(term.len());
  for c in term.chars() {
    if matches!(c, '\\' | '%' | '_') {
      escaped.push('\\');
    }
    escaped.push(c);
  }
  escaped
}
