//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 UTC strings with fixed microsecond
//! precision, so lexical order in SQL equals chronological order. UUIDs are
//! stored as hyphenated lowercase strings. Enums use their `as_str` names.

use chrono::{DateTime, SecondsFormat, SubsecRound as _, Utc};
use meninas_core::{
  activity::{Activity, ActivityKind, ActivityStatus, ActivityFields},
  inscription::{ActivitySummary, Inscription, InscriptionStatus, RosterEntry, StudentInscription},
  session::Session,
  user::{PublicProfile, Role, User},
};
use rusqlite::Row;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

/// Truncate to the precision the database keeps, so values handed back to
/// callers equal what a later read returns.
pub fn stored_precision(dt: DateTime<Utc>) -> DateTime<Utc> { dt.trunc_subsecs(6) }

// ─── Enums ───────────────────────────────────────────────────────────────────

fn unknown(column: &'static str, value: &str) -> Error {
  Error::UnknownValue { column, value: value.to_owned() }
}

pub fn decode_role(s: &str) -> Result<Role> {
  Role::parse(s).ok_or_else(|| unknown("role", s))
}

pub fn decode_kind(s: &str) -> Result<ActivityKind> {
  ActivityKind::parse(s).ok_or_else(|| unknown("kind", s))
}

pub fn decode_activity_status(s: &str) -> Result<ActivityStatus> {
  ActivityStatus::parse(s).ok_or_else(|| unknown("activity status", s))
}

pub fn decode_inscription_status(s: &str) -> Result<InscriptionStatus> {
  InscriptionStatus::parse(s).ok_or_else(|| unknown("inscription status", s))
}

// ─── Users ───────────────────────────────────────────────────────────────────

pub const USER_COLUMNS: &str = "user_id, full_name, email, role, is_active, \
                                phone, school, grade, created_at, updated_at";

/// Raw values read from a `users` row, in [`USER_COLUMNS`] order starting at
/// `offset`.
pub struct RawUser {
  pub user_id:    String,
  pub full_name:  String,
  pub email:      String,
  pub role:       String,
  pub is_active:  bool,
  pub phone:      Option<String>,
  pub school:     Option<String>,
  pub grade:      Option<String>,
  pub created_at: String,
  pub updated_at: String,
}

impl RawUser {
  pub fn from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      user_id:    row.get(offset)?,
      full_name:  row.get(offset + 1)?,
      email:      row.get(offset + 2)?,
      role:       row.get(offset + 3)?,
      is_active:  row.get(offset + 4)?,
      phone:      row.get(offset + 5)?,
      school:     row.get(offset + 6)?,
      grade:      row.get(offset + 7)?,
      created_at: row.get(offset + 8)?,
      updated_at: row.get(offset + 9)?,
    })
  }

  pub fn into_user(self) -> Result<User> {
    Ok(User {
      id:         decode_uuid(&self.user_id)?,
      full_name:  self.full_name,
      email:      self.email,
      role:       decode_role(&self.role)?,
      is_active:  self.is_active,
      phone:      self.phone,
      school:     self.school,
      grade:      self.grade,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

/// The roster's view of a student, read through a `LEFT JOIN` so every
/// column may be `NULL`.
pub struct RawProfile {
  pub user_id:   Option<String>,
  pub full_name: Option<String>,
  pub email:     Option<String>,
  pub school:    Option<String>,
  pub grade:     Option<String>,
}

impl RawProfile {
  pub fn into_profile(self) -> Result<Option<PublicProfile>> {
    let (Some(id), Some(full_name), Some(email)) = (self.user_id, self.full_name, self.email)
    else {
      return Ok(None);
    };
    Ok(Some(PublicProfile {
      id: decode_uuid(&id)?,
      full_name,
      email,
      school: self.school,
      grade: self.grade,
    }))
  }
}

// ─── Sessions ────────────────────────────────────────────────────────────────

pub struct RawSession {
  pub token_digest: String,
  pub user_id:      String,
  pub role:         String,
  pub created_at:   String,
  pub expires_at:   String,
}

impl RawSession {
  pub fn into_session(self) -> Result<Session> {
    Ok(Session {
      token_digest: self.token_digest,
      user_id:      decode_uuid(&self.user_id)?,
      role:         decode_role(&self.role)?,
      created_at:   decode_dt(&self.created_at)?,
      expires_at:   decode_dt(&self.expires_at)?,
    })
  }
}

// ─── Activities ──────────────────────────────────────────────────────────────

pub const ACTIVITY_COLUMNS: &str = "activity_id, name, kind, description, starts_at, ends_at, \
                                    location, online_link, total_seats, enrollment_opens_at, \
                                    enrollment_closes_at, cancellation_deadline, status, \
                                    created_by, confirmed_count, created_at, updated_at";

pub struct RawActivity {
  pub activity_id:           String,
  pub name:                  String,
  pub kind:                  String,
  pub description:           String,
  pub starts_at:             String,
  pub ends_at:               Option<String>,
  pub location:              String,
  pub online_link:           Option<String>,
  pub total_seats:           u32,
  pub enrollment_opens_at:   String,
  pub enrollment_closes_at:  String,
  pub cancellation_deadline: Option<String>,
  pub status:                String,
  pub created_by:            String,
  pub confirmed_count:       u32,
  pub created_at:            String,
  pub updated_at:            String,
}

impl RawActivity {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      activity_id:           row.get(0)?,
      name:                  row.get(1)?,
      kind:                  row.get(2)?,
      description:           row.get(3)?,
      starts_at:             row.get(4)?,
      ends_at:               row.get(5)?,
      location:              row.get(6)?,
      online_link:           row.get(7)?,
      total_seats:           row.get(8)?,
      enrollment_opens_at:   row.get(9)?,
      enrollment_closes_at:  row.get(10)?,
      cancellation_deadline: row.get(11)?,
      status:                row.get(12)?,
      created_by:            row.get(13)?,
      confirmed_count:       row.get(14)?,
      created_at:            row.get(15)?,
      updated_at:            row.get(16)?,
    })
  }

  pub fn into_activity(self) -> Result<Activity> {
    Ok(Activity {
      id:                    decode_uuid(&self.activity_id)?,
      name:                  self.name,
      kind:                  decode_kind(&self.kind)?,
      description:           self.description,
      starts_at:             decode_dt(&self.starts_at)?,
      ends_at:               decode_opt_dt(self.ends_at)?,
      location:              self.location,
      online_link:           self.online_link,
      total_seats:           self.total_seats,
      enrollment_opens_at:   decode_dt(&self.enrollment_opens_at)?,
      enrollment_closes_at:  decode_dt(&self.enrollment_closes_at)?,
      cancellation_deadline: decode_opt_dt(self.cancellation_deadline)?,
      status:                decode_activity_status(&self.status)?,
      created_by:            decode_uuid(&self.created_by)?,
      confirmed_count:       self.confirmed_count,
      created_at:            decode_dt(&self.created_at)?,
      updated_at:            decode_dt(&self.updated_at)?,
    })
  }
}

/// Build a fresh activity row from validated fields, truncated to stored
/// precision.
pub fn new_activity(fields: ActivityFields, created_by: Uuid, now: DateTime<Utc>) -> Activity {
  let now = stored_precision(now);
  Activity {
    id: Uuid::new_v4(),
    name: fields.name,
    kind: fields.kind,
    description: fields.description,
    starts_at: stored_precision(fields.starts_at),
    ends_at: fields.ends_at.map(stored_precision),
    location: fields.location,
    online_link: fields.online_link,
    total_seats: fields.total_seats,
    enrollment_opens_at: stored_precision(fields.enrollment_opens_at),
    enrollment_closes_at: stored_precision(fields.enrollment_closes_at),
    cancellation_deadline: fields.cancellation_deadline.map(stored_precision),
    status: fields.status,
    created_by,
    confirmed_count: 0,
    created_at: now,
    updated_at: now,
  }
}

/// `ActivitySummary` columns read through a `LEFT JOIN` from inscriptions.
pub struct RawSummary {
  pub activity_id:           Option<String>,
  pub name:                  Option<String>,
  pub kind:                  Option<String>,
  pub starts_at:             Option<String>,
  pub location:              Option<String>,
  pub cancellation_deadline: Option<String>,
  pub status:                Option<String>,
}

impl RawSummary {
  pub fn into_summary(self) -> Result<Option<ActivitySummary>> {
    let (Some(id), Some(name), Some(kind), Some(starts_at), Some(location), Some(status)) = (
      self.activity_id,
      self.name,
      self.kind,
      self.starts_at,
      self.location,
      self.status,
    ) else {
      return Ok(None);
    };
    Ok(Some(ActivitySummary {
      id: decode_uuid(&id)?,
      name,
      kind: decode_kind(&kind)?,
      starts_at: decode_dt(&starts_at)?,
      location,
      cancellation_deadline: decode_opt_dt(self.cancellation_deadline)?,
      status: decode_activity_status(&status)?,
    }))
  }
}

// ─── Inscriptions ────────────────────────────────────────────────────────────

pub const INSCRIPTION_COLUMNS: &str =
  "inscription_id, activity_id, student_id, status, enrolled_at, updated_at";

pub struct RawInscription {
  pub inscription_id: String,
  pub activity_id:    String,
  pub student_id:     String,
  pub status:         String,
  pub enrolled_at:    String,
  pub updated_at:     String,
}

impl RawInscription {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      inscription_id: row.get(0)?,
      activity_id:    row.get(1)?,
      student_id:     row.get(2)?,
      status:         row.get(3)?,
      enrolled_at:    row.get(4)?,
      updated_at:     row.get(5)?,
    })
  }

  pub fn into_inscription(self) -> Result<Inscription> {
    Ok(Inscription {
      id:          decode_uuid(&self.inscription_id)?,
      activity_id: decode_uuid(&self.activity_id)?,
      student_id:  decode_uuid(&self.student_id)?,
      status:      decode_inscription_status(&self.status)?,
      enrolled_at: decode_dt(&self.enrolled_at)?,
      updated_at:  decode_dt(&self.updated_at)?,
    })
  }
}

/// A roster line: inscription columns followed by the student's profile.
pub struct RawRosterEntry {
  pub inscription_id: String,
  pub enrolled_at:    String,
  pub status:         String,
  pub student:        RawProfile,
}

impl RawRosterEntry {
  pub fn into_entry(self) -> Result<RosterEntry> {
    Ok(RosterEntry {
      inscription_id: decode_uuid(&self.inscription_id)?,
      student:        self.student.into_profile()?,
      enrolled_at:    decode_dt(&self.enrolled_at)?,
      status:         decode_inscription_status(&self.status)?,
    })
  }
}

/// A student's inscription joined with whatever is left of its activity.
pub struct RawStudentInscription {
  pub inscription_id: String,
  pub enrolled_at:    String,
  pub status:         String,
  pub activity:       RawSummary,
}

impl RawStudentInscription {
  pub fn into_student_inscription(self) -> Result<StudentInscription> {
    Ok(StudentInscription {
      id:          decode_uuid(&self.inscription_id)?,
      activity:    self.activity.into_summary()?,
      enrolled_at: decode_dt(&self.enrolled_at)?,
      status:      decode_inscription_status(&self.status)?,
    })
  }
}
