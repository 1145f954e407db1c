//! Synchronous read-modify-write flows, run on the connection thread.
//!
//! Each public function opens its own `BEGIN IMMEDIATE` transaction so the
//! write lock is taken before the first read. Domain rejections are returned
//! as [`Error::Core`] after the transaction has been dropped, which rolls it
//! back.
//!
//! Every flow that touches an inscription or a seat total finishes with
//! [`recount_and_settle`] inside the same transaction.

use chrono::{DateTime, Utc};
use meninas_core::{
  Error as CoreError,
  activity::{Activity, ActivityFields, ActivityPatch, ActivityStatus},
  capacity,
  enrollment::{self, CancelDecision},
  inscription::{CancelOutcome, Inscription, InscriptionStatus},
  user::{ProfilePatch, Tombstone, User},
};
use rusqlite::{Connection, OptionalExtension as _, TransactionBehavior, params};
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    ACTIVITY_COLUMNS, INSCRIPTION_COLUMNS, RawActivity, RawInscription, RawUser, USER_COLUMNS,
    encode_dt, encode_uuid, stored_precision,
  },
  schema::{LIVE_STATUS, seat_holding_status},
};

// ─── Helpers ─────────────────────────────────────────────────────────────────

pub fn is_unique_violation(e: &rusqlite::Error) -> bool {
  matches!(
    e,
    rusqlite::Error::SqliteFailure(f, _)
      if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
  )
}

pub fn load_user(conn: &Connection, id: Uuid) -> Result<Option<User>> {
  let raw = conn
    .query_row(
      &format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = ?1"),
      params![encode_uuid(id)],
      |row| RawUser::from_row(row, 0),
    )
    .optional()?;
  raw.map(RawUser::into_user).transpose()
}

pub fn load_activity(conn: &Connection, id: Uuid) -> Result<Option<Activity>> {
  let raw = conn
    .query_row(
      &format!("SELECT {ACTIVITY_COLUMNS} FROM activities WHERE activity_id = ?1"),
      params![encode_uuid(id)],
      RawActivity::from_row,
    )
    .optional()?;
  raw.map(RawActivity::into_activity).transpose()
}

pub fn load_inscription(conn: &Connection, id: Uuid) -> Result<Option<Inscription>> {
  let raw = conn
    .query_row(
      &format!("SELECT {INSCRIPTION_COLUMNS} FROM inscriptions WHERE inscription_id = ?1"),
      params![encode_uuid(id)],
      RawInscription::from_row,
    )
    .optional()?;
  raw.map(RawInscription::into_inscription).transpose()
}

fn count_confirmed(conn: &Connection, activity_id: Uuid) -> Result<u32> {
  let count: u32 = conn.query_row(
    &format!(
      "SELECT COUNT(*) FROM inscriptions WHERE activity_id = ?1 AND {}",
      seat_holding_status()
    ),
    params![encode_uuid(activity_id)],
    |row| row.get(0),
  )?;
  Ok(count)
}

fn has_live_inscription(conn: &Connection, student_id: Uuid, activity_id: Uuid) -> Result<bool> {
  let found = conn
    .query_row(
      &format!(
        "SELECT 1 FROM inscriptions
         WHERE activity_id = ?1 AND student_id = ?2 AND {LIVE_STATUS}"
      ),
      params![encode_uuid(activity_id), encode_uuid(student_id)],
      |_| Ok(()),
    )
    .optional()?;
  Ok(found.is_some())
}

fn set_inscription_status(
  conn: &Connection,
  mut inscription: Inscription,
  status: InscriptionStatus,
  now: DateTime<Utc>,
) -> Result<Inscription> {
  inscription.status = status;
  inscription.updated_at = stored_precision(now);
  conn.execute(
    "UPDATE inscriptions SET status = ?1, updated_at = ?2 WHERE inscription_id = ?3",
    params![
      status.as_str(),
      encode_dt(inscription.updated_at),
      encode_uuid(inscription.id)
    ],
  )?;
  Ok(inscription)
}

// ─── Recount ─────────────────────────────────────────────────────────────────

/// Replace the cached count with a fresh `COUNT(*)` and apply the derived
/// status rules. Writes only when something changed.
///
/// Storage failures surface as [`CoreError::RecomputeFailed`] so the caller's
/// transaction aborts with a recognisable signal.
pub fn recount_and_settle(conn: &Connection, activity_id: Uuid, now: DateTime<Utc>) -> Result<Activity> {
  let recompute_failed = |e: Error| match e {
    Error::Core(core) => Error::Core(core),
    other => Error::Core(CoreError::RecomputeFailed {
      activity_id,
      reason: other.to_string(),
    }),
  };

  let mut activity = load_activity(conn, activity_id)
    .map_err(recompute_failed)?
    .ok_or(CoreError::ActivityNotFound(activity_id))?;
  let count = count_confirmed(conn, activity_id).map_err(recompute_failed)?;

  if capacity::settle(&mut activity, count, now) {
    activity.updated_at = stored_precision(now);
    conn
      .execute(
        "UPDATE activities SET confirmed_count = ?1, status = ?2, updated_at = ?3
         WHERE activity_id = ?4",
        params![
          activity.confirmed_count,
          activity.status.as_str(),
          encode_dt(activity.updated_at),
          encode_uuid(activity_id)
        ],
      )
      .map_err(|e| recompute_failed(e.into()))?;
  }
  Ok(activity)
}

/// Standalone recount in its own transaction.
pub fn recount(conn: &mut Connection, activity_id: Uuid, now: DateTime<Utc>) -> Result<Activity> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  let activity = recount_and_settle(&tx, activity_id, now)?;
  tx.commit()?;
  Ok(activity)
}

/// Recount every activity; returns how many changed.
pub fn reconcile(conn: &mut Connection, now: DateTime<Utc>) -> Result<usize> {
  let ids: Vec<String> = {
    let mut stmt = conn.prepare("SELECT activity_id FROM activities")?;
    stmt
      .query_map([], |row| row.get(0))?
      .collect::<rusqlite::Result<_>>()?
  };

  let mut changed = 0;
  for id in ids {
    let id = crate::encode::decode_uuid(&id)?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let before = load_activity(&tx, id)?;
    let Some(before) = before else { continue };
    let after = recount_and_settle(&tx, id, now)?;
    tx.commit()?;
    if after.confirmed_count != before.confirmed_count || after.status != before.status {
      changed += 1;
    }
  }
  Ok(changed)
}

fn recount_if_present(conn: &Connection, activity_id: Uuid, now: DateTime<Utc>) -> Result<()> {
  match recount_and_settle(conn, activity_id, now) {
    Ok(_) | Err(Error::Core(CoreError::ActivityNotFound(_))) => Ok(()),
    Err(e) => Err(e),
  }
}

// ─── Enrollment ──────────────────────────────────────────────────────────────

pub fn enroll(
  conn: &mut Connection,
  student_id: Uuid,
  activity_id: Uuid,
  now: DateTime<Utc>,
) -> Result<Inscription> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

  let activity = load_activity(&tx, activity_id)?.ok_or(CoreError::ActivityNotFound(activity_id))?;
  enrollment::check_enrollable(&activity, now)?;
  if has_live_inscription(&tx, student_id, activity_id)? {
    return Err(CoreError::AlreadyEnrolled.into());
  }

  let stamp = stored_precision(now);
  let inscription = Inscription {
    id: Uuid::new_v4(),
    activity_id,
    student_id,
    status: InscriptionStatus::Confirmed,
    enrolled_at: stamp,
    updated_at: stamp,
  };
  tx.execute(
    "INSERT INTO inscriptions
       (inscription_id, activity_id, student_id, status, enrolled_at, updated_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    params![
      encode_uuid(inscription.id),
      encode_uuid(activity_id),
      encode_uuid(student_id),
      inscription.status.as_str(),
      encode_dt(stamp),
      encode_dt(stamp)
    ],
  )
  .map_err(|e| {
    if is_unique_violation(&e) {
      Error::Core(CoreError::AlreadyEnrolled)
    } else {
      e.into()
    }
  })?;

  let settled = recount_and_settle(&tx, activity_id, now)?;
  if !capacity::is_overcommitted(&settled) {
    tx.commit()?;
    return Ok(inscription);
  }

  // The cached count was stale and the insert pushed the activity past its
  // seat total. Undo it, then heal the cache from the table.
  tx.rollback()?;
  tracing::warn!(
    %activity_id,
    confirmed = settled.confirmed_count,
    total = settled.total_seats,
    "enrollment rolled back: activity would be overcommitted"
  );
  recount(conn, activity_id, now)?;
  Err(CoreError::NoSeatsAvailable.into())
}

pub fn cancel_own(
  conn: &mut Connection,
  student_id: Uuid,
  inscription_id: Uuid,
  now: DateTime<Utc>,
) -> Result<CancelOutcome> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

  let inscription = load_inscription(&tx, inscription_id)?
    .filter(|i| i.student_id == student_id)
    .ok_or(CoreError::InscriptionNotFound(inscription_id))?;
  let activity = load_activity(&tx, inscription.activity_id)?;
  let decision = enrollment::check_cancellable(&inscription, activity.as_ref(), now)?;

  let activity_id = inscription.activity_id;
  let cancelled = set_inscription_status(&tx, inscription, InscriptionStatus::CancelledByStudent, now)?;

  let outcome = match decision {
    CancelDecision::Proceed => {
      recount_and_settle(&tx, activity_id, now)?;
      CancelOutcome::Cancelled(cancelled)
    }
    CancelDecision::Orphaned => CancelOutcome::Orphaned(cancelled),
  };
  tx.commit()?;
  Ok(outcome)
}

pub fn admin_cancel(conn: &mut Connection, inscription_id: Uuid, now: DateTime<Utc>) -> Result<Inscription> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

  let inscription =
    load_inscription(&tx, inscription_id)?.ok_or(CoreError::InscriptionNotFound(inscription_id))?;
  if inscription.status.is_cancelled() {
    return Err(CoreError::AlreadyCancelled.into());
  }
  let activity_id = inscription.activity_id;
  let cancelled = set_inscription_status(&tx, inscription, InscriptionStatus::CancelledByAdmin, now)?;
  recount_if_present(&tx, activity_id, now)?;

  tx.commit()?;
  Ok(cancelled)
}

pub fn mark_attendance(
  conn: &mut Connection,
  inscription_id: Uuid,
  status: InscriptionStatus,
  now: DateTime<Utc>,
) -> Result<Inscription> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  let inscription =
    load_inscription(&tx, inscription_id)?.ok_or(CoreError::InscriptionNotFound(inscription_id))?;
  let activity_id = inscription.activity_id;
  let activity = load_activity(&tx, activity_id)?;
  enrollment::check_attendance(&inscription, activity.as_ref(), status, now)?;

  let marked = set_inscription_status(&tx, inscription, status, now)?;
  recount_if_present(&tx, activity_id, now)?;

  tx.commit()?;
  Ok(marked)
}

/// Cancel by admin every live inscription matching `column = id`, then
/// recount each affected activity. Runs inside the caller's transaction.
fn cancel_live_where(conn: &Connection, column: &'static str, id: Uuid, now: DateTime<Utc>) -> Result<()> {
  let activity_ids: Vec<String> = {
    let mut stmt = conn.prepare(&format!(
      "SELECT DISTINCT activity_id FROM inscriptions WHERE {column} = ?1 AND {LIVE_STATUS}"
    ))?;
    stmt
      .query_map(params![encode_uuid(id)], |row| row.get(0))?
      .collect::<rusqlite::Result<_>>()?
  };

  conn.execute(
    &format!(
      "UPDATE inscriptions SET status = ?1, updated_at = ?2 WHERE {column} = ?3 AND {LIVE_STATUS}"
    ),
    params![
      InscriptionStatus::CancelledByAdmin.as_str(),
      encode_dt(stored_precision(now)),
      encode_uuid(id)
    ],
  )?;

  for activity_id in activity_ids {
    recount_if_present(conn, crate::encode::decode_uuid(&activity_id)?, now)?;
  }
  Ok(())
}

// ─── Activities ──────────────────────────────────────────────────────────────

pub fn insert_activity(conn: &mut Connection, activity: &Activity, now: DateTime<Utc>) -> Result<Activity> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  tx.execute(
    &format!(
      "INSERT INTO activities ({ACTIVITY_COLUMNS})
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
    ),
    params![
      encode_uuid(activity.id),
      activity.name,
      activity.kind.as_str(),
      activity.description,
      encode_dt(activity.starts_at),
      activity.ends_at.map(encode_dt),
      activity.location,
      activity.online_link,
      activity.total_seats,
      encode_dt(activity.enrollment_opens_at),
      encode_dt(activity.enrollment_closes_at),
      activity.cancellation_deadline.map(encode_dt),
      activity.status.as_str(),
      encode_uuid(activity.created_by),
      activity.confirmed_count,
      encode_dt(activity.created_at),
      encode_dt(activity.updated_at)
    ],
  )?;
  // A zero-seat activity created as `EnrollmentOpen` is full from the start.
  let settled = recount_and_settle(&tx, activity.id, now)?;
  tx.commit()?;
  Ok(settled)
}

fn write_fields(conn: &Connection, id: Uuid, fields: &ActivityFields, now: DateTime<Utc>) -> Result<()> {
  conn.execute(
    "UPDATE activities SET
       name = ?1, kind = ?2, description = ?3, starts_at = ?4, ends_at = ?5,
       location = ?6, online_link = ?7, total_seats = ?8, enrollment_opens_at = ?9,
       enrollment_closes_at = ?10, cancellation_deadline = ?11, status = ?12,
       updated_at = ?13
     WHERE activity_id = ?14",
    params![
      fields.name,
      fields.kind.as_str(),
      fields.description,
      encode_dt(fields.starts_at),
      fields.ends_at.map(encode_dt),
      fields.location,
      fields.online_link,
      fields.total_seats,
      encode_dt(fields.enrollment_opens_at),
      encode_dt(fields.enrollment_closes_at),
      fields.cancellation_deadline.map(encode_dt),
      fields.status.as_str(),
      encode_dt(stored_precision(now)),
      encode_uuid(id)
    ],
  )?;
  Ok(())
}

pub fn update_activity(
  conn: &mut Connection,
  id: Uuid,
  patch: ActivityPatch,
  now: DateTime<Utc>,
) -> Result<Activity> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

  let current = load_activity(&tx, id)?.ok_or(CoreError::ActivityNotFound(id))?;
  let fields = patch.apply_to(&current)?;
  write_fields(&tx, id, &fields, now)?;
  if fields.status == ActivityStatus::Cancelled && current.status != ActivityStatus::Cancelled {
    cancel_live_where(&tx, "activity_id", id, now)?;
  }
  let updated = recount_and_settle(&tx, id, now)?;

  tx.commit()?;
  Ok(updated)
}

pub fn delete_activity(conn: &mut Connection, id: Uuid) -> Result<()> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

  if load_activity(&tx, id)?.is_none() {
    return Err(CoreError::ActivityNotFound(id).into());
  }
  let live: u32 = tx.query_row(
    &format!("SELECT COUNT(*) FROM inscriptions WHERE activity_id = ?1 AND {LIVE_STATUS}"),
    params![encode_uuid(id)],
    |row| row.get(0),
  )?;
  if live > 0 {
    return Err(CoreError::ActivityHasLiveInscriptions(id).into());
  }
  tx.execute("DELETE FROM inscriptions WHERE activity_id = ?1", params![encode_uuid(id)])?;
  tx.execute("DELETE FROM activities WHERE activity_id = ?1", params![encode_uuid(id)])?;

  tx.commit()?;
  Ok(())
}

// ─── Accounts ────────────────────────────────────────────────────────────────

/// Map a unique-index violation on `users.email` to
/// [`CoreError::EmailTaken`].
pub fn email_clash(e: rusqlite::Error) -> Error {
  if is_unique_violation(&e) {
    Error::Core(CoreError::EmailTaken)
  } else {
    e.into()
  }
}

pub fn update_profile(
  conn: &mut Connection,
  id: Uuid,
  patch: ProfilePatch,
  now: DateTime<Utc>,
) -> Result<User> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

  let current = load_user(&tx, id)?.ok_or(CoreError::UserNotFound(id))?;
  let mut next = patch.apply_to(&current)?;
  next.updated_at = stored_precision(now);
  tx.execute(
    "UPDATE users SET
       full_name = ?1, email = ?2, phone = ?3, school = ?4, grade = ?5, updated_at = ?6
     WHERE user_id = ?7",
    params![
      next.full_name,
      next.email,
      next.phone,
      next.school,
      next.grade,
      encode_dt(next.updated_at),
      encode_uuid(id)
    ],
  )
  .map_err(email_clash)?;

  tx.commit()?;
  Ok(next)
}

pub fn set_password(
  conn: &mut Connection,
  id: Uuid,
  password_hash: &str,
  keep_session: &str,
  now: DateTime<Utc>,
) -> Result<()> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

  let changed = tx.execute(
    "UPDATE users SET password_hash = ?1, updated_at = ?2 WHERE user_id = ?3",
    params![password_hash, encode_dt(stored_precision(now)), encode_uuid(id)],
  )?;
  if changed == 0 {
    return Err(CoreError::UserNotFound(id).into());
  }
  tx.execute(
    "DELETE FROM sessions WHERE user_id = ?1 AND token_digest <> ?2",
    params![encode_uuid(id), keep_session],
  )?;

  tx.commit()?;
  Ok(())
}

pub fn anonymize_user(conn: &mut Connection, id: Uuid, now: DateTime<Utc>) -> Result<User> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

  let user = load_user(&tx, id)?.ok_or(CoreError::UserNotFound(id))?;
  if user.is_anonymized() {
    return Err(CoreError::Rejected("account is already anonymized".into()).into());
  }
  let tombstone = Tombstone::for_user(id);
  tx.execute(
    "UPDATE users SET
       full_name = ?1, email = ?2, password_hash = NULL, is_active = 0,
       phone = NULL, school = NULL, grade = NULL, updated_at = ?3
     WHERE user_id = ?4",
    params![
      tombstone.full_name,
      tombstone.email,
      encode_dt(stored_precision(now)),
      encode_uuid(id)
    ],
  )?;
  tx.execute("DELETE FROM sessions WHERE user_id = ?1", params![encode_uuid(id)])?;
  cancel_live_where(&tx, "student_id", id, now)?;

  let anonymized = load_user(&tx, id)?.ok_or(CoreError::UserNotFound(id))?;
  tx.commit()?;
  Ok(anonymized)
}

pub fn delete_user(conn: &mut Connection, id: Uuid, now: DateTime<Utc>) -> Result<()> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

  if load_user(&tx, id)?.is_none() {
    return Err(CoreError::UserNotFound(id).into());
  }
  cancel_live_where(&tx, "student_id", id, now)?;
  tx.execute("DELETE FROM sessions WHERE user_id = ?1", params![encode_uuid(id)])?;
  tx.execute("DELETE FROM users WHERE user_id = ?1", params![encode_uuid(id)])?;

  tx.commit()?;
  Ok(())
}
