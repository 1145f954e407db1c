//! Enrollment preconditions.
//!
//! The checks are pure so a backend can run them inside the same transaction
//! as the write they guard. Order matters: each failure maps to a distinct
//! signal and the first failing check wins.
//!
//! Create:
//! 1. activity exists (backend) → [`Error::ActivityNotFound`]
//! 2. status is in the enrollment phase *and* `now` is inside the window → [`Error::EnrollmentNotOpen`]
//! 3. a seat is free per the cached count → [`Error::NoSeatsAvailable`]
//! 4. no live inscription for the pair (backend, backed by a unique index) → [`Error::AlreadyEnrolled`]
//!
//! Attendance is only recorded once the activity has started and its
//! enrollment window has closed. A marked inscription stops holding a seat,
//! and the freed seat must not become enrollable again.
//!
//! The seat check is advisory. After inserting, the backend recounts from the
//! inscription table and aborts the transaction if the activity ended up
//! overcommitted.

use chrono::{DateTime, Utc};

use crate::{
  Error, Result,
  activity::{Activity, ActivityStatus},
  inscription::{Inscription, InscriptionStatus},
};

/// `SeatsExhausted` is the full sub-state of `EnrollmentOpen`: it passes the
/// status check so that a full activity reports [`Error::NoSeatsAvailable`].
fn in_enrollment_phase(status: ActivityStatus) -> bool {
  matches!(
    status,
    ActivityStatus::EnrollmentOpen | ActivityStatus::SeatsExhausted
  )
}

pub fn check_enrollable(activity: &Activity, now: DateTime<Utc>) -> Result<()> {
  if !in_enrollment_phase(activity.status) || !activity.window_contains(now) {
    return Err(Error::EnrollmentNotOpen);
  }
  if activity.confirmed_count >= activity.total_seats {
    return Err(Error::NoSeatsAvailable);
  }
  Ok(())
}

/// What a backend should do with a cancellation that passed its checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelDecision {
  /// Cancel, then recount the activity.
  Proceed,
  /// The activity is gone; cancel without a recount and report the anomaly.
  Orphaned,
}

/// Checks for a student cancelling their own inscription. Ownership has
/// already been established by the lookup.
pub fn check_cancellable(
  inscription: &Inscription,
  activity: Option<&Activity>,
  now: DateTime<Utc>,
) -> Result<CancelDecision> {
  if inscription.status.is_cancelled() {
    return Err(Error::AlreadyCancelled);
  }
  let Some(activity) = activity else {
    return Ok(CancelDecision::Orphaned);
  };
  if activity
    .cancellation_deadline
    .is_some_and(|deadline| now > deadline)
  {
    return Err(Error::CancellationWindowExpired);
  }
  Ok(CancelDecision::Proceed)
}

/// Checks for an admin recording attendance on an inscription. A missing
/// activity does not block the mark.
pub fn check_attendance(
  inscription: &Inscription,
  activity: Option<&Activity>,
  status: InscriptionStatus,
  now: DateTime<Utc>,
) -> Result<()> {
  if !status.is_attendance() {
    return Err(Error::Validation(vec![format!(
      "attendance must be 'attended' or 'absent', not '{}'",
      status.as_str()
    )]));
  }
  if inscription.status.is_cancelled() {
    return Err(Error::AlreadyCancelled);
  }
  if let Some(activity) = activity
    && !(activity.has_started(now) && activity.window_closed(now))
  {
    return Err(Error::Rejected(
      "attendance can only be recorded once the activity has started and enrollment has closed"
        .into(),
    ));
  }
  Ok(())
}
