//! Seat accounting and the derived part of the activity status machine.
//!
//! Nothing here touches storage. Backends call [`settle`] right after
//! rewriting `confirmed_count` from a fresh count of confirmed inscriptions,
//! inside the same transaction as the write that triggered it.

use chrono::{DateTime, Utc};

use crate::activity::{Activity, ActivityStatus};

/// `max(0, total - confirmed)`.
pub fn available_seats(total_seats: u32, confirmed_count: u32) -> u32 {
  total_seats.saturating_sub(confirmed_count)
}

pub fn is_overcommitted(activity: &Activity) -> bool {
  activity.confirmed_count > activity.total_seats
}

/// Whether `activity` currently counts as accepting enrollments for the
/// purpose of flipping to `SeatsExhausted`.
fn is_open_for_enrollment(activity: &Activity, now: DateTime<Utc>) -> bool {
  match activity.status {
    ActivityStatus::EnrollmentOpen => true,
    ActivityStatus::Published => activity.window_contains(now),
    _ => false,
  }
}

/// The status `activity` should hold given its current count and `now`, or
/// `None` when no automatic transition applies.
///
/// `Draft`, `Published`, `Completed` and `Cancelled` are admin-owned and are
/// never entered here; `Draft` and the terminal states are never left.
pub fn next_status(activity: &Activity, now: DateTime<Utc>) -> Option<ActivityStatus> {
  let full = activity.confirmed_count >= activity.total_seats;

  if full && is_open_for_enrollment(activity, now) && !activity.window_closed(now) {
    return Some(ActivityStatus::SeatsExhausted);
  }

  if activity.status == ActivityStatus::SeatsExhausted
    && !full
    && activity.window_contains(now)
    && !activity.has_started(now)
  {
    return Some(ActivityStatus::EnrollmentOpen);
  }

  let closable = !matches!(
    activity.status,
    ActivityStatus::Draft
      | ActivityStatus::EnrollmentClosed
      | ActivityStatus::SeatsExhausted
      | ActivityStatus::Completed
      | ActivityStatus::Cancelled
  );
  if closable && activity.window_closed(now) && !activity.has_started(now) {
    return Some(ActivityStatus::EnrollmentClosed);
  }

  None
}

/// Install a fresh count and apply [`next_status`]. Returns `true` when
/// either derived field changed.
pub fn settle(activity: &mut Activity, confirmed_count: u32, now: DateTime<Utc>) -> bool {
  let mut changed = activity.confirmed_count != confirmed_count;
  activity.confirmed_count = confirmed_count;
  if let Some(status) = next_status(activity, now) {
    changed |= activity.status != status;
    activity.status = status;
  }
  changed
}
