//! Read-side projections over inscriptions: the admin roster and a student's
//! current/past split.

use chrono::{DateTime, Utc};

use crate::{
  activity::ActivityStatus,
  inscription::{InscriptionStatus, RosterEntry, StudentInscription},
};

fn is_concluded(status: ActivityStatus) -> bool {
  matches!(status, ActivityStatus::Completed | ActivityStatus::Cancelled)
}

/// Confirmed inscriptions in activities that still lie ahead. Orphans are
/// dropped. Sorted by activity start, soonest first.
pub fn current(
  inscriptions: Vec<StudentInscription>,
  now: DateTime<Utc>,
) -> Vec<StudentInscription> {
  let mut out: Vec<_> = inscriptions
    .into_iter()
    .filter(|i| i.status == InscriptionStatus::Confirmed)
    .filter(|i| {
      i.activity
        .as_ref()
        .is_some_and(|a| a.starts_at >= now && !is_concluded(a.status))
    })
    .collect();
  out.sort_by_key(|i| i.activity.as_ref().map(|a| a.starts_at));
  out
}

/// Inscriptions of any status in activities that have started or been
/// concluded. Orphans are dropped. Sorted by activity start, latest first.
pub fn history(
  inscriptions: Vec<StudentInscription>,
  now: DateTime<Utc>,
) -> Vec<StudentInscription> {
  let mut out: Vec<_> = inscriptions
    .into_iter()
    .filter(|i| {
      i.activity
        .as_ref()
        .is_some_and(|a| a.starts_at < now || is_concluded(a.status))
    })
    .collect();
  out.sort_by_key(|i| std::cmp::Reverse(i.activity.as_ref().map(|a| a.starts_at)));
  out
}

/// Roster order: earliest inscription first.
pub fn sort_roster(entries: &mut [RosterEntry]) {
  entries.sort_by_key(|e| e.enrolled_at);
}
