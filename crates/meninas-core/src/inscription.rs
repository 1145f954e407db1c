//! Inscriptions bind one student to one activity.
//!
//! Inscriptions are never deleted by the student flows; cancellation is a
//! status transition. At most one live (non-cancelled) inscription exists per
//! `(student, activity)` pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  activity::{ActivityKind, ActivityStatus},
  user::PublicProfile,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InscriptionStatus {
  Confirmed,
  CancelledByStudent,
  CancelledByAdmin,
  Waitlisted,
  Attended,
  Absent,
}

impl InscriptionStatus {
  pub const ALL: [Self; 6] = [
    Self::Confirmed,
    Self::CancelledByStudent,
    Self::CancelledByAdmin,
    Self::Waitlisted,
    Self::Attended,
    Self::Absent,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Confirmed => "confirmed",
      Self::CancelledByStudent => "cancelled_by_student",
      Self::CancelledByAdmin => "cancelled_by_admin",
      Self::Waitlisted => "waitlisted",
      Self::Attended => "attended",
      Self::Absent => "absent",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "confirmed" => Some(Self::Confirmed),
      "cancelled_by_student" => Some(Self::CancelledByStudent),
      "cancelled_by_admin" => Some(Self::CancelledByAdmin),
      "waitlisted" => Some(Self::Waitlisted),
      "attended" => Some(Self::Attended),
      "absent" => Some(Self::Absent),
      _ => None,
    }
  }

  pub fn is_cancelled(self) -> bool {
    matches!(self, Self::CancelledByStudent | Self::CancelledByAdmin)
  }

  /// Counts against the activity's seats.
  pub fn holds_seat(self) -> bool { self == Self::Confirmed }

  /// Attendance can only be recorded over a live inscription.
  pub fn is_attendance(self) -> bool { matches!(self, Self::Attended | Self::Absent) }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inscription {
  pub id:          Uuid,
  pub activity_id: Uuid,
  pub student_id:  Uuid,
  pub status:      InscriptionStatus,
  pub enrolled_at: DateTime<Utc>,
  pub updated_at:  DateTime<Utc>,
}

/// How a student's cancellation request was resolved.
#[derive(Debug, Clone)]
pub enum CancelOutcome {
  /// Cancelled within the deadline; the activity was recounted.
  Cancelled(Inscription),
  /// The inscription pointed at an activity that no longer exists. It was
  /// cancelled anyway so the student is not stuck with it.
  Orphaned(Inscription),
}

impl CancelOutcome {
  pub fn inscription(&self) -> &Inscription {
    match self {
      Self::Cancelled(i) | Self::Orphaned(i) => i,
    }
  }
}

// ─── Read models ─────────────────────────────────────────────────────────────

/// One line of an admin roster. `student` is `None` when the referenced
/// account no longer exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
  pub inscription_id: Uuid,
  pub student:        Option<PublicProfile>,
  pub enrolled_at:    DateTime<Utc>,
  pub status:         InscriptionStatus,
}

/// The slice of an activity shown next to a student's own inscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySummary {
  pub id:                    Uuid,
  pub name:                  String,
  pub kind:                  ActivityKind,
  pub starts_at:             DateTime<Utc>,
  pub location:              String,
  pub cancellation_deadline: Option<DateTime<Utc>>,
  pub status:                ActivityStatus,
}

/// A student's inscription joined with its activity (`None` when orphaned).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentInscription {
  pub id:          Uuid,
  pub activity:    Option<ActivitySummary>,
  pub enrolled_at: DateTime<Utc>,
  pub status:      InscriptionStatus,
}
