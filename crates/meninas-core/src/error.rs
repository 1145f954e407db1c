//! Error types for `meninas-core`.
//!
//! Variants are grouped by how the HTTP layer reports them: validation and
//! business-rule rejections, missing resources, and integrity failures.

use thiserror::Error;
use uuid::Uuid;

use crate::activity::ActivityStatus;

#[derive(Debug, Error)]
pub enum Error {
  // ── Not found ───────────────────────────────────────────────────────────
  // The id is kept for logs; the message is shown to callers as-is.
  #[error("activity not found")]
  ActivityNotFound(Uuid),

  /// Also returned when the inscription exists but belongs to someone else.
  #[error("inscription not found")]
  InscriptionNotFound(Uuid),

  #[error("user not found")]
  UserNotFound(Uuid),

  // ── Business rules ──────────────────────────────────────────────────────
  #[error("this activity is not open for enrollment right now")]
  EnrollmentNotOpen,

  #[error("no seats available for this activity")]
  NoSeatsAvailable,

  #[error("you are already enrolled in this activity")]
  AlreadyEnrolled,

  #[error("this inscription has already been cancelled")]
  AlreadyCancelled,

  #[error("the deadline for cancelling this inscription has passed")]
  CancellationWindowExpired,

  #[error("this email is already in use")]
  EmailTaken,

  #[error("this activity still has live inscriptions")]
  ActivityHasLiveInscriptions(Uuid),

  #[error("cannot move an activity from '{}' to '{}'", .from.as_str(), .to.as_str())]
  InvalidTransition {
    from: ActivityStatus,
    to:   ActivityStatus,
  },

  #[error("{0}")]
  Rejected(String),

  /// Field-level validation failures; one message per offending field.
  #[error("validation failed")]
  Validation(Vec<String>),

  // ── Integrity ───────────────────────────────────────────────────────────
  /// The derived seat count could not be rewritten. Safe to retry: the
  /// recount always starts from the authoritative inscription set.
  #[error("recount failed for activity {activity_id}: {reason}")]
  RecomputeFailed {
    activity_id: Uuid,
    reason:      String,
  },

  #[error("backend error: {0}")]
  Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// `true` for rejections the caller can act on (HTTP 400).
  pub fn is_rejection(&self) -> bool {
    matches!(
      self,
      Self::EnrollmentNotOpen
        | Self::NoSeatsAvailable
        | Self::AlreadyEnrolled
        | Self::AlreadyCancelled
        | Self::CancellationWindowExpired
        | Self::EmailTaken
        | Self::ActivityHasLiveInscriptions(_)
        | Self::InvalidTransition { .. }
        | Self::Rejected(_)
        | Self::Validation(_)
    )
  }

  pub fn is_not_found(&self) -> bool {
    matches!(
      self,
      Self::ActivityNotFound(_) | Self::InscriptionNotFound(_) | Self::UserNotFound(_)
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
