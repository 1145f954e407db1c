//! The `OutreachStore` trait and supporting query types.
//!
//! Implemented by storage backends (e.g. `meninas-store-sqlite`). The HTTP
//! layer depends on this abstraction only.
//!
//! Every method that writes an inscription or an activity's seat total is
//! responsible for recounting the affected activity before it returns, in the
//! same unit of work as the write. Callers never adjust `confirmed_count`
//! themselves.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  activity::{Activity, ActivityFields, ActivityKind, ActivityPatch},
  inscription::{CancelOutcome, Inscription, InscriptionStatus, RosterEntry, StudentInscription},
  session::Session,
  user::{NewUser, ProfilePatch, Role, User},
};

// ─── Query types ─────────────────────────────────────────────────────────────

/// Parameters for [`OutreachStore::list_activities`].
#[derive(Debug, Clone, Default)]
pub struct ActivityQuery {
  /// Case-insensitive substring match on the name.
  pub search:         Option<String>,
  pub kind:           Option<ActivityKind>,
  /// Only activities in a publicly listed status.
  pub listed_only:    bool,
  /// Only activities starting at or after this instant.
  pub starting_after: Option<DateTime<Utc>>,
  pub limit:          Option<usize>,
  pub offset:         Option<usize>,
}

/// A user together with their stored credential hash. Used only by login.
#[derive(Debug, Clone)]
pub struct Credentials {
  pub user:          User,
  /// `None` once the account has been anonymized.
  pub password_hash: Option<String>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a storage backend for users, sessions, activities and
/// inscriptions.
///
/// Domain rejections travel inside `Self::Error` and come back out through
/// the `Into<crate::Error>` bound, so the HTTP layer can map them without
/// knowing the backend.
pub trait OutreachStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static + Into<crate::Error>;

  // ── Users ─────────────────────────────────────────────────────────────

  /// Persist a new account. A case-insensitive email clash is
  /// [`crate::Error::EmailTaken`].
  fn create_user(
    &self,
    input: NewUser,
  ) -> impl Future<Output = Result<User, Self::Error>> + Send + '_;

  fn get_user(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<User>, Self::Error>> + Send + '_;

  fn find_credentials<'a>(
    &'a self,
    email: &'a str,
  ) -> impl Future<Output = Result<Option<Credentials>, Self::Error>> + Send + 'a;

  /// All accounts, newest first, optionally restricted to one role.
  fn list_users(
    &self,
    role: Option<Role>,
  ) -> impl Future<Output = Result<Vec<User>, Self::Error>> + Send + '_;

  fn set_user_active(
    &self,
    id: Uuid,
    active: bool,
  ) -> impl Future<Output = Result<User, Self::Error>> + Send + '_;

  /// Apply a profile edit. Moving onto an email another account already
  /// holds is [`crate::Error::EmailTaken`].
  fn update_profile(
    &self,
    id: Uuid,
    patch: ProfilePatch,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<User, Self::Error>> + Send + '_;

  /// Replace the credential hash and revoke every session of the account
  /// except the one whose digest is `keep_session`.
  fn set_password<'a>(
    &'a self,
    id: Uuid,
    password_hash: String,
    keep_session: &'a str,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Scrub PII, clear the credential and deactivate. Live inscriptions are
  /// cancelled by admin and their activities recounted.
  fn anonymize_user(
    &self,
    id: Uuid,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<User, Self::Error>> + Send + '_;

  /// Remove the account row. Live inscriptions are cancelled by admin and
  /// their activities recounted; sessions are revoked.
  fn delete_user(
    &self,
    id: Uuid,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Sessions ──────────────────────────────────────────────────────────

  fn create_session(
    &self,
    session: Session,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_session<'a>(
    &'a self,
    token_digest: &'a str,
  ) -> impl Future<Output = Result<Option<Session>, Self::Error>> + Send + 'a;

  fn revoke_session<'a>(
    &'a self,
    token_digest: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Activities ────────────────────────────────────────────────────────

  /// `fields` must already be validated.
  fn create_activity(
    &self,
    fields: ActivityFields,
    created_by: Uuid,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Activity, Self::Error>> + Send + '_;

  fn get_activity(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Activity>, Self::Error>> + Send + '_;

  /// Newest first.
  fn list_activities<'a>(
    &'a self,
    query: &'a ActivityQuery,
  ) -> impl Future<Output = Result<Vec<Activity>, Self::Error>> + Send + 'a;

  /// Merge, validate and persist `patch`. Moving to `Cancelled` cancels every
  /// live inscription by admin. The activity is recounted afterwards.
  fn update_activity(
    &self,
    id: Uuid,
    patch: ActivityPatch,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Activity, Self::Error>> + Send + '_;

  /// Refused with [`crate::Error::ActivityHasLiveInscriptions`] while any
  /// live inscription exists; otherwise removes the activity together with
  /// its cancelled inscriptions.
  fn delete_activity(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Inscriptions ──────────────────────────────────────────────────────

  /// Create a confirmed inscription, enforcing the checks in
  /// [`crate::enrollment`] and recounting the activity atomically.
  fn enroll(
    &self,
    student_id: Uuid,
    activity_id: Uuid,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Inscription, Self::Error>> + Send + '_;

  /// Cancel the caller's own inscription. An inscription owned by someone
  /// else is reported as not found.
  fn cancel_inscription(
    &self,
    student_id: Uuid,
    inscription_id: Uuid,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<CancelOutcome, Self::Error>> + Send + '_;

  /// Administrative cancellation. No deadline applies.
  fn admin_cancel_inscription(
    &self,
    inscription_id: Uuid,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Inscription, Self::Error>> + Send + '_;

  /// Record attendance (`Attended` or `Absent`) on a live inscription.
  fn mark_attendance(
    &self,
    inscription_id: Uuid,
    status: InscriptionStatus,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Inscription, Self::Error>> + Send + '_;

  /// Recount confirmed inscriptions for one activity and settle its status.
  /// Idempotent and safe to run concurrently with anything.
  fn recount(
    &self,
    activity_id: Uuid,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Activity, Self::Error>> + Send + '_;

  /// [`Self::recount`] every activity. Returns how many changed.
  fn reconcile(
    &self,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// Live inscriptions for an activity, earliest first.
  fn roster(
    &self,
    activity_id: Uuid,
  ) -> impl Future<Output = Result<Vec<RosterEntry>, Self::Error>> + Send + '_;

  /// Every inscription a student ever held, joined with its activity.
  fn student_inscriptions(
    &self,
    student_id: Uuid,
  ) -> impl Future<Output = Result<Vec<StudentInscription>, Self::Error>> + Send + '_;
}
