//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{DateTime, Duration, Utc};
use meninas_core::{
  Error as CoreError,
  activity::{Activity, ActivityFields, ActivityKind, ActivityPatch, ActivityStatus},
  inscription::{CancelOutcome, InscriptionStatus},
  session::Session,
  store::{ActivityQuery, OutreachStore},
  user::{NewUser, ProfilePatch, Role, User},
};
use uuid::Uuid;

use crate::{
  Error, SqliteStore,
  encode::{encode_dt, encode_uuid},
};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn core(e: Error) -> CoreError { e.into() }

async fn user(s: &SqliteStore, email: &str, role: Role) -> User {
  s.create_user(NewUser {
    full_name:     format!("User {email}"),
    email:         email.to_owned(),
    password_hash: "$argon2id$placeholder".into(),
    role,
    phone:         None,
    school:        Some("EE Central".into()),
    grade:         Some("9".into()),
  })
  .await
  .unwrap()
}

async fn student(s: &SqliteStore, n: u32) -> User {
  user(s, &format!("student{n}@example.org"), Role::Student).await
}

fn open_fields(now: DateTime<Utc>, seats: u32) -> ActivityFields {
  ActivityFields {
    name:                  "Robotics workshop".into(),
    kind:                  ActivityKind::Workshop,
    description:           "Build a line follower".into(),
    starts_at:             now + Duration::days(7),
    ends_at:               None,
    location:              "Lab 2".into(),
    online_link:           None,
    total_seats:           seats,
    enrollment_opens_at:   now - Duration::hours(1),
    enrollment_closes_at:  now + Duration::days(2),
    cancellation_deadline: Some(now + Duration::days(1)),
    status:                ActivityStatus::EnrollmentOpen,
  }
}

async fn open_activity(s: &SqliteStore, now: DateTime<Utc>, seats: u32) -> Activity {
  s.create_activity(open_fields(now, seats), Uuid::new_v4(), now)
    .await
    .unwrap()
}

async fn reload(s: &SqliteStore, id: Uuid) -> Activity {
  s.get_activity(id).await.unwrap().expect("activity exists")
}

// ─── Users ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_user_normalizes_and_finds_credentials_case_insensitively() {
  let s = store().await;
  let created = user(&s, "  Ana@Example.ORG ", Role::Student).await;
  assert_eq!(created.email, "ana@example.org");
  assert!(created.is_active);

  let creds = s.find_credentials("ANA@example.org").await.unwrap().unwrap();
  assert_eq!(creds.user.id, created.id);
  assert_eq!(creds.password_hash.as_deref(), Some("$argon2id$placeholder"));

  assert!(s.find_credentials("nobody@example.org").await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_email_is_rejected() {
  let s = store().await;
  user(&s, "bia@example.org", Role::Student).await;
  let err = s
    .create_user(NewUser {
      full_name:     "Other Bia".into(),
      email:         "BIA@example.org".into(),
      password_hash: "x".into(),
      role:          Role::Admin,
      phone:         None,
      school:        None,
      grade:         None,
    })
    .await
    .unwrap_err();
  assert!(matches!(core(err), CoreError::EmailTaken));
}

#[tokio::test]
async fn list_users_filters_by_role() {
  let s = store().await;
  student(&s, 1).await;
  student(&s, 2).await;
  user(&s, "admin@example.org", Role::Admin).await;

  assert_eq!(s.list_users(None).await.unwrap().len(), 3);
  let admins = s.list_users(Some(Role::Admin)).await.unwrap();
  assert_eq!(admins.len(), 1);
  assert_eq!(admins[0].role, Role::Admin);
}

#[tokio::test]
async fn deactivating_a_user_revokes_their_sessions() {
  let s = store().await;
  let u = student(&s, 1).await;
  let now = Utc::now();
  s.create_session(Session {
    token_digest: "digest-1".into(),
    user_id:      u.id,
    role:         u.role,
    created_at:   now,
    expires_at:   now + Duration::hours(24),
  })
  .await
  .unwrap();
  assert!(s.get_session("digest-1").await.unwrap().is_some());

  let updated = s.set_user_active(u.id, false).await.unwrap();
  assert!(!updated.is_active);
  assert!(s.get_session("digest-1").await.unwrap().is_none());

  let err = s.set_user_active(Uuid::new_v4(), true).await.unwrap_err();
  assert!(matches!(core(err), CoreError::UserNotFound(_)));
}

#[tokio::test]
async fn revoke_session_removes_it() {
  let s = store().await;
  let u = student(&s, 1).await;
  let now = Utc::now();
  s.create_session(Session {
    token_digest: "abc".into(),
    user_id:      u.id,
    role:         Role::Student,
    created_at:   now,
    expires_at:   now + Duration::hours(1),
  })
  .await
  .unwrap();

  let fetched = s.get_session("abc").await.unwrap().unwrap();
  assert_eq!(fetched.user_id, u.id);
  s.revoke_session("abc").await.unwrap();
  assert!(s.get_session("abc").await.unwrap().is_none());
}

#[tokio::test]
async fn profile_updates_keep_emails_unique() {
  let s = store().await;
  let ana = student(&s, 1).await;
  let bia = student(&s, 2).await;
  let later = Utc::now() + Duration::minutes(5);

  let updated = s
    .update_profile(
      ana.id,
      ProfilePatch {
        full_name: Some("Ana Souza".into()),
        grade: Some(None),
        ..Default::default()
      },
      later,
    )
    .await
    .unwrap();
  assert_eq!(updated.full_name, "Ana Souza");
  assert_eq!(updated.grade, None);
  assert_eq!(updated.school.as_deref(), Some("EE Central"));
  assert!(updated.updated_at > ana.updated_at);
  let stored = s.get_user(ana.id).await.unwrap().unwrap();
  assert_eq!(stored.full_name, "Ana Souza");
  assert_eq!(stored.updated_at, updated.updated_at);

  let clash = ProfilePatch {
    email: Some(bia.email.to_uppercase()),
    ..Default::default()
  };
  let err = s.update_profile(ana.id, clash, later).await.unwrap_err();
  assert!(matches!(core(err), CoreError::EmailTaken));

  let err = s
    .update_profile(Uuid::new_v4(), ProfilePatch::default(), later)
    .await
    .unwrap_err();
  assert!(matches!(core(err), CoreError::UserNotFound(_)));
}

#[tokio::test]
async fn anonymized_accounts_refuse_profile_updates() {
  let s = store().await;
  let u = student(&s, 1).await;
  let now = Utc::now();
  s.anonymize_user(u.id, now).await.unwrap();

  let patch = ProfilePatch {
    full_name: Some("Restored".into()),
    ..Default::default()
  };
  let err = s.update_profile(u.id, patch, now).await.unwrap_err();
  assert!(matches!(core(err), CoreError::Rejected(_)));
}

#[tokio::test]
async fn password_change_revokes_every_other_session() {
  let s = store().await;
  let u = student(&s, 1).await;
  let now = Utc::now();
  for digest in ["kept", "other-1", "other-2"] {
    s.create_session(Session {
      token_digest: digest.into(),
      user_id:      u.id,
      role:         u.role,
      created_at:   now,
      expires_at:   now + Duration::hours(24),
    })
    .await
    .unwrap();
  }

  s.set_password(u.id, "$argon2id$replaced".into(), "kept", now)
    .await
    .unwrap();
  assert!(s.get_session("kept").await.unwrap().is_some());
  assert!(s.get_session("other-1").await.unwrap().is_none());
  assert!(s.get_session("other-2").await.unwrap().is_none());
  let creds = s.find_credentials(&u.email).await.unwrap().unwrap();
  assert_eq!(creds.password_hash.as_deref(), Some("$argon2id$replaced"));

  let err = s
    .set_password(Uuid::new_v4(), "$argon2id$x".into(), "kept", now)
    .await
    .unwrap_err();
  assert!(matches!(core(err), CoreError::UserNotFound(_)));
}

// ─── Enrollment ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn enrolling_takes_a_seat() {
  let s = store().await;
  let now = Utc::now();
  let a = open_activity(&s, now, 2).await;
  let st = student(&s, 1).await;

  let ins = s.enroll(st.id, a.id, now).await.unwrap();
  assert_eq!(ins.status, InscriptionStatus::Confirmed);
  assert_eq!(ins.student_id, st.id);

  let a = reload(&s, a.id).await;
  assert_eq!(a.confirmed_count, 1);
  assert_eq!(a.available_seats(), 1);
  assert_eq!(a.status, ActivityStatus::EnrollmentOpen);
}

#[tokio::test]
async fn last_seat_exhausts_the_activity() {
  let s = store().await;
  let now = Utc::now();
  let a = open_activity(&s, now, 2).await;
  let (s1, s2, s3) = (student(&s, 1).await, student(&s, 2).await, student(&s, 3).await);

  s.enroll(s1.id, a.id, now).await.unwrap();
  s.enroll(s2.id, a.id, now).await.unwrap();
  let full = reload(&s, a.id).await;
  assert_eq!(full.confirmed_count, 2);
  assert_eq!(full.status, ActivityStatus::SeatsExhausted);

  let err = s.enroll(s3.id, a.id, now).await.unwrap_err();
  assert!(matches!(core(err), CoreError::NoSeatsAvailable));
  assert_eq!(reload(&s, a.id).await.confirmed_count, 2);
}

#[tokio::test]
async fn stale_open_status_with_no_seats_reports_no_seats() {
  let s = store().await;
  let now = Utc::now();
  let a = open_activity(&s, now, 1).await;
  s.execute_raw(format!(
    "UPDATE activities SET confirmed_count = 1 WHERE activity_id = '{}'",
    encode_uuid(a.id)
  ))
  .await
  .unwrap();

  let st = student(&s, 1).await;
  let err = s.enroll(st.id, a.id, now).await.unwrap_err();
  assert!(matches!(core(err), CoreError::NoSeatsAvailable));
}

#[tokio::test]
async fn enrolling_twice_is_rejected() {
  let s = store().await;
  let now = Utc::now();
  let a = open_activity(&s, now, 5).await;
  let st = student(&s, 1).await;

  s.enroll(st.id, a.id, now).await.unwrap();
  let err = s.enroll(st.id, a.id, now).await.unwrap_err();
  assert!(matches!(core(err), CoreError::AlreadyEnrolled));
  assert_eq!(reload(&s, a.id).await.confirmed_count, 1);
}

#[tokio::test]
async fn re_enrolling_after_cancelling_is_allowed() {
  let s = store().await;
  let now = Utc::now();
  let a = open_activity(&s, now, 5).await;
  let st = student(&s, 1).await;

  let first = s.enroll(st.id, a.id, now).await.unwrap();
  s.cancel_inscription(st.id, first.id, now).await.unwrap();
  let second = s.enroll(st.id, a.id, now).await.unwrap();
  assert_ne!(first.id, second.id);
  assert_eq!(reload(&s, a.id).await.confirmed_count, 1);
}

#[tokio::test]
async fn enrolling_outside_the_window_is_rejected() {
  let s = store().await;
  let now = Utc::now();
  let mut fields = open_fields(now, 10);
  fields.enrollment_opens_at = now - Duration::days(3);
  fields.enrollment_closes_at = now - Duration::days(1);
  fields.cancellation_deadline = None;
  let closed = s.create_activity(fields, Uuid::new_v4(), now).await.unwrap();
  assert_eq!(closed.status, ActivityStatus::EnrollmentClosed);

  let st = student(&s, 1).await;
  let err = s.enroll(st.id, closed.id, now).await.unwrap_err();
  assert!(matches!(core(err), CoreError::EnrollmentNotOpen));
  let after = reload(&s, closed.id).await;
  assert_eq!(after.confirmed_count, 0);
  assert_eq!(after.available_seats(), 10);
}

#[tokio::test]
async fn enrollment_window_bounds_are_inclusive() {
  let s = store().await;
  let now = Utc::now();
  let a = open_activity(&s, now, 10).await;
  let (s1, s2, s3, s4) = (
    student(&s, 1).await,
    student(&s, 2).await,
    student(&s, 3).await,
    student(&s, 4).await,
  );
  let tick = Duration::microseconds(1);

  let early = s.enroll(s1.id, a.id, a.enrollment_opens_at - tick).await;
  assert!(matches!(early.map_err(core), Err(CoreError::EnrollmentNotOpen)));
  s.enroll(s2.id, a.id, a.enrollment_opens_at).await.unwrap();
  s.enroll(s3.id, a.id, a.enrollment_closes_at).await.unwrap();
  let late = s.enroll(s4.id, a.id, a.enrollment_closes_at + tick).await;
  assert!(matches!(late.map_err(core), Err(CoreError::EnrollmentNotOpen)));
}

#[tokio::test]
async fn draft_and_missing_activities_refuse_enrollment() {
  let s = store().await;
  let now = Utc::now();
  let mut fields = open_fields(now, 10);
  fields.status = ActivityStatus::Draft;
  let draft = s.create_activity(fields, Uuid::new_v4(), now).await.unwrap();
  let st = student(&s, 1).await;

  let err = s.enroll(st.id, draft.id, now).await.unwrap_err();
  assert!(matches!(core(err), CoreError::EnrollmentNotOpen));

  let missing = Uuid::new_v4();
  let err = s.enroll(st.id, missing, now).await.unwrap_err();
  assert!(matches!(core(err), CoreError::ActivityNotFound(id) if id == missing));
}

#[tokio::test]
async fn concurrent_enrollments_never_overbook() {
  let s = store().await;
  let now = Utc::now();
  let a = open_activity(&s, now, 3).await;

  let mut students = Vec::new();
  for n in 0..10 {
    students.push(student(&s, n).await);
  }

  let handles: Vec<_> = students
    .iter()
    .map(|st| {
      let s = s.clone();
      let (student_id, activity_id) = (st.id, a.id);
      tokio::spawn(async move { s.enroll(student_id, activity_id, now).await })
    })
    .collect();

  let mut confirmed = 0;
  for h in handles {
    if h.await.unwrap().is_ok() {
      confirmed += 1;
    }
  }
  assert_eq!(confirmed, 3);
  let a = reload(&s, a.id).await;
  assert_eq!(a.confirmed_count, 3);
  assert_eq!(a.status, ActivityStatus::SeatsExhausted);
}

#[tokio::test]
async fn concurrent_duplicate_enrollments_yield_one_inscription() {
  let s = store().await;
  let now = Utc::now();
  let a = open_activity(&s, now, 10).await;
  let st = student(&s, 1).await;

  let handles: Vec<_> = (0..5)
    .map(|_| {
      let s = s.clone();
      let (student_id, activity_id) = (st.id, a.id);
      tokio::spawn(async move { s.enroll(student_id, activity_id, now).await })
    })
    .collect();

  let mut ok = 0;
  for h in handles {
    match h.await.unwrap() {
      Ok(_) => ok += 1,
      Err(e) => assert!(matches!(core(e), CoreError::AlreadyEnrolled)),
    }
  }
  assert_eq!(ok, 1);
  assert_eq!(reload(&s, a.id).await.confirmed_count, 1);
}

#[tokio::test]
async fn overcommitting_insert_is_rolled_back_and_cache_healed() {
  let s = store().await;
  let now = Utc::now();
  let a = open_activity(&s, now, 1).await;
  let (s1, s2) = (student(&s, 1).await, student(&s, 2).await);

  // A confirmed row the cached count does not know about.
  let stamp = encode_dt(now);
  s.execute_raw(format!(
    "INSERT INTO inscriptions VALUES ('{}', '{}', '{}', 'confirmed', '{stamp}', '{stamp}')",
    encode_uuid(Uuid::new_v4()),
    encode_uuid(a.id),
    encode_uuid(s1.id),
  ))
  .await
  .unwrap();
  assert_eq!(reload(&s, a.id).await.confirmed_count, 0);

  let err = s.enroll(s2.id, a.id, now).await.unwrap_err();
  assert!(matches!(core(err), CoreError::NoSeatsAvailable));

  let healed = reload(&s, a.id).await;
  assert_eq!(healed.confirmed_count, 1);
  assert_eq!(healed.status, ActivityStatus::SeatsExhausted);
  assert!(s.student_inscriptions(s2.id).await.unwrap().is_empty());
}

// ─── Cancellation ────────────────────────────────────────────────────────────

#[tokio::test]
async fn cancelling_frees_the_seat_and_reopens() {
  let s = store().await;
  let now = Utc::now();
  let a = open_activity(&s, now, 1).await;
  let st = student(&s, 1).await;

  let ins = s.enroll(st.id, a.id, now).await.unwrap();
  assert_eq!(reload(&s, a.id).await.status, ActivityStatus::SeatsExhausted);

  let outcome = s.cancel_inscription(st.id, ins.id, now).await.unwrap();
  let CancelOutcome::Cancelled(cancelled) = outcome else {
    panic!("expected a regular cancellation");
  };
  assert_eq!(cancelled.status, InscriptionStatus::CancelledByStudent);

  let a = reload(&s, a.id).await;
  assert_eq!(a.confirmed_count, 0);
  assert_eq!(a.status, ActivityStatus::EnrollmentOpen);
}

#[tokio::test]
async fn cancelling_after_the_deadline_is_rejected() {
  let s = store().await;
  let now = Utc::now();
  let a = open_activity(&s, now, 5).await;
  let st = student(&s, 1).await;
  let ins = s.enroll(st.id, a.id, now).await.unwrap();

  let deadline = a.cancellation_deadline.unwrap();
  let err = s
    .cancel_inscription(st.id, ins.id, deadline + Duration::microseconds(1))
    .await
    .unwrap_err();
  assert!(matches!(core(err), CoreError::CancellationWindowExpired));

  // Exactly at the deadline is still allowed.
  s.cancel_inscription(st.id, ins.id, deadline).await.unwrap();
}

#[tokio::test]
async fn cancelling_twice_or_someone_elses_inscription_is_rejected() {
  let s = store().await;
  let now = Utc::now();
  let a = open_activity(&s, now, 5).await;
  let (owner, other) = (student(&s, 1).await, student(&s, 2).await);
  let ins = s.enroll(owner.id, a.id, now).await.unwrap();

  let err = s.cancel_inscription(other.id, ins.id, now).await.unwrap_err();
  assert!(matches!(core(err), CoreError::InscriptionNotFound(_)));

  s.cancel_inscription(owner.id, ins.id, now).await.unwrap();
  let err = s.cancel_inscription(owner.id, ins.id, now).await.unwrap_err();
  assert!(matches!(core(err), CoreError::AlreadyCancelled));
}

#[tokio::test]
async fn cancelling_an_orphaned_inscription_still_succeeds() {
  let s = store().await;
  let now = Utc::now();
  let a = open_activity(&s, now, 5).await;
  let st = student(&s, 1).await;
  let ins = s.enroll(st.id, a.id, now).await.unwrap();

  s.execute_raw(format!(
    "DELETE FROM activities WHERE activity_id = '{}'",
    encode_uuid(a.id)
  ))
  .await
  .unwrap();

  let outcome = s.cancel_inscription(st.id, ins.id, now).await.unwrap();
  assert!(matches!(outcome, CancelOutcome::Orphaned(_)));
  assert_eq!(outcome.inscription().status, InscriptionStatus::CancelledByStudent);
}

#[tokio::test]
async fn admin_cancellation_ignores_the_deadline() {
  let s = store().await;
  let now = Utc::now();
  let a = open_activity(&s, now, 5).await;
  let st = student(&s, 1).await;
  let ins = s.enroll(st.id, a.id, now).await.unwrap();

  let later = a.cancellation_deadline.unwrap() + Duration::hours(1);
  let cancelled = s.admin_cancel_inscription(ins.id, later).await.unwrap();
  assert_eq!(cancelled.status, InscriptionStatus::CancelledByAdmin);
  assert_eq!(reload(&s, a.id).await.confirmed_count, 0);

  let err = s.admin_cancel_inscription(ins.id, later).await.unwrap_err();
  assert!(matches!(core(err), CoreError::AlreadyCancelled));
}

#[tokio::test]
async fn attendance_is_recorded_on_live_inscriptions_only() {
  let s = store().await;
  let now = Utc::now();
  let a = open_activity(&s, now, 5).await;
  let st = student(&s, 1).await;
  let ins = s.enroll(st.id, a.id, now).await.unwrap();
  let after = a.starts_at + Duration::hours(1);

  let err = s
    .mark_attendance(ins.id, InscriptionStatus::Confirmed, after)
    .await
    .unwrap_err();
  assert!(matches!(core(err), CoreError::Validation(_)));

  let marked = s
    .mark_attendance(ins.id, InscriptionStatus::Attended, after)
    .await
    .unwrap();
  assert_eq!(marked.status, InscriptionStatus::Attended);

  let err = s
    .mark_attendance(Uuid::new_v4(), InscriptionStatus::Absent, after)
    .await
    .unwrap_err();
  assert!(matches!(core(err), CoreError::InscriptionNotFound(_)));
}

#[tokio::test]
async fn attendance_cannot_free_a_seat_while_enrollment_is_open() {
  let s = store().await;
  let now = Utc::now();
  let a = open_activity(&s, now, 1).await;
  let first = student(&s, 1).await;
  let second = student(&s, 2).await;
  let ins = s.enroll(first.id, a.id, now).await.unwrap();

  let err = s
    .mark_attendance(ins.id, InscriptionStatus::Absent, now)
    .await
    .unwrap_err();
  assert!(matches!(core(err), CoreError::Rejected(_)));
  assert_eq!(reload(&s, a.id).await.confirmed_count, 1);

  let err = s.enroll(second.id, a.id, now).await.unwrap_err();
  assert!(matches!(core(err), CoreError::NoSeatsAvailable));

  let closed_not_started = a.enrollment_closes_at + Duration::hours(1);
  let err = s
    .mark_attendance(ins.id, InscriptionStatus::Absent, closed_not_started)
    .await
    .unwrap_err();
  assert!(matches!(core(err), CoreError::Rejected(_)));

  let after = a.starts_at + Duration::hours(1);
  s.mark_attendance(ins.id, InscriptionStatus::Absent, after)
    .await
    .unwrap();
  let err = s.enroll(second.id, a.id, after).await.unwrap_err();
  assert!(matches!(core(err), CoreError::EnrollmentNotOpen));
}

// ─── Recount ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn recount_heals_drift_and_is_idempotent() {
  let s = store().await;
  let now = Utc::now();
  let a = open_activity(&s, now, 5).await;
  let st = student(&s, 1).await;
  s.enroll(st.id, a.id, now).await.unwrap();

  s.execute_raw(format!(
    "UPDATE activities SET confirmed_count = 4 WHERE activity_id = '{}'",
    encode_uuid(a.id)
  ))
  .await
  .unwrap();

  let first = s.recount(a.id, now).await.unwrap();
  assert_eq!(first.confirmed_count, 1);
  let second = s.recount(a.id, now).await.unwrap();
  assert_eq!(second.confirmed_count, 1);
  assert_eq!(second.status, first.status);
  assert_eq!(second.updated_at, first.updated_at);

  let err = s.recount(Uuid::new_v4(), now).await.unwrap_err();
  assert!(matches!(core(err), CoreError::ActivityNotFound(_)));
}

#[tokio::test]
async fn reconcile_reports_only_changed_activities() {
  let s = store().await;
  let now = Utc::now();
  let a = open_activity(&s, now, 5).await;
  let b = open_activity(&s, now, 5).await;
  open_activity(&s, now, 5).await;

  s.execute_raw(format!(
    "UPDATE activities SET confirmed_count = 3 WHERE activity_id IN ('{}', '{}')",
    encode_uuid(a.id),
    encode_uuid(b.id)
  ))
  .await
  .unwrap();

  assert_eq!(s.reconcile(now).await.unwrap(), 2);
  assert_eq!(s.reconcile(now).await.unwrap(), 0);
  assert_eq!(reload(&s, a.id).await.confirmed_count, 0);
}

#[tokio::test]
async fn reconcile_closes_enrollment_once_the_window_passes() {
  let s = store().await;
  let now = Utc::now();
  let a = open_activity(&s, now, 5).await;

  let after_close = a.enrollment_closes_at + Duration::minutes(1);
  assert_eq!(s.reconcile(after_close).await.unwrap(), 1);
  assert_eq!(reload(&s, a.id).await.status, ActivityStatus::EnrollmentClosed);
}

// ─── Activity administration ─────────────────────────────────────────────────

#[tokio::test]
async fn raising_seats_reopens_a_full_activity() {
  let s = store().await;
  let now = Utc::now();
  let a = open_activity(&s, now, 1).await;
  let st = student(&s, 1).await;
  s.enroll(st.id, a.id, now).await.unwrap();
  assert_eq!(reload(&s, a.id).await.status, ActivityStatus::SeatsExhausted);

  let patch = ActivityPatch {
    total_seats: Some(3),
    ..Default::default()
  };
  let updated = s.update_activity(a.id, patch, now).await.unwrap();
  assert_eq!(updated.total_seats, 3);
  assert_eq!(updated.status, ActivityStatus::EnrollmentOpen);
  assert_eq!(updated.available_seats(), 2);
}

#[tokio::test]
async fn seats_cannot_drop_below_confirmed() {
  let s = store().await;
  let now = Utc::now();
  let a = open_activity(&s, now, 5).await;
  for n in 0..3 {
    let st = student(&s, n).await;
    s.enroll(st.id, a.id, now).await.unwrap();
  }

  let patch = ActivityPatch {
    total_seats: Some(2),
    ..Default::default()
  };
  let err = s.update_activity(a.id, patch, now).await.unwrap_err();
  assert!(matches!(core(err), CoreError::Validation(_)));
  assert_eq!(reload(&s, a.id).await.total_seats, 5);
}

#[tokio::test]
async fn cancelling_an_activity_cancels_its_inscriptions() {
  let s = store().await;
  let now = Utc::now();
  let a = open_activity(&s, now, 5).await;
  let st = student(&s, 1).await;
  s.enroll(st.id, a.id, now).await.unwrap();

  let patch = ActivityPatch {
    status: Some(ActivityStatus::Cancelled),
    ..Default::default()
  };
  let updated = s.update_activity(a.id, patch, now).await.unwrap();
  assert_eq!(updated.status, ActivityStatus::Cancelled);
  assert_eq!(updated.confirmed_count, 0);

  let mine = s.student_inscriptions(st.id).await.unwrap();
  assert_eq!(mine.len(), 1);
  assert_eq!(mine[0].status, InscriptionStatus::CancelledByAdmin);

  let reopen = ActivityPatch {
    status: Some(ActivityStatus::EnrollmentOpen),
    ..Default::default()
  };
  let err = s.update_activity(a.id, reopen, now).await.unwrap_err();
  assert!(matches!(core(err), CoreError::InvalidTransition { .. }));
}

#[tokio::test]
async fn deleting_an_activity_requires_no_live_inscriptions() {
  let s = store().await;
  let now = Utc::now();
  let a = open_activity(&s, now, 5).await;
  let st = student(&s, 1).await;
  let ins = s.enroll(st.id, a.id, now).await.unwrap();

  let err = s.delete_activity(a.id).await.unwrap_err();
  assert!(matches!(core(err), CoreError::ActivityHasLiveInscriptions(_)));

  s.admin_cancel_inscription(ins.id, now).await.unwrap();
  s.delete_activity(a.id).await.unwrap();
  assert!(s.get_activity(a.id).await.unwrap().is_none());
  assert!(s.student_inscriptions(st.id).await.unwrap().is_empty());

  let err = s.delete_activity(a.id).await.unwrap_err();
  assert!(matches!(core(err), CoreError::ActivityNotFound(_)));
}

#[tokio::test]
async fn list_activities_applies_filters() {
  let s = store().await;
  let now = Utc::now();
  open_activity(&s, now, 5).await;
  let mut talk = open_fields(now, 50);
  talk.name = "Women in Data talk".into();
  talk.kind = ActivityKind::Talk;
  s.create_activity(talk, Uuid::new_v4(), now).await.unwrap();
  let mut draft = open_fields(now, 5);
  draft.status = ActivityStatus::Draft;
  s.create_activity(draft, Uuid::new_v4(), now).await.unwrap();

  let all = s.list_activities(&ActivityQuery::default()).await.unwrap();
  assert_eq!(all.len(), 3);

  let listed = s
    .list_activities(&ActivityQuery {
      listed_only: true,
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(listed.len(), 2);

  let talks = s
    .list_activities(&ActivityQuery {
      kind: Some(ActivityKind::Talk),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(talks.len(), 1);

  let searched = s
    .list_activities(&ActivityQuery {
      search: Some("data".into()),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(searched.len(), 1);
  assert_eq!(searched[0].kind, ActivityKind::Talk);

  let page = s
    .list_activities(&ActivityQuery {
      limit: Some(1),
      offset: Some(1),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(page.len(), 1);
}

#[tokio::test]
async fn search_treats_wildcards_literally() {
  let s = store().await;
  let now = Utc::now();
  for name in ["50% off hardware", "500 things to build", "snake_case basics", "snakes and ladders"] {
    let mut fields = open_fields(now, 5);
    fields.name = name.into();
    s.create_activity(fields, Uuid::new_v4(), now).await.unwrap();
  }

  let search = |term: &str| ActivityQuery {
    search: Some(term.into()),
    ..Default::default()
  };
  let percent = s.list_activities(&search("50%")).await.unwrap();
  assert_eq!(percent.len(), 1);
  assert_eq!(percent[0].name, "50% off hardware");

  let underscore = s.list_activities(&search("snake_")).await.unwrap();
  assert_eq!(underscore.len(), 1);
  assert_eq!(underscore[0].name, "snake_case basics");
}

// ─── Reads ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn roster_lists_live_inscriptions_in_order() {
  let s = store().await;
  let now = Utc::now();
  let a = open_activity(&s, now, 5).await;
  let (s1, s2, s3) = (student(&s, 1).await, student(&s, 2).await, student(&s, 3).await);

  s.enroll(s2.id, a.id, now).await.unwrap();
  s.enroll(s1.id, a.id, now + Duration::seconds(1)).await.unwrap();
  let gone = s.enroll(s3.id, a.id, now + Duration::seconds(2)).await.unwrap();
  s.cancel_inscription(s3.id, gone.id, now).await.unwrap();

  let roster = s.roster(a.id).await.unwrap();
  assert_eq!(roster.len(), 2);
  assert_eq!(roster[0].student.as_ref().unwrap().id, s2.id);
  assert_eq!(roster[1].student.as_ref().unwrap().id, s1.id);
  assert_eq!(roster[0].student.as_ref().unwrap().school.as_deref(), Some("EE Central"));

  let err = s.roster(Uuid::new_v4()).await.unwrap_err();
  assert!(matches!(core(err), CoreError::ActivityNotFound(_)));
}

#[tokio::test]
async fn roster_tolerates_missing_students() {
  let s = store().await;
  let now = Utc::now();
  let a = open_activity(&s, now, 5).await;
  let st = student(&s, 1).await;
  s.enroll(st.id, a.id, now).await.unwrap();

  s.execute_raw(format!("DELETE FROM users WHERE user_id = '{}'", encode_uuid(st.id)))
    .await
    .unwrap();

  let roster = s.roster(a.id).await.unwrap();
  assert_eq!(roster.len(), 1);
  assert!(roster[0].student.is_none());
}

#[tokio::test]
async fn student_inscriptions_keep_orphans_without_activity() {
  let s = store().await;
  let now = Utc::now();
  let a = open_activity(&s, now, 5).await;
  let b = open_activity(&s, now, 5).await;
  let st = student(&s, 1).await;
  s.enroll(st.id, a.id, now).await.unwrap();
  s.enroll(st.id, b.id, now).await.unwrap();

  s.execute_raw(format!(
    "DELETE FROM activities WHERE activity_id = '{}'",
    encode_uuid(b.id)
  ))
  .await
  .unwrap();

  let mine = s.student_inscriptions(st.id).await.unwrap();
  assert_eq!(mine.len(), 2);
  assert_eq!(mine.iter().filter(|i| i.activity.is_none()).count(), 1);
  let present = mine.iter().find_map(|i| i.activity.as_ref()).unwrap();
  assert_eq!(present.id, a.id);
}

// ─── Account removal ─────────────────────────────────────────────────────────

#[tokio::test]
async fn anonymizing_scrubs_pii_and_releases_seats() {
  let s = store().await;
  let now = Utc::now();
  let a = open_activity(&s, now, 1).await;
  let st = student(&s, 1).await;
  s.enroll(st.id, a.id, now).await.unwrap();

  let anon = s.anonymize_user(st.id, now).await.unwrap();
  assert!(anon.is_anonymized());
  assert!(!anon.is_active);
  assert!(anon.school.is_none());
  assert_ne!(anon.full_name, st.full_name);

  let creds = s.find_credentials(&anon.email).await.unwrap().unwrap();
  assert!(creds.password_hash.is_none());
  assert!(s.find_credentials(&st.email).await.unwrap().is_none());

  let a = reload(&s, a.id).await;
  assert_eq!(a.confirmed_count, 0);
  assert_eq!(a.status, ActivityStatus::EnrollmentOpen);

  let err = s.anonymize_user(st.id, now).await.unwrap_err();
  assert!(matches!(core(err), CoreError::Rejected(_)));
}

#[tokio::test]
async fn deleting_a_user_cancels_live_inscriptions() {
  let s = store().await;
  let now = Utc::now();
  let a = open_activity(&s, now, 3).await;
  let st = student(&s, 1).await;
  s.enroll(st.id, a.id, now).await.unwrap();

  s.delete_user(st.id, now).await.unwrap();
  assert!(s.get_user(st.id).await.unwrap().is_none());
  assert_eq!(reload(&s, a.id).await.confirmed_count, 0);

  let history = s.student_inscriptions(st.id).await.unwrap();
  assert_eq!(history.len(), 1);
  assert_eq!(history[0].status, InscriptionStatus::CancelledByAdmin);

  let err = s.delete_user(st.id, now).await.unwrap_err();
  assert!(matches!(core(err), CoreError::UserNotFound(_)));
}
