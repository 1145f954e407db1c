//! [`SqliteStore`], the SQLite implementation of [`OutreachStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, params};
use uuid::Uuid;

use meninas_core::{
  Error as CoreError,
  activity::{Activity, ActivityFields, ActivityPatch},
  inscription::{CancelOutcome, Inscription, InscriptionStatus, RosterEntry, StudentInscription},
  roster,
  session::Session,
  store::{ActivityQuery, Credentials, OutreachStore},
  user::{NewUser, ProfilePatch, Role, User},
};

use crate::{
  Error, Result,
  encode::{
    ACTIVITY_COLUMNS, RawActivity, RawProfile, RawRosterEntry, RawSession, RawStudentInscription,
    RawSummary, RawUser, USER_COLUMNS, encode_dt, encode_uuid, new_activity, stored_precision,
  },
  schema::{LIVE_STATUS, SCHEMA, escape_like, listed_status},
  tx,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// An activities store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run a synchronous flow from [`tx`] on the connection thread.
  async fn run<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&mut rusqlite::Connection) -> Result<T> + Send + 'static,
  {
    self.conn.call(move |conn| Ok(f(conn))).await?
  }

  /// Execute raw SQL, bypassing every invariant. Tests use this to fake
  /// drift between the cached count and the inscription table.
  #[cfg(test)]
  pub(crate) async fn execute_raw(&self, sql: impl Into<String>) -> Result<()> {
    let sql = sql.into();
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(&sql)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

impl OutreachStore for SqliteStore {
  type Error = Error;

  // ── Users ─────────────────────────────────────────────────────────────────

  async fn create_user(&self, input: NewUser) -> Result<User> {
    let input = input.normalized()?;
    let now = stored_precision(Utc::now());
    let user = User {
      id:         Uuid::new_v4(),
      full_name:  input.full_name,
      email:      input.email,
      role:       input.role,
      is_active:  true,
      phone:      input.phone,
      school:     input.school,
      grade:      input.grade,
      created_at: now,
      updated_at: now,
    };

    let row = user.clone();
    let password_hash = input.password_hash;
    self
      .run(move |conn| {
        conn
          .execute(
            &format!(
              "INSERT INTO users ({USER_COLUMNS}, password_hash)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
            ),
            params![
              encode_uuid(row.id),
              row.full_name,
              row.email,
              row.role.as_str(),
              row.is_active,
              row.phone,
              row.school,
              row.grade,
              encode_dt(row.created_at),
              encode_dt(row.updated_at),
              password_hash
            ],
          )
          .map_err(tx::email_clash)?;
        Ok(())
      })
      .await?;

    Ok(user)
  }

  async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
    self.run(move |conn| tx::load_user(conn, id)).await
  }

  async fn find_credentials(&self, email: &str) -> Result<Option<Credentials>> {
    let email = meninas_core::user::normalize_email(email);

    let raw: Option<(RawUser, Option<String>)> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {USER_COLUMNS}, password_hash FROM users WHERE email = ?1"),
              params![email],
              |row| Ok((RawUser::from_row(row, 0)?, row.get(10)?)),
            )
            .optional()?,
        )
      })
      .await?;

    raw
      .map(|(user, password_hash)| {
        Ok(Credentials {
          user: user.into_user()?,
          password_hash,
        })
      })
      .transpose()
  }

  async fn list_users(&self, role: Option<Role>) -> Result<Vec<User>> {
    let role_str = role.map(|r| r.as_str().to_owned());

    let raws: Vec<RawUser> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {USER_COLUMNS} FROM users
           WHERE ?1 IS NULL OR role = ?1
           ORDER BY created_at DESC"
        ))?;
        let rows = stmt
          .query_map(params![role_str], |row| RawUser::from_row(row, 0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawUser::into_user).collect()
  }

  async fn set_user_active(&self, id: Uuid, active: bool) -> Result<User> {
    let now = encode_dt(stored_precision(Utc::now()));
    self
      .run(move |conn| {
        let changed = conn.execute(
          "UPDATE users SET is_active = ?1, updated_at = ?2 WHERE user_id = ?3",
          params![active, now, encode_uuid(id)],
        )?;
        if changed == 0 {
          return Err(CoreError::UserNotFound(id).into());
        }
        if !active {
          conn.execute("DELETE FROM sessions WHERE user_id = ?1", params![encode_uuid(id)])?;
        }
        tx::load_user(conn, id)?.ok_or(CoreError::UserNotFound(id).into())
      })
      .await
  }

  async fn update_profile(
    &self,
    id: Uuid,
    patch: ProfilePatch,
    now: DateTime<Utc>,
  ) -> Result<User> {
    self
      .run(move |conn| tx::update_profile(conn, id, patch, now))
      .await
  }

  async fn set_password(
    &self,
    id: Uuid,
    password_hash: String,
    keep_session: &str,
    now: DateTime<Utc>,
  ) -> Result<()> {
    let keep = keep_session.to_owned();
    self
      .run(move |conn| tx::set_password(conn, id, &password_hash, &keep, now))
      .await
  }

  async fn anonymize_user(&self, id: Uuid, now: DateTime<Utc>) -> Result<User> {
    self.run(move |conn| tx::anonymize_user(conn, id, now)).await
  }

  async fn delete_user(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
    self.run(move |conn| tx::delete_user(conn, id, now)).await
  }

  // ── Sessions ──────────────────────────────────────────────────────────────

  async fn create_session(&self, session: Session) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO sessions (token_digest, user_id, role, created_at, expires_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          params![
            session.token_digest,
            encode_uuid(session.user_id),
            session.role.as_str(),
            encode_dt(session.created_at),
            encode_dt(session.expires_at)
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_session(&self, token_digest: &str) -> Result<Option<Session>> {
    let digest = token_digest.to_owned();

    let raw: Option<RawSession> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT token_digest, user_id, role, created_at, expires_at
               FROM sessions WHERE token_digest = ?1",
              params![digest],
              |row| {
                Ok(RawSession {
                  token_digest: row.get(0)?,
                  user_id:      row.get(1)?,
                  role:         row.get(2)?,
                  created_at:   row.get(3)?,
                  expires_at:   row.get(4)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawSession::into_session).transpose()
  }

  async fn revoke_session(&self, token_digest: &str) -> Result<()> {
    let digest = token_digest.to_owned();
    self
      .conn
      .call(move |conn| {
        conn.execute("DELETE FROM sessions WHERE token_digest = ?1", params![digest])?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Activities ────────────────────────────────────────────────────────────

  async fn create_activity(
    &self,
    fields: ActivityFields,
    created_by: Uuid,
    now: DateTime<Utc>,
  ) -> Result<Activity> {
    let activity = new_activity(fields, created_by, now);
    self
      .run(move |conn| tx::insert_activity(conn, &activity, now))
      .await
  }

  async fn get_activity(&self, id: Uuid) -> Result<Option<Activity>> {
    self.run(move |conn| tx::load_activity(conn, id)).await
  }

  async fn list_activities(&self, query: &ActivityQuery) -> Result<Vec<Activity>> {
    let search = query
      .search
      .as_deref()
      .map(|t| format!("%{}%", escape_like(t.trim())));
    let kind = query.kind.map(|k| k.as_str().to_owned());
    let starting_after = query.starting_after.map(encode_dt);
    let listed_only = query.listed_only;
    let limit = query.limit.map_or(-1, |l| l as i64);
    let offset = query.offset.unwrap_or(0) as i64;

    let raws: Vec<RawActivity> = self
      .conn
      .call(move |conn| {
        let mut conds: Vec<String> = vec![];
        if search.is_some() {
          conds.push(r"name LIKE ?1 ESCAPE '\'".to_owned());
        }
        if kind.is_some() {
          conds.push("kind = ?2".to_owned());
        }
        if starting_after.is_some() {
          conds.push("starts_at >= ?3".to_owned());
        }
        if listed_only {
          conds.push(listed_status());
        }

        let where_clause = if conds.is_empty() {
          String::new()
        } else {
          format!("WHERE {}", conds.join(" AND "))
        };

        let sql = format!(
          "SELECT {ACTIVITY_COLUMNS} FROM activities
           {where_clause}
           ORDER BY created_at DESC
           LIMIT ?4 OFFSET ?5"
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(
            params![
              search.as_deref(),
              kind.as_deref(),
              starting_after.as_deref(),
              limit,
              offset
            ],
            RawActivity::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawActivity::into_activity).collect()
  }

  async fn update_activity(
    &self,
    id: Uuid,
    patch: ActivityPatch,
    now: DateTime<Utc>,
  ) -> Result<Activity> {
    self
      .run(move |conn| tx::update_activity(conn, id, patch, now))
      .await
  }

  async fn delete_activity(&self, id: Uuid) -> Result<()> {
    self.run(move |conn| tx::delete_activity(conn, id)).await
  }

  // ── Inscriptions ──────────────────────────────────────────────────────────

  async fn enroll(
    &self,
    student_id: Uuid,
    activity_id: Uuid,
    now: DateTime<Utc>,
  ) -> Result<Inscription> {
    self
      .run(move |conn| tx::enroll(conn, student_id, activity_id, now))
      .await
  }

  async fn cancel_inscription(
    &self,
    student_id: Uuid,
    inscription_id: Uuid,
    now: DateTime<Utc>,
  ) -> Result<CancelOutcome> {
    self
      .run(move |conn| tx::cancel_own(conn, student_id, inscription_id, now))
      .await
  }

  async fn admin_cancel_inscription(
    &self,
    inscription_id: Uuid,
    now: DateTime<Utc>,
  ) -> Result<Inscription> {
    self
      .run(move |conn| tx::admin_cancel(conn, inscription_id, now))
      .await
  }

  async fn mark_attendance(
    &self,
    inscription_id: Uuid,
    status: InscriptionStatus,
    now: DateTime<Utc>,
  ) -> Result<Inscription> {
    self
      .run(move |conn| tx::mark_attendance(conn, inscription_id, status, now))
      .await
  }

  async fn recount(&self, activity_id: Uuid, now: DateTime<Utc>) -> Result<Activity> {
    self.run(move |conn| tx::recount(conn, activity_id, now)).await
  }

  async fn reconcile(&self, now: DateTime<Utc>) -> Result<usize> {
    self.run(move |conn| tx::reconcile(conn, now)).await
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn roster(&self, activity_id: Uuid) -> Result<Vec<RosterEntry>> {
    if self.get_activity(activity_id).await?.is_none() {
      return Err(CoreError::ActivityNotFound(activity_id).into());
    }
    let id_str = encode_uuid(activity_id);

    let raws: Vec<RawRosterEntry> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT i.inscription_id, i.enrolled_at, i.status,
                  u.user_id, u.full_name, u.email, u.school, u.grade
           FROM inscriptions i
           LEFT JOIN users u ON u.user_id = i.student_id
           WHERE i.activity_id = ?1 AND i.{LIVE_STATUS}"
        ))?;
        let rows = stmt
          .query_map(params![id_str], |row| {
            Ok(RawRosterEntry {
              inscription_id: row.get(0)?,
              enrolled_at:    row.get(1)?,
              status:         row.get(2)?,
              student:        RawProfile {
                user_id:   row.get(3)?,
                full_name: row.get(4)?,
                email:     row.get(5)?,
                school:    row.get(6)?,
                grade:     row.get(7)?,
              },
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let mut entries = raws
      .into_iter()
      .map(RawRosterEntry::into_entry)
      .collect::<Result<Vec<_>>>()?;
    roster::sort_roster(&mut entries);
    Ok(entries)
  }

  async fn student_inscriptions(&self, student_id: Uuid) -> Result<Vec<StudentInscription>> {
    let id_str = encode_uuid(student_id);

    let raws: Vec<RawStudentInscription> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT i.inscription_id, i.enrolled_at, i.status,
                  a.activity_id, a.name, a.kind, a.starts_at, a.location,
                  a.cancellation_deadline, a.status
           FROM inscriptions i
           LEFT JOIN activities a ON a.activity_id = i.activity_id
           WHERE i.student_id = ?1
           ORDER BY i.enrolled_at DESC",
        )?;
        let rows = stmt
          .query_map(params![id_str], |row| {
            Ok(RawStudentInscription {
              inscription_id: row.get(0)?,
              enrolled_at:    row.get(1)?,
              status:         row.get(2)?,
              activity:       RawSummary {
                activity_id:           row.get(3)?,
                name:                  row.get(4)?,
                kind:                  row.get(5)?,
                starts_at:             row.get(6)?,
                location:              row.get(7)?,
                cancellation_deadline: row.get(8)?,
                status:                row.get(9)?,
              },
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(RawStudentInscription::into_student_inscription)
      .collect()
  }
}
