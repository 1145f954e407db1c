//! Handlers for `/admin`: activity administration, rosters and
//! administrative inscription changes.
//!
//! | Method   | Path                                  | Notes |
//! |----------|---------------------------------------|-------|
//! | `POST`   | `/admin/activities`                   | Body: [`ActivityFields`] |
//! | `GET`    | `/admin/activities`                   | `?search`, `?limit`, `?offset` |
//! | `GET`    | `/admin/activities/:activityId`       | |
//! | `PUT`    | `/admin/activities/:activityId`       | Body: [`ActivityPatch`] |
//! | `DELETE` | `/admin/activities/:activityId`       | Refused while live inscriptions exist |
//! | `POST`   | `/admin/activities/:activityId/recount` | |
//! | `GET`    | `/admin/activities/:activityId/inscriptions` | Roster |
//! | `DELETE` | `/admin/inscriptions/:inscriptionId`  | Cancel by admin |
//! | `PUT`    | `/admin/inscriptions/:inscriptionId/attendance` | Body: `{"status": "attended"\|"absent"}` |
//!
//! Every route is gated on the admin role; super-admins inherit it.

use axum::{extract::State, http::StatusCode};
use chrono::Utc;
use meninas_core::{
  Error as CoreError,
  activity::{Activity, ActivityFields, ActivityPatch},
  inscription::{Inscription, InscriptionStatus, RosterEntry},
  store::{ActivityQuery, OutreachStore},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
  AppState,
  auth::{AdminOnly, Gate},
  envelope::{ApiJson, ApiPath, ApiQuery, Envelope},
  error::ApiError,
};

/// An activity as returned to clients, with its derived seat availability.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityView {
  #[serde(flatten)]
  pub activity:        Activity,
  pub available_seats: u32,
}

impl From<Activity> for ActivityView {
  fn from(activity: Activity) -> Self {
    Self {
      available_seats: activity.available_seats(),
      activity,
    }
  }
}

// ─── Create / list / get ─────────────────────────────────────────────────────

/// `POST /admin/activities`
pub async fn create<S>(
  State(state): State<AppState<S>>,
  caller: Gate<AdminOnly>,
  ApiJson(fields): ApiJson<ActivityFields>,
) -> Result<(StatusCode, Envelope<ActivityView>), ApiError>
where
  S: OutreachStore + 'static,
{
  let fields = fields.validated()?;
  let activity = state
    .store
    .create_activity(fields, caller.user.id, Utc::now())
    .await
    .map_err(ApiError::store)?;
  info!(activity_id = %activity.id, by = %caller.user.id, "activity created");
  Ok((StatusCode::CREATED, Envelope::data(activity.into())))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub search: Option<String>,
  pub limit:  Option<usize>,
  pub offset: Option<usize>,
}

/// `GET /admin/activities[?search=…][&limit=…][&offset=…]`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  _caller: Gate<AdminOnly>,
  ApiQuery(params): ApiQuery<ListParams>,
) -> Result<Envelope<Vec<ActivityView>>, ApiError>
where
  S: OutreachStore + 'static,
{
  let query = ActivityQuery {
    search: params.search.filter(|s| !s.trim().is_empty()),
    limit: params.limit,
    offset: params.offset,
    ..Default::default()
  };
  let activities = state
    .store
    .list_activities(&query)
    .await
    .map_err(ApiError::store)?;
  Ok(Envelope::data(
    activities.into_iter().map(ActivityView::from).collect(),
  ))
}

/// `GET /admin/activities/:activityId`
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  _caller: Gate<AdminOnly>,
  ApiPath(activity_id): ApiPath<Uuid>,
) -> Result<Envelope<ActivityView>, ApiError>
where
  S: OutreachStore + 'static,
{
  let activity = state
    .store
    .get_activity(activity_id)
    .await
    .map_err(ApiError::store)?
    .ok_or(CoreError::ActivityNotFound(activity_id))?;
  Ok(Envelope::data(activity.into()))
}

// ─── Update / delete / recount ───────────────────────────────────────────────

/// `PUT /admin/activities/:activityId`
pub async fn update<S>(
  State(state): State<AppState<S>>,
  caller: Gate<AdminOnly>,
  ApiPath(activity_id): ApiPath<Uuid>,
  ApiJson(patch): ApiJson<ActivityPatch>,
) -> Result<Envelope<ActivityView>, ApiError>
where
  S: OutreachStore + 'static,
{
  let activity = state
    .store
    .update_activity(activity_id, patch, Utc::now())
    .await
    .map_err(ApiError::store)?;
  info!(%activity_id, status = activity.status.as_str(), by = %caller.user.id, "activity updated");
  Ok(Envelope::data(activity.into()))
}

/// `DELETE /admin/activities/:activityId`
pub async fn delete<S>(
  State(state): State<AppState<S>>,
  caller: Gate<AdminOnly>,
  ApiPath(activity_id): ApiPath<Uuid>,
) -> Result<Envelope<()>, ApiError>
where
  S: OutreachStore + 'static,
{
  state
    .store
    .delete_activity(activity_id)
    .await
    .map_err(ApiError::store)?;
  info!(%activity_id, by = %caller.user.id, "activity deleted");
  Ok(Envelope::message("activity deleted"))
}

/// `POST /admin/activities/:activityId/recount`
pub async fn recount<S>(
  State(state): State<AppState<S>>,
  _caller: Gate<AdminOnly>,
  ApiPath(activity_id): ApiPath<Uuid>,
) -> Result<Envelope<ActivityView>, ApiError>
where
  S: OutreachStore + 'static,
{
  let activity = state
    .store
    .recount(activity_id, Utc::now())
    .await
    .map_err(ApiError::store)?;
  Ok(Envelope::data(activity.into()))
}

// ─── Roster ──────────────────────────────────────────────────────────────────

/// `GET /admin/activities/:activityId/inscriptions`
pub async fn roster<S>(
  State(state): State<AppState<S>>,
  _caller: Gate<AdminOnly>,
  ApiPath(activity_id): ApiPath<Uuid>,
) -> Result<Envelope<Vec<RosterEntry>>, ApiError>
where
  S: OutreachStore + 'static,
{
  let entries = state
    .store
    .roster(activity_id)
    .await
    .map_err(ApiError::store)?;
  for entry in entries.iter().filter(|e| e.student.is_none()) {
    warn!(%activity_id, inscription_id = %entry.inscription_id, "roster entry without student");
  }
  Ok(Envelope::data(entries))
}

// ─── Inscriptions ────────────────────────────────────────────────────────────

/// `DELETE /admin/inscriptions/:inscriptionId`
pub async fn cancel_inscription<S>(
  State(state): State<AppState<S>>,
  caller: Gate<AdminOnly>,
  ApiPath(inscription_id): ApiPath<Uuid>,
) -> Result<Envelope<Inscription>, ApiError>
where
  S: OutreachStore + 'static,
{
  let inscription = state
    .store
    .admin_cancel_inscription(inscription_id, Utc::now())
    .await
    .map_err(ApiError::store)?;
  info!(%inscription_id, by = %caller.user.id, "inscription cancelled by admin");
  Ok(Envelope::data(inscription).with_message("inscription cancelled"))
}

#[derive(Debug, Deserialize)]
pub struct AttendanceBody {
  pub status: InscriptionStatus,
}

/// `PUT /admin/inscriptions/:inscriptionId/attendance`
pub async fn attendance<S>(
  State(state): State<AppState<S>>,
  _caller: Gate<AdminOnly>,
  ApiPath(inscription_id): ApiPath<Uuid>,
  ApiJson(body): ApiJson<AttendanceBody>,
) -> Result<Envelope<Inscription>, ApiError>
where
  S: OutreachStore + 'static,
{
  let inscription = state
    .store
    .mark_attendance(inscription_id, body.status, Utc::now())
    .await
    .map_err(ApiError::store)?;
  Ok(Envelope::data(inscription))
}
