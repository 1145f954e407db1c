//! Handlers for `/inscriptions`: a student's own enrollments.
//!
//! | Method   | Path                             | Notes |
//! |----------|----------------------------------|-------|
//! | `POST`   | `/inscriptions`                  | Body: `{"activityId": "<uuid>"}` |
//! | `GET`    | `/inscriptions/my`               | Upcoming confirmed enrollments |
//! | `GET`    | `/inscriptions/my/history`       | Past or concluded enrollments |
//! | `DELETE` | `/inscriptions/my/:inscriptionId` | Cancel within the deadline |

use axum::{extract::State, http::StatusCode};
use chrono::Utc;
use meninas_core::{
  inscription::{CancelOutcome, Inscription, StudentInscription},
  roster,
  store::OutreachStore,
};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
  AppState,
  auth::{Gate, StudentOnly},
  envelope::{ApiJson, ApiPath, Envelope},
  error::ApiError,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollBody {
  pub activity_id: Uuid,
}

/// `POST /inscriptions`
pub async fn create<S>(
  State(state): State<AppState<S>>,
  caller: Gate<StudentOnly>,
  ApiJson(body): ApiJson<EnrollBody>,
) -> Result<(StatusCode, Envelope<Inscription>), ApiError>
where
  S: OutreachStore + 'static,
{
  let inscription = state
    .store
    .enroll(caller.user.id, body.activity_id, Utc::now())
    .await
    .map_err(ApiError::store)?;
  info!(
    inscription_id = %inscription.id,
    activity_id = %body.activity_id,
    student_id = %caller.user.id,
    "enrollment created"
  );
  Ok((
    StatusCode::CREATED,
    Envelope::data(inscription).with_message("enrollment confirmed"),
  ))
}

/// `GET /inscriptions/my`
pub async fn current<S>(
  State(state): State<AppState<S>>,
  caller: Gate<StudentOnly>,
) -> Result<Envelope<Vec<StudentInscription>>, ApiError>
where
  S: OutreachStore + 'static,
{
  let all = state
    .store
    .student_inscriptions(caller.user.id)
    .await
    .map_err(ApiError::store)?;
  Ok(Envelope::data(roster::current(all, Utc::now())))
}

/// `GET /inscriptions/my/history`
pub async fn history<S>(
  State(state): State<AppState<S>>,
  caller: Gate<StudentOnly>,
) -> Result<Envelope<Vec<StudentInscription>>, ApiError>
where
  S: OutreachStore + 'static,
{
  let all = state
    .store
    .student_inscriptions(caller.user.id)
    .await
    .map_err(ApiError::store)?;
  Ok(Envelope::data(roster::history(all, Utc::now())))
}

/// `DELETE /inscriptions/my/:inscriptionId`
pub async fn cancel<S>(
  State(state): State<AppState<S>>,
  caller: Gate<StudentOnly>,
  ApiPath(inscription_id): ApiPath<Uuid>,
) -> Result<Envelope<()>, ApiError>
where
  S: OutreachStore + 'static,
{
  let outcome = state
    .store
    .cancel_inscription(caller.user.id, inscription_id, Utc::now())
    .await
    .map_err(ApiError::store)?;

  let message = match outcome {
    CancelOutcome::Cancelled(_) => {
      info!(%inscription_id, student_id = %caller.user.id, "enrollment cancelled");
      "enrollment cancelled"
    }
    CancelOutcome::Orphaned(i) => {
      warn!(
        %inscription_id,
        activity_id = %i.activity_id,
        "cancelled an inscription whose activity no longer exists"
      );
      "enrollment cancelled; its activity no longer exists"
    }
  };
  Ok(Envelope::message(message))
}
