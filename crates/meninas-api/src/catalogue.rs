//! `GET /public/activities`: the unauthenticated catalogue.

use axum::extract::State;
use chrono::Utc;
use meninas_core::{
  activity::ActivityKind,
  store::{ActivityQuery, OutreachStore},
};
use serde::Deserialize;

use crate::{
  AppState,
  activities::ActivityView,
  envelope::{ApiQuery, Envelope},
  error::ApiError,
};

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub kind: Option<ActivityKind>,
}

/// Listed activities starting today or later, soonest first.
pub async fn list<S>(
  State(state): State<AppState<S>>,
  ApiQuery(params): ApiQuery<ListParams>,
) -> Result<Envelope<Vec<ActivityView>>, ApiError>
where
  S: OutreachStore + 'static,
{
  let today = Utc::now()
    .date_naive()
    .and_hms_opt(0, 0, 0)
    .map(|midnight| midnight.and_utc());
  let query = ActivityQuery {
    kind: params.kind,
    listed_only: true,
    starting_after: today,
    ..Default::default()
  };

  let mut activities = state
    .store
    .list_activities(&query)
    .await
    .map_err(ApiError::store)?;
  activities.sort_by_key(|a| a.starts_at);
  Ok(Envelope::data(
    activities.into_iter().map(ActivityView::from).collect(),
  ))
}
