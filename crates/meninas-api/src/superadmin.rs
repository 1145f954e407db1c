//! Handlers for `/superadmin`: account management.
//!
//! | Method   | Path                         | Notes |
//! |----------|------------------------------|-------|
//! | `GET`    | `/superadmin/users`          | Optional `?role=student\|admin\|super-admin` |
//! | `POST`   | `/superadmin/admins`         | Creates an admin account |
//! | `GET`    | `/superadmin/users/:userId`  | One student or admin |
//! | `PUT`    | `/superadmin/users/:userId`  | Body: `{"fullName"?, "phone"?, "school"?, "grade"?, "isActive"?}` |
//! | `PUT`    | `/superadmin/users/:userId/active` | Body: `{"isActive": bool}` |
//! | `DELETE` | `/superadmin/users/:userId`  | Hard delete |
//!
//! Super-admin accounts are never modified through these endpoints.

use axum::{extract::State, http::StatusCode};
use chrono::Utc;
use meninas_core::{
  Error as CoreError,
  store::OutreachStore,
  user::{NewUser, ProfilePatch, Role, User},
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::{
  AppState,
  accounts::prepare_account,
  auth::{Gate, SuperAdminOnly},
  envelope::{ApiJson, ApiPath, ApiQuery, Envelope},
  error::ApiError,
};

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub role: Option<Role>,
}

/// `GET /superadmin/users[?role=<role>]`
pub async fn list_users<S>(
  State(state): State<AppState<S>>,
  _caller: Gate<SuperAdminOnly>,
  ApiQuery(params): ApiQuery<ListParams>,
) -> Result<Envelope<Vec<User>>, ApiError>
where
  S: OutreachStore + 'static,
{
  let users = state
    .store
    .list_users(params.role)
    .await
    .map_err(ApiError::store)?;
  Ok(Envelope::data(users))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAdminBody {
  pub full_name: String,
  pub email:     String,
  pub password:  String,
  pub phone:     Option<String>,
}

/// `POST /superadmin/admins`
pub async fn create_admin<S>(
  State(state): State<AppState<S>>,
  caller: Gate<SuperAdminOnly>,
  ApiJson(body): ApiJson<CreateAdminBody>,
) -> Result<(StatusCode, Envelope<User>), ApiError>
where
  S: OutreachStore + 'static,
{
  let input = NewUser {
    phone: body.phone,
    ..prepare_account(body.full_name, body.email, &body.password, Role::Admin, Vec::new())?
  };
  let admin = state
    .store
    .create_user(input)
    .await
    .map_err(ApiError::store)?;
  info!(admin_id = %admin.id, by = %caller.user.id, "admin account created");
  Ok((StatusCode::CREATED, Envelope::data(admin)))
}

/// Load a student or admin account; super-admins are off limits.
async fn managed_account<S: OutreachStore>(
  state: &AppState<S>,
  id: Uuid,
) -> Result<User, ApiError> {
  let user = state
    .store
    .get_user(id)
    .await
    .map_err(ApiError::store)?
    .ok_or(CoreError::UserNotFound(id))?;
  if user.role == Role::SuperAdmin {
    return Err(ApiError::bad_request(
      "super-admin accounts cannot be managed here",
    ));
  }
  Ok(user)
}

/// `GET /superadmin/users/:userId`
pub async fn get_user<S>(
  State(state): State<AppState<S>>,
  _caller: Gate<SuperAdminOnly>,
  ApiPath(user_id): ApiPath<Uuid>,
) -> Result<Envelope<User>, ApiError>
where
  S: OutreachStore + 'static,
{
  Ok(Envelope::data(managed_account(&state, user_id).await?))
}

/// Email and role stay with the account owner and the signup flow. A blank
/// string clears an optional field.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateAccountBody {
  pub full_name: Option<String>,
  pub phone:     Option<String>,
  pub school:    Option<String>,
  pub grade:     Option<String>,
  pub is_active: Option<bool>,
}

/// `PUT /superadmin/users/:userId`
pub async fn update_user<S>(
  State(state): State<AppState<S>>,
  caller: Gate<SuperAdminOnly>,
  ApiPath(user_id): ApiPath<Uuid>,
  ApiJson(body): ApiJson<UpdateAccountBody>,
) -> Result<Envelope<User>, ApiError>
where
  S: OutreachStore + 'static,
{
  managed_account(&state, user_id).await?;
  let patch = ProfilePatch {
    full_name: body.full_name,
    email:     None,
    phone:     body.phone.map(Some),
    school:    body.school.map(Some),
    grade:     body.grade.map(Some),
  };
  let mut user = state
    .store
    .update_profile(user_id, patch, Utc::now())
    .await
    .map_err(ApiError::store)?;
  if let Some(active) = body.is_active
    && active != user.is_active
  {
    user = state
      .store
      .set_user_active(user_id, active)
      .await
      .map_err(ApiError::store)?;
  }
  info!(%user_id, by = %caller.user.id, "account updated");
  Ok(Envelope::data(user))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveBody {
  pub is_active: bool,
}

/// `PUT /superadmin/users/:userId/active`
pub async fn set_active<S>(
  State(state): State<AppState<S>>,
  caller: Gate<SuperAdminOnly>,
  ApiPath(user_id): ApiPath<Uuid>,
  ApiJson(body): ApiJson<ActiveBody>,
) -> Result<Envelope<User>, ApiError>
where
  S: OutreachStore + 'static,
{
  managed_account(&state, user_id).await?;
  let user = state
    .store
    .set_user_active(user_id, body.is_active)
    .await
    .map_err(ApiError::store)?;
  info!(%user_id, is_active = body.is_active, by = %caller.user.id, "account activity toggled");
  Ok(Envelope::data(user))
}

/// `DELETE /superadmin/users/:userId`
pub async fn delete_user<S>(
  State(state): State<AppState<S>>,
  caller: Gate<SuperAdminOnly>,
  ApiPath(user_id): ApiPath<Uuid>,
) -> Result<Envelope<()>, ApiError>
where
  S: OutreachStore + 'static,
{
  managed_account(&state, user_id).await?;
  state
    .store
    .delete_user(user_id, Utc::now())
    .await
    .map_err(ApiError::store)?;
  info!(%user_id, by = %caller.user.id, "account deleted");
  Ok(Envelope::message("account deleted"))
}
