//! Handlers for `/auth` and `/users/me`.
//!
//! | Method   | Path           | Gate     |
//! |----------|----------------|----------|
//! | `POST`   | `/auth/signup` | public   |
//! | `POST`   | `/auth/login`  | public   |
//! | `POST`   | `/auth/logout` | any role |
//! | `GET`    | `/users/me`    | any role |
//! | `PUT`    | `/users/me`    | any role |
//! | `PUT`    | `/users/me/password` | any role |
//! | `DELETE` | `/users/me`    | any role except super-admin |

use axum::{extract::State, http::StatusCode};
use chrono::{DateTime, Utc};
use meninas_core::{
  Error as CoreError,
  store::OutreachStore,
  user::{self, NewUser, ProfilePatch, Role, User},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
  AppState,
  auth::{self, AnyRole, AuthError, Gate},
  envelope::{ApiJson, Envelope},
  error::ApiError,
};

/// A logged-in account and its bearer token.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPayload {
  pub user:       User,
  pub token:      String,
  pub expires_at: DateTime<Utc>,
}

// ─── Sign-up ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupBody {
  pub full_name:               String,
  pub email:                   String,
  pub password:                String,
  pub phone:                   Option<String>,
  pub school:                  Option<String>,
  pub grade:                   Option<String>,
  #[serde(default)]
  pub accepted_privacy_policy: bool,
}

/// Hash the password and normalize the account, collecting every problem
/// into one validation error.
pub(crate) fn prepare_account(
  full_name: String,
  email: String,
  password: &str,
  role: Role,
  extra_problems: Vec<String>,
) -> Result<NewUser, ApiError> {
  let mut problems = extra_problems;
  if let Err(CoreError::Validation(p)) = user::validate_password(password) {
    problems.extend(p);
  }
  let draft = NewUser {
    full_name,
    email,
    password_hash: String::new(),
    role,
    phone: None,
    school: None,
    grade: None,
  };
  let normalized = match draft.normalized() {
    Ok(n) if problems.is_empty() => n,
    Ok(_) => return Err(CoreError::Validation(problems).into()),
    Err(CoreError::Validation(p)) => {
      problems.extend(p);
      return Err(CoreError::Validation(problems).into());
    }
    Err(other) => return Err(other.into()),
  };
  Ok(NewUser {
    password_hash: auth::hash_password(password)?,
    ..normalized
  })
}

/// `POST /auth/signup`
pub async fn signup<S>(
  State(state): State<AppState<S>>,
  ApiJson(body): ApiJson<SignupBody>,
) -> Result<(StatusCode, Envelope<SessionPayload>), ApiError>
where
  S: OutreachStore + 'static,
{
  let mut problems = Vec::new();
  if !body.accepted_privacy_policy {
    problems.push("the privacy policy must be accepted".to_owned());
  }
  let input = NewUser {
    phone: body.phone,
    school: body.school,
    grade: body.grade,
    ..prepare_account(body.full_name, body.email, &body.password, Role::Student, problems)?
  };

  let user = state
    .store
    .create_user(input)
    .await
    .map_err(ApiError::store)?;
  let (token, expires_at) = auth::start_session(&state, &user, Utc::now()).await?;
  info!(user_id = %user.id, "student signed up");

  Ok((
    StatusCode::CREATED,
    Envelope::data(SessionPayload {
      user,
      token,
      expires_at,
    })
    .with_message("account created"),
  ))
}

// ─── Login / logout ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LoginBody {
  pub email:    String,
  pub password: String,
}

/// `POST /auth/login`
pub async fn login<S>(
  State(state): State<AppState<S>>,
  ApiJson(body): ApiJson<LoginBody>,
) -> Result<Envelope<SessionPayload>, ApiError>
where
  S: OutreachStore + 'static,
{
  let credentials = state
    .store
    .find_credentials(&body.email)
    .await
    .map_err(ApiError::store)?;

  // Unknown emails and anonymized accounts still go through argon2.
  let phc = credentials.as_ref().and_then(|c| c.password_hash.as_deref());
  if !auth::verify_credential(&body.password, phc) {
    return Err(ApiError::InvalidCredentials);
  }
  let Some(credentials) = credentials else {
    return Err(ApiError::InvalidCredentials);
  };
  if !credentials.user.is_active {
    return Err(AuthError::PrincipalDisabled.into());
  }

  let user = credentials.user;
  let (token, expires_at) = auth::start_session(&state, &user, Utc::now()).await?;
  info!(user_id = %user.id, role = %user.role, "logged in");

  Ok(Envelope::data(SessionPayload {
    user,
    token,
    expires_at,
  }))
}

/// `POST /auth/logout`
pub async fn logout<S>(
  State(state): State<AppState<S>>,
  caller: Gate<AnyRole>,
) -> Result<Envelope<()>, ApiError>
where
  S: OutreachStore + 'static,
{
  state
    .store
    .revoke_session(&caller.token_digest)
    .await
    .map_err(ApiError::store)?;
  Ok(Envelope::message("logged out"))
}

// ─── Own account ─────────────────────────────────────────────────────────────

/// `GET /users/me`
pub async fn me(caller: Gate<AnyRole>) -> Envelope<User> { Envelope::data(caller.user.clone()) }

/// `PUT /users/me`
pub async fn update_me<S>(
  State(state): State<AppState<S>>,
  caller: Gate<AnyRole>,
  ApiJson(patch): ApiJson<ProfilePatch>,
) -> Result<Envelope<User>, ApiError>
where
  S: OutreachStore + 'static,
{
  let user = state
    .store
    .update_profile(caller.user.id, patch, Utc::now())
    .await
    .map_err(ApiError::store)?;
  info!(user_id = %user.id, "profile updated");
  Ok(Envelope::data(user).with_message("profile updated"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordBody {
  pub current_password: String,
  pub new_password:     String,
}

/// `PUT /users/me/password`: every other session of the account is revoked.
pub async fn change_password<S>(
  State(state): State<AppState<S>>,
  caller: Gate<AnyRole>,
  ApiJson(body): ApiJson<PasswordBody>,
) -> Result<Envelope<()>, ApiError>
where
  S: OutreachStore + 'static,
{
  let credentials = state
    .store
    .find_credentials(&caller.user.email)
    .await
    .map_err(ApiError::store)?;
  let phc = credentials.as_ref().and_then(|c| c.password_hash.as_deref());
  if !auth::verify_credential(&body.current_password, phc) {
    return Err(ApiError::bad_request("current password is incorrect"));
  }
  user::validate_password(&body.new_password)?;

  let hash = auth::hash_password(&body.new_password)?;
  state
    .store
    .set_password(caller.user.id, hash, &caller.token_digest, Utc::now())
    .await
    .map_err(ApiError::store)?;
  info!(user_id = %caller.user.id, "password changed");
  Ok(Envelope::message("password changed"))
}

/// `DELETE /users/me`: irreversible anonymization.
pub async fn delete_me<S>(
  State(state): State<AppState<S>>,
  caller: Gate<AnyRole>,
) -> Result<Envelope<()>, ApiError>
where
  S: OutreachStore + 'static,
{
  if caller.user.role == Role::SuperAdmin {
    return Err(ApiError::Forbidden(
      "super-admin accounts cannot delete themselves".into(),
    ));
  }
  state
    .store
    .anonymize_user(caller.user.id, Utc::now())
    .await
    .map_err(ApiError::store)?;
  info!(user_id = %caller.user.id, "account anonymized at owner's request");
  Ok(Envelope::message("account deleted"))
}
