//! Authorization gate: bearer-token sessions, password hashing, and the
//! role-gated extractors every protected handler takes.
//!
//! A request passes the gate in this order, each step with its own
//! rejection:
//!
//! 1. `Authorization: Bearer <token>` present → else [`AuthError::Unauthenticated`]
//! 2. token well formed and known → else [`AuthError::CredentialInvalid`]
//! 3. session not expired → else [`AuthError::CredentialExpired`]
//! 4. account still exists → else [`AuthError::PrincipalNotFound`]
//! 5. account active → else [`AuthError::PrincipalDisabled`]
//! 6. role satisfies the endpoint → else [`AuthError::InsufficientRole`]

use std::{marker::PhantomData, ops::Deref, sync::LazyLock};

use argon2::{
  Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, StatusCode, header, request::Parts},
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD as B64};
use chrono::{DateTime, Utc};
use meninas_core::{
  access::{AccessDenied, authorize},
  session::Session,
  store::OutreachStore,
  user::{Role, User},
};
use rand_core::{OsRng, RngCore as _};
use sha2::{Digest as _, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{AppState, error::ApiError};

const TOKEN_BYTES: usize = 32;

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum AuthError {
  #[error("authentication required")]
  Unauthenticated,

  #[error("session expired, please log in again")]
  CredentialExpired,

  #[error("invalid session token")]
  CredentialInvalid,

  #[error("account no longer exists")]
  PrincipalNotFound,

  #[error("account is disabled")]
  PrincipalDisabled,

  #[error(transparent)]
  InsufficientRole(#[from] AccessDenied),
}

impl AuthError {
  pub fn status(&self) -> StatusCode {
    match self {
      AuthError::PrincipalDisabled | AuthError::InsufficientRole(_) => StatusCode::FORBIDDEN,
      _ => StatusCode::UNAUTHORIZED,
    }
  }
}

// ─── Credentials ─────────────────────────────────────────────────────────────

/// Hash `password` into an argon2 PHC string.
pub fn hash_password(password: &str) -> Result<String, ApiError> {
  let salt = SaltString::generate(&mut OsRng);
  Argon2::default()
    .hash_password(password.as_bytes(), &salt)
    .map(|hash| hash.to_string())
    .map_err(|e| ApiError::Internal(format!("argon2 error: {e}")))
}

pub fn verify_password(password: &str, phc: &str) -> bool {
  PasswordHash::new(phc).is_ok_and(|parsed| {
    Argon2::default()
      .verify_password(password.as_bytes(), &parsed)
      .is_ok()
  })
}

/// Checked against when an account has no stored hash, so every failed login
/// pays for one argon2 verification.
static DUMMY_PHC: LazyLock<Option<String>> =
  LazyLock::new(|| hash_password("no account matches this password").ok());

/// Verify `password` against a stored hash. With no hash the verification
/// runs against a throwaway one and always fails.
pub fn verify_credential(password: &str, phc: Option<&str>) -> bool {
  match phc {
    Some(phc) => verify_password(password, phc),
    None => {
      if let Some(dummy) = DUMMY_PHC.as_deref() {
        verify_password(password, dummy);
      }
      false
    }
  }
}

/// A fresh opaque bearer token: 32 random bytes, base64url without padding.
pub fn issue_token() -> String {
  let mut bytes = [0u8; TOKEN_BYTES];
  OsRng.fill_bytes(&mut bytes);
  B64.encode(bytes)
}

/// Hex SHA-256 of a token; the only form in which tokens are stored.
pub fn token_digest(token: &str) -> String { hex::encode(Sha256::digest(token.as_bytes())) }

fn is_well_formed(token: &str) -> bool {
  B64
    .decode(token)
    .is_ok_and(|bytes| bytes.len() == TOKEN_BYTES)
}

/// Issue a token for `user` and persist its session. Returns the token and
/// its expiry.
pub async fn start_session<S: OutreachStore>(
  state: &AppState<S>,
  user: &User,
  now: DateTime<Utc>,
) -> Result<(String, DateTime<Utc>), ApiError> {
  let token = issue_token();
  let expires_at = now + state.session_ttl;
  state
    .store
    .create_session(Session {
      token_digest: token_digest(&token),
      user_id: user.id,
      role: user.role,
      created_at: now,
      expires_at,
    })
    .await
    .map_err(ApiError::store)?;
  Ok((token, expires_at))
}

fn bearer(headers: &HeaderMap) -> Result<&str, AuthError> {
  let value = headers
    .get(header::AUTHORIZATION)
    .ok_or(AuthError::Unauthenticated)?
    .to_str()
    .map_err(|_| AuthError::CredentialInvalid)?;
  value
    .strip_prefix("Bearer ")
    .map(str::trim)
    .ok_or(AuthError::CredentialInvalid)
}

// ─── Principal ───────────────────────────────────────────────────────────────

/// An authenticated, active account of any role.
#[derive(Debug, Clone)]
pub struct Principal {
  pub user:         User,
  /// Digest of the token that authenticated this request.
  pub token_digest: String,
}

impl<S> FromRequestParts<AppState<S>> for Principal
where
  S: OutreachStore + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    let token = bearer(&parts.headers)?;
    if !is_well_formed(token) {
      debug!("malformed bearer token");
      return Err(AuthError::CredentialInvalid.into());
    }

    let digest = token_digest(token);
    let session = state
      .store
      .get_session(&digest)
      .await
      .map_err(ApiError::store)?
      .ok_or(AuthError::CredentialInvalid)?;

    if session.is_expired(Utc::now()) {
      debug!(user_id = %session.user_id, "session expired");
      state
        .store
        .revoke_session(&digest)
        .await
        .map_err(ApiError::store)?;
      return Err(AuthError::CredentialExpired.into());
    }

    let user = state
      .store
      .get_user(session.user_id)
      .await
      .map_err(ApiError::store)?
      .ok_or_else(|| {
        warn!(user_id = %session.user_id, "session refers to a missing account");
        AuthError::PrincipalNotFound
      })?;

    if !user.is_active {
      return Err(AuthError::PrincipalDisabled.into());
    }

    Ok(Self {
      user,
      token_digest: digest,
    })
  }
}

// ─── Role gates ──────────────────────────────────────────────────────────────

/// The set of roles an endpoint accepts.
pub trait Requirement {
  const ROLES: &'static [Role];
}

pub struct StudentOnly;
pub struct AdminOnly;
pub struct SuperAdminOnly;
pub struct AnyRole;

impl Requirement for StudentOnly {
  const ROLES: &'static [Role] = &[Role::Student];
}

/// Super-admins are admitted through [`Role::satisfies`].
impl Requirement for AdminOnly {
  const ROLES: &'static [Role] = &[Role::Admin];
}

impl Requirement for SuperAdminOnly {
  const ROLES: &'static [Role] = &[Role::SuperAdmin];
}

impl Requirement for AnyRole {
  const ROLES: &'static [Role] = &[Role::Student, Role::Admin, Role::SuperAdmin];
}

/// A [`Principal`] whose role passed `R`.
pub struct Gate<R> {
  principal: Principal,
  _role:     PhantomData<fn() -> R>,
}

impl<R> Deref for Gate<R> {
  type Target = Principal;

  fn deref(&self) -> &Principal { &self.principal }
}

impl<S, R> FromRequestParts<AppState<S>> for Gate<R>
where
  S: OutreachStore + 'static,
  R: Requirement,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    let principal = Principal::from_request_parts(parts, state).await?;
    authorize(principal.user.role, R::ROLES).map_err(|denied| {
      debug!(role = %denied.role, path = %parts.uri.path(), "role rejected");
      AuthError::from(denied)
    })?;
    Ok(Self {
      principal,
      _role: PhantomData,
    })
  }
}
