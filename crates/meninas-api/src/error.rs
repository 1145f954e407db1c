//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Every failure is rendered as the standard envelope with
//! `success: false`. Server-side failures are logged in full and reported to
//! the caller with a generic message only.

use axum::{
  extract::rejection::{JsonRejection, PathRejection, QueryRejection},
  http::StatusCode,
  response::{IntoResponse, Response},
};
use meninas_core::Error as CoreError;
use thiserror::Error;

use crate::{auth::AuthError, envelope::Envelope};

/// An error returned by an API handler or extractor.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Domain(#[from] CoreError),

  #[error(transparent)]
  Auth(#[from] AuthError),

  #[error("{message}")]
  BadRequest {
    message: String,
    details: Vec<String>,
  },

  #[error("{0}")]
  Forbidden(String),

  /// Login failure. Deliberately does not say which half was wrong.
  #[error("invalid email or password")]
  InvalidCredentials,

  #[error("internal error: {0}")]
  Internal(String),
}

impl ApiError {
  /// Lift a store error into the domain taxonomy.
  pub fn store<E: Into<CoreError>>(e: E) -> Self { Self::Domain(e.into()) }

  pub fn bad_request(message: impl Into<String>) -> Self {
    Self::BadRequest {
      message: message.into(),
      details: Vec::new(),
    }
  }

  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::Domain(e) if e.is_not_found() => StatusCode::NOT_FOUND,
      ApiError::Domain(e) if e.is_rejection() => StatusCode::BAD_REQUEST,
      ApiError::Domain(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
      ApiError::Auth(e) => e.status(),
      ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
      ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
      ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      tracing::error!(error = ?self, "request failed");
      let body = Envelope::failure("internal server error", Vec::new());
      return (status, body).into_response();
    }

    if let ApiError::Domain(e) = &self
      && e.is_not_found()
    {
      tracing::debug!(error = ?e, "resource not found");
    }

    let body = match self {
      ApiError::Domain(CoreError::Validation(details)) => {
        Envelope::failure("validation failed", details)
      }
      ApiError::BadRequest { message, details } => Envelope::failure(message, details),
      other => Envelope::failure(other.to_string(), Vec::new()),
    };
    (status, body).into_response()
  }
}

// ─── Extractor rejections ────────────────────────────────────────────────────

impl From<JsonRejection> for ApiError {
  fn from(rejection: JsonRejection) -> Self {
    ApiError::BadRequest {
      message: "invalid request body".into(),
      details: vec![rejection.body_text()],
    }
  }
}

impl From<PathRejection> for ApiError {
  fn from(rejection: PathRejection) -> Self {
    ApiError::BadRequest {
      message: "invalid id".into(),
      details: vec![rejection.body_text()],
    }
  }
}

impl From<QueryRejection> for ApiError {
  fn from(rejection: QueryRejection) -> Self {
    ApiError::BadRequest {
      message: "invalid query parameters".into(),
      details: vec![rejection.body_text()],
    }
  }
}
