//! The JSON response envelope and request extractors that reject in it.
//!
//! Success: `{"success": true, "data": …, "message"?: …}`.
//! Failure: `{"success": false, "error": {"message": …, "details"?: […]}}`.

use axum::{
  Json,
  extract::{FromRequest, FromRequestParts},
  response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::error::ApiError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
  pub success: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub data:    Option<T>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error:   Option<ErrorBody>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
  pub message: String,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub details: Vec<String>,
}

impl<T> Envelope<T> {
  pub fn data(data: T) -> Self {
    Self {
      success: true,
      data:    Some(data),
      message: None,
      error:   None,
    }
  }

  pub fn with_message(mut self, message: impl Into<String>) -> Self {
    self.message = Some(message.into());
    self
  }
}

impl Envelope<()> {
  /// A success with nothing but a confirmation message.
  pub fn message(message: impl Into<String>) -> Self {
    Self {
      success: true,
      data:    None,
      message: Some(message.into()),
      error:   None,
    }
  }

  pub fn failure(message: impl Into<String>, details: Vec<String>) -> Self {
    Self {
      success: false,
      data:    None,
      message: None,
      error:   Some(ErrorBody {
        message: message.into(),
        details,
      }),
    }
  }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
  fn into_response(self) -> Response { Json(self).into_response() }
}

// ─── Extractors ──────────────────────────────────────────────────────────────

/// [`axum::Json`] whose rejection is an enveloped 400.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// [`axum::extract::Path`] whose rejection is an enveloped 400, so a
/// malformed id never reaches a handler.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

/// [`axum::extract::Query`] whose rejection is an enveloped 400.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);
