//! Server-side session records backing opaque bearer tokens.
//!
//! Only a digest of the token is ever stored; the token itself is handed to
//! the client once at login and never persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::user::Role;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
  /// Hex SHA-256 of the bearer token.
  pub token_digest: String,
  pub user_id:      Uuid,
  /// Role at the moment of issue. The gate re-reads the live role from the
  /// account, so this is informational.
  pub role:         Role,
  pub created_at:   DateTime<Utc>,
  pub expires_at:   DateTime<Utc>,
}

impl Session {
  pub fn is_expired(&self, now: DateTime<Utc>) -> bool { now >= self.expires_at }
}
