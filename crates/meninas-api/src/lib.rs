//! JSON REST API for the Meninas Digitais activities platform.
//!
//! Exposes an axum [`Router`] backed by any
//! [`meninas_core::store::OutreachStore`]. Every response, success or
//! failure, is wrapped in an [`envelope::Envelope`]. Authentication is a
//! bearer token checked by the extractors in [`auth`]; TLS and the listener
//! are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! let app = meninas_api::api_router(AppState::new(store, Duration::hours(24)));
//! ```

pub mod accounts;
pub mod activities;
pub mod auth;
pub mod catalogue;
pub mod envelope;
pub mod error;
pub mod inscriptions;
pub mod superadmin;

use std::sync::Arc;

use axum::{
  Router,
  routing::{delete, get, post, put},
};
use meninas_core::store::OutreachStore;

pub use error::ApiError;

/// Shared state handed to every handler.
pub struct AppState<S> {
  pub store:       Arc<S>,
  /// Lifetime of a freshly issued session.
  pub session_ttl: chrono::Duration,
}

impl<S> AppState<S> {
  pub fn new(store: Arc<S>, session_ttl: chrono::Duration) -> Self {
    Self { store, session_ttl }
  }
}

// Manual impl: `S` itself need not be `Clone`.
impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      store:       Arc::clone(&self.store),
      session_ttl: self.session_ttl,
    }
  }
}

/// Build a fully-materialised API router over `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(state: AppState<S>) -> Router<()>
where
  S: OutreachStore + 'static,
{
  Router::new()
    // Accounts
    .route("/auth/signup", post(accounts::signup::<S>))
    .route("/auth/login", post(accounts::login::<S>))
    .route("/auth/logout", post(accounts::logout::<S>))
    .route(
      "/users/me",
      get(accounts::me)
        .put(accounts::update_me::<S>)
        .delete(accounts::delete_me::<S>),
    )
    .route("/users/me/password", put(accounts::change_password::<S>))
    // Super-admin
    .route("/superadmin/users", get(superadmin::list_users::<S>))
    .route("/superadmin/admins", post(superadmin::create_admin::<S>))
    .route(
      "/superadmin/users/{userId}",
      get(superadmin::get_user::<S>)
        .put(superadmin::update_user::<S>)
        .delete(superadmin::delete_user::<S>),
    )
    .route("/superadmin/users/{userId}/active", put(superadmin::set_active::<S>))
    // Admin
    .route(
      "/admin/activities",
      get(activities::list::<S>).post(activities::create::<S>),
    )
    .route(
      "/admin/activities/{activityId}",
      get(activities::get_one::<S>)
        .put(activities::update::<S>)
        .delete(activities::delete::<S>),
    )
    .route("/admin/activities/{activityId}/recount", post(activities::recount::<S>))
    .route("/admin/activities/{activityId}/inscriptions", get(activities::roster::<S>))
    .route(
      "/admin/inscriptions/{inscriptionId}",
      delete(activities::cancel_inscription::<S>),
    )
    .route(
      "/admin/inscriptions/{inscriptionId}/attendance",
      put(activities::attendance::<S>),
    )
    // Public
    .route("/public/activities", get(catalogue::list::<S>))
    // Student
    .route("/inscriptions", post(inscriptions::create::<S>))
    .route("/inscriptions/my", get(inscriptions::current::<S>))
    .route("/inscriptions/my/history", get(inscriptions::history::<S>))
    .route(
      "/inscriptions/my/{inscriptionId}",
      delete(inscriptions::cancel::<S>),
    )
    .with_state(state)
}
