//! Process-level wiring for the Meninas Digitais API server: configuration,
//! the first super-admin, the reconciliation loop and the HTTP stack.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context as _, bail};
use argon2::PasswordHash;
use axum::Router;
use chrono::Utc;
use meninas_api::AppState;
use meninas_core::{
  store::OutreachStore,
  user::{NewUser, Role},
};
use serde::Deserialize;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `MENINAS_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:                    String,
  #[serde(default = "default_port")]
  pub port:                    u16,
  #[serde(default = "default_store_path")]
  pub store_path:              PathBuf,
  #[serde(default = "default_session_ttl_hours")]
  pub session_ttl_hours:       u32,
  /// `0` turns the periodic loop off; the startup pass still runs.
  #[serde(default = "default_reconcile_interval_secs")]
  pub reconcile_interval_secs: u64,
  pub bootstrap_email:         Option<String>,
  pub bootstrap_name:          Option<String>,
  /// Argon2 PHC string, as printed by `--hash-password`.
  pub bootstrap_password_hash: Option<String>,
}

fn default_host() -> String { "127.0.0.1".to_owned() }
fn default_port() -> u16 { 3000 }
fn default_store_path() -> PathBuf { PathBuf::from("meninas.db") }
fn default_session_ttl_hours() -> u32 { 24 }
fn default_reconcile_interval_secs() -> u64 { 300 }

impl ServerConfig {
  pub fn session_ttl(&self) -> chrono::Duration {
    chrono::Duration::hours(i64::from(self.session_ttl_hours))
  }

  pub fn reconcile_interval(&self) -> Option<Duration> {
    (self.reconcile_interval_secs > 0).then(|| Duration::from_secs(self.reconcile_interval_secs))
  }
}

// ─── Bootstrap ────────────────────────────────────────────────────────────────

/// Make sure the configured super-admin exists. Does nothing when no
/// bootstrap email is configured or the account is already there.
pub async fn ensure_super_admin<S>(store: &S, config: &ServerConfig) -> anyhow::Result<()>
where
  S: OutreachStore,
{
  let Some(email) = config.bootstrap_email.as_deref() else {
    debug!("no bootstrap super-admin configured");
    return Ok(());
  };

  let existing = store
    .find_credentials(email)
    .await
    .map_err(Into::<meninas_core::Error>::into)
    .context("failed to look up bootstrap account")?;
  if let Some(found) = existing {
    if found.user.role != Role::SuperAdmin {
      warn!(user_id = %found.user.id, role = %found.user.role, "bootstrap email belongs to a non super-admin account");
    }
    return Ok(());
  }

  let Some(hash) = config.bootstrap_password_hash.clone() else {
    bail!("bootstrap_email is set but bootstrap_password_hash is missing");
  };
  if let Err(e) = PasswordHash::new(&hash) {
    bail!("bootstrap_password_hash is not a valid PHC string: {e}");
  }

  let user = store
    .create_user(NewUser {
      full_name:     config
        .bootstrap_name
        .clone()
        .unwrap_or_else(|| "Super Admin".to_owned()),
      email:         email.to_owned(),
      password_hash: hash,
      role:          Role::SuperAdmin,
      phone:         None,
      school:        None,
      grade:         None,
    })
    .await
    .map_err(Into::<meninas_core::Error>::into)
    .context("failed to create bootstrap super-admin")?;
  info!(user_id = %user.id, "bootstrap super-admin created");
  Ok(())
}

// ─── Reconciliation ───────────────────────────────────────────────────────────

/// One recount pass over every activity. Failures are logged, never raised.
pub async fn reconcile_once<S: OutreachStore>(store: &S) {
  match store.reconcile(Utc::now()).await {
    Ok(0) => debug!("reconcile pass: nothing to settle"),
    Ok(changed) => info!(changed, "reconcile pass settled activities"),
    Err(e) => error!(error = %e, "reconcile pass failed"),
  }
}

/// Run [`reconcile_once`] every `every`, starting one period from now.
pub fn spawn_reconciler<S>(store: Arc<S>, every: Duration) -> JoinHandle<()>
where
  S: OutreachStore + 'static,
{
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately.
    ticker.tick().await;
    loop {
      ticker.tick().await;
      reconcile_once(store.as_ref()).await;
    }
  })
}

// ─── HTTP ─────────────────────────────────────────────────────────────────────

/// The API router with request tracing.
pub fn app<S>(state: AppState<S>) -> Router
where
  S: OutreachStore + 'static,
{
  meninas_api::api_router(state).layer(TraceLayer::new_for_http())
}
