//! SQLite backend for the Meninas Digitais activities platform.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every multi-step write runs inside a
//! `BEGIN IMMEDIATE` transaction. The `tx` module holds those flows.

mod encode;
mod schema;
mod store;
mod tx;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
