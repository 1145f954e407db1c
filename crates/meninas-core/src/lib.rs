//! Core types, rules and the storage trait for the Meninas Digitais
//! activities platform.
//!
//! This crate is deliberately free of HTTP and database dependencies. The
//! rules in [`capacity`] and [`enrollment`] are pure functions so storage
//! backends can evaluate them inside their own transactions.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod access;
pub mod activity;
pub mod capacity;
pub mod enrollment;
pub mod error;
pub mod inscription;
pub mod roster;
pub mod session;
pub mod store;
pub mod user;

pub use error::{Error, Result};
