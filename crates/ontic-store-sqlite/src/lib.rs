//! SQLite backend for the Ontic ontology store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every closure handed to that thread
//! runs to completion before the next one starts, which is what makes the
//! read-modify-write of embedded question lists safe.

mod change;
mod encode;
mod ontology;
mod question;
mod schema;
mod store;
mod workflow;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
