//! Core types and trait definitions for the Ontic ontology store.
//!
//! This crate is deliberately free of database dependencies. Storage backends
//! (e.g. `ontic-store-sqlite`) implement the traits in [`store`]; the rest of
//! the crate is plain data plus the pure selection and hashing rules that
//! every backend must agree on.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod change;
pub mod context;
pub mod error;
pub mod ontology;
pub mod question;
pub mod store;
pub mod workflow;

pub use context::{Provenance, RequestContext, Source};
pub use error::{Error, Result};
