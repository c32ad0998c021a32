#![forbid(unsafe_code)]
//! tristore-core: identifiers, id tables, permutation metadata and the small
//! shared vocabulary types every other tristore crate speaks.
//!
//! Nothing here spawns threads or touches storage. The traits for block
//! sinks/sources and memory budgets live here so the index and exec crates
//! can depend on them without pulling in the concrete implementations.

pub mod block;
pub mod budget;
pub mod cancel;
pub mod config;
pub mod error;
pub mod hash;
pub mod id;
pub mod metadata;
pub mod permutation;
pub mod prelude;
pub mod table;
pub mod vocab;

pub use error::{Error, Result};

/// Crate version, recorded in persisted catalogs.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
