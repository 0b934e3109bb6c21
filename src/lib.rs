//! synthquery - chunked, out-of-core query engine over CSV and JSON tables
//!
//! Tables live as directories of bounded chunk files behind a checksummed
//! manifest. Sort, group-by and join work chunk by chunk: external merge
//! sort with spilled runs, mergeable partial aggregates, and a sort-merge
//! join over whole tables. `engine::Database` is the public facade.

pub mod aggregate;
pub mod cli;
pub mod condition;
pub mod config;
pub mod engine;
pub mod errors;
pub mod join;
pub mod observability;
pub mod pipeline;
pub mod record;
pub mod sort;
pub mod store;

pub use engine::Database;
pub use errors::{EngineError, EngineResult, ErrorKind};
