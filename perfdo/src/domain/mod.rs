//! Domain model for perfdo
//!
//! This module contains core domain types and errors that provide:
//! - Self-documenting function signatures
//! - Structured error handling split by how a run reacts to each failure

pub mod errors;
pub mod types;

pub use types::{BaseName, STRIPPED_CHARS};

pub use errors::{ConfigError, ExecError, PipelineError, PreconditionError};
