//! # Kensei Core
//!
//! Shared building blocks for the Kensei vector search engine:
//! - Error types and the common `Result` alias
//!
//! Everything index-specific lives in `kensei-index`; this crate stays small
//! so that outer layers (config parsers, servers, bindings) can depend on the
//! error taxonomy without pulling in the index machinery.

pub mod error;

// Re-export commonly used types
pub use error::{Error, Result};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
