//! Crate-wide result alias.
//!
//! Components that need a typed taxonomy define their own error enums
//! (see `session::errors`); everything else propagates `anyhow::Error`
//! with context attached at the call site.

pub type Result<T, E = anyhow::Error> = std::result::Result<T, E>;
