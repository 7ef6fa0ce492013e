//! Crate-wide result alias.
//!
//! Most plumbing propagates `anyhow::Error`; call sites that need to match on a
//! specific failure kind use their own `thiserror` enum as `E` instead.

pub type Result<T, E = anyhow::Error> = std::result::Result<T, E>;
