//! Command implementations for the tapwright CLI.
//!
//! `build` runs the archive builder on its own; `brew` covers tap management
//! and the publish pipeline.

pub mod brew;
pub mod build;
