//! Canonical shared types for the Quotaboard ingestion core.
//!
//! Every crate in the workspace uses these definitions - do not redefine
//! entity kinds, import modes, or job statuses elsewhere.

pub mod defaults;
mod types;

pub use types::*;
