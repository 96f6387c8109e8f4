//! Clients for the two remote services the updater talks to.
//!
//! - [`metadata`]: licensed release metadata endpoints (`{code, msg, data}` envelope).
//! - [`github`]: public release list and direct asset downloads.

pub mod github;
pub mod metadata;
