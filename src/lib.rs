//! Self-update pipeline for desktop applications.
//!
//! The library checks licensed metadata endpoints for a newer release, falls
//! back to a public release channel for the artifact, downloads it as a
//! cancellable session and installs it in place with rollback and
//! side-by-side recovery. [`libs::orchestrator::Orchestrator`] ties the steps
//! together; the `upkit` binary is a thin CLI over it.

pub mod api;
pub mod commands;
pub mod libs;
