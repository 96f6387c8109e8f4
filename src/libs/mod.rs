//! Core library modules.
//!
//! ## Pipeline
//!
//! - **Check**: `version`, `resolver`, `release`
//! - **Locate**: `locator`, `platform`
//! - **Download**: `download`, `http`
//! - **Install**: `installer`, `archive`, `fs_ops`, `process`
//! - **Persist**: `state`
//! - **Drive**: `orchestrator`
//!
//! ## Application
//!
//! `config`, `data_storage`, `messages` and `view` back the CLI.

pub mod archive;
pub mod config;
pub mod data_storage;
pub mod download;
pub mod error;
pub mod fs_ops;
pub mod http;
pub mod installer;
pub mod locator;
pub mod messages;
pub mod orchestrator;
pub mod platform;
pub mod process;
pub mod release;
pub mod resolver;
pub mod state;
pub mod version;
pub mod view;
