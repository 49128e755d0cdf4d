//! kbsync-core library.
//!
//! Keeps a chatbot knowledge base holding rollup summaries of the top-N root
//! tickets of a backlog, ranked by how many tickets duplicate them.
//!
//! The pipeline, leaf to root:
//!
//! - [`hierarchy`] walks inward duplicate links and ranks root tickets
//! - [`classify`] compares the ranking with local records
//! - [`planner`] cuts resize and expand target sets
//! - [`reconcile`] diffs a target set against a bot and applies the diff
//! - [`summary`] builds prompts and drives text generation
//! - [`engine`] runs one operator request end to end
//!
//! # Conventions
//!
//! - **Errors**: `thiserror` enums per concern, each with a `code()` into
//!   [`error::ErrorCode`]; `anyhow::Result` at orchestration level.
//! - **Logging**: `tracing` macros with structured fields (`ticket`, `bot`).
//! - **Remote calls**: always through [`retry::RetryPolicy`].

pub mod backend;
pub mod classify;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod hierarchy;
pub mod model;
pub mod planner;
pub mod reconcile;
pub mod retry;
pub mod source;
pub mod summary;
