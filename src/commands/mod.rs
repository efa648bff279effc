//! CLI command handlers
//!
//! Project and update handlers called from main.rs. Each takes the manifest
//! loaded at startup instead of reading it again.

pub mod project;
pub mod update;
