//! # jetsam - Git-pinned native dependency installer
//!
//! jetsam reads the dependencies a C/C++ project declares in `Jetsam.toml`,
//! clones each one at its pinned tag, branch or commit into a per-user cache,
//! builds it in place and symlinks the shared libraries it produces into the
//! system library directory.
//!
//! ## Quick Start
//!
//! ```bash
//! # Fetch, build and link everything in Jetsam.toml
//! jt update
//!
//! # Build the project itself
//! jt build
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - Manifest parsing (`Jetsam.toml`)
//! - [`settings`] - Tool settings (cache root, library dir, source host)
//! - [`cache`] - Cache path resolution and `jt cache`
//! - [`deps`] - Fetch, build and link pipeline
//! - [`commands`] - Project-level CLI command handlers

/// Per-user dependency cache.
pub mod cache;

/// Project-level command handlers.
pub mod commands;

/// Manifest parsing (`Jetsam.toml`).
pub mod config;

/// Fetch, build and link pipeline.
pub mod deps;

/// Pipeline error taxonomy.
pub mod error;

/// Tool settings from file and environment.
pub mod settings;

/// Terminal UI utilities (tables, spinners).
pub mod ui;
