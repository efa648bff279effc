//! Dependency pipeline.
//!
//! Each declared dependency goes through three stages:
//!
//! - **Fetch**: clone into the per-user cache and check out the pinned ref
//! - **Build**: run the dependency's build command inside its cache entry
//! - **Link**: symlink produced shared libraries into the system library dir
//!
//! ## Commands
//!
//! - `jt update` - Fetch, build and link every dependency in `Jetsam.toml`

mod build;
mod fetch;
mod link;
mod lock;
mod update;

#[cfg(test)]
pub(crate) mod testutil;

pub use build::{BUILD_LOG, BuildOutput, SearchPaths, build, resolve_command};
pub use fetch::{FetchStatus, Fetcher};
pub use link::{LinkState, LinkedArtifact, Linker, discover_artifacts, is_shared_library};
pub use lock::{EntryGuard, EntryLocks};
pub use update::{DependencyReport, Outcome, Stage, UpdateReport, Updater};
