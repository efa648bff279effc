//! Publishing built shared libraries.
//!
//! Each artifact found directly inside a dependency's cache entry gets a
//! symlink of the same name in the system library directory. The cache entry
//! stays the source of truth; nothing is copied.
//!
//! An existing entry with the same name is never replaced. If it is already a
//! link to this very artifact the artifact counts as linked; anything else is
//! a conflict.

use crate::error::{DepError, DepResult};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const SHARED_LIB_SUFFIXES: [&str; 2] = [".so", ".dylib"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Created,
    AlreadyLinked,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedArtifact {
    pub artifact: PathBuf,
    pub link: PathBuf,
    pub state: LinkState,
}

/// `libfoo.so`, `libfoo.dylib` and versioned `libfoo.so.1.2`.
pub fn is_shared_library(file_name: &str) -> bool {
    if let Some(suffix) = SHARED_LIB_SUFFIXES.iter().find(|s| file_name.ends_with(*s)) {
        return file_name.len() > suffix.len();
    }
    match file_name.split_once(".so.") {
        Some((stem, version)) => {
            !stem.is_empty()
                && !version.is_empty()
                && version
                    .split('.')
                    .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
        }
        None => false,
    }
}

/// Artifacts directly inside `dep_path`, sorted by name.
pub fn discover_artifacts(dep_path: &Path) -> DepResult<Vec<PathBuf>> {
    let entries = fs::read_dir(dep_path)
        .map_err(|e| DepError::io("reading dependency directory", dep_path, e))?;

    let mut artifacts = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| DepError::io("reading dependency directory", dep_path, e))?;
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            continue;
        }
        if is_shared_library(&entry.file_name().to_string_lossy()) {
            artifacts.push(entry.path());
        }
    }
    artifacts.sort();
    Ok(artifacts)
}

pub struct Linker {
    lib_dir: PathBuf,
}

impl Linker {
    pub fn new(lib_dir: impl Into<PathBuf>) -> Self {
        Self {
            lib_dir: lib_dir.into(),
        }
    }

    /// Link every artifact of `dep_path`. On a conflict, links created by this
    /// call are removed again and the pre-existing entry is left alone.
    pub fn link(&self, dep_path: &Path) -> DepResult<Vec<LinkedArtifact>> {
        // Link targets must not depend on the current directory.
        let dep_path = std::path::absolute(dep_path)
            .map_err(|e| DepError::io("resolving dependency directory", dep_path, e))?;
        let artifacts = discover_artifacts(&dep_path)?;
        if artifacts.is_empty() {
            tracing::debug!("no shared libraries in {}", dep_path.display());
            return Ok(Vec::new());
        }
        fs::create_dir_all(&self.lib_dir)
            .map_err(|e| DepError::io("creating library directory", &self.lib_dir, e))?;

        let mut linked: Vec<LinkedArtifact> = Vec::new();
        for artifact in artifacts {
            match self.link_one(&artifact) {
                Ok(done) => linked.push(done),
                Err(err) => {
                    self.rollback(&linked);
                    return Err(err);
                }
            }
        }
        Ok(linked)
    }

    fn link_one(&self, artifact: &Path) -> DepResult<LinkedArtifact> {
        let file_name = artifact.file_name().unwrap_or_default();
        let link = self.lib_dir.join(file_name);

        match create_symlink(artifact, &link) {
            Ok(()) => {
                tracing::info!("linked {} -> {}", link.display(), artifact.display());
                Ok(LinkedArtifact {
                    artifact: artifact.to_path_buf(),
                    link,
                    state: LinkState::Created,
                })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let existing = fs::read_link(&link).ok();
                if existing.as_deref() == Some(artifact) {
                    return Ok(LinkedArtifact {
                        artifact: artifact.to_path_buf(),
                        link,
                        state: LinkState::AlreadyLinked,
                    });
                }
                Err(DepError::LinkConflict {
                    artifact: file_name.to_string_lossy().to_string(),
                    link,
                    existing,
                })
            }
            Err(e) => Err(DepError::io("creating symlink", &link, e)),
        }
    }

    fn rollback(&self, linked: &[LinkedArtifact]) {
        for done in linked.iter().filter(|l| l.state == LinkState::Created) {
            if let Err(e) = fs::remove_file(&done.link) {
                tracing::warn!("could not remove {}: {}", done.link.display(), e);
            }
        }
    }
}

#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn create_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}
