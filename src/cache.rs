//! Per-user dependency cache.
//!
//! Every fetched dependency lives at `<cache root>/<name>@<version ref>`.
//! The directory existing is the only record that a dependency was fetched.
//!
//! ## Commands
//!
//! - `jt cache path` - Print cache directory location
//! - `jt cache ls` - List cached dependencies
//! - `jt cache clean` - Clear all cached dependencies

use crate::config::Dependency;
use crate::error::{DepError, DepResult};
use crate::ui;
use anyhow::Result;
use colored::*;
use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const VERSION_SEPARATOR: char = '@';

#[cfg(target_os = "linux")]
pub const MAX_PATH_LEN: usize = 4096;
#[cfg(not(target_os = "linux"))]
pub const MAX_PATH_LEN: usize = 1024;

pub const MAX_SEGMENT_LEN: usize = 255;

// Keeps a version ref to a single path segment; `%` is escaped so the
// encoding stays injective.
const REF_ESCAPE: &AsciiSet = &CONTROLS.add(b'%').add(b'/').add(b'\\');

#[derive(Debug, Clone)]
pub struct CacheRoot {
    root: PathBuf,
}

/// A dependency found on disk by [`CacheRoot::entries`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedEntry {
    pub name: String,
    pub version_ref: String,
    pub path: PathBuf,
}

impl CacheRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn entry(&self, dep: &Dependency) -> DepResult<PathBuf> {
        self.resolve(&dep.name, &dep.version_ref)
    }

    /// Map `(name, version_ref)` to its cache directory. Creates nothing.
    pub fn resolve(&self, name: &str, version_ref: &str) -> DepResult<PathBuf> {
        let segments = validate_name(name)?;
        validate_ref(name, version_ref)?;

        let (leaf, parents) = segments
            .split_last()
            .ok_or_else(|| invalid_name(name, "name is empty"))?;
        let leaf = format!(
            "{}{}{}",
            leaf,
            VERSION_SEPARATOR,
            utf8_percent_encode(version_ref, REF_ESCAPE)
        );

        let too_long = |len: usize, limit: usize| DepError::PathTooLong {
            name: name.to_string(),
            version_ref: version_ref.to_string(),
            len,
            limit,
        };

        if leaf.len() > MAX_SEGMENT_LEN {
            return Err(too_long(leaf.len(), MAX_SEGMENT_LEN));
        }
        if let Some(seg) = parents.iter().find(|s| s.len() > MAX_SEGMENT_LEN) {
            return Err(too_long(seg.len(), MAX_SEGMENT_LEN));
        }

        let mut path = self.root.clone();
        path.extend(parents);
        path.push(leaf);

        let len = path.as_os_str().len();
        if len > MAX_PATH_LEN {
            return Err(too_long(len, MAX_PATH_LEN));
        }
        Ok(path)
    }

    /// All cached dependencies, sorted by path.
    pub fn entries(&self) -> Result<Vec<CachedEntry>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        let mut it = WalkDir::new(&self.root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                e.file_type().is_dir() && !e.file_name().to_string_lossy().starts_with('.')
            });

        while let Some(entry) = it.next() {
            let entry = entry?;
            let file_name = entry.file_name().to_string_lossy().to_string();
            let Some((leaf, encoded_ref)) = file_name.split_once(VERSION_SEPARATOR) else {
                continue;
            };

            let rel = entry.path().strip_prefix(&self.root)?;
            let mut name: Vec<String> = rel
                .parent()
                .map(|p| {
                    p.components()
                        .map(|c| c.as_os_str().to_string_lossy().to_string())
                        .collect()
                })
                .unwrap_or_default();
            name.push(leaf.to_string());

            entries.push(CachedEntry {
                name: name.join("/"),
                version_ref: percent_decode_str(encoded_ref).decode_utf8_lossy().to_string(),
                path: entry.path().to_path_buf(),
            });
            it.skip_current_dir();
        }
        Ok(entries)
    }

    /// Cached directories of everything in `deps` except `skip`.
    pub fn sibling_dirs<'a>(
        &self,
        deps: impl IntoIterator<Item = &'a Dependency>,
        skip: &Dependency,
    ) -> Vec<PathBuf> {
        let mut dirs = Vec::new();
        for dep in deps {
            if dep == skip {
                continue;
            }
            if let Ok(path) = self.entry(dep)
                && path.is_dir()
                && !dirs.contains(&path)
            {
                dirs.push(path);
            }
        }
        dirs
    }
}

fn invalid_name(name: &str, reason: &'static str) -> DepError {
    DepError::InvalidName {
        name: name.to_string(),
        reason,
    }
}

fn validate_name(name: &str) -> DepResult<Vec<&str>> {
    if name.is_empty() {
        return Err(invalid_name(name, "name is empty"));
    }
    let segments: Vec<&str> = name.split('/').collect();
    for seg in &segments {
        if seg.is_empty() {
            return Err(invalid_name(name, "empty path segment"));
        }
        if *seg == "." || *seg == ".." {
            return Err(invalid_name(name, "relative path segment"));
        }
        // Dot-directories under the cache root hold locks and staging clones.
        if seg.starts_with('.') {
            return Err(invalid_name(name, "segment starts with '.'"));
        }
        if seg.contains(VERSION_SEPARATOR) {
            return Err(invalid_name(name, "'@' is reserved as the version separator"));
        }
        if seg.contains('\\') || seg.chars().any(char::is_control) {
            return Err(invalid_name(name, "backslash or control character"));
        }
    }
    Ok(segments)
}

fn validate_ref(name: &str, version_ref: &str) -> DepResult<()> {
    let reason = if version_ref.is_empty() {
        "version reference is empty"
    } else if version_ref.chars().any(char::is_control) {
        "control character in version reference"
    } else {
        return Ok(());
    };
    Err(DepError::InvalidRef {
        name: name.to_string(),
        version_ref: version_ref.to_string(),
        reason,
    })
}

pub fn print_path(cache: &CacheRoot) -> Result<()> {
    println!("{}", cache.path().display());
    Ok(())
}

pub fn list(cache: &CacheRoot) -> Result<()> {
    let entries = cache.entries()?;
    if entries.is_empty() {
        println!("{} Cache is empty.", "ℹ".blue());
        return Ok(());
    }

    let mut table = ui::Table::new(&["Dependency", "Version", "Path"]);
    for entry in entries {
        table.add_row(vec![
            entry.name.bold().to_string(),
            entry.version_ref.green().to_string(),
            entry.path.display().to_string().dimmed().to_string(),
        ]);
    }
    table.print();
    Ok(())
}

pub fn clean(cache: &CacheRoot) -> Result<()> {
    let root = cache.path();
    if root.exists() {
        println!("{} Cleaning cache...", "🧹".yellow());
        for entry in cache.entries()? {
            fs::remove_dir_all(&entry.path)?;
        }
        prune_empty_dirs(root)?;
        println!("{} Cache cleaned.", "✓".green());
    } else {
        println!("{} Cache already empty.", "✓".green());
    }
    Ok(())
}

// Removes org/host directories left empty by `clean`; the root itself and
// dot-directories (locks, settings) stay.
fn prune_empty_dirs(root: &Path) -> Result<()> {
    for entry in WalkDir::new(root)
        .min_depth(1)
        .contents_first(true)
        .into_iter()
        .filter_entry(|e| !e.file_name().to_string_lossy().starts_with('.'))
    {
        let entry = entry?;
        if entry.file_type().is_dir() && fs::read_dir(entry.path())?.next().is_none() {
            fs::remove_dir(entry.path())?;
        }
    }
    Ok(())
}
