//! Tool-level settings.
//!
//! Resolution order, later wins:
//!
//! 1. Built-in defaults (`~/.jetsam`, `/usr/local/lib`, `https://github.com`)
//! 2. `~/.jetsam/config.toml`
//! 3. `JETSAM_CACHE_DIR`, `JETSAM_LIB_DIR`, `JETSAM_SOURCE_HOST`
//! 4. Command-line flags (applied by the caller)

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_LIB_DIR: &str = "/usr/local/lib";
pub const DEFAULT_SOURCE_HOST: &str = "https://github.com";
const TOOL_DIR: &str = ".jetsam";
const SETTINGS_FILE: &str = "config.toml";

#[derive(Debug, Clone)]
pub struct Settings {
    /// Root of the per-user dependency cache.
    pub cache_root: PathBuf,
    /// System library directory that receives artifact symlinks.
    pub lib_dir: PathBuf,
    /// Base URL for names without an explicit host.
    pub source_host: String,
    /// Worker count for fetches. 1 keeps the update fully sequential.
    pub jobs: usize,
    /// Continue with other dependencies after a failure.
    pub keep_going: bool,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct SettingsFile {
    cache_dir: Option<PathBuf>,
    lib_dir: Option<PathBuf>,
    source_host: Option<String>,
    jobs: Option<usize>,
    keep_going: Option<bool>,
}

impl Settings {
    pub fn new(cache_root: impl Into<PathBuf>, lib_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_root: cache_root.into(),
            lib_dir: lib_dir.into(),
            source_host: DEFAULT_SOURCE_HOST.to_string(),
            jobs: 1,
            keep_going: false,
        }
    }

    /// Defaults, then the settings file, then the environment.
    pub fn load() -> Result<Self> {
        let home = dirs::home_dir().context("Could not find home directory")?;
        let tool_dir = home.join(TOOL_DIR);
        let mut settings = Self::new(&tool_dir, DEFAULT_LIB_DIR);

        let file = tool_dir.join(SETTINGS_FILE);
        if file.is_file() {
            settings.apply_file(&file)?;
        }
        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    fn apply_file(&mut self, path: &Path) -> Result<()> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let file: SettingsFile = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        if let Some(dir) = file.cache_dir {
            self.cache_root = dir;
        }
        if let Some(dir) = file.lib_dir {
            self.lib_dir = dir;
        }
        if let Some(host) = file.source_host {
            self.source_host = host;
        }
        if let Some(jobs) = file.jobs {
            self.jobs = jobs.max(1);
        }
        if let Some(keep_going) = file.keep_going {
            self.keep_going = keep_going;
        }
        tracing::debug!("loaded settings from {}", path.display());
        Ok(())
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("JETSAM_CACHE_DIR").filter(|v| !v.is_empty()) {
            self.cache_root = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("JETSAM_LIB_DIR").filter(|v| !v.is_empty()) {
            self.lib_dir = PathBuf::from(dir);
        }
        if let Some(host) = lookup("JETSAM_SOURCE_HOST").filter(|v| !v.is_empty()) {
            self.source_host = host;
        }
    }

    /// Clone URL for a dependency name.
    ///
    /// `github.com/org/repo` carries its own host; `org/repo` is resolved
    /// against `source_host`.
    pub fn remote_url(&self, name: &str) -> String {
        let first = name.split('/').next().unwrap_or_default();
        if first.contains('.') {
            format!("https://{}", name)
        } else {
            format!("{}/{}", self.source_host.trim_end_matches('/'), name)
        }
    }
}
