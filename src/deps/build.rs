//! Building fetched dependencies.
//!
//! The build command comes from the dependency's own `Jetsam.toml` when it
//! has one, falling back to the consuming project's `package.build`. It runs
//! as a plain argument vector inside the cache entry with the other
//! dependencies' directories injected as compiler and linker search paths.

use crate::config::{BuildCommand, Dependency, Manifest};
use crate::error::{DepError, DepResult};
use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

pub const BUILD_LOG: &str = ".jetsam-build.log";
const LOG_TAIL_LINES: usize = 20;

/// Header and library directories exposed to a dependency's build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPaths {
    pub include: Vec<PathBuf>,
    pub lib: Vec<PathBuf>,
}

impl SearchPaths {
    /// Collect the usual layout of each sibling checkout.
    pub fn from_dirs(dirs: &[PathBuf]) -> Self {
        let mut paths = Self::default();
        for dir in dirs {
            paths.include.push(dir.clone());
            for sub in ["include", "src"] {
                let candidate = dir.join(sub);
                if candidate.is_dir() {
                    paths.include.push(candidate);
                }
            }
            paths.lib.push(dir.clone());
            let lib = dir.join("lib");
            if lib.is_dir() {
                paths.lib.push(lib);
            }
        }
        paths
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.lib.is_empty()
    }

    /// Set `CPATH`/`LIBRARY_PATH` and extend `CFLAGS`/`CXXFLAGS`/`LDFLAGS`,
    /// keeping whatever the caller's environment already had.
    pub fn apply(&self, cmd: &mut Command, env: impl Fn(&str) -> Option<OsString>) {
        if self.is_empty() {
            return;
        }

        if let Some(value) = join_path_var(&self.include, env("CPATH")) {
            cmd.env("CPATH", value);
        }
        if let Some(value) = join_path_var(&self.lib, env("LIBRARY_PATH")) {
            cmd.env("LIBRARY_PATH", value);
        }

        let include_flags = flags("-I", &self.include);
        for var in ["CFLAGS", "CXXFLAGS"] {
            cmd.env(var, append_flags(env(var), &include_flags));
        }
        cmd.env("LDFLAGS", append_flags(env("LDFLAGS"), &flags("-L", &self.lib)));
    }
}

fn join_path_var(dirs: &[PathBuf], existing: Option<OsString>) -> Option<OsString> {
    let mut all: Vec<PathBuf> = dirs.to_vec();
    if let Some(existing) = existing {
        all.extend(std::env::split_paths(&existing));
    }
    if all.is_empty() {
        return None;
    }
    match std::env::join_paths(&all) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("skipping search path injection: {}", e);
            None
        }
    }
}

fn flags(prefix: &str, dirs: &[PathBuf]) -> OsString {
    let mut out = OsString::new();
    for (i, dir) in dirs.iter().enumerate() {
        if i > 0 {
            out.push(" ");
        }
        out.push(prefix);
        out.push(dir.as_os_str());
    }
    out
}

fn append_flags(existing: Option<OsString>, extra: &OsStr) -> OsString {
    match existing {
        Some(mut value) if !value.is_empty() => {
            value.push(" ");
            value.push(extra);
            value
        }
        _ => extra.to_os_string(),
    }
}

#[derive(Debug, Clone)]
pub struct BuildOutput {
    /// Captured stdout and stderr of the build.
    pub log: PathBuf,
}

/// The command a dependency builds with.
pub fn resolve_command(
    dep: &Dependency,
    dep_path: &Path,
    fallback: &BuildCommand,
) -> DepResult<BuildCommand> {
    match Manifest::load_optional(dep_path) {
        Ok(Some(manifest)) => Ok(manifest.package.build),
        Ok(None) => Ok(fallback.clone()),
        Err(e) => Err(DepError::BuildFailed {
            name: dep.name.clone(),
            status: "invalid dependency manifest".to_string(),
            log_tail: format!("{:#}", e),
        }),
    }
}

/// Run `command` in `dep_path`. Output goes to the build log, not the terminal.
pub fn build(
    dep: &Dependency,
    dep_path: &Path,
    command: &BuildCommand,
    search: &SearchPaths,
) -> DepResult<BuildOutput> {
    let mut cmd = command.to_command();
    cmd.current_dir(dep_path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    search.apply(&mut cmd, |key| std::env::var_os(key));

    tracing::info!("building {} with `{}`", dep, command);
    let output = cmd.output().map_err(|e| DepError::BuildFailed {
        name: dep.name.clone(),
        status: format!("could not run `{}`", command),
        log_tail: e.to_string(),
    })?;

    let log = dep_path.join(BUILD_LOG);
    let mut contents = output.stdout.clone();
    contents.extend_from_slice(&output.stderr);
    if let Err(e) = fs::write(&log, &contents) {
        tracing::warn!("could not write {}: {}", log.display(), e);
    }

    if !output.status.success() {
        let status = match output.status.code() {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        };
        let source = if output.stderr.is_empty() {
            &output.stdout
        } else {
            &output.stderr
        };
        return Err(DepError::BuildFailed {
            name: dep.name.clone(),
            status,
            log_tail: tail(&String::from_utf8_lossy(source), LOG_TAIL_LINES),
        });
    }

    Ok(BuildOutput { log })
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}
