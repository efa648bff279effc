//! Project command handlers
//!
//! Handles `jt build`, `jt test`, `jt install`, `jt config` and `jt deps`.

use anyhow::{Context, Result, bail};
use colored::*;
use std::fmt::Write as _;
use std::path::Path;
use std::process::Stdio;

use crate::config::{BuildCommand, Manifest};

/// Which project build to run. `test` and `install` append a target to the
/// configured command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildTarget {
    Default,
    Test,
    Install,
}

impl BuildTarget {
    pub fn command(self, base: &BuildCommand) -> BuildCommand {
        match self {
            BuildTarget::Default => base.clone(),
            BuildTarget::Test => base.with_arg("test"),
            BuildTarget::Install => base.with_arg("install"),
        }
    }
}

/// Run the project's own build command in `project_dir`.
pub fn run_build(manifest: &Manifest, project_dir: &Path, target: BuildTarget) -> Result<()> {
    let command = target.command(&manifest.package.build);
    println!(
        "{} Running {} for {}...",
        "🔨".yellow(),
        command.to_string().cyan(),
        manifest.package.name.bold()
    );
    tracing::info!("running `{}` in {}", command, project_dir.display());

    let status = command
        .to_command()
        .current_dir(project_dir)
        .stdin(Stdio::inherit())
        .status()
        .with_context(|| format!("Failed to run `{}`", command))?;

    if !status.success() {
        match status.code() {
            Some(code) => bail!("`{}` failed with exit code {}", command, code),
            None => bail!("`{}` was terminated by a signal", command),
        }
    }
    println!("{} Done.", "✓".green());
    Ok(())
}

pub fn print_config(manifest: &Manifest) -> Result<()> {
    print!("{}", format_config(manifest));
    Ok(())
}

pub fn print_deps(manifest: &Manifest) -> Result<()> {
    print!("{}", format_deps(manifest));
    Ok(())
}

fn format_config(manifest: &Manifest) -> String {
    let pkg = &manifest.package;
    let optional = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());

    let mut out = String::new();
    let _ = writeln!(out, "{}", "Package:".bold());
    let _ = writeln!(out, "    name:        {}", pkg.name);
    let _ = writeln!(out, "    type:        {}", pkg.kind);
    let _ = writeln!(out, "    description: {}", optional(&pkg.description));
    let _ = writeln!(out, "    version:     {}", pkg.version);
    let _ = writeln!(out, "    build:       {}", pkg.build);
    let _ = writeln!(out, "    repository:  {}", optional(&pkg.repository));
    let _ = writeln!(out, "    homepage:    {}", optional(&pkg.homepage));
    let authors = if pkg.authors.is_empty() {
        "-".to_string()
    } else {
        pkg.authors.join(", ")
    };
    let _ = writeln!(out, "    authors:     {}", authors);
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", "Dependencies:".bold());
    for dep in &manifest.dependencies {
        let _ = writeln!(out, "    {} - {}", dep.name, dep.version_ref);
    }
    out
}

fn format_deps(manifest: &Manifest) -> String {
    let mut out = String::new();
    for dep in &manifest.dependencies {
        let _ = writeln!(out, "{} - {}", dep.name, dep.version_ref);
    }
    out
}
