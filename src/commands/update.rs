//! Update command handler
//!
//! Handles `jt update`.

use anyhow::{Context, Result};
use colored::*;
use std::fs;

use crate::config::Manifest;
use crate::deps::{UpdateReport, Updater};
use crate::settings::Settings;

/// Fetch, build and link every dependency, then print the report.
pub fn run_update(manifest: &Manifest, settings: &Settings) -> Result<UpdateReport> {
    fs::create_dir_all(&settings.cache_root).with_context(|| {
        format!(
            "Failed to create cache directory {}",
            settings.cache_root.display()
        )
    })?;
    tracing::info!(
        "cache {} -> library dir {} ({} jobs{})",
        settings.cache_root.display(),
        settings.lib_dir.display(),
        settings.jobs,
        if settings.keep_going { ", keep going" } else { "" }
    );

    if manifest.dependencies.is_empty() {
        println!("{} No dependencies declared.", "ℹ".blue());
        return Ok(UpdateReport::default());
    }

    let report = Updater::new(settings, &manifest.package.build).update_all(&manifest.dependencies);
    println!();
    report.print();
    Ok(report)
}
