//! `jt update`: fetch, build and link every declared dependency.
//!
//! Dependencies are processed in declaration order. With more than one job
//! the fetches run on a bounded pool first; builds and links always run in
//! order afterwards, so every build sees the complete set of sibling
//! checkouts on its search paths.
//!
//! By default the first failure stops the update and the remaining
//! dependencies are reported as skipped. `keep_going` processes them anyway.

use super::build::{self, SearchPaths};
use super::fetch::{FetchStatus, Fetcher};
use super::link::{LinkState, LinkedArtifact, Linker};
use crate::config::{BuildCommand, Dependency, DependencySet};
use crate::error::{DepError, DepResult};
use crate::settings::Settings;
use crate::ui;
use colored::*;
use indicatif::{MultiProgress, ProgressBar};
use rayon::prelude::*;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

type Fetched = DepResult<(PathBuf, FetchStatus)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Build,
    Link,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Fetch => "fetch",
            Stage::Build => "build",
            Stage::Link => "link",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub enum Outcome {
    Linked {
        fetch: FetchStatus,
        artifacts: Vec<LinkedArtifact>,
    },
    Failed {
        stage: Stage,
        error: DepError,
    },
    /// Not built or linked because an earlier dependency failed. The report's
    /// `path` is set when a parallel fetch had already completed.
    Skipped,
}

#[derive(Debug)]
pub struct DependencyReport {
    pub dependency: Dependency,
    /// Cache entry, once the fetch stage has produced one.
    pub path: Option<PathBuf>,
    pub outcome: Outcome,
}

#[derive(Debug, Default)]
pub struct UpdateReport {
    pub dependencies: Vec<DependencyReport>,
}

impl UpdateReport {
    pub fn is_success(&self) -> bool {
        self.dependencies
            .iter()
            .all(|d| matches!(d.outcome, Outcome::Linked { .. }))
    }

    pub fn failures(&self) -> impl Iterator<Item = &DependencyReport> {
        self.dependencies
            .iter()
            .filter(|d| matches!(d.outcome, Outcome::Failed { .. }))
    }

    pub fn print(&self) {
        if self.dependencies.is_empty() {
            println!("{} No dependencies declared.", "ℹ".blue());
            return;
        }

        let mut table = ui::Table::new(&["Dependency", "Source", "Result"]);
        for dep in &self.dependencies {
            let (source, result) = match &dep.outcome {
                Outcome::Linked { fetch, artifacts } => {
                    let source = match fetch {
                        FetchStatus::AlreadyCached => "cached".to_string(),
                        FetchStatus::Fetched { revision } => {
                            format!("fetched {}", &revision[..revision.len().min(7)])
                        }
                    };
                    (source, describe_links(artifacts).green().to_string())
                }
                Outcome::Failed { stage, error } => {
                    let source = if *stage == Stage::Fetch { "-" } else { "ok" };
                    (source.to_string(), error.kind().red().to_string())
                }
                Outcome::Skipped => ("-".to_string(), "skipped".dimmed().to_string()),
            };
            table.add_row(vec![dep.dependency.to_string(), source, result]);
        }
        table.print();

        for dep in self.failures() {
            if let Outcome::Failed { stage, error } = &dep.outcome {
                println!(
                    "{} {} failed at {}: {}",
                    "x".red(),
                    dep.dependency.to_string().bold(),
                    stage,
                    error
                );
            }
        }

        let failed = self.failures().count();
        let skipped = self
            .dependencies
            .iter()
            .filter(|d| matches!(d.outcome, Outcome::Skipped))
            .count();
        if self.is_success() {
            println!(
                "{} {} dependencies up to date.",
                "✓".green(),
                self.dependencies.len()
            );
        } else {
            println!(
                "{} {} failed, {} skipped of {} dependencies.",
                "x".red(),
                failed,
                skipped,
                self.dependencies.len()
            );
        }
    }
}

fn describe_links(artifacts: &[LinkedArtifact]) -> String {
    if artifacts.is_empty() {
        return "no libraries".to_string();
    }
    let created = artifacts
        .iter()
        .filter(|a| a.state == LinkState::Created)
        .count();
    if created == 0 {
        format!("{} already linked", artifacts.len())
    } else {
        format!("linked {}", artifacts.len())
    }
}

pub struct Updater {
    fetcher: Fetcher,
    linker: Linker,
    fallback: BuildCommand,
    jobs: usize,
    keep_going: bool,
    progress: MultiProgress,
}

impl Updater {
    /// `fallback` builds dependencies that ship no `Jetsam.toml` of their own.
    pub fn new(settings: &Settings, fallback: &BuildCommand) -> Self {
        Self {
            fetcher: Fetcher::new(settings),
            linker: Linker::new(&settings.lib_dir),
            fallback: fallback.clone(),
            jobs: settings.jobs.max(1),
            keep_going: settings.keep_going,
            progress: MultiProgress::new(),
        }
    }

    /// Draw no spinners.
    pub fn quiet(mut self) -> Self {
        self.progress = ui::hidden_progress();
        self
    }

    pub fn update_all(&self, deps: &DependencySet) -> UpdateReport {
        if !deps.is_empty() {
            println!("{} Checking {} dependencies...", "📦".blue(), deps.len());
        }
        let fetched = self.fetch_all(deps);

        let mut report = UpdateReport::default();
        let mut stopped = false;
        for (dep, fetched) in deps.iter().zip(fetched) {
            if stopped {
                // A parallel fetch may have finished before the failure was seen.
                let path = match fetched {
                    Some(Ok((path, _))) => Some(path),
                    _ => None,
                };
                report.dependencies.push(DependencyReport {
                    dependency: dep.clone(),
                    path,
                    outcome: Outcome::Skipped,
                });
                continue;
            }

            // Pending in sequential mode, or when a parallel worker saw a
            // failure before reaching this dependency.
            let fetched = match fetched {
                Some(result) => result,
                None => self.fetch_one(dep),
            };
            let entry = self.finish(deps, dep, fetched);
            if matches!(entry.outcome, Outcome::Failed { .. }) && !self.keep_going {
                tracing::debug!("stopping update after {} failed", dep);
                stopped = true;
            }
            report.dependencies.push(entry);
        }
        report
    }

    /// Parallel fetches up front when `jobs > 1`; otherwise every fetch is
    /// left pending so a failure can stop the update before later clones.
    ///
    /// Unless `keep_going` is set, workers stop starting new clones once any
    /// fetch has failed. Those dependencies stay pending.
    fn fetch_all(&self, deps: &DependencySet) -> Vec<Option<Fetched>> {
        if self.jobs <= 1 || deps.len() <= 1 {
            return deps.iter().map(|_| None).collect();
        }

        let failed = AtomicBool::new(false);
        let fetch = |dep: &Dependency| {
            if !self.keep_going && failed.load(Ordering::SeqCst) {
                return None;
            }
            let result = self.fetch_one(dep);
            if result.is_err() {
                failed.store(true, Ordering::SeqCst);
            }
            Some(result)
        };

        match rayon::ThreadPoolBuilder::new().num_threads(self.jobs).build() {
            Ok(pool) => pool.install(|| deps.as_slice().par_iter().map(fetch).collect()),
            Err(e) => {
                tracing::warn!(
                    "could not start {} fetch workers, fetching sequentially: {}",
                    self.jobs,
                    e
                );
                deps.iter().map(|_| None).collect()
            }
        }
    }

    fn fetch_one(&self, dep: &Dependency) -> Fetched {
        let pb = ui::spinner(&self.progress, format!("Fetching {}...", dep));
        let result = self.fetcher.fetch(dep);
        match &result {
            Ok((_, FetchStatus::AlreadyCached)) => {
                pb.finish_with_message(format!("{} Using cached: {}", "⚡".green(), dep))
            }
            Ok((_, FetchStatus::Fetched { .. })) => {
                pb.finish_with_message(format!("{} Downloaded {}", "✓".green(), dep))
            }
            Err(_) => pb.finish_with_message(format!("{} Failed {}", "x".red(), dep)),
        }
        result
    }

    fn finish(
        &self,
        deps: &DependencySet,
        dep: &Dependency,
        fetched: Fetched,
    ) -> DependencyReport {
        let failed = |path: Option<PathBuf>, stage, error| DependencyReport {
            dependency: dep.clone(),
            path,
            outcome: Outcome::Failed { stage, error },
        };

        let (path, fetch) = match fetched {
            Ok(done) => done,
            Err(error) => return failed(None, Stage::Fetch, error),
        };

        let pb = ui::spinner(&self.progress, format!("Building {}...", dep));
        if let Err(error) = self.build_one(deps, dep, &path) {
            pb.finish_with_message(format!("{} Build failed for {}", "x".red(), dep));
            return failed(Some(path), Stage::Build, error);
        }

        pb.set_message(format!("Linking {}...", dep));
        match self.linker.link(&path) {
            Ok(artifacts) => {
                finish_linked(&pb, dep, &artifacts);
                DependencyReport {
                    dependency: dep.clone(),
                    path: Some(path),
                    outcome: Outcome::Linked { fetch, artifacts },
                }
            }
            Err(error) => {
                pb.finish_with_message(format!("{} Link failed for {}", "x".red(), dep));
                failed(Some(path), Stage::Link, error)
            }
        }
    }

    fn build_one(&self, deps: &DependencySet, dep: &Dependency, path: &Path) -> DepResult<()> {
        let command = build::resolve_command(dep, path, &self.fallback)?;
        let search = SearchPaths::from_dirs(&self.fetcher.cache().sibling_dirs(deps, dep));
        let output = build::build(dep, path, &command, &search)?;
        tracing::debug!("build log for {} at {}", dep, output.log.display());
        Ok(())
    }
}

fn finish_linked(pb: &ProgressBar, dep: &Dependency, artifacts: &[LinkedArtifact]) {
    pb.finish_with_message(format!(
        "{} {} ({})",
        "✓".green(),
        dep,
        describe_links(artifacts)
    ));
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::deps::testutil::RemoteFixture;
    use std::fs;
    use tempfile::TempDir;

    struct Env {
        remote: RemoteFixture,
        home: TempDir,
    }

    impl Env {
        fn new() -> Self {
            Self {
                remote: RemoteFixture::new(),
                home: tempfile::tempdir().unwrap(),
            }
        }

        fn settings(&self) -> Settings {
            let mut settings =
                Settings::new(self.home.path().join("cache"), self.home.path().join("lib"));
            settings.source_host = self.remote.host_url();
            settings
        }

        fn lib_dir(&self) -> PathBuf {
            self.home.path().join("lib")
        }

        /// A repository whose own manifest builds `artifact` with `sh`.
        fn library(&self, name: &str, tag: &str, script: &str) {
            let manifest = format!(
                "[package]\nname = \"{}\"\ntype = \"lib\"\nversion = \"1.0.0\"\nbuild = [\"sh\", \"-c\", \"{}\"]\n",
                name.rsplit('/').next().unwrap(),
                script
            );
            self.remote.repo(name).commit("Jetsam.toml", &manifest).tag(tag);
        }
    }

    fn fallback() -> BuildCommand {
        BuildCommand::parse("true").unwrap()
    }

    fn set(deps: &[(&str, &str)]) -> DependencySet {
        deps.iter().map(|(n, r)| Dependency::new(*n, *r)).collect()
    }

    fn is_link(path: &Path) -> bool {
        fs::symlink_metadata(path)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
    }

    #[test]
    fn test_update_fetches_builds_and_links() {
        let env = Env::new();
        env.library("org/libjson", "v2.0.0", "touch libjson.so");

        let updater = Updater::new(&env.settings(), &fallback()).quiet();
        let report = updater.update_all(&set(&[("org/libjson", "v2.0.0")]));

        assert!(report.is_success(), "{:?}", report);
        let entry = &report.dependencies[0];
        assert!(matches!(
            entry.outcome,
            Outcome::Linked { fetch: FetchStatus::Fetched { .. }, .. }
        ));
        assert!(is_link(&env.lib_dir().join("libjson.so")));

        let again = updater.update_all(&set(&[("org/libjson", "v2.0.0")]));
        match &again.dependencies[0].outcome {
            Outcome::Linked { fetch, artifacts } => {
                assert_eq!(*fetch, FetchStatus::AlreadyCached);
                assert_eq!(artifacts[0].state, LinkState::AlreadyLinked);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_first_failure_skips_the_rest() {
        let env = Env::new();
        env.library("org/a", "v1", "touch liba.so");
        env.library("org/c", "v1", "touch libc.so");

        let updater = Updater::new(&env.settings(), &fallback()).quiet();
        let deps = set(&[("org/a", "v1"), ("org/missing", "v1"), ("org/c", "v1")]);
        let report = updater.update_all(&deps);

        assert!(!report.is_success());
        assert!(matches!(report.dependencies[0].outcome, Outcome::Linked { .. }));
        assert!(matches!(
            report.dependencies[1].outcome,
            Outcome::Failed { stage: Stage::Fetch, .. }
        ));
        assert!(matches!(report.dependencies[2].outcome, Outcome::Skipped));
        assert!(!env.home.path().join("cache/org/c@v1").exists());
    }

    #[test]
    fn test_keep_going_processes_everything() {
        let env = Env::new();
        env.library("org/bad", "v1", "exit 1");
        env.library("org/good", "v1", "touch libgood.so");

        let mut settings = env.settings();
        settings.keep_going = true;
        let report = Updater::new(&settings, &fallback())
            .quiet()
            .update_all(&set(&[("org/bad", "v1"), ("org/good", "v1")]));

        assert!(matches!(
            report.dependencies[0].outcome,
            Outcome::Failed { stage: Stage::Build, .. }
        ));
        assert!(matches!(report.dependencies[1].outcome, Outcome::Linked { .. }));
        assert_eq!(report.failures().count(), 1);
    }

    #[test]
    fn test_link_conflict_keeps_first_dependency() {
        let env = Env::new();
        env.library("org/one", "v1", "touch libcommon.so");
        env.library("org/two", "v1", "touch libcommon.so");

        let report = Updater::new(&env.settings(), &fallback())
            .quiet()
            .update_all(&set(&[("org/one", "v1"), ("org/two", "v1")]));

        match &report.dependencies[1].outcome {
            Outcome::Failed { stage, error } => {
                assert_eq!(*stage, Stage::Link);
                assert_eq!(error.kind(), "LinkConflict");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        let target = fs::read_link(env.lib_dir().join("libcommon.so")).unwrap();
        assert!(target.starts_with(env.home.path().join("cache/org/one@v1")));
    }

    #[test]
    fn test_parallel_fetch_keeps_declaration_order() {
        let env = Env::new();
        let names = ["org/p1", "org/p2", "org/p3", "org/p4"];
        for name in names {
            let lib = name.replace("org/", "lib");
            env.library(name, "v1", &format!("touch {}.so", lib));
        }

        let mut settings = env.settings();
        settings.jobs = 3;
        let deps: DependencySet = names.iter().map(|n| Dependency::new(*n, "v1")).collect();
        let report = Updater::new(&settings, &fallback()).quiet().update_all(&deps);

        assert!(report.is_success(), "{:?}", report);
        let order: Vec<&str> = report
            .dependencies
            .iter()
            .map(|d| d.dependency.name.as_str())
            .collect();
        assert_eq!(order, names);
        for lib in ["libp1.so", "libp2.so", "libp3.so", "libp4.so"] {
            assert!(is_link(&env.lib_dir().join(lib)), "{lib}");
        }
    }

    #[test]
    fn test_parallel_skipped_rows_report_what_was_fetched() {
        let env = Env::new();
        env.library("org/a", "v1", "touch liba.so");
        env.library("org/b", "v1", "touch libb.so");

        let mut settings = env.settings();
        settings.jobs = 2;
        let deps = set(&[("org/missing", "v1"), ("org/a", "v1"), ("org/b", "v1")]);
        let report = Updater::new(&settings, &fallback()).quiet().update_all(&deps);

        assert!(matches!(
            report.dependencies[0].outcome,
            Outcome::Failed { stage: Stage::Fetch, .. }
        ));
        for (row, name) in report.dependencies[1..].iter().zip(["org/a@v1", "org/b@v1"]) {
            assert!(matches!(row.outcome, Outcome::Skipped));
            let entry = env.home.path().join("cache").join(name);
            assert_eq!(row.path.is_some(), entry.exists(), "{name}");
            if let Some(path) = &row.path {
                assert_eq!(*path, entry);
            }
        }
        assert!(!env.lib_dir().join("liba.so").exists());
        assert!(!env.lib_dir().join("libb.so").exists());
    }

    #[test]
    fn test_builds_see_sibling_headers() {
        let env = Env::new();
        env.remote
            .repo("org/headers")
            .commit("include/common.h", "#define X 1\n")
            .tag("v1");
        env.library("org/user", "v1", "printf '%s' \\\"$CPATH\\\" > cpath.txt");

        let report = Updater::new(&env.settings(), &fallback())
            .quiet()
            .update_all(&set(&[("org/headers", "v1"), ("org/user", "v1")]));
        assert!(report.is_success(), "{:?}", report);

        let cpath_file = env.home.path().join("cache/org/user@v1/cpath.txt");
        let cpath = fs::read_to_string(cpath_file).unwrap();
        assert!(cpath.contains("org/headers@v1/include"), "{cpath}");
    }

    #[test]
    fn test_dependency_without_manifest_uses_fallback() {
        let env = Env::new();
        env.remote.repo("org/plain").commit("README", "plain").tag("v1");

        let argv = vec!["sh".into(), "-c".into(), "touch libplain.so".into()];
        let fallback = BuildCommand::new(argv).unwrap();
        let report = Updater::new(&env.settings(), &fallback)
            .quiet()
            .update_all(&set(&[("org/plain", "v1")]));

        assert!(report.is_success(), "{:?}", report);
        assert!(is_link(&env.lib_dir().join("libplain.so")));
    }

    #[test]
    fn test_empty_set_is_success() {
        let env = Env::new();
        let report = Updater::new(&env.settings(), &fallback())
            .quiet()
            .update_all(&DependencySet::default());
        assert!(report.is_success());
        assert!(report.dependencies.is_empty());
    }

    #[test]
    fn test_describe_links() {
        assert_eq!(describe_links(&[]), "no libraries");
        let linked = LinkedArtifact {
            artifact: PathBuf::from("/c/libx.so"),
            link: PathBuf::from("/l/libx.so"),
            state: LinkState::AlreadyLinked,
        };
        assert_eq!(describe_links(&[linked]), "1 already linked");
    }
}
