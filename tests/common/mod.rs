//! Shared fixtures: a scratch HOME, a `file://` source host with git
//! repositories, and a project directory holding a `Jetsam.toml`.

#![allow(dead_code)]

use assert_cmd::Command;
use git2::{Repository, RepositoryInitOptions, Signature};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct Sandbox {
    root: TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        let sandbox = Self {
            root: tempfile::tempdir().expect("Failed to create sandbox"),
        };
        for dir in ["home", "remote", "project"] {
            fs::create_dir_all(sandbox.root.path().join(dir)).unwrap();
        }
        sandbox
    }

    pub fn home(&self) -> PathBuf {
        self.root.path().join("home")
    }

    pub fn cache(&self) -> PathBuf {
        self.home().join(".jetsam")
    }

    pub fn lib_dir(&self) -> PathBuf {
        self.root.path().join("lib")
    }

    pub fn remote(&self) -> PathBuf {
        self.root.path().join("remote")
    }

    pub fn project(&self) -> PathBuf {
        self.root.path().join("project")
    }

    /// Publish `name` at `tag` with a manifest whose build runs `script`.
    pub fn publish(&self, name: &str, tag: &str, script: &str) {
        let leaf = name.rsplit('/').next().unwrap();
        let manifest = format!(
            "[package]\nname = \"{leaf}\"\ntype = \"lib\"\nversion = \"1.0.0\"\nbuild = [\"sh\", \"-c\", \"{script}\"]\n"
        );
        let repo = self.init_repo(name);
        commit(&repo, "Jetsam.toml", &manifest);
        let head = repo.head().unwrap().peel_to_commit().unwrap();
        repo.tag(tag, head.as_object(), &signature(), tag, false)
            .unwrap();
    }

    pub fn unpublish(&self, name: &str) {
        fs::remove_dir_all(self.remote().join(name)).unwrap();
    }

    pub fn write_manifest(&self, deps: &[(&str, &str)]) {
        let mut manifest = String::from(
            "[package]\nname = \"app\"\ntype = \"bin\"\nbuild = \"make\"\nversion = \"0.1.0\"\n\n[dependencies]\n",
        );
        for (name, version) in deps {
            manifest.push_str(&format!("\"{name}\" = \"{version}\"\n"));
        }
        fs::write(self.project().join("Jetsam.toml"), manifest).unwrap();
    }

    /// `jt` running in the project directory with every path redirected
    /// into the sandbox.
    pub fn jt(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_jt"));
        cmd.current_dir(self.project())
            .env("HOME", self.home())
            .env("JETSAM_CACHE_DIR", self.cache())
            .env("JETSAM_LIB_DIR", self.lib_dir())
            .env("JETSAM_SOURCE_HOST", format!("file://{}", self.remote().display()))
            .env("NO_COLOR", "1")
            .env_remove("RUST_LOG");
        cmd
    }

    fn init_repo(&self, name: &str) -> Repository {
        let path = self.remote().join(name);
        fs::create_dir_all(&path).unwrap();
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("main");
        Repository::init_opts(&path, &opts).unwrap()
    }
}

fn signature() -> Signature<'static> {
    Signature::now("jetsam-test", "test@example.com").unwrap()
}

fn commit(repo: &Repository, file: &str, content: &str) {
    let workdir = repo.workdir().unwrap();
    fs::write(workdir.join(file), content).unwrap();

    let mut index = repo.index().unwrap();
    index.add_path(Path::new(file)).unwrap();
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let sig = signature();
    repo.commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[])
        .unwrap();
}

pub fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}
