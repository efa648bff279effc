//! Local git remotes for fetch tests.

use git2::{Oid, Repository, RepositoryInitOptions, Signature};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A directory standing in for a source host: `org/repo` lives at
/// `<dir>/org/repo` and is reachable through a `file://` URL.
pub struct RemoteFixture {
    dir: TempDir,
}

pub struct RepoFixture {
    repo: Repository,
}

impl RemoteFixture {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn host_url(&self) -> String {
        format!("file://{}", self.dir.path().display())
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Open `name`, creating it with an empty `main` branch on first use.
    pub fn repo(&self, name: &str) -> RepoFixture {
        let path = self.path(name);
        let repo = if path.join(".git").exists() {
            Repository::open(&path).unwrap()
        } else {
            fs::create_dir_all(&path).unwrap();
            let mut opts = RepositoryInitOptions::new();
            opts.initial_head("main");
            Repository::init_opts(&path, &opts).unwrap()
        };
        RepoFixture { repo }
    }

    pub fn remove(&self, name: &str) {
        fs::remove_dir_all(self.path(name)).unwrap();
    }
}

impl RepoFixture {
    fn workdir(&self) -> &Path {
        self.repo.workdir().unwrap()
    }

    fn signature() -> Signature<'static> {
        Signature::now("jetsam-test", "test@example.com").unwrap()
    }

    pub fn commit(&self, file: &str, content: &str) -> &Self {
        let full = self.workdir().join(file);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&full, content).unwrap();

        let mut index = self.repo.index().unwrap();
        index.add_path(Path::new(file)).unwrap();
        index.write().unwrap();
        let tree = self.repo.find_tree(index.write_tree().unwrap()).unwrap();

        let parent = self.repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        let sig = Self::signature();
        self.repo
            .commit(Some("HEAD"), &sig, &sig, &format!("update {}", file), &tree, &parents)
            .unwrap();
        self
    }

    /// Annotated tag at HEAD; returns the tagged commit.
    pub fn tag(&self, name: &str) -> Oid {
        let head = self.repo.head().unwrap().peel_to_commit().unwrap();
        self.repo
            .tag(name, head.as_object(), &Self::signature(), name, false)
            .unwrap();
        head.id()
    }

    /// Create `name` at HEAD and switch to it.
    pub fn branch(&self, name: &str) -> &Self {
        let head = self.repo.head().unwrap().peel_to_commit().unwrap();
        self.repo.branch(name, &head, false).unwrap();
        self.checkout_branch(name)
    }

    pub fn checkout_branch(&self, name: &str) -> &Self {
        let refname = format!("refs/heads/{}", name);
        self.repo.set_head(&refname).unwrap();
        let mut opts = git2::build::CheckoutBuilder::new();
        opts.force();
        self.repo.checkout_head(Some(&mut opts)).unwrap();
        self
    }

    pub fn head(&self) -> Oid {
        self.repo.head().unwrap().target().unwrap()
    }
}

/// Make `dir` read-only. Returns false when writes still succeed (running as
/// root), in which case permission tests have nothing to check.
#[cfg(unix)]
pub fn make_read_only(dir: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(dir, fs::Permissions::from_mode(0o555)).unwrap();
    let check = dir.join(".write-check");
    if fs::write(&check, b"").is_ok() {
        fs::remove_file(&check).unwrap();
        return false;
    }
    true
}
