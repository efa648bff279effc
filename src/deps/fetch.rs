//! Dependency fetching.
//!
//! Clones a dependency into its cache entry and checks out the pinned
//! reference. An entry that already exists is trusted as-is: no network
//! access and no check that it still matches the reference.
//!
//! Clones go to a hidden staging directory next to the entry and are renamed
//! into place only after the checkout succeeds, so a failed fetch never
//! leaves anything at the entry path.

use super::lock::EntryLocks;
use crate::cache::CacheRoot;
use crate::config::Dependency;
use crate::error::{DepError, DepResult};
use crate::settings::Settings;
use git2::{BranchType, Oid, Repository};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
    /// The entry directory already existed.
    AlreadyCached,
    /// Freshly cloned; `revision` is the checked-out commit.
    Fetched { revision: String },
}

pub struct Fetcher {
    cache: CacheRoot,
    settings: Settings,
    locks: EntryLocks,
}

impl Fetcher {
    pub fn new(settings: &Settings) -> Self {
        Self {
            cache: CacheRoot::new(&settings.cache_root),
            settings: settings.clone(),
            locks: EntryLocks::new(),
        }
    }

    pub fn cache(&self) -> &CacheRoot {
        &self.cache
    }

    pub fn fetch(&self, dep: &Dependency) -> DepResult<(PathBuf, FetchStatus)> {
        let path = self.cache.entry(dep)?;
        if path.is_dir() {
            tracing::debug!("{} already cached at {}", dep, path.display());
            return Ok((path, FetchStatus::AlreadyCached));
        }

        let _guard = self.locks.acquire(self.cache.path(), &path)?;
        // Another worker or process may have finished while we waited.
        if path.is_dir() {
            return Ok((path, FetchStatus::AlreadyCached));
        }

        let url = self.settings.remote_url(&dep.name);
        let staging = Staging::create(&path)?;
        tracing::info!("cloning {} into {}", url, staging.path().display());

        let revision = clone_and_checkout(dep, &url, staging.path())?;
        staging.commit(&path)?;

        tracing::info!("{} checked out at {}", dep, short_hash(&revision));
        Ok((path, FetchStatus::Fetched { revision }))
    }
}

/// Where a reference was found, which decides how HEAD is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefKind {
    LocalBranch,
    RemoteBranch,
    Detached,
}

fn clone_and_checkout(dep: &Dependency, url: &str, dest: &Path) -> DepResult<String> {
    let repo = Repository::clone(url, dest).map_err(|e| DepError::FetchFailed {
        name: dep.name.clone(),
        url: url.to_string(),
        message: e.message().to_string(),
    })?;

    let (oid, kind) =
        resolve_reference(&repo, &dep.version_ref).ok_or_else(|| DepError::RefNotFound {
            name: dep.name.clone(),
            version_ref: dep.version_ref.clone(),
        })?;

    let checkout_failed = |e: git2::Error| DepError::CheckoutFailed {
        name: dep.name.clone(),
        version_ref: dep.version_ref.clone(),
        message: e.message().to_string(),
    };

    let obj = repo.find_object(oid, None).map_err(checkout_failed)?;
    let mut checkout_opts = git2::build::CheckoutBuilder::new();
    checkout_opts.force();
    repo.checkout_tree(&obj, Some(&mut checkout_opts))
        .map_err(checkout_failed)?;

    point_head(&repo, &dep.version_ref, oid, kind).map_err(checkout_failed)?;
    Ok(oid.to_string())
}

/// Branch names win over tags and revspecs; `origin/<ref>` covers branches
/// that are not the remote's default.
fn resolve_reference(repo: &Repository, version_ref: &str) -> Option<(Oid, RefKind)> {
    if let Ok(branch) = repo.find_branch(version_ref, BranchType::Local)
        && let Ok(commit) = branch.get().peel_to_commit()
    {
        return Some((commit.id(), RefKind::LocalBranch));
    }

    let remote_ref = format!("origin/{}", version_ref);
    if let Ok(branch) = repo.find_branch(&remote_ref, BranchType::Remote)
        && let Ok(commit) = branch.get().peel_to_commit()
    {
        return Some((commit.id(), RefKind::RemoteBranch));
    }

    if let Ok(obj) = repo.revparse_single(version_ref)
        && let Ok(commit) = obj.peel_to_commit()
    {
        return Some((commit.id(), RefKind::Detached));
    }

    None
}

fn point_head(
    repo: &Repository,
    version_ref: &str,
    oid: Oid,
    kind: RefKind,
) -> Result<(), git2::Error> {
    match kind {
        RefKind::LocalBranch => repo.set_head(&format!("refs/heads/{}", version_ref)),
        RefKind::RemoteBranch => {
            let commit = repo.find_commit(oid)?;
            let mut branch = repo.branch(version_ref, &commit, true)?;
            branch.set_upstream(Some(&format!("origin/{}", version_ref)))?;
            repo.set_head(&format!("refs/heads/{}", version_ref))
        }
        RefKind::Detached => repo.set_head_detached(oid),
    }
}

fn short_hash(rev: &str) -> &str {
    if rev.len() > 7 { &rev[..7] } else { rev }
}

// Fixed length whatever the entry name, so a leaf that fits the segment limit
// never produces an over-long staging name.
fn staging_name(entry: &Path) -> String {
    let digest = format!("{:x}", Sha256::digest(entry.as_os_str().as_encoded_bytes()));
    format!(".partial-{}-{}", &digest[..16], std::process::id())
}

/// Clone target that is removed on drop unless committed.
struct Staging {
    path: PathBuf,
    committed: bool,
}

impl Staging {
    fn create(entry: &Path) -> DepResult<Self> {
        let parent = entry.parent().ok_or_else(|| DepError::Io {
            context: format!("cache entry {} has no parent", entry.display()),
            source: std::io::Error::from(std::io::ErrorKind::InvalidInput),
        })?;
        fs::create_dir_all(parent)
            .map_err(|e| DepError::io("creating cache directory", parent, e))?;

        let path = parent.join(staging_name(entry));
        if path.exists() {
            fs::remove_dir_all(&path)
                .map_err(|e| DepError::io("removing stale staging directory", &path, e))?;
        }
        Ok(Self {
            path,
            committed: false,
        })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn commit(mut self, entry: &Path) -> DepResult<()> {
        fs::rename(&self.path, entry)
            .map_err(|e| DepError::io("moving clone into the cache", entry, e))?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for Staging {
    fn drop(&mut self) {
        if !self.committed && self.path.exists() {
            if let Err(e) = fs::remove_dir_all(&self.path) {
                tracing::warn!("could not remove {}: {}", self.path.display(), e);
            }
        }
    }
}
