//! Git checkout discovery under a projects root.

use crate::paths::{is_directory_or_subdirectory, lossy};
use crate::walk::{DirWalker, WalkError, walk_dirs};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Include/exclude policy applied to discovered checkouts.
///
/// Entries are compared with [`is_directory_or_subdirectory`], so an entry
/// matches the checkout itself and anything nested below it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectFilter {
    /// When set, only checkouts inside one of these directories qualify.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_dirs: Option<Vec<String>>,
    /// Checkouts inside any of these directories never qualify.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_dirs: Vec<String>,
}

impl ProjectFilter {
    /// Every checkout qualifies.
    pub fn all() -> Self {
        Self::default()
    }

    /// Every checkout except those inside `dir`.
    pub fn excluding(dir: impl Into<String>) -> Self {
        Self {
            include_dirs: None,
            exclude_dirs: vec![dir.into()],
        }
    }

    /// Only checkouts inside `dir`.
    pub fn including_only(dir: impl Into<String>) -> Self {
        Self {
            include_dirs: Some(vec![dir.into()]),
            exclude_dirs: Vec::new(),
        }
    }

    /// Whether a checkout directory passes the policy.
    ///
    /// Exclusion is checked on its own, so a checkout that is both included
    /// and excluded is rejected.
    pub fn admits(&self, checkout: &str) -> bool {
        if let Some(include_dirs) = &self.include_dirs
            && !include_dirs
                .iter()
                .any(|include| is_directory_or_subdirectory(include, checkout))
        {
            return false;
        }

        !self
            .exclude_dirs
            .iter()
            .any(|exclude| is_directory_or_subdirectory(exclude, checkout))
    }
}

/// Whether `dir` directly holds a `.git` entry (directory or gitfile).
pub fn is_git_checkout(dir: &Path) -> bool {
    dir.join(".git").exists()
}

/// Iterator over the project directories of qualifying checkouts.
///
/// The yielded directory is the parent of the checkout, which is where cleanup
/// commands are anchored. Parents that no longer exist are skipped.
#[derive(Debug)]
pub struct ProjectLocator {
    walker: DirWalker,
    filter: ProjectFilter,
}

/// Locate qualifying checkouts below `root` using a fresh traversal.
pub fn locate_projects(root: impl AsRef<Path>, filter: &ProjectFilter) -> ProjectLocator {
    ProjectLocator {
        walker: walk_dirs(root),
        filter: filter.clone(),
    }
}

impl Iterator for ProjectLocator {
    type Item = Result<PathBuf, WalkError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let dir = match self.walker.next()? {
                Ok(dir) => dir,
                Err(err) => return Some(Err(err)),
            };

            if !is_git_checkout(&dir) {
                continue;
            }

            if !self.filter.admits(&lossy(&dir)) {
                debug!(checkout = %dir.display(), "Checkout filtered out");
                continue;
            }

            let Some(project_dir) = dir.parent() else {
                continue;
            };
            if !project_dir.exists() {
                debug!(
                    checkout = %dir.display(),
                    "Project directory no longer exists, skipping"
                );
                continue;
            }

            return Some(Ok(project_dir.to_path_buf()));
        }
    }
}
