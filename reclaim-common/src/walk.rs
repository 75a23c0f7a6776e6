//! Depth-first directory traversal.

use std::fs;
use std::io;
use std::iter::FusedIterator;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// A directory could not be listed during traversal.
#[derive(Debug, Error)]
#[error("failed to read directory {}: {source}", path.display())]
pub struct WalkError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Lazy pre-order walk over every subdirectory below a root.
///
/// Each directory is yielded before any of its children, and its children are
/// only listed once the walker is advanced past it. The root itself is not
/// yielded. Symlinks and other non-directory entries are skipped.
///
/// The first listing error ends the walk: it is yielded once and the iterator
/// returns `None` afterwards. A child directory that vanished between being
/// listed and being opened (for example removed by a cleanup that ran while the
/// walk was suspended) is skipped instead.
#[derive(Debug)]
pub struct DirWalker {
    stack: Vec<(PathBuf, fs::ReadDir)>,
    pending: Option<PendingDir>,
    finished: bool,
}

#[derive(Debug)]
struct PendingDir {
    path: PathBuf,
    is_root: bool,
}

/// Start a fresh traversal of `root`. Walkers share no state.
pub fn walk_dirs(root: impl AsRef<Path>) -> DirWalker {
    DirWalker {
        stack: Vec::new(),
        pending: Some(PendingDir {
            path: root.as_ref().to_path_buf(),
            is_root: true,
        }),
        finished: false,
    }
}

impl DirWalker {
    fn fail(&mut self, path: PathBuf, source: io::Error) -> Option<Result<PathBuf, WalkError>> {
        self.finished = true;
        self.stack.clear();
        Some(Err(WalkError { path, source }))
    }
}

impl Iterator for DirWalker {
    type Item = Result<PathBuf, WalkError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        if let Some(pending) = self.pending.take() {
            match fs::read_dir(&pending.path) {
                Ok(entries) => self.stack.push((pending.path, entries)),
                Err(err) if err.kind() == io::ErrorKind::NotFound && !pending.is_root => {
                    debug!(path = %pending.path.display(), "Directory vanished before traversal");
                }
                Err(err) => return self.fail(pending.path, err),
            }
        }

        loop {
            let Some((dir, entries)) = self.stack.last_mut() else {
                self.finished = true;
                return None;
            };

            let entry = match entries.next() {
                Some(Ok(entry)) => entry,
                Some(Err(err)) => {
                    let path = dir.clone();
                    return self.fail(path, err);
                }
                None => {
                    self.stack.pop();
                    continue;
                }
            };

            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(err) => return self.fail(entry.path(), err),
            };
            if !file_type.is_dir() {
                continue;
            }

            let path = entry.path();
            self.pending = Some(PendingDir {
                path: path.clone(),
                is_root: false,
            });
            return Some(Ok(path));
        }
    }
}

impl FusedIterator for DirWalker {}
