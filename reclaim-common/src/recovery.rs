//! Disk-space recovery decisions.
//!
//! When a build fails for lack of disk space, [`RecoveryEngine::recover`]
//! picks the next cleanup scope that has not been tried yet, runs it, and
//! tells the caller whether retrying the failed command makes sense.
//!
//! Two scopes exist, tried in this order:
//!
//! 1. every project except the one being worked on ([`CleanupScope::AllExceptCwd`])
//! 2. only the project being worked on ([`CleanupScope::OnlyCwd`])
//!
//! The caller keeps the history of returned [`RetryDirective`]s and passes it
//! back on the next failure. A scope whose motive is already in that history
//! is never run again, so a retry loop driven by this engine performs at most
//! two cleanups per failing directory before reporting [`RecoveryOutcome::Exhausted`].

use crate::cleanup::CleanupExecutor;
use crate::exec::CommandExecutor;
use crate::locate::ProjectFilter;
use crate::paths::{is_directory_or_subdirectory, normalize_path};
use crate::walk::WalkError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Failure class a directive applies to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryContext {
    #[default]
    CompilationError,
}

impl fmt::Display for RetryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CompilationError => write!(f, "compilation error"),
        }
    }
}

/// Which checkouts a cleanup attempt targeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupScope {
    /// Every project under the root except the failing directory (or every
    /// project, when the failing directory is unknown).
    AllExceptCwd,
    /// Only the failing directory.
    OnlyCwd,
}

/// Identity of a cleanup attempt, used to avoid repeating it.
///
/// Paths are stored normalized, so `/srv/projects/` and `/srv/projects`
/// produce equal motives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CleanupMotive {
    pub scope: CleanupScope,
    pub projects_root: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
}

impl CleanupMotive {
    /// Cleanup of every project other than `cwd`.
    pub fn other_projects(projects_root: &str, cwd: Option<&str>) -> Self {
        Self {
            scope: CleanupScope::AllExceptCwd,
            projects_root: normalize_path(projects_root),
            cwd: cwd.map(normalize_path),
        }
    }

    /// Cleanup restricted to `cwd`.
    pub fn this_project(projects_root: &str, cwd: &str) -> Self {
        Self {
            scope: CleanupScope::OnlyCwd,
            projects_root: normalize_path(projects_root),
            cwd: Some(normalize_path(cwd)),
        }
    }
}

impl fmt::Display for CleanupMotive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.scope, &self.cwd) {
            (CleanupScope::AllExceptCwd, Some(cwd)) => write!(
                f,
                "Cleanup for disk space for excluding \"{cwd}\" from \"{}\" root",
                self.projects_root
            ),
            (CleanupScope::OnlyCwd, Some(cwd)) => write!(
                f,
                "Cleanup for disk space for including only \"{cwd}\" from \"{}\" root",
                self.projects_root
            ),
            (_, None) => write!(
                f,
                "Cleaning up all directories since no specific directory was filtered"
            ),
        }
    }
}

/// Instruction to retry the failed command after a cleanup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryDirective {
    pub context: RetryContext,
    pub motive: CleanupMotive,
    /// Error text of the original failure.
    pub error: String,
}

impl RetryDirective {
    pub fn compilation_error(motive: CleanupMotive, error: impl Into<String>) -> Self {
        Self {
            context: RetryContext::CompilationError,
            motive,
            error: error.into(),
        }
    }
}

/// Why recovery gave up without retrying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RecoveryFatal {
    /// The failing directory is not under the projects root.
    OutsideProjectsRoot { cwd: String, projects_root: String },
    /// Cleanup scoped to the failing directory found no project there.
    MissingProject { cwd: String },
    /// No failing directory was given and no project exists under the root.
    NothingToClean { projects_root: String },
}

impl fmt::Display for RecoveryFatal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutsideProjectsRoot { cwd, projects_root } => write!(
                f,
                "directory \"{cwd}\" is not included in the projects root \"{projects_root}\""
            ),
            Self::MissingProject { cwd } => {
                write!(f, "expected to find a project for \"{cwd}\" but none was cleaned")
            }
            Self::NothingToClean { projects_root } => {
                write!(f, "no projects to clean under \"{projects_root}\"")
            }
        }
    }
}

/// Result of one recovery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecoveryOutcome {
    /// A cleanup ran; retry the failed command and record the directive.
    Recovered { directive: RetryDirective },
    /// Every applicable scope was already tried.
    Exhausted,
    /// Recovery is impossible for this failure.
    Fatal { reason: RecoveryFatal },
}

impl RecoveryOutcome {
    pub fn directive(&self) -> Option<&RetryDirective> {
        match self {
            Self::Recovered { directive } => Some(directive),
            _ => None,
        }
    }

    pub fn should_retry(&self) -> bool {
        matches!(self, Self::Recovered { .. })
    }
}

/// Inputs for one [`RecoveryEngine::recover`] call.
#[derive(Debug, Clone, Copy)]
pub struct RecoveryRequest<'a> {
    /// Directory the failed command ran in, if known.
    pub cwd: Option<&'a str>,
    pub projects_root: &'a str,
    /// Directives returned by earlier calls for this failure, oldest first.
    pub retries: &'a [RetryDirective],
    /// Error text of the failed command.
    pub error: &'a str,
    /// Command line shown to operators, for the log.
    pub command_display: Option<&'a str>,
}

impl<'a> RecoveryRequest<'a> {
    pub fn new(projects_root: &'a str, error: &'a str) -> Self {
        Self {
            cwd: None,
            projects_root,
            retries: &[],
            error,
            command_display: None,
        }
    }

    pub fn with_cwd(mut self, cwd: Option<&'a str>) -> Self {
        self.cwd = cwd;
        self
    }

    pub fn with_retries(mut self, retries: &'a [RetryDirective]) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_command_display(mut self, command_display: Option<&'a str>) -> Self {
        self.command_display = command_display;
        self
    }
}

/// Chooses and runs cleanup scopes for disk-space failures.
#[derive(Debug, Clone)]
pub struct RecoveryEngine<E> {
    cleaner: CleanupExecutor<E>,
}

impl<E: CommandExecutor> RecoveryEngine<E> {
    pub fn new(cleaner: CleanupExecutor<E>) -> Self {
        Self { cleaner }
    }

    pub fn cleaner(&self) -> &CleanupExecutor<E> {
        &self.cleaner
    }

    /// Run the next untried cleanup scope for a disk-space failure.
    ///
    /// Never modifies `request.retries`; the caller appends the returned
    /// directive before the next call. Only a traversal failure is an `Err`.
    pub async fn recover(&self, request: &RecoveryRequest<'_>) -> Result<RecoveryOutcome, WalkError> {
        let projects_root = request.projects_root;

        if let Some(cwd) = request.cwd
            && !is_directory_or_subdirectory(projects_root, cwd)
        {
            error!(
                cwd,
                projects_root,
                "Unable to recover from lack of disk space because the directory is not included in the projects root"
            );
            return Ok(RecoveryOutcome::Fatal {
                reason: RecoveryFatal::OutsideProjectsRoot {
                    cwd: cwd.to_string(),
                    projects_root: projects_root.to_string(),
                },
            });
        }

        let other_projects = CleanupMotive::other_projects(projects_root, request.cwd);
        let this_project = request
            .cwd
            .map(|cwd| CleanupMotive::this_project(projects_root, cwd));

        let attempted =
            |motive: &CleanupMotive| request.retries.iter().any(|retry| &retry.motive == motive);
        let other_projects_tried = attempted(&other_projects);
        let this_project_tried = this_project.as_ref().is_none_or(attempted);

        if other_projects_tried && this_project_tried {
            error!(
                retries = ?request.retries,
                "No approaches left to try out for recovering from disk space failure"
            );
            return Ok(RecoveryOutcome::Exhausted);
        }

        if let Some(command) = request.command_display {
            info!(
                command,
                cwd = request.cwd.unwrap_or("<unknown>"),
                "Running disk cleanup before retrying the command due to lack of disk space in the host"
            );
        }

        let root = Path::new(projects_root);

        if !other_projects_tried {
            let filter = match request.cwd {
                Some(cwd) => ProjectFilter::excluding(cwd),
                None => ProjectFilter::all(),
            };
            let outcomes = self.cleaner.cleanup(root, &filter).await?;
            // The failing project may be the only one under the root.
            if !outcomes.is_empty() {
                info!(motive = %other_projects, cleaned = outcomes.len(), "Disk cleanup finished");
                return Ok(RecoveryOutcome::Recovered {
                    directive: RetryDirective::compilation_error(other_projects, request.error),
                });
            }
            debug!(motive = %other_projects, "No other projects to clean");
        }

        let (Some(cwd), Some(this_project)) = (request.cwd, this_project) else {
            warn!(projects_root, "No projects found to clean for disk space recovery");
            return Ok(RecoveryOutcome::Fatal {
                reason: RecoveryFatal::NothingToClean {
                    projects_root: projects_root.to_string(),
                },
            });
        };

        if this_project_tried {
            error!(
                retries = ?request.retries,
                "No approaches left to try out for recovering from disk space failure"
            );
            return Ok(RecoveryOutcome::Exhausted);
        }

        let outcomes = self
            .cleaner
            .cleanup(root, &ProjectFilter::including_only(cwd))
            .await?;
        if outcomes.is_empty() {
            error!(cwd, "Expected to have found a project during cleanup for disk space");
            return Ok(RecoveryOutcome::Fatal {
                reason: RecoveryFatal::MissingProject {
                    cwd: cwd.to_string(),
                },
            });
        }

        info!(motive = %this_project, cleaned = outcomes.len(), "Disk cleanup finished");
        Ok(RecoveryOutcome::Recovered {
            directive: RetryDirective::compilation_error(this_project, request.error),
        })
    }
}
