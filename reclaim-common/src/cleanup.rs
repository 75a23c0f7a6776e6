//! Hard reset and clean of located git checkouts.
//!
//! Every project surfaced by [`locate_projects`] gets
//! `git add . && git reset --hard && git clean -xdf` run in its directory. A
//! failing project is recorded and the pass moves on; only a traversal failure
//! stops it. Projects are processed one at a time so two destructive resets
//! never overlap.

use crate::exec::{CommandExecutor, CommandFailure, CommandOutput};
use crate::locate::{ProjectFilter, locate_projects};
use crate::walk::WalkError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Shell used to run [`CLEANUP_SCRIPT`].
pub const CLEANUP_SHELL: &str = "sh";

/// Stage everything, reset to HEAD, then drop untracked and ignored files.
pub const CLEANUP_SCRIPT: &str = "git add . && git reset --hard && git clean -xdf";

/// Whether cleanup actually runs the reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CleanupMode {
    /// Run the reset and clean.
    #[default]
    Enforce,
    /// Log what would run and record it as cleaned without executing.
    DryRun,
}

impl fmt::Display for CleanupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enforce => write!(f, "enforce"),
            Self::DryRun => write!(f, "dry-run"),
        }
    }
}

impl FromStr for CleanupMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "enforce" => Ok(Self::Enforce),
            "dry-run" | "dry_run" | "dryrun" => Ok(Self::DryRun),
            other => Err(format!("unknown cleanup mode '{other}'")),
        }
    }
}

/// Result of cleaning one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CleanupOutcome {
    Cleaned {
        project: PathBuf,
        output: CommandOutput,
    },
    Failed {
        project: PathBuf,
        error: CommandFailure,
    },
}

impl CleanupOutcome {
    pub fn project(&self) -> &Path {
        match self {
            Self::Cleaned { project, .. } | Self::Failed { project, .. } => project,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Runs the reset/clean script over every located project.
#[derive(Debug, Clone)]
pub struct CleanupExecutor<E> {
    executor: E,
    mode: CleanupMode,
}

impl<E: CommandExecutor> CleanupExecutor<E> {
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            mode: CleanupMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: CleanupMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> CleanupMode {
        self.mode
    }

    /// Clean every project below `projects_root` admitted by `filter`.
    ///
    /// Returns one outcome per project attempted, failures included. Callers
    /// only rely on the count to decide whether anything was cleaned.
    pub async fn cleanup(
        &self,
        projects_root: &Path,
        filter: &ProjectFilter,
    ) -> Result<Vec<CleanupOutcome>, WalkError> {
        let mut outcomes = Vec::new();

        for project in locate_projects(projects_root, filter) {
            let project = project?;
            let outcome = self.cleanup_project(project).await;
            outcomes.push(outcome);
        }

        let failures = outcomes.iter().filter(|o| o.is_failure()).count();
        debug!(
            root = %projects_root.display(),
            attempted = outcomes.len(),
            failures,
            mode = %self.mode,
            "Cleanup pass finished"
        );

        Ok(outcomes)
    }

    async fn cleanup_project(&self, project: PathBuf) -> CleanupOutcome {
        if self.mode == CleanupMode::DryRun {
            info!(project = %project.display(), script = CLEANUP_SCRIPT, "Dry run: would clean project");
            return CleanupOutcome::Cleaned {
                output: CommandOutput {
                    stdout: format!("dry-run: {CLEANUP_SCRIPT}"),
                    ..CommandOutput::default()
                },
                project,
            };
        }

        info!(project = %project.display(), "Cleaning project");
        match self
            .executor
            .execute(CLEANUP_SHELL, &["-c", CLEANUP_SCRIPT], &project)
            .await
        {
            Ok(output) => CleanupOutcome::Cleaned { project, output },
            Err(error) => {
                warn!(project = %project.display(), error = %error, "Project cleanup failed");
                CleanupOutcome::Failed { project, error }
            }
        }
    }
}

/// One enforcing cleanup pass with a borrowed executor.
pub async fn cleanup_projects<E: CommandExecutor>(
    executor: &E,
    projects_root: &Path,
    filter: &ProjectFilter,
) -> Result<Vec<CleanupOutcome>, WalkError> {
    CleanupExecutor::new(executor)
        .cleanup(projects_root, filter)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockExecutor;
    use std::fs;
    use tempfile::TempDir;

    fn checkout(root: &Path, rel: &str) -> PathBuf {
        let dir = root.join(rel);
        fs::create_dir_all(dir.join(".git")).unwrap();
        dir
    }

    fn permission_denied() -> CommandFailure {
        CommandFailure::NonZeroExit {
            program: CLEANUP_SHELL.to_string(),
            code: Some(1),
            stdout: String::new(),
            stderr: "error: unable to unlink: Permission denied".to_string(),
        }
    }

    #[tokio::test]
    async fn empty_root_yields_no_outcomes() {
        let tmp = TempDir::new().unwrap();
        let mock = MockExecutor::new();
        let cleaner = CleanupExecutor::new(mock.clone());

        let outcomes = cleaner.cleanup(tmp.path(), &ProjectFilter::all()).await.unwrap();

        assert!(outcomes.is_empty());
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn runs_reset_script_in_project_directory() {
        let tmp = TempDir::new().unwrap();
        checkout(tmp.path(), "group/app");
        let mock = MockExecutor::new();
        let cleaner = CleanupExecutor::new(mock.clone());

        let outcomes = cleaner.cleanup(tmp.path(), &ProjectFilter::all()).await.unwrap();

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].project(), tmp.path().join("group"));
        let calls = mock.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "sh");
        assert_eq!(calls[0].args, vec!["-c".to_string(), CLEANUP_SCRIPT.to_string()]);
        assert_eq!(calls[0].cwd, tmp.path().join("group"));
    }

    #[tokio::test]
    async fn failures_are_recorded_and_pass_continues() {
        let tmp = TempDir::new().unwrap();
        checkout(tmp.path(), "a/one");
        checkout(tmp.path(), "b/two");
        checkout(tmp.path(), "c/three");
        let mock = MockExecutor::new();
        mock.push_result(Err(permission_denied()));
        let cleaner = CleanupExecutor::new(mock.clone());

        let outcomes = cleaner.cleanup(tmp.path(), &ProjectFilter::all()).await.unwrap();

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes.iter().filter(|o| o.is_failure()).count(), 1);
        assert!(outcomes[0].is_failure());
        assert_eq!(mock.calls().len(), 3);
    }

    #[tokio::test]
    async fn exclude_filter_skips_cwd() {
        let tmp = TempDir::new().unwrap();
        let app = checkout(tmp.path(), "group/app");
        checkout(tmp.path(), "other/lib");
        let mock = MockExecutor::new();
        let cleaner = CleanupExecutor::new(mock.clone());

        let filter = ProjectFilter::excluding(app.to_string_lossy());
        let outcomes = cleaner.cleanup(tmp.path(), &filter).await.unwrap();

        assert_eq!(outcomes.len(), 1);
        assert_eq!(mock.calls()[0].cwd, tmp.path().join("other"));
    }

    #[tokio::test]
    async fn project_removed_by_earlier_cleanup_is_skipped() {
        let tmp = TempDir::new().unwrap();
        checkout(tmp.path(), "zone/app");
        let nested = checkout(tmp.path(), "zone/app/build/dep");
        let mock = MockExecutor::new();
        // Cleaning `zone` wipes the untracked build tree that held `dep`.
        let doomed = tmp.path().join("zone/app/build");
        mock.on_call(move |_| {
            let _ = fs::remove_dir_all(&doomed);
        });
        let cleaner = CleanupExecutor::new(mock.clone());

        let outcomes = cleaner.cleanup(tmp.path(), &ProjectFilter::all()).await.unwrap();

        assert!(!nested.exists());
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].project(), tmp.path().join("zone"));
    }

    #[tokio::test]
    async fn dry_run_records_without_executing() {
        let tmp = TempDir::new().unwrap();
        checkout(tmp.path(), "group/app");
        let mock = MockExecutor::new();
        let cleaner = CleanupExecutor::new(mock.clone()).with_mode(CleanupMode::DryRun);

        let outcomes = cleaner.cleanup(tmp.path(), &ProjectFilter::all()).await.unwrap();

        assert_eq!(outcomes.len(), 1);
        assert!(mock.calls().is_empty());
        match &outcomes[0] {
            CleanupOutcome::Cleaned { output, .. } => assert!(output.stdout.starts_with("dry-run:")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn borrowed_executor_shorthand_enforces() {
        let tmp = TempDir::new().unwrap();
        checkout(tmp.path(), "group/app");
        let mock = MockExecutor::new();

        let outcomes = cleanup_projects(&mock, tmp.path(), &ProjectFilter::all())
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 1);
        assert_eq!(mock.calls().len(), 1);
    }

    #[tokio::test]
    async fn missing_root_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let cleaner = CleanupExecutor::new(MockExecutor::new());

        let err = cleaner
            .cleanup(&tmp.path().join("absent"), &ProjectFilter::all())
            .await
            .unwrap_err();
        assert_eq!(err.path, tmp.path().join("absent"));
    }

    #[test]
    fn cleanup_mode_parses_aliases() {
        assert_eq!("enforce".parse::<CleanupMode>().unwrap(), CleanupMode::Enforce);
        assert_eq!("DRY-RUN".parse::<CleanupMode>().unwrap(), CleanupMode::DryRun);
        assert_eq!("dry_run".parse::<CleanupMode>().unwrap(), CleanupMode::DryRun);
        assert!("yolo".parse::<CleanupMode>().is_err());
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let outcome = CleanupOutcome::Failed {
            project: PathBuf::from("/srv/projects"),
            error: permission_denied(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"]["kind"], "non_zero_exit");
    }
}
