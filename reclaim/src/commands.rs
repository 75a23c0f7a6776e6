//! Subcommand implementations.
//!
//! Each command writes its report to the given writer and returns the process
//! exit code, so tests can drive them with a scripted executor.

use anyhow::{Context, Result};
use reclaim_common::{
    CleanupExecutor, CleanupMode, CleanupOutcome, CommandExecutor, ProjectFilter, ReclaimConfig,
    RecoveryEngine, RecoveryOutcome, RecoveryRequest, RetryLedger, Sourced, locate_projects,
};
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

pub const EXIT_OK: u8 = 0;
/// `cleanup` ran but at least one project failed.
pub const EXIT_CLEANUP_FAILURES: u8 = 1;
pub const EXIT_EXHAUSTED: u8 = 2;
pub const EXIT_FATAL: u8 = 3;

/// Values given on the command line, applied over the loaded config.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub projects_root: Option<PathBuf>,
    pub dry_run: bool,
    pub history_file: Option<PathBuf>,
}

pub fn apply_overrides(mut config: ReclaimConfig, overrides: Overrides) -> ReclaimConfig {
    if let Some(root) = overrides.projects_root {
        config.projects_root = config
            .projects_root
            .overlay(Sourced::from_cli(Some(root), "--projects-root"));
    }
    if overrides.dry_run {
        config.mode = config
            .mode
            .overlay(Sourced::from_cli(CleanupMode::DryRun, "--dry-run"));
    }
    if let Some(history) = overrides.history_file {
        config.history_file = config
            .history_file
            .overlay(Sourced::from_cli(Some(history), "--history"));
    }
    config
}

/// Build a filter from repeated `--include` / `--exclude` flags.
pub fn project_filter(include: Vec<String>, exclude: Vec<String>) -> ProjectFilter {
    ProjectFilter {
        include_dirs: (!include.is_empty()).then_some(include),
        exclude_dirs: exclude,
    }
}

fn projects_root(config: &ReclaimConfig) -> Result<PathBuf> {
    config
        .projects_root
        .value
        .clone()
        .context("no projects root configured (use --projects-root or RECLAIM_PROJECTS_ROOT)")
}

pub fn exit_code(outcome: &RecoveryOutcome) -> u8 {
    match outcome {
        RecoveryOutcome::Recovered { .. } => EXIT_OK,
        RecoveryOutcome::Exhausted => EXIT_EXHAUSTED,
        RecoveryOutcome::Fatal { .. } => EXIT_FATAL,
    }
}

#[derive(Debug, Clone)]
pub struct RecoverArgs {
    pub cwd: Option<String>,
    pub error: String,
    pub command: Option<String>,
}

pub async fn recover<E: CommandExecutor>(
    executor: E,
    config: &ReclaimConfig,
    args: &RecoverArgs,
    json: bool,
    out: &mut impl Write,
) -> Result<u8> {
    let root = projects_root(config)?.to_string_lossy().into_owned();

    let mut ledger = config
        .history_file
        .value
        .as_ref()
        .map(RetryLedger::open)
        .transpose()
        .context("failed to read retry ledger")?;
    let retries = ledger
        .as_ref()
        .map(RetryLedger::directives)
        .unwrap_or_default();

    let engine = RecoveryEngine::new(CleanupExecutor::new(executor).with_mode(config.mode.value));
    let mode = engine.cleaner().mode();
    info!(%mode, root = %root, cwd = ?args.cwd, recorded = retries.len(), "Recovering disk space");
    let request = RecoveryRequest::new(&root, &args.error)
        .with_cwd(args.cwd.as_deref())
        .with_retries(&retries)
        .with_command_display(args.command.as_deref());
    let outcome = engine
        .recover(&request)
        .await
        .context("disk cleanup traversal failed")?;

    if let (Some(ledger), Some(directive)) = (ledger.as_mut(), outcome.directive()) {
        let path = ledger.path().to_path_buf();
        ledger
            .append(directive.clone())
            .await
            .with_context(|| format!("failed to record retry in {}", path.display()))?;
    }

    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&outcome)?)?;
    } else {
        match &outcome {
            RecoveryOutcome::Recovered { directive } if mode == CleanupMode::DryRun => {
                writeln!(out, "recovered (dry-run): {}", directive.motive)?;
            }
            RecoveryOutcome::Recovered { directive } => {
                writeln!(out, "recovered: {}", directive.motive)?;
            }
            RecoveryOutcome::Exhausted => {
                writeln!(out, "exhausted: every cleanup approach was already tried")?;
                if let Some(ledger) = &ledger {
                    writeln!(
                        out,
                        "hint: run `reclaim history --history {} --clear` once space is freed",
                        ledger.path().display()
                    )?;
                }
            }
            RecoveryOutcome::Fatal { reason } => writeln!(out, "fatal: {reason}")?,
        }
    }

    Ok(exit_code(&outcome))
}

pub async fn cleanup<E: CommandExecutor>(
    executor: E,
    config: &ReclaimConfig,
    filter: &ProjectFilter,
    json: bool,
    out: &mut impl Write,
) -> Result<u8> {
    let root = projects_root(config)?;
    let cleaner = CleanupExecutor::new(executor).with_mode(config.mode.value);
    let outcomes = cleaner
        .cleanup(&root, filter)
        .await
        .context("failed to traverse projects root")?;

    let failed = outcomes.iter().filter(|o| o.is_failure()).count();
    info!(
        mode = %cleaner.mode(),
        cleaned = outcomes.len() - failed,
        failed,
        "Cleanup finished"
    );

    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&outcomes)?)?;
    } else if outcomes.is_empty() {
        writeln!(out, "no projects found under {}", root.display())?;
    } else {
        for outcome in &outcomes {
            match outcome {
                CleanupOutcome::Cleaned { project, .. } => {
                    writeln!(out, "cleaned {}", project.display())?;
                }
                CleanupOutcome::Failed { project, error } => {
                    writeln!(out, "failed  {}: {error}", project.display())?;
                }
            }
        }
    }

    Ok(if failed > 0 { EXIT_CLEANUP_FAILURES } else { EXIT_OK })
}

pub fn locate(
    config: &ReclaimConfig,
    filter: &ProjectFilter,
    json: bool,
    out: &mut impl Write,
) -> Result<u8> {
    let root = projects_root(config)?;
    let projects = locate_projects(&root, filter)
        .collect::<Result<Vec<PathBuf>, _>>()
        .context("failed to traverse projects root")?;

    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&projects)?)?;
    } else {
        for project in &projects {
            writeln!(out, "{}", project.display())?;
        }
    }
    Ok(EXIT_OK)
}

pub fn show_config(config: &ReclaimConfig, json: bool, out: &mut impl Write) -> Result<u8> {
    let entries = config.entries();
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&entries)?)?;
        return Ok(EXIT_OK);
    }

    for entry in entries {
        match entry.origin {
            Some(origin) => writeln!(
                out,
                "{:<16} {} ({}: {origin})",
                entry.key, entry.value, entry.source
            )?,
            None => writeln!(out, "{:<16} {} ({})", entry.key, entry.value, entry.source)?,
        }
    }
    Ok(EXIT_OK)
}

pub async fn history(
    config: &ReclaimConfig,
    clear: bool,
    json: bool,
    out: &mut impl Write,
) -> Result<u8> {
    let path = config
        .history_file
        .value
        .clone()
        .context("no retry ledger configured (use --history or RECLAIM_HISTORY_FILE)")?;
    let mut ledger = RetryLedger::open(&path)
        .with_context(|| format!("failed to read retry ledger {}", path.display()))?;

    if clear {
        let count = ledger.len();
        ledger
            .clear()
            .await
            .with_context(|| format!("failed to clear retry ledger {}", path.display()))?;
        writeln!(out, "cleared {count} recorded retries from {}", path.display())?;
        return Ok(EXIT_OK);
    }

    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(ledger.records())?)?;
    } else if ledger.is_empty() {
        writeln!(out, "no recorded retries in {}", path.display())?;
    } else {
        for record in ledger.records() {
            writeln!(
                out,
                "{}  {}: {}",
                record.recorded_at.to_rfc3339(),
                record.directive.context,
                record.directive.motive
            )?;
        }
    }
    Ok(EXIT_OK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reclaim_common::testing::MockExecutor;
    use reclaim_common::{CommandFailure, ConfigSource};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn checkout(root: &Path, rel: &str) -> String {
        let dir = root.join(rel);
        fs::create_dir_all(dir.join(".git")).unwrap();
        dir.to_string_lossy().into_owned()
    }

    fn config_for(root: &Path, history: Option<PathBuf>) -> ReclaimConfig {
        apply_overrides(
            ReclaimConfig::default(),
            Overrides {
                projects_root: Some(root.to_path_buf()),
                dry_run: false,
                history_file: history,
            },
        )
    }

    fn output(buf: Vec<u8>) -> String {
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn overrides_are_tagged_as_cli() {
        let config = apply_overrides(
            ReclaimConfig::default(),
            Overrides {
                projects_root: Some(PathBuf::from("/srv/projects")),
                dry_run: true,
                history_file: None,
            },
        );
        assert_eq!(config.projects_root.source, ConfigSource::Cli);
        assert_eq!(config.mode.value, CleanupMode::DryRun);
        assert_eq!(config.history_file.source, ConfigSource::Default);
    }

    #[test]
    fn filter_without_includes_admits_all() {
        let filter = project_filter(Vec::new(), vec!["/srv/projects/app".to_string()]);
        assert_eq!(filter.include_dirs, None);
        assert!(!filter.admits("/srv/projects/app"));
        assert!(filter.admits("/srv/projects/lib"));
    }

    #[tokio::test]
    async fn recover_without_root_is_an_error() {
        let args = RecoverArgs {
            cwd: None,
            error: "No space left on device".to_string(),
            command: None,
        };
        let mut out = Vec::new();
        let err = recover(MockExecutor::new(), &ReclaimConfig::default(), &args, false, &mut out)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("projects root"));
    }

    #[tokio::test]
    async fn recover_records_directives_until_exhausted() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("projects");
        let app = checkout(&root, "team/app");
        checkout(&root, "ops/infra");
        let ledger_path = tmp.path().join("retries.jsonl");
        let config = config_for(&root, Some(ledger_path.clone()));
        let args = RecoverArgs {
            cwd: Some(app),
            error: "No space left on device".to_string(),
            command: Some("cargo build".to_string()),
        };

        let mut codes = Vec::new();
        let mut lines = Vec::new();
        for _ in 0..3 {
            let mut out = Vec::new();
            codes.push(recover(MockExecutor::new(), &config, &args, false, &mut out).await.unwrap());
            lines.push(output(out));
        }

        assert_eq!(codes, vec![EXIT_OK, EXIT_OK, EXIT_EXHAUSTED]);
        assert!(lines[0].starts_with("recovered: Cleanup for disk space for excluding"));
        assert!(lines[1].starts_with("recovered: Cleanup for disk space for including only"));
        assert!(lines[2].starts_with("exhausted"));
        assert!(lines[2].contains(&format!(
            "reclaim history --history {} --clear",
            ledger_path.display()
        )));
        assert_eq!(RetryLedger::open(&ledger_path).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn recover_in_dry_run_says_so() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("projects");
        checkout(&root, "team/app");
        let config = apply_overrides(
            config_for(&root, None),
            Overrides {
                dry_run: true,
                ..Overrides::default()
            },
        );
        let args = RecoverArgs {
            cwd: None,
            error: "No space left on device".to_string(),
            command: None,
        };

        let mock = MockExecutor::new();
        let mut out = Vec::new();
        let code = recover(&mock, &config, &args, false, &mut out).await.unwrap();

        assert_eq!(code, EXIT_OK);
        assert!(output(out).starts_with("recovered (dry-run): Cleanup for disk space"));
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn recover_outside_root_is_fatal_json() {
        let tmp = TempDir::new().unwrap();
        let config = config_for(tmp.path(), None);
        let args = RecoverArgs {
            cwd: Some("/definitely/elsewhere".to_string()),
            error: "No space left on device".to_string(),
            command: None,
        };

        let mut out = Vec::new();
        let code = recover(MockExecutor::new(), &config, &args, true, &mut out)
            .await
            .unwrap();

        assert_eq!(code, EXIT_FATAL);
        let json: serde_json::Value = serde_json::from_str(&output(out)).unwrap();
        assert_eq!(json["outcome"], "fatal");
        assert_eq!(json["reason"]["reason"], "outside_projects_root");
    }

    #[tokio::test]
    async fn cleanup_reports_failures_in_exit_code() {
        let tmp = TempDir::new().unwrap();
        checkout(tmp.path(), "a/one");
        checkout(tmp.path(), "b/two");
        let mock = MockExecutor::new();
        mock.push_result(Err(CommandFailure::Spawn {
            program: "sh".to_string(),
            message: "No such file or directory".to_string(),
        }));
        let config = config_for(tmp.path(), None);

        let mut out = Vec::new();
        let code = cleanup(mock, &config, &ProjectFilter::all(), false, &mut out)
            .await
            .unwrap();

        assert_eq!(code, EXIT_CLEANUP_FAILURES);
        let text = output(out);
        assert_eq!(text.lines().count(), 2);
        assert_eq!(text.lines().filter(|l| l.starts_with("failed")).count(), 1);
    }

    #[tokio::test]
    async fn cleanup_of_empty_root_says_so() {
        let tmp = TempDir::new().unwrap();
        let config = config_for(tmp.path(), None);

        let mut out = Vec::new();
        let code = cleanup(MockExecutor::new(), &config, &ProjectFilter::all(), false, &mut out)
            .await
            .unwrap();

        assert_eq!(code, EXIT_OK);
        assert!(output(out).starts_with("no projects found"));
    }

    #[test]
    fn locate_lists_project_directories() {
        let tmp = TempDir::new().unwrap();
        checkout(tmp.path(), "team/app");
        let config = config_for(tmp.path(), None);

        let mut out = Vec::new();
        locate(&config, &ProjectFilter::all(), true, &mut out).unwrap();

        let projects: Vec<PathBuf> = serde_json::from_str(&output(out)).unwrap();
        assert_eq!(projects, vec![tmp.path().join("team")]);
    }

    #[test]
    fn config_lists_sources() {
        let config = config_for(Path::new("/srv/projects"), None);
        let mut out = Vec::new();
        show_config(&config, false, &mut out).unwrap();

        let text = output(out);
        assert!(text.contains("/srv/projects (command line: --projects-root)"));
        assert!(text.contains("enforce (default)"));
    }

    #[tokio::test]
    async fn history_shows_and_clears_ledger() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("projects");
        let app = checkout(&root, "team/app");
        let ledger_path = tmp.path().join("retries.jsonl");
        let config = config_for(&root, Some(ledger_path));
        let args = RecoverArgs {
            cwd: Some(app),
            error: "No space left on device".to_string(),
            command: None,
        };
        recover(MockExecutor::new(), &config, &args, false, &mut Vec::new())
            .await
            .unwrap();

        let mut out = Vec::new();
        history(&config, false, false, &mut out).await.unwrap();
        assert!(output(out).contains("compilation error: Cleanup for disk space"));

        let mut out = Vec::new();
        history(&config, true, false, &mut out).await.unwrap();
        assert!(output(out).starts_with("cleared 1 recorded retries"));

        let mut out = Vec::new();
        history(&config, false, false, &mut out).await.unwrap();
        assert!(output(out).starts_with("no recorded retries"));
    }

    #[tokio::test]
    async fn history_requires_a_ledger() {
        let err = history(&ReclaimConfig::default(), false, false, &mut Vec::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no retry ledger"));
    }
}
