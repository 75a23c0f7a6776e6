//! Disk-space recovery for hosts that keep many git checkouts.
//!
//! When a build fails because the disk is full, [`RecoveryEngine`] resets and
//! cleans other checkouts under a projects root first, then the failing one,
//! and tells the caller whether a retry is worthwhile. The pieces it is built
//! from are usable on their own:
//!
//! - [`paths`]: lexical path normalization and containment
//! - [`walk`]: lazy depth-first directory traversal
//! - [`locate`]: git checkout discovery with include/exclude filters
//! - [`cleanup`]: `git reset --hard` / `git clean -xdf` over located projects
//! - [`recovery`]: the retry decision engine
//! - [`history`]: a JSONL ledger of issued retry directives

pub mod cleanup;
pub mod config;
pub mod exec;
pub mod history;
pub mod locate;
pub mod logging;
pub mod paths;
pub mod recovery;
pub mod testing;
pub mod walk;

pub use cleanup::{
    CLEANUP_SCRIPT, CLEANUP_SHELL, CleanupExecutor, CleanupMode, CleanupOutcome, cleanup_projects,
};
pub use config::{ConfigError, ConfigSource, ReclaimConfig, Sourced};
pub use exec::{CommandExecutor, CommandFailure, CommandOutput, ProcessExecutor};
pub use history::{RecordedRetry, RetryLedger};
pub use locate::{ProjectFilter, ProjectLocator, locate_projects};
pub use logging::{LogConfig, LogFormat, LoggingGuards, init_logging};
pub use paths::{is_directory_or_subdirectory, normalize_path, path_contains};
pub use recovery::{
    CleanupMotive, CleanupScope, RecoveryEngine, RecoveryFatal, RecoveryOutcome, RecoveryRequest,
    RetryContext, RetryDirective,
};
pub use walk::{DirWalker, WalkError, walk_dirs};
