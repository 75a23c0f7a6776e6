//! JSONL logging for test runs.
//!
//! Integration tests install the global subscriber once:
//!
//! ```ignore
//! #[ctor::ctor]
//! fn setup() {
//!     reclaim_common::testing::init_global_test_logging();
//! }
//! ```
//!
//! and individual tests hold a [`TestGuard`] (via [`crate::test_guard!`]) so a
//! failing recovery scenario leaves a per-test trace under
//! `target/test-logs/`.

use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, Once};
use std::time::Instant;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestPhase {
    Setup,
    Execute,
    Verify,
}

static GLOBAL_LOGGING_INIT: Once = Once::new();

/// Route library events to `target/test-logs/all_tests.jsonl` and the test
/// writer. Idempotent.
///
/// `RECLAIM_TEST_LOG_LEVEL` sets the level (default `info`).
pub fn init_global_test_logging() {
    GLOBAL_LOGGING_INIT.call_once(|| {
        let json_layer = open_log("all_tests").map(|file| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(Mutex::new(file))
                .with_span_events(FmtSpan::CLOSE)
                .with_line_number(true)
        });
        let level =
            std::env::var("RECLAIM_TEST_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let filter =
            tracing_subscriber::EnvFilter::try_new(format!("reclaim={level},reclaim_common={level}"))
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(json_layer)
            .with(tracing_subscriber::fmt::layer().with_test_writer().compact())
            .try_init();
    });
}

fn log_dir() -> PathBuf {
    std::env::var_os("CARGO_TARGET_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/../target")))
        .join("test-logs")
}

fn open_log(name: &str) -> Option<File> {
    let dir = log_dir();
    std::fs::create_dir_all(&dir).ok()?;
    File::create(dir.join(format!("{}.jsonl", name.replace("::", "_")))).ok()
}

/// One line of a per-test log.
#[derive(Debug, Serialize)]
pub struct TestLogEntry<'a> {
    pub test: &'a str,
    pub phase: TestPhase,
    pub message: &'a str,
    pub elapsed_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<&'a serde_json::Value>,
}

struct ScenarioLog {
    test: String,
    started: Instant,
    file: Option<File>,
}

impl ScenarioLog {
    fn write(&mut self, phase: TestPhase, message: &str, data: Option<&serde_json::Value>) {
        let entry = TestLogEntry {
            test: &self.test,
            phase,
            message,
            elapsed_ms: self.started.elapsed().as_millis(),
            data,
        };
        if let Some(file) = self.file.as_mut()
            && let Ok(line) = serde_json::to_string(&entry)
        {
            let _ = writeln!(file, "{line}");
        }
        tracing::info!(test = %self.test, ?phase, "{message}");
    }
}

/// Per-test log that records pass or panic when dropped.
///
/// Inert unless `RECLAIM_TEST_LOGGING=1` or `CI` is set.
pub struct TestGuard {
    log: Option<Mutex<ScenarioLog>>,
}

impl TestGuard {
    pub fn new(test: &str) -> Self {
        Self::with_enabled(test, Self::enabled_by_env())
    }

    fn with_enabled(test: &str, enabled: bool) -> Self {
        let log = enabled.then(|| {
            init_global_test_logging();
            let mut log = ScenarioLog {
                test: test.to_string(),
                started: Instant::now(),
                file: open_log(test),
            };
            log.write(TestPhase::Setup, "start", None);
            Mutex::new(log)
        });
        Self { log }
    }

    fn enabled_by_env() -> bool {
        match std::env::var("RECLAIM_TEST_LOGGING").as_deref() {
            Ok("1" | "true") => true,
            Ok("0" | "false") => false,
            _ => std::env::var_os("CI").is_some(),
        }
    }

    pub fn log(&self, phase: TestPhase, message: &str) {
        self.write(phase, message, None);
    }

    pub fn log_with_data(&self, phase: TestPhase, message: &str, data: serde_json::Value) {
        self.write(phase, message, Some(&data));
    }

    fn write(&self, phase: TestPhase, message: &str, data: Option<&serde_json::Value>) {
        if let Some(log) = &self.log
            && let Ok(mut log) = log.lock()
        {
            log.write(phase, message, data);
        }
    }
}

impl Drop for TestGuard {
    fn drop(&mut self) {
        let verdict = if std::thread::panicking() { "panicked" } else { "passed" };
        self.write(TestPhase::Verify, verdict, None);
    }
}

/// Create a [`TestGuard`] named after the enclosing test function.
#[macro_export]
macro_rules! test_guard {
    () => {{
        fn marker() {}
        let path = ::std::any::type_name_of_val(&marker);
        let path = path.strip_suffix("::marker").unwrap_or(path);
        $crate::testing::TestGuard::new(path.rsplit("::").next().unwrap_or(path))
    }};
}
