//! Test support shared by unit and integration tests.

mod log;
mod mock;

pub use log::{TestGuard, TestLogEntry, TestPhase, init_global_test_logging};
pub use mock::{MockExecutor, RecordedCommand};
