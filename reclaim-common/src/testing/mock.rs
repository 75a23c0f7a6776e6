use crate::exec::{CommandExecutor, CommandFailure, CommandOutput};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// One invocation seen by [`MockExecutor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

type CallHook = Box<dyn Fn(&RecordedCommand) + Send + Sync>;

/// Deterministic in-memory executor for cleanup and recovery tests.
///
/// Scripted results are consumed FIFO; once the script runs out every call
/// succeeds with empty output. Clones share the script and the call log, so a
/// test can keep a handle while the engine owns another.
#[derive(Clone, Default)]
pub struct MockExecutor {
    scripted_results: Arc<Mutex<VecDeque<Result<CommandOutput, CommandFailure>>>>,
    recorded_calls: Arc<Mutex<Vec<RecordedCommand>>>,
    hook: Arc<Mutex<Option<CallHook>>>,
}

impl std::fmt::Debug for MockExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockExecutor")
            .field("calls", &self.calls().len())
            .finish_non_exhaustive()
    }
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a scripted result.
    pub fn push_result(&self, result: Result<CommandOutput, CommandFailure>) {
        self.scripted_results
            .lock()
            .expect("scripted_results mutex poisoned")
            .push_back(result);
    }

    /// Run `hook` on every call, after it is recorded and before it returns.
    ///
    /// Lets a test mutate the filesystem the way a real `git clean` would.
    pub fn on_call(&self, hook: impl Fn(&RecordedCommand) + Send + Sync + 'static) {
        *self.hook.lock().expect("hook mutex poisoned") = Some(Box::new(hook));
    }

    /// Snapshot of all calls received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCommand> {
        self.recorded_calls
            .lock()
            .expect("recorded_calls mutex poisoned")
            .clone()
    }

    /// Working directories of all calls, in order.
    #[must_use]
    pub fn call_dirs(&self) -> Vec<PathBuf> {
        self.calls().into_iter().map(|call| call.cwd).collect()
    }
}

impl CommandExecutor for MockExecutor {
    async fn execute(
        &self,
        program: &str,
        args: &[&str],
        cwd: &Path,
    ) -> Result<CommandOutput, CommandFailure> {
        let call = RecordedCommand {
            program: program.to_string(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
            cwd: cwd.to_path_buf(),
        };

        self.recorded_calls
            .lock()
            .expect("recorded_calls mutex poisoned")
            .push(call.clone());

        if let Some(hook) = self.hook.lock().expect("hook mutex poisoned").as_ref() {
            hook(&call);
        }

        self.scripted_results
            .lock()
            .expect("scripted_results mutex poisoned")
            .pop_front()
            .unwrap_or_else(|| Ok(CommandOutput::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_results_are_fifo_then_default() {
        let mock = MockExecutor::new();
        mock.push_result(Err(CommandFailure::Spawn {
            program: "sh".to_string(),
            message: "boom".to_string(),
        }));
        mock.push_result(Ok(CommandOutput {
            stdout: "HEAD is now at abc123".to_string(),
            ..CommandOutput::default()
        }));

        let dir = Path::new("/srv/projects");
        assert!(mock.execute("sh", &[], dir).await.is_err());
        assert_eq!(
            mock.execute("sh", &[], dir).await.unwrap().stdout,
            "HEAD is now at abc123"
        );
        assert_eq!(mock.execute("sh", &[], dir).await.unwrap(), CommandOutput::default());
        assert_eq!(mock.calls().len(), 3);
    }

    #[tokio::test]
    async fn clones_share_call_log() {
        let mock = MockExecutor::new();
        let handle = mock.clone();
        mock.execute("git", &["status"], Path::new("/tmp")).await.unwrap();

        assert_eq!(handle.call_dirs(), vec![PathBuf::from("/tmp")]);
        assert_eq!(handle.calls()[0].args, vec!["status".to_string()]);
    }
}
