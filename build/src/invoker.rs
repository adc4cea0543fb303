//! Synchronous, run-to-completion tool invocation.

use std::path::Path;
use std::time::Duration;

use crucible_types::ToolResult;

/// A toolbox of external command-line programs.
///
/// `run` never fails at the signature level: a tool that could not be started
/// at all is reported through [`ToolResult::launch_failure`], so callers
/// distinguish "the compiler ran and rejected the code" from "there is no
/// compiler" by inspecting the result.
pub trait ToolInvoker: Send {
    /// Run `argv[0]` with the remaining arguments in `cwd`, capturing both
    /// output streams to completion.
    fn run(&mut self, argv: &[String], cwd: &Path) -> impl Future<Output = ToolResult> + Send;
}

/// [`ToolInvoker`] backed by real OS processes.
///
/// Every invocation spawns a fresh process, so no state leaks from one run
/// into the next; the program name is resolved through `PATH` up front so a
/// missing tool surfaces as a launch failure rather than a spawn error.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessInvoker {
    deadline: Option<Duration>,
}

impl ProcessInvoker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Best-effort guard against a stuck tool: a run exceeding the deadline
    /// is killed and reported as a launch-class failure, since nothing about
    /// its partial output is trustworthy.
    #[must_use]
    pub fn with_deadline(deadline: Duration) -> Self {
        Self {
            deadline: Some(deadline),
        }
    }
}

impl ToolInvoker for ProcessInvoker {
    async fn run(&mut self, argv: &[String], cwd: &Path) -> ToolResult {
        let Some((program, args)) = argv.split_first() else {
            return ToolResult::launch_failure("empty argument vector");
        };
        let resolved = match which::which(program) {
            Ok(path) => path,
            Err(e) => {
                return ToolResult::launch_failure(format!("cannot resolve {program}: {e}"));
            }
        };
        let mut command = tokio::process::Command::new(&resolved);
        command.args(args).current_dir(cwd).kill_on_drop(true);
        let waited = match self.deadline {
            Some(limit) => match tokio::time::timeout(limit, command.output()).await {
                Ok(output) => output,
                Err(_) => {
                    return ToolResult::launch_failure(format!(
                        "{program} timed out after {limit:?}"
                    ));
                }
            },
            None => command.output().await,
        };
        let output = match waited {
            Ok(output) => output,
            Err(e) => {
                return ToolResult::launch_failure(format!(
                    "failed to spawn {}: {e}",
                    resolved.display()
                ));
            }
        };
        tracing::debug!(
            program,
            code = output.status.code(),
            "tool run finished"
        );
        ToolResult::new(
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stdout).into_owned(),
            String::from_utf8_lossy(&output.stderr).into_owned(),
        )
    }
}
