//! The result of one synchronous, run-to-completion tool invocation.

/// Sentinel return code signalling that a tool could not be started at all,
/// as opposed to a tool that ran and exited non-zero.
pub const LAUNCH_FAILURE_CODE: i32 = -42;

/// Captured output of a single tool invocation.
///
/// Owned by the caller; never mutated after creation. Output lines are
/// appended in emission order; no interleaving guarantee between the two
/// streams is provided.
#[derive(Debug, Clone)]
pub struct ToolResult {
    return_code: i32,
    stdout: String,
    stderr: String,
}

impl ToolResult {
    #[must_use]
    pub fn new(return_code: i32, stdout: String, stderr: String) -> Self {
        Self {
            return_code,
            stdout,
            stderr,
        }
    }

    /// Construct the distinguished result for a tool that failed to launch.
    /// The launch error's message is captured in `stderr`.
    #[must_use]
    pub fn launch_failure(message: impl Into<String>) -> Self {
        Self {
            return_code: LAUNCH_FAILURE_CODE,
            stdout: String::new(),
            stderr: message.into(),
        }
    }

    #[must_use]
    pub fn is_launch_failure(&self) -> bool {
        self.return_code == LAUNCH_FAILURE_CODE
    }

    #[must_use]
    pub fn return_code(&self) -> i32 {
        self.return_code
    }

    #[must_use]
    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    #[must_use]
    pub fn stderr(&self) -> &str {
        &self.stderr
    }
}
