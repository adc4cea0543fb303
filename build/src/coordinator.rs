//! The compile → link → convert build sequence.
//!
//! One coordinator per worker session, one build in flight at a time
//! (`&mut self` plus the sequential session loop enforce this). A build's
//! outcome is a value: tool diagnostics that indicate failure produce an
//! `Ok(BuildResult)` describing the failing stage, while launch and
//! filesystem errors -- the build machinery itself breaking -- are `Err`.

use std::sync::Arc;

use thiserror::Error;

use crucible_types::{BuildRequest, BuildResult, FailingStage, ToolResult};

use crate::diagnostics::indicates_failure;
use crate::invoker::ToolInvoker;
use crate::toolchain::Toolchain;
use crate::vfs::Vfs;

/// Infrastructure failures of the build machinery, as opposed to the
/// diagnostic failures carried in [`BuildResult`].
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to launch {tool}: {message}")]
    ToolLaunch { tool: String, message: String },
    #[error("filesystem error while {action}")]
    Vfs {
        action: String,
        #[source]
        source: std::io::Error,
    },
}

/// Owned handle on the working directory for the duration of one build.
///
/// Acquired at the start of `build` and cleaned on every exit path, so no
/// inputs, objects, or artifacts survive into the next build. Cleanup
/// failures are logged, never escalated: a stale file must not turn a
/// finished build into a failed one.
struct BuildDir {
    vfs: Arc<dyn Vfs>,
    root: String,
}

impl BuildDir {
    fn acquire(vfs: Arc<dyn Vfs>, root: &str) -> Self {
        Self {
            vfs,
            root: root.to_string(),
        }
    }

    fn clean(self) {
        match self.vfs.list(&self.root) {
            Ok(paths) => {
                for path in paths {
                    if let Err(e) = self.vfs.unlink(&path) {
                        tracing::warn!("failed to remove {path} after build: {e}");
                    }
                }
            }
            Err(e) => tracing::warn!("failed to enumerate {} after build: {e}", self.root),
        }
    }
}

/// Drives the toolchain through one build at a time.
pub struct BuildCoordinator<I> {
    invoker: I,
    vfs: Arc<dyn Vfs>,
    toolchain: Toolchain,
    pch_ready: bool,
}

impl<I> std::fmt::Debug for BuildCoordinator<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildCoordinator")
            .field("toolchain", &self.toolchain)
            .field("pch_ready", &self.pch_ready)
            .finish_non_exhaustive()
    }
}

impl<I: ToolInvoker> BuildCoordinator<I> {
    /// `pch_ready` records whether startup produced the shared precompiled
    /// header; compile command lines include it only when it exists.
    #[must_use]
    pub fn new(invoker: I, vfs: Arc<dyn Vfs>, toolchain: Toolchain, pch_ready: bool) -> Self {
        Self {
            invoker,
            vfs,
            toolchain,
            pch_ready,
        }
    }

    #[must_use]
    pub fn invoker(&self) -> &I {
        &self.invoker
    }

    #[must_use]
    pub fn toolchain(&self) -> &Toolchain {
        &self.toolchain
    }

    /// Run one build to its terminal state.
    ///
    /// The working directory is cleaned whether the build succeeds, fails on
    /// a diagnostic, or errors out of the machinery.
    pub async fn build(&mut self, request: &BuildRequest) -> Result<BuildResult, BuildError> {
        tracing::info!(files = request.files().len(), "build starting");
        let dir = BuildDir::acquire(Arc::clone(&self.vfs), self.toolchain.working_dir());
        let result = self.run_stages(request).await;
        dir.clean();
        if let Ok(outcome) = &result {
            tracing::info!(succeeded = outcome.succeeded(), "build finished");
        }
        result
    }

    async fn run_stages(&mut self, request: &BuildRequest) -> Result<BuildResult, BuildError> {
        for (name, contents) in request.files() {
            self.vfs
                .write(&self.toolchain.working_path(name), contents)
                .map_err(|source| BuildError::Vfs {
                    action: format!("writing input {name}"),
                    source,
                })?;
        }

        let mut objects = Vec::new();
        for (name, _) in request.files() {
            if !self.toolchain.is_source(name) {
                continue;
            }
            let argv = self.toolchain.compile_argv(name, self.pch_ready);
            let output = self.run_tool(argv).await?;
            if indicates_failure(output.stderr()) {
                // Remaining sources are skipped; their diagnostics would be
                // noise behind the first failure.
                return Ok(BuildResult::failure(FailingStage::Compile, output.stderr()));
            }
            objects.push(self.toolchain.object_name(name));
        }

        let output = self.run_tool(self.toolchain.link_argv(&objects)).await?;
        if indicates_failure(output.stderr()) {
            return Ok(BuildResult::failure(FailingStage::Link, output.stderr()));
        }

        let output = self.run_tool(self.toolchain.convert_argv()).await?;
        if indicates_failure(output.stderr()) {
            return Ok(BuildResult::failure(FailingStage::Convert, output.stderr()));
        }

        let artifact_path = self.toolchain.working_path(self.toolchain.artifact_name());
        let mut artifact = match self.vfs.read(&artifact_path) {
            Ok(bytes) => bytes,
            Err(e) => {
                return Ok(BuildResult::failure(
                    FailingStage::Convert,
                    format!("artifact {artifact_path} unreadable: {e}"),
                ));
            }
        };
        trim_padding(&mut artifact);
        Ok(BuildResult::success(artifact))
    }

    async fn run_tool(&mut self, argv: Vec<String>) -> Result<ToolResult, BuildError> {
        let cwd = self
            .vfs
            .host_dir(self.toolchain.working_dir())
            .map_err(|source| BuildError::Vfs {
                action: "resolving working directory".to_string(),
                source,
            })?;
        if let Some(tool) = argv.first() {
            tracing::debug!(%tool, "running tool");
        }
        let result = self.invoker.run(&argv, &cwd).await;
        if result.is_launch_failure() {
            return Err(BuildError::ToolLaunch {
                tool: argv.into_iter().next().unwrap_or_default(),
                message: result.stderr().to_string(),
            });
        }
        Ok(result)
    }
}

/// The image is padded to a block boundary with trailing zero bytes; the
/// flashable artifact carries none of them.
fn trim_padding(bytes: &mut Vec<u8>) {
    while bytes.last() == Some(&0) {
        bytes.pop();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::path::Path;

    use super::*;
    use crate::vfs::MemoryVfs;

    fn ok() -> ToolResult {
        ToolResult::new(0, String::new(), String::new())
    }

    fn failed(stderr: &str) -> ToolResult {
        ToolResult::new(1, String::new(), stderr.to_string())
    }

    /// Scripted invoker: pops pre-arranged results, defaulting to success,
    /// and records every argv it sees.
    struct FakeInvoker {
        results: VecDeque<ToolResult>,
        calls: Vec<Vec<String>>,
    }

    impl FakeInvoker {
        fn succeeding() -> Self {
            Self::scripted(Vec::new())
        }

        fn scripted(results: Vec<ToolResult>) -> Self {
            Self {
                results: results.into(),
                calls: Vec::new(),
            }
        }
    }

    impl ToolInvoker for FakeInvoker {
        async fn run(&mut self, argv: &[String], _cwd: &Path) -> ToolResult {
            self.calls.push(argv.to_vec());
            self.results.pop_front().unwrap_or_else(ok)
        }
    }

    fn request(names: &[&str]) -> BuildRequest {
        BuildRequest::new(
            names
                .iter()
                .map(|n| ((*n).to_string(), b"content".to_vec()))
                .collect(),
        )
    }

    fn coordinator(
        invoker: FakeInvoker,
        vfs: &Arc<MemoryVfs>,
        pch_ready: bool,
    ) -> BuildCoordinator<FakeInvoker> {
        let shared: Arc<dyn Vfs> = Arc::clone(vfs) as Arc<dyn Vfs>;
        BuildCoordinator::new(invoker, shared, Toolchain::microbit_v2(), pch_ready)
    }

    fn plant_artifact(vfs: &MemoryVfs, bytes: &[u8]) {
        vfs.write("/working/MICROBIT.hex", bytes).unwrap();
    }

    #[tokio::test]
    async fn test_successful_build_runs_all_stages() {
        let vfs = Arc::new(MemoryVfs::new());
        plant_artifact(&vfs, &[0x3a, 0x10, 0x00, 0x00]);
        let mut coord = coordinator(FakeInvoker::succeeding(), &vfs, true);

        let result = coord
            .build(&request(&["main.cpp", "common.h", "util.cpp"]))
            .await
            .unwrap();

        assert!(result.succeeded());
        assert_eq!(result.artifact(), Some(&[0x3a, 0x10][..]), "padding trimmed");

        let tools: Vec<&str> = coord.invoker().calls.iter().map(|c| c[0].as_str()).collect();
        assert_eq!(tools, vec!["clang++", "clang++", "ld.lld", "llvm-objcopy"]);

        let link = &coord.invoker().calls[2];
        assert!(link.contains(&"main.cpp.obj".to_string()));
        assert!(link.contains(&"util.cpp.obj".to_string()));
        assert!(!link.iter().any(|a| a == "common.h.obj"));
    }

    #[tokio::test]
    async fn test_inputs_visible_to_tools_then_cleaned() {
        /// Records what exists in the working directory at each invocation.
        struct SnapshottingInvoker {
            vfs: Arc<MemoryVfs>,
            snapshots: Vec<Vec<String>>,
        }

        impl ToolInvoker for SnapshottingInvoker {
            async fn run(&mut self, _argv: &[String], _cwd: &Path) -> ToolResult {
                self.snapshots.push(self.vfs.list("/working").unwrap());
                ok()
            }
        }

        let vfs = Arc::new(MemoryVfs::new());
        plant_artifact(&vfs, &[1]);
        let invoker = SnapshottingInvoker {
            vfs: Arc::clone(&vfs),
            snapshots: Vec::new(),
        };
        let shared: Arc<dyn Vfs> = Arc::clone(&vfs) as Arc<dyn Vfs>;
        let mut coord =
            BuildCoordinator::new(invoker, shared, Toolchain::microbit_v2(), false);

        coord.build(&request(&["common.h", "main.cpp"])).await.unwrap();

        let first = &coord.invoker().snapshots[0];
        assert!(first.contains(&"/working/common.h".to_string()));
        assert!(first.contains(&"/working/main.cpp".to_string()));
        assert!(vfs.list("/working").unwrap().is_empty(), "cleaned afterwards");
    }

    #[tokio::test]
    async fn test_compile_failure_short_circuits() {
        let vfs = Arc::new(MemoryVfs::new());
        let invoker =
            FakeInvoker::scripted(vec![failed("main.cpp:3:5: error: expected ';'")]);
        let mut coord = coordinator(invoker, &vfs, false);

        let result = coord.build(&request(&["main.cpp", "util.cpp"])).await.unwrap();

        assert!(!result.succeeded());
        assert_eq!(result.failing_stage(), Some(FailingStage::Compile));
        assert!(result.diagnostic().unwrap().contains("expected ';'"));
        assert_eq!(coord.invoker().calls.len(), 1, "second source and linker skipped");
        assert!(vfs.list("/working").unwrap().is_empty(), "cleaned on failure too");
    }

    #[tokio::test]
    async fn test_link_failure() {
        let vfs = Arc::new(MemoryVfs::new());
        let invoker = FakeInvoker::scripted(vec![
            ok(),
            failed("ld.lld: error: undefined symbol: main"),
        ]);
        let mut coord = coordinator(invoker, &vfs, false);

        let result = coord.build(&request(&["main.cpp"])).await.unwrap();
        assert_eq!(result.failing_stage(), Some(FailingStage::Link));
        assert_eq!(coord.invoker().calls.len(), 2, "conversion never runs");
    }

    #[tokio::test]
    async fn test_convert_marker_failure() {
        let vfs = Arc::new(MemoryVfs::new());
        let invoker = FakeInvoker::scripted(vec![ok(), ok(), failed("error: cannot write output")]);
        let mut coord = coordinator(invoker, &vfs, false);

        let result = coord.build(&request(&["main.cpp"])).await.unwrap();
        assert_eq!(result.failing_stage(), Some(FailingStage::Convert));
    }

    #[tokio::test]
    async fn test_unreadable_artifact_is_convert_failure() {
        let vfs = Arc::new(MemoryVfs::new());
        let mut coord = coordinator(FakeInvoker::succeeding(), &vfs, false);

        let result = coord.build(&request(&["main.cpp"])).await.unwrap();
        assert_eq!(result.failing_stage(), Some(FailingStage::Convert));
        assert!(result.diagnostic().unwrap().contains("MICROBIT.hex"));
    }

    #[tokio::test]
    async fn test_launch_failure_is_an_error_not_a_diagnostic() {
        let vfs = Arc::new(MemoryVfs::new());
        let invoker =
            FakeInvoker::scripted(vec![ToolResult::launch_failure("clang++ not found")]);
        let mut coord = coordinator(invoker, &vfs, false);

        let err = coord.build(&request(&["main.cpp"])).await.unwrap_err();
        match err {
            BuildError::ToolLaunch { tool, message } => {
                assert_eq!(tool, "clang++");
                assert_eq!(message, "clang++ not found");
            }
            other => panic!("expected ToolLaunch, got {other:?}"),
        }
        assert!(vfs.list("/working").unwrap().is_empty(), "cleaned on error exit");
    }

    #[tokio::test]
    async fn test_no_state_leaks_between_builds() {
        let vfs = Arc::new(MemoryVfs::new());
        plant_artifact(&vfs, &[1]);
        let mut coord = coordinator(FakeInvoker::succeeding(), &vfs, false);
        coord.build(&request(&["first.cpp"])).await.unwrap();

        plant_artifact(&vfs, &[2]);
        let result = coord.build(&request(&["second.cpp"])).await.unwrap();
        assert_eq!(result.artifact(), Some(&[2][..]));

        // Second build's link line carries only the second build's object.
        let second_link = &coord.invoker().calls[5];
        assert_eq!(second_link[0], "ld.lld");
        assert!(second_link.contains(&"second.cpp.obj".to_string()));
        assert!(!second_link.contains(&"first.cpp.obj".to_string()));
    }

    #[tokio::test]
    async fn test_pch_flag_follows_startup_outcome() {
        let vfs = Arc::new(MemoryVfs::new());
        plant_artifact(&vfs, &[1]);
        let mut coord = coordinator(FakeInvoker::succeeding(), &vfs, true);
        coord.build(&request(&["main.cpp"])).await.unwrap();
        assert!(coord.invoker().calls[0].contains(&"-include-pch".to_string()));

        let vfs = Arc::new(MemoryVfs::new());
        plant_artifact(&vfs, &[1]);
        let mut coord = coordinator(FakeInvoker::succeeding(), &vfs, false);
        coord.build(&request(&["main.cpp"])).await.unwrap();
        assert!(!coord.invoker().calls[0].contains(&"-include-pch".to_string()));
    }

    #[tokio::test]
    async fn test_tools_run_inside_the_disk_root() {
        use std::path::PathBuf;

        use crate::vfs::DiskVfs;

        /// Records the cwd handed to each tool and whether the build input
        /// was visible there at that moment.
        struct CwdRecorder {
            calls: Vec<(PathBuf, bool)>,
        }

        impl ToolInvoker for CwdRecorder {
            async fn run(&mut self, _argv: &[String], cwd: &Path) -> ToolResult {
                self.calls.push((cwd.to_path_buf(), cwd.join("main.cpp").exists()));
                ok()
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let vfs = Arc::new(DiskVfs::new(dir.path()));
        vfs.write("/working/MICROBIT.hex", &[1]).unwrap();
        let shared: Arc<dyn Vfs> = Arc::clone(&vfs) as Arc<dyn Vfs>;
        let mut coord = BuildCoordinator::new(
            CwdRecorder { calls: Vec::new() },
            shared,
            Toolchain::microbit_v2(),
            false,
        );

        let result = coord.build(&request(&["main.cpp"])).await.unwrap();
        assert!(result.succeeded());

        let (cwd, saw_input) = &coord.invoker().calls[0];
        assert_eq!(cwd, &dir.path().join("working"), "cwd is the mapped host dir");
        assert!(saw_input, "tool sees the input the coordinator wrote");
    }

    #[tokio::test]
    async fn test_cleanup_spares_other_directories() {
        let vfs = Arc::new(MemoryVfs::new());
        vfs.write("/libs/libcodal-core.a", b"lib").unwrap();
        plant_artifact(&vfs, &[1]);
        let mut coord = coordinator(FakeInvoker::succeeding(), &vfs, false);

        coord.build(&request(&["main.cpp"])).await.unwrap();
        assert!(vfs.exists("/libs/libcodal-core.a"));
    }

    #[test]
    fn test_trim_padding() {
        let mut bytes = vec![0x3a, 0x00, 0x10, 0x00, 0x00];
        trim_padding(&mut bytes);
        assert_eq!(bytes, vec![0x3a, 0x00, 0x10], "interior zeros stay");

        let mut all_zero = vec![0x00, 0x00];
        trim_padding(&mut all_zero);
        assert!(all_zero.is_empty());
    }
}
