//! Staged worker initialization.
//!
//! Four weighted stages run before the worker accepts builds: download the
//! toolchain bundle, unpack it into the filesystem, prove the toolbox can
//! launch at all, and precompile the shared header every compilation unit
//! includes. Any stage failing is fatal to the subsystem; there is no retry.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio::sync::mpsc;

use crucible_build::diagnostics::indicates_failure;
use crucible_build::pipeline::{ProgressHandle, ProgressUpdate, WeightedPipeline};
use crucible_build::{BuildCoordinator, Toolchain, ToolInvoker, Vfs, unpack_bundle};

use crate::fetch::Fetcher;

/// Everything the startup stages thread between them.
struct StartupContext<I, F> {
    vfs: Arc<dyn Vfs>,
    invoker: I,
    fetcher: F,
    toolchain: Toolchain,
    bundle_url: String,
    bundle: Option<Vec<u8>>,
    pch_ready: bool,
}

/// Collaborators for one initialization run; consumed by [`Startup::run`].
pub struct Startup<I, F> {
    vfs: Arc<dyn Vfs>,
    invoker: I,
    fetcher: F,
    toolchain: Toolchain,
    bundle_url: String,
    precompile_header: bool,
}

impl<I, F> Startup<I, F>
where
    I: ToolInvoker + Send + 'static,
    F: Fetcher + Send + 'static,
{
    #[must_use]
    pub fn new(
        vfs: Arc<dyn Vfs>,
        invoker: I,
        fetcher: F,
        toolchain: Toolchain,
        bundle_url: impl Into<String>,
    ) -> Self {
        Self {
            vfs,
            invoker,
            fetcher,
            toolchain,
            bundle_url: bundle_url.into(),
            precompile_header: true,
        }
    }

    /// Skip the shared-header stage; builds then compile without a
    /// precompiled header (slower, but startup needs one less tool run).
    #[must_use]
    pub fn skip_precompiled_header(mut self) -> Self {
        self.precompile_header = false;
        self
    }

    /// Run the stages in order, reporting progress, and hand back a build
    /// coordinator owning the toolbox and filesystem.
    pub async fn run(
        self,
        progress: mpsc::Sender<ProgressUpdate>,
    ) -> Result<BuildCoordinator<I>> {
        let ctx = StartupContext {
            vfs: self.vfs,
            invoker: self.invoker,
            fetcher: self.fetcher,
            toolchain: self.toolchain,
            bundle_url: self.bundle_url,
            bundle: None,
            pch_ready: false,
        };

        let mut pipeline = WeightedPipeline::new()
            .weighted_stage("download", 2.0, |ctx, p| Box::pin(download(ctx, p)))
            .stage("unpack", |ctx, p| Box::pin(unpack(ctx, p)))
            .stage("tools", |ctx, p| Box::pin(probe_tools(ctx, p)));
        if self.precompile_header {
            pipeline =
                pipeline.weighted_stage("headers", 2.0, |ctx, p| Box::pin(precompile(ctx, p)));
        }

        let ctx = pipeline.run(ctx, &progress).await?;
        Ok(BuildCoordinator::new(
            ctx.invoker,
            ctx.vfs,
            ctx.toolchain,
            ctx.pch_ready,
        ))
    }
}

async fn download<I, F>(
    mut ctx: StartupContext<I, F>,
    progress: ProgressHandle,
) -> Result<StartupContext<I, F>>
where
    I: Send,
    F: Fetcher,
{
    let bytes = ctx.fetcher.fetch(&ctx.bundle_url, &progress).await?;
    ctx.bundle = Some(bytes);
    Ok(ctx)
}

async fn unpack<I, F>(
    mut ctx: StartupContext<I, F>,
    _progress: ProgressHandle,
) -> Result<StartupContext<I, F>>
where
    I: Send,
    F: Send,
{
    let bundle = ctx.bundle.take().context("no bundle was downloaded")?;
    unpack_bundle(&*ctx.vfs, &bundle)?;
    Ok(ctx)
}

/// A version probe proves the toolbox can launch before the first build
/// depends on it.
async fn probe_tools<I, F>(
    mut ctx: StartupContext<I, F>,
    _progress: ProgressHandle,
) -> Result<StartupContext<I, F>>
where
    I: ToolInvoker,
    F: Send,
{
    let argv = ctx.toolchain.probe_argv();
    let cwd = ctx.vfs.host_dir(ctx.toolchain.working_dir())?;
    let result = ctx.invoker.run(&argv, &cwd).await;
    if result.is_launch_failure() {
        bail!("toolbox unavailable: {}", result.stderr());
    }
    tracing::debug!(version = %result.stdout().lines().next().unwrap_or(""), "toolbox probed");
    Ok(ctx)
}

async fn precompile<I, F>(
    mut ctx: StartupContext<I, F>,
    _progress: ProgressHandle,
) -> Result<StartupContext<I, F>>
where
    I: ToolInvoker,
    F: Send,
{
    let argv = ctx.toolchain.pch_argv();
    let cwd = ctx.vfs.host_dir(ctx.toolchain.working_dir())?;
    let result = ctx.invoker.run(&argv, &cwd).await;
    if result.is_launch_failure() {
        bail!("cannot launch compiler for shared header: {}", result.stderr());
    }
    if indicates_failure(result.stderr()) {
        bail!("shared header failed to precompile: {}", result.stderr());
    }
    ctx.pch_ready = true;
    Ok(ctx)
}
