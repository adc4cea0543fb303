//! The worker session loop.
//!
//! One call to [`run_worker`] owns the whole lifetime of a worker: it pumps
//! the language server's stdout, forwards startup progress, drives the staged
//! startup concurrently with early inbound traffic, and then dispatches
//! envelopes until the host hangs up.

use anyhow::Result;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

use crucible_build::pipeline::ProgressUpdate;
use crucible_build::ToolInvoker;
use crucible_lsp::{LanguageServerChannel, pump_output};
use crucible_types::Envelope;

use crate::fetch::Fetcher;
use crate::router::MessageRouter;
use crate::startup::Startup;

const PROGRESS_CAPACITY: usize = 64;

/// Map pipeline progress onto the host's progress envelopes. Completion is
/// reported as the `ready` stage at fraction 1.0, exactly once.
async fn forward_progress(
    mut updates: mpsc::Receiver<ProgressUpdate>,
    outbound: mpsc::Sender<Envelope>,
) {
    while let Some(update) = updates.recv().await {
        let envelope = match update {
            ProgressUpdate::Stage { fraction, label } => {
                Envelope::progress_report(&label, fraction)
            }
            ProgressUpdate::Finished => Envelope::progress_report("ready", 1.0),
        };
        if outbound.send(envelope).await.is_err() {
            return;
        }
    }
}

/// Run a worker session to completion.
///
/// Inbound envelopes arriving while startup is still running are dispatched
/// immediately: build requests are answered with an error, language-server
/// requests are queued in arrival order and flushed once startup completes.
/// A startup failure is reported to the host as a worker error envelope and
/// ends the session; otherwise the session runs until `inbound` closes.
pub async fn run_worker<I, F, R, W>(
    startup: Startup<I, F>,
    ls_writer: W,
    ls_reader: R,
    mut inbound: mpsc::Receiver<Envelope>,
    outbound: mpsc::Sender<Envelope>,
) -> Result<()>
where
    I: ToolInvoker + Send + 'static,
    F: Fetcher + Send + 'static,
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin,
{
    tokio::spawn(pump_output(ls_reader, outbound.clone()));

    let (progress_tx, progress_rx) = mpsc::channel(PROGRESS_CAPACITY);
    let forwarder = tokio::spawn(forward_progress(progress_rx, outbound.clone()));

    let mut router = MessageRouter::new(LanguageServerChannel::new(ls_writer), outbound.clone());

    let startup_future = startup.run(progress_tx);
    tokio::pin!(startup_future);

    loop {
        tokio::select! {
            outcome = &mut startup_future => {
                match outcome {
                    Ok(coordinator) => {
                        router.complete_startup(coordinator).await?;
                        break;
                    }
                    Err(e) => {
                        tracing::error!("worker initialization failed: {e:#}");
                        let _ = outbound.send(Envelope::worker_error(&format!("{e:#}"))).await;
                        return Err(e);
                    }
                }
            }
            maybe = inbound.recv() => {
                match maybe {
                    Some(envelope) => router.dispatch(envelope).await?,
                    None => {
                        tracing::info!("host closed the session during startup");
                        return Ok(());
                    }
                }
            }
        }
    }

    while let Some(envelope) = inbound.recv().await {
        router.dispatch(envelope).await?;
    }
    tracing::info!("host closed the session");
    let _ = forwarder.await;
    Ok(())
}
