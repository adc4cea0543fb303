//! Envelope dispatch for the worker session.

use anyhow::{Context, Result};
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;

use crucible_build::{BuildCoordinator, ToolInvoker};
use crucible_lsp::LanguageServerChannel;
use crucible_types::{BuildRequest, Envelope};

/// Routes inbound envelopes to the build coordinator or the language-server
/// channel, and writes results back to the host.
///
/// The coordinator slot is empty until startup completes: a build request
/// arriving early is answered with an error, while language-server requests
/// are queued inside the channel and flushed on [`Self::complete_startup`].
pub struct MessageRouter<I, W> {
    coordinator: Option<BuildCoordinator<I>>,
    channel: LanguageServerChannel<W>,
    outbound: mpsc::Sender<Envelope>,
}

impl<I, W> MessageRouter<I, W>
where
    I: ToolInvoker,
    W: AsyncWrite + Unpin,
{
    #[must_use]
    pub fn new(channel: LanguageServerChannel<W>, outbound: mpsc::Sender<Envelope>) -> Self {
        Self {
            coordinator: None,
            channel,
            outbound,
        }
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.coordinator.is_some()
    }

    #[must_use]
    pub fn channel(&self) -> &LanguageServerChannel<W> {
        &self.channel
    }

    /// Install the coordinator produced by startup and open the
    /// language-server channel, flushing anything queued meanwhile.
    pub async fn complete_startup(&mut self, coordinator: BuildCoordinator<I>) -> Result<()> {
        self.coordinator = Some(coordinator);
        self.channel.mark_ready().await?;
        tracing::info!("worker initialized; accepting builds");
        Ok(())
    }

    /// Handle one inbound envelope. `Err` means the session cannot continue
    /// (the host hung up); everything else is handled in place.
    pub async fn dispatch(&mut self, envelope: Envelope) -> Result<()> {
        match envelope.kind() {
            "compile" => self.handle_compile(envelope).await,
            "languageServer" => self.handle_language_server(envelope).await,
            "info" => {
                tracing::info!(body = ?envelope.body(), "host info");
                Ok(())
            }
            "error" => {
                tracing::error!(body = ?envelope.body(), "host-reported error");
                Ok(())
            }
            other => {
                tracing::warn!(kind = other, "unhandled envelope kind");
                Ok(())
            }
        }
    }

    async fn handle_compile(&mut self, envelope: Envelope) -> Result<()> {
        let request = envelope
            .into_body()
            .ok_or_else(|| "build request has no body".to_string())
            .and_then(|body| {
                serde_json::from_value::<BuildRequest>(body)
                    .map_err(|e| format!("malformed build request: {e}"))
            });

        match (request, self.coordinator.as_mut()) {
            (Err(message), _) => {
                tracing::warn!(reason = %message, "rejecting build request");
                self.send(Envelope::build_error(&message)).await?;
            }
            (Ok(_), None) => {
                self.send(Envelope::build_error("worker is still initializing"))
                    .await?;
            }
            (Ok(request), Some(coordinator)) => match coordinator.build(&request).await {
                Ok(result) if result.succeeded() => {
                    self.send(Envelope::hex(result.artifact().unwrap_or_default()))
                        .await?;
                }
                Ok(result) => {
                    if let Some(stage) = result.failing_stage() {
                        tracing::warn!(stage = stage.label(), "build failed");
                    }
                    self.send(Envelope::build_error(
                        result.diagnostic().unwrap_or("build failed"),
                    ))
                    .await?;
                }
                Err(e) => {
                    tracing::error!("build machinery failed: {e}");
                    self.send(Envelope::build_error(&e.to_string())).await?;
                }
            },
        }
        // The host leans on this marker to know the build reached a terminal
        // state, so it follows both artifacts and errors.
        self.send(Envelope::compile_complete()).await
    }

    async fn handle_language_server(&mut self, envelope: Envelope) -> Result<()> {
        let Some(body) = envelope.into_body() else {
            tracing::warn!("language-server envelope without a body");
            return Ok(());
        };
        self.channel.send(&body).await
    }

    async fn send(&self, envelope: Envelope) -> Result<()> {
        self.outbound
            .send(envelope)
            .await
            .context("host channel closed")
    }
}
