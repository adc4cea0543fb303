//! Outbound language-server channel and the stdout pump.
//!
//! Requests issued before the worker's staged startup has finished must not
//! reach the tool yet: they are framed immediately and parked, as discrete
//! already-framed messages, in a pending queue that is flushed exactly once
//! when the channel is marked ready.

use std::collections::VecDeque;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crucible_types::Envelope;

use crate::codec::{StreamFramer, encode_frame};

const PUMP_READ_BUFFER: usize = 4096;

/// Writer side of the language-server tool's stdin.
pub struct LanguageServerChannel<W> {
    writer: W,
    ready: bool,
    pending: VecDeque<Vec<u8>>,
}

impl<W: AsyncWrite + Unpin> LanguageServerChannel<W> {
    /// A channel starts not-ready; [`Self::mark_ready`] opens it.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            ready: false,
            pending: VecDeque::new(),
        }
    }

    /// Frame a JSON-RPC message and write it, or queue it while not ready.
    pub async fn send(&mut self, msg: &serde_json::Value) -> Result<()> {
        let frame = encode_frame(msg)?;
        if self.ready {
            self.write_frame(&frame).await
        } else {
            tracing::debug!("queueing language-server request until startup completes");
            self.pending.push_back(frame);
            Ok(())
        }
    }

    /// Open the channel and flush queued frames, in arrival order, exactly
    /// once. Each frame is written atomically.
    pub async fn mark_ready(&mut self) -> Result<()> {
        while let Some(frame) = self.pending.pop_front() {
            self.write_frame(&frame).await?;
        }
        self.ready = true;
        Ok(())
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Number of frames waiting for startup to complete.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    async fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.writer
            .write_all(frame)
            .await
            .context("writing language-server frame")?;
        self.writer
            .flush()
            .await
            .context("flushing language-server frame")?;
        Ok(())
    }
}

/// Pump the language-server tool's stdout through a [`StreamFramer`],
/// forwarding every decoded message to the host as a `response` envelope.
///
/// Runs until the stream reaches EOF or the host side hangs up. The read
/// suspends while no bytes are available; there is no polling loop.
pub async fn pump_output<R>(mut reader: R, outbound: mpsc::Sender<Envelope>) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut framer = StreamFramer::new();
    let mut buf = [0u8; PUMP_READ_BUFFER];
    loop {
        let n = reader
            .read(&mut buf)
            .await
            .context("reading language-server stdout")?;
        if n == 0 {
            tracing::info!("language server closed its output stream");
            return Ok(());
        }
        for msg in framer.push(&buf[..n]) {
            if outbound
                .send(Envelope::language_server_response(msg))
                .await
                .is_err()
            {
                tracing::debug!("host channel closed; stopping language-server pump");
                return Ok(());
            }
        }
    }
}
