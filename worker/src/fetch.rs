//! Downloading the toolchain bundle.

use anyhow::{Context, Result};

use crucible_build::ProgressHandle;

/// Source of the toolchain bundle bytes.
///
/// Fractional progress is reported through the handle as bytes arrive, when
/// the source knows the total size up front.
pub trait Fetcher: Send {
    fn fetch(
        &mut self,
        url: &str,
        progress: &ProgressHandle,
    ) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// [`Fetcher`] over HTTP, streaming the body chunk by chunk.
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&mut self, url: &str, progress: &ProgressHandle) -> Result<Vec<u8>> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("requesting {url}"))?
            .error_for_status()
            .with_context(|| format!("fetching {url}"))?;

        let total = response.content_length().filter(|&n| n > 0);
        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .with_context(|| format!("streaming {url}"))?
        {
            bytes.extend_from_slice(&chunk);
            if let Some(total) = total {
                progress.report(bytes.len() as f64 / total as f64).await;
            }
        }
        tracing::info!(url, bytes = bytes.len(), "bundle downloaded");
        Ok(bytes)
    }
}
