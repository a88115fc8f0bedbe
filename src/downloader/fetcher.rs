// StreamFetcher - writes one platform stream into the workspace

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::errors::{DownloadError, Result};
use super::models::StreamDescriptor;
use super::traits::PlatformClient;

pub struct StreamFetcher {
    client: Arc<dyn PlatformClient>,
    stall_timeout: Duration,
}

impl StreamFetcher {
    pub fn new(client: Arc<dyn PlatformClient>, stall_timeout: Duration) -> Self {
        Self {
            client,
            stall_timeout,
        }
    }

    /// Download `descriptor` to `{dest_dir}/{base_name}.{ext}`.
    ///
    /// `on_progress` receives fractions in `[0, 1]` that never decrease,
    /// and always a final `1.0` on success. Unknown sizes report nothing
    /// until completion.
    pub async fn fetch<F>(
        &self,
        descriptor: &StreamDescriptor,
        dest_dir: &Path,
        base_name: &str,
        mut on_progress: F,
        cancel: &CancellationToken,
    ) -> Result<PathBuf>
    where
        F: FnMut(f32) + Send,
    {
        if cancel.is_cancelled() {
            return Err(DownloadError::Canceled);
        }

        let path = dest_dir.join(format!("{}.{}", base_name, descriptor.extension));
        info!(
            "[Fetcher] {} stream {} -> {}",
            descriptor.kind,
            descriptor.display_label(),
            path.display()
        );

        let mut stream = tokio::select! {
            _ = cancel.cancelled() => return Err(DownloadError::Canceled),
            opened = self.client.open_stream(descriptor) => opened?,
        };
        let total = stream.content_length.or(descriptor.content_length).filter(|n| *n > 0);

        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| DownloadError::workspace_io(&path, e))?;

        let mut received: u64 = 0;
        let mut reported: f32 = 0.0;

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Err(DownloadError::Canceled),
                next = tokio::time::timeout(self.stall_timeout, stream.chunks.next()) => next,
            };

            let chunk = match next {
                Err(_) => {
                    return Err(DownloadError::StreamUnavailable(format!(
                        "{} stream stalled for {}s",
                        descriptor.kind,
                        self.stall_timeout.as_secs()
                    )))
                }
                Ok(None) => break,
                Ok(Some(chunk)) => chunk?,
            };

            file.write_all(&chunk)
                .await
                .map_err(|e| DownloadError::workspace_io(&path, e))?;
            received += chunk.len() as u64;

            if let Some(total) = total {
                let fraction = (received as f64 / total as f64).min(1.0) as f32;
                if fraction > reported {
                    reported = fraction;
                    on_progress(fraction);
                }
            }
        }

        file.flush()
            .await
            .map_err(|e| DownloadError::workspace_io(&path, e))?;

        if reported < 1.0 {
            on_progress(1.0);
        }

        debug!("[Fetcher] {} stream done: {} bytes", descriptor.kind, received);
        Ok(path)
    }
}
