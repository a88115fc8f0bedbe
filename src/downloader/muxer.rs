// Muxer - combines a video-only and an audio-only file with ffmpeg

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command as TokioCommand;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::errors::{DownloadError, Result};
use super::utils::spawn_error;

pub struct Muxer {
    ffmpeg_path: PathBuf,
    timeout: Duration,
}

impl Muxer {
    pub fn new(ffmpeg_path: PathBuf, timeout: Duration) -> Self {
        Self {
            ffmpeg_path,
            timeout,
        }
    }

    /// Stream copy, no re-encoding. No `-y`: the output never pre-exists.
    pub fn build_args(video: &Path, audio: &Path, output: &Path) -> Vec<String> {
        vec![
            "-i".to_string(),
            video.to_string_lossy().to_string(),
            "-i".to_string(),
            audio.to_string_lossy().to_string(),
            "-c:v".to_string(),
            "copy".to_string(),
            "-c:a".to_string(),
            "copy".to_string(),
            "-strict".to_string(),
            "experimental".to_string(),
            output.to_string_lossy().to_string(),
        ]
    }

    /// Merge into `{output_dir}/{title}.mp4`, then delete both inputs
    pub async fn merge(
        &self,
        video: &Path,
        audio: &Path,
        output_dir: &Path,
        title: &str,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        if cancel.is_cancelled() {
            return Err(DownloadError::Canceled);
        }

        let output = output_dir.join(format!("{}.mp4", title));
        let args = Self::build_args(video, audio, &output);
        info!("[Muxer] {} {}", self.ffmpeg_path.display(), args.join(" "));

        let mut child = TokioCommand::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(&self.ffmpeg_path, e))?;

        // Drain both pipes so ffmpeg never blocks on a full buffer
        let stdout_task = child.stdout.take().map(|pipe| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(pipe).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    info!("[ffmpeg] {}", line);
                }
            })
        });
        let stderr_task = child.stderr.take().map(|pipe| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(pipe).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!("[ffmpeg] {}", line);
                }
            })
        });

        let status = tokio::select! {
            status = child.wait() => status.map_err(|e| spawn_error(&self.ffmpeg_path, e))?,
            _ = cancel.cancelled() => {
                warn!("[Muxer] Canceled, killing ffmpeg");
                let _ = child.kill().await;
                return Err(DownloadError::Canceled);
            }
            _ = tokio::time::sleep(self.timeout) => {
                warn!("[Muxer] ffmpeg exceeded {}s, killing", self.timeout.as_secs());
                let _ = child.kill().await;
                return Err(DownloadError::MuxTimedOut(self.timeout.as_secs()));
            }
        };

        for task in [stdout_task, stderr_task].into_iter().flatten() {
            let _ = task.await;
        }

        if !status.success() {
            let code = status.code().unwrap_or(-1);
            warn!("[Muxer] ffmpeg exited with code {}", code);
            return Err(DownloadError::MuxFailed(code));
        }

        for source in [video, audio] {
            if let Err(e) = tokio::fs::remove_file(source).await {
                warn!("[Muxer] Failed to remove {}: {}", source.display(), e);
            }
        }

        info!("[Muxer] Merged into {}", output.display());
        Ok(output)
    }
}
