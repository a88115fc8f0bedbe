// DownloadPipeline - resolve, fetch, merge and place one user download
//
// Each run owns a fresh temp workspace that is removed on every exit path.
// Progress, stage changes and the outcome are published through channels
// held by the caller's `PipelineHandle`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use super::catalog::FormatCatalog;
use super::config::DownloaderConfig;
use super::errors::{DownloadError, Result};
use super::fetcher::StreamFetcher;
use super::models::{
    DownloadProgress, DownloadRequest, DownloadStatus, DownloadType, PipelineEvent, PipelineStage,
    StreamDescriptor, StreamKind,
};
use super::muxer::Muxer;
use super::traits::{ArtifactPlacer, PlatformClient};
use super::utils::{find_binary, sanitize_file_name};

const WORKSPACE_PREFIX: &str = "media_getter";
const STAGING_PREFIX: &str = ".media_getter";

pub struct DownloadPipeline {
    client: Arc<dyn PlatformClient>,
    placer: Arc<dyn ArtifactPlacer>,
    config: DownloaderConfig,
}

impl DownloadPipeline {
    pub fn new(
        client: Arc<dyn PlatformClient>,
        placer: Arc<dyn ArtifactPlacer>,
        config: DownloaderConfig,
    ) -> Self {
        Self {
            client,
            placer,
            config,
        }
    }

    /// Start a run in the background. Must be called inside a tokio runtime.
    pub fn run(&self, request: DownloadRequest) -> PipelineHandle {
        let cancel = CancellationToken::new();
        let (stage_tx, stage_rx) = watch::channel(PipelineStage::Idle);
        let (video_tx, video_rx) = watch::channel(0.0f32);
        let (audio_tx, audio_rx) = watch::channel(0.0f32);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (outcome_tx, outcome_rx) = oneshot::channel();

        let run = Run {
            catalog: FormatCatalog::new(self.client.clone()),
            fetcher: StreamFetcher::new(self.client.clone(), self.config.stall_timeout()),
            muxer: Muxer::new(
                find_binary("ffmpeg", self.config.ffmpeg_path.as_deref()),
                self.config.mux_timeout(),
            ),
            placer: self.placer.clone(),
            temp_root: self.config.temp_root.clone(),
            cancel: cancel.clone(),
            stage_tx,
            video_tx,
            audio_tx,
            events_tx,
        };

        let span = info_span!("pipeline", video_id = %request.video_id);
        tokio::spawn(
            async move {
                let result = run.execute(&request).await;
                run.finish(&result);
                let _ = outcome_tx.send(result);
            }
            .instrument(span),
        );

        PipelineHandle {
            cancel,
            events: Some(events_rx),
            stage: stage_rx,
            video_progress: video_rx,
            audio_progress: audio_rx,
            outcome: outcome_rx,
        }
    }
}

/// Caller's view of one running download
pub struct PipelineHandle {
    cancel: CancellationToken,
    events: Option<mpsc::UnboundedReceiver<PipelineEvent>>,
    stage: watch::Receiver<PipelineStage>,
    video_progress: watch::Receiver<f32>,
    audio_progress: watch::Receiver<f32>,
    outcome: oneshot::Receiver<Result<PathBuf>>,
}

impl PipelineHandle {
    /// Request cancellation. No effect once the run has finished.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Event stream; can be taken once
    pub fn events(&mut self) -> Option<mpsc::UnboundedReceiver<PipelineEvent>> {
        self.events.take()
    }

    /// Latest fraction for one stream
    pub fn progress(&self, kind: StreamKind) -> watch::Receiver<f32> {
        match kind {
            StreamKind::Video => self.video_progress.clone(),
            StreamKind::Audio => self.audio_progress.clone(),
        }
    }

    pub fn stage(&self) -> PipelineStage {
        *self.stage.borrow()
    }

    pub fn stage_updates(&self) -> watch::Receiver<PipelineStage> {
        self.stage.clone()
    }

    /// Wait for the terminal outcome
    pub async fn wait(self) -> Result<PathBuf> {
        match self.outcome.await {
            Ok(result) => result,
            Err(_) => {
                error!("[Pipeline] Task ended without reporting an outcome");
                Err(DownloadError::Internal(
                    "download task ended without reporting an outcome".to_string(),
                ))
            }
        }
    }
}

struct Run {
    catalog: FormatCatalog,
    fetcher: StreamFetcher,
    muxer: Muxer,
    placer: Arc<dyn ArtifactPlacer>,
    temp_root: Option<PathBuf>,
    cancel: CancellationToken,
    stage_tx: watch::Sender<PipelineStage>,
    video_tx: watch::Sender<f32>,
    audio_tx: watch::Sender<f32>,
    events_tx: mpsc::UnboundedSender<PipelineEvent>,
}

impl Run {
    fn enter(&self, stage: PipelineStage) {
        info!("[Pipeline] Stage: {:?}", stage);
        self.stage_tx.send_replace(stage);
        let _ = self.events_tx.send(PipelineEvent::Stage { stage });
    }

    fn report(&self, kind: StreamKind, fraction: f32) {
        let tx = match kind {
            StreamKind::Video => &self.video_tx,
            StreamKind::Audio => &self.audio_tx,
        };
        tx.send_replace(fraction);
        let _ = self
            .events_tx
            .send(PipelineEvent::Progress(DownloadProgress { kind, fraction }));
    }

    fn finish(&self, result: &Result<PathBuf>) {
        let stage = match result {
            Ok(path) => {
                info!("[Pipeline] Saved to {}", path.display());
                PipelineStage::Succeeded
            }
            Err(DownloadError::Canceled) => {
                info!("[Pipeline] Canceled by user");
                PipelineStage::Canceled
            }
            Err(e) if e.is_user_initiated() => {
                info!("[Pipeline] {}", e);
                PipelineStage::Failed
            }
            Err(e) if e.is_validation() => {
                warn!(kind = e.kind(), "[Pipeline] Rejected request: {}", e);
                PipelineStage::Failed
            }
            Err(e) => {
                error!(kind = e.kind(), "[Pipeline] Failed: {}", e);
                PipelineStage::Failed
            }
        };
        self.enter(stage);
        let _ = self.events_tx.send(PipelineEvent::Finished {
            outcome: DownloadStatus::from(result),
        });
    }

    fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(DownloadError::Canceled);
        }
        Ok(())
    }

    async fn execute(&self, request: &DownloadRequest) -> Result<PathBuf> {
        validate(request)?;
        self.checkpoint()?;

        self.enter(PipelineStage::ResolvingFormats);
        let (title, video, audio) = tokio::select! {
            _ = self.cancel.cancelled() => return Err(DownloadError::Canceled),
            resolved = self.resolve(request) => resolved?,
        };

        let workspace = self.create_workspace()?;
        let result = self
            .produce(workspace.path(), &title, video.as_ref(), &audio, request.download_type)
            .await;

        let workspace_path = workspace.path().to_path_buf();
        match workspace.close() {
            Ok(()) => info!("[Pipeline] Removed workspace {}", workspace_path.display()),
            Err(e) => warn!(
                "[Pipeline] Failed to remove workspace {}: {}",
                workspace_path.display(),
                e
            ),
        }

        result
    }

    /// Fresh catalog lookup: the title plus current stream URLs for the selection
    async fn resolve(
        &self,
        request: &DownloadRequest,
    ) -> Result<(String, Option<StreamDescriptor>, StreamDescriptor)> {
        let catalog = self.catalog.fetch(&request.video_id).await?;

        let audio_id = request.audio.as_ref().map(|s| s.id.as_str()).unwrap_or_default();
        let audio = catalog
            .find_audio(audio_id)
            .cloned()
            .ok_or_else(|| DownloadError::FormatNotFound(format!("audio stream {}", audio_id)))?;

        let video = match (request.download_type, &request.video) {
            (DownloadType::VideoAndAudio, Some(selected)) => Some(
                catalog.find_video(&selected.id).cloned().ok_or_else(|| {
                    DownloadError::FormatNotFound(format!("video stream {}", selected.id))
                })?,
            ),
            _ => None,
        };

        Ok((sanitize_file_name(&catalog.title), video, audio))
    }

    fn create_workspace(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKSPACE_PREFIX);
        let workspace = match &self.temp_root {
            Some(root) => builder
                .tempdir_in(root)
                .map_err(|e| DownloadError::workspace_io(root, e))?,
            None => builder
                .tempdir()
                .map_err(|e| DownloadError::workspace_io(std::env::temp_dir(), e))?,
        };
        info!("[Pipeline] Workspace {}", workspace.path().display());
        Ok(workspace)
    }

    async fn produce(
        &self,
        workspace: &Path,
        title: &str,
        video: Option<&StreamDescriptor>,
        audio: &StreamDescriptor,
        download_type: DownloadType,
    ) -> Result<PathBuf> {
        self.checkpoint()?;
        self.enter(PipelineStage::Fetching);

        let audio_base = format!("{}_audio", title);
        let artifact = match video {
            Some(video) => {
                let video_base = format!("{}_video", title);
                let (video_file, audio_file) = tokio::try_join!(
                    self.fetcher.fetch(
                        video,
                        workspace,
                        &video_base,
                        |p| self.report(StreamKind::Video, p),
                        &self.cancel,
                    ),
                    self.fetcher.fetch(
                        audio,
                        workspace,
                        &audio_base,
                        |p| self.report(StreamKind::Audio, p),
                        &self.cancel,
                    ),
                )?;

                self.checkpoint()?;
                self.enter(PipelineStage::Merging);
                self.muxer
                    .merge(&video_file, &audio_file, workspace, title, &self.cancel)
                    .await?
            }
            None => {
                self.fetcher
                    .fetch(
                        audio,
                        workspace,
                        &audio_base,
                        |p| self.report(StreamKind::Audio, p),
                        &self.cancel,
                    )
                    .await?
            }
        };

        self.checkpoint()?;
        self.enter(PipelineStage::Placing);
        self.place(&artifact, title, download_type).await
    }

    /// Copy the artifact next to the chosen destination as `{title}.{ext}`
    async fn place(&self, artifact: &Path, title: &str, download_type: DownloadType) -> Result<PathBuf> {
        let ext = download_type.output_extension();
        let suggested = format!("{}.{}", title, ext);

        let chosen = tokio::select! {
            _ = self.cancel.cancelled() => return Err(DownloadError::Canceled),
            chosen = self.placer.choose_destination(&suggested, download_type.allowed_extensions()) => chosen,
        };
        let chosen = chosen.ok_or(DownloadError::SaveCanceled)?;

        let parent = chosen
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DownloadError::workspace_io(parent, e))?;

        let target = parent.join(&suggested);
        let (source, dir, dest) = (artifact.to_path_buf(), parent.to_path_buf(), target.clone());
        tokio::task::spawn_blocking(move || place_atomically(&source, &dir, &dest))
            .await
            .map_err(|e| DownloadError::Internal(format!("placement task failed: {}", e)))??;

        Ok(target)
    }
}

/// Copy `artifact` into a hidden staging file inside `dir`, then rename it
/// over `target`. A failed copy leaves `target` untouched and removes the
/// staging file.
fn place_atomically(artifact: &Path, dir: &Path, target: &Path) -> Result<()> {
    let mut staged = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempfile_in(dir)
        .map_err(|e| DownloadError::workspace_io(dir, e))?;

    let mut source =
        std::fs::File::open(artifact).map_err(|e| DownloadError::workspace_io(artifact, e))?;
    std::io::copy(&mut source, staged.as_file_mut())
        .map_err(|e| DownloadError::workspace_io(target, e))?;
    staged
        .as_file()
        .sync_all()
        .map_err(|e| DownloadError::workspace_io(target, e))?;

    staged
        .persist(target)
        .map_err(|e| DownloadError::workspace_io(target, e.error))?;
    Ok(())
}

/// Selection must match the download type before any network work
fn validate(request: &DownloadRequest) -> Result<()> {
    if request.audio.is_none() {
        return Err(DownloadError::FormatNotFound("no audio stream selected".to_string()));
    }
    if request.download_type == DownloadType::VideoAndAudio && request.video.is_none() {
        return Err(DownloadError::FormatNotFound("no video stream selected".to_string()));
    }
    Ok(())
}
