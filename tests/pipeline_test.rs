use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, StreamExt};
use tempfile::TempDir;

use media_getter::downloader::placer::{DirectoryPlacer, DismissingPlacer};
use media_getter::downloader::{
    ArtifactPlacer, ByteStream, DownloadError, DownloadPipeline, DownloadRequest, DownloadStatus,
    DownloaderConfig, PipelineEvent, PipelineStage, Result, SearchResult, StreamDescriptor,
    StreamKind, VideoId, VideoInfo,
};

const TITLE: &str = "Never Gonna Give You Up";

/// Serves a fixed catalog and in-memory stream bodies
struct FakeClient {
    opened: Mutex<Vec<String>>,
    /// Stream ids whose body never produces a chunk
    stalled: Vec<&'static str>,
    /// Stream ids the platform refuses to serve
    refused: Vec<&'static str>,
}

impl FakeClient {
    fn build(stalled: Vec<&'static str>, refused: Vec<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            opened: Mutex::new(Vec::new()),
            stalled,
            refused,
        })
    }

    fn new() -> Arc<Self> {
        Self::build(Vec::new(), Vec::new())
    }

    fn stalling(id: &'static str) -> Arc<Self> {
        Self::build(vec![id], Vec::new())
    }

    fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

fn video_137() -> StreamDescriptor {
    StreamDescriptor::video("137", "1080p", "mp4", 4400, true, "https://cdn.example/137")
}

fn audio_140() -> StreamDescriptor {
    StreamDescriptor::audio("140", "mp4", 128, "https://cdn.example/140")
}

#[async_trait]
impl media_getter::downloader::PlatformClient for FakeClient {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn search_videos(&self, _query: &str, _limit: usize) -> Result<Vec<SearchResult>> {
        Ok(Vec::new())
    }

    async fn get_video_info(&self, _video_id: &VideoId) -> Result<VideoInfo> {
        Ok(VideoInfo {
            title: TITLE.to_string(),
            video_streams: vec![
                StreamDescriptor::video("18", "360p", "mp4", 500, false, "https://cdn.example/18"),
                video_137(),
            ],
            audio_streams: vec![audio_140()],
        })
    }

    async fn open_stream(&self, descriptor: &StreamDescriptor) -> Result<ByteStream> {
        self.opened.lock().unwrap().push(descriptor.id.clone());

        if self.refused.iter().any(|id| *id == descriptor.id) {
            return Err(DownloadError::StreamUnavailable(descriptor.id.clone()));
        }
        if self.stalled.iter().any(|id| *id == descriptor.id) {
            return Ok(ByteStream::new(Some(100), stream::pending().boxed()));
        }

        let body: &'static str = match descriptor.kind {
            StreamKind::Video => "VIDEO-BYTES",
            StreamKind::Audio => "AUDIO-BYTES",
        };
        let chunks: Vec<Result<Bytes>> = body
            .as_bytes()
            .chunks(4)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Ok(ByteStream::new(Some(body.len() as u64), stream::iter(chunks).boxed()))
    }
}

/// Directory placement that remembers what it was asked
struct RecordingPlacer {
    inner: DirectoryPlacer,
    asked: Mutex<Vec<(String, Vec<String>)>>,
}

impl RecordingPlacer {
    fn new(dir: &Path) -> Arc<Self> {
        Arc::new(Self {
            inner: DirectoryPlacer::new(dir),
            asked: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ArtifactPlacer for RecordingPlacer {
    async fn choose_destination(
        &self,
        suggested_name: &str,
        allowed_extensions: &[&str],
    ) -> Option<PathBuf> {
        self.asked.lock().unwrap().push((
            suggested_name.to_string(),
            allowed_extensions.iter().map(|e| e.to_string()).collect(),
        ));
        self.inner
            .choose_destination(suggested_name, allowed_extensions)
            .await
    }
}

/// Never answers the save prompt
struct HangingPlacer;

#[async_trait]
impl ArtifactPlacer for HangingPlacer {
    async fn choose_destination(&self, _suggested: &str, _allowed: &[&str]) -> Option<PathBuf> {
        futures::future::pending().await
    }
}

struct Fixture {
    temp_root: TempDir,
    output: TempDir,
    config: DownloaderConfig,
}

impl Fixture {
    fn new() -> Self {
        let temp_root = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let config = DownloaderConfig::default()
            .with_temp_root(Some(temp_root.path().to_path_buf()))
            .with_download_dir(output.path().to_path_buf())
            .with_stall_timeout(30);
        Self {
            temp_root,
            output,
            config,
        }
    }

    fn with_ffmpeg(mut self, path: PathBuf) -> Self {
        self.config = self.config.with_ffmpeg_path(Some(path));
        self
    }

    fn workspaces_left(&self) -> usize {
        std::fs::read_dir(self.temp_root.path()).unwrap().count()
    }

    fn output_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.output.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }
}

fn rick() -> VideoId {
    VideoId::parse("https://www.youtube.com/watch?v=dQw4w9WgXcQ").unwrap()
}

/// Shell script in place of ffmpeg; `$2`/`$4` are inputs, `$11` the output
#[cfg(unix)]
fn fake_ffmpeg(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("ffmpeg");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

async fn collect(mut events: tokio::sync::mpsc::UnboundedReceiver<PipelineEvent>) -> Vec<PipelineEvent> {
    let mut out = Vec::new();
    while let Some(event) = events.recv().await {
        out.push(event);
    }
    out
}

fn stages(events: &[PipelineEvent]) -> Vec<PipelineStage> {
    events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::Stage { stage } => Some(*stage),
            _ => None,
        })
        .collect()
}

fn progress_of(events: &[PipelineEvent], kind: StreamKind) -> Vec<f32> {
    events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::Progress(p) if p.kind == kind => Some(p.fraction),
            _ => None,
        })
        .collect()
}

fn finished(events: &[PipelineEvent]) -> Vec<&DownloadStatus> {
    events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::Finished { outcome } => Some(outcome),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_audio_only_end_to_end() {
    let fx = Fixture::new();
    let client = FakeClient::new();
    let placer = RecordingPlacer::new(fx.output.path());

    let pipeline = DownloadPipeline::new(client.clone(), placer.clone(), fx.config.clone());
    let mut handle = pipeline.run(DownloadRequest::audio_only(rick(), audio_140()));
    let events = handle.events().unwrap();
    let audio_progress = handle.progress(StreamKind::Audio);

    let path = handle.wait().await.unwrap();
    let events = collect(events).await;

    let expected = fx.output.path().join("Never Gonna Give You Up.mp3");
    assert_eq!(path, expected);
    assert_eq!(std::fs::read(&expected).unwrap(), b"AUDIO-BYTES");

    // One fetch, no merge
    assert_eq!(client.opened(), vec!["140".to_string()]);
    assert_eq!(
        stages(&events),
        vec![
            PipelineStage::ResolvingFormats,
            PipelineStage::Fetching,
            PipelineStage::Placing,
            PipelineStage::Succeeded,
        ]
    );

    let asked = placer.asked.lock().unwrap().clone();
    assert_eq!(
        asked,
        vec![(
            "Never Gonna Give You Up.mp3".to_string(),
            vec!["mp3".to_string(), "wav".to_string()]
        )]
    );

    assert_eq!(*audio_progress.borrow(), 1.0);
    assert_eq!(
        finished(&events),
        vec![&DownloadStatus::Succeeded { path: expected }]
    );
    assert_eq!(fx.workspaces_left(), 0);
}

#[tokio::test]
async fn test_progress_is_non_decreasing_and_completes() {
    let fx = Fixture::new();
    let pipeline = DownloadPipeline::new(
        FakeClient::new(),
        Arc::new(DirectoryPlacer::new(fx.output.path())),
        fx.config.clone(),
    );
    let mut handle = pipeline.run(DownloadRequest::audio_only(rick(), audio_140()));
    let events = handle.events().unwrap();
    handle.wait().await.unwrap();

    let progress = progress_of(&collect(events).await, StreamKind::Audio);
    assert!(!progress.is_empty());
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert!(progress.iter().all(|p| (0.0..=1.0).contains(p)));
    assert_eq!(progress.last(), Some(&1.0));
}

#[tokio::test]
async fn test_dismissed_save_prompt() {
    let fx = Fixture::new();
    let pipeline = DownloadPipeline::new(FakeClient::new(), Arc::new(DismissingPlacer), fx.config.clone());

    let mut handle = pipeline.run(DownloadRequest::audio_only(rick(), audio_140()));
    let events = handle.events().unwrap();
    let err = handle.wait().await.unwrap_err();

    assert!(matches!(err, DownloadError::SaveCanceled));
    assert!(err.is_user_initiated());
    assert!(fx.output_files().is_empty());
    assert_eq!(fx.workspaces_left(), 0);

    let events = collect(events).await;
    assert_eq!(finished(&events).len(), 1);
}

#[tokio::test]
async fn test_unknown_selection_fails_before_stream_io() {
    let fx = Fixture::new();
    let client = FakeClient::new();
    let pipeline = DownloadPipeline::new(
        client.clone(),
        Arc::new(DirectoryPlacer::new(fx.output.path())),
        fx.config.clone(),
    );

    let gone = StreamDescriptor::audio("999", "webm", 160, "https://cdn.example/999");
    let err = pipeline
        .run(DownloadRequest::audio_only(rick(), gone))
        .wait()
        .await
        .unwrap_err();

    assert!(matches!(err, DownloadError::FormatNotFound(_)));
    assert!(client.opened().is_empty());
    assert_eq!(fx.workspaces_left(), 0);
}

#[tokio::test]
async fn test_muxed_stream_is_not_selectable() {
    // Format 18 carries audio, so the catalog drops it
    let fx = Fixture::new();
    let client = FakeClient::new();
    let pipeline = DownloadPipeline::new(
        client.clone(),
        Arc::new(DirectoryPlacer::new(fx.output.path())),
        fx.config.clone(),
    );

    let muxed = StreamDescriptor::video("18", "360p", "mp4", 500, false, "https://cdn.example/18");
    let err = pipeline
        .run(DownloadRequest::video_and_audio(rick(), muxed, audio_140()))
        .wait()
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "format_not_found");
    assert!(client.opened().is_empty());
}

#[tokio::test]
async fn test_cancel_during_fetch() {
    let fx = Fixture::new();
    let client = FakeClient::stalling("137");
    let pipeline = DownloadPipeline::new(
        client.clone(),
        Arc::new(DirectoryPlacer::new(fx.output.path())),
        fx.config.clone(),
    );

    let mut handle = pipeline.run(DownloadRequest::video_and_audio(rick(), video_137(), audio_140()));
    let mut stage = handle.stage_updates();
    stage
        .wait_for(|s| *s == PipelineStage::Fetching)
        .await
        .unwrap();
    let events = handle.events().unwrap();

    handle.cancel();
    let err = handle.wait().await.unwrap_err();
    let events = collect(events).await;

    assert!(matches!(err, DownloadError::Canceled));
    assert!(!stages(&events).contains(&PipelineStage::Merging));
    assert_eq!(finished(&events), vec![&DownloadStatus::Canceled]);
    assert!(fx.output_files().is_empty());
    assert_eq!(fx.workspaces_left(), 0);
}

#[tokio::test]
async fn test_cancel_after_completion_is_noop() {
    let fx = Fixture::new();
    let pipeline = DownloadPipeline::new(
        FakeClient::new(),
        Arc::new(DirectoryPlacer::new(fx.output.path())),
        fx.config.clone(),
    );

    let handle = pipeline.run(DownloadRequest::audio_only(rick(), audio_140()));
    let mut stage = handle.stage_updates();
    stage.wait_for(|s| s.is_terminal()).await.unwrap();

    handle.cancel();
    assert_eq!(handle.stage(), PipelineStage::Succeeded);
    assert!(handle.wait().await.is_ok());
}

#[cfg(unix)]
#[tokio::test]
async fn test_video_and_audio_merges_and_cleans_up() {
    let bin = tempfile::tempdir().unwrap();
    let ffmpeg = fake_ffmpeg(bin.path(), "cat \"$2\" \"$4\" > \"${11}\"");
    let fx = Fixture::new().with_ffmpeg(ffmpeg);
    let client = FakeClient::new();

    let pipeline = DownloadPipeline::new(
        client.clone(),
        Arc::new(DirectoryPlacer::new(fx.output.path())),
        fx.config.clone(),
    );
    let mut handle = pipeline.run(DownloadRequest::video_and_audio(rick(), video_137(), audio_140()));
    let events = handle.events().unwrap();
    let video_progress = handle.progress(StreamKind::Video);

    let path = handle.wait().await.unwrap();
    let events = collect(events).await;

    assert_eq!(path, fx.output.path().join("Never Gonna Give You Up.mp4"));
    assert_eq!(std::fs::read(&path).unwrap(), b"VIDEO-BYTESAUDIO-BYTES");

    let mut opened = client.opened();
    opened.sort();
    assert_eq!(opened, vec!["137".to_string(), "140".to_string()]);

    assert!(stages(&events).contains(&PipelineStage::Merging));
    assert_eq!(*video_progress.borrow(), 1.0);
    assert_eq!(fx.output_files(), vec!["Never Gonna Give You Up.mp4".to_string()]);
    assert_eq!(fx.workspaces_left(), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_ffmpeg_failure_reports_exit_code() {
    let bin = tempfile::tempdir().unwrap();
    let ffmpeg = fake_ffmpeg(bin.path(), "echo 'Invalid data found when processing input' >&2\nexit 1");
    let fx = Fixture::new().with_ffmpeg(ffmpeg);

    let pipeline = DownloadPipeline::new(
        FakeClient::new(),
        Arc::new(DirectoryPlacer::new(fx.output.path())),
        fx.config.clone(),
    );
    let mut handle = pipeline.run(DownloadRequest::video_and_audio(rick(), video_137(), audio_140()));
    let events = handle.events().unwrap();

    let err = handle.wait().await.unwrap_err();
    let events = collect(events).await;

    assert!(matches!(err, DownloadError::MuxFailed(1)));
    match finished(&events).as_slice() {
        [DownloadStatus::Failed { kind, .. }] => assert_eq!(kind, "mux_failed"),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(fx.output_files().is_empty());
    assert_eq!(fx.workspaces_left(), 0);
}

#[tokio::test]
async fn test_refused_stream_aborts_sibling_fetch() {
    let fx = Fixture::new();
    // Video hangs until aborted; stall timeout is 30s
    let client = FakeClient::build(vec!["137"], vec!["140"]);
    let pipeline = DownloadPipeline::new(
        client.clone(),
        Arc::new(DirectoryPlacer::new(fx.output.path())),
        fx.config.clone(),
    );

    let mut handle = pipeline.run(DownloadRequest::video_and_audio(rick(), video_137(), audio_140()));
    let events = handle.events().unwrap();
    let err = tokio::time::timeout(Duration::from_secs(5), handle.wait())
        .await
        .expect("sibling fetch was not aborted")
        .unwrap_err();
    let events = collect(events).await;

    assert!(matches!(err, DownloadError::StreamUnavailable(_)));
    let mut opened = client.opened();
    opened.sort();
    assert_eq!(opened, vec!["137".to_string(), "140".to_string()]);

    assert!(!stages(&events).contains(&PipelineStage::Merging));
    match finished(&events).as_slice() {
        [DownloadStatus::Failed { kind, .. }] => assert_eq!(kind, "stream_unavailable"),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(fx.output_files().is_empty());
    assert_eq!(fx.workspaces_left(), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_cancel_during_merge() {
    let bin = tempfile::tempdir().unwrap();
    let ffmpeg = fake_ffmpeg(bin.path(), "exec sleep 30");
    let fx = Fixture::new().with_ffmpeg(ffmpeg);

    let pipeline = DownloadPipeline::new(
        FakeClient::new(),
        Arc::new(DirectoryPlacer::new(fx.output.path())),
        fx.config.clone(),
    );
    let mut handle = pipeline.run(DownloadRequest::video_and_audio(rick(), video_137(), audio_140()));
    let events = handle.events().unwrap();
    let mut stage = handle.stage_updates();
    stage
        .wait_for(|s| *s == PipelineStage::Merging)
        .await
        .unwrap();

    handle.cancel();
    let err = tokio::time::timeout(Duration::from_secs(5), handle.wait())
        .await
        .expect("ffmpeg was not stopped")
        .unwrap_err();
    let events = collect(events).await;

    assert!(matches!(err, DownloadError::Canceled));
    assert!(stages(&events).contains(&PipelineStage::Merging));
    assert!(!stages(&events).contains(&PipelineStage::Placing));
    assert_eq!(finished(&events), vec![&DownloadStatus::Canceled]);
    assert!(fx.output_files().is_empty());
    assert_eq!(fx.workspaces_left(), 0);
}

#[tokio::test]
async fn test_cancel_while_save_prompt_is_open() {
    let fx = Fixture::new();
    let pipeline = DownloadPipeline::new(FakeClient::new(), Arc::new(HangingPlacer), fx.config.clone());

    let mut handle = pipeline.run(DownloadRequest::audio_only(rick(), audio_140()));
    let events = handle.events().unwrap();
    let mut stage = handle.stage_updates();
    stage
        .wait_for(|s| *s == PipelineStage::Placing)
        .await
        .unwrap();

    handle.cancel();
    let err = tokio::time::timeout(Duration::from_secs(5), handle.wait())
        .await
        .expect("run kept waiting on the save prompt")
        .unwrap_err();
    let events = collect(events).await;

    assert!(matches!(err, DownloadError::Canceled));
    assert_eq!(finished(&events), vec![&DownloadStatus::Canceled]);
    assert!(fx.output_files().is_empty());
    assert_eq!(fx.workspaces_left(), 0);
}

#[tokio::test]
async fn test_placement_failure_leaves_no_partial_file() {
    let fx = Fixture::new();
    // A directory squatting on the target name makes the final rename fail
    let blocker = "Never Gonna Give You Up.mp3";
    std::fs::create_dir(fx.output.path().join(blocker)).unwrap();

    let pipeline = DownloadPipeline::new(
        FakeClient::new(),
        Arc::new(DirectoryPlacer::new(fx.output.path())),
        fx.config.clone(),
    );
    let mut handle = pipeline.run(DownloadRequest::audio_only(rick(), audio_140()));
    let events = handle.events().unwrap();
    let err = handle.wait().await.unwrap_err();
    let events = collect(events).await;

    assert_eq!(err.kind(), "workspace_io");
    assert!(!err.is_user_initiated());
    match finished(&events).as_slice() {
        [DownloadStatus::Failed { kind, .. }] => assert_eq!(kind, "workspace_io"),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(fx.output_files(), vec![blocker.to_string()]);
    assert!(fx.output.path().join(blocker).is_dir());
    assert_eq!(fx.workspaces_left(), 0);
}
