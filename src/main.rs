use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{ArgAction, Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing::{debug, warn};

use media_getter::downloader::backends::YtDlpClient;
use media_getter::downloader::placer::DirectoryPlacer;
use media_getter::downloader::tools::ToolManager;
use media_getter::downloader::utils::format_size;
use media_getter::downloader::{
    ArtifactPlacer, DownloadError, DownloadPipeline, DownloadRequest, DownloaderConfig,
    FormatCatalog, PipelineEvent, PipelineStage, Result, StreamDescriptor, StreamKind,
    VideoCatalog, VideoId,
};
use media_getter::logging;

#[derive(Parser, Debug)]
#[command(name = "media-getter", author, version, about, long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true, env = "MEDIA_GETTER_CONFIG")]
    config: Option<PathBuf>,

    /// Proxy URL for yt-dlp and stream downloads (e.g., socks5h://127.0.0.1:1080)
    #[arg(long, global = true)]
    proxy: Option<String>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search YouTube by keyword
    Search {
        query: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// List the downloadable streams of a video
    Formats { url: String },
    /// Download the selected streams and save the result
    Download {
        url: String,
        /// Audio stream number from `formats`
        #[arg(long)]
        audio: usize,
        /// Video stream number from `formats`
        #[arg(long)]
        video: Option<usize>,
        /// Save only the audio stream
        #[arg(long)]
        audio_only: bool,
        /// Target directory (defaults to the configured download directory)
        #[arg(long)]
        output: Option<PathBuf>,
        /// Pick the destination with a native save dialog
        #[arg(long)]
        dialog: bool,
    },
    /// Show yt-dlp and ffmpeg status
    Tools,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_user_initiated() => {
            eprintln!("{}", e);
            ExitCode::from(130)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = DownloaderConfig::load(cli.config.as_deref())?.with_proxy(cli.proxy);
    debug!("Config: {:?}", config);

    match cli.command {
        Command::Search { query, limit } => search(&config, &query, limit).await,
        Command::Formats { url } => formats(&config, &url).await,
        Command::Download {
            url,
            audio,
            video,
            audio_only,
            output,
            dialog,
        } => {
            let selection = Selection {
                audio,
                video: if audio_only { None } else { video },
            };
            download(&config, &url, selection, output, dialog).await
        }
        Command::Tools => {
            for tool in ToolManager::new(&config).get_all_tools().await {
                match tool.version {
                    Some(version) => println!("{:<8} {:<16} {}", tool.name, version, tool.path.display()),
                    None => println!("{:<8} {:<16} {}", tool.name, "not found", tool.path.display()),
                }
            }
            Ok(())
        }
    }
}

async fn search(config: &DownloaderConfig, query: &str, limit: usize) -> Result<()> {
    let catalog = FormatCatalog::new(Arc::new(YtDlpClient::new(config)?));
    let results = catalog.search(query, limit).await?;
    if results.is_empty() {
        println!("No results.");
    }
    for (i, hit) in results.iter().enumerate() {
        println!("{:>2}. {}", i + 1, hit.title);
        println!("    {}", hit.video_id.watch_url());
    }
    Ok(())
}

async fn formats(config: &DownloaderConfig, url: &str) -> Result<()> {
    let client = Arc::new(YtDlpClient::new(config)?);
    let video_id = VideoId::parse(url)?;
    let catalog = FormatCatalog::new(client.clone()).fetch(&video_id).await?;
    let thumbnail = FormatCatalog::verify_thumbnail(client.http(), &video_id).await;

    println!("{}", catalog.title);
    println!("Thumbnail: {}", thumbnail);

    println!("\nVideo streams:");
    for (i, s) in catalog.video_streams.iter().enumerate() {
        let size = format_size(s.content_length).unwrap_or_default();
        println!("  {:>2}. {:<28} {}", i + 1, s.display_label(), size);
    }
    println!("\nAudio streams:");
    for (i, s) in catalog.audio_streams.iter().enumerate() {
        let size = format_size(s.content_length).unwrap_or_default();
        println!("  {:>2}. {:<28} {}", i + 1, s.display_label(), size);
    }
    Ok(())
}

/// 1-based stream numbers as printed by `formats`
struct Selection {
    audio: usize,
    video: Option<usize>,
}

impl Selection {
    fn to_request(&self, catalog: &VideoCatalog) -> Result<DownloadRequest> {
        let pick = |streams: &[StreamDescriptor], n: usize, kind: StreamKind| {
            n.checked_sub(1)
                .and_then(|i| streams.get(i))
                .cloned()
                .ok_or_else(|| DownloadError::FormatNotFound(format!("{} stream #{}", kind, n)))
        };

        let audio = pick(&catalog.audio_streams, self.audio, StreamKind::Audio)?;
        match self.video {
            Some(n) => {
                let video = pick(&catalog.video_streams, n, StreamKind::Video)?;
                Ok(DownloadRequest::video_and_audio(catalog.video_id.clone(), video, audio))
            }
            None => Ok(DownloadRequest::audio_only(catalog.video_id.clone(), audio)),
        }
    }
}

fn placer_for(config: &DownloaderConfig, output: Option<PathBuf>, dialog: bool) -> Result<Arc<dyn ArtifactPlacer>> {
    if dialog {
        #[cfg(feature = "dialog")]
        {
            return Ok(Arc::new(media_getter::downloader::placer::DialogPlacer::new(
                output.or_else(|| Some(config.download_dir.clone())),
            )));
        }
        #[cfg(not(feature = "dialog"))]
        {
            return Err(DownloadError::InvalidConfig(
                "built without the `dialog` feature".to_string(),
            ));
        }
    }
    Ok(Arc::new(DirectoryPlacer::new(
        output.unwrap_or_else(|| config.download_dir.clone()),
    )))
}

fn progress_bar(multi: &MultiProgress, kind: StreamKind) -> ProgressBar {
    let style = ProgressStyle::with_template("{prefix:>6} [{bar:40.cyan/blue}] {percent:>3}%")
        .map(|s| s.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    let bar = multi.add(ProgressBar::new(1000));
    bar.set_style(style);
    bar.set_prefix(kind.to_string());
    bar
}

async fn download(
    config: &DownloaderConfig,
    url: &str,
    selection: Selection,
    output: Option<PathBuf>,
    dialog: bool,
) -> Result<()> {
    let placer = placer_for(config, output, dialog)?;
    let client = Arc::new(YtDlpClient::new(config)?);

    let video_id = VideoId::parse(url)?;
    let catalog = FormatCatalog::new(client.clone()).fetch(&video_id).await?;
    let request = selection.to_request(&catalog)?;
    println!("Downloading \"{}\"", catalog.title);

    let multi = MultiProgress::new();
    let video_bar = request.video.as_ref().map(|_| progress_bar(&multi, StreamKind::Video));
    let audio_bar = progress_bar(&multi, StreamKind::Audio);

    let pipeline = DownloadPipeline::new(client, placer, config.clone());
    let mut handle = pipeline.run(request);

    let cancel = handle.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, canceling download");
            cancel.cancel();
        }
    });

    let renderer = handle.events().map(|mut events| {
        let multi = multi.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    PipelineEvent::Progress(p) => {
                        let bar = match p.kind {
                            StreamKind::Video => video_bar.as_ref(),
                            StreamKind::Audio => Some(&audio_bar),
                        };
                        if let Some(bar) = bar {
                            bar.set_position((p.fraction * 1000.0) as u64);
                        }
                    }
                    PipelineEvent::Stage { stage: PipelineStage::Merging } => {
                        let _ = multi.println("Merging video and audio...");
                    }
                    PipelineEvent::Stage { .. } => {}
                    PipelineEvent::Finished { .. } => {
                        if let Some(bar) = &video_bar {
                            bar.abandon();
                        }
                        audio_bar.abandon();
                        break;
                    }
                }
            }
        })
    });

    let result = handle.wait().await;
    if let Some(task) = renderer {
        let _ = task.await;
    }
    let path = result?;
    println!("Saved to {}", path.display());
    Ok(())
}
