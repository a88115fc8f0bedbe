pub mod downloader;
pub mod logging;

pub use downloader::{
    DownloadError, DownloadPipeline, DownloadRequest, DownloaderConfig, FormatCatalog,
    PipelineHandle, VideoId,
};
