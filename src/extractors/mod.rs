use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod tiktok;

pub use tiktok::TikTokExtractor;

/// Metadata and local audio for a downloaded video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Platform-assigned video ID
    pub video_id: String,

    /// Uploader display name
    pub creator_name: String,

    /// Uploader handle without the leading `@`
    pub creator_handle: String,

    pub title: String,

    /// Local mp3 produced by the downloader
    pub audio_path: PathBuf,
}

#[derive(thiserror::Error, Debug)]
pub enum ExtractorError {
    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to get video info: {0}")]
    Metadata(String),

    #[error("failed to parse video info: {0}")]
    MalformedMetadata(String),

    #[error("failed to download audio: {0}")]
    Download(String),
}

/// Source of downloadable short-form videos
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VideoSource: Send + Sync {
    /// Syntactic check against the accepted URL shapes; no network access
    fn validate(&self, url: &str) -> bool;

    /// Fetch metadata and download the audio track to a local file
    async fn extract_audio(&self, url: &str) -> Result<VideoInfo, ExtractorError>;

    /// Best-effort removal of local files for a video
    fn cleanup(&self, video_id: &str);

    /// Get the name of this platform
    fn platform_name(&self) -> &'static str;
}
