use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;
use tokio::process::Command;

use super::{ExtractorError, VideoInfo, VideoSource};

/// Accepted TikTok URL shapes, anchored at the start of the URL
static URL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^https?://(www\.)?tiktok\.com/@[\w.-]+/video/\d+",
        r"^https?://vm\.tiktok\.com/\w+",
        r"^https?://(www\.)?tiktok\.com/t/\w+",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("static URL pattern"))
    .collect()
});

static VIDEO_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/video/(\d+)").expect("static video ID pattern"));

/// Subset of `yt-dlp --dump-json` we rely on
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    uploader: String,
    #[serde(default)]
    uploader_id: String,
}

/// TikTok audio extractor using yt-dlp
pub struct TikTokExtractor {
    yt_dlp_path: String,
    temp_dir: PathBuf,
}

impl TikTokExtractor {
    /// Create an extractor writing into `temp_dir`, creating it if needed
    pub fn new(yt_dlp_path: impl Into<String>, temp_dir: impl Into<PathBuf>) -> Self {
        let temp_dir = temp_dir.into();
        if let Err(e) = fs_err::create_dir_all(&temp_dir) {
            tracing::warn!("Could not create temp directory: {}", e);
        }

        Self {
            yt_dlp_path: yt_dlp_path.into(),
            temp_dir,
        }
    }

    /// Default download directory under the system temp dir
    pub fn default_temp_dir() -> PathBuf {
        std::env::temp_dir().join("sdr-downloads")
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Human-readable list of accepted URL shapes
    pub fn supported_shapes() -> &'static [&'static str] {
        &[
            "https://www.tiktok.com/@<handle>/video/<id>",
            "https://vm.tiktok.com/<code>",
            "https://www.tiktok.com/t/<code>",
        ]
    }

    /// Video ID embedded in a direct video URL. Short links resolve during download.
    pub fn extract_video_id(url: &str) -> Option<String> {
        VIDEO_ID
            .captures(url)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }

    /// Local path of the mp3 produced for a video
    pub fn audio_path(&self, video_id: &str) -> PathBuf {
        self.temp_dir.join(format!("{}.mp3", video_id))
    }

    /// Get video information using yt-dlp without downloading
    async fn get_video_info(&self, url: &str) -> Result<YtDlpInfo, ExtractorError> {
        tracing::debug!("Extracting video info for: {}", url);

        let output = Command::new(&self.yt_dlp_path)
            .args(["--dump-json", "--no-download", url])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| ExtractorError::Spawn {
                tool: self.yt_dlp_path.clone(),
                source,
            })?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractorError::Metadata(error.trim().to_string()));
        }

        parse_video_info(&output.stdout)
    }

    /// Download and transcode the audio track to `<temp_dir>/<id>.mp3`
    async fn download_audio(&self, url: &str) -> Result<(), ExtractorError> {
        let output_template = self.temp_dir.join("%(id)s.%(ext)s");

        let output = Command::new(&self.yt_dlp_path)
            .args(["-x", "--audio-format", "mp3", "--audio-quality", "0", "-o"])
            .arg(&output_template)
            .arg(url)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| ExtractorError::Spawn {
                tool: self.yt_dlp_path.clone(),
                source,
            })?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractorError::Download(error.trim().to_string()));
        }

        Ok(())
    }
}

fn parse_video_info(stdout: &[u8]) -> Result<YtDlpInfo, ExtractorError> {
    let info: YtDlpInfo = serde_json::from_slice(stdout)
        .map_err(|e| ExtractorError::MalformedMetadata(e.to_string()))?;

    if info.id.trim().is_empty() {
        return Err(ExtractorError::MalformedMetadata("missing video id".to_string()));
    }

    Ok(info)
}

#[async_trait]
impl VideoSource for TikTokExtractor {
    fn validate(&self, url: &str) -> bool {
        URL_PATTERNS.iter().any(|pattern| pattern.is_match(url))
    }

    async fn extract_audio(&self, url: &str) -> Result<VideoInfo, ExtractorError> {
        match Self::extract_video_id(url) {
            Some(video_id) => tracing::debug!("Fetching TikTok video {}", video_id),
            None => tracing::debug!("Resolving TikTok short link {}", url),
        }

        let info = self.get_video_info(url).await?;

        if let Err(e) = self.download_audio(url).await {
            self.cleanup(&info.id);
            return Err(e);
        }

        let creator_handle = info
            .uploader_id
            .strip_prefix('@')
            .unwrap_or(&info.uploader_id)
            .to_string();

        Ok(VideoInfo {
            audio_path: self.audio_path(&info.id),
            video_id: info.id,
            creator_name: info.uploader,
            creator_handle,
            title: info.title,
        })
    }

    fn cleanup(&self, video_id: &str) {
        let prefix = format!("{}.", video_id);
        let entries = match fs_err::read_dir(&self.temp_dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!("Skipping cleanup for {}: {}", video_id, e);
                return;
            }
        };

        for entry in entries.flatten() {
            let name = entry.file_name();
            if name.to_string_lossy().starts_with(&prefix) {
                if let Err(e) = fs_err::remove_file(entry.path()) {
                    tracing::debug!("Failed to remove temp file: {}", e);
                }
            }
        }
    }

    fn platform_name(&self) -> &'static str {
        "TikTok"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor(dir: &Path) -> TikTokExtractor {
        TikTokExtractor::new("yt-dlp", dir)
    }

    #[test]
    fn test_validate_accepts_known_shapes() {
        let dir = tempfile::tempdir().unwrap();
        let ex = extractor(dir.path());

        for url in [
            "https://www.tiktok.com/@producer/video/7312345678901234567",
            "https://tiktok.com/@beat.maker-99/video/123",
            "http://www.tiktok.com/@x_y/video/42?is_from_webapp=1",
            "https://vm.tiktok.com/ZMabc123/",
            "http://vm.tiktok.com/ZM8",
            "https://www.tiktok.com/t/ZT8abcd/",
            "https://tiktok.com/t/abc",
        ] {
            assert!(ex.validate(url), "expected valid: {}", url);
        }
    }

    #[test]
    fn test_validate_rejects_near_misses() {
        let dir = tempfile::tempdir().unwrap();
        let ex = extractor(dir.path());

        for url in [
            // direct video path
            "https://www.tiktok.com/@producer/video/",
            "https://www.tiktok.com/@producer/video/abc",
            "https://www.tiktok.com/producer/video/123",
            "ftp://www.tiktok.com/@producer/video/123",
            "https://m.tiktok.com/@producer/video/123",
            // vm short link
            "https://vm.tiktok.com/",
            "https://vm.tiktok.co/ZMabc",
            // /t/ short link
            "https://www.tiktok.com/t/",
            "https://www.tiktok.com/tt/abc",
            // not anchored
            "see https://www.tiktok.com/t/abc",
            "https://www.youtube.com/watch?v=abc",
            "",
        ] {
            assert!(!ex.validate(url), "expected invalid: {}", url);
        }
    }

    #[test]
    fn test_extract_video_id() {
        assert_eq!(
            TikTokExtractor::extract_video_id("https://www.tiktok.com/@producer/video/7312345678901234567?lang=en"),
            Some("7312345678901234567".to_string())
        );
        assert_eq!(TikTokExtractor::extract_video_id("https://vm.tiktok.com/ZMabc123/"), None);
    }

    #[test]
    fn test_parse_video_info() {
        let info = parse_video_info(
            br#"{"id":"731","title":"Reese","uploader":"Producer","uploader_id":"@producer","duration":12}"#,
        )
        .unwrap();
        assert_eq!(info.id, "731");
        assert_eq!(info.uploader_id, "@producer");

        assert!(matches!(
            parse_video_info(b"not json"),
            Err(ExtractorError::MalformedMetadata(_))
        ));
        assert!(matches!(
            parse_video_info(br#"{"id":"","title":"x"}"#),
            Err(ExtractorError::MalformedMetadata(_))
        ));
    }

    #[test]
    fn test_cleanup_removes_only_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        let ex = extractor(dir.path());

        fs_err::write(dir.path().join("731.mp3"), b"a").unwrap();
        fs_err::write(dir.path().join("731.webm"), b"b").unwrap();
        fs_err::write(dir.path().join("7310.mp3"), b"c").unwrap();
        fs_err::write(dir.path().join("999.mp3"), b"d").unwrap();

        ex.cleanup("731");

        assert!(!dir.path().join("731.mp3").exists());
        assert!(!dir.path().join("731.webm").exists());
        assert!(dir.path().join("7310.mp3").exists());
        assert!(dir.path().join("999.mp3").exists());
    }

    #[test]
    fn test_cleanup_ignores_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let ex = extractor(&dir.path().join("nested"));
        fs_err::remove_dir(ex.temp_dir()).unwrap();

        ex.cleanup("731");
    }

    /// Stand-in for yt-dlp: prints fixed metadata, then writes (or fails to write) the audio
    #[cfg(unix)]
    fn fake_yt_dlp(bin_dir: &Path, download_fails: bool) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let download = if download_fails {
            "touch \"$(dirname \"$out\")/731.mp3.part\"\necho 'ERROR: unable to download video data' >&2\nexit 1"
        } else {
            "touch \"$(printf '%s' \"$out\" | sed 's/%(id)s/731/; s/%(ext)s/mp3/')\""
        };
        let script = format!(
            r#"#!/bin/sh
if [ "$1" = "--dump-json" ]; then
  echo '{{"id":"731","title":"reese bass tutorial","uploader":"Bass Wizard","uploader_id":"@bass.wizard"}}'
  exit 0
fi
out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "-o" ]; then out="$2"; fi
  shift
done
{}
"#,
            download
        );

        let path = bin_dir.join("yt-dlp");
        fs_err::write(&path, script).unwrap();
        fs_err::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_extract_audio_strips_handle_prefix() {
        let bin = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_yt_dlp(bin.path(), false);
        let ex = TikTokExtractor::new(tool.to_string_lossy(), dir.path());

        let video = ex
            .extract_audio("https://www.tiktok.com/@bass.wizard/video/731")
            .await
            .unwrap();

        assert_eq!(video.video_id, "731");
        assert_eq!(video.creator_handle, "bass.wizard");
        assert_eq!(video.creator_name, "Bass Wizard");
        assert_eq!(video.title, "reese bass tutorial");
        assert_eq!(video.audio_path, dir.path().join("731.mp3"));
        assert!(video.audio_path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_download_leaves_no_partial_files() {
        let bin = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_yt_dlp(bin.path(), true);
        let ex = TikTokExtractor::new(tool.to_string_lossy(), dir.path());

        let err = ex
            .extract_audio("https://vm.tiktok.com/ZMabc123/")
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractorError::Download(ref msg) if msg.contains("unable to download")));
        let left: Vec<_> = fs_err::read_dir(dir.path()).unwrap().collect();
        assert!(left.is_empty(), "temp dir not empty: {:?}", left);
    }

    #[tokio::test]
    async fn test_extract_audio_fails_when_tool_missing() {
        let dir = tempfile::tempdir().unwrap();
        let ex = TikTokExtractor::new("definitely-not-a-real-yt-dlp", dir.path());

        let err = ex
            .extract_audio("https://www.tiktok.com/@producer/video/123")
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractorError::Spawn { .. }));
    }
}
