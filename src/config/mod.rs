use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::extractors::TikTokExtractor;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Speech-to-text provider
    pub transcription: TranscriptionConfig,

    /// Language model provider
    pub llm: LlmConfig,

    /// Supabase REST store
    pub store: StoreConfig,

    /// yt-dlp settings
    pub downloader: DownloaderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,

    /// Origins allowed by CORS
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
    pub max_tokens: u32,

    /// Accept recipe JSON wrapped in a markdown code fence
    pub lenient_json: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Project URL, without the `/rest/v1` suffix
    pub url: String,
    pub anon_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloaderConfig {
    pub yt_dlp_path: String,

    /// Directory for downloaded audio (defaults to `<tmp>/sdr-downloads`)
    pub temp_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            cors_origins: vec![
                "http://localhost:4200".to_string(),
                "http://localhost:3000".to_string(),
            ],
        }
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: crate::transcribe::DEFAULT_ENDPOINT.to_string(),
            model: crate::transcribe::DEFAULT_MODEL.to_string(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: crate::parser::DEFAULT_ENDPOINT.to_string(),
            model: crate::parser::DEFAULT_MODEL.to_string(),
            max_tokens: crate::parser::DEFAULT_MAX_TOKENS,
            lenient_json: false,
        }
    }
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            yt_dlp_path: "yt-dlp".to_string(),
            temp_dir: None,
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{0} is required")]
    MissingCredential(&'static str),

    #[error("invalid SUPABASE_URL {url:?}: {reason}")]
    InvalidStoreUrl { url: String, reason: String },

    #[error("invalid PORT {0:?}")]
    InvalidPort(String),
}

impl Config {
    /// Load configuration: defaults, then YAML file, then `.env` and environment.
    /// Credentials are checked separately by [`Config::validate`].
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };

        // Load .env file if it exists (development)
        dotenv_problem(dotenvy::dotenv());

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = fs_err::read_to_string(path).context("Failed to read config file")?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse config file")
    }

    /// Get configuration file path
    fn config_path() -> Option<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Some(local_config);
        }

        dirs::config_dir().map(|dir| dir.join("recipe-scribe").join("config.yaml"))
    }

    /// Override settings from environment variables; empty values are ignored
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(port) = get("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPort(port.clone()))?;
        }
        if let Some(key) = get("GROQ_API_KEY") {
            self.transcription.api_key = key;
        }
        if let Some(key) = get("CLAUDE_API_KEY") {
            self.llm.api_key = key;
        }
        if let Some(url) = get("SUPABASE_URL") {
            self.store.url = url;
        }
        if let Some(key) = get("SUPABASE_ANON_KEY") {
            self.store.anon_key = key;
        }
        if let Some(dir) = get("SDR_TEMP_DIR") {
            self.downloader.temp_dir = Some(PathBuf::from(dir));
        }
        if let Some(path) = get("YT_DLP_PATH") {
            self.downloader.yt_dlp_path = path;
        }

        Ok(())
    }

    /// Every provider credential must be present
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.transcription.api_key.is_empty() {
            return Err(ConfigError::MissingCredential("GROQ_API_KEY"));
        }
        if self.llm.api_key.is_empty() {
            return Err(ConfigError::MissingCredential("CLAUDE_API_KEY"));
        }
        if self.store.url.is_empty() {
            return Err(ConfigError::MissingCredential("SUPABASE_URL"));
        }
        if self.store.anon_key.is_empty() {
            return Err(ConfigError::MissingCredential("SUPABASE_ANON_KEY"));
        }

        let parsed = Url::parse(&self.store.url).map_err(|e| ConfigError::InvalidStoreUrl {
            url: self.store.url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidStoreUrl {
                url: self.store.url.clone(),
                reason: "must use HTTP or HTTPS".to_string(),
            });
        }

        Ok(())
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.downloader
            .temp_dir
            .clone()
            .unwrap_or_else(TikTokExtractor::default_temp_dir)
    }

    /// Display current configuration with secrets redacted
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  Port: {}", self.server.port);
        println!("  CORS Origins: {}", self.server.cors_origins.join(", "));
        println!("  Transcription: {} ({})", self.transcription.endpoint, self.transcription.model);
        println!("  Transcription Key: {}", redact(&self.transcription.api_key));
        println!("  LLM: {} ({}, {} tokens)", self.llm.endpoint, self.llm.model, self.llm.max_tokens);
        println!("  LLM Key: {}", redact(&self.llm.api_key));
        println!("  Lenient JSON: {}", self.llm.lenient_json);
        println!("  Supabase URL: {}", self.store.url);
        println!("  Supabase Key: {}", redact(&self.store.anon_key));
        println!("  yt-dlp: {}", self.downloader.yt_dlp_path);
        println!("  Temp Dir: {}", self.temp_dir().display());
    }
}

/// A missing `.env` is normal; anything else is logged and returned
fn dotenv_problem<T>(result: dotenvy::Result<T>) -> Option<dotenvy::Error> {
    match result {
        Err(e) if !e.not_found() => {
            tracing::debug!("Ignoring unreadable .env file: {}", e);
            Some(e)
        }
        _ => None,
    }
}

fn redact(secret: &str) -> String {
    if secret.is_empty() {
        return "(not set)".to_string();
    }
    if secret.chars().count() <= 8 {
        return "****".to_string();
    }
    let visible: String = secret.chars().take(4).collect();
    format!("{}****", visible)
}
