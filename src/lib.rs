//! Recipe Scribe - turns TikTok sound design tutorials into stored recipes
//!
//! A single HTTP request drives the whole pipeline: the video's audio is pulled with
//! yt-dlp, transcribed with a Whisper-compatible API, parsed into ordered Ableton
//! instructions by Claude, and saved to Supabase through its REST interface.

pub mod cli;
pub mod config;
pub mod extractors;
pub mod models;
pub mod parser;
pub mod pipeline;
pub mod server;
pub mod store;
pub mod transcribe;
pub mod utils;

pub use cli::{Cli, Commands, LogFormat};
pub use config::{Config, ConfigError};
pub use extractors::{TikTokExtractor, VideoInfo, VideoSource};
pub use models::{Creator, Instruction, Recipe, RecipeStep, Tutorial, TutorialStatus};
pub use parser::{ClaudeParser, RecipeParser};
pub use pipeline::{PipelineError, PipelineOutcome, RecipePipeline};
pub use server::AppState;
pub use store::{SupabaseStore, TutorialStore};
pub use transcribe::{Transcriber, WhisperTranscriber};
