use axum::http::StatusCode;
use std::sync::Arc;
use tracing::Instrument;

use crate::extractors::{ExtractorError, VideoSource};
use crate::models::{NewTutorial, Tutorial, TutorialStatus};
use crate::parser::{ParseError, RecipeParser};
use crate::store::{StoreError, TutorialStore};
use crate::transcribe::{TranscriptionError, Transcriber};

/// Terminal failures of a transcribe request
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("invalid request body: {0}")]
    InvalidBody(String),

    #[error("invalid TikTok URL: {0}")]
    InvalidUrl(String),

    #[error("audio extraction failed: {0}")]
    Extraction(#[from] ExtractorError),

    #[error("transcription failed: {0}")]
    Transcription(#[from] TranscriptionError),

    #[error("parsing failed: {0}")]
    Parsing(#[from] ParseError),

    #[error("not a sound design tutorial: {title}")]
    NotSoundDesign { title: String },

    #[error("failed to save creator: {0}")]
    SaveCreator(#[source] StoreError),

    #[error("failed to save tutorial: {0}")]
    SaveTutorial(#[source] StoreError),
}

impl PipelineError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PipelineError::InvalidBody(_)
            | PipelineError::InvalidUrl(_)
            | PipelineError::NotSoundDesign { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to the caller
    pub fn public_message(&self) -> &'static str {
        match self {
            PipelineError::InvalidBody(_) => "Invalid request body",
            PipelineError::InvalidUrl(_) => "Invalid TikTok URL",
            PipelineError::Extraction(_) => "Failed to extract audio from TikTok",
            PipelineError::Transcription(_) => "Failed to transcribe audio",
            PipelineError::Parsing(_) => "Failed to parse transcription",
            PipelineError::NotSoundDesign { .. } => {
                "This video doesn't appear to be a sound design tutorial"
            }
            PipelineError::SaveCreator(_) => "Failed to save creator",
            PipelineError::SaveTutorial(_) => "Failed to save tutorial",
        }
    }
}

/// Successful end states of a transcribe request
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// Newly transcribed and saved
    Created(Tutorial),
    /// Already processed; returned as stored
    Existing(Tutorial),
}

/// Removes a video's temp files when dropped
struct TempAudio<'a> {
    source: &'a dyn VideoSource,
    video_id: String,
}

impl Drop for TempAudio<'_> {
    fn drop(&mut self) {
        self.source.cleanup(&self.video_id);
    }
}

/// URL → audio → transcription → recipe → stored tutorial
#[derive(Clone)]
pub struct RecipePipeline {
    source: Arc<dyn VideoSource>,
    transcriber: Arc<dyn Transcriber>,
    parser: Arc<dyn RecipeParser>,
    store: Arc<dyn TutorialStore>,
}

impl RecipePipeline {
    pub fn new(
        source: Arc<dyn VideoSource>,
        transcriber: Arc<dyn Transcriber>,
        parser: Arc<dyn RecipeParser>,
        store: Arc<dyn TutorialStore>,
    ) -> Self {
        Self {
            source,
            transcriber,
            parser,
            store,
        }
    }

    /// Run the full pipeline for one URL
    pub async fn run(&self, url: &str) -> Result<PipelineOutcome, PipelineError> {
        let span = tracing::info_span!("transcribe", request_id = %uuid::Uuid::new_v4());
        self.run_inner(url).instrument(span).await
    }

    async fn run_inner(&self, url: &str) -> Result<PipelineOutcome, PipelineError> {
        if !self.source.validate(url) {
            return Err(PipelineError::InvalidUrl(url.to_string()));
        }

        tracing::info!("Processing {} URL: {}", self.source.platform_name(), url);

        tracing::info!("Step 1: Extracting audio...");
        let video = self.source.extract_audio(url).await?;
        let _temp_audio = TempAudio {
            source: self.source.as_ref(),
            video_id: video.video_id.clone(),
        };

        tracing::info!(
            "Extracted video: ID={}, Creator={}",
            video.video_id,
            video.creator_handle
        );

        match self.store.get_tutorial_by_video_id(&video.video_id).await {
            Ok(Some(existing)) => {
                tracing::info!("Tutorial already exists: {}", existing.id);
                return Ok(PipelineOutcome::Existing(existing));
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Database error checking existing tutorial: {:#}", e),
        }

        tracing::info!("Step 2: Transcribing audio...");
        let transcription = self.transcriber.transcribe(&video.audio_path).await?;
        tracing::info!("Transcription complete: {} characters", transcription.len());

        tracing::info!("Step 3: Parsing transcription...");
        let recipe = self.parser.parse(&transcription, &video.creator_name).await?;
        tracing::info!(
            "Parsed recipe: Title={}, SoundType={}, IsSoundDesign={}",
            recipe.title,
            recipe.sound_type,
            recipe.is_sound_design
        );

        if !recipe.is_sound_design {
            return Err(PipelineError::NotSoundDesign {
                title: recipe.title,
            });
        }

        tracing::info!("Step 4: Saving to database...");
        let creator = self
            .store
            .get_or_create_creator(&video.creator_handle, &video.creator_name)
            .await
            .map_err(PipelineError::SaveCreator)?;

        let now = chrono::Utc::now();
        let saved = self
            .store
            .create_tutorial(NewTutorial {
                creator_id: creator.id,
                tiktok_url: url.to_string(),
                tiktok_video_id: video.video_id.clone(),
                title: recipe.title.clone(),
                sound_type: recipe.sound_type.clone(),
                raw_transcription: transcription,
                status: TutorialStatus::Pending,
                created_at: now,
                updated_at: now,
            })
            .await
            .map_err(PipelineError::SaveTutorial)?;

        if let Err(e) = self
            .store
            .create_instructions(saved.id, &recipe.instructions)
            .await
        {
            // tutorial is already durable
            tracing::warn!("Failed to create instructions: {:#}", e);
        }

        tracing::info!("Tutorial saved successfully: ID={}", saved.id);

        let mut complete = match self.store.get_tutorial_with_instructions(saved.id).await {
            Ok(tutorial) => tutorial,
            Err(e) => {
                tracing::warn!("Failed to reload tutorial {}: {:#}", saved.id, e);
                saved
            }
        };
        complete.creator = Some(creator);

        Ok(PipelineOutcome::Created(complete))
    }
}
