use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A TikTok content creator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Creator {
    pub id: Uuid,

    pub tiktok_handle: String,

    pub display_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,

    /// Whether the creator has claimed their profile
    pub is_claimed: bool,

    pub created_at: DateTime<Utc>,
}

/// Moderation state of a tutorial. Transitions happen outside this service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TutorialStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

/// A transcribed TikTok video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tutorial {
    pub id: Uuid,

    pub creator_id: Uuid,

    pub tiktok_url: String,

    /// Source video ID; unique per tutorial
    pub tiktok_video_id: String,

    pub title: String,

    /// Category of sound (bass, lead, pad, ...)
    pub sound_type: String,

    pub raw_transcription: String,

    #[serde(default)]
    pub status: TutorialStatus,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    /// Populated on fetch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<Creator>,

    /// Populated on fetch
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub instructions: Vec<Instruction>,
}

/// A single step in a sound design recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub id: Uuid,

    pub tutorial_id: Uuid,

    /// 1-based, caller supplied
    pub step_number: u32,

    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ableton_device: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<HashMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_url: Option<String>,
}

/// Insert payload for the `creators` resource
#[derive(Debug, Clone, Serialize)]
pub struct NewCreator {
    pub tiktok_handle: String,
    pub display_name: String,
    pub is_claimed: bool,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for the `tutorials` resource
#[derive(Debug, Clone, Serialize)]
pub struct NewTutorial {
    pub creator_id: Uuid,
    pub tiktok_url: String,
    pub tiktok_video_id: String,
    pub title: String,
    pub sound_type: String,
    pub raw_transcription: String,
    pub status: TutorialStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for the `instructions` resource
#[derive(Debug, Clone, Serialize)]
pub struct NewInstruction<'a> {
    pub tutorial_id: Uuid,
    pub step_number: u32,
    pub description: &'a str,
    pub ableton_device: Option<&'a str>,
    pub parameters: Option<&'a HashMap<String, String>>,
    pub notes: Option<&'a str>,
}

impl<'a> NewInstruction<'a> {
    pub fn from_step(tutorial_id: Uuid, step: &'a RecipeStep) -> Self {
        Self {
            tutorial_id,
            step_number: step.step_number,
            description: &step.description,
            ableton_device: step.ableton_device.as_deref(),
            parameters: step.parameters.as_ref(),
            notes: step.notes.as_deref(),
        }
    }
}

/// Structured recipe returned by the language model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub title: String,

    pub sound_type: String,

    pub creator_name: String,

    /// Advisory relevance flag; false when the video is not a sound design tutorial
    pub is_sound_design: bool,

    pub instructions: Vec<RecipeStep>,
}

/// A single step as produced by the language model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeStep {
    pub step_number: u32,

    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ableton_device: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<HashMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Body of `POST /api/transcribe`
#[derive(Debug, Clone, Deserialize)]
pub struct TranscribeRequest {
    pub url: String,
}

/// Response envelope for `POST /api/transcribe`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscribeResponse {
    pub success: bool,

    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tutorial: Option<Tutorial>,
}

impl TranscribeResponse {
    pub fn ok(message: impl Into<String>, tutorial: Tutorial) -> Self {
        Self {
            success: true,
            message: message.into(),
            tutorial: Some(tutorial),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            tutorial: None,
        }
    }
}
