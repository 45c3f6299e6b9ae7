use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::Recipe;

pub mod prompt;

/// Default Anthropic messages endpoint
pub const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

pub const DEFAULT_MAX_TOKENS: u32 = 2048;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    #[error("failed to send request: {0}")]
    Http(#[from] reqwest::Error),

    #[error("LLM API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("failed to parse LLM response: {0}")]
    InvalidResponse(#[source] serde_json::Error),

    #[error("empty response from LLM")]
    EmptyResponse,

    #[error("failed to parse recipe JSON: {source} (response: {text})")]
    InvalidRecipe {
        #[source]
        source: serde_json::Error,
        text: String,
    },
}

/// Extracts a structured recipe from a transcription
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecipeParser: Send + Sync {
    async fn parse(&self, transcription: &str, creator_name: &str) -> Result<Recipe, ParseError>;
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

/// Claude-backed recipe parser
#[derive(Clone)]
pub struct ClaudeParser {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
    max_tokens: u32,
    lenient_json: bool,
}

impl ClaudeParser {
    pub fn new(http: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            lenient_json: false,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>, max_tokens: u32) -> Self {
        self.model = model.into();
        self.max_tokens = max_tokens;
        self
    }

    /// Strip a surrounding markdown code fence before decoding
    pub fn with_lenient_json(mut self, lenient: bool) -> Self {
        self.lenient_json = lenient;
        self
    }
}

#[async_trait]
impl RecipeParser for ClaudeParser {
    async fn parse(&self, transcription: &str, creator_name: &str) -> Result<Recipe, ParseError> {
        let prompt = prompt::build_prompt(transcription, creator_name);

        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: vec![Message {
                role: "user",
                content: &prompt,
            }],
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(ParseError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let response: MessagesResponse =
            serde_json::from_str(&body).map_err(ParseError::InvalidResponse)?;

        let text = response
            .content
            .into_iter()
            .next()
            .map(|block| block.text)
            .ok_or(ParseError::EmptyResponse)?;

        decode_recipe(&text, self.lenient_json)
    }
}

/// Decode the model's text as a recipe. Only a code fence is tolerated, and only when lenient.
pub fn decode_recipe(text: &str, lenient: bool) -> Result<Recipe, ParseError> {
    let candidate = if lenient { strip_code_fence(text) } else { text };

    serde_json::from_str(candidate).map_err(|source| ParseError::InvalidRecipe {
        source,
        text: text.to_string(),
    })
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return text;
    };
    let Some(inner) = rest.strip_suffix("```") else {
        return text;
    };

    // drop the info string (e.g. `json`) on the opening line
    match inner.split_once('\n') {
        Some((_, body)) => body.trim(),
        None => inner.trim(),
    }
}
