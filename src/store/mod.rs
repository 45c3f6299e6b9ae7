//! Persistence gateway over the Supabase (PostgREST) REST interface.
//!
//! Every write goes out as a typed payload from [`crate::models`]; lookups use
//! PostgREST equality filters and embedded-relation selects.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::models::{
    Creator, NewCreator, NewInstruction, NewTutorial, RecipeStep, Tutorial, TutorialStatus,
};

const RETURN_REPRESENTATION: &str = "return=representation";

/// Embedded-relation select for a tutorial with its creator and steps
const WITH_RELATIONS: &str = "*,creator:creators(*),instructions(*)";

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("failed to send request: {0}")]
    Http(#[from] reqwest::Error),

    #[error("supabase error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("failed to parse response: {0}")]
    InvalidResponse(#[from] serde_json::Error),

    #[error("no {0} returned after insert")]
    EmptyInsert(&'static str),

    #[error("tutorial not found: {0}")]
    TutorialNotFound(Uuid),

    #[error("failed to create instruction {step}: {source}")]
    Instruction {
        step: u32,
        #[source]
        source: Box<StoreError>,
    },
}

/// Durable storage for creators, tutorials and instructions
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TutorialStore: Send + Sync {
    /// Find a creator by handle, inserting an unclaimed one if absent
    async fn get_or_create_creator(
        &self,
        handle: &str,
        display_name: &str,
    ) -> Result<Creator, StoreError>;

    /// Exact-match lookup on the source video ID; `None` means not yet processed
    async fn get_tutorial_by_video_id(&self, video_id: &str)
        -> Result<Option<Tutorial>, StoreError>;

    /// Insert a tutorial. The stored status is always `pending`.
    async fn create_tutorial(&self, tutorial: NewTutorial) -> Result<Tutorial, StoreError>;

    /// Insert steps one at a time in order, stopping at the first failure
    async fn create_instructions(
        &self,
        tutorial_id: Uuid,
        steps: &[RecipeStep],
    ) -> Result<(), StoreError>;

    /// Fetch a tutorial with its creator and instructions embedded
    async fn get_tutorial_with_instructions(&self, id: Uuid) -> Result<Tutorial, StoreError>;
}

/// PostgREST client for the Supabase project
#[derive(Clone)]
pub struct SupabaseStore {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl SupabaseStore {
    pub fn new(http: reqwest::Client, supabase_url: &str, anon_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: format!("{}/rest/v1", supabase_url.trim_end_matches('/')),
            api_key: anon_key.into(),
        }
    }

    /// Send a request and decode the JSON body, if any
    async fn request<B, T>(
        &self,
        method: Method,
        endpoint: &str,
        prefer: &str,
        body: Option<&B>,
    ) -> Result<Option<T>, StoreError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut req = self
            .http
            .request(method, format!("{}{}", self.base_url, endpoint))
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("Prefer", prefer);

        if let Some(body) = body {
            req = req.body(serde_json::to_vec(body)?);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;

        if status.as_u16() >= 400 {
            return Err(StoreError::Api {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        if bytes.is_empty() {
            return Ok(None);
        }

        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    async fn select<T: DeserializeOwned>(&self, endpoint: &str) -> Result<Vec<T>, StoreError> {
        let rows = self
            .request::<(), Vec<T>>(Method::GET, endpoint, RETURN_REPRESENTATION, None)
            .await?;
        Ok(rows.unwrap_or_default())
    }

    async fn insert<B, T>(&self, endpoint: &str, prefer: &str, body: &B) -> Result<Vec<T>, StoreError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let rows = self
            .request::<B, Vec<T>>(Method::POST, endpoint, prefer, Some(body))
            .await?;
        Ok(rows.unwrap_or_default())
    }

    async fn find_creator(&self, handle: &str) -> Result<Option<Creator>, StoreError> {
        let endpoint = format!(
            "/creators?tiktok_handle=eq.{}&select=*",
            urlencoding::encode(handle)
        );
        let creators: Vec<Creator> = self.select(&endpoint).await?;
        Ok(creators.into_iter().next())
    }
}

#[async_trait]
impl TutorialStore for SupabaseStore {
    async fn get_or_create_creator(
        &self,
        handle: &str,
        display_name: &str,
    ) -> Result<Creator, StoreError> {
        if let Some(creator) = self.find_creator(handle).await? {
            return Ok(creator);
        }

        let new_creator = NewCreator {
            tiktok_handle: handle.to_string(),
            display_name: display_name.to_string(),
            is_claimed: false,
            created_at: Utc::now(),
        };

        // Concurrent first submissions for one handle: the loser gets no row back
        let created: Vec<Creator> = self
            .insert(
                "/creators?on_conflict=tiktok_handle",
                "return=representation,resolution=ignore-duplicates",
                &new_creator,
            )
            .await?;

        if let Some(creator) = created.into_iter().next() {
            tracing::info!("Created creator {} ({})", creator.tiktok_handle, creator.id);
            return Ok(creator);
        }

        self.find_creator(handle)
            .await?
            .ok_or(StoreError::EmptyInsert("creator"))
    }

    async fn get_tutorial_by_video_id(
        &self,
        video_id: &str,
    ) -> Result<Option<Tutorial>, StoreError> {
        let endpoint = format!(
            "/tutorials?tiktok_video_id=eq.{}&select={}",
            urlencoding::encode(video_id),
            WITH_RELATIONS
        );
        let tutorials: Vec<Tutorial> = self.select(&endpoint).await?;
        Ok(tutorials.into_iter().next().map(sort_instructions))
    }

    async fn create_tutorial(&self, mut tutorial: NewTutorial) -> Result<Tutorial, StoreError> {
        let now = Utc::now();
        tutorial.status = TutorialStatus::Pending;
        tutorial.created_at = now;
        tutorial.updated_at = now;

        let created: Vec<Tutorial> = self
            .insert("/tutorials", RETURN_REPRESENTATION, &tutorial)
            .await?;

        created
            .into_iter()
            .next()
            .ok_or(StoreError::EmptyInsert("tutorial"))
    }

    async fn create_instructions(
        &self,
        tutorial_id: Uuid,
        steps: &[RecipeStep],
    ) -> Result<(), StoreError> {
        for step in steps {
            let payload = NewInstruction::from_step(tutorial_id, step);
            self.request::<_, serde_json::Value>(
                Method::POST,
                "/instructions",
                RETURN_REPRESENTATION,
                Some(&payload),
            )
            .await
            .map_err(|e| StoreError::Instruction {
                step: step.step_number,
                source: Box::new(e),
            })?;
        }

        Ok(())
    }

    async fn get_tutorial_with_instructions(&self, id: Uuid) -> Result<Tutorial, StoreError> {
        let endpoint = format!("/tutorials?id=eq.{}&select={}", id, WITH_RELATIONS);
        let tutorials: Vec<Tutorial> = self.select(&endpoint).await?;

        tutorials
            .into_iter()
            .next()
            .map(sort_instructions)
            .ok_or(StoreError::TutorialNotFound(id))
    }
}

fn sort_instructions(mut tutorial: Tutorial) -> Tutorial {
    tutorial.instructions.sort_by_key(|inst| inst.step_number);
    tutorial
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, headers, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CREATOR_ID: &str = "0b8f5d4e-3a2c-4d1b-8e9f-7a6b5c4d3e2f";
    const TUTORIAL_ID: &str = "6f1c2a4e-8f5b-4a53-9d7e-2c1f4b9b7a10";

    fn store(server: &MockServer) -> SupabaseStore {
        SupabaseStore::new(reqwest::Client::new(), &format!("{}/", server.uri()), "anon-key")
    }

    fn creator_row() -> serde_json::Value {
        serde_json::json!({
            "id": CREATOR_ID,
            "tiktok_handle": "bass.wizard",
            "display_name": "Bass Wizard",
            "avatar_url": null,
            "is_claimed": false,
            "created_at": "2024-01-01T00:00:00Z"
        })
    }

    fn tutorial_row() -> serde_json::Value {
        serde_json::json!({
            "id": TUTORIAL_ID,
            "creator_id": CREATOR_ID,
            "tiktok_url": "https://www.tiktok.com/@bass.wizard/video/731",
            "tiktok_video_id": "731",
            "title": "Reese",
            "sound_type": "bass",
            "raw_transcription": "text",
            "status": "pending",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    fn step(n: u32) -> RecipeStep {
        RecipeStep {
            step_number: n,
            description: format!("step {}", n),
            ableton_device: None,
            parameters: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_existing_creator_is_returned_without_insert() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/creators"))
            .and(query_param("tiktok_handle", "eq.bass.wizard"))
            .and(header("apikey", "anon-key"))
            .and(header("authorization", "Bearer anon-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([creator_row()])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let creator = store(&server)
            .get_or_create_creator("bass.wizard", "Bass Wizard")
            .await
            .unwrap();
        assert_eq!(creator.id.to_string(), CREATOR_ID);
    }

    #[tokio::test]
    async fn test_missing_creator_is_inserted_unclaimed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/creators"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/creators"))
            .and(query_param("on_conflict", "tiktok_handle"))
            .and(headers(
                "prefer",
                vec!["return=representation", "resolution=ignore-duplicates"],
            ))
            .and(body_partial_json(serde_json::json!({
                "tiktok_handle": "bass.wizard",
                "display_name": "Bass Wizard",
                "is_claimed": false
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!([creator_row()])))
            .expect(1)
            .mount(&server)
            .await;

        let creator = store(&server)
            .get_or_create_creator("bass.wizard", "Bass Wizard")
            .await
            .unwrap();
        assert!(!creator.is_claimed);
    }

    #[tokio::test]
    async fn test_creator_race_falls_back_to_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/creators"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/creators"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/creators"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([creator_row()])))
            .mount(&server)
            .await;

        let creator = store(&server)
            .get_or_create_creator("bass.wizard", "Bass Wizard")
            .await
            .unwrap();
        assert_eq!(creator.tiktok_handle, "bass.wizard");
    }

    #[tokio::test]
    async fn test_tutorial_lookup_absent_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/tutorials"))
            .and(query_param("tiktok_video_id", "eq.731"))
            .and(query_param("select", "*,creator:creators(*),instructions(*)"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let found = store(&server).get_tutorial_by_video_id("731").await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_create_tutorial_forces_pending() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/tutorials"))
            .and(header("prefer", "return=representation"))
            .and(body_partial_json(serde_json::json!({"status": "pending", "tiktok_video_id": "731"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!([tutorial_row()])))
            .expect(1)
            .mount(&server)
            .await;

        let now = Utc::now();
        let tutorial = store(&server)
            .create_tutorial(NewTutorial {
                creator_id: CREATOR_ID.parse().unwrap(),
                tiktok_url: "https://www.tiktok.com/@bass.wizard/video/731".to_string(),
                tiktok_video_id: "731".to_string(),
                title: "Reese".to_string(),
                sound_type: "bass".to_string(),
                raw_transcription: "text".to_string(),
                status: TutorialStatus::Approved,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
        assert_eq!(tutorial.status, TutorialStatus::Pending);
    }

    #[tokio::test]
    async fn test_instruction_failure_stops_remaining_inserts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/instructions"))
            .and(body_partial_json(serde_json::json!({"step_number": 1})))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!([{}])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/instructions"))
            .and(body_partial_json(serde_json::json!({"step_number": 2})))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/instructions"))
            .and(body_partial_json(serde_json::json!({"step_number": 3})))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let err = store(&server)
            .create_instructions(TUTORIAL_ID.parse().unwrap(), &[step(1), step(2), step(3)])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Instruction { step: 2, .. }));
    }

    #[tokio::test]
    async fn test_reload_embeds_relations_in_step_order() {
        let server = MockServer::start().await;
        let mut row = tutorial_row();
        row["creator"] = creator_row();
        row["instructions"] = serde_json::json!([
            {"id": "9a8b7c6d-5e4f-4a3b-2c1d-0e9f8a7b6c52", "tutorial_id": TUTORIAL_ID, "step_number": 2, "description": "b"},
            {"id": "9a8b7c6d-5e4f-4a3b-2c1d-0e9f8a7b6c51", "tutorial_id": TUTORIAL_ID, "step_number": 1, "description": "a"}
        ]);

        Mock::given(method("GET"))
            .and(path("/rest/v1/tutorials"))
            .and(query_param("id", format!("eq.{}", TUTORIAL_ID)))
            .and(query_param("select", "*,creator:creators(*),instructions(*)"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([row])))
            .mount(&server)
            .await;

        let tutorial = store(&server)
            .get_tutorial_with_instructions(TUTORIAL_ID.parse().unwrap())
            .await
            .unwrap();
        assert!(tutorial.creator.is_some());
        let steps: Vec<u32> = tutorial.instructions.iter().map(|i| i.step_number).collect();
        assert_eq!(steps, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_reload_missing_tutorial() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let err = store(&server)
            .get_tutorial_with_instructions(TUTORIAL_ID.parse().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::TutorialNotFound(_)));
    }

    #[tokio::test]
    async fn test_error_status_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("{\"message\":\"Invalid API key\"}"))
            .mount(&server)
            .await;

        let err = store(&server).get_tutorial_by_video_id("731").await.unwrap_err();
        assert!(matches!(err, StoreError::Api { status: 401, .. }));
    }
}
