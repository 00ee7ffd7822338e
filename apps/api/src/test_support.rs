//! In-memory doubles for the external collaborators, shared by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::config::Config;
use crate::db::DocumentStoreCredential;
use crate::documents::{Document, DocumentError, DocumentStore, DocumentStoreConnector};
use crate::llm_client::{
    ChatMessage, CompletionService, Conversation, ImageService, LlmConnector, LlmError, LlmHandle,
};
use crate::messaging::{PublishError, Publisher};
use crate::secrets::{SecretError, SecretStore};
use crate::state::AppState;
use crate::storage::{ObjectStore, ObjectStoreError};

pub fn test_config() -> Config {
    Config {
        secrets_bucket: "secrets".into(),
        secrets_key: "openai.json".into(),
        document_credential_key: "documents.json".into(),
        prompts_bucket: "prompts".into(),
        prompts_key: "prompts.json".into(),
        s3_bucket: "assets".into(),
        s3_endpoint: "http://localhost:9000".into(),
        s3_public_url: "http://localhost:9000".into(),
        aws_access_key_id: "test".into(),
        aws_secret_access_key: "test".into(),
        redis_url: "redis://localhost:6379".into(),
        course_topic: "course-generation".into(),
        enable_image_generation: true,
        openai_api_url: "http://localhost:1/v1".into(),
        port: 0,
        rust_log: "debug".into(),
    }
}

/// Router state with an empty secret store, so every invocation fails to load.
pub fn test_state(publisher: Arc<dyn Publisher>) -> AppState {
    AppState {
        secrets: Arc::new(MemorySecretStore::default()),
        publisher,
        ..TestBackends::new(ScriptedCompletions::default()).state()
    }
}

pub const TEST_API_KEY: &str = "sk-test";

/// Every prompt the handlers fetch, keyed by field.
pub fn test_prompts() -> Value {
    json!({
        "recipeRequest": "Return a recipe as JSON.",
        "workoutRequest": "Return a workout as JSON.",
        "workoutImageRequest": "A photo of {name} in a gym",
        "courseImageRequest": "A cover for a course about {name}",
        "financialPlanRequest": "Return a plan as JSON.",
        "careersRequest": "Return an industry as JSON.",
        "populateIndustryPrompt": "Describe the industry as JSON.",
        "chatPersona": "You are a friendly coach.",
        "easifyRequest": "Explain it simply, as JSON.",
        "resumeAnalysisPrompt": "Score this resume as JSON."
    })
}

/// The doubles behind a fully provisioned `AppState`.
pub struct TestBackends {
    pub completions: Arc<ScriptedCompletions>,
    pub images: Arc<FixedImageService>,
    pub documents: Arc<MemoryDocumentStore>,
    pub objects: Arc<MemoryObjectStore>,
    pub publisher: Arc<RecordingPublisher>,
    pub connected_keys: Arc<Mutex<Vec<String>>>,
}

impl TestBackends {
    pub fn new(completions: ScriptedCompletions) -> Self {
        Self {
            completions: Arc::new(completions),
            images: Arc::new(FixedImageService::new("https://images.test/generated.png")),
            documents: Arc::new(MemoryDocumentStore::default()),
            objects: Arc::new(MemoryObjectStore::default()),
            publisher: Arc::new(RecordingPublisher::default()),
            connected_keys: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// State whose secret store holds the API key, the document-store
    /// credential and every prompt in `test_prompts`.
    pub fn state(&self) -> AppState {
        let config = test_config();
        let secrets = MemorySecretStore::default()
            .with_object(
                &config.secrets_bucket,
                &config.secrets_key,
                json!({ "gptSecret": TEST_API_KEY }),
            )
            .with_object(
                &config.secrets_bucket,
                &config.document_credential_key,
                json!({ "database_url": "postgres://memory/kiln" }),
            )
            .with_object(&config.prompts_bucket, &config.prompts_key, test_prompts());

        AppState {
            config,
            secrets: Arc::new(secrets),
            objects: self.objects.clone(),
            publisher: self.publisher.clone(),
            llm: Arc::new(FixedLlmConnector {
                handle: LlmHandle {
                    completions: self.completions.clone(),
                    images: self.images.clone(),
                },
                keys: self.connected_keys.clone(),
            }),
            documents: Arc::new(FixedDocumentConnector(self.documents.clone())),
        }
    }
}

/// Hands out the same doubles for every key, recording the keys.
pub struct FixedLlmConnector {
    handle: LlmHandle,
    keys: Arc<Mutex<Vec<String>>>,
}

impl LlmConnector for FixedLlmConnector {
    fn connect(&self, api_key: String) -> LlmHandle {
        self.keys.lock().unwrap().push(api_key);
        self.handle.clone()
    }
}

pub struct FixedDocumentConnector(Arc<MemoryDocumentStore>);

#[async_trait]
impl DocumentStoreConnector for FixedDocumentConnector {
    async fn connect(
        &self,
        _credential: &DocumentStoreCredential,
    ) -> Result<Arc<dyn DocumentStore>, DocumentError> {
        Ok(self.0.clone())
    }
}

// ── Secrets ────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemorySecretStore {
    objects: HashMap<(String, String), Vec<u8>>,
}

impl MemorySecretStore {
    pub fn with_object(mut self, container: &str, key: &str, value: Value) -> Self {
        self.objects.insert(
            (container.to_string(), key.to_string()),
            serde_json::to_vec(&value).unwrap(),
        );
        self
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn fetch(&self, container: &str, key: &str) -> Result<Vec<u8>, SecretError> {
        self.objects
            .get(&(container.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| SecretError::Fetch {
                container: container.to_string(),
                key: key.to_string(),
                message: "NoSuchKey".to_string(),
            })
    }
}

// ── Completions ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
}

/// Replays canned responses in order; fails once the script runs out.
#[derive(Default)]
pub struct ScriptedCompletions {
    responses: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedCompletions {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletions {
    async fn complete(
        &self,
        model: &str,
        conversation: &Conversation,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        self.calls.lock().unwrap().push(RecordedCall {
            model: model.to_string(),
            messages: conversation.messages().to_vec(),
            max_tokens,
        });
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(LlmError::Api {
                status: 503,
                message: "script exhausted".to_string(),
            })
    }
}

// ── Images ─────────────────────────────────────────────────────────────────

pub struct FixedImageService {
    url: Option<String>,
    calls: Arc<AtomicUsize>,
}

impl FixedImageService {
    pub fn new(url: &str) -> Self {
        Self {
            url: Some(url.to_string()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing() -> Self {
        Self {
            url: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl ImageService for FixedImageService {
    async fn generate_image(&self, _model: &str, _prompt: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.url.clone().ok_or(LlmError::MissingImageUrl)
    }

    async fn download(&self, _url: &str) -> Result<Bytes, LlmError> {
        Ok(Bytes::from_static(b"\x89PNG"))
    }
}

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, Bytes>>,
}

impl MemoryObjectStore {
    pub fn with_key(self, key: &str) -> Self {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), Bytes::new());
        self
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        key: &str,
        bytes: Bytes,
        _content_type: &str,
    ) -> Result<String, ObjectStoreError> {
        self.objects.lock().unwrap().insert(key.to_string(), bytes);
        Ok(format!("memory://assets/{key}"))
    }

    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError> {
        Ok(self.objects.lock().unwrap().contains_key(key))
    }
}

// ── Documents ──────────────────────────────────────────────────────────────

/// Mirrors the Postgres store, including the unique natural-key index.
#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: Mutex<HashMap<String, Vec<Document>>>,
    fail_reads: bool,
    fail_writes: bool,
}

impl MemoryDocumentStore {
    pub fn failing_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    /// Seeds a document directly, bypassing failure switches.
    pub fn insert(&self, collection: &str, data: Value) -> Uuid {
        let id = Uuid::new_v4();
        self.collections
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .push(Document { id, data });
        id
    }

    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn stored(&self, collection: &str, id: Uuid) -> Option<Value> {
        self.documents(collection)
            .into_iter()
            .find(|d| d.id == id)
            .map(|d| d.data)
    }
}

fn io_failure() -> DocumentError {
    DocumentError::Database(sqlx::Error::PoolTimedOut)
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn find_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Document>, DocumentError> {
        if self.fail_reads {
            return Err(io_failure());
        }
        Ok(self
            .documents(collection)
            .into_iter()
            .filter(|d| d.str_field(field) == Some(value))
            .collect())
    }

    async fn get(&self, collection: &str, id: Uuid) -> Result<Option<Document>, DocumentError> {
        if self.fail_reads {
            return Err(io_failure());
        }
        Ok(self.documents(collection).into_iter().find(|d| d.id == id))
    }

    async fn add(&self, collection: &str, record: Map<String, Value>) -> Result<Uuid, DocumentError> {
        if self.fail_writes {
            return Err(io_failure());
        }
        if let Some(name) = record.get("name").and_then(Value::as_str) {
            let taken = self
                .documents(collection)
                .iter()
                .any(|d| d.str_field("name") == Some(name));
            if taken {
                return Err(DocumentError::Conflict {
                    collection: collection.to_string(),
                    name: name.to_string(),
                });
            }
        }
        Ok(self.insert(collection, Value::Object(record)))
    }

    async fn set_merge(
        &self,
        collection: &str,
        id: Uuid,
        fields: Map<String, Value>,
    ) -> Result<(), DocumentError> {
        if self.fail_writes {
            return Err(io_failure());
        }
        let mut collections = self.collections.lock().unwrap();
        let documents = collections.entry(collection.to_string()).or_default();
        match documents.iter_mut().find(|d| d.id == id) {
            Some(document) => {
                if let Value::Object(existing) = &mut document.data {
                    existing.extend(fields);
                }
            }
            None => documents.push(Document {
                id,
                data: Value::Object(fields),
            }),
        }
        Ok(())
    }

    async fn set(
        &self,
        collection: &str,
        id: Uuid,
        record: Map<String, Value>,
    ) -> Result<(), DocumentError> {
        if self.fail_writes {
            return Err(io_failure());
        }
        let mut collections = self.collections.lock().unwrap();
        let documents = collections.entry(collection.to_string()).or_default();
        documents.retain(|d| d.id != id);
        documents.push(Document {
            id,
            data: Value::Object(record),
        });
        Ok(())
    }

    async fn list(&self, collection: &str, limit: i64) -> Result<Vec<Document>, DocumentError> {
        if self.fail_reads {
            return Err(io_failure());
        }
        let mut documents = self.documents(collection);
        documents.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(documents)
    }
}

// ── Messaging ──────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingPublisher {
    messages: Mutex<Vec<(String, Value)>>,
    fail_after: Option<usize>,
}

impl RecordingPublisher {
    /// Accepts `n` messages, then fails every publish.
    pub fn failing_after(n: usize) -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            fail_after: Some(n),
        }
    }

    pub fn messages(&self) -> Vec<(String, Value)> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, topic: &str, message: &Value) -> Result<(), PublishError> {
        let mut messages = self.messages.lock().unwrap();
        if self.fail_after.is_some_and(|n| messages.len() >= n) {
            return Err(PublishError::Redis(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "connection refused",
            ))));
        }
        messages.push((topic.to_string(), message.clone()));
        Ok(())
    }
}
