//! Deterministic fakes for unit tests

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{Error, Result};
use crate::providers::{CompletionProvider, DeltaStream, DocumentStore, EmbeddingProvider, RecordFilter};
use crate::types::{ChatMessage, DocumentRecord, ScoredRecord};

/// Bag-of-words hashing embedder: same text, same vector
pub struct HashEmbedder {
    dims: usize,
    pub calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut vector = vec![0.0f32; self.dims];
        for word in text.split_whitespace() {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            vector[(hasher.finish() as usize) % self.dims] += 1.0;
        }
        // keep empty text embeddable
        vector[0] += 0.01;
        Ok(vector)
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "hash"
    }
}

/// Returns the same vector for every input
pub struct FixedEmbedder {
    vector: Vec<f32>,
    pub calls: AtomicUsize,
}

impl FixedEmbedder {
    pub fn new(vector: Vec<f32>) -> Self {
        Self {
            vector,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for FixedEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vector.clone())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

/// Fails its first `failures` calls (or every call touching `poison`), then embeds
pub struct FlakyEmbedder {
    failures_left: AtomicUsize,
    poison: Option<String>,
    pub calls: AtomicUsize,
}

impl FlakyEmbedder {
    pub fn failing_first(failures: usize) -> Self {
        Self {
            failures_left: AtomicUsize::new(failures),
            poison: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always_failing() -> Self {
        Self::failing_first(usize::MAX)
    }

    pub fn failing_on(poison: impl Into<String>) -> Self {
        Self {
            failures_left: AtomicUsize::new(0),
            poison: Some(poison.into()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for FlakyEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.poison.as_deref().is_some_and(|p| text.contains(p)) {
            return Err(Error::provider("embed", "rejected input"));
        }
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::provider("embed", "rate limited"));
        }
        Ok(vec![1.0, text.len() as f32])
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(false)
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

/// One step of a scripted completion stream
#[derive(Debug, Clone)]
pub enum Step {
    Delta(&'static str),
    Fail(&'static str),
    /// Never yields again
    Hang,
}

/// Completion provider that replays a script and records what it was sent
pub struct ScriptedCompletion {
    steps: Vec<Step>,
    fail_on_start: bool,
    pub requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedCompletion {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            fail_on_start: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(deltas: &[&'static str]) -> Self {
        Self::new(deltas.iter().map(|d| Step::Delta(*d)).collect())
    }

    pub fn unavailable() -> Self {
        Self {
            fail_on_start: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn last_request(&self) -> Option<Vec<ChatMessage>> {
        self.requests.lock().last().cloned()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedCompletion {
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<DeltaStream> {
        self.requests.lock().push(messages.to_vec());
        if self.fail_on_start {
            return Err(Error::provider("chat", "service unavailable"));
        }

        let steps = self.steps.clone();
        let stream = stream::iter(steps).flat_map(|step| match step {
            Step::Delta(text) => stream::once(async move { Ok::<String, Error>(text.to_string()) }).boxed(),
            Step::Fail(message) => {
                stream::once(async move { Err(Error::provider("chat stream", message)) }).boxed()
            }
            Step::Hang => stream::pending::<Result<String>>().boxed(),
        });
        Ok(stream.boxed())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(!self.fail_on_start)
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-model"
    }
}

/// Document store whose every operation fails
pub struct FailingStore;

#[async_trait]
impl DocumentStore for FailingStore {
    async fn upsert_record(&self, _record: &DocumentRecord) -> Result<()> {
        Err(Error::store("upsert", "store offline"))
    }

    async fn replace_record(&self, _record: &DocumentRecord) -> Result<bool> {
        Err(Error::store("replace", "store offline"))
    }

    async fn delete_record(&self, _id: &str) -> Result<bool> {
        Err(Error::store("delete", "store offline"))
    }

    async fn get_record(&self, _id: &str) -> Result<Option<DocumentRecord>> {
        Err(Error::store("get", "store offline"))
    }

    async fn query_by_field(&self, _filter: &RecordFilter) -> Result<Vec<DocumentRecord>> {
        Err(Error::store("query", "store offline"))
    }

    async fn query_by_similarity(
        &self,
        _vector: &[f32],
        _threshold: f32,
        _top_k: usize,
    ) -> Result<Vec<ScoredRecord>> {
        Err(Error::store("similarity query", "store offline"))
    }

    async fn len(&self) -> Result<usize> {
        Err(Error::store("count", "store offline"))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(false)
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Store that returns canned similarity results, ignoring the query
pub struct CannedSearchStore {
    pub results: Vec<ScoredRecord>,
}

#[async_trait]
impl DocumentStore for CannedSearchStore {
    async fn upsert_record(&self, _record: &DocumentRecord) -> Result<()> {
        Ok(())
    }

    async fn replace_record(&self, _record: &DocumentRecord) -> Result<bool> {
        Ok(false)
    }

    async fn delete_record(&self, _id: &str) -> Result<bool> {
        Ok(false)
    }

    async fn get_record(&self, _id: &str) -> Result<Option<DocumentRecord>> {
        Ok(None)
    }

    async fn query_by_field(&self, _filter: &RecordFilter) -> Result<Vec<DocumentRecord>> {
        Ok(Vec::new())
    }

    async fn query_by_similarity(
        &self,
        _vector: &[f32],
        _threshold: f32,
        _top_k: usize,
    ) -> Result<Vec<ScoredRecord>> {
        Ok(self.results.clone())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.results.len())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "canned"
    }
}

/// A vectorized record for search fixtures
pub fn searchable_record(file_name: &str, content: &str, vector: Vec<f32>) -> DocumentRecord {
    let mut record = DocumentRecord::pending(
        file_name,
        format!("https://acct/rag-docs/{}", file_name),
        0,
        content,
        Vec::new(),
    );
    record.mark_vectorized(vector);
    record
}
