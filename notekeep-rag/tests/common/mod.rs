#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;

use notekeep_rag::{
    CompletionBackend, EmbeddingModel, FragmentStream, RagEngine, RagError, RagResult,
    RagSettings,
};

pub const KEYWORDS: [&str; 7] = [
    "alice", "deadline", "friday", "milk", "project", "budget", "meeting",
];

/// Keyword presence plus a constant bias so no vector is all zeros.
pub fn keyword_embedding(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    KEYWORDS
        .iter()
        .map(|kw| if lower.contains(kw) { 1.0 } else { 0.0 })
        .chain(std::iter::once(1.0))
        .collect()
}

pub struct KeywordModel;

#[async_trait]
impl EmbeddingModel for KeywordModel {
    fn model_name(&self) -> &str {
        "keyword-mock"
    }

    fn dimension(&self) -> usize {
        KEYWORDS.len() + 1
    }

    async fn embed_batch(&self, inputs: &[String]) -> RagResult<Vec<Vec<f32>>> {
        Ok(inputs.iter().map(|text| keyword_embedding(text)).collect())
    }
}

pub fn test_settings(dir: &Path) -> RagSettings {
    RagSettings {
        embedding_dim: KEYWORDS.len() + 1,
        db_path_override: Some(dir.join("embeddings.sqlite3")),
        system_prompt: "Answer from the note.".to_string(),
        ..Default::default()
    }
}

pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("notekeep_rag=debug,warn")
        .with_test_writer()
        .try_init();
}

pub async fn open_engine(settings: RagSettings) -> RagEngine {
    init_test_logging();
    RagEngine::open(settings, Arc::new(KeywordModel))
        .await
        .expect("open engine")
}

/// Completion backend that replays canned fragment lists and records prompts.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    replies: Arc<Mutex<VecDeque<Vec<RagResult<String>>>>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, fragments: &[&str]) -> Self {
        self.replies
            .lock()
            .unwrap()
            .push_back(fragments.iter().map(|f| Ok(f.to_string())).collect());
        self
    }

    pub fn fail_after(self, fragments: &[&str]) -> Self {
        let mut script: Vec<RagResult<String>> =
            fragments.iter().map(|f| Ok(f.to_string())).collect();
        script.push(Err(RagError::Completion("backend dropped".to_string())));
        self.replies.lock().unwrap().push_back(script);
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn stream_completion(&self, prompt: &str, _stop: &[&str]) -> RagResult<FragmentStream> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let script = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| RagError::Completion("no scripted reply left".to_string()))?;
        Ok(stream::iter(script).boxed())
    }
}
