use std::sync::Arc;

use notekeep_core::RagSettings;

use crate::chat::{ChatSession, CompletionBackend};
use crate::embeddings::{EmbeddingGenerator, EmbeddingModel, OllamaEmbeddingModel};
use crate::errors::{RagError, RagResult};
use crate::index::{IndexReport, NoteIndexer};
use crate::prompt::format_for;
use crate::session::{ContextAssembler, PreparedTurn, RetrievalSession};
use crate::storage::{SimilarChunk, VectorStore};

/// Entry point that owns the embedding handle, the store and the indexer.
///
/// Cloning is cheap and shares all handles.
#[derive(Debug, Clone)]
pub struct RagEngine {
    settings: RagSettings,
    generator: Arc<EmbeddingGenerator>,
    store: VectorStore,
    indexer: Arc<NoteIndexer>,
}

impl RagEngine {
    /// Open the store and initialize `model`.
    pub async fn open(settings: RagSettings, model: Arc<dyn EmbeddingModel>) -> RagResult<Self> {
        if model.dimension() != settings.embedding_dim {
            return Err(RagError::DimensionMismatch {
                expected: settings.embedding_dim,
                actual: model.dimension(),
            });
        }

        let store = VectorStore::from_settings(&settings)?;
        store.open().await?;

        let generator = Arc::new(EmbeddingGenerator::new(
            model,
            settings.embedding_concurrency,
        ));
        if let Err(err) = generator.initialize().await {
            store.close().await;
            return Err(err);
        }

        let indexer = Arc::new(NoteIndexer::new(
            generator.clone(),
            store.clone(),
            settings.chunk_target_words,
        ));
        Ok(Self {
            settings,
            generator,
            store,
            indexer,
        })
    }

    /// Open with the Ollama embedding endpoint from `settings`.
    pub async fn open_with_ollama(settings: RagSettings) -> RagResult<Self> {
        let model = Arc::new(OllamaEmbeddingModel::new(&settings));
        Self::open(settings, model).await
    }

    /// Tear down the embedding handle and close the store. Later calls fail
    /// with an unavailable error.
    pub async fn shutdown(&self) -> RagResult<()> {
        let teardown = self.generator.teardown().await;
        self.store.close().await;
        teardown
    }

    pub fn settings(&self) -> &RagSettings {
        &self.settings
    }

    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    pub fn generator(&self) -> &Arc<EmbeddingGenerator> {
        &self.generator
    }

    pub async fn process_note(&self, note_id: &str, text: &str) -> RagResult<IndexReport> {
        self.indexer.process_note(note_id, text).await
    }

    pub async fn remove_note(&self, note_id: &str) -> RagResult<u64> {
        self.indexer.remove_note(note_id).await
    }

    /// Whether the note has anything to chat about.
    pub async fn chat_available(&self, note_id: &str) -> RagResult<bool> {
        self.store.has_any_records(note_id).await
    }

    pub async fn find_similar_text(
        &self,
        query: &str,
        note_id: Option<&str>,
        k: usize,
    ) -> RagResult<Vec<SimilarChunk>> {
        let embedding = self.generator.embed(query).await?;
        self.store.find_similar(&embedding, note_id, k).await
    }

    pub fn start_session(&self, note_id: &str) -> RetrievalSession {
        RetrievalSession::new(note_id)
    }

    pub fn context_assembler(&self) -> ContextAssembler {
        ContextAssembler::new(
            self.generator.clone(),
            self.store.clone(),
            self.settings.retrieval_k,
        )
    }

    pub async fn prepare_turn(
        &self,
        session: &mut RetrievalSession,
        query_text: &str,
    ) -> RagResult<PreparedTurn> {
        self.context_assembler()
            .prepare_turn(session, query_text)
            .await
    }

    pub fn chat_session<B: CompletionBackend>(&self, note_id: &str, backend: B) -> ChatSession<B> {
        ChatSession::new(
            self.start_session(note_id),
            self.context_assembler(),
            backend,
            format_for(self.settings.model_family),
            self.settings.system_prompt.clone(),
            self.settings.history_turns,
        )
    }
}
