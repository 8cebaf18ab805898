//! Per-conversation retrieval state and context assembly.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::embeddings::EmbeddingGenerator;
use crate::errors::RagResult;
use crate::storage::VectorStore;

pub const CONTEXT_OPEN: &str = "<context>";
pub const CONTEXT_CLOSE: &str = "</context>";
/// Context block used when no new chunk was found.
pub const EMPTY_CONTEXT: &str = "<context></context>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No exchange completed yet.
    Empty,
    Active,
}

/// One completed question/answer round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub question: String,
    /// Context block the question was sent with.
    pub context_block: String,
    /// Chunk texts first shown in this round.
    pub surfaced: Vec<String>,
    pub answer: String,
}

/// Conversation state for chatting with one note.
///
/// Remembers which chunk texts were already given to the model so later
/// turns only surface new material. Lives in memory only.
#[derive(Debug, Clone)]
pub struct RetrievalSession {
    note_id: String,
    used_chunk_texts: HashSet<String>,
    exchanges: Vec<Exchange>,
    state: SessionState,
}

impl RetrievalSession {
    pub fn new(note_id: impl Into<String>) -> Self {
        Self {
            note_id: note_id.into(),
            used_chunk_texts: HashSet::new(),
            exchanges: Vec::new(),
            state: SessionState::Empty,
        }
    }

    pub fn note_id(&self) -> &str {
        &self.note_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn has_used(&self, chunk_text: &str) -> bool {
        self.used_chunk_texts.contains(chunk_text)
    }

    pub fn used_count(&self) -> usize {
        self.used_chunk_texts.len()
    }

    pub fn exchanges(&self) -> &[Exchange] {
        &self.exchanges
    }

    /// The most recent `limit` exchanges, oldest first.
    pub fn recent_exchanges(&self, limit: usize) -> &[Exchange] {
        let start = self.exchanges.len().saturating_sub(limit);
        &self.exchanges[start..]
    }

    pub fn record_exchange(&mut self, exchange: Exchange) {
        self.exchanges.push(exchange);
        self.state = SessionState::Active;
    }

    /// Keep only the last `limit` exchanges.
    ///
    /// Chunks surfaced by dropped exchanges are no longer in any prompt, so
    /// they become eligible for retrieval again. Returns how many were released.
    pub fn retain_recent(&mut self, limit: usize) -> usize {
        let evict = self.exchanges.len().saturating_sub(limit);
        let mut released = 0;
        for exchange in self.exchanges.drain(..evict) {
            for text in &exchange.surfaced {
                if self.used_chunk_texts.remove(text) {
                    released += 1;
                }
            }
        }
        released
    }

    fn mark_used(&mut self, chunk_text: &str) -> bool {
        self.used_chunk_texts.insert(chunk_text.to_string())
    }
}

/// Result of preparing one chat turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedTurn {
    /// Always present; [`EMPTY_CONTEXT`] when nothing new was found.
    pub context_block: String,
    /// Chunk texts surfaced by this turn, in rank order.
    pub surfaced: Vec<String>,
}

/// Wrap chunk texts in the context delimiters, separated by blank lines.
pub fn format_context_block(chunks: &[String]) -> String {
    if chunks.is_empty() {
        return EMPTY_CONTEXT.to_string();
    }
    format!("{}{}{}", CONTEXT_OPEN, chunks.join("\n\n"), CONTEXT_CLOSE)
}

/// Builds the context block for each user turn from a note's stored chunks.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    generator: Arc<EmbeddingGenerator>,
    store: VectorStore,
    k: usize,
}

impl ContextAssembler {
    pub fn new(generator: Arc<EmbeddingGenerator>, store: VectorStore, k: usize) -> Self {
        Self {
            generator,
            store,
            k,
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Retrieve the chunks of the session's note closest to `query_text` and
    /// surface the ones this session has not seen yet.
    pub async fn prepare_turn(
        &self,
        session: &mut RetrievalSession,
        query_text: &str,
    ) -> RagResult<PreparedTurn> {
        let query = self.generator.embed(query_text).await?;
        let hits = self
            .store
            .find_similar(&query, Some(session.note_id()), self.k)
            .await?;

        let mut surfaced = Vec::new();
        for hit in hits {
            if session.mark_used(&hit.chunk_text) {
                surfaced.push(hit.chunk_text);
            }
        }

        debug!(
            note_id = session.note_id(),
            surfaced = surfaced.len(),
            "prepared context"
        );
        Ok(PreparedTurn {
            context_block: format_context_block(&surfaced),
            surfaced,
        })
    }
}
