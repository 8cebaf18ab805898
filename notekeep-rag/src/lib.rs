//! Retrieval pipeline for chatting with notes.
//!
//! Note text is split into sentence-aligned chunks, embedded, and stored in
//! SQLite with a sqlite-vec index. Chat turns retrieve the chunks closest to
//! the question and wrap the ones not yet shown in a `<context>` block.

pub mod chat;
pub mod chunker;
pub mod embeddings;
pub mod engine;
pub mod errors;
pub mod index;
pub mod paths;
pub mod prompt;
pub mod session;
pub mod storage;

pub use chat::{ChatReply, ChatSession, CompletionBackend, FragmentStream};
pub use chunker::{Chunk, chunk, chunk_note};
pub use embeddings::{
    Embedding, EmbeddingGenerator, EmbeddingModel, OllamaEmbeddingModel, cosine_similarity,
};
pub use engine::RagEngine;
pub use errors::{RagError, RagResult};
pub use index::{IndexOutcome, IndexReport, NoteIndexer};
pub use notekeep_core::{ModelFamily, PromptTurn, RagSettings};
pub use prompt::{PromptFormat, format_for};
pub use session::{
    CONTEXT_CLOSE, CONTEXT_OPEN, ContextAssembler, EMPTY_CONTEXT, Exchange, PreparedTurn,
    RetrievalSession, SessionState, format_context_block,
};
pub use storage::{SimilarChunk, VectorStore};
