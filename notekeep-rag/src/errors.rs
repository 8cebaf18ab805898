#[derive(Debug, thiserror::Error)]
pub enum RagError {
    #[error("embedding backend is not initialized")]
    EmbeddingUnavailable,
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("vector store is not initialized")]
    StoreUnavailable,
    #[error("failed to embed chunk {sequence_index} of note {note_id}: {reason}")]
    ChunkEmbedFailure {
        note_id: String,
        sequence_index: usize,
        reason: String,
    },
    #[error("generation {generation} of note {note_id} was superseded")]
    StaleGeneration { note_id: String, generation: u64 },
    #[error("missing data directory")]
    MissingDataDir,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("sqlite-vec initialization error: {0}")]
    SqliteVec(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("embedding error: {0}")]
    Embedding(String),
    #[error("completion error: {0}")]
    Completion(String),
}

impl RagError {
    /// Whether the failure means the whole pipeline is unusable, as opposed to
    /// one chunk failing.
    pub fn is_backend_unavailable(&self) -> bool {
        matches!(self, Self::EmbeddingUnavailable | Self::StoreUnavailable)
    }
}

pub type RagResult<T> = Result<T, RagError>;
