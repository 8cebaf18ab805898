use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::chunker::{Chunk, chunk_note};
use crate::embeddings::{Embedding, EmbeddingGenerator};
use crate::errors::{RagError, RagResult};
use crate::storage::VectorStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    /// Old records were replaced by this pass.
    Completed,
    /// A newer pass for the same note started; nothing was written.
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexReport {
    pub note_id: String,
    pub generation: u64,
    pub outcome: IndexOutcome,
    pub chunks_total: usize,
    pub chunks_stored: usize,
    pub chunks_failed: usize,
    pub records_deleted: u64,
}

impl IndexReport {
    fn superseded(note_id: &str, generation: u64, chunks_total: usize) -> Self {
        Self {
            note_id: note_id.to_string(),
            generation,
            outcome: IndexOutcome::Superseded,
            chunks_total,
            chunks_stored: 0,
            chunks_failed: 0,
            records_deleted: 0,
        }
    }
}

#[derive(Debug, Default)]
struct NoteSlot {
    generation: AtomicU64,
    write_lock: AsyncMutex<()>,
}

impl NoteSlot {
    fn begin(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn ensure_current(&self, note_id: &str, generation: u64) -> RagResult<()> {
        if self.generation.load(Ordering::SeqCst) == generation {
            Ok(())
        } else {
            Err(RagError::StaleGeneration {
                note_id: note_id.to_string(),
                generation,
            })
        }
    }
}

/// Keeps the stored chunks of each note in sync with its latest text.
///
/// Every call to [`process_note`](Self::process_note) or
/// [`remove_note`](Self::remove_note) starts a new generation for the note.
/// Embedding runs without holding any note lock; the delete-then-insert step
/// runs under the note's write lock and only while the pass is still the
/// newest, so an older pass can never clobber newer records. Different notes
/// are processed independently.
#[derive(Debug)]
pub struct NoteIndexer {
    generator: Arc<EmbeddingGenerator>,
    store: VectorStore,
    target_words: usize,
    slots: Mutex<HashMap<String, Arc<NoteSlot>>>,
}

impl NoteIndexer {
    pub fn new(generator: Arc<EmbeddingGenerator>, store: VectorStore, target_words: usize) -> Self {
        Self {
            generator,
            store,
            target_words,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn current_generation(&self, note_id: &str) -> u64 {
        self.slot(note_id).generation.load(Ordering::SeqCst)
    }

    /// Re-chunk and re-embed a note, replacing all of its previous records.
    ///
    /// Chunks that fail to embed or store are skipped and counted. Only an
    /// unavailable generator or store aborts the pass.
    pub async fn process_note(&self, note_id: &str, text: &str) -> RagResult<IndexReport> {
        let slot = self.slot(note_id);
        let generation = slot.begin();
        let chunks = chunk_note(note_id, text, self.target_words);
        let chunks_total = chunks.len();
        debug!(note_id, generation, chunks = chunks_total, "indexing note");

        let mut failed = 0;
        let embedded = match self
            .embed_chunks(&slot, generation, &chunks, &mut failed)
            .await
        {
            Ok(embedded) => embedded,
            Err(RagError::StaleGeneration { .. }) => {
                debug!(note_id, generation, "indexing pass superseded while embedding");
                return Ok(IndexReport::superseded(note_id, generation, chunks_total));
            }
            Err(err) => return Err(err),
        };

        let _guard = slot.write_lock.lock().await;
        if slot.ensure_current(note_id, generation).is_err() {
            debug!(note_id, generation, "indexing pass superseded before write");
            return Ok(IndexReport::superseded(note_id, generation, chunks_total));
        }

        let records_deleted = self.store.delete_all_for_note(note_id).await?;
        let mut stored = 0;
        for (chunk, embedding) in &embedded {
            match self
                .store
                .upsert_chunk_at(
                    note_id,
                    &chunk.text,
                    embedding,
                    chunk.sequence_index,
                    generation,
                )
                .await
            {
                Ok(_) => stored += 1,
                Err(err) if err.is_backend_unavailable() => return Err(err),
                Err(err) => {
                    failed += 1;
                    warn!(
                        note_id,
                        sequence_index = chunk.sequence_index,
                        error = %err,
                        "failed to store chunk, skipping"
                    );
                }
            }
        }

        info!(
            note_id,
            generation,
            stored,
            failed,
            deleted = records_deleted,
            "note indexed"
        );
        Ok(IndexReport {
            note_id: note_id.to_string(),
            generation,
            outcome: IndexOutcome::Completed,
            chunks_total,
            chunks_stored: stored,
            chunks_failed: failed,
            records_deleted,
        })
    }

    /// Delete every record of a note and cancel any pass still in flight for it.
    ///
    /// The note's tracking slot is dropped too unless a pass still holds it.
    pub async fn remove_note(&self, note_id: &str) -> RagResult<u64> {
        let slot = self.slot(note_id);
        slot.begin();
        let guard = slot.write_lock.lock().await;
        let removed = self.store.delete_all_for_note(note_id).await?;
        self.prune_slot(note_id, &slot);
        drop(guard);
        info!(note_id, removed, "note removed from index");
        Ok(removed)
    }

    /// Number of notes with a live generation counter.
    pub fn tracked_notes(&self) -> usize {
        self.lock_slots().len()
    }

    async fn embed_chunks<'a>(
        &self,
        slot: &NoteSlot,
        generation: u64,
        chunks: &'a [Chunk],
        failed: &mut usize,
    ) -> RagResult<Vec<(&'a Chunk, Embedding)>> {
        let mut embedded = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            slot.ensure_current(&chunk.source_note_id, generation)?;
            match self.generator.embed(&chunk.text).await {
                Ok(embedding) => embedded.push((chunk, embedding)),
                Err(err) if err.is_backend_unavailable() => return Err(err),
                Err(err) => {
                    *failed += 1;
                    let failure = RagError::ChunkEmbedFailure {
                        note_id: chunk.source_note_id.clone(),
                        sequence_index: chunk.sequence_index,
                        reason: err.to_string(),
                    };
                    warn!(error = %failure, "skipping chunk");
                }
            }
        }
        Ok(embedded)
    }

    fn slot(&self, note_id: &str) -> Arc<NoteSlot> {
        self.lock_slots()
            .entry(note_id.to_string())
            .or_default()
            .clone()
    }

    /// Forget `slot` if only the map and the caller reference it. Slots are
    /// cloned under the same lock, so no pass can pick it up concurrently.
    fn prune_slot(&self, note_id: &str, slot: &Arc<NoteSlot>) {
        let mut slots = self.lock_slots();
        if let Some(current) = slots.get(note_id)
            && Arc::ptr_eq(current, slot)
            && Arc::strong_count(slot) == 2
        {
            slots.remove(note_id);
        }
    }

    fn lock_slots(&self) -> MutexGuard<'_, HashMap<String, Arc<NoteSlot>>> {
        match self.slots.lock() {
            Ok(slots) => slots,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
