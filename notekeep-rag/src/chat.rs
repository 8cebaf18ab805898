//! Chatting with one note: retrieval, prompt rendering, and streamed completion.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use tracing::{debug, warn};

use notekeep_core::PromptTurn;

use crate::errors::RagResult;
use crate::prompt::PromptFormat;
use crate::session::{ContextAssembler, Exchange, PreparedTurn, RetrievalSession};

pub type FragmentStream = BoxStream<'static, RagResult<String>>;

/// A language model that turns a raw prompt into streamed text.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn stream_completion(&self, prompt: &str, stop: &[&str]) -> RagResult<FragmentStream>;
}

/// Answer produced by [`ChatSession::ask`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub answer: String,
    pub context_block: String,
    pub surfaced: Vec<String>,
}

pub struct ChatSession<B: CompletionBackend> {
    retrieval: RetrievalSession,
    assembler: ContextAssembler,
    backend: B,
    format: Box<dyn PromptFormat>,
    system_prompt: String,
    history_turns: usize,
}

impl<B: CompletionBackend> std::fmt::Debug for ChatSession<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("retrieval", &self.retrieval)
            .field("format", &self.format.family())
            .field("history_turns", &self.history_turns)
            .finish()
    }
}

impl<B: CompletionBackend> ChatSession<B> {
    pub fn new(
        retrieval: RetrievalSession,
        assembler: ContextAssembler,
        backend: B,
        format: Box<dyn PromptFormat>,
        system_prompt: impl Into<String>,
        history_turns: usize,
    ) -> Self {
        Self {
            retrieval,
            assembler,
            backend,
            format,
            system_prompt: system_prompt.into(),
            history_turns,
        }
    }

    pub fn retrieval(&self) -> &RetrievalSession {
        &self.retrieval
    }

    /// Turns sent to the model for `question`: system prompt, the recent
    /// history window, then the question with its context block.
    ///
    /// Past questions keep the context block they were asked with, since a
    /// chunk is surfaced only once while its exchange is in the window.
    pub fn build_turns(&self, question: &str, context_block: &str) -> Vec<PromptTurn> {
        let history = self.retrieval.recent_exchanges(self.history_turns);
        let mut turns = Vec::with_capacity(history.len() * 2 + 2);
        if !self.system_prompt.trim().is_empty() {
            turns.push(PromptTurn::system(&self.system_prompt));
        }
        for exchange in history {
            turns.push(PromptTurn::user_with_context(
                &exchange.question,
                &exchange.context_block,
            ));
            turns.push(PromptTurn::assistant(&exchange.answer));
        }
        turns.push(PromptTurn::user_with_context(question, context_block));
        turns
    }

    /// Ask a question about the note, passing each streamed fragment to
    /// `on_fragment` as it arrives.
    ///
    /// The exchange is recorded only when the completion finishes. Chunks
    /// surfaced for a failed turn stay marked as used. Exchanges that fall out
    /// of the history window release their chunks for later retrieval.
    pub async fn ask<F>(&mut self, question: &str, mut on_fragment: F) -> RagResult<ChatReply>
    where
        F: FnMut(&str) + Send,
    {
        let PreparedTurn {
            context_block,
            surfaced,
        } = self
            .assembler
            .prepare_turn(&mut self.retrieval, question)
            .await?;

        let prompt = self
            .format
            .render(&self.build_turns(question, &context_block));
        debug!(
            note_id = self.retrieval.note_id(),
            prompt_len = prompt.len(),
            "sending prompt"
        );

        let mut stream = self
            .backend
            .stream_completion(&prompt, self.format.stop_sequences())
            .await?;
        let mut answer = String::new();
        while let Some(fragment) = stream.next().await {
            match fragment {
                Ok(fragment) => {
                    on_fragment(&fragment);
                    answer.push_str(&fragment);
                }
                Err(err) => {
                    warn!(note_id = self.retrieval.note_id(), error = %err, "completion failed");
                    return Err(err);
                }
            }
        }

        let answer = trim_stop_sequences(&answer, self.format.stop_sequences());
        self.retrieval.record_exchange(Exchange {
            question: question.to_string(),
            context_block: context_block.clone(),
            surfaced: surfaced.clone(),
            answer: answer.clone(),
        });
        let released = self.retrieval.retain_recent(self.history_turns);
        if released > 0 {
            debug!(
                note_id = self.retrieval.note_id(),
                released, "released chunks from evicted exchanges"
            );
        }

        Ok(ChatReply {
            answer,
            context_block,
            surfaced,
        })
    }
}

/// Cut the answer at the first stop marker the backend echoed back.
fn trim_stop_sequences(answer: &str, stop: &[&str]) -> String {
    let end = stop
        .iter()
        .filter_map(|marker| answer.find(marker))
        .min()
        .unwrap_or(answer.len());
    answer[..end].trim().to_string()
}
