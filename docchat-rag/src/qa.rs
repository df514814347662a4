//! Retrieval-augmented question answering.
//!
//! [`RetrievalQa`] answers one question at a time against a built
//! [`VectorIndex`]: embed → search → prompt → generate. It keeps no
//! conversation state; callers own a [`Conversation`] and pass its turns in.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::{DocChatConfig, HistoryMode};
use crate::document::SearchResult;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::{Generator, Message, Prompt};
use crate::index::VectorIndex;

const ANSWER_INSTRUCTIONS: &str = "Use the following pieces of context to answer the user's \
question. If you don't know the answer, just say that you don't know, don't try to make up an \
answer.";

const CONDENSE_INSTRUCTIONS: &str = "Given the following conversation and a follow up question, \
rephrase the follow up question to be a standalone question, in its original language.";

/// One question/answer exchange.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationTurn {
    /// The question as the user asked it.
    pub question: String,
    /// The generated answer.
    pub answer: String,
    /// IDs of the chunks the answer was generated from, best first.
    pub retrieved_chunk_ids: Vec<String>,
    /// When the answer was produced.
    pub timestamp: DateTime<Utc>,
}

/// A caller-owned, ordered chat history.
///
/// Turns are kept in the order they were recorded. When several questions are
/// in flight at once the caller decides the order they are recorded in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conversation {
    turns: Vec<ConversationTurn>,
}

impl Conversation {
    /// Start an empty conversation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the exchange of `question` and `answer`.
    pub fn record(&mut self, question: impl Into<String>, answer: &Answer) -> &ConversationTurn {
        self.turns.push(ConversationTurn {
            question: question.into(),
            answer: answer.answer.clone(),
            retrieved_chunk_ids: answer.source_chunks.iter().map(|r| r.chunk.id.clone()).collect(),
            timestamp: Utc::now(),
        });
        &self.turns[self.turns.len() - 1]
    }

    /// All turns, oldest first.
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// Number of recorded turns.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether no turn has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Forget every turn.
    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

/// The result of [`RetrievalQa::ask`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    /// The generated answer text.
    pub answer: String,
    /// The chunks given to the model, in search-result order.
    pub source_chunks: Vec<SearchResult>,
    /// The question used for retrieval: the original, or its standalone rewrite.
    pub question_used: String,
}

/// Run `future` with a deadline, mapping expiry to [`RagError::Timeout`].
pub(crate) async fn with_timeout<T>(
    operation: &str,
    after: Duration,
    future: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(after, future).await.map_err(|_| {
        warn!(operation, ?after, "external call timed out");
        RagError::Timeout { operation: operation.to_string(), after }
    })?
}

/// Build the answering prompt: context, then history, then the question.
pub fn build_answer_prompt(
    question: &str,
    sources: &[SearchResult],
    history: &[ConversationTurn],
) -> Prompt {
    let context =
        sources.iter().map(|result| result.chunk.text.as_str()).collect::<Vec<_>>().join("\n\n");

    let mut prompt = Prompt::new();
    prompt.push(Message::system(format!("{ANSWER_INSTRUCTIONS}\n----------------\n{context}")));
    for turn in history {
        prompt.push(Message::user(turn.question.as_str()));
        prompt.push(Message::assistant(turn.answer.as_str()));
    }
    prompt.push(Message::user(question));
    prompt
}

/// Build the prompt asking the model to make `question` self-contained.
pub fn build_condense_prompt(question: &str, history: &[ConversationTurn]) -> Prompt {
    let transcript = history
        .iter()
        .map(|turn| format!("Human: {}\nAssistant: {}", turn.question, turn.answer))
        .collect::<Vec<_>>()
        .join("\n");

    let mut prompt = Prompt::new();
    prompt.push(Message::system(CONDENSE_INSTRUCTIONS));
    prompt.push(Message::user(format!(
        "Chat History:\n{transcript}\nFollow Up Input: {question}\nStandalone question:"
    )));
    prompt
}

/// Question answering over one built [`VectorIndex`].
///
/// Holding a `RetrievalQa` implies holding a successfully built index, so a
/// question can never be asked of an empty corpus.
///
/// # Example
///
/// ```rust,ignore
/// let qa = RetrievalQa::new(index, embedder, generator, &config);
/// let mut conversation = Conversation::new();
/// let answer = qa.ask("What is the capital of France?", conversation.turns()).await?;
/// conversation.record("What is the capital of France?", &answer);
/// ```
#[derive(Clone)]
pub struct RetrievalQa {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn Generator>,
    top_k: usize,
    similarity_threshold: Option<f32>,
    history_mode: HistoryMode,
    condense_question: bool,
    timeout: Duration,
}

impl RetrievalQa {
    /// Create a QA chain over `index` using the retrieval settings in `config`.
    pub fn new(
        index: Arc<VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn Generator>,
        config: &DocChatConfig,
    ) -> Self {
        Self {
            index,
            embedder,
            generator,
            top_k: config.top_k,
            similarity_threshold: config.similarity_threshold,
            history_mode: config.history_mode,
            condense_question: config.condense_question,
            timeout: config.request_timeout(),
        }
    }

    /// The index this chain retrieves from.
    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Answer `question`, given the earlier turns of the conversation.
    ///
    /// With [`HistoryMode::Discard`] the history is ignored. Otherwise a
    /// non-empty history is replayed into the prompt and, if enabled, used to
    /// rewrite the question into a standalone one before retrieval.
    ///
    /// # Errors
    ///
    /// - [`RagError::InvalidArgument`] for a blank question
    /// - [`RagError::Embedding`] / [`RagError::Generation`] from the backends
    /// - [`RagError::Timeout`] if a backend call exceeds the configured deadline
    pub async fn ask(&self, question: &str, history: &[ConversationTurn]) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::InvalidArgument("question must not be empty".into()));
        }

        let history: &[ConversationTurn] = match self.history_mode {
            HistoryMode::Replay => history,
            HistoryMode::Discard => &[],
        };

        let question_used = if self.condense_question && !history.is_empty() {
            self.condense(question, history).await?
        } else {
            question.to_string()
        };

        let query_embedding =
            with_timeout("query embedding", self.timeout, self.embedder.embed(&question_used))
                .await
                .inspect_err(|e| error!(error = %e, "query embedding failed"))?;

        let mut source_chunks = self.index.search(&query_embedding, self.top_k)?;
        if let Some(threshold) = self.similarity_threshold {
            source_chunks.retain(|r| r.score >= threshold);
        }
        debug!(retrieved = source_chunks.len(), top_k = self.top_k, "retrieved context");

        let prompt = build_answer_prompt(&question_used, &source_chunks, history);
        let answer =
            with_timeout("answer generation", self.timeout, self.generator.generate(&prompt))
                .await
                .inspect_err(|e| {
                    error!(generator = self.generator.name(), error = %e, "generation failed")
                })?;

        info!(
            sources = source_chunks.len(),
            history_turns = history.len(),
            condensed = question_used != question,
            "question answered"
        );

        Ok(Answer { answer, source_chunks, question_used })
    }

    async fn condense(&self, question: &str, history: &[ConversationTurn]) -> Result<String> {
        let prompt = build_condense_prompt(question, history);
        let standalone =
            with_timeout("question condensing", self.timeout, self.generator.generate(&prompt))
                .await?;
        let standalone = standalone.trim();
        if standalone.is_empty() {
            return Ok(question.to_string());
        }
        debug!(original = question, standalone, "condensed follow-up question");
        Ok(standalone.to_string())
    }
}
