//! Deterministic stand-ins for the embedding and generation backends.

#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use docchat_rag::{EmbeddingProvider, Generator, Prompt, RagError, Result, Role};

const VOCABULARY: [&str; 10] =
    ["paris", "france", "capital", "berlin", "germany", "river", "alpha", "beta", "gamma", "delta"];

/// Bag-of-words embedder over a fixed vocabulary.
///
/// Strings that share vocabulary words get similar vectors, so a question and
/// the sentence that answers it land close together.
#[derive(Default)]
pub struct KeywordEmbedder {
    /// Texts containing this marker sleep for a long time before answering.
    pub stall_on: Option<&'static str>,
    /// Delay applied to every batch.
    pub batch_delay: Option<Duration>,
    /// Per-batch delay computed from the batch's first text.
    pub delay_for: Option<fn(&str) -> Duration>,
    /// Fail every call after this many successful ones.
    pub fail_after: Option<usize>,
    /// Size reported by `dimensions()` instead of the real vector size.
    pub declared_dimensions: Option<usize>,
    pub calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn vector(text: &str) -> Vec<f32> {
        let lowered = text.to_lowercase();
        let words: Vec<&str> =
            lowered.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()).collect();
        VOCABULARY.iter().map(|term| words.iter().filter(|w| *w == term).count() as f32).collect()
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_after.is_some_and(|limit| call >= limit) {
            return Err(RagError::Embedding {
                provider: "keyword".into(),
                message: "backend unavailable".into(),
            });
        }
        if self.stall_on.is_some_and(|marker| text.contains(marker)) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Ok(Self::vector(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if let Some(delay) = self.batch_delay {
            tokio::time::sleep(delay).await;
        }
        if let (Some(delay_for), Some(first)) = (self.delay_for, texts.first()) {
            tokio::time::sleep(delay_for(first)).await;
        }
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.declared_dimensions.unwrap_or(VOCABULARY.len())
    }
}

/// Answers with the retrieved context verbatim and records every prompt.
#[derive(Default)]
pub struct EchoGenerator {
    /// Returned for question-condensing prompts.
    pub standalone: Option<String>,
    /// Fail every call.
    pub fail: bool,
    pub prompts: Mutex<Vec<Prompt>>,
}

impl EchoGenerator {
    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for EchoGenerator {
    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.clone());
        if self.fail {
            return Err(RagError::Generation { provider: "echo".into(), message: "quota".into() });
        }

        let system = prompt
            .messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.clone())
            .unwrap_or_default();

        if system.starts_with("Given the following conversation") {
            return Ok(self.standalone.clone().unwrap_or_default());
        }

        Ok(system.split("----------------\n").nth(1).unwrap_or_default().to_string())
    }

    fn name(&self) -> &str {
        "echo"
    }
}
