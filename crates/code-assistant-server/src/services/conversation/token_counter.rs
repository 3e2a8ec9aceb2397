use std::sync::Arc;

use anyhow::{Context, Result};
use tiktoken_rs::{cl100k_base, CoreBPE};

use crate::config::TokenizerKind;
use crate::models::chat::ChatMessage;

/// Counts model tokens for a piece of text. Implementations are pure.
pub trait TokenCounter: Send + Sync {
    fn count_text(&self, text: &str) -> usize;

    fn count_messages(&self, messages: &[ChatMessage]) -> usize {
        messages.iter().map(|msg| self.count_text(&msg.content)).sum()
    }
}

/// Exact BPE counts with the `cl100k_base` encoding.
pub struct TiktokenCounter {
    bpe: CoreBPE,
}

impl TiktokenCounter {
    pub fn new() -> Result<Self> {
        let bpe = cl100k_base().context("failed to load cl100k_base encoding")?;
        Ok(Self { bpe })
    }
}

impl TokenCounter for TiktokenCounter {
    fn count_text(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }
}

/// Word-based estimate: ~1.3 tokens per word plus a small formatting overhead.
pub struct HeuristicCounter;

impl TokenCounter for HeuristicCounter {
    fn count_text(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }

        let words = text.split_whitespace().count();
        ((words as f64 * 1.3) + 5.0).ceil() as usize
    }
}

pub fn build_token_counter(kind: TokenizerKind) -> Result<Arc<dyn TokenCounter>> {
    Ok(match kind {
        TokenizerKind::Cl100kBase => Arc::new(TiktokenCounter::new()?),
        TokenizerKind::Heuristic => Arc::new(HeuristicCounter),
    })
}
