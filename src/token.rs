use crate::error::Result;
use std::sync::Arc;

const SIMPLE_CHARS_PER_TOKEN: usize = 4;
const ENHANCED_WORD_MULTIPLIER: f64 = 1.3;
const ENHANCED_SPECIAL_DIVISOR: usize = 10;

/// Built-in token estimation heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenizerKind {
    /// Simple character-based estimate (~4 chars per token)
    #[default]
    Simple,
    /// Word, character and punctuation weighted estimate
    Enhanced,
}

impl TokenizerKind {
    /// Creates an estimator of this kind.
    #[must_use]
    pub fn create(self) -> Arc<dyn TokenEstimator> {
        match self {
            Self::Simple => Arc::new(SimpleTokenizer),
            Self::Enhanced => Arc::new(EnhancedTokenizer),
        }
    }
}

/// Cost function mapping rendered prompt text to a token count.
///
/// Implementations must be thread-safe. Estimators backed by a real
/// tokenizer that can fail should override [`TokenEstimator::try_estimate`];
/// prompt length checks always go through it.
pub trait TokenEstimator: Send + Sync {
    /// Estimates the number of tokens in the given text.
    fn estimate(&self, text: &str) -> usize;

    /// Fallible form of [`TokenEstimator::estimate`].
    ///
    /// # Errors
    ///
    /// The default never fails; overriding implementations report failures
    /// with [`crate::Error::Tokenizer`].
    fn try_estimate(&self, text: &str) -> Result<usize> {
        Ok(self.estimate(text))
    }
}

/// Simple character-based tokenizer.
///
/// Uses a heuristic of approximately 4 characters per token.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleTokenizer;

impl TokenEstimator for SimpleTokenizer {
    fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }

        text.chars()
            .count()
            .saturating_add(SIMPLE_CHARS_PER_TOKEN - 1)
            .saturating_div(SIMPLE_CHARS_PER_TOKEN)
            .max(1)
    }
}

/// Enhanced tokenizer with multiple heuristics.
///
/// This tokenizer considers:
/// - Word count (weighted by 1.3)
/// - Character count (divided by 4)
/// - Special characters (penalty factor)
#[derive(Debug, Clone, Copy, Default)]
pub struct EnhancedTokenizer;

impl TokenEstimator for EnhancedTokenizer {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }

        let words = count_words(text);
        let chars = text.chars().count();
        let special_chars = count_special_chars(text);

        let word_estimate = (words as f64 * ENHANCED_WORD_MULTIPLIER) as usize;
        let char_estimate = chars.saturating_div(SIMPLE_CHARS_PER_TOKEN);
        let special_penalty = special_chars.saturating_div(ENHANCED_SPECIAL_DIVISOR);

        word_estimate
            .saturating_add(char_estimate)
            .saturating_div(2)
            .saturating_add(special_penalty)
            .max(1)
    }
}

/// Counts words in text (whitespace-separated).
#[inline]
fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Counts special (non-alphanumeric, non-whitespace) characters.
#[inline]
fn count_special_chars(text: &str) -> usize {
    text.chars()
        .filter(|c| !c.is_alphanumeric() && !c.is_whitespace())
        .count()
}
