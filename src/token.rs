use crate::error::{Error, Result};
use std::sync::Arc;
use tiktoken_rs::CoreBPE;
use tracing::debug;

const SIMPLE_CHARS_PER_TOKEN: usize = 4;
const ENHANCED_WORD_MULTIPLIER: f64 = 1.3;
const ENHANCED_SPECIAL_DIVISOR: usize = 10;

/// Type of tokenizer to use for counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenizerKind {
    /// Exact BPE count for the configured model
    #[default]
    Tiktoken,
    /// Simple character-based estimate (~4 chars per token)
    Simple,
    /// Estimate blending word and character counts
    Enhanced,
}

impl TokenizerKind {
    /// Creates a tokenizer of this kind for the given model.
    ///
    /// Model names `tiktoken-rs` does not know fall back to the `o200k_base`
    /// encoding used by the GPT-4o family.
    ///
    /// # Errors
    ///
    /// Returns an error if no BPE encoding can be loaded.
    pub fn create(self, model: &str) -> Result<Arc<dyn TokenEstimator>> {
        Ok(match self {
            Self::Tiktoken => Arc::new(TiktokenCounter::for_model(model)?),
            Self::Simple => Arc::new(SimpleTokenizer),
            Self::Enhanced => Arc::new(EnhancedTokenizer),
        })
    }
}

/// Trait for counting tokens in text.
///
/// Implementations must be thread-safe.
pub trait TokenEstimator: Send + Sync {
    /// Returns the number of tokens in the given text.
    fn estimate(&self, text: &str) -> usize;
}

/// Exact token counter backed by the model's BPE.
pub struct TiktokenCounter {
    bpe: CoreBPE,
}

impl TiktokenCounter {
    /// Loads the encoding used by `model`.
    ///
    /// # Errors
    ///
    /// Returns an error if neither the model encoding nor the fallback loads.
    pub fn for_model(model: &str) -> Result<Self> {
        let bpe = match tiktoken_rs::get_bpe_from_model(model) {
            Ok(bpe) => bpe,
            Err(e) => {
                debug!("No encoding registered for model '{}' ({}), using o200k_base", model, e);
                tiktoken_rs::o200k_base()
                    .map_err(|e| Error::config(format!("Failed to load o200k_base encoding: {e}")))?
            }
        };

        Ok(Self { bpe })
    }
}

impl std::fmt::Debug for TiktokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TiktokenCounter").finish_non_exhaustive()
    }
}

impl TokenEstimator for TiktokenCounter {
    fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        self.bpe.encode_with_special_tokens(text).len()
    }
}

/// Simple character-based tokenizer.
///
/// Uses a heuristic of approximately 4 characters per token.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SimpleTokenizer;

impl TokenEstimator for SimpleTokenizer {
    fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }

        let char_count = text.chars().count();
        char_count
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
#[derive(Debug, Clone, Copy)]
pub(crate) struct EnhancedTokenizer;

impl TokenEstimator for EnhancedTokenizer {
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

        let base_estimate = word_estimate
            .saturating_add(char_estimate)
            .saturating_div(2);

        base_estimate.saturating_add(special_penalty).max(1)
    }
}

/// Counts whitespace-separated words. Newlines count as whitespace.
#[inline]
#[must_use]
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Counts special (non-alphanumeric) characters.
#[inline]
fn count_special_chars(text: &str) -> usize {
    text.chars()
        .filter(|c| !c.is_alphanumeric() && !c.is_whitespace())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiktoken_empty() {
        let counter = TiktokenCounter::for_model("gpt-4o").unwrap();
        assert_eq!(counter.estimate(""), 0);
    }

    #[test]
    fn test_tiktoken_matches_encoding() {
        let counter = TiktokenCounter::for_model("gpt-4o").unwrap();
        let text = "This is a test.";
        let expected = tiktoken_rs::o200k_base()
            .unwrap()
            .encode_with_special_tokens(text)
            .len();
        assert_eq!(counter.estimate(text), expected);
    }

    #[test]
    fn test_tiktoken_other_model() {
        let counter = TiktokenCounter::for_model("gpt-3.5-turbo").unwrap();
        let text = "Another test.";
        let expected = tiktoken_rs::cl100k_base()
            .unwrap()
            .encode_with_special_tokens(text)
            .len();
        assert_eq!(counter.estimate(text), expected);
    }

    #[test]
    fn test_tiktoken_unknown_model_falls_back() {
        let counter = TiktokenCounter::for_model("not-a-real-model").unwrap();
        assert!(counter.estimate("hello world") > 0);
    }

    #[test]
    fn test_simple_tokenizer_basic() {
        let tokenizer = SimpleTokenizer;
        assert_eq!(tokenizer.estimate(""), 0);
        assert_eq!(tokenizer.estimate("test"), 1);
        assert_eq!(tokenizer.estimate("hello world"), 3);
    }

    #[test]
    fn test_enhanced_tokenizer_basic() {
        let tokenizer = EnhancedTokenizer;
        assert_eq!(tokenizer.estimate(""), 0);
        let result = tokenizer.estimate("hello world");
        assert!(result > 0);
        assert!(result < 10);
    }

    #[test]
    fn test_kind_create() {
        let simple = TokenizerKind::Simple.create("gpt-4o").unwrap();
        assert_eq!(simple.estimate("a".repeat(1000).as_str()), 250);
    }

    #[test]
    fn test_count_words() {
        assert_eq!(count_words(""), 0);
        assert_eq!(count_words("hello"), 1);
        assert_eq!(count_words("  hello   world  "), 2);
        assert_eq!(count_words("line one\nline two"), 4);
    }

    #[test]
    fn test_count_special_chars() {
        assert_eq!(count_special_chars("hello"), 0);
        assert_eq!(count_special_chars("hello!"), 1);
        assert_eq!(count_special_chars("(1-2%)"), 4);
    }
}
