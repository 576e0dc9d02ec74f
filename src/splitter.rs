use crate::token::TokenEstimator;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// A token-bounded slice of a document.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Sequential chunk index (0-based)
    pub index: usize,

    /// Text of the chunk
    pub text: String,

    /// 1-based numbers of the pages this chunk draws from
    pub pages: Vec<usize>,

    /// Token count of `text`
    pub total_tokens: usize,
}

impl Chunk {
    /// Creates a new chunk.
    #[must_use]
    pub fn new(index: usize, text: String, pages: Vec<usize>, total_tokens: usize) -> Self {
        Self {
            index,
            text,
            pages,
            total_tokens,
        }
    }

    /// Returns the utilization percentage (0.0 to 1.0).
    #[must_use]
    pub fn utilization(&self, max_tokens: usize) -> f64 {
        if max_tokens == 0 {
            return 0.0;
        }
        self.total_tokens as f64 / max_tokens as f64
    }
}

/// Splits document pages into chunks that fit a token limit.
pub struct Splitter {
    max_chunk_tokens: usize,
    tokenizer: Arc<dyn TokenEstimator>,
}

impl Splitter {
    /// Creates a splitter producing chunks of at most `max_chunk_tokens`.
    pub fn new(max_chunk_tokens: usize, tokenizer: Arc<dyn TokenEstimator>) -> Self {
        Self {
            max_chunk_tokens: max_chunk_tokens.max(1),
            tokenizer,
        }
    }

    /// Splits pages into chunks respecting the token limit.
    ///
    /// # Algorithm
    ///
    /// 1. Whole pages that fit are grouped together
    /// 2. Oversized pages are split at line boundaries
    /// 3. Lines that alone exceed the limit are split at word boundaries
    /// 4. Words that alone exceed the limit are split between characters
    pub fn split(&self, pages: &[String]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut builder = ChunkBuilder::new(self.max_chunk_tokens);

        for (i, page) in pages.iter().enumerate() {
            let page_number = i + 1;
            if page.trim().is_empty() {
                continue;
            }

            let tokens = self.tokenizer.estimate(page);
            if tokens <= self.max_chunk_tokens {
                if !builder.can_fit(tokens) {
                    self.flush(&mut builder, &mut chunks);
                }
                builder.add(page, page_number, tokens);
            } else {
                debug!(
                    "Page {} exceeds limit ({} tokens), splitting at line boundaries",
                    page_number, tokens
                );
                self.flush(&mut builder, &mut chunks);
                self.split_large_page(page, page_number, &mut builder, &mut chunks);
                self.flush(&mut builder, &mut chunks);
            }
        }

        self.flush(&mut builder, &mut chunks);
        self.log_split_results(&chunks);

        chunks
    }

    /// Feeds an oversized page line by line, falling back to words.
    fn split_large_page(
        &self,
        page: &str,
        page_number: usize,
        builder: &mut ChunkBuilder,
        chunks: &mut Vec<Chunk>,
    ) {
        for line in page.split_inclusive('\n') {
            let tokens = self.tokenizer.estimate(line);

            if tokens <= self.max_chunk_tokens {
                if !builder.can_fit(tokens) {
                    self.flush(builder, chunks);
                }
                builder.add(line, page_number, tokens);
                continue;
            }

            trace!("Line of {} tokens on page {} split at words", tokens, page_number);
            for word in line.split_inclusive(char::is_whitespace) {
                let mut rest = word;
                while !rest.is_empty() {
                    let piece = self.fitting_prefix(rest);
                    let tokens = self.tokenizer.estimate(piece);
                    if !builder.can_fit(tokens) {
                        self.flush(builder, chunks);
                    }
                    builder.add(piece, page_number, tokens);
                    rest = &rest[piece.len()..];
                }
            }
        }
    }

    /// Longest prefix of `text` that fits the limit, found by shrinking a
    /// proportional guess. Always at least one character.
    fn fitting_prefix<'a>(&self, text: &'a str) -> &'a str {
        let tokens = self.tokenizer.estimate(text);
        if tokens <= self.max_chunk_tokens {
            return text;
        }

        let mut take = (text.chars().count() * self.max_chunk_tokens / tokens).max(1);
        loop {
            let end = text.char_indices().nth(take).map_or(text.len(), |(i, _)| i);
            let prefix = &text[..end];
            if take == 1 || self.tokenizer.estimate(prefix) <= self.max_chunk_tokens {
                return prefix;
            }
            take /= 2;
        }
    }

    /// Moves the builder's content into a finished chunk.
    fn flush(&self, builder: &mut ChunkBuilder, chunks: &mut Vec<Chunk>) {
        let old = std::mem::replace(builder, ChunkBuilder::new(self.max_chunk_tokens));
        let Some((text, pages)) = old.build() else {
            return;
        };

        let total_tokens = self.tokenizer.estimate(&text);
        if total_tokens > self.max_chunk_tokens {
            warn!(
                "Chunk {} has {} tokens (exceeds limit of {})",
                chunks.len() + 1,
                total_tokens,
                self.max_chunk_tokens
            );
        }

        chunks.push(Chunk::new(chunks.len(), text, pages, total_tokens));
    }

    /// Logs results of the splitting operation.
    fn log_split_results(&self, chunks: &[Chunk]) {
        if chunks.is_empty() {
            return;
        }

        let avg_utilization = chunks
            .iter()
            .map(|c| c.utilization(self.max_chunk_tokens))
            .sum::<f64>()
            / chunks.len() as f64;

        debug!(
            "Created {} chunks (avg utilization: {:.1}%)",
            chunks.len(),
            avg_utilization * 100.0
        );
    }
}

/// Builder for constructing chunks incrementally.
struct ChunkBuilder {
    text: String,
    pages: Vec<usize>,
    current_tokens: usize,
    max_tokens: usize,
}

impl ChunkBuilder {
    fn new(max_tokens: usize) -> Self {
        Self {
            text: String::new(),
            pages: Vec::new(),
            current_tokens: 0,
            max_tokens,
        }
    }

    fn can_fit(&self, tokens: usize) -> bool {
        self.current_tokens + tokens <= self.max_tokens
    }

    fn add(&mut self, text: &str, page: usize, tokens: usize) {
        self.current_tokens += tokens;
        self.text.push_str(text);
        if self.pages.last() != Some(&page) {
            self.pages.push(page);
        }
    }

    fn build(self) -> Option<(String, Vec<usize>)> {
        if self.text.trim().is_empty() {
            None
        } else {
            Some((self.text, self.pages))
        }
    }
}
