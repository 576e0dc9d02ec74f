//! Chat-completion client and the generation rules built on top of it.
//!
//! [`Generator`] owns everything a request needs (client, model, system
//! instruction, token budget) and applies the two post-processing rules:
//! the token budget check before every call and the single word-count
//! reduction pass after a field is generated.

mod openai;

pub use openai::OpenAiClient;

use crate::config::Config;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::prompt::{PromptEngine, PromptInputs, PromptKind};
use crate::splitter::Splitter;
use crate::token::{count_words, TokenEstimator};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Tokens kept free in every content reduction request for message framing.
const REDUCTION_MARGIN_TOKENS: usize = 64;

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `system`, `user` or `assistant`
    pub role: String,
    /// Message text
    pub content: String,
}

impl ChatMessage {
    /// System-role message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// User-role message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Body of a chat-completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    /// Model name
    pub model: String,
    /// Conversation, system instruction first
    pub messages: Vec<ChatMessage>,
    /// Completion token ceiling
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
}

/// A hosted chat-completion endpoint.
pub trait ChatCompletion: Send + Sync {
    /// Sends `request` and returns the text of the first choice.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response has no content.
    fn complete(&self, request: &ChatRequest) -> Result<String>;
}

/// Completion limits for one field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    /// Completion token ceiling
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Word ceiling that triggers the reduction pass
    pub max_word_count: Option<usize>,
    /// Lower bound asked for in the reduction pass
    pub min_word_count: usize,
}

/// Text returned for a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Generated {
    /// Final response text
    pub text: String,
    /// Words in `text`
    pub word_count: usize,
    /// Whether the reduction pass ran
    pub reduced: bool,
    /// Words in the first response
    pub original_word_count: usize,
}

/// Issues prompts against a [`ChatCompletion`] endpoint.
pub struct Generator {
    client: Arc<dyn ChatCompletion>,
    prompts: Arc<PromptEngine>,
    tokenizer: Arc<dyn TokenEstimator>,
    model: String,
    max_allowable_tokens: usize,
    system_scope: String,
}

impl Generator {
    /// Creates a generator.
    ///
    /// # Errors
    ///
    /// Returns an error if the system instruction fails to render.
    pub fn new(
        client: Arc<dyn ChatCompletion>,
        prompts: Arc<PromptEngine>,
        tokenizer: Arc<dyn TokenEstimator>,
        model: impl Into<String>,
        max_allowable_tokens: usize,
    ) -> Result<Self> {
        let system_scope = prompts.system_scope()?;

        Ok(Self {
            client,
            prompts,
            tokenizer,
            model: model.into(),
            max_allowable_tokens,
            system_scope,
        })
    }

    /// Model requests are sent to.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Prompt engine used for reduction prompts.
    #[must_use]
    pub fn prompts(&self) -> &PromptEngine {
        &self.prompts
    }

    /// Sends one prompt and returns the response text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TokenBudget`] without calling the model when the
    /// prompt plus `max_tokens` exceeds the allowable tokens, or the client
    /// error otherwise.
    pub fn generate(&self, prompt: &str, max_tokens: u32, temperature: f32) -> Result<String> {
        let requested = self.tokenizer.estimate(prompt) + max_tokens as usize;
        if requested > self.max_allowable_tokens {
            return Err(Error::token_budget(requested, self.max_allowable_tokens));
        }

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(self.system_scope.as_str()),
                ChatMessage::user(prompt),
            ],
            max_tokens,
            temperature,
        };

        debug!(
            "Requesting {} (max_tokens={}, temperature={:.2}, {} prompt tokens)",
            self.model,
            max_tokens,
            temperature,
            requested - max_tokens as usize
        );

        self.client.complete(&request)
    }

    /// Generates a field, shortening the response once if it is too long.
    ///
    /// The second response is returned whatever its length.
    ///
    /// # Errors
    ///
    /// Returns an error if either request fails.
    pub fn generate_field(&self, prompt: &str, params: &GenerationParams) -> Result<Generated> {
        let first = self.generate(prompt, params.max_tokens, params.temperature)?;
        let original_word_count = count_words(&first);

        let Some(max_words) = params.max_word_count else {
            return Ok(Generated {
                text: first,
                word_count: original_word_count,
                reduced: false,
                original_word_count,
            });
        };

        if original_word_count <= max_words {
            return Ok(Generated {
                text: first,
                word_count: original_word_count,
                reduced: false,
                original_word_count,
            });
        }

        info!(
            "Response has {} words (limit {}), asking for a shorter version",
            original_word_count, max_words
        );

        let reduction = self
            .prompts
            .render_reduction(params.min_word_count, max_words, &first)?;
        let text = self.generate(&reduction, params.max_tokens, params.temperature)?;
        let word_count = count_words(&text);

        if word_count > max_words {
            warn!("Reduced response still has {} words (limit {})", word_count, max_words);
        }

        Ok(Generated {
            text,
            word_count,
            reduced: true,
            original_word_count,
        })
    }

    /// Strips irrelevant content from a document chunk by chunk.
    ///
    /// Each chunk is sized so that the prompt and a response as long as the
    /// chunk fit the allowable tokens together.
    ///
    /// # Errors
    ///
    /// Returns an error if the budget cannot hold any content or a request
    /// fails.
    #[instrument(skip(self, document), fields(source = %document.source_name))]
    pub fn reduce_content(&self, document: &Document) -> Result<String> {
        let framing = self
            .tokenizer
            .estimate(&self.prompts.render(PromptKind::ReduceContent, &PromptInputs::new(""))?);

        let chunk_budget = self
            .max_allowable_tokens
            .saturating_sub(framing + REDUCTION_MARGIN_TOKENS)
            / 2;
        if chunk_budget == 0 {
            return Err(Error::config(format!(
                "max allowable tokens ({}) leave no room for content reduction",
                self.max_allowable_tokens
            )));
        }

        let chunks = Splitter::new(chunk_budget, Arc::clone(&self.tokenizer)).split(&document.pages);
        info!("Reducing {} in {} chunks", document.source_name, chunks.len());

        let mut content = String::new();
        for chunk in &chunks {
            let prompt = self
                .prompts
                .render(PromptKind::ReduceContent, &PromptInputs::new(&chunk.text))?;
            let max_tokens = u32::try_from(chunk.total_tokens).unwrap_or(u32::MAX);

            debug!(
                "Chunk {}/{} (pages {:?}, {} tokens)",
                chunk.index + 1,
                chunks.len(),
                chunk.pages,
                chunk.total_tokens
            );
            content.push_str(&self.generate(&prompt, max_tokens, 0.0)?);
        }

        Ok(content)
    }
}

impl std::fmt::Debug for Generator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generator")
            .field("model", &self.model)
            .field("max_allowable_tokens", &self.max_allowable_tokens)
            .finish_non_exhaustive()
    }
}

/// Every configured model as `"provider: model"`.
#[must_use]
pub fn list_models(config: &Config) -> Vec<String> {
    config
        .providers
        .iter()
        .flat_map(|(provider, spec)| {
            spec.models
                .iter()
                .map(move |model| format!("{provider}: {model}"))
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::token::SimpleTokenizer;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Returns scripted responses in order and records every request.
    #[derive(Default)]
    pub(crate) struct ScriptedClient {
        responses: Mutex<VecDeque<String>>,
        pub(crate) requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedClient {
        pub(crate) fn new(responses: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.iter().map(|r| (*r).to_string()).collect()),
                requests: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        pub(crate) fn request(&self, index: usize) -> ChatRequest {
            self.requests.lock().unwrap()[index].clone()
        }
    }

    impl ChatCompletion for ScriptedClient {
        fn complete(&self, request: &ChatRequest) -> Result<String> {
            self.requests.lock().unwrap().push(request.clone());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| Error::api(None, "no scripted response left"))
        }
    }

    pub(crate) fn generator(client: &Arc<ScriptedClient>, max_allowable_tokens: usize) -> Generator {
        Generator::new(
            Arc::clone(client) as Arc<dyn ChatCompletion>,
            Arc::new(PromptEngine::new().unwrap()),
            Arc::new(SimpleTokenizer),
            "gpt-4o",
            max_allowable_tokens,
        )
        .unwrap()
    }

    fn words(n: usize) -> String {
        vec!["word"; n].join(" ")
    }

    fn limited(max_words: usize, min_words: usize) -> GenerationParams {
        GenerationParams {
            max_tokens: 200,
            temperature: 0.3,
            max_word_count: Some(max_words),
            min_word_count: min_words,
        }
    }

    #[test]
    fn test_generate_sends_system_and_user() {
        let client = ScriptedClient::new(&["A Title"]);
        let generator = generator(&client, 8192);

        let text = generator.generate("make a title", 50, 0.2).unwrap();
        assert_eq!(text, "A Title");

        let request = client.request(0);
        assert_eq!(request.model, "gpt-4o");
        assert_eq!(request.max_tokens, 50);
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, "system");
        assert!(request.messages[0].content.starts_with("You are a technical science editor."));
        assert_eq!(request.messages[1], ChatMessage::user("make a title"));
    }

    #[test]
    fn test_generate_rejects_over_budget() {
        let client = ScriptedClient::new(&["unused"]);
        let generator = generator(&client, 100);

        // 400 chars -> 100 tokens, plus 50 completion tokens
        let err = generator.generate(&"a".repeat(400), 50, 0.0).unwrap_err();

        match err {
            Error::TokenBudget { requested, limit, excess } => {
                assert_eq!(requested, 150);
                assert_eq!(limit, 100);
                assert_eq!(excess, 50);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(client.request_count(), 0);
    }

    #[test]
    fn test_generate_at_exact_budget() {
        let client = ScriptedClient::new(&["ok"]);
        let generator = generator(&client, 150);

        assert_eq!(generator.generate(&"a".repeat(400), 50, 0.0).unwrap(), "ok");
    }

    #[test]
    fn test_generate_field_within_limit() {
        let response = words(80);
        let client = ScriptedClient::new(&[&response]);
        let generator = generator(&client, 8192);

        let generated = generator.generate_field("prompt", &limited(100, 75)).unwrap();

        assert!(!generated.reduced);
        assert_eq!(generated.word_count, 80);
        assert_eq!(client.request_count(), 1);
    }

    #[test]
    fn test_generate_field_reduces_once() {
        let long = words(140);
        let short = words(90);
        let client = ScriptedClient::new(&[&long, &short]);
        let generator = generator(&client, 8192);

        let generated = generator.generate_field("prompt", &limited(100, 75)).unwrap();

        assert!(generated.reduced);
        assert_eq!(generated.original_word_count, 140);
        assert_eq!(generated.word_count, 90);
        assert_eq!(generated.text, short);

        let second = client.request(1);
        assert_eq!(second.max_tokens, 200);
        assert!((second.temperature - 0.3).abs() < f32::EPSILON);
        assert!(second.messages[1]
            .content
            .contains("greater than 75 words and less than or equal to 100 words"));
        assert!(second.messages[1].content.contains(&long));
    }

    #[test]
    fn test_generate_field_keeps_second_response_even_if_long() {
        let long = words(140);
        let still_long = words(120);
        let client = ScriptedClient::new(&[&long, &still_long]);
        let generator = generator(&client, 8192);

        let generated = generator.generate_field("prompt", &limited(100, 75)).unwrap();

        assert!(generated.reduced);
        assert_eq!(generated.word_count, 120);
        assert_eq!(client.request_count(), 2);
    }

    #[test]
    fn test_generate_field_without_ceiling() {
        let long = words(500);
        let client = ScriptedClient::new(&[&long]);
        let generator = generator(&client, 8192);

        let params = GenerationParams {
            max_word_count: None,
            ..limited(0, 0)
        };
        let generated = generator.generate_field("prompt", &params).unwrap();

        assert!(!generated.reduced);
        assert_eq!(client.request_count(), 1);
    }

    #[test]
    fn test_reduce_content_per_chunk() {
        let client = ScriptedClient::new(&["first. ", "second."]);
        let generator = generator(&client, 400);
        let mut document = Document::from_text("paper.txt", String::new(), &SimpleTokenizer);
        document.pages = vec!["a".repeat(400), "b".repeat(400)];

        let reduced = generator.reduce_content(&document).unwrap();

        assert_eq!(reduced, "first. second.");
        assert_eq!(client.request_count(), 2);

        let request = client.request(0);
        assert_eq!(request.max_tokens, 100);
        assert_eq!(request.temperature, 0.0);
        assert!(request.messages[1]
            .content
            .starts_with("Remove irrelevant content from the following text."));
    }

    #[test]
    fn test_reduce_content_budget_too_small() {
        let client = ScriptedClient::new(&[]);
        let generator = generator(&client, 10);
        let document = Document::from_text("paper.txt", "text".to_string(), &SimpleTokenizer);

        assert!(generator.reduce_content(&document).unwrap_err().is_config());
    }
}
