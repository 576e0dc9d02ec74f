//! # highlight
//!
//! Generates research highlight content from a paper with an
//! OpenAI-compatible chat model and fills Word and PowerPoint templates.
//!
//! ## Features
//!
//! - PDF and plain text input, read up to the reference section
//! - Exact token budgeting with `tiktoken`
//! - One editable prompt template per highlight field
//! - A single word-count reduction pass for responses over their limit
//! - Optional model-driven reduction of documents over the token budget
//! - `.docx` placeholder filling and `.pptx` first-slide filling
//! - Atomic file operations with automatic backups
//!
//! ## Quick Start
//!
//! ```no_run
//! use highlight::{Config, Pipeline};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::builder()
//!     .input("paper.pdf")
//!     .api_key("sk-...")
//!     .word_template("highlight_template.docx")
//!     .ppt_template("highlight_template.pptx")
//!     .output_dir("./out")
//!     .build()?;
//!
//! Pipeline::new(config)?.run()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! The library follows a pipeline architecture:
//! 1. **Document**: Extracts text and counts pages, words and tokens
//! 2. **Session**: Generates each field from the document or an earlier field
//! 3. **Generator**: Checks the token budget and shortens long responses
//! 4. **Fill**: Renders the Word and PowerPoint templates
//! 5. **Writer**: Persists outputs and `summary.json` atomically

#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery
)]
#![allow(clippy::module_name_repetitions)]

mod config;
mod error;
mod pipeline;
mod splitter;
mod template_validator;
mod token;
mod writer;

pub mod document;
pub mod field;
pub mod fill;
pub mod llm;
pub mod prompt;
pub mod session;

pub use config::{
    ApiKey, Config, ConfigBuilder, FileConfig, ProviderConfig, DEFAULT_BASE_URL,
    DEFAULT_CONFIG_FILE, DEFAULT_MODEL,
};
pub use document::{Document, DocumentKind};
pub use error::{Error, Result};
pub use field::FieldKind;
pub use llm::{ChatCompletion, Generated, Generator, OpenAiClient};
pub use pipeline::{Pipeline, PipelineStats};
pub use session::{HighlightSession, ManualFields};
pub use splitter::{Chunk, Splitter};
pub use token::{count_words, TiktokenCounter, TokenEstimator, TokenizerKind};

/// Runs the complete highlight pipeline with the given configuration.
///
/// This is the main entry point for the library.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration is invalid or no API key is set
/// - The document cannot be read
/// - A generation request fails or exceeds the token budget
/// - A template cannot be filled
/// - Output files cannot be written
///
/// # Examples
///
/// ```no_run
/// use highlight::{Config, run};
///
/// # fn main() -> anyhow::Result<()> {
/// let config = Config::builder()
///     .input("paper.pdf")
///     .api_key("sk-...")
///     .build()?;
///
/// let stats = run(config)?;
/// println!("{} fields generated", stats.fields_generated);
/// # Ok(())
/// # }
/// ```
pub fn run(config: Config) -> Result<PipelineStats> {
    Pipeline::new(config)?.run()
}
