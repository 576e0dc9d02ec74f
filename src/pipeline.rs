use crate::{
    config::Config,
    document::{self, Document},
    error::{Error, Result},
    field,
    fill::{docx, pptx},
    llm::{ChatCompletion, Generator, OpenAiClient},
    prompt::PromptEngine,
    session::HighlightSession,
    token::TokenEstimator,
    writer::{Writer, REDUCED_OUTPUT, SLIDE_OUTPUT, WORD_OUTPUT},
};
use serde::Serialize;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{info, instrument, warn};

/// Statistics collected during pipeline execution.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStats {
    /// Name of the processed document
    pub source_name: String,

    /// Pages read from the document
    pub n_pages: usize,

    /// Tokens in the content fields were generated from
    pub n_tokens: usize,

    /// Whether the document was reduced by the model first
    pub document_reduced: bool,

    /// Number of fields generated
    pub fields_generated: usize,

    /// Number of fields that needed a word-count reduction
    pub fields_reduced: usize,

    /// Words across all generated fields
    pub total_words: usize,

    /// Total execution time
    pub duration: Duration,

    /// Time spent reading (and reducing) the document
    pub read_duration: Duration,

    /// Time spent generating fields
    pub generate_duration: Duration,

    /// Time spent filling templates
    pub fill_duration: Duration,

    /// Time spent writing
    pub write_duration: Duration,

    /// Output directory path
    pub output_directory: String,

    /// Number of files written
    pub files_written: usize,
}

impl PipelineStats {
    /// Prints a human-readable summary to stdout.
    pub fn print_summary(&self) {
        println!("\n╔═══════════════════════════════════════════════════════╗");
        println!("║            Highlight Generation Summary               ║");
        println!("╠═══════════════════════════════════════════════════════╣");
        println!("║ Document:                                             ║");
        println!("║   {:<52}║", self.source_name);
        println!(
            "║ Pages Read:           {:>8}                        ║",
            self.n_pages
        );
        println!(
            "║ Content Tokens:       {:>8}{}                ║",
            self.n_tokens,
            if self.document_reduced { " (reduced)" } else { "          " }
        );
        println!("║                                                       ║");
        println!(
            "║ Fields Generated:     {:>8}                        ║",
            self.fields_generated
        );
        println!(
            "║   - Shortened:        {:>8}                        ║",
            self.fields_reduced
        );
        println!(
            "║ Total Words:          {:>8}                        ║",
            self.total_words
        );
        println!("║                                                       ║");
        println!(
            "║ Files Written:        {:>8}                        ║",
            self.files_written
        );
        println!("║ Output Directory:                                     ║");
        println!("║   {:<52}║", self.output_directory);
        println!("║                                                       ║");
        println!("║ Timing Breakdown:                                     ║");
        println!(
            "║   - Reading:          {:>8.2}s                     ║",
            self.read_duration.as_secs_f64()
        );
        println!(
            "║   - Generating:       {:>8.2}s                     ║",
            self.generate_duration.as_secs_f64()
        );
        println!(
            "║   - Filling:          {:>8.2}s                     ║",
            self.fill_duration.as_secs_f64()
        );
        println!(
            "║   - Writing:          {:>8.2}s                     ║",
            self.write_duration.as_secs_f64()
        );
        println!(
            "║   - Total:            {:>8.2}s                     ║",
            self.duration.as_secs_f64()
        );
        println!("╚═══════════════════════════════════════════════════════╝\n");
    }
}

/// Runs a document through reading, generation, template filling and writing.
pub struct Pipeline {
    config: Config,
    input: PathBuf,
    tokenizer: Arc<dyn TokenEstimator>,
    generator: Generator,
    writer: Writer,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("input", &self.input)
            .field("model", &self.config.model)
            .field("generator", &self.generator)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Creates a pipeline that talks to the configured OpenAI-compatible endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration validation fails
    /// - No input document or API key is configured
    /// - A prompt override is invalid
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let api_key = config.api_key.as_ref().ok_or_else(|| {
            Error::config("No API key: set OPENAI_API_KEY or pass --api-key")
        })?;
        let client = OpenAiClient::new(&config.base_url, api_key.expose(), config.timeout)?;

        Self::assemble(config, Arc::new(client))
    }

    /// Creates a pipeline that sends requests to `client`.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration validation fails, no input document
    /// is configured, or a prompt override is invalid.
    pub fn with_client(config: Config, client: Arc<dyn ChatCompletion>) -> Result<Self> {
        config.validate()?;
        Self::assemble(config, client)
    }

    fn assemble(config: Config, client: Arc<dyn ChatCompletion>) -> Result<Self> {
        let input = config
            .input
            .clone()
            .ok_or_else(|| Error::config("No input document given"))?;

        let tokenizer = config.tokenizer.create(&config.model)?;
        let prompts = Arc::new(PromptEngine::with_overrides(config.prompt_dir.as_deref())?);
        let generator = Generator::new(
            client,
            prompts,
            Arc::clone(&tokenizer),
            config.model.clone(),
            config.max_allowable_tokens,
        )?;
        let writer = Writer::new(&config);

        Ok(Self {
            config,
            input,
            tokenizer,
            generator,
            writer,
        })
    }

    /// Executes the complete pipeline and returns statistics.
    ///
    /// # Process
    ///
    /// 1. **Read**: Extracts the document text up to the references
    /// 2. **Generate**: Requests every field, dependencies first
    /// 3. **Fill**: Renders the Word and PowerPoint templates
    /// 4. **Write**: Persists the filled templates and `summary.json`
    ///
    /// # Errors
    ///
    /// Returns an error if any stage fails. A document that exceeds the
    /// token budget fails at the first field that needs it unless document
    /// reduction is enabled.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use highlight::{Config, Pipeline};
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let config = Config::builder()
    ///     .input("paper.pdf")
    ///     .api_key("sk-...")
    ///     .word_template("templates/highlight.docx")
    ///     .build()?;
    ///
    /// let stats = Pipeline::new(config)?.run()?;
    /// stats.print_summary();
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip(self), fields(input = %self.input.display(), model = %self.config.model))]
    pub fn run(self) -> Result<PipelineStats> {
        let start_time = Instant::now();

        info!("Starting highlight generation");

        // Stage 1: Reading
        info!("Stage 1/4: Reading document...");
        let read_start = Instant::now();
        let (document, document_reduced) = self.read_within_budget()?;
        let read_duration = read_start.elapsed();

        let n_pages = document.n_pages;
        info!(
            "✓ Read {} in {:.2}s",
            document.source_name,
            read_duration.as_secs_f64()
        );

        // Stage 2: Generating
        info!("Stage 2/4: Generating fields...");
        let generate_start = Instant::now();
        let session = self.generate(document)?;
        let generate_duration = generate_start.elapsed();

        let fields_generated = session.fields().count();
        let fields_reduced = session.fields().filter(|(_, g)| g.reduced).count();
        let total_words = session.fields().map(|(_, g)| g.word_count).sum();

        info!(
            "✓ Generated {} fields in {:.2}s",
            fields_generated,
            generate_duration.as_secs_f64()
        );

        // Stage 3: Filling
        info!("Stage 3/4: Filling templates...");
        let fill_start = Instant::now();
        let outputs = self.fill(&session)?;
        let fill_duration = fill_start.elapsed();

        // Stage 4: Writing
        let write_start = Instant::now();
        let files_written = if self.config.dry_run {
            warn!("Dry run mode enabled - skipping file writes");
            self.print_dry_run_summary(&session, &outputs);
            0
        } else {
            info!("Stage 4/4: Writing output files...");
            let mut written = Vec::with_capacity(outputs.len());
            for (name, bytes) in &outputs {
                written.push(self.writer.write(name, bytes)?);
            }
            self.writer.write_summary(
                &session,
                self.generator.model(),
                &written,
                start_time.elapsed(),
            )?;
            written.len() + 1 // +1 for summary.json
        };
        let write_duration = write_start.elapsed();

        if !self.config.dry_run {
            info!(
                "✓ Wrote {} files in {:.2}s",
                files_written,
                write_duration.as_secs_f64()
            );
        }

        let total_duration = start_time.elapsed();

        let stats = PipelineStats {
            source_name: session.document().source_name.clone(),
            n_pages,
            n_tokens: session.document().n_tokens,
            document_reduced,
            fields_generated,
            fields_reduced,
            total_words,
            duration: total_duration,
            read_duration,
            generate_duration,
            fill_duration,
            write_duration,
            output_directory: self.writer.output_dir().display().to_string(),
            files_written,
        };

        info!(
            "✓ Highlight generated successfully in {:.2}s",
            total_duration.as_secs_f64()
        );

        Ok(stats)
    }

    /// Reduces the document with the model and writes `reduced.txt`.
    ///
    /// Returns the path written, or `None` in dry run mode.
    ///
    /// # Errors
    ///
    /// Returns an error if reading, a reduction request or the write fails.
    #[instrument(skip(self), fields(input = %self.input.display()))]
    pub fn reduce(self) -> Result<Option<PathBuf>> {
        let document = self.read()?;
        let reduced = self.reduce_document(&document)?;

        if self.config.dry_run {
            warn!("Dry run mode enabled - skipping file writes");
            println!("{}", reduced.content);
            return Ok(None);
        }

        self.writer
            .write(REDUCED_OUTPUT, reduced.content.as_bytes())
            .map(Some)
    }

    fn read(&self) -> Result<Document> {
        let document = document::read_path(
            &self.input,
            &self.config.reference_indicator,
            self.tokenizer.as_ref(),
        )?;
        info!("{}", document.specs());
        Ok(document)
    }

    /// Reads the document and applies the budget policy.
    fn read_within_budget(&self) -> Result<(Document, bool)> {
        let document = self.read()?;
        let limit = self.config.max_allowable_tokens;

        if !document.exceeds_budget(limit) {
            return Ok((document, false));
        }

        if self.config.reduce_document {
            warn!(
                "Document exceeds the token budget by {} tokens, reducing content",
                document.token_deficit(limit)
            );
            return Ok((self.reduce_document(&document)?, true));
        }

        warn!(
            "Document is too long by {} tokens ({} > {}); fields generated from it will fail. \
             Pass --reduce-document or raise --max-tokens",
            document.token_deficit(limit),
            document.n_tokens,
            limit
        );
        Ok((document, false))
    }

    fn reduce_document(&self, document: &Document) -> Result<Document> {
        let content = self.generator.reduce_content(document)?;
        let reduced = Document::from_text(
            document.source_name.clone(),
            content,
            self.tokenizer.as_ref(),
        );

        info!(
            "✓ Reduced content from {} to {} tokens",
            document.n_tokens, reduced.n_tokens
        );
        Ok(reduced)
    }

    fn generate(&self, document: Document) -> Result<HighlightSession> {
        let mut session = HighlightSession::new(document)
            .with_manual(self.config.manual.clone())
            .with_temperatures(self.config.temperatures.clone());

        let order = field::resolve_order(&self.config.fields);
        for (i, kind) in order.iter().enumerate() {
            info!("  [{}/{}] {}", i + 1, order.len(), kind.spec().label);
            session.generate(&self.generator, *kind)?;
        }

        Ok(session)
    }

    /// Renders the configured templates.
    fn fill(&self, session: &HighlightSession) -> Result<Vec<(&'static str, Vec<u8>)>> {
        let mut outputs = Vec::new();

        match self.config.word_template.as_deref() {
            Some(path) => {
                let bytes = docx::render(&read_template(path)?, &session.word_parameters())?;
                info!("✓ Filled Word template {}", path.display());
                outputs.push((WORD_OUTPUT, bytes));
            }
            None => warn!("No Word template configured - skipping {}", WORD_OUTPUT),
        }

        match self.config.ppt_template.as_deref() {
            Some(path) => {
                let bytes = pptx::render(&read_template(path)?, &session.slide_text())?;
                info!("✓ Filled PowerPoint template {}", path.display());
                outputs.push((SLIDE_OUTPUT, bytes));
            }
            None => warn!("No PowerPoint template configured - skipping {}", SLIDE_OUTPUT),
        }

        Ok(outputs)
    }

    /// Prints a summary for dry run mode.
    fn print_dry_run_summary(
        &self,
        session: &HighlightSession,
        outputs: &[(&'static str, Vec<u8>)],
    ) {
        println!("\n╔═══════════════════════════════════════════════════════╗");
        println!("║                 Dry Run Summary                       ║");
        println!("╠═══════════════════════════════════════════════════════╣");
        for (kind, generated) in session.fields() {
            println!(
                "║ {:<22}{:>8} words                  ║",
                kind.spec().label,
                generated.word_count
            );
        }
        println!("║                                                       ║");
        for (name, bytes) in outputs {
            println!("║ Would write {:<20}{:>10} bytes        ║", name, bytes.len());
        }
        println!("║ Output directory:                                     ║");
        println!("║   {:<52}║", self.writer.output_dir().display());
        println!("║                                                       ║");
        println!("║ ⚠ No files were written (dry run mode)               ║");
        println!("╚═══════════════════════════════════════════════════════╝\n");

        for (kind, generated) in session.fields() {
            println!("{}:\n{}\n", kind.spec().label, generated.text);
        }
    }
}

fn read_template(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| Error::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldKind;
    use crate::fill::tests::{build_zip, entry};
    use crate::llm::tests::ScriptedClient;
    use crate::token::TokenizerKind;
    use assert_fs::prelude::*;

    const PAPER: &str = "Drought and heat raise electricity costs across the western grid.";

    fn slide() -> String {
        let shapes: String = (0..6)
            .map(|i| {
                format!(
                    "<p:sp><p:txBody><a:bodyPr/><a:p><a:r><a:t>shape {i}</a:t></a:r></a:p>\
                     </p:txBody></p:sp>"
                )
            })
            .collect();
        format!("<p:sld><p:cSld><p:spTree>{shapes}</p:spTree></p:cSld></p:sld>")
    }

    fn builder(temp: &assert_fs::TempDir) -> crate::config::ConfigBuilder {
        let input = temp.child("paper.txt");
        input.write_str(PAPER).unwrap();

        Config::builder()
            .input(input.path())
            .output_dir(temp.path().join("out"))
            .tokenizer(TokenizerKind::Simple)
            .fields(vec![FieldKind::Subtitle])
    }

    fn run(config: Config, client: &Arc<ScriptedClient>) -> Result<PipelineStats> {
        Pipeline::with_client(config, Arc::clone(client) as Arc<dyn ChatCompletion>)?.run()
    }

    #[test]
    fn test_pipeline_fills_templates() {
        let temp = assert_fs::TempDir::new().unwrap();
        let word = temp.child("template.docx");
        word.write_binary(&build_zip(&[(
            "word/document.xml",
            "<w:document><w:body><w:p><w:r><w:t>{{ title }} / {{ subtitle }}</w:t></w:r></w:p>\
             </w:body></w:document>",
        )]))
        .unwrap();
        let slides = temp.child("template.pptx");
        slides
            .write_binary(&build_zip(&[("ppt/slides/slide1.xml", &slide())]))
            .unwrap();

        let config = builder(&temp)
            .word_template(word.path())
            .ppt_template(slides.path())
            .build()
            .unwrap();
        let client = ScriptedClient::new(&["Heat Strains the Grid", "Costs rise in dry years"]);

        let stats = run(config, &client).unwrap();

        assert_eq!(client.request_count(), 2);
        assert_eq!(stats.fields_generated, 2);
        assert_eq!(stats.files_written, 3);
        assert!(!stats.document_reduced);

        let out = temp.child("out");
        let docx = fs::read(out.child(WORD_OUTPUT).path()).unwrap();
        assert!(entry(&docx, "word/document.xml")
            .contains("<w:t>Heat Strains the Grid / Costs rise in dry years</w:t>"));

        let pptx = fs::read(out.child(SLIDE_OUTPUT).path()).unwrap();
        let filled = entry(&pptx, "ppt/slides/slide1.xml");
        assert!(filled.contains("<a:t>Heat Strains the Grid</a:t>"));
        assert!(filled.contains("<a:t>fill in</a:t>"));

        let summary: serde_json::Value =
            serde_json::from_slice(&fs::read(out.child("summary.json").path()).unwrap()).unwrap();
        assert_eq!(summary["fields"][0]["field"], "title");
        assert_eq!(summary["fields"][1]["field"], "subtitle");
    }

    #[test]
    fn test_pipeline_without_templates() {
        let temp = assert_fs::TempDir::new().unwrap();
        let config = builder(&temp).build().unwrap();
        let client = ScriptedClient::new(&["Title", "Subtitle"]);

        let stats = run(config, &client).unwrap();

        assert_eq!(stats.files_written, 1);
        assert!(temp.child("out").child("summary.json").exists());
        assert!(!temp.child("out").child(WORD_OUTPUT).exists());
    }

    #[test]
    fn test_pipeline_dry_run() {
        let temp = assert_fs::TempDir::new().unwrap();
        let config = builder(&temp).dry_run(true).build().unwrap();
        let client = ScriptedClient::new(&["Title", "Subtitle"]);

        let stats = run(config, &client).unwrap();

        assert_eq!(stats.fields_generated, 2);
        assert_eq!(stats.files_written, 0);
        assert!(!temp.child("out").exists());
    }

    fn long_paper(temp: &assert_fs::TempDir) -> PathBuf {
        // 10 lines of 200 characters: 500 tokens with the simple tokenizer
        let line = format!("{}\n", "a".repeat(199));
        let input = temp.child("long.txt");
        input.write_str(&line.repeat(10)).unwrap();
        input.path().to_path_buf()
    }

    #[test]
    fn test_pipeline_over_budget_fails_without_reduction() {
        let temp = assert_fs::TempDir::new().unwrap();
        let config = builder(&temp)
            .input(long_paper(&temp))
            .fields(vec![FieldKind::Title])
            .max_allowable_tokens(320)
            .build()
            .unwrap();
        let client = ScriptedClient::new(&["unused"]);

        let err = run(config, &client).unwrap_err();

        assert!(err.is_token_budget());
        assert_eq!(client.request_count(), 0);
    }

    #[test]
    fn test_pipeline_reduces_oversized_document() {
        let temp = assert_fs::TempDir::new().unwrap();
        let config = builder(&temp)
            .input(long_paper(&temp))
            .fields(vec![FieldKind::Title])
            .max_allowable_tokens(320)
            .reduce_document(true)
            .build()
            .unwrap();
        let client = ScriptedClient::new(&["Short."; 20]);

        let stats = run(config, &client).unwrap();

        assert!(stats.document_reduced);
        assert!(stats.n_tokens < 320);

        let count = client.request_count();
        assert!(count > 2);
        for i in 0..count - 1 {
            let request = client.request(i);
            assert!(request.temperature.abs() < f32::EPSILON);
            assert!(request.messages[1]
                .content
                .starts_with("Remove irrelevant content"));
        }
        let title = client.request(count - 1);
        assert_eq!(title.max_tokens, 50);
        assert!(title.messages[1].content.contains("Short.Short."));
    }

    #[test]
    fn test_reduce_writes_reduced_text() {
        let temp = assert_fs::TempDir::new().unwrap();
        let config = builder(&temp)
            .input(long_paper(&temp))
            .max_allowable_tokens(320)
            .build()
            .unwrap();
        let client = ScriptedClient::new(&["kept "; 20]);

        let path = Pipeline::with_client(config, Arc::clone(&client) as Arc<dyn ChatCompletion>)
            .unwrap()
            .reduce()
            .unwrap()
            .unwrap();

        assert!(path.ends_with(REDUCED_OUTPUT));
        let text = fs::read_to_string(path).unwrap();
        assert_eq!(text, "kept ".repeat(client.request_count()));
    }

    #[test]
    fn test_pipeline_requires_input() {
        let config = Config::builder().build().unwrap();
        let client = ScriptedClient::new(&[]);

        let err = Pipeline::with_client(config, client).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_pipeline_requires_api_key() {
        let temp = assert_fs::TempDir::new().unwrap();
        let config = builder(&temp).build().unwrap();

        let err = Pipeline::new(config).unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("API key"));
    }

    #[test]
    fn test_pipeline_debug_names_input_and_model() {
        let temp = assert_fs::TempDir::new().unwrap();
        let config = builder(&temp).api_key("sk-secret").build().unwrap();
        let client = ScriptedClient::new(&[]);

        let pipeline = Pipeline::with_client(config, client).unwrap();
        let debug = format!("{pipeline:?}");

        assert!(debug.contains("paper.txt"));
        assert!(debug.contains(crate::config::DEFAULT_MODEL));
        assert!(!debug.contains("sk-secret"));
    }
}
