//! Prompt templates and the engine that fills them.
//!
//! Every template is a Tera template embedded in the binary. A prompt
//! directory can override any of them with a `<id>.tera` file.

use crate::error::{Error, Result};
use crate::template_validator::TemplateValidator;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tera::{Context, Tera};
use tracing::{debug, info};

const EXAMPLE_TEXT_ONE: &str = include_str!("../templates/examples/example_one.txt");
const EXAMPLE_TEXT_TWO: &str = include_str!("../templates/examples/example_two.txt");

/// Prompt template identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    /// System-role instruction sent with every request
    System,
    /// Short title
    Title,
    /// Subtitle extending the title
    Subtitle,
    /// Science summary for a general audience
    Science,
    /// Impact summary for a general audience
    Impact,
    /// General summary
    Summary,
    /// Stock photo search strings
    Figure,
    /// Photograph caption
    Caption,
    /// One sentence objective
    Objective,
    /// Methodology bullet points
    Approach,
    /// Slide impact bullet points
    PptImpact,
    /// Word-count reduction pass
    ReduceWordcount,
    /// Irrelevant content removal for oversized documents
    ReduceContent,
    /// Key findings as a figure caption
    FigureCaption,
    /// Figure recommendation from the paper
    FigureChoice,
    /// Citation
    Citation,
    /// Funding statement
    Funding,
}

impl PromptKind {
    /// Returns the ID string for this prompt.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Title => "title",
            Self::Subtitle => "subtitle",
            Self::Science => "science",
            Self::Impact => "impact",
            Self::Summary => "summary",
            Self::Figure => "figure",
            Self::Caption => "caption",
            Self::Objective => "objective",
            Self::Approach => "approach",
            Self::PptImpact => "ppt_impact",
            Self::ReduceWordcount => "reduce_wordcount",
            Self::ReduceContent => "reduce_content",
            Self::FigureCaption => "figure_caption",
            Self::FigureChoice => "figure_choice",
            Self::Citation => "citation",
            Self::Funding => "funding",
        }
    }

    /// Returns all prompt kinds.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::System,
            Self::Title,
            Self::Subtitle,
            Self::Science,
            Self::Impact,
            Self::Summary,
            Self::Figure,
            Self::Caption,
            Self::Objective,
            Self::Approach,
            Self::PptImpact,
            Self::ReduceWordcount,
            Self::ReduceContent,
            Self::FigureCaption,
            Self::FigureChoice,
            Self::Citation,
            Self::Funding,
        ]
    }

    /// Parse prompt kind from string ID.
    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        Self::all().iter().copied().find(|kind| kind.id() == id)
    }

    /// Variables a template of this kind must reference.
    #[must_use]
    pub const fn required_variables(self) -> &'static [&'static str] {
        match self {
            Self::System => &[],
            Self::Subtitle => &["content", "title"],
            Self::Approach => &["content", "objective"],
            Self::ReduceWordcount => &["content", "min_words", "max_words"],
            _ => &["content"],
        }
    }

    const fn builtin(self) -> &'static str {
        match self {
            Self::System => include_str!("../templates/prompts/system.tera"),
            Self::Title => include_str!("../templates/prompts/title.tera"),
            Self::Subtitle => include_str!("../templates/prompts/subtitle.tera"),
            Self::Science => include_str!("../templates/prompts/science.tera"),
            Self::Impact => include_str!("../templates/prompts/impact.tera"),
            Self::Summary => include_str!("../templates/prompts/summary.tera"),
            Self::Figure => include_str!("../templates/prompts/figure.tera"),
            Self::Caption => include_str!("../templates/prompts/caption.tera"),
            Self::Objective => include_str!("../templates/prompts/objective.tera"),
            Self::Approach => include_str!("../templates/prompts/approach.tera"),
            Self::PptImpact => include_str!("../templates/prompts/ppt_impact.tera"),
            Self::ReduceWordcount => include_str!("../templates/prompts/reduce_wordcount.tera"),
            Self::ReduceContent => include_str!("../templates/prompts/reduce_content.tera"),
            Self::FigureCaption => include_str!("../templates/prompts/figure_caption.tera"),
            Self::FigureChoice => include_str!("../templates/prompts/figure_choice.tera"),
            Self::Citation => include_str!("../templates/prompts/citation.tera"),
            Self::Funding => include_str!("../templates/prompts/funding.tera"),
        }
    }
}

impl std::fmt::Display for PromptKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Text a prompt is filled with.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptInputs<'a> {
    /// Source text: the document, or a prior field for derived prompts
    pub content: &'a str,
    /// Previously generated field the prompt builds on (title for the
    /// subtitle, objective for the approach). Defaults to `content`.
    pub additional: Option<&'a str>,
}

impl<'a> PromptInputs<'a> {
    /// Inputs with only source text.
    #[must_use]
    pub const fn new(content: &'a str) -> Self {
        Self {
            content,
            additional: None,
        }
    }

    /// Adds the prior field this prompt builds on.
    #[must_use]
    pub const fn with_additional(mut self, additional: Option<&'a str>) -> Self {
        self.additional = additional;
        self
    }
}

/// Renders prompt templates.
#[derive(Debug)]
pub struct PromptEngine {
    tera: Tera,
}

impl PromptEngine {
    /// Creates an engine with the built-in templates.
    ///
    /// # Errors
    ///
    /// Returns an error if a built-in template fails to compile.
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();

        for kind in PromptKind::all() {
            tera.add_raw_template(kind.id(), kind.builtin())
                .map_err(|e| Error::template(kind.id(), e))?;
        }

        Ok(Self { tera })
    }

    /// Creates an engine whose templates may be overridden from `dir`.
    ///
    /// Only files named after a prompt id (`title.tera`, `ppt_impact.tera`, ...)
    /// are considered; each is validated before it replaces the built-in.
    ///
    /// # Errors
    ///
    /// Returns an error if an override file fails validation.
    pub fn with_overrides(dir: Option<&Path>) -> Result<Self> {
        let mut engine = Self::new()?;

        let Some(dir) = dir else {
            return Ok(engine);
        };

        if !dir.is_dir() {
            return Err(Error::config(format!(
                "Prompt directory does not exist: {}",
                dir.display()
            )));
        }

        for kind in PromptKind::all() {
            let path = dir.join(format!("{}.tera", kind.id()));
            if !path.exists() {
                continue;
            }

            let content = TemplateValidator::validate_prompt(&path, kind.required_variables())?;
            engine
                .tera
                .add_raw_template(kind.id(), &content)
                .map_err(|e| Error::template(kind.id(), e))?;

            info!("Using custom '{}' prompt from {}", kind.id(), path.display());
        }

        Ok(engine)
    }

    /// Returns the system-role instruction.
    ///
    /// # Errors
    ///
    /// Returns an error if the template fails to render.
    pub fn system_scope(&self) -> Result<String> {
        self.render_with(PromptKind::System, &Context::new())
    }

    /// Fills the template for `kind`.
    ///
    /// # Errors
    ///
    /// Returns an error if the template fails to render.
    pub fn render(&self, kind: PromptKind, inputs: &PromptInputs<'_>) -> Result<String> {
        let additional = inputs.additional.unwrap_or(inputs.content);

        let mut context = Context::new();
        context.insert("content", inputs.content);

        match kind {
            PromptKind::Subtitle => context.insert("title", additional),
            PromptKind::Approach => context.insert("objective", additional),
            PromptKind::Objective => {
                context.insert("example_one", EXAMPLE_TEXT_ONE);
                context.insert("example_two", EXAMPLE_TEXT_TWO);
            }
            PromptKind::ReduceWordcount => {
                return Err(Error::template_msg(
                    kind.id(),
                    "word-count reduction prompts are built with render_reduction",
                ));
            }
            _ => {}
        }

        debug!("Rendering '{}' prompt ({} bytes of content)", kind, inputs.content.len());
        self.render_with(kind, &context)
    }

    /// Fills the word-count reduction template.
    ///
    /// # Errors
    ///
    /// Returns an error if the template fails to render.
    pub fn render_reduction(&self, min_words: usize, max_words: usize, text: &str) -> Result<String> {
        let mut context = Context::new();
        context.insert("min_words", &min_words);
        context.insert("max_words", &max_words);
        context.insert("content", text);

        self.render_with(PromptKind::ReduceWordcount, &context)
    }

    fn render_with(&self, kind: PromptKind, context: &Context) -> Result<String> {
        self.tera
            .render(kind.id(), context)
            .map(|rendered| rendered.trim().to_string())
            .map_err(|e| Error::template(kind.id(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn test_engine_creation() {
        assert!(PromptEngine::new().is_ok());
    }

    #[test]
    fn test_from_id_round_trip() {
        assert_eq!(PromptKind::from_id("ppt_impact"), Some(PromptKind::PptImpact));
        assert_eq!(PromptKind::from_id("title"), Some(PromptKind::Title));
        assert_eq!(PromptKind::from_id("unknown"), None);
    }

    #[test]
    fn test_system_scope() {
        let engine = PromptEngine::new().unwrap();
        let scope = engine.system_scope().unwrap();
        assert!(scope.starts_with("You are a technical science editor."));
        assert!(!scope.ends_with('\n'));
    }

    #[test]
    fn test_render_title() {
        let engine = PromptEngine::new().unwrap();
        let prompt = engine
            .render(PromptKind::Title, &PromptInputs::new("Drought raises power costs."))
            .unwrap();

        assert!(prompt.starts_with("Generate a title"));
        assert!(prompt.ends_with("```Drought raises power costs.```"));
    }

    #[test]
    fn test_render_subtitle_uses_title() {
        let engine = PromptEngine::new().unwrap();
        let inputs = PromptInputs::new("paper text").with_additional(Some("Heat and Drought Strain the Grid"));
        let prompt = engine.render(PromptKind::Subtitle, &inputs).unwrap();

        assert!(prompt.contains("`Heat and Drought Strain the Grid`"));
        assert!(prompt.contains("```paper text```"));
    }

    #[test]
    fn test_render_subtitle_defaults_title_to_content() {
        let engine = PromptEngine::new().unwrap();
        let prompt = engine
            .render(PromptKind::Subtitle, &PromptInputs::new("paper text"))
            .unwrap();

        assert!(prompt.contains("`paper text`"));
    }

    #[test]
    fn test_render_objective_includes_examples() {
        let engine = PromptEngine::new().unwrap();
        let prompt = engine
            .render(PromptKind::Objective, &PromptInputs::new("new study"))
            .unwrap();

        assert!(prompt.contains("TEXT: Multisector Dynamics"));
        assert!(prompt.contains("TEXT: The Role of Regional Connections"));
        assert!(prompt.ends_with("```new study```"));
    }

    #[test]
    fn test_render_approach_uses_objective() {
        let engine = PromptEngine::new().unwrap();
        let inputs = PromptInputs::new("methods text").with_additional(Some("Quantify drought impacts."));
        let prompt = engine.render(PromptKind::Approach, &inputs).unwrap();

        assert!(prompt.contains("Here is the objective statement: Quantify drought impacts."));
        assert!(prompt.contains("TEXT: methods text"));
    }

    #[test]
    fn test_render_reduction() {
        let engine = PromptEngine::new().unwrap();
        let prompt = engine.render_reduction(75, 100, "too long text").unwrap();

        assert!(prompt.contains("greater than 75 words and less than or equal to 100 words"));
        assert!(prompt.ends_with("```too long text```"));
    }

    #[test]
    fn test_render_reduce_content() {
        let engine = PromptEngine::new().unwrap();
        let prompt = engine
            .render(PromptKind::ReduceContent, &PromptInputs::new("page one"))
            .unwrap();

        assert!(prompt.starts_with("Remove irrelevant content"));
        assert!(prompt.ends_with("page one"));
    }

    #[test]
    fn test_render_rejects_reduction_kind() {
        let engine = PromptEngine::new().unwrap();
        let result = engine.render(PromptKind::ReduceWordcount, &PromptInputs::new("x"));
        assert!(result.is_err());
    }

    #[test]
    fn test_every_content_prompt_embeds_content() {
        let engine = PromptEngine::new().unwrap();
        for kind in PromptKind::all() {
            if matches!(kind, PromptKind::System | PromptKind::ReduceWordcount) {
                continue;
            }
            let prompt = engine.render(*kind, &PromptInputs::new("UNIQUE-MARKER")).unwrap();
            assert!(prompt.contains("UNIQUE-MARKER"), "{kind} does not embed content");
        }
    }

    #[test]
    fn test_override_from_directory() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("title.tera")
            .write_str("Custom title for {{ content }}")
            .unwrap();

        let engine = PromptEngine::with_overrides(Some(temp.path())).unwrap();
        let prompt = engine
            .render(PromptKind::Title, &PromptInputs::new("abc"))
            .unwrap();
        assert_eq!(prompt, "Custom title for abc");

        let science = engine
            .render(PromptKind::Science, &PromptInputs::new("abc"))
            .unwrap();
        assert!(science.starts_with("Describe the scientific results"));
    }

    #[test]
    fn test_override_invalid_template_rejected() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("subtitle.tera")
            .write_str("Subtitle without the title {{ content }}")
            .unwrap();

        let result = PromptEngine::with_overrides(Some(temp.path()));
        assert!(matches!(result, Err(Error::TemplateValidation { .. })));
    }

    #[test]
    fn test_override_missing_directory() {
        let result = PromptEngine::with_overrides(Some(Path::new("/nonexistent/prompts")));
        assert!(result.unwrap_err().is_config());
    }
}
