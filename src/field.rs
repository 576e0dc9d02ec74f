//! Catalogue of the highlight fields and their generation defaults.

use crate::prompt::PromptKind;
use serde::{Deserialize, Serialize};

/// A generated highlight field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Highlight title
    Title,
    /// Subtitle extending the title
    Subtitle,
    /// Science summary
    Science,
    /// Impact summary
    Impact,
    /// General summary
    Summary,
    /// Stock photo search strings, derived from the general summary
    Figure,
    /// Photograph caption
    Caption,
    /// Slide objective
    Objective,
    /// Slide approach points
    Approach,
    /// Slide impact points
    PptImpact,
    /// Citation
    Citation,
    /// Funding statement
    Funding,
    /// Recommended figure from the paper
    FigureChoice,
    /// Key findings as a figure caption
    FigureCaption,
}

/// Where a field's prompt takes its source text from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSource {
    /// The uploaded document
    Document,
    /// A previously generated field, which must exist
    Field(FieldKind),
}

/// Generation defaults for a field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    /// Field this spec describes
    pub kind: FieldKind,
    /// Human-readable label
    pub label: &'static str,
    /// Prompt template
    pub prompt: PromptKind,
    /// Maximum completion tokens
    pub max_tokens: u32,
    /// Default sampling temperature
    pub temperature: f32,
    /// Word ceiling that triggers the reduction pass
    pub max_word_count: Option<usize>,
    /// Lower word bound asked for in the reduction pass
    pub min_word_count: usize,
    /// Source text of the prompt
    pub source: FieldSource,
    /// Earlier field that must exist before this one is generated
    pub requires: Option<FieldKind>,
    /// Earlier field passed as additional prompt input when present
    pub additional: Option<FieldKind>,
}

impl FieldKind {
    /// Returns the ID string for this field.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
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
            Self::Citation => "citation",
            Self::Funding => "funding",
            Self::FigureChoice => "figure_choice",
            Self::FigureCaption => "figure_caption",
        }
    }

    /// Returns all fields in generation order.
    ///
    /// Fields appear after the fields they depend on.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
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
            Self::Citation,
            Self::Funding,
            Self::FigureChoice,
            Self::FigureCaption,
        ]
    }

    /// Parse field kind from string ID. Dashes are accepted for underscores.
    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        let normalized = id.trim().to_ascii_lowercase().replace('-', "_");
        Self::all().iter().copied().find(|kind| kind.id() == normalized)
    }

    /// Returns the generation defaults for this field.
    #[must_use]
    pub const fn spec(self) -> FieldSpec {
        let base = FieldSpec {
            kind: self,
            label: "",
            prompt: PromptKind::Title,
            max_tokens: 300,
            temperature: 0.3,
            max_word_count: None,
            min_word_count: 0,
            source: FieldSource::Document,
            requires: None,
            additional: None,
        };

        match self {
            Self::Title => FieldSpec {
                label: "Title",
                prompt: PromptKind::Title,
                max_tokens: 50,
                temperature: 0.2,
                max_word_count: Some(100),
                min_word_count: 75,
                ..base
            },
            Self::Subtitle => FieldSpec {
                label: "Subtitle",
                prompt: PromptKind::Subtitle,
                max_tokens: 100,
                temperature: 0.5,
                max_word_count: Some(100),
                min_word_count: 75,
                requires: Some(Self::Title),
                additional: Some(Self::Title),
                ..base
            },
            Self::Science => FieldSpec {
                label: "Science Summary",
                prompt: PromptKind::Science,
                max_tokens: 200,
                temperature: 0.3,
                max_word_count: Some(100),
                min_word_count: 75,
                ..base
            },
            Self::Impact => FieldSpec {
                label: "Impact Summary",
                prompt: PromptKind::Impact,
                max_tokens: 700,
                temperature: 0.0,
                max_word_count: Some(100),
                min_word_count: 75,
                ..base
            },
            Self::Summary => FieldSpec {
                label: "General Summary",
                prompt: PromptKind::Summary,
                max_tokens: 700,
                temperature: 0.3,
                max_word_count: Some(200),
                min_word_count: 100,
                ..base
            },
            Self::Figure => FieldSpec {
                label: "Figure Recommendations",
                prompt: PromptKind::Figure,
                max_tokens: 200,
                temperature: 0.9,
                source: FieldSource::Field(Self::Summary),
                requires: Some(Self::Summary),
                max_word_count: Some(100),
                min_word_count: 75,
                ..base
            },
            Self::Caption => FieldSpec {
                label: "Image Caption",
                prompt: PromptKind::Caption,
                max_tokens: 200,
                ..base
            },
            Self::Objective => FieldSpec {
                label: "Objective",
                prompt: PromptKind::Objective,
                max_tokens: 300,
                temperature: 0.3,
                max_word_count: Some(100),
                min_word_count: 75,
                ..base
            },
            Self::Approach => FieldSpec {
                label: "Approach",
                prompt: PromptKind::Approach,
                max_tokens: 300,
                temperature: 0.1,
                additional: Some(Self::Objective),
                max_word_count: Some(100),
                min_word_count: 75,
                ..base
            },
            Self::PptImpact => FieldSpec {
                label: "Impact Points",
                prompt: PromptKind::PptImpact,
                max_tokens: 300,
                temperature: 0.1,
                max_word_count: Some(100),
                min_word_count: 75,
                ..base
            },
            Self::Citation => FieldSpec {
                label: "Citation",
                prompt: PromptKind::Citation,
                max_tokens: 200,
                temperature: 0.0,
                ..base
            },
            Self::Funding => FieldSpec {
                label: "Funding",
                prompt: PromptKind::Funding,
                max_tokens: 200,
                temperature: 0.0,
                ..base
            },
            Self::FigureChoice => FieldSpec {
                label: "Figure Choice",
                prompt: PromptKind::FigureChoice,
                max_tokens: 300,
                ..base
            },
            Self::FigureCaption => FieldSpec {
                label: "Figure Caption",
                prompt: PromptKind::FigureCaption,
                max_tokens: 100,
                ..base
            },
        }
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

impl std::str::FromStr for FieldKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_id(s).ok_or_else(|| {
            let known: Vec<&str> = Self::all().iter().map(|k| k.id()).collect();
            format!("unknown field '{s}', expected one of: {}", known.join(", "))
        })
    }
}

/// Orders `requested` fields so that every dependency comes first, adding
/// required fields that were not requested.
#[must_use]
pub fn resolve_order(requested: &[FieldKind]) -> Vec<FieldKind> {
    let mut wanted: Vec<FieldKind> = requested.to_vec();
    let mut i = 0;
    while i < wanted.len() {
        if let Some(required) = wanted[i].spec().requires {
            if !wanted.contains(&required) {
                wanted.push(required);
            }
        }
        i += 1;
    }

    FieldKind::all()
        .iter()
        .copied()
        .filter(|kind| wanted.contains(kind))
        .collect()
}
