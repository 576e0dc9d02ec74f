//! Generated and manually entered highlight fields for one document.

use crate::document::Document;
use crate::error::{Error, Result};
use crate::field::{FieldKind, FieldSource};
use crate::fill::{SlideText, WordParameters};
use crate::llm::{GenerationParams, Generated, Generator};
use crate::prompt::PromptInputs;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{info, instrument};

/// Text shown in slide shapes that still need a human.
pub const FILL_IN: &str = "fill in";

/// Word fields supplied by hand rather than generated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ManualFields {
    /// Photo file or description
    pub photo: Option<String>,
    /// Where the photo came from
    pub photo_link: Option<String>,
    /// Name of the photo site
    pub photo_site_name: Option<String>,
    /// Photo caption; the generated caption is used when unset
    pub image_caption: Option<String>,
    /// Funding statement; the generated one is used when unset
    pub funding: Option<String>,
    /// Citation; the generated one is used when unset
    pub citation: Option<String>,
    /// Related links
    pub related_links: Option<String>,
}

/// Everything collected for one document.
#[derive(Debug, Clone)]
pub struct HighlightSession {
    document: Document,
    values: BTreeMap<FieldKind, Generated>,
    temperatures: HashMap<FieldKind, f32>,
    manual: ManualFields,
}

impl HighlightSession {
    /// Starts a session for `document`.
    #[must_use]
    pub fn new(document: Document) -> Self {
        Self {
            document,
            values: BTreeMap::new(),
            temperatures: HashMap::new(),
            manual: ManualFields::default(),
        }
    }

    /// Sets the manually supplied fields.
    #[must_use]
    pub fn with_manual(mut self, manual: ManualFields) -> Self {
        self.manual = manual;
        self
    }

    /// Sets the temperature overrides.
    #[must_use]
    pub fn with_temperatures(mut self, temperatures: HashMap<FieldKind, f32>) -> Self {
        self.temperatures = temperatures;
        self
    }

    /// The document fields are generated from.
    #[must_use]
    pub const fn document(&self) -> &Document {
        &self.document
    }

    /// Replaces the document, e.g. with a reduced copy.
    pub fn set_document(&mut self, document: Document) {
        self.document = document;
    }

    /// Manually supplied fields.
    #[must_use]
    pub const fn manual(&self) -> &ManualFields {
        &self.manual
    }

    /// Temperature used for `field`.
    #[must_use]
    pub fn temperature(&self, field: FieldKind) -> f32 {
        self.temperatures
            .get(&field)
            .copied()
            .unwrap_or_else(|| field.spec().temperature)
    }

    /// Overrides the temperature of one field.
    pub fn set_temperature(&mut self, field: FieldKind, temperature: f32) {
        self.temperatures.insert(field, temperature);
    }

    /// Current text of a field.
    #[must_use]
    pub fn value(&self, field: FieldKind) -> Option<&str> {
        self.values.get(&field).map(|g| g.text.as_str())
    }

    /// Generation record of a field.
    #[must_use]
    pub fn generated(&self, field: FieldKind) -> Option<&Generated> {
        self.values.get(&field)
    }

    /// All generated fields in catalogue order.
    pub fn fields(&self) -> impl Iterator<Item = (FieldKind, &Generated)> {
        self.values.iter().map(|(kind, generated)| (*kind, generated))
    }

    /// Stores an edited value for a field.
    pub fn set_value(&mut self, field: FieldKind, text: impl Into<String>) {
        let text = text.into();
        let word_count = crate::token::count_words(&text);
        self.values.insert(
            field,
            Generated {
                text,
                word_count,
                reduced: false,
                original_word_count: word_count,
            },
        );
    }

    /// Generates one field and stores the result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingDependency`] when a field this one builds on
    /// has not been generated, or the generation error.
    #[instrument(skip(self, generator))]
    pub fn generate(&mut self, generator: &Generator, field: FieldKind) -> Result<&Generated> {
        let spec = field.spec();

        if let Some(required) = spec.requires {
            if self.value(required).is_none() {
                return Err(Error::missing_dependency(
                    field.id(),
                    required.id(),
                    format!("generate the {} first", required.spec().label.to_lowercase()),
                ));
            }
        }

        let content = match spec.source {
            FieldSource::Document => self.document.content.as_str(),
            FieldSource::Field(source) => self.value(source).unwrap_or_default(),
        };
        let additional = spec.additional.and_then(|kind| self.value(kind));

        let prompt = generator
            .prompts()
            .render(spec.prompt, &PromptInputs::new(content).with_additional(additional))?;

        let params = GenerationParams {
            max_tokens: spec.max_tokens,
            temperature: self.temperature(field),
            max_word_count: spec.max_word_count,
            min_word_count: spec.min_word_count,
        };

        let generated = generator.generate_field(&prompt, &params)?;
        info!(
            "✓ {} ({} words{})",
            spec.label,
            generated.word_count,
            if generated.reduced { ", reduced" } else { "" }
        );

        self.values.remove(&field);
        Ok(self.values.entry(field).or_insert(generated))
    }

    /// Placeholder values for the Word template.
    #[must_use]
    pub fn word_parameters(&self) -> WordParameters {
        let generated = |field| self.value(field).map(str::to_string);
        let manual = &self.manual;

        WordParameters {
            title: generated(FieldKind::Title),
            subtitle: generated(FieldKind::Subtitle),
            photo: manual.photo.clone(),
            photo_link: manual.photo_link.clone(),
            photo_site_name: manual.photo_site_name.clone(),
            image_caption: manual
                .image_caption
                .clone()
                .or_else(|| generated(FieldKind::Caption)),
            science: generated(FieldKind::Science),
            impact: generated(FieldKind::Impact),
            summary: generated(FieldKind::Summary),
            funding: manual.funding.clone().or_else(|| generated(FieldKind::Funding)),
            citation: manual.citation.clone().or_else(|| generated(FieldKind::Citation)),
            related_links: manual.related_links.clone(),
        }
    }

    /// Text for the first slide of the PowerPoint template.
    ///
    /// The impact shape takes the slide impact points, which are generated
    /// for the slide, or the impact summary when those were not generated.
    #[must_use]
    pub fn slide_text(&self) -> SlideText {
        let text = |field| self.value(field).unwrap_or_default().to_string();

        SlideText {
            objective: text(FieldKind::Objective),
            title: text(FieldKind::Title),
            reference: FILL_IN.to_string(),
            caption: FILL_IN.to_string(),
            approach: text(FieldKind::Approach),
            impact: self
                .value(FieldKind::PptImpact)
                .or_else(|| self.value(FieldKind::Impact))
                .unwrap_or_default()
                .to_string(),
        }
    }
}
