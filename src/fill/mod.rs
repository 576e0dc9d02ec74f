//! Word and PowerPoint template filling.
//!
//! Both formats are zip containers of XML parts. The fillers rewrite the
//! parts that carry text and copy every other entry unchanged.

pub mod docx;
pub mod pptx;
mod xml;

use crate::error::{Error, Result};
use serde::Serialize;
use std::io::{Cursor, Read, Write};
use tracing::trace;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Placeholder values for the Word template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WordParameters {
    /// Highlight title
    pub title: Option<String>,
    /// Subtitle
    pub subtitle: Option<String>,
    /// Photo file or description
    pub photo: Option<String>,
    /// Where the photo came from
    pub photo_link: Option<String>,
    /// Name of the photo site
    pub photo_site_name: Option<String>,
    /// Photo caption
    pub image_caption: Option<String>,
    /// Science summary
    pub science: Option<String>,
    /// Impact summary
    pub impact: Option<String>,
    /// General summary
    pub summary: Option<String>,
    /// Funding statement
    pub funding: Option<String>,
    /// Citation
    pub citation: Option<String>,
    /// Related links
    pub related_links: Option<String>,
}

impl WordParameters {
    /// Placeholder names the Word template may use.
    pub const NAMES: &'static [&'static str] = &[
        "title",
        "subtitle",
        "photo",
        "photo_link",
        "photo_site_name",
        "image_caption",
        "science",
        "impact",
        "summary",
        "funding",
        "citation",
        "related_links",
    ];

    /// Value for a placeholder name; `None` for unset or unknown names.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        let value = match name {
            "title" => &self.title,
            "subtitle" => &self.subtitle,
            "photo" => &self.photo,
            "photo_link" => &self.photo_link,
            "photo_site_name" => &self.photo_site_name,
            "image_caption" => &self.image_caption,
            "science" => &self.science,
            "impact" => &self.impact,
            "summary" => &self.summary,
            "funding" => &self.funding,
            "citation" => &self.citation,
            "related_links" => &self.related_links,
            _ => return None,
        };
        value.as_deref()
    }
}

/// Text for the six text shapes of the first slide.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SlideText {
    /// Objective statement
    pub objective: String,
    /// Title
    pub title: String,
    /// Reference line
    pub reference: String,
    /// Figure caption
    pub caption: String,
    /// Approach points
    pub approach: String,
    /// Impact points
    pub impact: String,
}

impl SlideText {
    /// Shape texts in slide order.
    #[must_use]
    pub fn in_shape_order(&self) -> [&str; 6] {
        [
            &self.objective,
            &self.title,
            &self.reference,
            &self.caption,
            &self.approach,
            &self.impact,
        ]
    }
}

/// Copies a zip container, letting `rewrite` replace the text of any entry.
///
/// `rewrite` receives the entry name and its UTF-8 text for entries where
/// `wants` returns true; returning `None` keeps the original bytes.
fn rewrite_archive(
    template: &[u8],
    wants: impl Fn(&str) -> bool,
    mut rewrite: impl FnMut(&str, &str) -> Result<Option<String>>,
) -> Result<Vec<u8>> {
    let mut archive =
        ZipArchive::new(Cursor::new(template)).map_err(|e| Error::archive("template", e))?;
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for i in 0..archive.len() {
        let name = archive
            .by_index_raw(i)
            .map_err(|e| Error::archive(format!("entry #{i}"), e))?
            .name()
            .to_string();

        if wants(&name) {
            let mut text = String::new();
            archive
                .by_index(i)
                .map_err(|e| Error::archive(&name, e))?
                .read_to_string(&mut text)
                .map_err(|e| Error::archive(&name, e))?;

            if let Some(updated) = rewrite(&name, &text)? {
                trace!("Rewrote {} ({} -> {} bytes)", name, text.len(), updated.len());
                writer
                    .start_file(name.as_str(), options)
                    .map_err(|e| Error::archive(&name, e))?;
                writer
                    .write_all(updated.as_bytes())
                    .map_err(|e| Error::archive(&name, e))?;
                continue;
            }
        }

        let entry = archive
            .by_index_raw(i)
            .map_err(|e| Error::archive(&name, e))?;
        writer
            .raw_copy_file(entry)
            .map_err(|e| Error::archive(&name, e))?;
    }

    let cursor = writer
        .finish()
        .map_err(|e| Error::archive("output", e))?;
    Ok(cursor.into_inner())
}

/// Reads one entry of a zip container as text.
fn read_entry(template: &[u8], name: &str) -> Result<Option<String>> {
    let mut archive =
        ZipArchive::new(Cursor::new(template)).map_err(|e| Error::archive("template", e))?;

    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(Error::archive(name, e)),
    };

    let mut text = String::new();
    entry
        .read_to_string(&mut text)
        .map_err(|e| Error::archive(name, e))?;
    Ok(Some(text))
}
