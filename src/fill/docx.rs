//! Word template filling.
//!
//! Placeholders are written `{{ name }}` in the template. Word often splits
//! what the author typed across several runs (spell checking, revision
//! marks, formatting changes), so placeholders are matched on the visible
//! text and the run boundaries inside a match are dropped.

use super::{rewrite_archive, xml, WordParameters};
use crate::error::Result;
use tracing::{debug, warn};

const LINE_BREAK: &str = "</w:t><w:br/><w:t xml:space=\"preserve\">";

/// Fills the `{{ name }}` placeholders of a `.docx` template.
///
/// The body, headers and footers are searched. Values are XML-escaped,
/// newlines become line breaks, and unset or unknown names render empty.
///
/// # Errors
///
/// Returns an error if the template is not a readable zip container.
pub fn render(template: &[u8], params: &WordParameters) -> Result<Vec<u8>> {
    let mut total = 0;

    let output = rewrite_archive(template, is_text_part, |name, text| {
        let (updated, count) = substitute(text, params);
        debug!("Filled {} placeholders in {}", count, name);
        total += count;
        Ok((count > 0).then_some(updated))
    })?;

    if total == 0 {
        warn!("Word template contains no {{{{ placeholders }}}}");
    }

    Ok(output)
}

fn is_text_part(name: &str) -> bool {
    if name == "word/document.xml" {
        return true;
    }
    name.strip_prefix("word/")
        .and_then(|rest| rest.strip_suffix(".xml"))
        .is_some_and(|stem| {
            ["header", "footer"].iter().any(|prefix| {
                stem.strip_prefix(prefix)
                    .is_some_and(|n| n.chars().all(|c| c.is_ascii_digit()))
            })
        })
}

/// Text outside of tags, with the XML byte offset of every text byte.
struct TextView {
    text: String,
    offsets: Vec<usize>,
}

impl TextView {
    fn new(xml: &str) -> Self {
        let mut text = String::with_capacity(xml.len() / 4);
        let mut offsets = Vec::with_capacity(xml.len() / 4);
        let mut in_tag = false;

        for (pos, c) in xml.char_indices() {
            match c {
                '<' => in_tag = true,
                '>' => in_tag = false,
                _ if !in_tag => {
                    text.push(c);
                    offsets.extend((0..c.len_utf8()).map(|i| pos + i));
                }
                _ => {}
            }
        }

        Self { text, offsets }
    }
}

/// Replaces every placeholder in one XML part.
///
/// Returns the new text and the number of placeholders filled.
fn substitute(part: &str, params: &WordParameters) -> (String, usize) {
    let view = TextView::new(part);
    let mut replacements = Vec::new();
    let mut search_from = 0;

    while let Some(found) = view.text[search_from..].find("{{") {
        let open = search_from + found;
        let Some(close) = view.text[open + 2..].find("}}").map(|i| open + 2 + i) else {
            break;
        };

        let name = view.text[open + 2..close].trim();
        if !is_identifier(name) {
            search_from = open + 2;
            continue;
        }

        let start = view.offsets[open];
        let end = view.offsets[close + 1] + 1;

        if crosses_paragraph(&part[start..end]) {
            warn!("Placeholder '{}' spans paragraphs and was left as is", name);
            search_from = close + 2;
            continue;
        }

        let value = params.get(name);
        if value.is_none() && !WordParameters::NAMES.contains(&name) {
            debug!("Unknown placeholder '{}' renders empty", name);
        }

        replacements.push((start..end, render_value(value.unwrap_or_default())));
        search_from = close + 2;
    }

    let count = replacements.len();
    let mut output = part.to_string();
    for (range, value) in replacements.into_iter().rev() {
        output.replace_range(range, &value);
    }

    (output, count)
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn crosses_paragraph(segment: &str) -> bool {
    segment.contains("</w:p>") || segment.contains("<w:p>") || segment.contains("<w:p ")
}

fn render_value(value: &str) -> String {
    value
        .split('\n')
        .map(|line| xml::escape(line.trim_end_matches('\r')))
        .collect::<Vec<_>>()
        .join(LINE_BREAK)
}

#[cfg(test)]
mod tests {
    use super::super::tests::{build_zip, entry};
    use super::*;

    const DOCUMENT: &str = "word/document.xml";

    fn body(paragraphs: &str) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
             <w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
             <w:body>{paragraphs}</w:body></w:document>"
        )
    }

    fn params() -> WordParameters {
        WordParameters {
            title: Some("Heat & Drought Strain the Grid".to_string()),
            science: Some("First line\nSecond line".to_string()),
            ..WordParameters::default()
        }
    }

    #[test]
    fn test_simple_placeholder() {
        let xml = body("<w:p><w:r><w:t>{{ title }}</w:t></w:r></w:p>");
        let (out, count) = substitute(&xml, &params());

        assert_eq!(count, 1);
        assert!(out.contains("<w:t>Heat &amp; Drought Strain the Grid</w:t>"));
    }

    #[test]
    fn test_placeholder_split_across_runs() {
        let xml = body(
            "<w:p><w:r><w:t>Title: {</w:t></w:r><w:r><w:rPr><w:b/></w:rPr><w:t>{ ti</w:t></w:r>\
             <w:r><w:t>tle }}</w:t></w:r></w:p>",
        );
        let (out, count) = substitute(&xml, &params());

        assert_eq!(count, 1);
        assert!(out.contains("<w:t>Title: Heat &amp; Drought Strain the Grid</w:t></w:r></w:p>"));
        assert!(!out.contains("{{"));
    }

    #[test]
    fn test_newlines_become_breaks() {
        let xml = body("<w:p><w:r><w:t>{{science}}</w:t></w:r></w:p>");
        let (out, _) = substitute(&xml, &params());

        assert!(out.contains("First line</w:t><w:br/><w:t xml:space=\"preserve\">Second line"));
    }

    #[test]
    fn test_missing_values_render_empty() {
        let xml = body("<w:p><w:r><w:t>[{{ funding }}][{{ nonsense }}]</w:t></w:r></w:p>");
        let (out, count) = substitute(&xml, &params());

        assert_eq!(count, 2);
        assert!(out.contains("<w:t>[][]</w:t>"));
    }

    #[test]
    fn test_non_placeholders_kept() {
        let xml = body("<w:p><w:r><w:t>{{ not a name }} and {single}</w:t></w:r></w:p>");
        let (out, count) = substitute(&xml, &params());

        assert_eq!(count, 0);
        assert_eq!(out, xml);
    }

    #[test]
    fn test_placeholder_across_paragraphs_left_alone() {
        let xml = body("<w:p><w:r><w:t>{{ ti</w:t></w:r></w:p><w:p><w:r><w:t>tle }}</w:t></w:r></w:p>");
        let (out, count) = substitute(&xml, &params());

        assert_eq!(count, 0);
        assert_eq!(out, xml);
    }

    #[test]
    fn test_is_text_part() {
        assert!(is_text_part("word/document.xml"));
        assert!(is_text_part("word/header1.xml"));
        assert!(is_text_part("word/footer.xml"));
        assert!(!is_text_part("word/styles.xml"));
        assert!(!is_text_part("word/_rels/header1.xml.rels"));
    }

    #[test]
    fn test_render_document() {
        let template = build_zip(&[
            ("[Content_Types].xml", "<Types/>"),
            (DOCUMENT, &body("<w:p><w:r><w:t>{{ title }}</w:t></w:r></w:p>")),
            ("word/header1.xml", "<w:hdr><w:p><w:r><w:t>{{ subtitle }}</w:t></w:r></w:p></w:hdr>"),
            ("word/styles.xml", "<w:styles>{{ title }}</w:styles>"),
        ]);

        let output = render(&template, &params()).unwrap();

        assert!(entry(&output, DOCUMENT).contains("Heat &amp; Drought"));
        assert_eq!(
            entry(&output, "word/header1.xml"),
            "<w:hdr><w:p><w:r><w:t></w:t></w:r></w:p></w:hdr>"
        );
        assert_eq!(entry(&output, "word/styles.xml"), "<w:styles>{{ title }}</w:styles>");
        assert_eq!(entry(&output, "[Content_Types].xml"), "<Types/>");
    }

    #[test]
    fn test_render_invalid_template() {
        assert!(render(b"PK but not really", &params()).is_err());
    }
}
