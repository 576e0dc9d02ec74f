//! Document loading: text extraction plus page, character, word and token
//! counts.

use crate::error::{Error, Result};
use crate::token::{count_words, TokenEstimator};
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Marker that starts the bibliography in most papers.
pub const DEFAULT_REFERENCE_INDICATOR: &str = "References\n";

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Kind of uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    /// Portable Document Format
    Pdf,
    /// UTF-8 plain text
    Text,
}

impl DocumentKind {
    /// Detects the kind from the file name, falling back to the PDF magic bytes.
    #[must_use]
    pub fn detect(name: &str, bytes: &[u8]) -> Option<Self> {
        let ext = Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match ext.as_deref() {
            Some("pdf") => Some(Self::Pdf),
            Some("txt" | "text" | "md") => Some(Self::Text),
            _ if bytes.starts_with(PDF_MAGIC) => Some(Self::Pdf),
            _ if std::str::from_utf8(bytes).is_ok() => Some(Self::Text),
            _ => None,
        }
    }
}

/// Text content of an uploaded document together with its size metrics.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    /// Name the document was uploaded under
    pub source_name: String,

    /// Detected document kind
    pub kind: DocumentKind,

    /// Extracted text, cut at the reference section for PDFs
    pub content: String,

    /// Text of each page that was read, cut like `content` so that the
    /// pages concatenate to it
    #[serde(skip)]
    pub pages: Vec<String>,

    /// Number of pages read before the one holding the reference section
    pub n_pages: usize,

    /// Number of characters in `content`
    pub n_characters: usize,

    /// Number of whitespace-separated words in `content`
    pub n_words: usize,

    /// Number of tokens in `content`
    pub n_tokens: usize,
}

impl Document {
    fn new(
        source_name: String,
        kind: DocumentKind,
        content: String,
        pages: Vec<String>,
        n_pages: usize,
        tokenizer: &dyn TokenEstimator,
    ) -> Self {
        let n_tokens = tokenizer.estimate(&content);
        Self {
            source_name,
            kind,
            n_pages,
            n_characters: content.chars().count(),
            n_words: count_words(&content),
            n_tokens,
            content,
            pages,
        }
    }

    /// Builds a document from already extracted text, e.g. a reduced copy.
    #[must_use]
    pub fn from_text(
        source_name: impl Into<String>,
        content: String,
        tokenizer: &dyn TokenEstimator,
    ) -> Self {
        let pages = vec![content.clone()];
        Self::new(source_name.into(), DocumentKind::Text, content, pages, 1, tokenizer)
    }

    /// Returns true if the document alone does not fit the token budget.
    #[must_use]
    pub const fn exceeds_budget(&self, max_allowable_tokens: usize) -> bool {
        self.n_tokens > max_allowable_tokens
    }

    /// Tokens over the budget, zero when it fits.
    #[must_use]
    pub const fn token_deficit(&self, max_allowable_tokens: usize) -> usize {
        self.n_tokens.saturating_sub(max_allowable_tokens)
    }

    /// Human-readable file specification block.
    #[must_use]
    pub fn specs(&self) -> String {
        format!(
            "File specs:\n\
             \x20 - Number of pages:  {}\n\
             \x20 - Number of characters:  {}\n\
             \x20 - Number of words: {}\n\
             \x20 - Number of tokens: {}",
            self.n_pages, self.n_characters, self.n_words, self.n_tokens
        )
    }
}

/// Reads a document from disk, dispatching on its kind.
///
/// # Errors
///
/// Returns an error if the file cannot be read, its kind is unknown, or
/// extraction fails.
pub fn read_path(
    path: &Path,
    reference_indicator: &str,
    tokenizer: &dyn TokenEstimator,
) -> Result<Document> {
    let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
    let name = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());

    read_bytes(&name, &bytes, reference_indicator, tokenizer)
}

/// Reads an uploaded document held in memory.
///
/// # Errors
///
/// Returns an error if the kind is unknown or extraction fails.
pub fn read_bytes(
    name: &str,
    bytes: &[u8],
    reference_indicator: &str,
    tokenizer: &dyn TokenEstimator,
) -> Result<Document> {
    let document = match DocumentKind::detect(name, bytes) {
        Some(DocumentKind::Pdf) => read_pdf(name, bytes, reference_indicator, tokenizer)?,
        Some(DocumentKind::Text) => read_text(name, bytes, tokenizer)?,
        None => return Err(Error::unsupported_document(name)),
    };

    info!(
        "Read '{}': {} pages, {} words, {} tokens",
        document.source_name, document.n_pages, document.n_words, document.n_tokens
    );

    Ok(document)
}

/// Extracts PDF text up to the reference section.
///
/// # Errors
///
/// Returns an error if the PDF cannot be parsed.
pub fn read_pdf(
    name: &str,
    bytes: &[u8],
    reference_indicator: &str,
    tokenizer: &dyn TokenEstimator,
) -> Result<Document> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes).map_err(|e| Error::pdf(name, e))?;
    debug!("Extracted {} pages from '{}'", pages.len(), name);

    let collected = collect_until_reference(pages, reference_indicator);
    if collected.cut {
        debug!("Reference section found in '{}' after {} pages", name, collected.n_pages);
    }

    Ok(Document::new(
        name.to_string(),
        DocumentKind::Pdf,
        collected.content,
        collected.pages,
        collected.n_pages,
        tokenizer,
    ))
}

/// Reads a UTF-8 plain text document as a single page.
///
/// # Errors
///
/// Returns an error if the bytes are not valid UTF-8.
pub fn read_text(name: &str, bytes: &[u8], tokenizer: &dyn TokenEstimator) -> Result<Document> {
    let content = String::from_utf8(bytes.to_vec()).map_err(|_| Error::invalid_utf8(name))?;
    let pages = vec![content.clone()];

    Ok(Document::new(
        name.to_string(),
        DocumentKind::Text,
        content,
        pages,
        1,
        tokenizer,
    ))
}

/// Text kept from a PDF after the reference cut.
#[derive(Debug)]
struct Collected {
    content: String,
    pages: Vec<String>,
    n_pages: usize,
    cut: bool,
}

/// Concatenates pages up to and including the first one that contains
/// `indicator`, then cuts the text at the indicator.
///
/// The page holding the indicator is not counted in `n_pages`. Kept pages are
/// trimmed at the same offset as the content, so `pages.concat() == content`.
fn collect_until_reference(pages: Vec<String>, indicator: &str) -> Collected {
    let mut content = String::new();
    let mut read = Vec::new();
    let mut n_pages = 0;
    let finder = (!indicator.is_empty()).then(|| memchr::memmem::Finder::new(indicator.as_bytes()));

    for page in pages {
        content.push_str(&page);
        let has_indicator = finder
            .as_ref()
            .is_some_and(|f| f.find(page.as_bytes()).is_some());
        read.push(page);

        if has_indicator {
            break;
        }
        n_pages += 1;
    }

    let Some(pos) = finder.and_then(|f| f.find(content.as_bytes())) else {
        return Collected {
            content,
            pages: read,
            n_pages,
            cut: false,
        };
    };
    content.truncate(pos);

    // The indicator can start on an earlier page than the one it ends on.
    let mut offset = 0;
    let mut kept = Vec::with_capacity(read.len());
    for mut page in read {
        if offset + page.len() > pos {
            page.truncate(pos - offset);
            if !page.is_empty() {
                kept.push(page);
            }
            break;
        }
        offset += page.len();
        kept.push(page);
    }

    Collected {
        content,
        pages: kept,
        n_pages,
        cut: true,
    }
}
