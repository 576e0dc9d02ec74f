use crate::{
    config::Config,
    document::Document,
    error::{Error, Result},
    session::HighlightSession,
};
use serde::Serialize;
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};
use tracing::{debug, info};

/// File name of the filled Word document.
pub(crate) const WORD_OUTPUT: &str = "highlight.docx";

/// File name of the filled PowerPoint deck.
pub(crate) const SLIDE_OUTPUT: &str = "highlight.pptx";

/// File name of a document reduced by the model.
pub(crate) const REDUCED_OUTPUT: &str = "reduced.txt";

/// File name of the run summary.
pub(crate) const SUMMARY_OUTPUT: &str = "summary.json";

/// Summary of a generation run.
#[derive(Debug, Serialize)]
pub(crate) struct WriteSummary<'a> {
    /// Document the fields were generated from
    pub document: &'a Document,

    /// Model that generated the fields
    pub model: &'a str,

    /// Generated fields in generation order
    pub fields: Vec<FieldSummary<'a>>,

    /// Files written next to the summary
    pub outputs: Vec<String>,

    /// Execution duration in seconds
    pub duration_secs: f64,

    /// Output directory path
    pub output_directory: String,

    /// Generation timestamp
    pub generated_at: String,
}

/// Summary of a single field.
#[derive(Debug, Serialize)]
pub(crate) struct FieldSummary<'a> {
    /// Field id
    pub field: &'static str,

    /// Human-readable label
    pub label: &'static str,

    /// Final text
    pub text: &'a str,

    /// Words in the final text
    pub word_count: usize,

    /// Whether the word-count reduction pass ran
    pub reduced: bool,

    /// Words in the first response
    pub original_word_count: usize,
}

/// Writes output files with atomic operations.
pub(crate) struct Writer {
    output_dir: PathBuf,
    backup_existing: bool,
}

impl Writer {
    /// Creates a new writer from configuration.
    pub(crate) fn new(config: &Config) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            backup_existing: config.backup_existing,
        }
    }

    /// Output directory.
    pub(crate) fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Writes one output file into the output directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the write fails.
    pub(crate) fn write(&self, name: &str, content: &[u8]) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir).map_err(|e| Error::io(&self.output_dir, e))?;

        let path = self.output_dir.join(name);
        self.write_file_atomic(&path, content)?;

        info!("Wrote {} ({} bytes)", path.display(), content.len());
        Ok(path)
    }

    /// Writes a file atomically with optional backup.
    ///
    /// # Process
    ///
    /// 1. Creates backup if file exists and backup is enabled
    /// 2. Writes content to temporary file
    /// 3. Syncs temporary file to disk
    /// 4. Atomically renames temporary file to target path
    fn write_file_atomic(&self, path: &Path, content: &[u8]) -> Result<()> {
        if path.exists() && self.backup_existing {
            self.backup_file(path)?;
        }

        let temp_path = temp_path(path)?;
        let mut temp_file = fs::File::create(&temp_path).map_err(|e| Error::io(&temp_path, e))?;

        temp_file
            .write_all(content)
            .map_err(|e| Error::io(&temp_path, e))?;

        temp_file
            .sync_all()
            .map_err(|e| Error::io(&temp_path, e))?;

        drop(temp_file);

        fs::rename(&temp_path, path).map_err(|e| Error::io(path, e))?;

        Ok(())
    }

    /// Creates a timestamped backup of an existing file.
    fn backup_file(&self, path: &Path) -> Result<()> {
        let timestamp = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)?
            .as_nanos();

        let filename = path
            .file_name()
            .ok_or_else(|| Error::config("Invalid file path"))?
            .to_string_lossy();

        let backup_name = format!("{filename}.backup.{timestamp}");
        let backup_path = path
            .parent()
            .ok_or_else(|| Error::config("Invalid file path"))?
            .join(backup_name);

        fs::copy(path, &backup_path).map_err(|e| Error::io(&backup_path, e))?;

        debug!("Created backup: {}", backup_path.display());
        Ok(())
    }

    /// Writes `summary.json` describing the session and the files written.
    ///
    /// # Errors
    ///
    /// Returns an error if the summary file cannot be written.
    pub(crate) fn write_summary(
        &self,
        session: &HighlightSession,
        model: &str,
        outputs: &[PathBuf],
        duration: Duration,
    ) -> Result<PathBuf> {
        let summary = WriteSummary {
            document: session.document(),
            model,
            fields: session
                .fields()
                .map(|(kind, generated)| FieldSummary {
                    field: kind.id(),
                    label: kind.spec().label,
                    text: &generated.text,
                    word_count: generated.word_count,
                    reduced: generated.reduced,
                    original_word_count: generated.original_word_count,
                })
                .collect(),
            outputs: outputs
                .iter()
                .filter_map(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .collect(),
            duration_secs: duration.as_secs_f64(),
            output_directory: self.output_dir.display().to_string(),
            generated_at: chrono::Local::now()
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
        };

        let json = serde_json::to_vec_pretty(&summary)?;
        self.write(SUMMARY_OUTPUT, &json)
    }
}

fn temp_path(path: &Path) -> Result<PathBuf> {
    let filename = path
        .file_name()
        .ok_or_else(|| Error::config("Invalid file path"))?
        .to_string_lossy();
    Ok(path.with_file_name(format!("{filename}.tmp")))
}
