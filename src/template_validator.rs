use crate::error::{Error, Result};
use std::fs;
use std::path::Path;
use tera::Tera;

/// Maximum prompt template file size (1MB)
const MAX_TEMPLATE_SIZE: u64 = 1024 * 1024;

/// Variables every prompt template may use
const KNOWN_VARIABLES: &[&str] = &[
    "content",
    "title",
    "objective",
    "example_one",
    "example_two",
    "min_words",
    "max_words",
];

/// Validates user supplied prompt templates before they replace built-ins.
pub(crate) struct TemplateValidator;

impl TemplateValidator {
    /// Validates a prompt template file and returns its content.
    ///
    /// Performs the following checks:
    /// 1. File exists and is a regular file
    /// 2. File size is within limits
    /// 3. Template is not empty and compiles with Tera
    /// 4. Template references every variable in `required`
    ///
    /// # Errors
    ///
    /// Returns an error describing the first failed check.
    pub(crate) fn validate_prompt(path: &Path, required: &[&str]) -> Result<String> {
        let name = path.to_string_lossy().to_string();

        if !path.exists() {
            return Err(Error::io(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "Template file not found"),
            ));
        }

        if !path.is_file() {
            return Err(Error::template_validation(name, "Path is not a file"));
        }

        let metadata = fs::metadata(path).map_err(|e| Error::io(path, e))?;
        if metadata.len() > MAX_TEMPLATE_SIZE {
            return Err(Error::template_validation(
                name,
                format!(
                    "Template file too large: {} bytes (max: {} bytes)",
                    metadata.len(),
                    MAX_TEMPLATE_SIZE
                ),
            ));
        }

        let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;

        if content.trim().is_empty() {
            return Err(Error::template_validation(name, "Template file is empty"));
        }

        let mut temp_tera = Tera::default();
        temp_tera
            .add_raw_template("validation", &content)
            .map_err(|e| Error::template_validation(&name, format!("Template syntax error: {e}")))?;

        let missing: Vec<&str> = required
            .iter()
            .filter(|var| !uses_variable(&content, var))
            .copied()
            .collect();

        if !missing.is_empty() {
            return Err(Error::template_validation(
                name,
                format!(
                    "Template is missing required variables: {}",
                    missing.join(", ")
                ),
            ));
        }

        for var in KNOWN_VARIABLES {
            if !required.contains(var) && uses_variable(&content, var) {
                tracing::debug!("Prompt template {} also uses '{}'", path.display(), var);
            }
        }

        Ok(content)
    }
}

/// Heuristic check for `{{ var }}`, `{{var}}` or `{{ var | filter }}`.
fn uses_variable(content: &str, var: &str) -> bool {
    let patterns = [format!("{{{{ {var}"), format!("{{{{{var}")];
    patterns.iter().any(|pattern| content.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn test_validate_valid_prompt() {
        let temp = assert_fs::TempDir::new().unwrap();
        let template_file = temp.child("title.tera");
        template_file
            .write_str("Write a short title.\n```{{ content }}```")
            .unwrap();

        let content = TemplateValidator::validate_prompt(template_file.path(), &["content"]).unwrap();
        assert!(content.contains("short title"));
    }

    #[test]
    fn test_validate_compact_placeholder() {
        let temp = assert_fs::TempDir::new().unwrap();
        let template_file = temp.child("title.tera");
        template_file.write_str("Title for {{content}}").unwrap();

        assert!(TemplateValidator::validate_prompt(template_file.path(), &["content"]).is_ok());
    }

    #[test]
    fn test_validate_nonexistent_file() {
        let result = TemplateValidator::validate_prompt(Path::new("/nonexistent/title.tera"), &["content"]);
        assert!(result.unwrap_err().is_io());
    }

    #[test]
    fn test_validate_empty_template() {
        let temp = assert_fs::TempDir::new().unwrap();
        let template_file = temp.child("empty.tera");
        template_file.write_str("   \n  \n  ").unwrap();

        let result = TemplateValidator::validate_prompt(template_file.path(), &["content"]);
        assert!(result.unwrap_err().to_string().contains("empty"));
    }

    #[test]
    fn test_validate_syntax_error() {
        let temp = assert_fs::TempDir::new().unwrap();
        let template_file = temp.child("invalid.tera");
        template_file
            .write_str("{% if content %}\nUnclosed if {{ content }}")
            .unwrap();

        let result = TemplateValidator::validate_prompt(template_file.path(), &["content"]);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Template syntax error"));
    }

    #[test]
    fn test_validate_missing_required_vars() {
        let temp = assert_fs::TempDir::new().unwrap();
        let template_file = temp.child("subtitle.tera");
        template_file.write_str("Subtitle for {{ content }}").unwrap();

        let result = TemplateValidator::validate_prompt(template_file.path(), &["content", "title"]);
        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("missing required variables: title"));
    }

    #[test]
    fn test_validate_file_too_large() {
        let temp = assert_fs::TempDir::new().unwrap();
        let template_file = temp.child("large.tera");

        let large_content = "x".repeat((MAX_TEMPLATE_SIZE + 1) as usize);
        template_file.write_str(&large_content).unwrap();

        let result = TemplateValidator::validate_prompt(template_file.path(), &["content"]);
        assert!(result.unwrap_err().to_string().contains("too large"));
    }

    #[test]
    fn test_uses_variable() {
        assert!(uses_variable("{{ content | trim }}", "content"));
        assert!(uses_variable("{{content}}", "content"));
        assert!(!uses_variable("content without braces", "content"));
    }
}
