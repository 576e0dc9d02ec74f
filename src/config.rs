use crate::document::DEFAULT_REFERENCE_INDICATOR;
use crate::error::{Error, Result};
use crate::field::FieldKind;
use crate::session::ManualFields;
use crate::token::TokenizerKind;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// OpenAI API root.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "highlight.toml";

const DEFAULT_MAX_ALLOWABLE_TOKENS: usize = 8192;
const DEFAULT_TIMEOUT_SECS: u64 = 300;
const DEFAULT_OUTPUT_DIR: &str = "out";
const DEFAULT_PROVIDER: &str = "openai";

/// API key that never shows up in debug output.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wraps a key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Models offered by one provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Model names
    #[serde(default)]
    pub models: Vec<String>,

    /// Endpoint root used for this provider's models when no top-level
    /// `base_url` is set
    pub base_url: Option<String>,
}

/// Contents of a `highlight.toml` file.
///
/// ```toml
/// model = "gpt-4o"
/// max_allowable_tokens = 8192
/// word_template = "data/highlight_template.docx"
///
/// [llm.openai]
/// models = ["gpt-4o", "gpt-4o-mini"]
///
/// [temperatures]
/// title = 0.4
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Providers and their models
    #[serde(default)]
    pub llm: BTreeMap<String, ProviderConfig>,
    /// Default model
    pub model: Option<String>,
    /// Endpoint root
    pub base_url: Option<String>,
    /// Token budget per request
    pub max_allowable_tokens: Option<usize>,
    /// Marker that starts the bibliography
    pub reference_indicator: Option<String>,
    /// Word template path
    pub word_template: Option<PathBuf>,
    /// PowerPoint template path
    pub ppt_template: Option<PathBuf>,
    /// Prompt override directory
    pub prompt_dir: Option<PathBuf>,
    /// Output directory
    pub output_dir: Option<PathBuf>,
    /// Request timeout in seconds
    pub timeout_secs: Option<u64>,
    /// Per-field temperature overrides keyed by field id
    #[serde(default)]
    pub temperatures: BTreeMap<String, f32>,
    /// Manually supplied Word fields
    #[serde(default)]
    pub manual: ManualFields,
}

impl FileConfig {
    /// Reads and parses a config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::parse(&text)
    }

    /// Parses config text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML for this schema.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

/// Configuration for the highlight pipeline.
///
/// Use [`Config::builder()`] to construct a new configuration.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Config {
    /// Document to process
    pub input: Option<PathBuf>,

    /// Output directory for generated files
    pub output_dir: PathBuf,

    /// API key for the model endpoint
    pub api_key: Option<ApiKey>,

    /// Endpoint root (`.../v1`)
    pub base_url: String,

    /// Model name
    pub model: String,

    /// Maximum prompt plus completion tokens per request
    pub max_allowable_tokens: usize,

    /// Marker that starts the bibliography
    pub reference_indicator: String,

    /// Tokenizer implementation to use
    pub tokenizer: TokenizerKind,

    /// Word template to fill
    pub word_template: Option<PathBuf>,

    /// PowerPoint template to fill
    pub ppt_template: Option<PathBuf>,

    /// Directory with `<prompt id>.tera` overrides
    pub prompt_dir: Option<PathBuf>,

    /// Fields to generate
    pub fields: Vec<FieldKind>,

    /// Per-field temperature overrides
    pub temperatures: HashMap<FieldKind, f32>,

    /// Manually supplied Word fields
    pub manual: ManualFields,

    /// Reduce oversized documents with the model before generating
    pub reduce_document: bool,

    /// Dry run mode (no file writes)
    pub dry_run: bool,

    /// Create backups of existing files
    pub backup_existing: bool,

    /// HTTP request timeout
    pub timeout: Duration,

    /// Providers and their models
    pub providers: BTreeMap<String, ProviderConfig>,
}

impl Config {
    /// Creates a new configuration builder.
    ///
    /// # Examples
    ///
    /// ```
    /// use highlight::Config;
    ///
    /// let config = Config::builder()
    ///     .model("gpt-4o-mini")
    ///     .max_allowable_tokens(16_384)
    ///     .build()
    ///     .expect("valid configuration");
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The input or a template path does not exist
    /// - The token budget is zero
    /// - The base URL is not HTTP(S)
    /// - A temperature is outside `0.0..=1.0`
    pub fn validate(&self) -> Result<()> {
        if let Some(ref input) = self.input {
            if !input.is_file() {
                return Err(Error::config(format!(
                    "Input document does not exist: {}",
                    input.display()
                )));
            }
        }

        if self.max_allowable_tokens == 0 {
            return Err(Error::config("max_allowable_tokens must be greater than 0"));
        }

        if self.model.trim().is_empty() {
            return Err(Error::config("model must not be empty"));
        }

        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(Error::config(format!(
                "base_url must start with http:// or https://, got '{}'",
                self.base_url
            )));
        }

        for (label, path) in [
            ("Word template", &self.word_template),
            ("PowerPoint template", &self.ppt_template),
        ] {
            if let Some(path) = path {
                if !path.is_file() {
                    return Err(Error::config(format!(
                        "{label} does not exist: {}",
                        path.display()
                    )));
                }
            }
        }

        if let Some(ref dir) = self.prompt_dir {
            if !dir.is_dir() {
                return Err(Error::config(format!(
                    "Prompt directory does not exist: {}",
                    dir.display()
                )));
            }
        }

        for (field, temperature) in &self.temperatures {
            if !(0.0..=1.0).contains(temperature) {
                return Err(Error::config(format!(
                    "temperature for '{field}' must be between 0.0 and 1.0, got {temperature}"
                )));
            }
        }

        if self.fields.is_empty() {
            return Err(Error::config("at least one field must be requested"));
        }

        Ok(())
    }

    /// Every configured model as `"provider: model"`.
    #[must_use]
    pub fn list_models(&self) -> Vec<String> {
        crate::llm::list_models(self)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input: None,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_allowable_tokens: DEFAULT_MAX_ALLOWABLE_TOKENS,
            reference_indicator: DEFAULT_REFERENCE_INDICATOR.to_string(),
            tokenizer: TokenizerKind::Tiktoken,
            word_template: None,
            ppt_template: None,
            prompt_dir: None,
            fields: FieldKind::all().to_vec(),
            temperatures: HashMap::new(),
            manual: ManualFields::default(),
            reduce_document: false,
            dry_run: false,
            backup_existing: true,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            providers: default_providers(),
        }
    }
}

fn default_providers() -> BTreeMap<String, ProviderConfig> {
    BTreeMap::from([(
        DEFAULT_PROVIDER.to_string(),
        ProviderConfig {
            models: vec![DEFAULT_MODEL.to_string()],
            base_url: None,
        },
    )])
}

/// Endpoint of the first provider that lists `model`.
fn provider_base_url(providers: &BTreeMap<String, ProviderConfig>, model: &str) -> Option<String> {
    providers
        .values()
        .find(|provider| provider.models.iter().any(|m| m == model))
        .and_then(|provider| provider.base_url.clone())
}

/// Builder for creating a [`Config`].
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    input: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    api_key: Option<ApiKey>,
    base_url: Option<String>,
    model: Option<String>,
    max_allowable_tokens: Option<usize>,
    reference_indicator: Option<String>,
    tokenizer: Option<TokenizerKind>,
    word_template: Option<PathBuf>,
    ppt_template: Option<PathBuf>,
    prompt_dir: Option<PathBuf>,
    fields: Option<Vec<FieldKind>>,
    temperatures: HashMap<FieldKind, f32>,
    manual: Option<ManualFields>,
    reduce_document: bool,
    dry_run: bool,
    backup_existing: Option<bool>,
    timeout: Option<Duration>,
    providers: Option<BTreeMap<String, ProviderConfig>>,
}

impl ConfigBuilder {
    /// Applies every value present in a config file.
    ///
    /// Setters called afterwards take precedence.
    ///
    /// # Errors
    ///
    /// Returns an error if a temperature key is not a field id.
    pub fn file(mut self, file: FileConfig) -> Result<Self> {
        if !file.llm.is_empty() {
            self.providers = Some(file.llm);
        }
        self.model = file.model.or(self.model);
        self.base_url = file.base_url.or(self.base_url);
        self.max_allowable_tokens = file.max_allowable_tokens.or(self.max_allowable_tokens);
        self.reference_indicator = file.reference_indicator.or(self.reference_indicator);
        self.word_template = file.word_template.or(self.word_template);
        self.ppt_template = file.ppt_template.or(self.ppt_template);
        self.prompt_dir = file.prompt_dir.or(self.prompt_dir);
        self.output_dir = file.output_dir.or(self.output_dir);
        self.timeout = file.timeout_secs.map(Duration::from_secs).or(self.timeout);
        self.manual = Some(file.manual);

        for (id, temperature) in file.temperatures {
            let field = id.parse::<FieldKind>().map_err(Error::config)?;
            self.temperatures.insert(field, temperature);
        }

        Ok(self)
    }

    /// Sets the document to process.
    #[must_use]
    pub fn input(mut self, path: impl Into<PathBuf>) -> Self {
        self.input = Some(path.into());
        self
    }

    /// Sets the output directory for generated files.
    #[must_use]
    pub fn output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(path.into());
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(ApiKey::new(key));
        self
    }

    /// Sets the endpoint root.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the model name.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the token budget per request.
    #[must_use]
    pub fn max_allowable_tokens(mut self, tokens: usize) -> Self {
        self.max_allowable_tokens = Some(tokens);
        self
    }

    /// Sets the marker that starts the bibliography.
    #[must_use]
    pub fn reference_indicator(mut self, indicator: impl Into<String>) -> Self {
        self.reference_indicator = Some(indicator.into());
        self
    }

    /// Sets the tokenizer implementation.
    #[must_use]
    pub fn tokenizer(mut self, kind: TokenizerKind) -> Self {
        self.tokenizer = Some(kind);
        self
    }

    /// Sets the Word template.
    #[must_use]
    pub fn word_template(mut self, path: impl Into<PathBuf>) -> Self {
        self.word_template = Some(path.into());
        self
    }

    /// Sets the PowerPoint template.
    #[must_use]
    pub fn ppt_template(mut self, path: impl Into<PathBuf>) -> Self {
        self.ppt_template = Some(path.into());
        self
    }

    /// Sets the prompt override directory.
    #[must_use]
    pub fn prompt_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.prompt_dir = Some(path.into());
        self
    }

    /// Sets the fields to generate.
    #[must_use]
    pub fn fields(mut self, fields: Vec<FieldKind>) -> Self {
        self.fields = Some(fields);
        self
    }

    /// Overrides the temperature of one field.
    #[must_use]
    pub fn temperature(mut self, field: FieldKind, temperature: f32) -> Self {
        self.temperatures.insert(field, temperature);
        self
    }

    /// Sets the manually supplied Word fields.
    #[must_use]
    pub fn manual(mut self, manual: ManualFields) -> Self {
        self.manual = Some(manual);
        self
    }

    /// Reduces oversized documents before generating.
    #[must_use]
    pub fn reduce_document(mut self, enabled: bool) -> Self {
        self.reduce_document = enabled;
        self
    }

    /// Enables dry run mode (no file writes).
    #[must_use]
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Enables or disables backup creation.
    #[must_use]
    pub fn backup_existing(mut self, enabled: bool) -> Self {
        self.backup_existing = Some(enabled);
        self
    }

    /// Sets the HTTP request timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn build(self) -> Result<Config> {
        let model = self.model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let providers = self.providers.unwrap_or_else(default_providers);
        let base_url = self
            .base_url
            .or_else(|| provider_base_url(&providers, &model))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let config = Config {
            input: self.input,
            output_dir: self
                .output_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            api_key: self.api_key,
            base_url,
            model,
            max_allowable_tokens: self
                .max_allowable_tokens
                .unwrap_or(DEFAULT_MAX_ALLOWABLE_TOKENS),
            reference_indicator: self
                .reference_indicator
                .unwrap_or_else(|| DEFAULT_REFERENCE_INDICATOR.to_string()),
            tokenizer: self.tokenizer.unwrap_or_default(),
            word_template: self.word_template,
            ppt_template: self.ppt_template,
            prompt_dir: self.prompt_dir,
            fields: self.fields.unwrap_or_else(|| FieldKind::all().to_vec()),
            temperatures: self.temperatures,
            manual: self.manual.unwrap_or_default(),
            reduce_document: self.reduce_document,
            dry_run: self.dry_run,
            backup_existing: self.backup_existing.unwrap_or(true),
            timeout: self
                .timeout
                .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            providers,
        };

        config.validate()?;
        Ok(config)
    }
}
