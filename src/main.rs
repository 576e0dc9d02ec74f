use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use highlight::{
    Config, ConfigBuilder, DEFAULT_CONFIG_FILE, FileConfig, Pipeline, TokenEstimator,
    TokenizerKind,
    document,
    field::FieldKind,
    prompt::{PromptEngine, PromptInputs},
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    name = "highlight",
    version,
    author,
    about = "Generate research highlights from papers with an LLM",
    long_about = "Generate research highlight content from a paper with an OpenAI-compatible model \
    and fill Word and PowerPoint templates with it.\n\n\
    The paper is read up to its reference section, every requested field is generated \
    (dependencies first), responses over their word limit are shortened once, and the \
    filled templates are written next to a summary.json.\n\n\
    Settings are read from ./highlight.toml when present; command line flags win.\n\n\
    USAGE EXAMPLES:\n  \
      # Generate every field and fill both templates\n  \
      highlight generate paper.pdf --word-template highlight.docx --ppt-template slide.pptx\n\n  \
      # Only the title and subtitle, without writing files\n  \
      highlight generate paper.pdf --field subtitle --dry-run\n\n  \
      # Check whether a paper fits the token budget\n  \
      highlight inspect paper.pdf --max-tokens 16384\n\n  \
      # Show the prompt sent for a field\n  \
      highlight prompt title paper.pdf"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate highlight fields and fill the templates
    Generate(GenerateArgs),

    /// Print document statistics and check the token budget
    Inspect {
        /// PDF or text document
        #[arg(value_name = "FILE")]
        input: PathBuf,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Strip irrelevant content from a document and write reduced.txt
    Reduce {
        /// PDF or text document
        #[arg(value_name = "FILE")]
        input: PathBuf,

        #[command(flatten)]
        common: CommonArgs,

        #[command(flatten)]
        api: ApiArgs,

        /// Output directory
        #[arg(short, long, value_name = "PATH")]
        out: Option<PathBuf>,

        /// Print the reduced text instead of writing it
        #[arg(long)]
        dry_run: bool,
    },

    /// List the configured models
    Models {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Render the prompt of one field without sending it
    Prompt {
        /// Field id (title, subtitle, science, ...)
        #[arg(value_name = "FIELD")]
        field: FieldKind,

        /// PDF or text document used as the prompt content
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Text for prompts that build on another field
        #[arg(long, value_name = "TEXT")]
        additional: Option<String>,

        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// PDF or text document
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Output directory for the filled templates
    #[arg(short, long, value_name = "PATH")]
    out: Option<PathBuf>,

    /// Word template with {{ placeholders }}
    #[arg(long, value_name = "FILE")]
    word_template: Option<PathBuf>,

    /// PowerPoint template whose first slide has six text shapes
    #[arg(long, value_name = "FILE")]
    ppt_template: Option<PathBuf>,

    /// Field to generate (repeatable, default: all)
    ///
    /// Fields a requested field builds on are generated too.
    #[arg(short, long = "field", value_name = "FIELD")]
    fields: Vec<FieldKind>,

    /// Temperature override in FIELD=VALUE format (repeatable)
    ///
    /// Example: highlight generate paper.pdf --temperature title=0.4
    #[arg(long = "temperature", value_name = "FIELD=VALUE", value_parser = parse_temperature)]
    temperatures: Vec<(FieldKind, f32)>,

    /// Reduce documents over the token budget with the model first
    #[arg(long)]
    reduce_document: bool,

    /// Dry run (generate, but don't write files)
    #[arg(long)]
    dry_run: bool,

    /// Overwrite existing outputs without a backup copy
    #[arg(long)]
    no_backup: bool,

    #[command(flatten)]
    common: CommonArgs,

    #[command(flatten)]
    api: ApiArgs,
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Config file (default: ./highlight.toml when present)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Model name
    #[arg(short, long)]
    model: Option<String>,

    /// Max prompt plus completion tokens per request
    #[arg(long)]
    max_tokens: Option<usize>,

    /// Tokenizer used for budgeting
    #[arg(long, value_enum)]
    tokenizer: Option<CliTokenizer>,

    /// Marker that starts the bibliography
    #[arg(long, value_name = "TEXT")]
    reference_indicator: Option<String>,

    /// Directory with <prompt id>.tera overrides
    #[arg(long, value_name = "PATH")]
    prompt_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ApiArgs {
    /// API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Endpoint root of an OpenAI-compatible API
    #[arg(long, env = "OPENAI_BASE_URL", value_name = "URL")]
    base_url: Option<String>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliTokenizer {
    Tiktoken,
    Simple,
    Enhanced,
}

impl From<CliTokenizer> for TokenizerKind {
    fn from(t: CliTokenizer) -> Self {
        match t {
            CliTokenizer::Tiktoken => Self::Tiktoken,
            CliTokenizer::Simple => Self::Simple,
            CliTokenizer::Enhanced => Self::Enhanced,
        }
    }
}

fn parse_temperature(value: &str) -> Result<(FieldKind, f32), String> {
    let (field, temperature) = value
        .split_once('=')
        .ok_or_else(|| format!("invalid temperature '{value}', expected FIELD=VALUE"))?;
    let field = field.trim().parse::<FieldKind>()?;
    let temperature = temperature
        .trim()
        .parse::<f32>()
        .map_err(|e| format!("invalid temperature '{temperature}': {e}"))?;
    Ok((field, temperature))
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    setup_tracing(cli.verbose)?;

    match cli.command {
        Command::Generate(args) => generate(args),
        Command::Inspect { input, common } => inspect(&input, &common),
        Command::Reduce {
            input,
            common,
            api,
            out,
            dry_run,
        } => {
            let mut builder = api.apply(common.builder()?).input(input).dry_run(dry_run);
            if let Some(out) = out {
                builder = builder.output_dir(out);
            }
            let config = builder.build().context("Failed to build configuration")?;

            let written = Pipeline::new(config)
                .context("Failed to create pipeline")?
                .reduce()
                .context("Document reduction failed")?;
            if let Some(path) = written {
                println!("Reduced document written to {}", path.display());
            }
            Ok(())
        }
        Command::Models { common } => {
            let config = common
                .builder()?
                .build()
                .context("Failed to build configuration")?;
            for model in config.list_models() {
                println!("{model}");
            }
            Ok(())
        }
        Command::Prompt {
            field,
            input,
            additional,
            common,
        } => render_prompt(field, &input, additional.as_deref(), &common),
    }
}

fn generate(args: GenerateArgs) -> anyhow::Result<()> {
    let mut builder = args
        .api
        .apply(args.common.builder()?)
        .input(args.input)
        .reduce_document(args.reduce_document)
        .dry_run(args.dry_run);

    if let Some(out) = args.out {
        builder = builder.output_dir(out);
    }
    if let Some(path) = args.word_template {
        builder = builder.word_template(path);
    }
    if let Some(path) = args.ppt_template {
        builder = builder.ppt_template(path);
    }
    if !args.fields.is_empty() {
        builder = builder.fields(args.fields);
    }
    for (field, temperature) in args.temperatures {
        builder = builder.temperature(field, temperature);
    }
    if args.no_backup {
        builder = builder.backup_existing(false);
    }

    let config = builder.build().context("Failed to build configuration")?;

    let stats = Pipeline::new(config)
        .context("Failed to create pipeline")?
        .run()
        .context("Highlight generation failed")?;
    stats.print_summary();

    Ok(())
}

fn inspect(input: &Path, common: &CommonArgs) -> anyhow::Result<()> {
    let config = common
        .builder()?
        .input(input)
        .build()
        .context("Failed to build configuration")?;
    let tokenizer = config
        .tokenizer
        .create(&config.model)
        .context("Failed to load tokenizer")?;

    let document = document::read_path(input, &config.reference_indicator, tokenizer.as_ref())
        .with_context(|| format!("Failed to read {}", input.display()))?;

    println!("{}", document.specs());
    if document.exceeds_budget(config.max_allowable_tokens) {
        println!(
            "Too long by {} tokens (limit {}); use `highlight reduce` or --reduce-document",
            document.token_deficit(config.max_allowable_tokens),
            config.max_allowable_tokens
        );
    } else {
        println!("Fits the {} token budget", config.max_allowable_tokens);
    }

    Ok(())
}

fn render_prompt(
    field: FieldKind,
    input: &Path,
    additional: Option<&str>,
    common: &CommonArgs,
) -> anyhow::Result<()> {
    let config = common
        .builder()?
        .input(input)
        .build()
        .context("Failed to build configuration")?;
    let tokenizer = config
        .tokenizer
        .create(&config.model)
        .context("Failed to load tokenizer")?;

    let document = document::read_path(input, &config.reference_indicator, tokenizer.as_ref())
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let prompts = PromptEngine::with_overrides(config.prompt_dir.as_deref())
        .context("Failed to load prompts")?;

    let prompt = prompts.render(
        field.spec().prompt,
        &PromptInputs::new(&document.content).with_additional(additional),
    )?;

    println!("{prompt}");
    eprintln!(
        "\n{} prompt tokens + {} completion tokens (limit {})",
        tokenizer.estimate(&prompt),
        field.spec().max_tokens,
        config.max_allowable_tokens
    );

    Ok(())
}

impl CommonArgs {
    /// Config file values overlaid with the flags given here.
    fn builder(&self) -> anyhow::Result<ConfigBuilder> {
        let mut builder = Config::builder();

        let default_file = Path::new(DEFAULT_CONFIG_FILE);
        let file = match &self.config {
            Some(path) => Some(path.as_path()),
            None if default_file.is_file() => Some(default_file),
            None => None,
        };
        if let Some(path) = file {
            let loaded = FileConfig::load(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?;
            builder = builder.file(loaded)?;
        }

        if let Some(ref model) = self.model {
            if model.trim().is_empty() {
                bail!("--model must not be empty");
            }
            builder = builder.model(model);
        }
        if let Some(tokens) = self.max_tokens {
            builder = builder.max_allowable_tokens(tokens);
        }
        if let Some(tokenizer) = self.tokenizer {
            builder = builder.tokenizer(tokenizer.into());
        }
        if let Some(ref indicator) = self.reference_indicator {
            builder = builder.reference_indicator(indicator);
        }
        if let Some(ref dir) = self.prompt_dir {
            builder = builder.prompt_dir(dir);
        }

        Ok(builder)
    }
}

impl ApiArgs {
    fn apply(self, mut builder: ConfigBuilder) -> ConfigBuilder {
        if let Some(key) = self.api_key {
            builder = builder.api_key(key);
        }
        if let Some(url) = self.base_url {
            builder = builder.base_url(url);
        }
        if let Some(secs) = self.timeout {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        builder
    }
}

fn setup_tracing(verbosity: u8) -> anyhow::Result<()> {
    let filter = match verbosity {
        0 => EnvFilter::new("highlight=info"),
        1 => EnvFilter::new("highlight=debug"),
        _ => EnvFilter::new("highlight=trace"),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_thread_ids(false))
        .init();

    Ok(())
}
