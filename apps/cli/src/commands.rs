//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use evmanual_core::{DocumentIndex, KeywordRouter, LlmRouter, Pipeline, ProgressReporter, Router};
use evmanual_llm::{ChatClient, EmbeddingClient};
use evmanual_shared::{
    AnswerResult, AppConfig, LanguageModel, PipelineConfig, Section, Stage, init_config,
    load_config, load_config_from, validate_api_key,
};
use evmanual_storage::{LibsqlCorpus, Storage};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::render;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// evmanual: answer maintenance questions from EV service manuals.
#[derive(Parser)]
#[command(
    name = "evmanual",
    version,
    about = "Answer maintenance questions from an indexed EV service-manual corpus.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.evmanual/evmanual.toml).
    #[arg(long, global = true, env = "EVMANUAL_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Which router makes the section and document decisions.
#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
pub(crate) enum RouterKind {
    /// Ask the chat model.
    #[default]
    Llm,
    /// Deterministic keyword table, no model calls.
    Keyword,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Answer a question from the manuals.
    Ask {
        /// The question, in any language the model understands.
        question: String,

        /// Print the full result as JSON.
        #[arg(long)]
        json: bool,

        /// Maximum chunks retrieved (overrides retrieval.top_k).
        #[arg(long)]
        top_k: Option<usize>,

        /// Routing strategy.
        #[arg(long, value_enum, default_value_t = RouterKind::Llm)]
        router: RouterKind,

        /// Index database (overrides corpus.db_path).
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// List manual sections with their document counts.
    Sections {
        /// Index database (overrides corpus.db_path).
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// List the candidate documents of one section.
    Documents {
        /// Section label, e.g. "브레이크 시스템".
        section: String,

        /// Index database (overrides corpus.db_path).
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "evmanual=info",
        1 => "evmanual=debug",
        _ => "evmanual=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Ask {
            question,
            json,
            top_k,
            router,
            db,
        } => {
            let config = resolve_config(config_path.as_deref())?;
            cmd_ask(&config, &question, json, top_k, router, db.as_deref()).await
        }
        Command::Sections { db } => {
            let config = resolve_config(config_path.as_deref())?;
            cmd_sections(&config, db.as_deref()).await
        }
        Command::Documents { section, db } => {
            let config = resolve_config(config_path.as_deref())?;
            cmd_documents(&config, &section, db.as_deref()).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path.as_deref()).await,
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    })
}

fn db_path(config: &AppConfig, db: Option<&Path>) -> PathBuf {
    db.map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(&config.corpus.db_path))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_ask(
    config: &AppConfig,
    question: &str,
    json: bool,
    top_k: Option<usize>,
    router_kind: RouterKind,
    db: Option<&Path>,
) -> Result<()> {
    // Validate API keys before doing anything
    validate_api_key(config)?;

    let db_path = db_path(config, db);
    let storage = Storage::open_readonly(&db_path).await?;
    let embedder = Arc::new(EmbeddingClient::from_config(config)?);
    let store = Arc::new(LibsqlCorpus::new(storage, embedder));

    let chat: Arc<dyn LanguageModel> = Arc::new(ChatClient::from_config(config)?);
    let router: Arc<dyn Router> = match router_kind {
        RouterKind::Llm => Arc::new(LlmRouter::new(Arc::clone(&chat))),
        RouterKind::Keyword => Arc::new(KeywordRouter::new()),
    };

    let mut pipeline_config = PipelineConfig::from(config);
    if let Some(k) = top_k {
        if k == 0 {
            return Err(eyre!("--top-k must be at least 1"));
        }
        pipeline_config.top_k = k;
    }

    info!(
        db = %db_path.display(),
        router = ?router_kind,
        model = chat.model_id(),
        top_k = pipeline_config.top_k,
        "answering question"
    );

    let pipeline = Pipeline::new(router, store, chat, pipeline_config);
    let reporter = CliProgress::new();

    let result = match pipeline.answer_query_with(question, &reporter).await {
        Ok(result) => result,
        Err(err) => {
            reporter.clear();
            if let Some(failure) = err.as_generation() {
                eprint!("{}", render::FailureView(failure));
            }
            return Err(err.into());
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        let view = render::AnswerView {
            result: &result,
            assets_root: Path::new(&config.corpus.assets_root),
        };
        print!("{view}");
        println!();
    }

    Ok(())
}

async fn load_index(config: &AppConfig, db: Option<&Path>) -> Result<DocumentIndex> {
    let storage = Storage::open_readonly(&db_path(config, db)).await?;
    let metadata = storage.all_metadata().await?;
    let index = DocumentIndex::from_metadata(&metadata);
    info!(chunks = metadata.len(), skipped = index.skipped(), "index loaded");
    Ok(index)
}

async fn cmd_sections(config: &AppConfig, db: Option<&Path>) -> Result<()> {
    let index = load_index(config, db).await?;

    println!();
    for section in Section::ALL {
        println!("  {:>3}  {section}", index.document_count(section));
    }
    if index.skipped() > 0 {
        println!();
        println!("  {} chunk(s) carry an unknown section label", index.skipped());
    }
    println!();
    Ok(())
}

async fn cmd_documents(config: &AppConfig, section: &str, db: Option<&Path>) -> Result<()> {
    let section: Section = section.parse()?;
    let index = load_index(config, db).await?;

    let documents = index.documents(section);
    println!();
    if documents.is_empty() {
        println!("  No documents indexed for {section}.");
    } else {
        for document in documents {
            println!("  {document}");
        }
    }
    println!();
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = resolve_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn clear(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn stage(&self, stage: Stage) {
        let message = match stage {
            Stage::Section => "Classifying section",
            Stage::Document => "Selecting document",
            Stage::Retrieval => "Retrieving passages",
            Stage::Answer => "Writing answer",
        };
        self.spinner.set_message(message);
    }

    fn routed(&self, section: &str, document: &str) {
        self.spinner
            .println(format!("  {section} / {document}"));
    }

    fn done(&self, _result: &AnswerResult) {
        self.clear();
    }
}
