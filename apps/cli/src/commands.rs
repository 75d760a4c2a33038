//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use contentfill_core::{EnrichmentOrchestrator, EnrichmentProgress};
use contentfill_generation::HttpGenerator;
use contentfill_shared::{
    AppConfig, ContentFillError, NewContent, expand_home, init_config, load_config,
};
use contentfill_storage::{ContentStore, LibsqlStore};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// ContentFill: generate missing titles, descriptions and categories.
#[derive(Parser)]
#[command(
    name = "contentfill",
    version,
    about = "Fill in missing titles, descriptions and categories using a text-generation model.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run one enrichment pass over the database.
    Run {
        /// Database file (overrides `[database] path`).
        #[arg(long, env = "CONTENTFILL_DB")]
        db: Option<PathBuf>,

        /// Chat completions endpoint (overrides `[generation] endpoint`).
        #[arg(long, env = "CONTENTFILL_ENDPOINT")]
        endpoint: Option<String>,

        /// Model name (overrides `[generation] model`).
        #[arg(long, env = "CONTENTFILL_MODEL")]
        model: Option<String>,
    },

    /// Show how many records each phase would touch.
    Status {
        /// Database file (overrides `[database] path`).
        #[arg(long, env = "CONTENTFILL_DB")]
        db: Option<PathBuf>,
    },

    /// Seed records from a JSON array of `{"title", "description"}` objects.
    Import {
        /// Database file (overrides `[database] path`).
        #[arg(long, env = "CONTENTFILL_DB")]
        db: Option<PathBuf>,

        /// JSON file to import.
        file: PathBuf,
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

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "contentfill=info",
        1 => "contentfill=debug",
        _ => "contentfill=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
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
    match cli.command {
        Command::Run {
            db,
            endpoint,
            model,
        } => cmd_run(db, endpoint, model).await,
        Command::Status { db } => cmd_status(db).await,
        Command::Import { db, file } => cmd_import(db, &file).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

/// Database path from the flag, falling back to the config file.
fn resolve_db_path(config: &AppConfig, db: Option<PathBuf>) -> Result<PathBuf> {
    match db {
        Some(path) => Ok(expand_home(&path.to_string_lossy())?),
        None => Ok(config.database_path()?),
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(
    db: Option<PathBuf>,
    endpoint: Option<String>,
    model: Option<String>,
) -> Result<()> {
    let mut config = load_config()?;
    if let Some(endpoint) = endpoint {
        config.generation.endpoint = endpoint;
    }
    if let Some(model) = model {
        config.generation.model = model;
    }
    config.validate()?;

    let db_path = resolve_db_path(&config, db)?;
    let generator = HttpGenerator::new(&config.generation)?;
    let store = LibsqlStore::new(&db_path);

    info!(
        db = %db_path.display(),
        endpoint = %generator.endpoint(),
        model = %config.generation.model,
        "starting enrichment run"
    );

    let mut orchestrator = EnrichmentOrchestrator::new(generator, store, &config.enrichment);
    let progress = CliProgress::new();
    let result = orchestrator.run(&progress).await;
    progress.finish();
    let report = result?;

    println!();
    println!("  Enrichment complete!");
    println!("  Titles generated:      {}", report.titles_generated);
    println!("  Titles defaulted:      {}", report.titles_defaulted);
    println!("  Descriptions written:  {}", report.descriptions_written);
    println!("  Categories matched:    {}", report.categories_matched);
    println!("  Categories created:    {}", report.categories_created);
    println!("  Without category:      {}", report.category_fallbacks);
    println!("  Skipped:               {}", report.records_skipped);
    println!("  Time:                  {:.1}s", report.elapsed.as_secs_f64());
    println!();

    Ok(())
}

async fn cmd_status(db: Option<PathBuf>) -> Result<()> {
    let config = load_config()?;
    let db_path = resolve_db_path(&config, db)?;

    let mut store = LibsqlStore::open(&db_path).await?;
    let counts = store.pending_counts().await;
    store.disconnect().await?;
    let counts = counts?;

    println!();
    println!("  Database:             {}", db_path.display());
    println!("  Categories:           {}", counts.categories);
    println!("  Null titles:          {}", counts.null_title);
    println!("  Invalid titles:       {}", counts.invalid_title);
    println!("  Missing descriptions: {}", counts.missing_description);
    println!();

    Ok(())
}

async fn cmd_import(db: Option<PathBuf>, file: &Path) -> Result<()> {
    let config = load_config()?;
    let db_path = resolve_db_path(&config, db)?;

    let raw = std::fs::read_to_string(file).map_err(|e| ContentFillError::io(file, e))?;
    let rows: Vec<NewContent> = serde_json::from_str(&raw).map_err(|e| {
        ContentFillError::parse(format!(
            "'{}' is not a JSON array of records: {e}",
            file.display()
        ))
    })?;

    info!(file = %file.display(), rows = rows.len(), "importing records");

    let mut store = LibsqlStore::open(&db_path).await?;
    let mut imported = 0usize;
    let mut outcome = Ok(());
    for row in &rows {
        if let Err(e) = store.insert_content(row).await {
            outcome = Err(e);
            break;
        }
        imported += 1;
    }
    store.disconnect().await?;
    outcome?;

    println!("Imported {imported} records into {}", db_path.display());
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
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
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl EnrichmentProgress for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn task_progress(&self, current: usize, total: usize, detail: &str) {
        self.spinner
            .set_message(format!("[{current}/{total}] {detail}"));
    }
}
