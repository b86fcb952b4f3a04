//! cosdb-import - Bulk import client for the cosdb catalog
//!
//! Verifies an upload key, submits a spreadsheet, and follows the
//! server-side import job until it succeeds or fails.

use anyhow::{Context, Result};
use clap::Parser;
use cosdb_common::api::{ImportKind, JobStatus};
use cosdb_common::config::{
    default_config_path, load_toml_config, ClientConfig, ConfigOverrides, LoggingConfig,
    TomlConfig,
};
use cosdb_common::events::{ImportEvent, NoticeLevel};
use cosdb_import::display::{progress_summary, render_job};
use cosdb_import::{HttpImportClient, ImportApi, ImportPage, PageSettings, SelectedFile};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Command-line arguments for cosdb-import
#[derive(Parser, Debug)]
#[command(name = "cosdb-import")]
#[command(about = "Bulk import client for the cosdb catalog")]
#[command(version)]
struct Cli {
    /// Backend API base URL (including the /api prefix)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Session access token sent as a bearer token
    #[arg(long, global = true)]
    access_token: Option<String>,

    /// TOML config file (defaults to <config_dir>/cosdb/import.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Job status poll period in milliseconds
    #[arg(long, global = true)]
    poll_interval_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug)]
struct KeyArg {
    /// Shared upload key
    #[arg(long, env = "COSDB_UPLOAD_KEY", hide_env_values = true)]
    key: String,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Check an upload key
    Verify {
        #[command(flatten)]
        key: KeyArg,
    },

    /// Download the import template
    Template {
        #[command(flatten)]
        key: KeyArg,

        /// Data category
        #[arg(long = "type", default_value = "video")]
        kind: ImportKind,

        /// Directory to save into
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Upload a spreadsheet and follow the import job
    Run {
        #[command(flatten)]
        key: KeyArg,

        /// .csv, .xlsx or .xls file
        #[arg(long)]
        file: PathBuf,

        /// Data category
        #[arg(long = "type", default_value = "video")]
        kind: ImportKind,

        /// Run row checks without saving records
        #[arg(long)]
        validate_only: bool,

        /// Print the task id and exit instead of polling
        #[arg(long)]
        no_wait: bool,
    },

    /// Fetch one job's status
    Status {
        #[command(flatten)]
        key: KeyArg,

        task_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = load_config(&cli, std::io::stderr)?;
    init_tracing(&config.logging)?;

    info!(
        "Starting cosdb-import v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!("Backend: {}", config.api_url);

    let client: Arc<dyn ImportApi> = Arc::new(
        HttpImportClient::from_config(&config).context("Failed to build HTTP client")?,
    );
    let page = ImportPage::new(Arc::clone(&client), PageSettings::from(&config));

    let code = match cli.command {
        Command::Verify { key } => {
            page.verify_key(&key.key).await?;
            println!("upload key accepted");
            ExitCode::SUCCESS
        }
        Command::Template { key, kind, out } => {
            page.verify_key(&key.key).await?;
            let path = match out {
                Some(dir) => page.download_template_to(kind, &dir).await?,
                None => page.download_template(kind).await?,
            };
            println!("template saved to {}", path.display());
            ExitCode::SUCCESS
        }
        Command::Run {
            key,
            file,
            kind,
            validate_only,
            no_wait,
        } => {
            let selected = SelectedFile::open(&file)
                .await
                .with_context(|| format!("Cannot use {}", file.display()))?;
            page.verify_key(&key.key).await?;

            println!("uploading {} ({})", selected.name(), selected.size_label());
            let task_id = page.submit(Some(&selected), kind, validate_only).await?;
            println!("task {} queued", task_id);

            if no_wait {
                ExitCode::SUCCESS
            } else {
                follow(&page).await
            }
        }
        Command::Status { key, task_id } => {
            page.verify_key(&key.key).await?;
            let credential = page.snapshot().await.upload_key;
            let job = client.fetch_status(&task_id, &credential).await?;
            for line in render_job(&job) {
                println!("{}", line);
            }
            ExitCode::SUCCESS
        }
    };

    page.shutdown().await;
    Ok(code)
}

/// Print progress until the job settles; non-zero exit when it failed
async fn follow(page: &ImportPage) -> ExitCode {
    let mut rx = page.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match event {
                ImportEvent::JobUpdated { job } if !job.is_terminal() => {
                    println!("{}", progress_summary(&job));
                }
                ImportEvent::Notice {
                    level: NoticeLevel::Error,
                    text,
                } => eprintln!("warning: {}", text),
                _ => {}
            }
        }
    });

    let finished = page.wait_for_terminal().await;
    printer.abort();

    match finished {
        Some(job) => {
            for line in render_job(&job) {
                println!("{}", line);
            }
            if job.status == JobStatus::Failed {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        None => {
            eprintln!("job is no longer tracked");
            ExitCode::FAILURE
        }
    }
}

/// Resolve configuration, logging through a temporary subscriber
///
/// The configured subscriber depends on the result, so messages from config
/// loading go to `writer` with the CLI level (or RUST_LOG, or info).
fn load_config<W>(cli: &Cli, writer: W) -> Result<ClientConfig>
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let filter = match cli.log_level.as_deref() {
        Some(level) => EnvFilter::try_new(level).context("Invalid log level")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    let bootstrap = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(writer)
        .finish();

    tracing::subscriber::with_default(bootstrap, || {
        let toml = match cli.config.clone().or_else(default_config_path) {
            Some(path) => load_toml_config(&path).context("Failed to load config file")?,
            None => TomlConfig::default(),
        };
        let overrides = ConfigOverrides {
            api_url: cli.api_url.clone(),
            access_token: cli.access_token.clone(),
            poll_interval_ms: cli.poll_interval_ms,
            download_dir: None,
            log_level: cli.log_level.clone(),
        };
        ClientConfig::resolve(&overrides, toml).context("Invalid configuration")
    })
}

/// Initialize tracing: RUST_LOG wins, then the configured level
fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .context("Invalid log level")?;

    match &logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Cannot open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }

    Ok(())
}
