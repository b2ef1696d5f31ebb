//! tickload CLI - resumable downloads from the command line
//!
//! The CLI is a thin host around tickload-core: it ticks the scheduler on a
//! fixed period, renders the progress it delivers, and turns Ctrl-C into a
//! cooperative cancel so the partial file stays resumable.

mod commands;
mod output;
mod progress;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// tickload - resumable HTTP downloads
#[derive(Parser)]
#[command(name = "tickload")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the JSON config file
    #[arg(long, env = "TICKLOAD_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "human")]
    output: OutputFormat,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Human,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a URL, resuming a partial file if one exists
    Get {
        /// URL to download
        url: String,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Bytes read per chunk
        #[arg(long, env = "TICKLOAD_CHUNK_SIZE")]
        chunk_size: Option<usize>,

        /// Speed limit in bytes/sec
        #[arg(long, env = "TICKLOAD_SPEED_LIMIT")]
        limit: Option<u64>,

        /// Skip syncing file data after each chunk
        #[arg(long)]
        no_sync: bool,
    },

    /// Probe URLs for their size
    Probe {
        /// URLs to probe
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Show or create the config file
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective config
    Show,

    /// Print the config file path
    Path,

    /// Write the default config
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

// No #[tokio::main]: the blocking HTTP client must live outside a runtime,
// so `get` builds its own runtime just for the tick loop.
fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli.config.unwrap_or_else(|| {
        dirs::config_dir()
            .map(|d| d.join("tickload"))
            .unwrap_or_else(|| PathBuf::from(".tickload"))
            .join("config.json")
    });

    match cli.command {
        Commands::Get {
            url,
            output,
            chunk_size,
            limit,
            no_sync,
        } => {
            let mut config = tickload_core::config::load_config(&config_path)?;
            commands::apply_overrides(&mut config, chunk_size, limit, no_sync);
            let state = commands::get(&url, output, config, cli.output)?;
            return Ok(commands::exit_code(state));
        }

        Commands::Probe { urls } => {
            let config = tickload_core::config::load_config(&config_path)?;
            commands::probe_urls(urls, &config, cli.output)?
        }

        Commands::Config { action } => commands::config_action(&config_path, action, cli.output)?,

        Commands::Completions { shell } => {
            use clap::CommandFactory;
            clap_complete::generate(shell, &mut Cli::command(), "tickload", &mut std::io::stdout());
        }
    }

    Ok(ExitCode::SUCCESS)
}
