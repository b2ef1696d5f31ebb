//! CLI command implementations

use crate::output::{average_speed, format_bytes, format_elapsed, format_speed, print_output};
use crate::progress::TransferProgress;
use crate::{ConfigAction, OutputFormat};
use anyhow::{anyhow, Result};
use console::style;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tickload_core::config::{load_config, save_config};
use tickload_core::{
    DownloadEngine, HttpTransport, TaskScheduler, TickDriver, TransferCallbacks, Transport,
};
use tickload_types::{DownloadSession, EngineConfig, SessionState};
use tracing::{debug, info};

// ============================================================================
// Download Commands
// ============================================================================

/// Fold command-line overrides into the loaded config
pub fn apply_overrides(
    config: &mut EngineConfig,
    chunk_size: Option<usize>,
    limit: Option<u64>,
    no_sync: bool,
) {
    if let Some(chunk_size) = chunk_size.filter(|&c| c > 0) {
        config.chunk_size = chunk_size;
    }
    if let Some(limit) = limit {
        config.speed_limit = if limit == 0 { None } else { Some(limit) };
    }
    if no_sync {
        config.sync_writes = false;
    }
}

/// File name to save `url` under when no output path is given
pub fn default_destination(url: &str) -> PathBuf {
    url::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|segments| segments.last().map(str::to_string))
        })
        .filter(|name| !name.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("download.bin"))
}

pub fn exit_code(state: SessionState) -> ExitCode {
    match state {
        SessionState::Completed => ExitCode::SUCCESS,
        SessionState::Cancelled => ExitCode::from(130),
        _ => ExitCode::FAILURE,
    }
}

pub fn get(
    url: &str,
    output: Option<PathBuf>,
    config: EngineConfig,
    format: OutputFormat,
) -> Result<SessionState> {
    let destination = output.unwrap_or_else(|| default_destination(url));
    let tick = Duration::from_millis(config.tick_interval_ms.max(1));

    let scheduler = Arc::new(TaskScheduler::new());
    let engine = DownloadEngine::new(Arc::clone(&scheduler), config)?;

    let label = destination.display().to_string();
    let bar = TransferProgress::new(format == OutputFormat::Human, &label);
    let delivered = Arc::new(AtomicBool::new(false));

    let callbacks = {
        let (progress, complete, failed, cancelled) =
            (bar.clone(), bar.clone(), bar.clone(), bar.clone());
        let (d1, d2, d3) = (
            Arc::clone(&delivered),
            Arc::clone(&delivered),
            Arc::clone(&delivered),
        );
        TransferCallbacks::new()
            .on_progress(move |p| progress.set_fraction(p))
            .on_complete(move || {
                complete.finish_completed();
                d1.store(true, Ordering::SeqCst);
            })
            .on_failed(move |e| {
                failed.finish_failed(e);
                d2.store(true, Ordering::SeqCst);
            })
            .on_cancelled(move || {
                cancelled.finish_cancelled();
                d3.store(true, Ordering::SeqCst);
            })
    };

    let handle = engine.start_download(url, &destination, callbacks)?;
    info!("Downloading {} to {}", url, destination.display());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let driver = TickDriver::spawn(Arc::clone(&scheduler), tick);
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let mut interrupted = false;
        let mut idle_ticks = 0u32;

        // Run until the terminal notification has gone through the scheduler
        while !delivered.load(Ordering::SeqCst) {
            // Worker gone without a notification (it panicked)
            if !engine.is_active(handle) {
                idle_ticks += 1;
                if idle_ticks > 100 {
                    break;
                }
            }
            tokio::select! {
                result = &mut ctrl_c, if !interrupted => {
                    interrupted = true;
                    if result.is_ok() {
                        debug!("Interrupted, cancelling {}", handle);
                        let _ = engine.cancel(handle);
                    }
                }
                _ = tokio::time::sleep(tick) => {
                    if let Some(total) = engine.session(handle).and_then(|s| s.total_size) {
                        bar.set_total(total);
                    }
                }
            }
        }

        let ticks = driver.stop().await;
        debug!("Tick loop ran {} ticks", ticks);
    });

    let session = engine.wait(handle)?;
    print_session(&session, format)?;
    Ok(session.state)
}

fn print_session(session: &DownloadSession, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(session)?);
        }
        OutputFormat::Human => {
            let elapsed_ms = session
                .finished_at
                .map(|end| (end - session.started_at).num_milliseconds())
                .unwrap_or(0);
            let transferred = session.written_bytes.saturating_sub(session.resumed_from);

            println!("  File: {}", style(session.destination.display()).cyan());
            println!(
                "  Size: {}",
                session
                    .total_size
                    .map(format_bytes)
                    .unwrap_or_else(|| "?".to_string())
            );
            if session.resumed_from > 0 {
                println!("  Resumed from: {}", format_bytes(session.resumed_from));
            }
            match average_speed(transferred, elapsed_ms) {
                Some(speed) => println!(
                    "  Transferred: {} in {} ({})",
                    format_bytes(transferred),
                    format_elapsed(elapsed_ms),
                    format_speed(speed)
                ),
                None => println!(
                    "  Transferred: {} in {}",
                    format_bytes(transferred),
                    format_elapsed(elapsed_ms)
                ),
            }
            if let Some(ref error) = session.error {
                println!("  Error: {}", style(error).red());
            }
        }
    }
    Ok(())
}

// ============================================================================
// Probe
// ============================================================================

#[derive(Debug, Serialize)]
struct ProbeResult {
    url: String,
    size: Option<u64>,
    error: Option<String>,
}

pub fn probe_urls(urls: Vec<String>, config: &EngineConfig, format: OutputFormat) -> Result<()> {
    let transport = HttpTransport::new(config)?;

    let results: Vec<ProbeResult> = urls
        .into_iter()
        .map(|url| match transport.probe(&url) {
            Ok(size) => ProbeResult {
                url,
                size: Some(size),
                error: None,
            },
            Err(e) => ProbeResult {
                url,
                size: None,
                error: Some(e.to_string()),
            },
        })
        .collect();

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        OutputFormat::Human => {
            for result in &results {
                match (&result.error, result.size) {
                    (Some(error), _) => println!(
                        "{} {}: {}",
                        style("✗").red(),
                        result.url,
                        style(error).red()
                    ),
                    (None, Some(size)) => println!(
                        "{} {}\n    Size: {}",
                        style("✓").green(),
                        result.url,
                        format_bytes(size)
                    ),
                    (None, None) => {}
                }
            }
        }
    }

    Ok(())
}

// ============================================================================
// Config
// ============================================================================

#[derive(Serialize)]
struct ConfigView<'a> {
    path: &'a Path,
    #[serde(flatten)]
    config: &'a EngineConfig,
}

impl std::fmt::Display for ConfigView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", style("Configuration:").bold())?;
        writeln!(f, "  File: {}", self.path.display())?;
        writeln!(f, "  Chunk size: {}", format_bytes(self.config.chunk_size as u64))?;
        writeln!(f, "  Sync writes: {}", self.config.sync_writes)?;
        writeln!(
            f,
            "  Speed limit: {}",
            self.config
                .speed_limit
                .map(format_speed)
                .unwrap_or_else(|| "Unlimited".to_string())
        )?;
        writeln!(f, "  Connect timeout: {}s", self.config.connect_timeout_secs)?;
        writeln!(f, "  User agent: {}", self.config.user_agent)?;
        write!(f, "  Tick interval: {}ms", self.config.tick_interval_ms)
    }
}

pub fn config_action(path: &Path, action: Option<ConfigAction>, format: OutputFormat) -> Result<()> {
    match action.unwrap_or(ConfigAction::Show) {
        ConfigAction::Show => {
            let config = load_config(path)?;
            print_output(&ConfigView { path, config: &config }, format)?;
        }

        ConfigAction::Path => println!("{}", path.display()),

        ConfigAction::Init { force } => {
            if path.exists() && !force {
                return Err(anyhow!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                ));
            }
            save_config(path, &EngineConfig::default())?;
            println!(
                "{} Wrote default config to {}",
                style("✓").green().bold(),
                path.display()
            );
        }
    }

    Ok(())
}
