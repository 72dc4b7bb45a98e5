mod cli;
mod config;
mod error;
mod output;

use std::path::Path;
use std::process;

use clap::Parser;
#[cfg(feature = "colored-output")]
use colored::*;
use scout_engine::session::cdp::CdpSession;
use scout_engine::{Discovery, NoopPlaybackTrigger};
use tracing::{Level, error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::{
    cli::{Args, Commands, OutputFormat, SniffArgs},
    config::AppConfig,
    error::{AppError, Result},
    output::{OutputManager, result_file_content, write_output},
};

/// Exit status when a manifest was found.
const EXIT_FOUND: i32 = 0;
/// Exit status when the page revealed no manifest within the budget.
const EXIT_NOT_FOUND: i32 = 1;
/// Exit status for any error.
const EXIT_ERROR: i32 = 2;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let json_errors = match &args.command {
        Commands::Sniff(sniff) => sniff.output.is_some_and(|o| o.is_json()),
        _ => false,
    };

    let code = match run(args).await {
        Ok(code) => code,
        Err(e) => {
            if json_errors {
                let error_json = serde_json::json!({
                    "status": "error",
                    "message": e.to_string(),
                });
                println!("{error_json}");
            } else {
                error!("Application error: {}", e);
                #[cfg(feature = "colored-output")]
                {
                    eprintln!("{} {}", "Error:".red().bold(), e);
                }
                #[cfg(not(feature = "colored-output"))]
                {
                    eprintln!("Error: {}", e);
                }
            }
            EXIT_ERROR
        }
    };
    process::exit(code);
}

async fn run(args: Args) -> Result<i32> {
    // Held until the command finishes so buffered file logs are flushed.
    let _guard = init_logging(args.verbose, args.quiet, args.log_dir.as_deref())?;
    let config = AppConfig::load(args.config.as_deref())?;

    match args.command {
        Commands::Sniff(sniff) => self::sniff(config, sniff).await,

        Commands::Completions { shell } => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Args::command();
            let bin_name = cmd.get_name().to_string();
            generate(shell, &mut cmd, bin_name, &mut std::io::stdout());
            Ok(EXIT_FOUND)
        }

        Commands::Config { show, reset } => {
            if reset {
                let path = AppConfig::reset(args.config.as_deref())?;
                println!("✓ Configuration reset to defaults ({})", path.display());
            } else if show {
                println!("{}", config.show()?);
            } else {
                println!(
                    "Use --show to display current configuration or --reset to reset to defaults"
                );
            }
            Ok(EXIT_FOUND)
        }
    }
}

async fn sniff(config: AppConfig, args: SniffArgs) -> Result<i32> {
    let url = args
        .url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .ok_or_else(|| {
            AppError::InvalidInput(
                "no target URL: pass it as an argument or set TARGET_URL".to_string(),
            )
        })?
        .to_string();

    let discovery_config = config.discovery_config(&args)?;
    discovery_config.validate()?;
    let extension = config.extension(&args).to_string();
    let format = config.output_format(&args);

    let mut discovery = Discovery::new(discovery_config);
    if !config.playback_enabled(&args) {
        discovery = discovery.with_playback_trigger(NoopPlaybackTrigger);
    }

    let browser = config.browser_options(&args);
    let session = CdpSession::launch(&browser).await?;
    info!(url = %url, "Searching for .{} manifest", extension);
    let report = discovery.run(session, &url).await?;

    let output = OutputManager::new(config.output.colored && format == OutputFormat::Pretty);
    write_output(&output.format_report(&report, format, &extension)?, None)?;

    if let Some(path) = config.output_file(&args) {
        write_output(&result_file_content(&report, &extension), Some(&path))?;
        info!(path = %path.display(), "Results written");
    }

    Ok(if report.outcome.is_found() {
        EXIT_FOUND
    } else {
        EXIT_NOT_FOUND
    })
}

/// Logs go to stderr so stdout carries only results; `log_dir` adds a daily
/// rotated file.
fn init_logging(verbose: bool, quiet: bool, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file_appender = tracing_appender::rolling::daily(dir, "scout.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = fmt::layer().with_writer(non_blocking).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_level(verbose),
        )
        .with(file_layer)
        .try_init()
        .map_err(|e| AppError::Logging(e.to_string()))?;
    Ok(guard)
}
