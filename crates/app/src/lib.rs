use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

use mangamotion_core::config::{config_path, data_dir, initialize_data_dir, AppConfig};
use mangamotion_core::interpolation::EngineKind;
use mangamotion_core::logging::{self, FileSink, LogOptions, PanicHook, DEFAULT_LOG_FILTER};
use mangamotion_core::server::{app_router, AppState};
use mangamotion_core::{AnimationRequest, Pipeline};

#[derive(Debug, Parser)]
#[command(
    name = "mangamotion",
    about = "Turn manga panels into a smoothly interpolated video",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[arg(
        short = 'v',
        long = "verbose",
        action = ArgAction::Count,
        global = true,
        help = "Increase log verbosity (-v: debug, -vv: trace)"
    )]
    verbose: u8,

    #[arg(
        long = "log-filter",
        value_name = "FILTER",
        global = true,
        help = "Explicit tracing filter (overrides RUST_LOG and -v)"
    )]
    log_filter: Option<String>,

    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[arg(short, long)]
    port: Option<u16>,

    #[arg(long)]
    host: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Render a set of panels once and print the video path.
    Render(RenderArgs),
}

#[derive(Debug, Args)]
struct RenderArgs {
    #[arg(required = true, help = "Panel images; order is taken from their file names")]
    images: Vec<PathBuf>,
    #[arg(
        short = 'm',
        long,
        allow_negative_numbers = true,
        help = "Frames per segment, rounded to a power of two [default: from config]"
    )]
    multiplier: Option<i64>,
    #[arg(short = 'r', long, help = "Output frame rate [default: from config]")]
    fps: Option<u32>,
    #[arg(short = 'o', long, help = "Output video path (a temporary file if omitted)")]
    output: Option<PathBuf>,
    #[arg(long, help = "Skip the learned model and use the blend interpolator")]
    blend: bool,
    #[arg(long, value_name = "ID", help = "CUDA device id for the learned model")]
    device: Option<i32>,
}

impl RenderArgs {
    fn apply_overrides(&self, config: &mut AppConfig) {
        if self.blend {
            config.interpolation.engine = EngineKind::Blend;
        }
        if let Some(device) = self.device {
            config.interpolation.device_id = device;
        }
    }

    fn to_request(&self, config: &AppConfig) -> AnimationRequest {
        AnimationRequest {
            inputs: self.images.clone(),
            multiplier: self.multiplier.unwrap_or(config.render.multiplier),
            fps: self.fps.unwrap_or(config.render.fps),
            output: self.output.clone(),
        }
    }
}

pub async fn run_from_env() -> Result<()> {
    let cli = Cli::parse();
    let resolved_data_dir = data_dir(cli.data_dir.as_deref());

    mangamotion_core::runtime::setup_runtime_libs();
    init_logging(&resolved_data_dir, cli.verbose, cli.log_filter.as_deref());

    let mut config = load_config(&resolved_data_dir);
    mangamotion_core::runtime::log_runtime_lib_status(&config.encoder.binary);
    info!(
        mode = if cli.command.is_some() { "cli" } else { "server" },
        pid = std::process::id(),
        data_dir = %resolved_data_dir.display(),
        config_path = %config_path(&resolved_data_dir).display(),
        "Runtime startup metadata"
    );

    match cli.command {
        Some(Commands::Render(args)) => {
            args.apply_overrides(&mut config);
            let output = run_render(&config, args.to_request(&config)).await?;
            println!("{}", output.display());
            Ok(())
        }
        None => run_server(&config, cli.host, cli.port).await,
    }
}

fn init_logging(data_dir: &Path, verbose: u8, cli_filter: Option<&str>) {
    match logging::install_panic_hook(data_dir) {
        Ok(PanicHook::Installed(_)) | Ok(PanicHook::AlreadyInstalled(_)) => {}
        Err(error) => eprintln!(
            "Warning: panic crash artifact hook unavailable (path: {}; reason: {error}). Panics will not be persisted to crash logs.",
            logging::crash_dir(data_dir).display()
        ),
    }

    let options = LogOptions {
        data_dir: Some(data_dir.to_path_buf()),
        verbose,
        cli_filter: cli_filter.map(ToString::to_string),
        rust_log: std::env::var("RUST_LOG").ok(),
        ..Default::default()
    };
    let filters = options.filters();
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(parse_env_filter_with_fallback(&filters.console, "console"));

    match options.file_sink() {
        FileSink::Ready { appender, .. } => {
            let subscriber = tracing_subscriber::registry().with(console_layer).with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(appender)
                    .with_filter(parse_env_filter_with_fallback(&filters.file, "file")),
            );
            if let Err(error) = tracing::subscriber::set_global_default(subscriber) {
                eprintln!(
                    "Failed to initialize tracing subscriber: {error}. Continuing without structured tracing."
                );
            }
        }
        FileSink::Disabled { log_dir, reason } => {
            let subscriber = tracing_subscriber::registry().with(console_layer);
            if let Err(error) = tracing::subscriber::set_global_default(subscriber) {
                eprintln!(
                    "Failed to initialize tracing subscriber: {error}. Continuing without structured tracing."
                );
                return;
            }
            let log_dir = log_dir
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "<none>".to_string());
            warn!(
                attempted_log_dir = %log_dir,
                reason = %reason,
                "Persistent file logging unavailable; continuing with console-only logging"
            );
        }
    }
}

fn parse_env_filter_with_fallback(filter: &str, sink_name: &str) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_new(filter).unwrap_or_else(|error| {
        eprintln!(
            "Invalid {sink_name} log filter '{filter}': {error}. Falling back to '{DEFAULT_LOG_FILTER}'."
        );
        tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER)
    })
}

fn load_config(data_dir: &Path) -> AppConfig {
    if let Err(e) = initialize_data_dir(data_dir) {
        warn!(error = %e, "Failed to initialize data directory");
    }
    match AppConfig::load_from_path(&config_path(data_dir)) {
        Ok(config) => config,
        Err(err) => {
            warn!(error = %format!("{err:#}"), "Failed to load config file, using defaults");
            AppConfig::default()
        }
    }
}

async fn run_render(config: &AppConfig, request: AnimationRequest) -> Result<PathBuf> {
    let config = config.clone();
    tokio::task::spawn_blocking(move || {
        let pipeline = Pipeline::from_config(&config);
        pipeline.render(&request)
    })
    .await
    .context("render task did not complete")?
}

fn server_addr(config: &AppConfig, host: Option<String>, port: Option<u16>) -> String {
    let port = port
        .or_else(|| std::env::var("PORT").ok().and_then(|v| v.parse().ok()))
        .unwrap_or(config.server.port);
    let host = host.unwrap_or_else(|| config.server.host.clone());
    format!("{host}:{port}")
}

async fn run_server(config: &AppConfig, host: Option<String>, port: Option<u16>) -> Result<()> {
    let engine_config = config.clone();
    let pipeline = tokio::task::spawn_blocking(move || Pipeline::from_config(&engine_config))
        .await
        .context("engine initialization did not complete")?;
    let mode = pipeline.mode();
    let app = app_router(AppState::new(pipeline));

    let addr = server_addr(config, host, port);
    info!(%addr, engine = %mode, "Starting mangamotion server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await?;
    Ok(())
}
