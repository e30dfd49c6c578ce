//! LessonLift CLI
//!
//! Serves the lesson-enhancement pipeline over HTTP.

use std::net::SocketAddr;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use lessonlift_pipeline::{create_router, AppState, Config, HttpCollaborator};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Default port for the HTTP API server.
const DEFAULT_PORT: u16 = 3000;

/// LessonLift - Lesson Enhancement Service
///
/// Generates improvement suggestions for lessons, previews the proposed
/// changes and confirms the ones a teacher keeps into a new lesson.
#[derive(Parser, Debug)]
#[command(name = "lessonlift")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: lessonlift.json in current directory)
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Port for the HTTP API server
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Base URL of the AI backend, overriding the config file
    #[arg(long, value_name = "URL")]
    backend_url: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("LessonLift starting");
    tracing::debug!(config = ?args.config, "Config file");

    match serve(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

/// Loads configuration and serves the API until Ctrl+C.
async fn serve(args: Args) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;

    if let Some(ref url) = args.backend_url {
        config.backend.base_url.clone_from(url);
    }

    // Re-validate after overrides
    config.validate()?;

    print_config(&config);

    let collaborator = HttpCollaborator::new(&config.backend)?;
    let router = create_router(AppState::new(Arc::new(collaborator), &config));

    let addr: SocketAddr = ([127, 0, 0, 1], args.port).into();
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {addr}: {e}\n\nSuggestion: Try a different port with --port"
        )
    })?;

    println!();
    println!("HTTP API server running on http://{addr}");
    println!("Editor events on ws://{addr}/ws");
    println!("Press Ctrl+C to stop");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl+C, shutting down");
            }
        })
        .await?;

    println!("Stopped");
    Ok(())
}

/// Loads configuration from the given path or the current directory.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

/// Prints the effective configuration.
fn print_config(config: &Config) {
    println!("Configuration loaded:");
    println!("  Backend: {}", config.backend.base_url);
    println!("  Request timeout: {}s", config.backend.request_timeout_secs);
    println!("  Retry attempts: {}", config.retry.max_attempts);
    println!("  Confirmation: {:?}", config.confirmation_strategy);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["lessonlift"]).unwrap();
        assert_eq!(args.port, DEFAULT_PORT);
        assert!(args.config.is_none());
        assert!(args.backend_url.is_none());
        assert!(!args.verbose);
    }

    #[test]
    fn test_args_overrides() {
        let args = Args::try_parse_from([
            "lessonlift",
            "--port",
            "8080",
            "--backend-url",
            "http://localhost:9000",
            "-v",
        ])
        .unwrap();
        assert_eq!(args.port, 8080);
        assert_eq!(args.backend_url.as_deref(), Some("http://localhost:9000"));
        assert!(args.verbose);
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let err = load_config(Some("/nonexistent/lessonlift.json")).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }
}
