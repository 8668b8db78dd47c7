use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use batch_sink::config::{
    DEFAULT_CONFIG_PATH, DEFAULT_INGEST_PATH, DEFAULT_LOG_PATH, DEFAULT_MAX_DECODED_BYTES,
    DEFAULT_SOURCE_CONFIG_FILE, ServerConfig,
};
use batch_sink::persistence::AppendLog;
use batch_sink::server::{AppState, build_router};
use clap::{ArgAction, Parser};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// HTTP sink for batched analytics events.
#[derive(Parser, Debug)]
#[command(name = "batch-sink", version)]
struct Args {
    /// Listen address (host:port)
    #[arg(short, long, env = "BATCH_SINK_LISTEN", default_value = "0.0.0.0:12791")]
    listen: SocketAddr,

    /// Append log; must already exist
    #[arg(long, env = "BATCH_SINK_LOG_PATH", default_value = DEFAULT_LOG_PATH)]
    log_path: PathBuf,

    /// Route accepting POSTed batches
    #[arg(long, env = "BATCH_SINK_INGEST_PATH", default_value = DEFAULT_INGEST_PATH, value_parser = parse_route)]
    ingest_path: String,

    /// Route serving the source configuration
    #[arg(long, env = "BATCH_SINK_CONFIG_PATH", default_value = DEFAULT_CONFIG_PATH, value_parser = parse_route)]
    config_path: String,

    /// JSON file served on the configuration route
    #[arg(long, env = "BATCH_SINK_SOURCE_CONFIG", default_value = DEFAULT_SOURCE_CONFIG_FILE)]
    source_config: PathBuf,

    /// Decompress `Content-Encoding: gzip` bodies (rejected with 400 when false)
    #[arg(long, env = "BATCH_SINK_GZIP", default_value_t = true, action = ArgAction::Set)]
    gzip: bool,

    /// Largest accepted decompressed body, in bytes
    #[arg(long, env = "BATCH_SINK_MAX_DECODED_BYTES", default_value_t = DEFAULT_MAX_DECODED_BYTES)]
    max_decoded_bytes: usize,

    /// Event fields holding the token, highest priority first
    #[arg(long, env = "BATCH_SINK_FIELDS", value_delimiter = ',', default_value = "event,type")]
    fields: Vec<String>,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            listen_addr: self.listen,
            log_path: self.log_path,
            ingest_path: self.ingest_path,
            config_path: self.config_path,
            source_config_file: self.source_config,
            gzip_enabled: self.gzip,
            max_decoded_bytes: self.max_decoded_bytes,
            field_priority: self.fields,
        }
    }
}

fn parse_route(s: &str) -> Result<String, String> {
    if s.starts_with('/') {
        Ok(s.to_string())
    } else {
        Err(format!("route must start with '/': {s}"))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "batch_sink=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Args::parse().into_config();

    if config.ingest_path == config.config_path {
        tracing::error!(path = %config.ingest_path, "ingest and config routes must differ");
        return ExitCode::FAILURE;
    }
    if !AppendLog::new(&config.log_path).exists() {
        // Batches will be refused with 500 until the log is provisioned.
        tracing::warn!(path = %config.log_path.display(), "Append log does not exist yet");
    }

    tracing::info!(
        log_path = %config.log_path.display(),
        ingest_path = %config.ingest_path,
        config_path = %config.config_path,
        gzip = config.gzip_enabled,
        "Starting batch sink"
    );

    let app = build_router(AppState::from_config(&config));

    let listener = match tokio::net::TcpListener::bind(config.listen_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %config.listen_addr, error = %e, "Failed to bind");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!("listening on {}", config.listen_addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "Server error");
        return ExitCode::FAILURE;
    }

    tracing::info!("Server stopped");
    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received Ctrl-C, shutting down");
}
