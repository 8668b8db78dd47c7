//! Server configuration.
//!
//! Every knob the ingestion pipeline reads lives in [`ServerConfig`]. The
//! server binary fills it from command-line flags and environment variables;
//! tests build it directly.

use std::net::SocketAddr;
use std::path::PathBuf;

/// Default location of the append log, relative to the working directory.
pub const DEFAULT_LOG_PATH: &str = "output_files/batch_content.txt";

/// Default route accepting event batches.
pub const DEFAULT_INGEST_PATH: &str = "/v1/batch";

/// Default route serving the static source configuration.
pub const DEFAULT_CONFIG_PATH: &str = "/sourceConfig";

/// Default static source configuration file.
pub const DEFAULT_SOURCE_CONFIG_FILE: &str = "json_files/sample_config.json";

/// Upper bound on the size of a decompressed request body.
pub const DEFAULT_MAX_DECODED_BYTES: usize = 16 * 1024 * 1024;

/// Field names tried, in order, to find an event's token.
pub const DEFAULT_FIELD_PRIORITY: [&str; 2] = ["event", "type"];

/// Configuration for one ingestion server instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    pub listen_addr: SocketAddr,

    /// Append log. Must be provisioned before the server accepts batches;
    /// the server never creates it.
    pub log_path: PathBuf,

    /// Route accepting `POST` batches.
    pub ingest_path: String,

    /// Route serving the static source configuration via `GET`.
    pub config_path: String,

    /// JSON file served on `config_path`.
    pub source_config_file: PathBuf,

    /// Whether `Content-Encoding: gzip` bodies are decompressed. When false
    /// such bodies are rejected with 400.
    pub gzip_enabled: bool,

    /// Decompressed bodies larger than this are rejected.
    pub max_decoded_bytes: usize,

    /// Event field names, highest priority first.
    pub field_priority: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 12791)),
            log_path: PathBuf::from(DEFAULT_LOG_PATH),
            ingest_path: DEFAULT_INGEST_PATH.to_string(),
            config_path: DEFAULT_CONFIG_PATH.to_string(),
            source_config_file: PathBuf::from(DEFAULT_SOURCE_CONFIG_FILE),
            gzip_enabled: true,
            max_decoded_bytes: DEFAULT_MAX_DECODED_BYTES,
            field_priority: DEFAULT_FIELD_PRIORITY
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}
