//! Static source configuration endpoint.
//!
//! SDK clients fetch their source configuration from this route on startup.
//! The response is the content of a JSON file on disk.

use std::io;
use std::path::{Path, PathBuf};

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use super::AppState;

/// Errors that can occur when serving the source configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("configuration file not found: {}", .0.display())]
    Missing(PathBuf),

    /// IO error reading the file.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The file is not valid JSON.
    #[error("malformed configuration file: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl IntoResponse for ConfigError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ConfigError::Missing(_) => (StatusCode::NOT_FOUND, "Configuration file not found.\n"),
            ConfigError::Io(_) | ConfigError::Malformed(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Server error\n")
            }
        };

        (status, message).into_response()
    }
}

/// Source configuration handler.
///
/// # Response
///
/// - 200 OK with the configuration file's JSON
/// - 404 Not Found if the file does not exist
/// - 500 Internal Server Error if it cannot be read or is not JSON
pub async fn source_config_handler(
    State(app_state): State<AppState>,
) -> Result<Json<Value>, ConfigError> {
    let path = app_state.source_config_file();
    match load_source_config(path).await {
        Ok(config) => Ok(Json(config)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to serve source configuration");
            Err(e)
        }
    }
}

/// Reads and parses the configuration file.
pub async fn load_source_config(path: &Path) -> Result<Value, ConfigError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ConfigError::Missing(path.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };
    Ok(serde_json::from_slice(&bytes)?)
}
