//! HTTP server for the batch sink.
//!
//! # Endpoints
//!
//! - `POST /v1/batch` - Accepts event batches and appends their tokens to the log
//! - `GET /sourceConfig` - Returns the static source configuration as JSON
//!
//! Both paths are configurable. Every other path, and every other method on
//! these paths, gets `404 Not Found`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::http::StatusCode;

pub mod ingest;
pub mod source_config;

pub use ingest::{IngestError, IngestStage, ingest_handler};
pub use source_config::{ConfigError, source_config_handler};

use crate::codec::{Codec, CodecConfig};
use crate::config::ServerConfig;
use crate::extract::{DEFAULT_BATCH_FIELD, EventExtractor};
use crate::persistence::{AppendLog, BatchSink};

/// Shared application state.
///
/// This is passed to all handlers via Axum's `State` extractor. It bundles
/// the independent pipeline pieces: the codec, the extractor and the sink.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    codec: Codec,
    extractor: EventExtractor,
    sink: Arc<dyn BatchSink>,
    ingest_path: String,
    config_path: String,
    source_config_file: PathBuf,
}

impl AppState {
    /// Creates a new `AppState` from its parts.
    ///
    /// # Arguments
    ///
    /// * `codec` - Decodes and parses request bodies
    /// * `extractor` - Pulls event tokens out of parsed batches
    /// * `sink` - Receives extracted tokens
    /// * `source_config_file` - JSON file served on the config route
    pub fn new(
        codec: Codec,
        extractor: EventExtractor,
        sink: Arc<dyn BatchSink>,
        source_config_file: impl Into<PathBuf>,
    ) -> Self {
        let defaults = ServerConfig::default();
        AppState {
            inner: Arc::new(AppStateInner {
                codec,
                extractor,
                sink,
                ingest_path: defaults.ingest_path,
                config_path: defaults.config_path,
                source_config_file: source_config_file.into(),
            }),
        }
    }

    /// Builds the state described by `config`, appending to `config.log_path`.
    pub fn from_config(config: &ServerConfig) -> Self {
        let codec = Codec::new(CodecConfig {
            gzip_enabled: config.gzip_enabled,
            max_decoded_bytes: config.max_decoded_bytes,
        });
        let extractor = EventExtractor::new(DEFAULT_BATCH_FIELD, config.field_priority.clone());
        let sink: Arc<dyn BatchSink> = Arc::new(AppendLog::new(&config.log_path));

        AppState {
            inner: Arc::new(AppStateInner {
                codec,
                extractor,
                sink,
                ingest_path: config.ingest_path.clone(),
                config_path: config.config_path.clone(),
                source_config_file: config.source_config_file.clone(),
            }),
        }
    }

    pub fn codec(&self) -> &Codec {
        &self.inner.codec
    }

    pub fn extractor(&self) -> &EventExtractor {
        &self.inner.extractor
    }

    /// Returns a handle to the sink, for moving into a blocking task.
    pub fn sink(&self) -> Arc<dyn BatchSink> {
        Arc::clone(&self.inner.sink)
    }

    pub fn ingest_path(&self) -> &str {
        &self.inner.ingest_path
    }

    pub fn config_path(&self) -> &str {
        &self.inner.config_path
    }

    pub fn source_config_file(&self) -> &Path {
        &self.inner.source_config_file
    }
}

/// Response for unknown routes and unsupported methods.
pub async fn not_found_handler() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not Found\n")
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::{get, post};
    use tower_http::trace::TraceLayer;

    let ingest_path = app_state.ingest_path().to_string();
    let config_path = app_state.config_path().to_string();

    axum::Router::new()
        .route(&ingest_path, post(ingest_handler))
        .route(&config_path, get(source_config_handler))
        .fallback(not_found_handler)
        .method_not_allowed_fallback(not_found_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
