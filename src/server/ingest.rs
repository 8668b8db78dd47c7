//! Batch ingestion endpoint.
//!
//! Accepts a JSON event batch, optionally gzip-compressed, extracts one token
//! per event and appends the tokens to the log as a single block before
//! returning 200.
//!
//! Each request moves through [`IngestStage`]s in order. The first failing
//! stage ends the request with that stage's status; nothing is appended
//! unless every earlier stage succeeded.

use std::fmt;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::CONTENT_ENCODING;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::AppState;
use crate::codec::{CodecError, ContentEncoding};
use crate::extract::ExtractedBatch;
use crate::persistence::{AppendLogError, AppendReceipt, BatchSink};

/// Acknowledgement sent for every accepted batch.
pub const ACK_MESSAGE: &str = "Received data successfully\n";

/// Progress of a single ingestion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    Received,
    Decoding,
    Parsing,
    Extracting,
    Appending,
    Responded,
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IngestStage::Received => "received",
            IngestStage::Decoding => "decoding",
            IngestStage::Parsing => "parsing",
            IngestStage::Extracting => "extracting",
            IngestStage::Appending => "appending",
            IngestStage::Responded => "responded",
        };
        f.write_str(name)
    }
}

/// Errors that can end an ingestion request.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The body could not be decoded or parsed.
    #[error("{0}")]
    Codec(#[from] CodecError),

    /// The log append failed.
    #[error("log append failed: {0}")]
    Storage(#[from] AppendLogError),

    /// The blocking append task panicked or was cancelled.
    #[error("append task failed: {0}")]
    AppendTask(String),
}

impl IngestError {
    /// The stage in which the request failed.
    pub fn stage(&self) -> IngestStage {
        match self {
            IngestError::Codec(e) if e.is_decode() => IngestStage::Decoding,
            IngestError::Codec(_) => IngestStage::Parsing,
            IngestError::Storage(_) | IngestError::AppendTask(_) => IngestStage::Appending,
        }
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        // Internal detail stays in the server log.
        let (status, message) = match self.stage() {
            IngestStage::Decoding => (StatusCode::BAD_REQUEST, "Error decoding request body\n"),
            IngestStage::Parsing => (StatusCode::BAD_REQUEST, "Error decoding JSON\n"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "Server error\n"),
        };

        (status, message).into_response()
    }
}

/// Batch ingestion handler.
///
/// # Request
///
/// - Method: POST
/// - Optional header `Content-Encoding: gzip`
/// - Body: `{"batch": [{"event": "..."}, {"type": "..."}, ...]}`
///
/// # Response
///
/// - 200 OK: tokens appended (or the batch had none)
/// - 400 Bad Request: body could not be decompressed or parsed
/// - 500 Internal Server Error: log missing or append failed
///
/// # Example
///
/// ```ignore
/// POST /v1/batch HTTP/1.1
/// Content-Type: application/json
///
/// {"batch": [{"event": "Product Added"}, {"type": "identify"}]}
///
/// HTTP/1.1 200 OK
/// Content-Type: text/plain
///
/// Received data successfully
/// ```
pub async fn ingest_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, &'static str), IngestError> {
    match ingest(&app_state, &headers, &body).await {
        Ok(events) => {
            info!(
                stage = %IngestStage::Responded,
                events,
                "Batch ingested"
            );
            Ok((StatusCode::OK, ACK_MESSAGE))
        }
        Err(e) => {
            warn!(stage = %e.stage(), error = %e, "Batch rejected");
            Err(e)
        }
    }
}

/// Runs every stage and returns the number of tokens appended.
async fn ingest(app_state: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<usize, IngestError> {
    let encoding = ContentEncoding::from_header(
        headers
            .get(CONTENT_ENCODING)
            .and_then(|value| value.to_str().ok()),
    );

    debug!(
        stage = %IngestStage::Received,
        bytes = body.len(),
        encoding = ?encoding,
        "Received batch"
    );

    let extracted = decode_and_extract(app_state, body, &encoding)?;
    debug!(
        stage = %IngestStage::Extracting,
        events = extracted.events,
        skipped = extracted.skipped,
        "Extracted batch"
    );
    if extracted.is_empty() {
        return Ok(0);
    }

    let events = extracted.events;
    let receipt = append_blocking(app_state.sink(), extracted.content).await?;

    debug!(
        stage = %IngestStage::Appending,
        offset = receipt.offset,
        bytes = receipt.bytes,
        "Appended batch"
    );

    Ok(events)
}

/// Runs the CPU-bound stages: decode, parse and extract.
fn decode_and_extract(
    app_state: &AppState,
    body: &[u8],
    encoding: &ContentEncoding,
) -> Result<ExtractedBatch, IngestError> {
    let document = app_state.codec().decode_and_parse(body, encoding)?;
    Ok(app_state.extractor().extract(&document))
}

/// Appends on the blocking pool so file I/O and lock waits stay off the
/// async workers.
async fn append_blocking(
    sink: Arc<dyn BatchSink>,
    content: String,
) -> Result<AppendReceipt, IngestError> {
    let receipt = tokio::task::spawn_blocking(move || sink.append(&content))
        .await
        .map_err(|e| IngestError::AppendTask(e.to_string()))??;
    Ok(receipt)
}
