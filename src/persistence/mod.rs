//! Persistence layer for ingested events.
//!
//! The only durable state is a single append-only text file holding one
//! event token per line. It must be provisioned out-of-band; the writer
//! refuses to create it.
//!
//! # File Layout
//!
//! ```text
//! output_files/
//!   batch_content.txt   # one token per line, blocks appended per request
//! ```
//!
//! # Concurrency
//!
//! Appends from concurrent requests are serialized by an in-process lock so
//! that two blocks never interleave. Their relative order is unspecified.
//! Readers (the track checker) take no lock and read a length-bounded
//! snapshot.

pub mod log;

pub use log::{AppendLog, AppendLogError, AppendReceipt, BatchSink};
