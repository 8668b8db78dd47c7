//! Batch Sink - an HTTP endpoint that appends analytics event names to a log.
//!
//! Clients POST JSON batches (optionally gzip-compressed); each event's name
//! is appended to a shared text log, one per line. The [`checker`] module
//! audits that log offline for `Track: N` markers that are out of order,
//! missing or duplicated.

pub mod checker;
pub mod codec;
pub mod config;
pub mod extract;
pub mod persistence;
pub mod server;
