//! HTTP(S) load-testing engine with per-phase latency measurement.
//!
//! A fixed pool of workers fires raw HTTP/1.0 requests at one target URL,
//! timing each phase of every request (DNS once per worker, then prepare,
//! connect, TLS handshake, request write and response read) and feeding the
//! results into an aggregate report.

pub mod config;
pub mod engine;
pub mod errors;
pub mod executor;
pub mod report;
pub mod request;
pub mod response;
pub mod stats;
pub mod timing;
pub mod transport;
pub mod url;
