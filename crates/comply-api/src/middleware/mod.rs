//! # Middleware
//!
//! Request metrics and per-caller rate limiting. Tracing is provided by
//! `tower_http::trace::TraceLayer` in [`crate::app`].

pub mod metrics;
pub mod rate_limit;
