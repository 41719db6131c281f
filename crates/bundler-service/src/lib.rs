//! Service wrapper for the fair-ordering bundler.
//!
//! Registers the shipped backends with the engine builder and exposes the
//! caller-facing operations over HTTP. The binary in `main.rs` adds the CLI
//! and tracing setup.

pub mod api;
pub mod backends;
