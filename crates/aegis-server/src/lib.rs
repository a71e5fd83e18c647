//! # aegis-server
//!
//! HTTP surface for the aegis privacy filter. The server owns nothing of
//! the core semantics: every endpoint delegates to `aegis-core` through
//! the async facade, and the only state is the shared engine.
//!
//! Endpoints:
//! - `POST /sanitize`: redact; 500 on any gate event, never the
//!   original text
//! - `POST /desanitize`: reveal for authorized callers; tokens are
//!   silently kept on miss
//! - `GET /health`: 503 until the engine is operational

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod routes;

pub use config::{ConfigError, ServerConfig};
pub use error::ApiError;
pub use routes::{router, ApiState};
