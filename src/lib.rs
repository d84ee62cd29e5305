//! HTTP gateway in front of a local LM Studio runtime
//!
//! Accepts chat requests (text and inline images), forwards them to the
//! runtime's OpenAI-compatible endpoint and returns either one JSON answer or
//! an NDJSON stream of fragments. Model loading and unloading go through the
//! runtime's native REST API.

pub mod ai;
pub mod app;
pub mod chat;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod models;
pub mod normalize;
pub mod params;
pub mod resolver;
pub mod routes;
pub mod state;

pub use error::{Error, Result};
