//! Rusty Whisper - An ephemeral two-party encrypted chat relay
//!
//! This library pairs two anonymous WebSocket connections into a
//! self-destructing room and relays opaque encrypted payloads between them.
//! The relay never holds keys or plaintext.

pub mod client;
pub mod config;
pub mod constants;
pub mod core;
pub mod error;
pub mod handlers;

// Re-export main components
pub use config::*;
pub use constants::*;
pub use error::{Result, RustyWhisperError};
