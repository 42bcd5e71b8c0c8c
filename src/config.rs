//! Server configuration module
//! Handles dynamic configuration parameters for the relay server

use crate::constants::{
    DEFAULT_GRACE_PERIOD_MS, DEFAULT_HOST, DEFAULT_INACTIVITY_LIMIT_SECS,
    DEFAULT_MAX_ENCRYPTED_BYTES, DEFAULT_MAX_FRAME_BYTES, DEFAULT_MAX_LEGACY_IMAGE_BYTES,
    DEFAULT_MAX_ROOM_ID_LEN, DEFAULT_PORT, ENCODING_OVERHEAD_FACTOR, FRAME_HEADROOM_BYTES,
};
use crate::error::{Result, RustyWhisperError};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Server configuration parameters
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Time a room may stay idle after a participant signals inactivity
    pub inactivity_limit: Duration,
    /// Delay between a transport disconnect and the room bookkeeping
    pub grace_period: Duration,
    /// Ceiling for encrypted messages and encrypted images
    pub max_encrypted_payload_bytes: usize,
    /// Ceiling for legacy plaintext image data URLs
    pub max_legacy_image_bytes: usize,
    /// Largest WebSocket frame/message the transport accepts
    pub max_frame_bytes: usize,
    pub max_room_id_len: usize,
    pub enable_tls: bool,
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            inactivity_limit: Duration::from_secs(DEFAULT_INACTIVITY_LIMIT_SECS),
            grace_period: Duration::from_millis(DEFAULT_GRACE_PERIOD_MS),
            max_encrypted_payload_bytes: DEFAULT_MAX_ENCRYPTED_BYTES,
            max_legacy_image_bytes: DEFAULT_MAX_LEGACY_IMAGE_BYTES,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            max_room_id_len: DEFAULT_MAX_ROOM_ID_LEN,
            enable_tls: false,
            tls_cert_path: None,
            tls_key_path: None,
        }
    }
}

fn env_parsed<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

fn env_flag(name: &str) -> bool {
    env::var(name)
        .map(|v| v.to_lowercase() == "true" || v == "1")
        .unwrap_or(false)
}

impl ServerConfig {
    /// Load configuration from environment variables if available
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let host = env::var("RUSTY_WHISPER_HOST").unwrap_or(defaults.host);
        let port = env_parsed("RUSTY_WHISPER_PORT", defaults.port);

        let inactivity_secs = env_parsed(
            "RUSTY_WHISPER_INACTIVITY_LIMIT_SECS",
            DEFAULT_INACTIVITY_LIMIT_SECS,
        );
        let grace_ms = env_parsed("RUSTY_WHISPER_GRACE_PERIOD_MS", DEFAULT_GRACE_PERIOD_MS);

        let config = Self {
            host,
            port,
            inactivity_limit: Duration::from_secs(inactivity_secs),
            grace_period: Duration::from_millis(grace_ms),
            max_encrypted_payload_bytes: env_parsed(
                "RUSTY_WHISPER_MAX_ENCRYPTED_BYTES",
                defaults.max_encrypted_payload_bytes,
            ),
            max_legacy_image_bytes: env_parsed(
                "RUSTY_WHISPER_MAX_LEGACY_IMAGE_BYTES",
                defaults.max_legacy_image_bytes,
            ),
            max_frame_bytes: env_parsed("RUSTY_WHISPER_MAX_FRAME_BYTES", defaults.max_frame_bytes),
            max_room_id_len: env_parsed("RUSTY_WHISPER_MAX_ROOM_ID_LEN", defaults.max_room_id_len),
            enable_tls: env_flag("RUSTY_WHISPER_ENABLE_TLS"),
            tls_cert_path: env::var("RUSTY_WHISPER_TLS_CERT_PATH").ok(),
            tls_key_path: env::var("RUSTY_WHISPER_TLS_KEY_PATH").ok(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.inactivity_limit.is_zero() {
            return Err(RustyWhisperError::ConfigError(
                "Inactivity limit must be greater than zero".to_string(),
            ));
        }

        if self.grace_period.is_zero() {
            return Err(RustyWhisperError::ConfigError(
                "Grace period must be greater than zero".to_string(),
            ));
        }

        if self.max_room_id_len == 0 {
            return Err(RustyWhisperError::ConfigError(
                "Maximum room ID length must be greater than zero".to_string(),
            ));
        }

        if self.max_legacy_image_bytes >= self.max_encrypted_payload_bytes {
            return Err(RustyWhisperError::ConfigError(format!(
                "Legacy image ceiling ({}) must be lower than the encrypted payload ceiling ({})",
                self.max_legacy_image_bytes, self.max_encrypted_payload_bytes
            )));
        }

        let required_frame = self
            .max_encrypted_payload_bytes
            .saturating_mul(ENCODING_OVERHEAD_FACTOR)
            .saturating_add(FRAME_HEADROOM_BYTES);
        if self.max_frame_bytes < required_frame {
            return Err(RustyWhisperError::ConfigError(format!(
                "Frame limit ({}) must be at least {} bytes to carry the encoded payload ceiling",
                self.max_frame_bytes, required_frame
            )));
        }

        if self.enable_tls {
            let (cert_path, key_path) = match (&self.tls_cert_path, &self.tls_key_path) {
                (Some(cert), Some(key)) => (cert, key),
                _ => {
                    return Err(RustyWhisperError::ConfigError(
                        "TLS is enabled but RUSTY_WHISPER_TLS_CERT_PATH or RUSTY_WHISPER_TLS_KEY_PATH is not set"
                            .to_string(),
                    ))
                }
            };

            if !std::path::Path::new(cert_path).exists() {
                return Err(RustyWhisperError::ConfigError(format!(
                    "TLS certificate file does not exist: {}",
                    cert_path
                )));
            }
            if !std::path::Path::new(key_path).exists() {
                return Err(RustyWhisperError::ConfigError(format!(
                    "TLS private key file does not exist: {}",
                    key_path
                )));
            }
        }

        Ok(())
    }
}
