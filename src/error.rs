use std::error::Error;
use std::fmt;
use std::sync::PoisonError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RustyWhisperError {
    // Session errors
    SessionLock(String),
    SessionNotFound(String),

    // Connection errors
    ConnectionError(String),

    // Message errors
    MessageParseError(String),
    InvalidPayload(String),
    OversizePayload { size: usize, limit: usize },

    // Room errors
    RoomFull,
    InvalidRoomId,
    NotInRoom,
    AlreadyInRoom,

    // Endpoint crypto errors
    KeyDerivation(String),
    DecryptionFailure,

    // Configuration errors
    ConfigError(String),
}

impl RustyWhisperError {
    /// Stable identifier sent to clients in `error` events
    pub fn code(&self) -> &'static str {
        match self {
            Self::SessionLock(_) => "session_lock",
            Self::SessionNotFound(_) => "session_not_found",
            Self::ConnectionError(_) => "connection_error",
            Self::MessageParseError(_) => "parse_error",
            Self::InvalidPayload(_) => "invalid_payload",
            Self::OversizePayload { .. } => "oversize_payload",
            Self::RoomFull => "room_full",
            Self::InvalidRoomId => "invalid_room_id",
            Self::NotInRoom => "not_in_room",
            Self::AlreadyInRoom => "already_in_room",
            Self::KeyDerivation(_) => "key_derivation",
            Self::DecryptionFailure => "decryption_failure",
            Self::ConfigError(_) => "config_error",
        }
    }
}

impl fmt::Display for RustyWhisperError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionLock(msg) => write!(f, "Session lock error: {}", msg),
            Self::SessionNotFound(id) => write!(f, "Session not found: {}", id),
            Self::ConnectionError(msg) => write!(f, "Connection error: {}", msg),
            Self::MessageParseError(msg) => write!(f, "Message parse error: {}", msg),
            Self::InvalidPayload(msg) => write!(f, "Invalid payload: {}", msg),
            Self::OversizePayload { size, limit } => {
                write!(f, "Payload too large: {} bytes (limit {})", size, limit)
            }
            Self::RoomFull => write!(f, "Room is full"),
            Self::InvalidRoomId => write!(f, "Invalid room ID"),
            Self::NotInRoom => write!(f, "Connection is not a member of that room"),
            Self::AlreadyInRoom => write!(f, "Connection already occupies another room"),
            Self::KeyDerivation(msg) => write!(f, "Key derivation failed: {}", msg),
            Self::DecryptionFailure => write!(f, "Decryption failed"),
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl Error for RustyWhisperError {}

// Converting from PoisonError to facilitate poisoned mutex handling
impl<T> From<PoisonError<T>> for RustyWhisperError {
    fn from(err: PoisonError<T>) -> Self {
        RustyWhisperError::SessionLock(format!("Mutex poisoned: {}", err))
    }
}

// Generic result type for RustyWhisper
pub type Result<T> = std::result::Result<T, RustyWhisperError>;
