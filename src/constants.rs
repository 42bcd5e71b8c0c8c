// Fundamental configuration constants
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3001;
pub const WS_PATH: &str = "ws";

// Room lifecycle constants
pub const MAX_PARTICIPANTS: usize = 2;
pub const DEFAULT_INACTIVITY_LIMIT_SECS: u64 = 10 * 60;
pub const DEFAULT_GRACE_PERIOD_MS: u64 = 5_000;
pub const DEFAULT_MAX_ROOM_ID_LEN: usize = 128;

// Payload ceilings, in decoded bytes
pub const DEFAULT_MAX_ENCRYPTED_BYTES: usize = 3 * 1024 * 1024;
pub const DEFAULT_MAX_LEGACY_IMAGE_BYTES: usize = 2 * 1024 * 1024;

// JSON number arrays cost up to four characters per byte ("255,")
pub const ENCODING_OVERHEAD_FACTOR: usize = 4;
pub const FRAME_HEADROOM_BYTES: usize = 64 * 1024;
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

// Endpoint behaviour
pub const IDLE_AFTER_MS: u64 = 15_000;
pub const KEY_RESEND_AFTER_MS: u64 = 1_500;

// User-facing notices
pub const INACTIVITY_DESTROY_NOTICE: &str = "Room destroyed due to user inactivity.";
pub const PEER_LEFT_DESTROY_NOTICE: &str = "A user left the room. Room has been destroyed.";
pub const LEGACY_IMAGE_PREFIX: &str = "data:image/";
