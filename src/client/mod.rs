//! Endpoint-side protocol logic, independent of any socket or UI

pub mod activity;
pub mod crypto;
pub mod peer;

pub use activity::{countdown_remaining, format_remaining, ActivityMonitor};
pub use crypto::{KeyAgreement, KeyPair, Sealed};
pub use peer::{PeerOutput, PeerSession, SessionEnd};
