//! Core functionality for the relay server

pub mod broadcaster;
pub mod connection;
pub mod gateway;
pub mod grace;
pub mod inactivity;
pub mod key_exchange;
pub mod message_types;
pub mod room;
pub mod session;
pub mod timer;

// Re-export main components for convenience
pub use broadcaster::{encode_event, DestroyReason, PayloadLimits, RelayBroadcaster};
pub use connection::{Connection, ConnectionState};
pub use gateway::{SessionGateway, SharedGateway};
pub use grace::{GracePeriodScheduler, PendingDisconnect};
pub use inactivity::{InactivityCountdown, InactivityTimer};
pub use key_exchange::{KeyExchangeCoordinator, KeyExchangeRole, KeyExchangeState, KeyRelay};
pub use message_types::{ClientEvent, ServerEvent};
pub use room::{Departure, Room, RoomRegistry, RoomTable};
pub use session::{create_session_manager, lock_sessions, SessionManager, Sessions};
pub use timer::TimerHandle;
