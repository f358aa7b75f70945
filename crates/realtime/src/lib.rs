//! Thread-scoped fan-out of chat and workflow events to connected sessions.

pub mod broadcaster;
pub mod events;
pub mod heartbeat;
pub mod hub;

pub use broadcaster::{BroadcastError, ThreadBroadcaster};
pub use events::{Outbound, ParticipantChangeKind, ThreadEvent};
pub use heartbeat::start_heartbeat;
pub use hub::{RealtimeHub, SessionReceiver, SessionSender};
