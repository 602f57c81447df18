/// Real-time hub: connection registry, room membership, delivery routing,
/// and the per-connection protocol session.
pub mod hub;
pub mod messages;
pub mod registry;
pub mod rooms;
pub mod session;

pub use hub::RealtimeHub;
pub use messages::{ClientFrame, PresenceStatus, ServerEnvelope};
pub use registry::{ConnectionHandle, ConnectionRegistry, PresenceChange, CONNECTION_BUFFER};
pub use rooms::RoomRegistry;
pub use session::WsSession;
