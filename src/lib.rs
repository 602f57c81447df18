pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod models;
pub mod services;
pub mod state;
pub mod websocket;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use services::{NotificationEmitter, NotificationStore, PgNotificationStore};
pub use state::AppState;
pub use websocket::{ClientFrame, ConnectionHandle, RealtimeHub, ServerEnvelope};
