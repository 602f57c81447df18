use std::sync::Arc;

use crate::config::Config;
use crate::services::{NotificationEmitter, NotificationStore};
use crate::websocket::RealtimeHub;

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<RealtimeHub>,
    pub store: Arc<dyn NotificationStore>,
    pub notifications: Arc<NotificationEmitter>,
    pub config: Arc<Config>,
}
