/// Wire messages exchanged over a hub connection.
///
/// One JSON object per frame, discriminated by a closed `type` tag.
/// Timestamps are RFC 3339.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::models::{Notification, NotificationPriority, NotificationType};

/// User presence state carried by `user_status` frames
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}

/// Outbound frames from server to client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEnvelope {
    /// Sent once on a freshly admitted connection
    Welcome {
        message: String,
        user_id: Uuid,
        online_users: Vec<Uuid>,
        timestamp: DateTime<Utc>,
    },

    /// Chat message fan-out within a room
    ChatMessage {
        room_id: Uuid,
        data: Value,
        timestamp: DateTime<Utc>,
    },

    /// Ticket lifecycle update for the recipients named by the business layer
    TicketUpdate {
        ticket_id: Uuid,
        data: Value,
        timestamp: DateTime<Utc>,
    },

    /// Real-time push of a persisted notification
    Notification {
        id: Uuid,
        notification_type: NotificationType,
        title: String,
        message: String,
        priority: NotificationPriority,
        #[serde(skip_serializing_if = "Option::is_none")]
        action_url: Option<String>,
        created_at: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },

    /// Typing indicator within a room
    Typing {
        room_id: Uuid,
        user_id: Uuid,
        is_typing: bool,
        timestamp: DateTime<Utc>,
    },

    /// A user came online or went offline
    UserStatus {
        user_id: Uuid,
        status: PresenceStatus,
        timestamp: DateTime<Utc>,
    },

    /// A user joined a room
    UserJoined {
        room_id: Uuid,
        user_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// A user left a room
    UserLeft {
        room_id: Uuid,
        user_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Administrative broadcast to every connected user
    Broadcast {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        from: Option<String>,
        priority: NotificationPriority,
        timestamp: DateTime<Utc>,
    },

    /// Per-sender error reply; the connection stays open
    Error {
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Reply to a client `ping`
    Pong { timestamp: DateTime<Utc> },
}

impl ServerEnvelope {
    pub fn welcome(user_id: Uuid, online_users: Vec<Uuid>) -> Self {
        ServerEnvelope::Welcome {
            message: "You are now connected.".to_string(),
            user_id,
            online_users,
            timestamp: Utc::now(),
        }
    }

    pub fn chat_message(room_id: Uuid, data: Value) -> Self {
        ServerEnvelope::ChatMessage {
            room_id,
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn ticket_update(ticket_id: Uuid, data: Value) -> Self {
        ServerEnvelope::TicketUpdate {
            ticket_id,
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn notification(notification: &Notification) -> Self {
        ServerEnvelope::Notification {
            id: notification.id,
            notification_type: notification.notification_type,
            title: notification.title.clone(),
            message: notification.message.clone(),
            priority: notification.priority,
            action_url: notification.action_url.clone(),
            created_at: notification.created_at,
            timestamp: Utc::now(),
        }
    }

    pub fn typing(room_id: Uuid, user_id: Uuid, is_typing: bool) -> Self {
        ServerEnvelope::Typing {
            room_id,
            user_id,
            is_typing,
            timestamp: Utc::now(),
        }
    }

    pub fn user_status(user_id: Uuid, status: PresenceStatus) -> Self {
        ServerEnvelope::UserStatus {
            user_id,
            status,
            timestamp: Utc::now(),
        }
    }

    pub fn user_joined(room_id: Uuid, user_id: Uuid) -> Self {
        ServerEnvelope::UserJoined {
            room_id,
            user_id,
            timestamp: Utc::now(),
        }
    }

    pub fn user_left(room_id: Uuid, user_id: Uuid) -> Self {
        ServerEnvelope::UserLeft {
            room_id,
            user_id,
            timestamp: Utc::now(),
        }
    }

    pub fn broadcast_message(
        message: String,
        from: Option<String>,
        priority: NotificationPriority,
    ) -> Self {
        ServerEnvelope::Broadcast {
            message,
            from,
            priority,
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: String) -> Self {
        ServerEnvelope::Error {
            message,
            timestamp: Utc::now(),
        }
    }

    pub fn pong() -> Self {
        ServerEnvelope::Pong {
            timestamp: Utc::now(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Inbound frames from client to server.
///
/// Decoded exactly once at the protocol boundary. An unrecognized `type`
/// lands on `Unknown` (logged and ignored by the session); a frame that does
/// not decode at all gets an `error` reply instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Keepalive; answered with `pong`
    Ping,

    Typing {
        room_id: Uuid,
        #[serde(default)]
        is_typing: bool,
    },

    JoinRoom {
        room_id: Uuid,
    },

    LeaveRoom {
        room_id: Uuid,
    },

    /// Forwarded to the notification store
    MarkNotificationRead {
        notification_id: Uuid,
    },

    #[serde(other)]
    Unknown,
}
