use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Notification type enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    /// A new ticket was opened
    TicketCreated,
    /// A ticket's status or fields changed
    TicketUpdated,
    /// A ticket was assigned to an agent
    TicketAssigned,
    /// A ticket was resolved
    TicketResolved,
    /// A comment was added to a ticket
    CommentAdded,
    /// A chat message arrived
    MessageReceived,
    /// The user was mentioned
    UserMentioned,
    /// A file was attached to a ticket
    FileUploaded,
    /// Platform-wide announcement
    SystemAnnouncement,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::TicketCreated => "ticket_created",
            NotificationType::TicketUpdated => "ticket_updated",
            NotificationType::TicketAssigned => "ticket_assigned",
            NotificationType::TicketResolved => "ticket_resolved",
            NotificationType::CommentAdded => "comment_added",
            NotificationType::MessageReceived => "message_received",
            NotificationType::UserMentioned => "user_mentioned",
            NotificationType::FileUploaded => "file_uploaded",
            NotificationType::SystemAnnouncement => "system_announcement",
        }
    }
}

/// Notification priority level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl NotificationPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationPriority::Low => "low",
            NotificationPriority::Medium => "medium",
            NotificationPriority::High => "high",
            NotificationPriority::Urgent => "urgent",
        }
    }
}

/// Durable notification record. Read/dismiss state lives with the record;
/// real-time delivery success is tracked nowhere (delivery is best-effort).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,

    /// Recipient user ID
    pub user_id: Uuid,

    pub notification_type: NotificationType,

    pub title: String,

    pub message: String,

    pub priority: NotificationPriority,

    /// Associated ticket, if any
    pub ticket_id: Option<Uuid>,

    /// Associated chat room, if any
    pub room_id: Option<Uuid>,

    /// User whose action caused this notification
    pub triggered_by: Option<Uuid>,

    /// Frontend navigation target
    pub action_url: Option<String>,

    pub is_read: bool,

    pub read_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

/// Request to create a notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    #[serde(default = "default_priority")]
    pub priority: NotificationPriority,
    pub ticket_id: Option<Uuid>,
    pub room_id: Option<Uuid>,
    pub triggered_by: Option<Uuid>,
    pub action_url: Option<String>,
}

fn default_priority() -> NotificationPriority {
    NotificationPriority::Medium
}

/// Named template with `{placeholder}` substitution in title and message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationTemplate {
    pub name: String,
    pub notification_type: NotificationType,
    pub title_template: String,
    pub message_template: String,
    pub priority: NotificationPriority,
    /// Whether a real-time push accompanies the durable record
    pub send_push: bool,
}

/// Per-user notification preferences
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPreferences {
    pub user_id: Uuid,

    /// Master switch
    pub enabled: bool,

    /// Per-category preferences
    pub ticket_updates: bool,
    pub new_messages: bool,
    pub mentions: bool,
    pub assignments: bool,
    pub system_announcements: bool,

    /// Real-time push delivery
    pub push_notifications: bool,
}

impl NotificationPreferences {
    pub fn default_for(user_id: Uuid) -> Self {
        Self {
            user_id,
            enabled: true,
            ticket_updates: true,
            new_messages: true,
            mentions: true,
            assignments: true,
            system_announcements: true,
            push_notifications: true,
        }
    }

    /// Whether this notification type is enabled. Types without a dedicated
    /// category flag are always allowed.
    pub fn allows(&self, notification_type: NotificationType) -> bool {
        if !self.enabled {
            return false;
        }

        match notification_type {
            NotificationType::TicketCreated
            | NotificationType::TicketUpdated
            | NotificationType::TicketResolved
            | NotificationType::CommentAdded => self.ticket_updates,
            NotificationType::TicketAssigned => self.assignments,
            NotificationType::MessageReceived => self.new_messages,
            NotificationType::UserMentioned => self.mentions,
            NotificationType::SystemAnnouncement => self.system_announcements,
            NotificationType::FileUploaded => true,
        }
    }
}
