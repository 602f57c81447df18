/// Persistence collaborator for notifications, templates, and preferences.
///
/// The hub treats durable storage as an external concern behind this trait;
/// the emitter only cares that an insert either succeeds or propagates.
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{
    NewNotification, Notification, NotificationPreferences, NotificationPriority,
    NotificationTemplate, NotificationType,
};

#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Persist a notification. Failure here is fatal to the emit call.
    async fn insert_notification(&self, new: &NewNotification) -> AppResult<Notification>;

    /// Per-user preferences, created with defaults on first access
    async fn preferences(&self, user_id: Uuid) -> AppResult<NotificationPreferences>;

    async fn template(&self, name: &str) -> AppResult<Option<NotificationTemplate>>;

    /// Returns whether an unread notification was marked
    async fn mark_read(&self, notification_id: Uuid, user_id: Uuid) -> AppResult<bool>;

    /// Insert a template unless one with the same name exists
    async fn seed_template(&self, template: &NotificationTemplate) -> AppResult<()>;
}

pub struct PgNotificationStore {
    db: PgPool,
}

impl PgNotificationStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    fn parse_notification_type(s: &str) -> NotificationType {
        match s {
            "ticket_created" => NotificationType::TicketCreated,
            "ticket_updated" => NotificationType::TicketUpdated,
            "ticket_assigned" => NotificationType::TicketAssigned,
            "ticket_resolved" => NotificationType::TicketResolved,
            "comment_added" => NotificationType::CommentAdded,
            "message_received" => NotificationType::MessageReceived,
            "user_mentioned" => NotificationType::UserMentioned,
            "file_uploaded" => NotificationType::FileUploaded,
            _ => NotificationType::SystemAnnouncement,
        }
    }

    fn parse_priority(s: &str) -> NotificationPriority {
        match s {
            "low" => NotificationPriority::Low,
            "high" => NotificationPriority::High,
            "urgent" => NotificationPriority::Urgent,
            _ => NotificationPriority::Medium,
        }
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn insert_notification(&self, new: &NewNotification) -> AppResult<Notification> {
        let id = Uuid::new_v4();
        let created_at = Utc::now();

        let query = r#"
            INSERT INTO notifications (
                id, user_id, notification_type, title, message, priority,
                ticket_id, room_id, triggered_by, action_url, is_read, created_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, false, $11
            )
        "#;

        sqlx::query(query)
            .bind(id)
            .bind(new.user_id)
            .bind(new.notification_type.as_str())
            .bind(&new.title)
            .bind(&new.message)
            .bind(new.priority.as_str())
            .bind(new.ticket_id)
            .bind(new.room_id)
            .bind(new.triggered_by)
            .bind(&new.action_url)
            .bind(created_at)
            .execute(&self.db)
            .await?;

        Ok(Notification {
            id,
            user_id: new.user_id,
            notification_type: new.notification_type,
            title: new.title.clone(),
            message: new.message.clone(),
            priority: new.priority,
            ticket_id: new.ticket_id,
            room_id: new.room_id,
            triggered_by: new.triggered_by,
            action_url: new.action_url.clone(),
            is_read: false,
            read_at: None,
            created_at,
        })
    }

    async fn preferences(&self, user_id: Uuid) -> AppResult<NotificationPreferences> {
        let query = r#"
            SELECT user_id, enabled, ticket_updates, new_messages, mentions,
                   assignments, system_announcements, push_notifications
            FROM notification_preferences
            WHERE user_id = $1
        "#;

        match sqlx::query(query)
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?
        {
            Some(row) => Ok(NotificationPreferences {
                user_id: row.get("user_id"),
                enabled: row.get("enabled"),
                ticket_updates: row.get("ticket_updates"),
                new_messages: row.get("new_messages"),
                mentions: row.get("mentions"),
                assignments: row.get("assignments"),
                system_announcements: row.get("system_announcements"),
                push_notifications: row.get("push_notifications"),
            }),
            None => {
                let defaults = NotificationPreferences::default_for(user_id);

                let insert = r#"
                    INSERT INTO notification_preferences (
                        user_id, enabled, ticket_updates, new_messages, mentions,
                        assignments, system_announcements, push_notifications
                    ) VALUES ($1, true, true, true, true, true, true, true)
                    ON CONFLICT (user_id) DO NOTHING
                "#;

                sqlx::query(insert).bind(user_id).execute(&self.db).await?;
                Ok(defaults)
            }
        }
    }

    async fn template(&self, name: &str) -> AppResult<Option<NotificationTemplate>> {
        let query = r#"
            SELECT name, notification_type, title_template, message_template,
                   priority, send_push
            FROM notification_templates
            WHERE name = $1
        "#;

        let row = sqlx::query(query)
            .bind(name)
            .fetch_optional(&self.db)
            .await?;

        Ok(row.map(|row| {
            let type_str: String = row.get("notification_type");
            let priority_str: String = row.get("priority");
            NotificationTemplate {
                name: row.get("name"),
                notification_type: Self::parse_notification_type(&type_str),
                title_template: row.get("title_template"),
                message_template: row.get("message_template"),
                priority: Self::parse_priority(&priority_str),
                send_push: row.get("send_push"),
            }
        }))
    }

    async fn mark_read(&self, notification_id: Uuid, user_id: Uuid) -> AppResult<bool> {
        let query = r#"
            UPDATE notifications
            SET is_read = true, read_at = $1
            WHERE id = $2 AND user_id = $3 AND is_read = false
        "#;

        let result = sqlx::query(query)
            .bind(Utc::now())
            .bind(notification_id)
            .bind(user_id)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn seed_template(&self, template: &NotificationTemplate) -> AppResult<()> {
        let query = r#"
            INSERT INTO notification_templates (
                name, notification_type, title_template, message_template,
                priority, send_push
            ) VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (name) DO NOTHING
        "#;

        sqlx::query(query)
            .bind(&template.name)
            .bind(template.notification_type.as_str())
            .bind(&template.title_template)
            .bind(&template.message_template)
            .bind(template.priority.as_str())
            .bind(template.send_push)
            .execute(&self.db)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_notification_type() {
        assert_eq!(
            PgNotificationStore::parse_notification_type("ticket_created"),
            NotificationType::TicketCreated
        );
        assert_eq!(
            PgNotificationStore::parse_notification_type("message_received"),
            NotificationType::MessageReceived
        );
        assert_eq!(
            PgNotificationStore::parse_notification_type("unknown"),
            NotificationType::SystemAnnouncement
        );
    }

    #[test]
    fn test_parse_priority() {
        assert_eq!(
            PgNotificationStore::parse_priority("low"),
            NotificationPriority::Low
        );
        assert_eq!(
            PgNotificationStore::parse_priority("urgent"),
            NotificationPriority::Urgent
        );
        assert_eq!(
            PgNotificationStore::parse_priority("unknown"),
            NotificationPriority::Medium
        );
    }
}
