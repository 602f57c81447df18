/// Notification emission: turns domain events plus per-user preferences into
/// durable notification records, then requests best-effort real-time push.
///
/// The durable record is authoritative: a store failure propagates, a push
/// failure never does. Preference opt-outs and incomplete template contexts
/// are deliberate void outcomes, not errors.
use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    NewNotification, Notification, NotificationPriority, NotificationTemplate, NotificationType,
};
use crate::websocket::{RealtimeHub, ServerEnvelope};

use super::store::NotificationStore;

/// Context references attached to a templated notification
#[derive(Debug, Clone, Default)]
pub struct NotificationRefs {
    pub ticket_id: Option<Uuid>,
    pub room_id: Option<Uuid>,
    pub triggered_by: Option<Uuid>,
    pub action_url: Option<String>,
}

/// One recipient of a templated batch, with their own substitution context
#[derive(Debug, Clone)]
pub struct TemplateRecipient {
    pub user_id: Uuid,
    pub context: HashMap<String, String>,
    pub refs: NotificationRefs,
}

/// Aggregate result of a batch emission
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub created: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct NotificationEmitter {
    store: Arc<dyn NotificationStore>,
    hub: Arc<RealtimeHub>,
}

impl NotificationEmitter {
    pub fn new(store: Arc<dyn NotificationStore>, hub: Arc<RealtimeHub>) -> Self {
        Self { store, hub }
    }

    /// Create and persist a notification, then push it to the recipient's
    /// live connections. `Ok(None)` means the recipient opted out of this
    /// type.
    pub async fn emit(&self, new: NewNotification) -> AppResult<Option<Notification>> {
        self.emit_inner(new, true).await
    }

    async fn emit_inner(
        &self,
        new: NewNotification,
        push: bool,
    ) -> AppResult<Option<Notification>> {
        let preferences = self.store.preferences(new.user_id).await?;

        if !preferences.allows(new.notification_type) {
            info!(
                user_id = %new.user_id,
                notification_type = new.notification_type.as_str(),
                "notification disabled by user preferences"
            );
            return Ok(None);
        }

        let notification = self.store.insert_notification(&new).await?;

        if push && preferences.push_notifications {
            let delivered = self
                .hub
                .send_to_user(notification.user_id, &ServerEnvelope::notification(&notification));
            debug!(
                notification_id = %notification.id,
                user_id = %notification.user_id,
                delivered,
                "real-time push attempted"
            );
        }

        Ok(Some(notification))
    }

    /// Resolve a named template and emit with `{placeholder}` substitution.
    ///
    /// A missing template or a context key the template needs is scoped to
    /// this one recipient: logged, nothing persisted, `Ok(None)` returned.
    pub async fn emit_from_template(
        &self,
        template_name: &str,
        user_id: Uuid,
        context: &HashMap<String, String>,
        refs: NotificationRefs,
    ) -> AppResult<Option<Notification>> {
        let Some(template) = self.store.template(template_name).await? else {
            error!(template_name, "notification template not found");
            return Ok(None);
        };

        let title = match render(&template.title_template, context) {
            Ok(title) => title,
            Err(AppError::TemplateContext(key)) => {
                warn!(template_name, %user_id, key, "template context incomplete, skipping recipient");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let message = match render(&template.message_template, context) {
            Ok(message) => message,
            Err(AppError::TemplateContext(key)) => {
                warn!(template_name, %user_id, key, "template context incomplete, skipping recipient");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let new = NewNotification {
            user_id,
            notification_type: template.notification_type,
            title,
            message,
            priority: template.priority,
            ticket_id: refs.ticket_id,
            room_id: refs.room_id,
            triggered_by: refs.triggered_by,
            action_url: refs.action_url,
        };

        self.emit_inner(new, template.send_push).await
    }

    /// Emit one templated notification per recipient. A recipient whose
    /// emission fails or is skipped never affects the others.
    pub async fn emit_from_template_batch(
        &self,
        template_name: &str,
        recipients: Vec<TemplateRecipient>,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        for recipient in recipients {
            match self
                .emit_from_template(
                    template_name,
                    recipient.user_id,
                    &recipient.context,
                    recipient.refs,
                )
                .await
            {
                Ok(Some(_)) => outcome.created += 1,
                Ok(None) => outcome.skipped += 1,
                Err(e) => {
                    warn!(
                        template_name,
                        user_id = %recipient.user_id,
                        error = %e,
                        "notification failed for recipient, batch continues"
                    );
                    outcome.failed += 1;
                }
            }
        }

        outcome
    }

    /// Insert the built-in templates that are not already present
    pub async fn seed_templates(&self) -> AppResult<()> {
        let templates = default_templates();
        let count = templates.len();
        for template in &templates {
            self.store.seed_template(template).await?;
        }
        info!(count, "notification templates seeded");
        Ok(())
    }
}

/// Substitute `{key}` placeholders from the context
fn render(template: &str, context: &HashMap<String, String>) -> AppResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars();

    while let Some(c) = chars.next() {
        if c != '{' {
            out.push(c);
            continue;
        }

        let mut key = String::new();
        let mut closed = false;
        for next in chars.by_ref() {
            if next == '}' {
                closed = true;
                break;
            }
            key.push(next);
        }
        if !closed {
            return Err(AppError::BadRequest(
                "unterminated placeholder in template".to_string(),
            ));
        }

        match context.get(&key) {
            Some(value) => out.push_str(value),
            None => return Err(AppError::TemplateContext(key)),
        }
    }

    Ok(out)
}

fn default_templates() -> Vec<NotificationTemplate> {
    vec![
        NotificationTemplate {
            name: "ticket_created".to_string(),
            notification_type: NotificationType::TicketCreated,
            title_template: "New Ticket #{ticket_id}: {ticket_title}".to_string(),
            message_template: "A new {priority} priority ticket has been created by {customer_name}."
                .to_string(),
            priority: NotificationPriority::Medium,
            send_push: true,
        },
        NotificationTemplate {
            name: "ticket_assigned".to_string(),
            notification_type: NotificationType::TicketAssigned,
            title_template: "Ticket #{ticket_id} Assigned to You".to_string(),
            message_template: "You have been assigned to ticket '{ticket_title}' by {assigned_by}."
                .to_string(),
            priority: NotificationPriority::High,
            send_push: true,
        },
        NotificationTemplate {
            name: "ticket_agent_assigned".to_string(),
            notification_type: NotificationType::TicketAssigned,
            title_template: "Agent Assigned to Your Ticket #{ticket_id}".to_string(),
            message_template: "{agent_name} has been assigned to help you with '{ticket_title}'."
                .to_string(),
            priority: NotificationPriority::Medium,
            send_push: true,
        },
        NotificationTemplate {
            name: "comment_added".to_string(),
            notification_type: NotificationType::CommentAdded,
            title_template: "New Comment on Ticket #{ticket_id}".to_string(),
            message_template: "{commenter_name} added a comment: {comment_preview}".to_string(),
            priority: NotificationPriority::Medium,
            send_push: true,
        },
        NotificationTemplate {
            name: "ticket_resolved".to_string(),
            notification_type: NotificationType::TicketResolved,
            title_template: "Ticket #{ticket_id} Resolved".to_string(),
            message_template: "Your ticket '{ticket_title}' has been resolved by {resolved_by}."
                .to_string(),
            priority: NotificationPriority::High,
            send_push: true,
        },
        NotificationTemplate {
            name: "message_received".to_string(),
            notification_type: NotificationType::MessageReceived,
            title_template: "New Message from {sender_name}".to_string(),
            message_template: "You have a new message in {room_name}: {message_preview}".to_string(),
            priority: NotificationPriority::Medium,
            send_push: true,
        },
    ]
}
