/// Emission semantics against an in-memory store: preference suppression,
/// fatal persistence failures, best-effort push, and per-recipient template
/// isolation in batches.
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::timeout;
use uuid::Uuid;

use support_realtime_service::error::{AppError, AppResult};
use support_realtime_service::models::{
    NewNotification, Notification, NotificationPreferences, NotificationPriority,
    NotificationTemplate, NotificationType,
};
use support_realtime_service::services::{
    NotificationEmitter, NotificationRefs, NotificationStore, TemplateRecipient,
};
use support_realtime_service::websocket::{ConnectionHandle, RealtimeHub, ServerEnvelope};

#[derive(Default)]
struct MemoryStore {
    notifications: Mutex<Vec<Notification>>,
    preferences: Mutex<HashMap<Uuid, NotificationPreferences>>,
    templates: Mutex<HashMap<String, NotificationTemplate>>,
    fail_inserts: AtomicBool,
    fail_inserts_for: Mutex<Vec<Uuid>>,
}

impl MemoryStore {
    fn set_preferences(&self, preferences: NotificationPreferences) {
        self.preferences
            .lock()
            .unwrap()
            .insert(preferences.user_id, preferences);
    }

    fn stored(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }

    fn stored_for(&self, user_id: Uuid) -> Vec<Notification> {
        self.stored()
            .into_iter()
            .filter(|n| n.user_id == user_id)
            .collect()
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn insert_notification(&self, new: &NewNotification) -> AppResult<Notification> {
        if self.fail_inserts.load(Ordering::Relaxed)
            || self.fail_inserts_for.lock().unwrap().contains(&new.user_id)
        {
            return Err(AppError::Database("insert failed".to_string()));
        }

        let notification = Notification {
            id: Uuid::new_v4(),
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
            created_at: Utc::now(),
        };
        self.notifications.lock().unwrap().push(notification.clone());
        Ok(notification)
    }

    async fn preferences(&self, user_id: Uuid) -> AppResult<NotificationPreferences> {
        Ok(self
            .preferences
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| NotificationPreferences::default_for(user_id)))
    }

    async fn template(&self, name: &str) -> AppResult<Option<NotificationTemplate>> {
        Ok(self.templates.lock().unwrap().get(name).cloned())
    }

    async fn mark_read(&self, notification_id: Uuid, user_id: Uuid) -> AppResult<bool> {
        let mut notifications = self.notifications.lock().unwrap();
        for notification in notifications.iter_mut() {
            if notification.id == notification_id
                && notification.user_id == user_id
                && !notification.is_read
            {
                notification.is_read = true;
                notification.read_at = Some(Utc::now());
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn seed_template(&self, template: &NotificationTemplate) -> AppResult<()> {
        self.templates
            .lock()
            .unwrap()
            .entry(template.name.clone())
            .or_insert_with(|| template.clone());
        Ok(())
    }
}

fn emitter() -> (Arc<MemoryStore>, Arc<RealtimeHub>, NotificationEmitter) {
    let store = Arc::new(MemoryStore::default());
    let hub = RealtimeHub::new_shared();
    let emitter = NotificationEmitter::new(store.clone(), hub.clone());
    (store, hub, emitter)
}

fn new_notification(user_id: Uuid) -> NewNotification {
    NewNotification {
        user_id,
        notification_type: NotificationType::TicketUpdated,
        title: "Ticket updated".to_string(),
        message: "Status changed to in_progress".to_string(),
        priority: NotificationPriority::Medium,
        ticket_id: Some(Uuid::new_v4()),
        room_id: None,
        triggered_by: None,
        action_url: None,
    }
}

fn context(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

async fn recv_one(rx: &mut mpsc::Receiver<ServerEnvelope>) -> Option<ServerEnvelope> {
    timeout(Duration::from_millis(50), rx.recv())
        .await
        .ok()
        .flatten()
}

#[tokio::test]
async fn offline_recipient_still_gets_a_durable_record() {
    // Scenario B: user has zero connections; the notification persists, no
    // frame is delivered, nothing raises.
    let (store, hub, emitter) = emitter();
    let user_id = Uuid::new_v4();

    let created = emitter.emit(new_notification(user_id)).await.unwrap();

    assert!(created.is_some());
    assert_eq!(store.stored_for(user_id).len(), 1);
    assert!(!hub.is_online(user_id));
}

#[tokio::test]
async fn online_recipient_gets_a_push_frame() {
    let (store, hub, emitter) = emitter();
    let user_id = Uuid::new_v4();

    let (handle, mut rx) = ConnectionHandle::new();
    hub.admit(user_id, handle);

    let created = emitter.emit(new_notification(user_id)).await.unwrap().unwrap();

    match recv_one(&mut rx).await.unwrap() {
        ServerEnvelope::Notification { id, title, .. } => {
            assert_eq!(id, created.id);
            assert_eq!(title, created.title);
        }
        other => panic!("unexpected frame: {other:?}"),
    }
    assert_eq!(store.stored_for(user_id).len(), 1);
}

#[tokio::test]
async fn disabled_type_suppresses_without_error() {
    let (store, _hub, emitter) = emitter();
    let user_id = Uuid::new_v4();

    let mut preferences = NotificationPreferences::default_for(user_id);
    preferences.ticket_updates = false;
    store.set_preferences(preferences);

    let created = emitter.emit(new_notification(user_id)).await.unwrap();

    assert!(created.is_none());
    assert!(store.stored().is_empty());
}

#[tokio::test]
async fn push_opt_out_persists_but_sends_nothing() {
    let (store, hub, emitter) = emitter();
    let user_id = Uuid::new_v4();

    let mut preferences = NotificationPreferences::default_for(user_id);
    preferences.push_notifications = false;
    store.set_preferences(preferences);

    let (handle, mut rx) = ConnectionHandle::new();
    hub.admit(user_id, handle);

    let created = emitter.emit(new_notification(user_id)).await.unwrap();

    assert!(created.is_some());
    assert_eq!(store.stored_for(user_id).len(), 1);
    assert!(recv_one(&mut rx).await.is_none());
}

#[tokio::test]
async fn persistence_failure_is_fatal() {
    let (store, _hub, emitter) = emitter();
    store.fail_inserts.store(true, Ordering::Relaxed);

    let result = emitter.emit(new_notification(Uuid::new_v4())).await;

    assert!(matches!(result, Err(AppError::Database(_))));
}

#[tokio::test]
async fn missing_context_key_skips_only_that_recipient() {
    // Scenario C: the ticket_created template needs {ticket_title}; a
    // recipient whose context lacks it is skipped, the rest of the batch is
    // unaffected.
    let (store, _hub, emitter) = emitter();
    emitter.seed_templates().await.unwrap();

    let complete = Uuid::new_v4();
    let incomplete = Uuid::new_v4();

    let outcome = emitter
        .emit_from_template_batch(
            "ticket_created",
            vec![
                TemplateRecipient {
                    user_id: complete,
                    context: context(&[
                        ("ticket_id", "1"),
                        ("ticket_title", "Printer on fire"),
                        ("customer_name", "Dana"),
                        ("priority", "high"),
                    ]),
                    refs: NotificationRefs::default(),
                },
                TemplateRecipient {
                    user_id: incomplete,
                    context: context(&[("ticket_id", "1")]),
                    refs: NotificationRefs::default(),
                },
            ],
        )
        .await;

    assert_eq!(outcome.created, 1);
    assert_eq!(outcome.skipped, 1);
    assert_eq!(outcome.failed, 0);
    assert_eq!(store.stored_for(complete).len(), 1);
    assert!(store.stored_for(incomplete).is_empty());
}

#[tokio::test]
async fn template_substitution_fills_title_and_message() {
    let (store, _hub, emitter) = emitter();
    emitter.seed_templates().await.unwrap();

    let user_id = Uuid::new_v4();
    let created = emitter
        .emit_from_template(
            "ticket_resolved",
            user_id,
            &context(&[("ticket_id", "7"), ("ticket_title", "VPN down"), ("resolved_by", "Sam")]),
            NotificationRefs {
                ticket_id: Some(Uuid::new_v4()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(created.title, "Ticket #7 Resolved");
    assert_eq!(
        created.message,
        "Your ticket 'VPN down' has been resolved by Sam."
    );
    assert_eq!(created.notification_type, NotificationType::TicketResolved);
    assert_eq!(created.priority, NotificationPriority::High);
    assert_eq!(store.stored_for(user_id).len(), 1);
}

#[tokio::test]
async fn unknown_template_is_a_logged_no_op() {
    let (store, _hub, emitter) = emitter();

    let created = emitter
        .emit_from_template(
            "no_such_template",
            Uuid::new_v4(),
            &context(&[]),
            NotificationRefs::default(),
        )
        .await
        .unwrap();

    assert!(created.is_none());
    assert!(store.stored().is_empty());
}

#[tokio::test]
async fn store_failure_inside_a_batch_does_not_abort_it() {
    let (store, _hub, emitter) = emitter();
    emitter.seed_templates().await.unwrap();

    let failing = Uuid::new_v4();
    let succeeding = Uuid::new_v4();
    store.fail_inserts_for.lock().unwrap().push(failing);

    let assignment_context = context(&[
        ("ticket_id", "3"),
        ("ticket_title", "Broken login"),
        ("assigned_by", "Lee"),
    ]);
    let outcome = emitter
        .emit_from_template_batch(
            "ticket_assigned",
            vec![
                TemplateRecipient {
                    user_id: failing,
                    context: assignment_context.clone(),
                    refs: NotificationRefs::default(),
                },
                TemplateRecipient {
                    user_id: succeeding,
                    context: assignment_context,
                    refs: NotificationRefs::default(),
                },
            ],
        )
        .await;

    assert_eq!(outcome.created, 1);
    assert_eq!(outcome.failed, 1);
    assert_eq!(store.stored_for(succeeding).len(), 1);
    assert!(store.stored_for(failing).is_empty());
}
