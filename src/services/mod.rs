pub mod notifications;
pub mod store;

pub use notifications::{BatchOutcome, NotificationEmitter, NotificationRefs, TemplateRecipient};
pub use store::{NotificationStore, PgNotificationStore};
