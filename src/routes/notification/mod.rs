mod handler;
mod model;

pub use handler::{delete_notification, list_notifications, mark_all_read, mark_read};
pub use model::{Notification, NotificationKind};
