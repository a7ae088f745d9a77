pub mod errors;
pub mod models;
pub mod services;
pub mod state;

// Re-export commonly used types
pub use errors::{InboxError, InboxResult};
pub use models::notification::{Notification, NotificationType};
pub use services::inbox_widget::{ConversationHandler, Navigator, NotificationInbox};
pub use services::notification_api::{HttpNotificationApi, MockNotificationApi, NotificationApi};
pub use services::presentation::InboxSnapshot;
pub use services::push_listener::{BroadcastPushChannel, PushChannel, SocketIoChannel};
pub use state::InboxConfig;
