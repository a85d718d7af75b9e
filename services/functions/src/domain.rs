// Domain layer modules
pub mod change_event;
pub mod notification;
pub mod push_message;
pub mod subscription_state;
pub mod user_identity;

// Re-exports
pub use change_event::{ChangeEvent, ChangeType};
pub use notification::{DEFAULT_BODY, DEFAULT_TITLE, NotificationPayloadError, NotificationRecord};
pub use push_message::{PushData, PushMessage, PushMessageBody, PushNotification};
pub use subscription_state::{InvalidTransition, SubscriptionState};
pub use user_identity::{BearerToken, CredentialError, UserId};
