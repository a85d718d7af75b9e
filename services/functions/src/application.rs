// アプリケーション層モジュール
pub mod delete_user_handler;
pub mod forwarder_task;
pub mod notification_forwarder;

// 再エクスポート
pub use delete_user_handler::{DeleteUserError, DeleteUserHandler, DeleteUserOutcome};
pub use forwarder_task::{
    ForwarderExit, ForwarderHandle, ForwarderReport, ForwarderStats, ForwarderTask,
    ShutdownTrigger,
};
pub use notification_forwarder::{ForwardError, ForwardedNotification, NotificationForwarder};
