//! 通知テーブルの行
//!
//! 他のサービスが挿入した`notifications`行を読み取り専用で扱う。

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

use super::UserId;

/// タイトル未設定時の既定値
pub const DEFAULT_TITLE: &str = "New Notification";

/// 本文未設定時の既定値
pub const DEFAULT_BODY: &str = "You have a new notification from GrocerMate.";

/// 通知ペイロードの検証エラー
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotificationPayloadError {
    /// 変更イベントに新しい行が含まれていない（DELETE等）
    #[error("change event has no new record")]
    MissingRecord,

    /// recipient_idが無い、または空
    #[error("notification has no recipient_id")]
    MissingRecipientId,

    /// idが無い
    #[error("notification has no id")]
    MissingNotificationId,

    /// 行の形式が想定と異なる
    #[error("malformed notification record: {0}")]
    Malformed(String),
}

/// `notifications`テーブルの行
///
/// `id`と`type`は数値・文字列どちらでも受け付け、プッシュのdataでは文字列化する。
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NotificationRecord {
    /// 通知ID
    #[serde(default)]
    pub id: Option<Value>,
    /// 受信者の利用者ID
    #[serde(default)]
    pub recipient_id: Option<String>,
    /// タイトル
    #[serde(default)]
    pub title: Option<String>,
    /// 本文
    #[serde(default)]
    pub message: Option<String>,
    /// 通知種別
    #[serde(default, rename = "type", deserialize_with = "lenient_string")]
    pub kind: Option<String>,
}

impl NotificationRecord {
    /// 変更イベントの行JSONから通知を復元
    pub fn from_record(record: &Value) -> Result<Self, NotificationPayloadError> {
        serde_json::from_value(record.clone())
            .map_err(|e| NotificationPayloadError::Malformed(e.to_string()))
    }

    /// 受信者IDを取得
    ///
    /// 空文字列は欠損として扱う。
    pub fn recipient_id(&self) -> Result<UserId, NotificationPayloadError> {
        match self.recipient_id.as_deref() {
            Some(id) if !id.is_empty() => Ok(UserId::new(id)),
            _ => Err(NotificationPayloadError::MissingRecipientId),
        }
    }

    /// 通知IDを文字列として取得
    pub fn notification_id(&self) -> Result<String, NotificationPayloadError> {
        match &self.id {
            Some(Value::String(id)) => Ok(id.clone()),
            Some(Value::Number(id)) => Ok(id.to_string()),
            Some(Value::Null) | None => Err(NotificationPayloadError::MissingNotificationId),
            Some(other) => Err(NotificationPayloadError::Malformed(format!(
                "unsupported id value: {}",
                other
            ))),
        }
    }

    /// タイトル（空なら既定値）
    pub fn title_or_default(&self) -> &str {
        non_empty(self.title.as_deref()).unwrap_or(DEFAULT_TITLE)
    }

    /// 本文（空なら既定値）
    pub fn body_or_default(&self) -> &str {
        non_empty(self.message.as_deref()).unwrap_or(DEFAULT_BODY)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// 文字列以外のスカラー値は文字列化し、nullは未設定として扱う
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}
