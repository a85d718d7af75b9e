//! FCM HTTP v1 送信メッセージ
//!
//! `{message: {token, notification: {title, body}, data: {notification_id, type}}}`

use serde::{Deserialize, Serialize};

use super::{NotificationPayloadError, NotificationRecord};

/// messages:send のリクエストボディ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushMessage {
    pub message: PushMessageBody,
}

/// 宛先と表示内容
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushMessageBody {
    /// 配信先デバイスのFCMトークン
    pub token: String,
    pub notification: PushNotification,
    pub data: PushData,
}

/// 端末に表示される通知
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushNotification {
    pub title: String,
    pub body: String,
}

/// アプリへ渡すデータペイロード（FCMの制約で値はすべて文字列）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushData {
    pub notification_id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl PushMessage {
    /// 通知行と配信トークンからメッセージを組み立てる
    ///
    /// タイトル・本文が空の場合は既定値を使う。
    pub fn for_notification(
        token: &str,
        notification: &NotificationRecord,
    ) -> Result<Self, NotificationPayloadError> {
        let notification_id = notification.notification_id()?;

        Ok(Self {
            message: PushMessageBody {
                token: token.to_string(),
                notification: PushNotification {
                    title: notification.title_or_default().to_string(),
                    body: notification.body_or_default().to_string(),
                },
                data: PushData {
                    notification_id,
                    kind: notification.kind.clone(),
                },
            },
        })
    }

    /// 宛先トークン
    pub fn token(&self) -> &str {
        &self.message.token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DEFAULT_BODY, DEFAULT_TITLE};
    use serde_json::json;

    fn notification(value: serde_json::Value) -> NotificationRecord {
        NotificationRecord::from_record(&value).unwrap()
    }

    #[test]
    fn test_message_json_shape() {
        let n = notification(json!({
            "id": 7,
            "recipient_id": "U2",
            "title": "Order",
            "message": "Shipped",
            "type": "order"
        }));

        let message = PushMessage::for_notification("T", &n).unwrap();
        let value = serde_json::to_value(&message).unwrap();

        assert_eq!(
            value,
            json!({
                "message": {
                    "token": "T",
                    "notification": { "title": "Order", "body": "Shipped" },
                    "data": { "notification_id": "7", "type": "order" }
                }
            })
        );
    }

    #[test]
    fn test_defaults_are_applied() {
        let n = notification(json!({ "id": "n-1", "recipient_id": "U2" }));
        let message = PushMessage::for_notification("T", &n).unwrap();

        assert_eq!(message.message.notification.title, DEFAULT_TITLE);
        assert_eq!(message.message.notification.body, DEFAULT_BODY);
    }

    #[test]
    fn test_missing_type_is_omitted() {
        let n = notification(json!({ "id": 1, "recipient_id": "U2" }));
        let value = serde_json::to_value(PushMessage::for_notification("T", &n).unwrap()).unwrap();

        assert!(value["message"]["data"].get("type").is_none());
        assert_eq!(value["message"]["data"]["notification_id"], "1");
    }

    #[test]
    fn test_missing_id_is_rejected() {
        let n = notification(json!({ "recipient_id": "U2" }));
        assert_eq!(
            PushMessage::for_notification("T", &n),
            Err(NotificationPayloadError::MissingNotificationId)
        );
    }
}
