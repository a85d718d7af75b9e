// Phoenixチャンネルプロトコル（Realtime vsn 1.0.0）
//
// クライアント→サーバー: phx_join / heartbeat / phx_leave
// サーバー→クライアント: phx_reply / postgres_changes / system / phx_error / phx_close

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::config::RealtimeSubscriptionConfig;
use crate::domain::ChangeEvent;

/// ハートビート用のトピック
pub const PHOENIX_TOPIC: &str = "phoenix";

pub const EVENT_JOIN: &str = "phx_join";
pub const EVENT_LEAVE: &str = "phx_leave";
pub const EVENT_REPLY: &str = "phx_reply";
pub const EVENT_ERROR: &str = "phx_error";
pub const EVENT_CLOSE: &str = "phx_close";
pub const EVENT_HEARTBEAT: &str = "heartbeat";
pub const EVENT_POSTGRES_CHANGES: &str = "postgres_changes";
pub const EVENT_SYSTEM: &str = "system";

/// Phoenixメッセージ（送受信共通の形）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub msg_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

impl PhoenixMessage {
    /// チャンネル参加メッセージ
    ///
    /// `postgres_changes`の購読条件と認可トークンを含める。
    pub fn join(config: &RealtimeSubscriptionConfig, access_token: &str, msg_ref: &str) -> Self {
        Self {
            topic: config.topic(),
            event: EVENT_JOIN.to_string(),
            payload: json!({
                "config": {
                    "broadcast": { "ack": false, "self": false },
                    "presence": { "key": "" },
                    "postgres_changes": [{
                        "event": config.event,
                        "schema": config.schema,
                        "table": config.table,
                    }],
                    "private": false,
                },
                "access_token": access_token,
            }),
            msg_ref: Some(msg_ref.to_string()),
            join_ref: Some(msg_ref.to_string()),
        }
    }

    /// ハートビートメッセージ
    pub fn heartbeat(msg_ref: &str) -> Self {
        Self {
            topic: PHOENIX_TOPIC.to_string(),
            event: EVENT_HEARTBEAT.to_string(),
            payload: json!({}),
            msg_ref: Some(msg_ref.to_string()),
            join_ref: None,
        }
    }

    /// チャンネル退出メッセージ
    pub fn leave(topic: &str, msg_ref: &str, join_ref: &str) -> Self {
        Self {
            topic: topic.to_string(),
            event: EVENT_LEAVE.to_string(),
            payload: json!({}),
            msg_ref: Some(msg_ref.to_string()),
            join_ref: Some(join_ref.to_string()),
        }
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// サーバーから届いたイベント
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// 要求（join / heartbeat）への応答
    Reply {
        topic: String,
        msg_ref: Option<String>,
        status: String,
        response: Value,
    },
    /// 行変更の通知
    PostgresChanges(ChangeEvent),
    /// 購読状況などのシステム通知
    System(Value),
    /// チャンネルエラー
    ChannelError(Value),
    /// サーバー側からのチャンネル終了
    ChannelClosed,
    /// 扱わないイベント（presence_state等）
    Ignored(String),
}

#[derive(Debug, Deserialize)]
struct ReplyPayload {
    #[serde(default)]
    status: String,
    #[serde(default)]
    response: Value,
}

#[derive(Debug, Deserialize)]
struct PostgresChangesPayload {
    data: ChangeEvent,
}

impl ServerEvent {
    /// テキストフレームを解析
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        let message: PhoenixMessage = serde_json::from_str(text)?;

        let event = match message.event.as_str() {
            EVENT_REPLY => {
                let payload: ReplyPayload = serde_json::from_value(message.payload)?;
                ServerEvent::Reply {
                    topic: message.topic,
                    msg_ref: message.msg_ref,
                    status: payload.status,
                    response: payload.response,
                }
            }
            EVENT_POSTGRES_CHANGES => {
                let payload: PostgresChangesPayload = serde_json::from_value(message.payload)?;
                ServerEvent::PostgresChanges(payload.data)
            }
            EVENT_SYSTEM => ServerEvent::System(message.payload),
            EVENT_ERROR => ServerEvent::ChannelError(message.payload),
            EVENT_CLOSE => ServerEvent::ChannelClosed,
            _ => ServerEvent::Ignored(message.event),
        };

        Ok(event)
    }
}

/// エラー応答から理由を取り出す
pub fn reply_reason(response: &Value) -> String {
    response
        .get("reason")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| response.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChangeType;

    #[test]
    fn test_join_message() {
        let config = RealtimeSubscriptionConfig::default();
        let message = PhoenixMessage::join(&config, "service-key", "1");
        let value: Value = serde_json::from_str(&message.to_text().unwrap()).unwrap();

        assert_eq!(value["topic"], "realtime:new_notification_channel");
        assert_eq!(value["event"], "phx_join");
        assert_eq!(value["ref"], "1");
        assert_eq!(value["join_ref"], "1");
        assert_eq!(value["payload"]["access_token"], "service-key");
        assert_eq!(
            value["payload"]["config"]["postgres_changes"],
            json!([{ "event": "*", "schema": "public", "table": "notifications" }])
        );
    }

    #[test]
    fn test_heartbeat_message() {
        let value: Value =
            serde_json::from_str(&PhoenixMessage::heartbeat("5").to_text().unwrap()).unwrap();

        assert_eq!(
            value,
            json!({ "topic": "phoenix", "event": "heartbeat", "payload": {}, "ref": "5" })
        );
    }

    #[test]
    fn test_decode_join_reply() {
        let text = r#"{"topic":"realtime:new_notification_channel","event":"phx_reply","payload":{"response":{"postgres_changes":[{"id":1,"event":"*","schema":"public","table":"notifications"}]},"status":"ok"},"ref":"1"}"#;

        match ServerEvent::decode(text).unwrap() {
            ServerEvent::Reply {
                topic,
                msg_ref,
                status,
                ..
            } => {
                assert_eq!(topic, "realtime:new_notification_channel");
                assert_eq!(msg_ref.as_deref(), Some("1"));
                assert_eq!(status, "ok");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_decode_error_reply_reason() {
        let text = r#"{"topic":"realtime:c","event":"phx_reply","payload":{"response":{"reason":"Unauthorized"},"status":"error"},"ref":"1"}"#;

        let ServerEvent::Reply {
            status, response, ..
        } = ServerEvent::decode(text).unwrap()
        else {
            panic!("expected reply");
        };
        assert_eq!(status, "error");
        assert_eq!(reply_reason(&response), "Unauthorized");
    }

    #[test]
    fn test_decode_postgres_changes() {
        let text = r#"{"topic":"realtime:new_notification_channel","event":"postgres_changes","payload":{"data":{"columns":[],"commit_timestamp":"2024-05-01T10:00:00.000Z","errors":null,"record":{"id":7,"recipient_id":"U2"},"schema":"public","table":"notifications","type":"INSERT"},"ids":[1]},"ref":null}"#;

        let ServerEvent::PostgresChanges(event) = ServerEvent::decode(text).unwrap() else {
            panic!("expected postgres_changes");
        };
        assert_eq!(event.change_type, ChangeType::Insert);
        assert_eq!(event.table, "notifications");
        assert_eq!(event.new_record().unwrap()["recipient_id"], "U2");
    }

    #[test]
    fn test_decode_other_events() {
        assert_eq!(
            ServerEvent::decode(r#"{"topic":"realtime:c","event":"phx_close","payload":{},"ref":null}"#)
                .unwrap(),
            ServerEvent::ChannelClosed
        );
        assert!(matches!(
            ServerEvent::decode(r#"{"topic":"realtime:c","event":"phx_error","payload":{},"ref":null}"#)
                .unwrap(),
            ServerEvent::ChannelError(_)
        ));
        assert!(matches!(
            ServerEvent::decode(r#"{"topic":"realtime:c","event":"system","payload":{"status":"ok","message":"Subscribed to PostgreSQL"},"ref":null}"#)
                .unwrap(),
            ServerEvent::System(_)
        ));
        assert_eq!(
            ServerEvent::decode(r#"{"topic":"realtime:c","event":"presence_state","payload":{},"ref":null}"#)
                .unwrap(),
            ServerEvent::Ignored("presence_state".to_string())
        );
    }

    #[test]
    fn test_decode_malformed() {
        assert!(ServerEvent::decode("not json").is_err());
        assert!(
            ServerEvent::decode(r#"{"topic":"realtime:c","event":"postgres_changes","payload":{}}"#)
                .is_err()
        );
    }
}
