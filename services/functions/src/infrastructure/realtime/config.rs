// Realtime購読設定
//
// どのテーブルのどの変更を購読するかを環境変数から読み込む。

use thiserror::Error;

/// チャンネル名の環境変数名
pub const REALTIME_CHANNEL_ENV: &str = "REALTIME_CHANNEL";

/// スキーマ名の環境変数名
pub const REALTIME_SCHEMA_ENV: &str = "REALTIME_SCHEMA";

/// テーブル名の環境変数名
pub const REALTIME_TABLE_ENV: &str = "REALTIME_TABLE";

/// 購読イベント種別の環境変数名
pub const REALTIME_EVENT_ENV: &str = "REALTIME_EVENT";

/// デフォルトのチャンネル名
pub const DEFAULT_CHANNEL: &str = "new_notification_channel";

/// デフォルトのスキーマ名
pub const DEFAULT_SCHEMA: &str = "public";

/// デフォルトのテーブル名
pub const DEFAULT_TABLE: &str = "notifications";

/// デフォルトの購読イベント種別（全種別）
pub const DEFAULT_EVENT: &str = "*";

const ALLOWED_EVENTS: [&str; 4] = ["*", "INSERT", "UPDATE", "DELETE"];

/// Realtime設定エラー
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RealtimeConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: String, value: String },
}

/// `postgres_changes`購読の設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealtimeSubscriptionConfig {
    pub channel: String,
    pub schema: String,
    pub table: String,
    pub event: String,
}

impl Default for RealtimeSubscriptionConfig {
    fn default() -> Self {
        Self {
            channel: DEFAULT_CHANNEL.to_string(),
            schema: DEFAULT_SCHEMA.to_string(),
            table: DEFAULT_TABLE.to_string(),
            event: DEFAULT_EVENT.to_string(),
        }
    }
}

impl RealtimeSubscriptionConfig {
    /// 環境変数から設定を読み込み
    ///
    /// 未設定・空の値はデフォルトを使用する。
    /// `REALTIME_EVENT`は `*` / `INSERT` / `UPDATE` / `DELETE` のいずれか。
    pub fn from_env() -> Result<Self, RealtimeConfigError> {
        let defaults = Self::default();

        let event = env_or(REALTIME_EVENT_ENV, defaults.event).to_ascii_uppercase();
        if !ALLOWED_EVENTS.contains(&event.as_str()) {
            return Err(RealtimeConfigError::InvalidValue {
                name: REALTIME_EVENT_ENV.to_string(),
                value: event,
            });
        }

        Ok(Self {
            channel: env_or(REALTIME_CHANNEL_ENV, defaults.channel),
            schema: env_or(REALTIME_SCHEMA_ENV, defaults.schema),
            table: env_or(REALTIME_TABLE_ENV, defaults.table),
            event,
        })
    }

    /// Phoenixチャンネルのトピック名
    pub fn topic(&self) -> String {
        format!("realtime:{}", self.channel)
    }
}

fn env_or(name: &str, default: String) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
}
