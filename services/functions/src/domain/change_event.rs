//! データベース変更イベント
//!
//! Realtimeの`postgres_changes`ペイロード（`data`部分）に対応する。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 変更種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeType {
    Insert,
    Update,
    Delete,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Insert => "INSERT",
            ChangeType::Update => "UPDATE",
            ChangeType::Delete => "DELETE",
        }
    }
}

/// 監視テーブルの行変更イベント
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// 変更種別
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    /// スキーマ名
    pub schema: String,
    /// テーブル名
    pub table: String,
    /// コミット時刻（ISO 8601）
    #[serde(default)]
    pub commit_timestamp: Option<String>,
    /// 変更後の行
    #[serde(default)]
    pub record: Option<Value>,
    /// 変更前の行（REPLICA IDENTITY設定により主キーのみの場合がある）
    #[serde(default)]
    pub old_record: Option<Value>,
}

impl ChangeEvent {
    /// 新しい変更イベントを作成
    pub fn new(
        change_type: ChangeType,
        schema: impl Into<String>,
        table: impl Into<String>,
        record: Option<Value>,
    ) -> Self {
        Self {
            change_type,
            schema: schema.into(),
            table: table.into(),
            commit_timestamp: None,
            record,
            old_record: None,
        }
    }

    /// 変更後の行を取得
    ///
    /// DELETEでは空オブジェクトが届くため、空・nullは`None`として扱う。
    pub fn new_record(&self) -> Option<&Value> {
        match &self.record {
            Some(Value::Object(map)) if map.is_empty() => None,
            Some(Value::Null) | None => None,
            Some(record) => Some(record),
        }
    }
}
