// 共通HTTPクライアント
//
// Supabase / Google OAuth / FCM への通信で共有するreqwestクライアントと、
// エラーレスポンス本文からのメッセージ抽出。

use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

/// リクエストタイムアウト（秒）
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// 接続タイムアウト（秒）
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// タイムアウト設定済みのHTTPクライアントを作成
///
/// 再試行ミドルウェアは付けない。送信はすべて最大1回。
pub fn build_http_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .build()
}

/// エラーレスポンス本文から人が読めるメッセージを取り出す
///
/// GoTrue (`msg`), PostgREST (`message`), OAuth (`error_description`),
/// FCM (`error.message`) の形式を順に試し、どれにも当たらなければ本文そのものを返す。
pub fn error_message_from_body(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return body.trim().to_string();
    };

    let candidates = [
        value.get("msg"),
        value.get("message"),
        value.get("error_description"),
        value.get("error").and_then(|e| e.get("message")),
        value.get("error"),
    ];

    candidates
        .into_iter()
        .flatten()
        .find_map(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

/// reqwestエラーを文字列化（タイムアウト・接続エラーを区別）
pub fn describe_request_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("timeout: {}", err)
    } else if err.is_connect() {
        format!("connection failed: {}", err)
    } else {
        err.to_string()
    }
}
