//! 利用者識別子とBearer認証情報
//!
//! Authorizationヘッダーから取り出した認証情報と、
//! 認証プロバイダーが解決した利用者IDを表す値オブジェクト。

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Bearerスキームのプレフィックス
const BEARER_PREFIX: &str = "Bearer ";

/// 認証プロバイダーが管理する利用者ID
///
/// プロファイル行の主キーとしても使用される。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// 新しい利用者IDを作成
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// 文字列として取得
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 認証情報の取り出しエラー
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// Authorizationヘッダーが存在しない
    #[error("Missing authorization header")]
    MissingHeader,

    /// トークン部分が空、または空白を含む
    #[error("Malformed authorization header")]
    Malformed,
}

/// Authorizationヘッダーから取り出したBearerトークン
///
/// ログに出力されないよう、Debug表示ではトークン本体を伏せる。
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    /// Authorizationヘッダー値からトークンを取り出す
    ///
    /// `Bearer `プレフィックスがあれば取り除き、無ければ値全体をトークンとして扱う。
    ///
    /// # 戻り値
    /// * `Err(CredentialError::MissingHeader)` - ヘッダーが無い
    /// * `Err(CredentialError::Malformed)` - トークンが空、または空白を含む
    pub fn from_authorization_header(value: Option<&str>) -> Result<Self, CredentialError> {
        let value = value.ok_or(CredentialError::MissingHeader)?.trim();
        // 末尾の空白が落とされた "Bearer" 単体はトークン無しとして扱う
        let token = if value == BEARER_PREFIX.trim_end() {
            ""
        } else {
            value.strip_prefix(BEARER_PREFIX).unwrap_or(value).trim()
        };

        if token.is_empty() || token.chars().any(char::is_whitespace) {
            return Err(CredentialError::Malformed);
        }

        Ok(Self(token.to_string()))
    }

    /// トークン文字列を取得
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BearerToken").field(&"<redacted>").finish()
    }
}
