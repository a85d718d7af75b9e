/// Supabase Auth (GoTrue) 管理APIクライアント
///
/// - 認証情報から利用者を解決する（GET /auth/v1/user）
/// - 利用者を削除する（DELETE /auth/v1/admin/users/{id}）
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info, instrument};

use super::config::SupabaseConfig;
use super::http_client::{describe_request_error, error_message_from_body};
use crate::domain::{BearerToken, UserId};

/// 認証管理APIのエラー型
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AuthAdminError {
    /// 認証情報に対応する利用者がいない（401/403/404）
    #[error("User not found.")]
    UserNotFound,

    /// HTTPエラー（ステータスコード付き）
    #[error("Auth API error (status {status}): {message}")]
    HttpError {
        /// HTTPステータスコード
        status: u16,
        /// エラーメッセージ
        message: String,
    },

    /// ネットワークエラー
    #[error("Network error: {0}")]
    NetworkError(String),

    /// 想定外のレスポンス形式
    #[error("Invalid auth API response: {0}")]
    InvalidResponse(String),
}

/// 認証プロバイダーの管理操作
///
/// 実際のGoTrueクライアントとテスト用モックを差し替えられるよう抽象化する。
#[async_trait]
pub trait IdentityAdmin: Send + Sync {
    /// Bearerトークンから利用者IDを解決
    async fn resolve_user(&self, token: &BearerToken) -> Result<UserId, AuthAdminError>;

    /// 利用者を削除
    async fn delete_user(&self, user_id: &UserId) -> Result<(), AuthAdminError>;
}

/// GET /auth/v1/user のレスポンス（必要なフィールドのみ）
#[derive(Debug, Deserialize)]
struct AuthUser {
    id: Option<String>,
}

/// GoTrue管理APIクライアント
#[derive(Clone)]
pub struct SupabaseAuthAdmin {
    client: Client,
    config: SupabaseConfig,
}

impl std::fmt::Debug for SupabaseAuthAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseAuthAdmin")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SupabaseAuthAdmin {
    /// 新しいクライアントを作成
    pub fn new(client: Client, config: SupabaseConfig) -> Self {
        Self { client, config }
    }

    fn user_url(&self) -> String {
        self.config.auth_url("user")
    }

    fn admin_user_url(&self, user_id: &UserId) -> String {
        self.config.auth_url(&format!("admin/users/{}", user_id))
    }
}

#[async_trait]
impl IdentityAdmin for SupabaseAuthAdmin {
    #[instrument(skip(self, token))]
    async fn resolve_user(&self, token: &BearerToken) -> Result<UserId, AuthAdminError> {
        let url = self.user_url();
        debug!(url = %url, "利用者を解決");

        let response = self
            .client
            .get(&url)
            .header("apikey", self.config.service_key())
            .bearer_auth(token.as_str())
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "利用者解決リクエスト失敗");
                AuthAdminError::NetworkError(describe_request_error(&e))
            })?;

        let status = response.status();
        if matches!(
            status,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND
        ) {
            return Err(AuthAdminError::UserNotFound);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "利用者解決エラー");
            return Err(AuthAdminError::HttpError {
                status: status.as_u16(),
                message: error_message_from_body(&body),
            });
        }

        let user: AuthUser = response
            .json()
            .await
            .map_err(|e| AuthAdminError::InvalidResponse(e.to_string()))?;

        match user.id {
            Some(id) if !id.is_empty() => Ok(UserId::new(id)),
            _ => Err(AuthAdminError::UserNotFound),
        }
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn delete_user(&self, user_id: &UserId) -> Result<(), AuthAdminError> {
        let url = self.admin_user_url(user_id);
        debug!(url = %url, "利用者を削除");

        let response = self
            .client
            .delete(&url)
            .header("apikey", self.config.service_key())
            .bearer_auth(self.config.service_key())
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "利用者削除リクエスト失敗");
                AuthAdminError::NetworkError(describe_request_error(&e))
            })?;

        let status = response.status();
        if status.is_success() {
            info!(user_id = %user_id, "利用者を削除");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        error!(status = %status, body = %body, user_id = %user_id, "利用者削除エラー");

        Err(AuthAdminError::HttpError {
            status: status.as_u16(),
            message: error_message_from_body(&body),
        })
    }
}
