/// プロファイルリポジトリ（PostgREST経由）
///
/// `profiles`テーブルに対する操作:
/// - 利用者IDで行を削除（アカウント削除）
/// - 利用者IDでFCMトークンを取得（通知転送）
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info, instrument};

use super::config::SupabaseConfig;
use super::http_client::{describe_request_error, error_message_from_body};
use crate::domain::UserId;

/// プロファイルテーブル名
pub const PROFILES_TABLE: &str = "profiles";

/// プロファイルリポジトリのエラー型
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProfileRepositoryError {
    /// HTTPエラー（ステータスコード付き）
    #[error("Database error (status {status}): {message}")]
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
    #[error("Invalid database response: {0}")]
    InvalidResponse(String),
}

/// プロファイル操作トレイト
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// 利用者IDに一致するプロファイル行を削除
    async fn delete_profile(&self, user_id: &UserId) -> Result<(), ProfileRepositoryError>;

    /// 利用者のFCMトークンを取得
    ///
    /// # 戻り値
    /// * `Ok(Some(token))` - トークンあり
    /// * `Ok(None)` - 行が無い、またはトークンが未設定
    async fn find_delivery_token(
        &self,
        user_id: &UserId,
    ) -> Result<Option<String>, ProfileRepositoryError>;
}

/// `select=fcm_token` の行
#[derive(Debug, Deserialize)]
struct DeliveryTokenRow {
    #[serde(default)]
    fcm_token: Option<String>,
}

/// PostgRESTを使用したプロファイルリポジトリ
#[derive(Clone)]
pub struct PostgrestProfileRepository {
    client: Client,
    config: SupabaseConfig,
}

impl std::fmt::Debug for PostgrestProfileRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgrestProfileRepository")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PostgrestProfileRepository {
    /// 新しいリポジトリを作成
    pub fn new(client: Client, config: SupabaseConfig) -> Self {
        Self { client, config }
    }

    fn profiles_url(&self) -> String {
        self.config.rest_url(PROFILES_TABLE)
    }

    /// PostgRESTの等価フィルタ
    fn id_filter(user_id: &UserId) -> String {
        format!("eq.{}", user_id)
    }

    async fn error_from_response(response: reqwest::Response) -> ProfileRepositoryError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        ProfileRepositoryError::HttpError {
            status: status.as_u16(),
            message: error_message_from_body(&body),
        }
    }
}

#[async_trait]
impl ProfileRepository for PostgrestProfileRepository {
    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn delete_profile(&self, user_id: &UserId) -> Result<(), ProfileRepositoryError> {
        let url = self.profiles_url();
        debug!(url = %url, "プロファイルを削除");

        let response = self
            .client
            .delete(&url)
            .query(&[("id", Self::id_filter(user_id))])
            .header("apikey", self.config.service_key())
            .bearer_auth(self.config.service_key())
            .header("Prefer", "return=minimal")
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "プロファイル削除リクエスト失敗");
                ProfileRepositoryError::NetworkError(describe_request_error(&e))
            })?;

        if response.status().is_success() {
            info!(user_id = %user_id, "プロファイル削除リクエスト成功");
            return Ok(());
        }

        Err(Self::error_from_response(response).await)
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn find_delivery_token(
        &self,
        user_id: &UserId,
    ) -> Result<Option<String>, ProfileRepositoryError> {
        let url = self.profiles_url();

        let response = self
            .client
            .get(&url)
            .query(&[
                ("select", "fcm_token".to_string()),
                ("id", Self::id_filter(user_id)),
                ("limit", "1".to_string()),
            ])
            .header("apikey", self.config.service_key())
            .bearer_auth(self.config.service_key())
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "FCMトークン取得リクエスト失敗");
                ProfileRepositoryError::NetworkError(describe_request_error(&e))
            })?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let rows: Vec<DeliveryTokenRow> = response
            .json()
            .await
            .map_err(|e| ProfileRepositoryError::InvalidResponse(e.to_string()))?;

        let token = rows
            .into_iter()
            .next()
            .and_then(|row| row.fcm_token)
            .filter(|token| !token.is_empty());

        debug!(found = token.is_some(), "FCMトークン取得完了");
        Ok(token)
    }
}
