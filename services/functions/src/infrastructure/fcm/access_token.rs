// FCM送信用アクセストークン
//
// サービスアカウントの秘密鍵でJWT（RS256）に署名し、
// OAuth2トークンエンドポイントでアクセストークンと交換する。
// 有効期限の5分前まではキャッシュを再利用する（TokenCachePolicy::UntilNearExpiry）。

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use super::config::ServiceAccountKey;
use crate::infrastructure::http_client::{describe_request_error, error_message_from_body};

/// FCM送信に必要なOAuthスコープ
pub const FIREBASE_MESSAGING_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";

/// JWT Bearer グラント種別
pub const JWT_BEARER_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// 署名するJWTの有効期間（秒）
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// レスポンスにexpires_inが無い場合の有効期間（秒）
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// 期限切れとみなす余裕（分）
const EXPIRY_MARGIN_MINUTES: i64 = 5;

/// アクセストークン取得のエラー型
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AccessTokenError {
    /// 秘密鍵の読み込み・JWT署名の失敗
    #[error("JWT signing failed: {0}")]
    Signing(String),

    /// トークンエンドポイントのHTTPエラー
    #[error("Token endpoint error (status {status}): {message}")]
    HttpError { status: u16, message: String },

    /// ネットワークエラー
    #[error("Network error: {0}")]
    NetworkError(String),

    /// 想定外のレスポンス
    #[error("Invalid token response: {0}")]
    InvalidResponse(String),
}

/// アクセストークンのキャッシュ方針
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenCachePolicy {
    /// 有効期限の5分前まで再利用する
    #[default]
    UntilNearExpiry,
    /// 送信のたびに交換する
    PerRequest,
}

/// アクセストークン提供トレイト
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    /// 有効なアクセストークンを取得
    async fn access_token(&self) -> Result<String, AccessTokenError>;
}

/// 署名するJWTのクレーム
#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

/// トークンエンドポイントのレスポンス
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// キャッシュ中のアクセストークン
#[derive(Debug, Clone)]
struct CachedAccessToken {
    token: String,
    expiry: DateTime<Utc>,
}

impl CachedAccessToken {
    /// 期限の5分前を過ぎていればtrue
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now + Duration::minutes(EXPIRY_MARGIN_MINUTES) >= self.expiry
    }
}

/// サービスアカウントによるアクセストークン提供
pub struct ServiceAccountTokenProvider {
    client: Client,
    service_account: ServiceAccountKey,
    encoding_key: EncodingKey,
    policy: TokenCachePolicy,
    cache: Mutex<Option<CachedAccessToken>>,
}

impl std::fmt::Debug for ServiceAccountTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountTokenProvider")
            .field("service_account", &self.service_account)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountTokenProvider {
    /// 新しいプロバイダーを作成
    ///
    /// 秘密鍵はここで一度だけ解析する。
    pub fn new(
        client: Client,
        service_account: ServiceAccountKey,
        policy: TokenCachePolicy,
    ) -> Result<Self, AccessTokenError> {
        let encoding_key = EncodingKey::from_rsa_pem(service_account.private_key.as_bytes())
            .map_err(|e| AccessTokenError::Signing(e.to_string()))?;

        Ok(Self {
            client,
            service_account,
            encoding_key,
            policy,
            cache: Mutex::new(None),
        })
    }

    /// トークン交換用のJWTアサーションに署名
    fn sign_assertion(&self, now: DateTime<Utc>) -> Result<String, AccessTokenError> {
        let iat = now.timestamp();
        let claims = AssertionClaims {
            iss: &self.service_account.client_email,
            scope: FIREBASE_MESSAGING_SCOPE,
            aud: self.service_account.token_uri(),
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        };

        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)
            .map_err(|e| AccessTokenError::Signing(e.to_string()))
    }

    /// トークンエンドポイントでアクセストークンを取得
    async fn exchange(&self) -> Result<CachedAccessToken, AccessTokenError> {
        let now = Utc::now();
        let assertion = self.sign_assertion(now)?;
        let token_uri = self.service_account.token_uri();

        debug!(token_uri = %token_uri, "アクセストークンを交換");

        let response = self
            .client
            .post(token_uri)
            .form(&[
                ("grant_type", JWT_BEARER_GRANT_TYPE),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "トークン交換リクエスト失敗");
                AccessTokenError::NetworkError(describe_request_error(&e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "トークン交換エラー");
            return Err(AccessTokenError::HttpError {
                status: status.as_u16(),
                message: error_message_from_body(&body),
            });
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| AccessTokenError::InvalidResponse(e.to_string()))?;

        let token = token_response
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                AccessTokenError::InvalidResponse("Failed to retrieve access token.".to_string())
            })?;
        let expires_in = token_response.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);

        info!(expires_in = expires_in, "アクセストークンを取得");

        Ok(CachedAccessToken {
            token,
            expiry: now + Duration::seconds(expires_in),
        })
    }
}

#[async_trait]
impl AccessTokenProvider for ServiceAccountTokenProvider {
    async fn access_token(&self) -> Result<String, AccessTokenError> {
        match self.policy {
            TokenCachePolicy::PerRequest => Ok(self.exchange().await?.token),
            TokenCachePolicy::UntilNearExpiry => {
                // 交換中はロックを保持し、同時の二重交換を防ぐ
                let mut cache = self.cache.lock().await;

                if let Some(cached) = cache.as_ref() {
                    if !cached.is_expired(Utc::now()) {
                        return Ok(cached.token.clone());
                    }
                    debug!("キャッシュ済みアクセストークンが期限切れ間近");
                }

                let fresh = self.exchange().await?;
                let token = fresh.token.clone();
                *cache = Some(fresh);
                Ok(token)
            }
        }
    }
}
