// FCM HTTP v1 送信
//
// 1件のPushMessageを messages:send へPOSTする。
// 失敗してもリトライしない（at-most-once）。

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::{error, info, instrument};

use super::access_token::{AccessTokenError, AccessTokenProvider};
use super::config::FcmConfig;
use crate::domain::PushMessage;
use crate::infrastructure::http_client::{describe_request_error, error_message_from_body};

/// プッシュ送信のエラー型
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PushGatewayError {
    /// アクセストークン取得の失敗
    #[error("Failed to obtain access token: {0}")]
    Auth(#[from] AccessTokenError),

    /// FCMが非2xxを返した
    #[error("FCM send failed (status {status}): {message}")]
    HttpError { status: u16, message: String },

    /// ネットワークエラー
    #[error("Network error: {0}")]
    NetworkError(String),
}

/// プッシュ送信トレイト
#[async_trait]
pub trait PushGateway: Send + Sync {
    /// メッセージを1件送信
    async fn send(&self, message: &PushMessage) -> Result<(), PushGatewayError>;
}

/// FCM HTTP v1 API を使用した送信
pub struct FcmPushGateway<T: AccessTokenProvider> {
    client: Client,
    send_url: String,
    token_provider: T,
}

impl<T: AccessTokenProvider> std::fmt::Debug for FcmPushGateway<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FcmPushGateway")
            .field("send_url", &self.send_url)
            .finish_non_exhaustive()
    }
}

impl<T: AccessTokenProvider> FcmPushGateway<T> {
    /// 新しい送信ゲートウェイを作成
    pub fn new(client: Client, config: &FcmConfig, token_provider: T) -> Self {
        Self {
            client,
            send_url: config.send_url(),
            token_provider,
        }
    }
}

#[async_trait]
impl<T: AccessTokenProvider> PushGateway for FcmPushGateway<T> {
    #[instrument(skip_all, fields(notification_id = %message.message.data.notification_id))]
    async fn send(&self, message: &PushMessage) -> Result<(), PushGatewayError> {
        let access_token = self.token_provider.access_token().await?;

        let response = self
            .client
            .post(&self.send_url)
            .bearer_auth(&access_token)
            .json(message)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "FCM送信リクエスト失敗");
                PushGatewayError::NetworkError(describe_request_error(&e))
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            error!(status = %status, body = %body, "FCM送信エラー");
            return Err(PushGatewayError::HttpError {
                status: status.as_u16(),
                message: error_message_from_body(&body),
            });
        }

        info!(response = %body, "FCM送信成功");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::NotificationRecord;
    use crate::infrastructure::auth_admin::tests::CallLog;
    use crate::infrastructure::fcm::access_token::tests::{
        StaticTokenProvider, test_service_account,
    };
    use crate::infrastructure::fcm::access_token::TokenCachePolicy;
    use crate::infrastructure::test_server::{self, Recorder, respond_with};
    use axum::Router;
    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use tokio::sync::Semaphore;

    // ==================== テスト用モック ====================

    /// PushGatewayのモック
    #[derive(Debug, Clone)]
    pub struct MockPushGateway {
        sent: Arc<Mutex<Vec<PushMessage>>>,
        error: Arc<Mutex<Option<PushGatewayError>>>,
        gate: Arc<Mutex<Option<Arc<Semaphore>>>>,
        calls: CallLog,
    }

    impl MockPushGateway {
        pub fn new(calls: CallLog) -> Self {
            Self {
                sent: Arc::new(Mutex::new(Vec::new())),
                error: Arc::new(Mutex::new(None)),
                gate: Arc::new(Mutex::new(None)),
                calls,
            }
        }

        pub fn fail_with(&self, error: PushGatewayError) {
            *self.error.lock().unwrap() = Some(error);
        }

        /// 返したセマフォに許可が追加されるまで送信を止める
        pub fn hold_sends(&self) -> Arc<Semaphore> {
            let gate = Arc::new(Semaphore::new(0));
            *self.gate.lock().unwrap() = Some(gate.clone());
            gate
        }

        pub fn sent(&self) -> Vec<PushMessage> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PushGateway for MockPushGateway {
        async fn send(&self, message: &PushMessage) -> Result<(), PushGatewayError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("send:{}", message.token()));
            let gate = self.gate.lock().unwrap().clone();
            if let Some(gate) = gate {
                gate.acquire().await.unwrap().forget();
            }
            if let Some(err) = self.error.lock().unwrap().clone() {
                return Err(err);
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    // ==================== HTTP通信テスト ====================

    fn sample_message() -> PushMessage {
        let record = NotificationRecord::from_record(&json!({
            "id": 7,
            "recipient_id": "U2",
            "title": "Hi",
            "message": "Body",
            "type": "invite"
        }))
        .unwrap();
        PushMessage::for_notification("T", &record).unwrap()
    }

    async fn gateway_with(
        recorder: &Recorder,
        status: StatusCode,
        body: &'static str,
        token: Result<String, AccessTokenError>,
    ) -> FcmPushGateway<StaticTokenProvider> {
        let router = Router::new().route(
            "/v1/projects/grocermate-app/messages:send",
            respond_with(recorder, status, body),
        );
        let base = test_server::spawn(router).await;
        let config =
            FcmConfig::new(test_service_account(None), TokenCachePolicy::default()).with_api_base(base);
        FcmPushGateway::new(Client::new(), &config, StaticTokenProvider { result: token })
    }

    #[tokio::test]
    async fn test_send_posts_message() {
        let recorder = Recorder::new();
        let gateway = gateway_with(
            &recorder,
            StatusCode::OK,
            r#"{"name":"projects/grocermate-app/messages/0:123"}"#,
            Ok("ya29.token".to_string()),
        )
        .await;

        gateway.send(&sample_message()).await.unwrap();

        let requests = recorder.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::POST);
        assert_eq!(requests[0].header("authorization"), Some("Bearer ya29.token"));

        let body: serde_json::Value = serde_json::from_str(&requests[0].body).unwrap();
        assert_eq!(
            body,
            json!({
                "message": {
                    "token": "T",
                    "notification": { "title": "Hi", "body": "Body" },
                    "data": { "notification_id": "7", "type": "invite" }
                }
            })
        );
    }

    #[tokio::test]
    async fn test_send_non_success_is_error() {
        let recorder = Recorder::new();
        let gateway = gateway_with(
            &recorder,
            StatusCode::NOT_FOUND,
            r#"{"error":{"code":404,"message":"Requested entity was not found.","status":"NOT_FOUND"}}"#,
            Ok("ya29.token".to_string()),
        )
        .await;

        assert_eq!(
            gateway.send(&sample_message()).await,
            Err(PushGatewayError::HttpError {
                status: 404,
                message: "Requested entity was not found.".to_string()
            })
        );
        // リトライしない
        assert_eq!(recorder.count(), 1);
    }

    #[tokio::test]
    async fn test_send_token_failure_skips_request() {
        let recorder = Recorder::new();
        let gateway = gateway_with(
            &recorder,
            StatusCode::OK,
            "{}",
            Err(AccessTokenError::InvalidResponse(
                "Failed to retrieve access token.".to_string(),
            )),
        )
        .await;

        assert!(matches!(
            gateway.send(&sample_message()).await,
            Err(PushGatewayError::Auth(_))
        ));
        assert_eq!(recorder.count(), 0);
    }
}
