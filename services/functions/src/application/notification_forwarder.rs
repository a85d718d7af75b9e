// 通知転送ハンドラー
//
// 変更イベント1件を受け取り、受信者のFCMトークンを引いてプッシュ通知を送る。
// 失敗はすべてこのイベント限りで、リトライもデッドレターもしない。

use thiserror::Error;
use tracing::{debug, info};

use crate::domain::{ChangeEvent, NotificationPayloadError, NotificationRecord, PushMessage, UserId};
use crate::infrastructure::{ProfileRepository, PushGateway, PushGatewayError};

/// 通知転送のエラー型
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ForwardError {
    /// ペイロードが不正（recipient_id / id が無い等）
    #[error("Received invalid notification payload: {0}")]
    InvalidPayload(#[from] NotificationPayloadError),

    /// 配信トークンが取得できない
    #[error("{0}")]
    TokenLookup(String),

    /// アクセストークン取得の失敗
    #[error("Error obtaining FCM access token: {0}")]
    GatewayAuth(String),

    /// FCMへの送信失敗
    #[error("FCM send error: {0}")]
    GatewaySend(String),
}

impl From<PushGatewayError> for ForwardError {
    fn from(err: PushGatewayError) -> Self {
        match err {
            PushGatewayError::Auth(e) => ForwardError::GatewayAuth(e.to_string()),
            other => ForwardError::GatewaySend(other.to_string()),
        }
    }
}

/// 転送済み通知
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardedNotification {
    pub recipient_id: UserId,
    pub notification_id: String,
}

/// 通知転送ハンドラー
pub struct NotificationForwarder<P, G>
where
    P: ProfileRepository,
    G: PushGateway,
{
    profile_repo: P,
    push_gateway: G,
}

impl<P, G> NotificationForwarder<P, G>
where
    P: ProfileRepository,
    G: PushGateway,
{
    /// 新しいハンドラーを作成
    pub fn new(profile_repo: P, push_gateway: G) -> Self {
        Self {
            profile_repo,
            push_gateway,
        }
    }

    /// 変更イベントをプッシュ通知として転送
    ///
    /// # 処理フロー
    /// 1. 新しい行からrecipient_idを取り出す（無ければ破棄）
    /// 2. プロファイルからFCMトークンを取得（無ければ破棄）
    /// 3. プッシュメッセージを組み立てる（idが無ければ破棄）
    /// 4. FCMへ送信（アクセストークン取得を含む）
    pub async fn forward(&self, event: &ChangeEvent) -> Result<ForwardedNotification, ForwardError> {
        debug!(
            change_type = event.change_type.as_str(),
            table = %event.table,
            "変更イベントを処理"
        );

        let record = event
            .new_record()
            .ok_or(NotificationPayloadError::MissingRecord)?;
        let notification = NotificationRecord::from_record(record)?;
        let recipient_id = notification.recipient_id()?;

        let token = match self.profile_repo.find_delivery_token(&recipient_id).await {
            Ok(Some(token)) => token,
            Ok(None) => {
                return Err(ForwardError::TokenLookup(format!(
                    "Profile or FCM token not found for recipient {}",
                    recipient_id
                )));
            }
            Err(e) => return Err(ForwardError::TokenLookup(e.to_string())),
        };

        let message = PushMessage::for_notification(&token, &notification)?;
        let notification_id = message.message.data.notification_id.clone();

        self.push_gateway.send(&message).await?;

        info!(
            recipient_id = %recipient_id,
            notification_id = %notification_id,
            "通知を送信"
        );

        Ok(ForwardedNotification {
            recipient_id,
            notification_id,
        })
    }
}
