// Firebase Cloud Messaging（HTTP v1）
//
// サービスアカウント設定、アクセストークン取得、メッセージ送信。

mod access_token;
mod config;
mod push_gateway;

pub use access_token::{
    AccessTokenError, AccessTokenProvider, FIREBASE_MESSAGING_SCOPE, JWT_BEARER_GRANT_TYPE,
    ServiceAccountTokenProvider, TokenCachePolicy,
};
pub use config::{
    DEFAULT_FCM_API_BASE, DEFAULT_TOKEN_URI, FCM_TOKEN_CACHE_ENV,
    FIREBASE_SERVICE_ACCOUNT_KEY_ENV, FcmConfig, FcmConfigError, ServiceAccountKey,
};
pub use push_gateway::{FcmPushGateway, PushGateway, PushGatewayError};

#[cfg(test)]
pub(crate) use push_gateway::tests::MockPushGateway;
