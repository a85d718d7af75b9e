// アカウント削除ハンドラー
//
// 呼び出し元の認証情報から利用者を解決し、
// プロファイル行 → 認証レコードの順に削除する。
// プロファイル削除の失敗は警告のみで処理を続行し、認証レコード削除の失敗はエラーとする。

use lambda_http::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_ORIGIN, AUTHORIZATION, CONTENT_TYPE,
    HeaderMap, HeaderValue,
};
use lambda_http::http::{Method, StatusCode};
use lambda_http::{Body, Request, Response};
use serde_json::json;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::domain::{BearerToken, UserId};
use crate::infrastructure::{AuthAdminError, IdentityAdmin, ProfileRepository};

/// プリフライトで許可するリクエストヘッダー
pub const ALLOWED_REQUEST_HEADERS: &str = "authorization, x-client-info, apikey";

/// アカウント削除のエラー型
///
/// どちらもHTTP 500として`{"error": メッセージ}`で返す。
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DeleteUserError {
    /// 認証情報が無い・不正・未知（削除は一切行わない）
    #[error("{0}")]
    AuthResolution(String),

    /// 認証レコードの削除に失敗（プロファイルは削除済みの可能性がある）
    #[error("{0}")]
    IdentityDelete(String),
}

impl From<AuthAdminError> for DeleteUserError {
    fn from(err: AuthAdminError) -> Self {
        match err {
            AuthAdminError::HttpError { message, .. } => DeleteUserError::IdentityDelete(message),
            other => DeleteUserError::IdentityDelete(other.to_string()),
        }
    }
}

/// 削除結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteUserOutcome {
    pub user_id: UserId,
    /// プロファイル行の削除に成功したか
    pub profile_deleted: bool,
}

impl DeleteUserOutcome {
    /// 成功レスポンスのメッセージ
    pub fn message(&self) -> String {
        format!("User {} and profile deleted.", self.user_id)
    }
}

/// アカウント削除ハンドラー
pub struct DeleteUserHandler<A, P>
where
    A: IdentityAdmin,
    P: ProfileRepository,
{
    identity_admin: A,
    profile_repo: P,
}

impl<A, P> DeleteUserHandler<A, P>
where
    A: IdentityAdmin,
    P: ProfileRepository,
{
    /// 新しいハンドラーを作成
    pub fn new(identity_admin: A, profile_repo: P) -> Self {
        Self {
            identity_admin,
            profile_repo,
        }
    }

    /// アカウントを削除
    ///
    /// # 処理フロー
    /// 1. Authorizationヘッダーからトークンを取り出す
    /// 2. 認証プロバイダーで利用者IDを解決
    /// 3. プロファイル行を削除（失敗しても続行）
    /// 4. 認証レコードを削除
    pub async fn delete_user(
        &self,
        authorization: Option<&str>,
    ) -> Result<DeleteUserOutcome, DeleteUserError> {
        let token = BearerToken::from_authorization_header(authorization)
            .map_err(|e| DeleteUserError::AuthResolution(e.to_string()))?;

        let user_id = self
            .identity_admin
            .resolve_user(&token)
            .await
            .map_err(|e| DeleteUserError::AuthResolution(e.to_string()))?;

        info!(user_id = %user_id, "アカウント削除を開始");

        let profile_deleted = match self.profile_repo.delete_profile(&user_id).await {
            Ok(()) => true,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "プロファイルを削除できなかった（続行）");
                false
            }
        };

        self.identity_admin.delete_user(&user_id).await?;

        info!(
            user_id = %user_id,
            profile_deleted = profile_deleted,
            "アカウント削除完了"
        );

        Ok(DeleteUserOutcome {
            user_id,
            profile_deleted,
        })
    }

    /// HTTPリクエストを処理してレスポンスを生成
    ///
    /// - OPTIONS: 200 `ok`（CORSプリフライト、バックエンド呼び出しなし）
    /// - それ以外: 200 `{"message"}` または 500 `{"error"}`
    pub async fn handle(&self, request: Request) -> Response<Body> {
        if request.method() == Method::OPTIONS {
            return Self::preflight_response();
        }

        let authorization = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok());

        match self.delete_user(authorization).await {
            Ok(outcome) => {
                Self::json_response(StatusCode::OK, json!({ "message": outcome.message() }))
            }
            Err(e) => {
                error!(error = %e, "アカウント削除エラー");
                Self::json_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": e.to_string() }),
                )
            }
        }
    }

    /// CORSプリフライトへの応答
    pub fn preflight_response() -> Response<Body> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        headers.insert(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOWED_REQUEST_HEADERS),
        );

        let mut response = Response::new(Body::Text("ok".to_string()));
        *response.headers_mut() = headers;
        response
    }

    fn json_response(status: StatusCode, body: serde_json::Value) -> Response<Body> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));

        let mut response = Response::new(Body::Text(body.to_string()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}
