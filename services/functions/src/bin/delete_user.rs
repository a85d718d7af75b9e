/// アカウント削除HTTP Lambdaエントリポイント
///
/// Lambda Function URL経由のHTTPリクエストを処理し、
/// 呼び出し元のプロファイル行と認証レコードを削除する。
use std::sync::Arc;

use functions::application::DeleteUserHandler;
use functions::infrastructure::{
    PostgrestProfileRepository, SupabaseAuthAdmin, SupabaseConfig, build_http_client,
    init_logging,
};
use lambda_http::{Body, Error, Request, Response, run, service_fn};
use tracing::info;

type Handler = DeleteUserHandler<SupabaseAuthAdmin, PostgrestProfileRepository>;

#[tokio::main]
async fn main() -> Result<(), Error> {
    // 構造化ログを初期化
    init_logging();

    info!("アカウント削除Lambda関数を初期化");

    // 設定が無ければ起動時に失敗させる
    let config = SupabaseConfig::from_env()?;
    let handler = Arc::new(build_handler(config)?);

    run(service_fn(move |request: Request| {
        let handler = Arc::clone(&handler);
        async move { Ok::<Response<Body>, Error>(handler.handle(request).await) }
    }))
    .await
}

/// 設定からハンドラーを構築
///
/// HTTPクライアントは呼び出し間で共有する。
fn build_handler(config: SupabaseConfig) -> Result<Handler, Error> {
    let client = build_http_client()?;

    Ok(DeleteUserHandler::new(
        SupabaseAuthAdmin::new(client.clone(), config.clone()),
        PostgrestProfileRepository::new(client, config),
    ))
}
