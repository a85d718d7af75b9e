/// 通知転送エントリポイント（常駐プロセス）
///
/// notificationsテーブルの変更をRealtimeで購読し、
/// 受信者のFCMトークン宛てにプッシュ通知を送る。
/// 購読がエラーで終わった場合は非0で終了し、再起動は実行環境に任せる。
use functions::application::{ForwarderExit, ForwarderTask, NotificationForwarder};
use functions::infrastructure::{
    FcmConfig, FcmPushGateway, PostgrestProfileRepository, RealtimeChannel,
    RealtimeSubscriptionConfig, ServiceAccountTokenProvider, SupabaseConfig, build_http_client,
    init_logging,
};
use tokio::signal;
use tracing::{error, info};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // 構造化ログを初期化
    init_logging();

    info!("通知転送を起動");

    // 設定が無ければ起動時に失敗させる
    let supabase = SupabaseConfig::from_env_with_anon_fallback()?;
    let fcm = FcmConfig::from_env()?;
    let subscription = RealtimeSubscriptionConfig::from_env()?;

    let client = build_http_client()?;
    let token_provider = ServiceAccountTokenProvider::new(
        client.clone(),
        fcm.service_account().clone(),
        fcm.token_cache(),
    )?;
    let forwarder = NotificationForwarder::new(
        PostgrestProfileRepository::new(client.clone(), supabase.clone()),
        FcmPushGateway::new(client, &fcm, token_provider),
    );

    info!(
        table = %subscription.table,
        event = %subscription.event,
        token_cache = ?fcm.token_cache(),
        "変更イベントの購読を開始"
    );

    let url = supabase.realtime_url()?;
    let channel = RealtimeChannel::subscribe(&url, supabase.service_key(), &subscription).await?;
    info!(topic = %channel.topic(), "購読完了、通知を待機");

    let handle = ForwarderTask::spawn(channel, forwarder);

    let trigger = handle.shutdown_trigger();
    tokio::spawn(async move {
        shutdown_signal().await;
        trigger.trigger();
    });

    let report = handle.wait().await?;

    match report.exit {
        ForwarderExit::FeedFailed(e) => {
            error!(error = %e, "購読エラーで終了");
            Err(e.into())
        }
        ForwarderExit::WorkerStopped => {
            error!("送信タスクの異常で終了");
            Err("notification worker stopped".into())
        }
        _ => {
            info!("通知転送が正常に停止しました");
            Ok(())
        }
    }
}

/// SIGINT / SIGTERM を待つ
async fn shutdown_signal() {
    // Ctrl+C (SIGINT) を待機
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Ctrl+C シグナルハンドラーの登録に失敗");
            std::future::pending::<()>().await;
        }
    };

    // SIGTERM を待機 (Unix系OSのみ)
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "SIGTERM シグナルハンドラーの登録に失敗");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Ctrl+C (SIGINT) を受信しました。シャットダウンを開始します");
        }
        _ = terminate => {
            info!("SIGTERM を受信しました。シャットダウンを開始します");
        }
    }
}
