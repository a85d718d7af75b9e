// 通知転送タスク
//
// 変更イベントの購読をtokioタスクとして実行し、1件ずつ順番に転送する。
// 送信は別タスクで行い、送信中も購読（ハートビートを含む）を止めない。
// watchチャンネルでシャットダウンを受け取り、購読をCLOSEDにして終了する。
// シャットダウン時は受信済みの通知を送り切ってから報告を返す。

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, warn};

use super::notification_forwarder::NotificationForwarder;
use crate::domain::{ChangeEvent, SubscriptionState};
use crate::infrastructure::{ChangeFeed, ProfileRepository, PushGateway, RealtimeError};

/// 実行中の転送件数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwarderStats {
    /// 送信に成功した件数
    pub forwarded: u64,
    /// 破棄した件数（不正ペイロード・トークン無し・送信失敗）
    pub dropped: u64,
}

/// タスクの終了理由
#[derive(Debug, Clone, PartialEq)]
pub enum ForwarderExit {
    /// シャットダウン要求による終了
    Shutdown,
    /// 購読が正常に終わった
    FeedEnded,
    /// 購読がエラーで終わった（再接続はしない）
    FeedFailed(RealtimeError),
    /// 送信タスクが異常終了した
    WorkerStopped,
}

/// タスク終了時の報告
#[derive(Debug, Clone, PartialEq)]
pub struct ForwarderReport {
    pub exit: ForwarderExit,
    pub stats: ForwarderStats,
    pub final_state: SubscriptionState,
}

impl ForwarderReport {
    /// エラー終了かどうか
    pub fn is_error(&self) -> bool {
        matches!(
            self.exit,
            ForwarderExit::FeedFailed(_) | ForwarderExit::WorkerStopped
        )
    }
}

/// シャットダウン要求の送信側
///
/// シグナルハンドラー等に渡せるよう複製できる。
#[derive(Debug, Clone)]
pub struct ShutdownTrigger(Arc<watch::Sender<bool>>);

impl ShutdownTrigger {
    /// シャットダウンを要求（複数回呼んでもよい）
    pub fn trigger(&self) {
        self.0.send_replace(true);
    }
}

/// 実行中の転送タスク
#[derive(Debug)]
pub struct ForwarderHandle {
    shutdown: ShutdownTrigger,
    join: JoinHandle<ForwarderReport>,
}

impl ForwarderHandle {
    /// シャットダウン要求の送信側を取得
    pub fn shutdown_trigger(&self) -> ShutdownTrigger {
        self.shutdown.clone()
    }

    /// シャットダウンを要求し、終了を待つ
    pub async fn shutdown(self) -> Result<ForwarderReport, JoinError> {
        self.shutdown.trigger();
        self.wait().await
    }

    /// タスクの終了を待つ
    pub async fn wait(self) -> Result<ForwarderReport, JoinError> {
        let ForwarderHandle { shutdown, join } = self;
        let report = join.await;
        // 送信側を待機中に破棄しないよう、ここまで保持する
        drop(shutdown);
        report
    }
}

/// 通知転送タスク
pub struct ForwarderTask;

impl ForwarderTask {
    /// 購読と転送ハンドラーからタスクを起動
    pub fn spawn<F, P, G>(feed: F, forwarder: NotificationForwarder<P, G>) -> ForwarderHandle
    where
        F: ChangeFeed + 'static,
        P: ProfileRepository + 'static,
        G: PushGateway + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(run(feed, forwarder, shutdown_rx));

        ForwarderHandle {
            shutdown: ShutdownTrigger(Arc::new(shutdown_tx)),
            join,
        }
    }
}

async fn run<F, P, G>(
    mut feed: F,
    forwarder: NotificationForwarder<P, G>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> ForwarderReport
where
    F: ChangeFeed,
    P: ProfileRepository + 'static,
    G: PushGateway + 'static,
{
    info!(state = %feed.state(), "通知転送を開始");

    // 通知量は少ないため上限は設けない
    let (queue_tx, queue_rx) = mpsc::unbounded_channel();
    let worker = tokio::spawn(forward_queued(forwarder, queue_rx));

    let exit = loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.changed() => {
                info!("シャットダウン要求を受信");
                feed.close().await;
                break ForwarderExit::Shutdown;
            }
            next = feed.next_change() => match next {
                Ok(Some(event)) => {
                    if queue_tx.send(event).is_err() {
                        error!("送信タスクが停止したため購読を終了");
                        feed.close().await;
                        break ForwarderExit::WorkerStopped;
                    }
                }
                Ok(None) => {
                    warn!("購読が終了");
                    break ForwarderExit::FeedEnded;
                }
                Err(e) => {
                    error!(error = %e, "購読エラーにより通知転送を停止");
                    break ForwarderExit::FeedFailed(e);
                }
            }
        }
    };

    // 送信側を閉じ、キューに残った通知を送り切るのを待つ
    drop(queue_tx);
    let (exit, stats) = match worker.await {
        Ok(stats) => (exit, stats),
        Err(e) => {
            error!(error = %e, "送信タスクが異常終了");
            (ForwarderExit::WorkerStopped, ForwarderStats::default())
        }
    };

    let report = ForwarderReport {
        exit,
        stats,
        final_state: feed.state(),
    };

    info!(
        forwarded = report.stats.forwarded,
        dropped = report.stats.dropped,
        state = %report.final_state,
        "通知転送を終了"
    );

    report
}

/// キューの通知を到着順に1件ずつ転送する
async fn forward_queued<P, G>(
    forwarder: NotificationForwarder<P, G>,
    mut queue_rx: mpsc::UnboundedReceiver<ChangeEvent>,
) -> ForwarderStats
where
    P: ProfileRepository,
    G: PushGateway,
{
    let mut stats = ForwarderStats::default();

    while let Some(event) = queue_rx.recv().await {
        match forwarder.forward(&event).await {
            Ok(_) => stats.forwarded += 1,
            Err(e) => {
                error!(error = %e, "通知を破棄");
                stats.dropped += 1;
            }
        }
    }

    stats
}
