// Realtimeチャンネル購読
//
// WebSocketで接続し、phx_joinの応答を待ってから変更イベントを1件ずつ返す。
// 25秒ごとにハートビートを送り、Pingには手動でPongを返す。
// 前回のハートビートに応答が無いまま次の送信時刻になった場合は接続断とみなす。
// 切断・チャンネルエラーはERRORとして終了し、再接続はしない。

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, warn};
use url::Url;

use super::config::RealtimeSubscriptionConfig;
use super::protocol::{PHOENIX_TOPIC, PhoenixMessage, ServerEvent, reply_reason};
use crate::domain::{ChangeEvent, InvalidTransition, SubscriptionState};

/// ハートビート間隔（秒）
pub const HEARTBEAT_INTERVAL_SECS: u64 = 25;

/// phx_join応答の待ち時間（秒）
pub const JOIN_TIMEOUT_SECS: u64 = 10;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Realtime購読のエラー型
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RealtimeError {
    /// WebSocket接続の失敗
    #[error("WebSocket connection failed: {0}")]
    Connect(String),

    /// phx_joinがエラー応答を受けた
    #[error("Channel join rejected: {0}")]
    JoinRejected(String),

    /// phx_joinの応答が来ない
    #[error("Channel join timed out after {0:?}")]
    JoinTimeout(Duration),

    /// サーバーからのphx_error
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// サーバーからのphx_close
    #[error("Channel closed by server")]
    ChannelClosed,

    /// WebSocketが閉じられた
    #[error("WebSocket connection closed")]
    ConnectionClosed,

    /// ハートビートに応答が無い（接続が半開きのまま）
    #[error("Heartbeat {0} was not acknowledged")]
    HeartbeatTimeout(String),

    /// 送受信エラー
    #[error("WebSocket transport error: {0}")]
    Transport(String),

    /// 送信メッセージのシリアライズ失敗
    #[error("Failed to encode message: {0}")]
    Encode(String),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
}

/// 変更イベントの供給元
///
/// 本番はRealtimeChannel、テストではモックを使う。
#[async_trait]
pub trait ChangeFeed: Send {
    /// 次の変更イベントを待つ
    ///
    /// # 戻り値
    /// * `Ok(Some(event))` - 変更イベント
    /// * `Ok(None)` - 購読が終了済み
    /// * `Err(e)` - 購読がエラーで終了した
    async fn next_change(&mut self) -> Result<Option<ChangeEvent>, RealtimeError>;

    /// 購読を終了（CLOSED）
    async fn close(&mut self);

    /// 現在の購読状態
    fn state(&self) -> SubscriptionState;
}

/// チャンネルのタイミング設定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelTimings {
    pub heartbeat_interval: Duration,
    pub join_timeout: Duration,
}

impl Default for ChannelTimings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(HEARTBEAT_INTERVAL_SECS),
            join_timeout: Duration::from_secs(JOIN_TIMEOUT_SECS),
        }
    }
}

/// Realtimeチャンネルの購読
pub struct RealtimeChannel {
    write: SplitSink<WsStream, Message>,
    read: SplitStream<WsStream>,
    topic: String,
    join_ref: String,
    next_ref: u64,
    heartbeat: Interval,
    /// 応答待ちのハートビートのref
    pending_heartbeat: Option<String>,
    state: SubscriptionState,
}

impl std::fmt::Debug for RealtimeChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeChannel")
            .field("topic", &self.topic)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl RealtimeChannel {
    /// 接続してチャンネルに参加する（既定のタイミング）
    pub async fn subscribe(
        url: &Url,
        access_token: &str,
        config: &RealtimeSubscriptionConfig,
    ) -> Result<Self, RealtimeError> {
        Self::subscribe_with(url, access_token, config, ChannelTimings::default()).await
    }

    /// 接続してチャンネルに参加する
    ///
    /// INIT → SUBSCRIBING → SUBSCRIBED。参加に失敗した場合はERRORを経てErrを返す。
    pub async fn subscribe_with(
        url: &Url,
        access_token: &str,
        config: &RealtimeSubscriptionConfig,
        timings: ChannelTimings,
    ) -> Result<Self, RealtimeError> {
        let topic = config.topic();
        let state = SubscriptionState::Init.transition(SubscriptionState::Subscribing)?;
        info!(topic = %topic, state = %state, "Realtimeに接続");

        let (ws_stream, _) = connect_async(url.as_str()).await.map_err(|e| {
            error!(topic = %topic, state = %SubscriptionState::Error, error = %e, "WebSocket接続失敗");
            RealtimeError::Connect(e.to_string())
        })?;

        let (write, read) = ws_stream.split();

        let period = timings.heartbeat_interval;
        let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut channel = Self {
            write,
            read,
            topic,
            join_ref: String::new(),
            next_ref: 1,
            heartbeat,
            pending_heartbeat: None,
            state,
        };

        channel.join(access_token, config, timings.join_timeout).await?;
        Ok(channel)
    }

    /// 参加中のトピック
    pub fn topic(&self) -> &str {
        &self.topic
    }

    fn make_ref(&mut self) -> String {
        let msg_ref = self.next_ref.to_string();
        self.next_ref += 1;
        msg_ref
    }

    async fn send(&mut self, message: &PhoenixMessage) -> Result<(), RealtimeError> {
        let text = message
            .to_text()
            .map_err(|e| RealtimeError::Encode(e.to_string()))?;
        self.write
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| RealtimeError::Transport(e.to_string()))
    }

    fn set_state(&mut self, to: SubscriptionState) {
        match self.state.transition(to) {
            Ok(next) => {
                info!(topic = %self.topic, from = %self.state, to = %next, "購読状態を更新");
                self.state = next;
            }
            Err(e) => warn!(topic = %self.topic, error = %e, "無効な状態遷移を無視"),
        }
    }

    /// ERRORへ遷移してエラーを返す
    fn fail(&mut self, err: RealtimeError) -> RealtimeError {
        error!(topic = %self.topic, error = %err, "購読エラー");
        self.set_state(SubscriptionState::Error);
        err
    }

    async fn join(
        &mut self,
        access_token: &str,
        config: &RealtimeSubscriptionConfig,
        join_timeout: Duration,
    ) -> Result<(), RealtimeError> {
        self.join_ref = self.make_ref();
        let message = PhoenixMessage::join(config, access_token, &self.join_ref);
        if let Err(e) = self.send(&message).await {
            return Err(self.fail(e));
        }
        debug!(topic = %self.topic, join_ref = %self.join_ref, "phx_joinを送信");

        match tokio::time::timeout(join_timeout, self.await_join_reply()).await {
            Ok(Ok(())) => {
                self.set_state(SubscriptionState::Subscribed);
                Ok(())
            }
            Ok(Err(e)) => Err(self.fail(e)),
            Err(_) => Err(self.fail(RealtimeError::JoinTimeout(join_timeout))),
        }
    }

    /// join_refに一致するphx_replyまで読み進める
    async fn await_join_reply(&mut self) -> Result<(), RealtimeError> {
        loop {
            let text = match self.read.next().await {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Ping(data))) => {
                    self.write
                        .send(Message::Pong(data))
                        .await
                        .map_err(|e| RealtimeError::Transport(e.to_string()))?;
                    continue;
                }
                Some(Ok(Message::Close(_))) | None => return Err(RealtimeError::ConnectionClosed),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(RealtimeError::Transport(e.to_string())),
            };

            match ServerEvent::decode(text.as_str()) {
                Ok(ServerEvent::Reply {
                    msg_ref,
                    status,
                    response,
                    ..
                }) if msg_ref.as_deref() == Some(self.join_ref.as_str()) => {
                    if status == "ok" {
                        return Ok(());
                    }
                    return Err(RealtimeError::JoinRejected(reply_reason(&response)));
                }
                Ok(ServerEvent::ChannelError(payload)) => {
                    return Err(RealtimeError::ChannelError(payload.to_string()));
                }
                Ok(ServerEvent::ChannelClosed) => return Err(RealtimeError::ChannelClosed),
                Ok(other) => debug!(event = ?other, "参加応答待ちのため無視"),
                Err(e) => warn!(error = %e, "メッセージの解析に失敗"),
            }
        }
    }

    async fn send_heartbeat(&mut self) -> Result<(), RealtimeError> {
        if let Some(unacked) = self.pending_heartbeat.take() {
            return Err(RealtimeError::HeartbeatTimeout(unacked));
        }

        let msg_ref = self.make_ref();
        debug!(msg_ref = %msg_ref, "ハートビート送信");
        self.send(&PhoenixMessage::heartbeat(&msg_ref)).await?;
        self.pending_heartbeat = Some(msg_ref);
        Ok(())
    }

    /// 1フレームを処理し、変更イベントなら返す
    async fn handle_frame(
        &mut self,
        frame: Option<Result<Message, tokio_tungstenite::tungstenite::Error>>,
    ) -> Result<Option<ChangeEvent>, RealtimeError> {
        let text = match frame {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Ping(data))) => {
                self.write
                    .send(Message::Pong(data))
                    .await
                    .map_err(|e| RealtimeError::Transport(e.to_string()))?;
                return Ok(None);
            }
            Some(Ok(Message::Close(frame))) => {
                info!(frame = ?frame, "サーバーがWebSocketを閉じた");
                return Err(RealtimeError::ConnectionClosed);
            }
            Some(Ok(_)) => return Ok(None),
            Some(Err(e)) => return Err(RealtimeError::Transport(e.to_string())),
            None => return Err(RealtimeError::ConnectionClosed),
        };

        match ServerEvent::decode(text.as_str()) {
            Ok(ServerEvent::PostgresChanges(event)) => {
                debug!(
                    change_type = event.change_type.as_str(),
                    table = %event.table,
                    "変更イベント受信"
                );
                Ok(Some(event))
            }
            Ok(ServerEvent::System(payload)) => {
                info!(topic = %self.topic, payload = %payload, "Realtimeシステムメッセージ");
                Ok(None)
            }
            Ok(ServerEvent::Reply {
                topic,
                msg_ref,
                status,
                ..
            }) => {
                if topic == PHOENIX_TOPIC
                    && msg_ref.is_some()
                    && msg_ref == self.pending_heartbeat
                {
                    debug!(msg_ref = ?msg_ref, status = %status, "ハートビート応答受信");
                    self.pending_heartbeat = None;
                } else {
                    debug!(topic = %topic, status = %status, "応答受信");
                }
                Ok(None)
            }
            Ok(ServerEvent::ChannelError(payload)) => {
                Err(RealtimeError::ChannelError(payload.to_string()))
            }
            Ok(ServerEvent::ChannelClosed) => Err(RealtimeError::ChannelClosed),
            Ok(ServerEvent::Ignored(event)) => {
                debug!(event = %event, "未対応イベントを無視");
                Ok(None)
            }
            Err(e) => {
                warn!(error = %e, "メッセージの解析に失敗");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl ChangeFeed for RealtimeChannel {
    async fn next_change(&mut self) -> Result<Option<ChangeEvent>, RealtimeError> {
        loop {
            if self.state.is_terminal() {
                return Ok(None);
            }

            // 受信済みのフレーム（ハートビート応答を含む）を先に処理する
            tokio::select! {
                biased;

                frame = self.read.next() => {
                    match self.handle_frame(frame).await {
                        Ok(Some(event)) => return Ok(Some(event)),
                        Ok(None) => {}
                        Err(e) => return Err(self.fail(e)),
                    }
                }
                _ = self.heartbeat.tick() => {
                    if let Err(e) = self.send_heartbeat().await {
                        return Err(self.fail(e));
                    }
                }
            }
        }
    }

    async fn close(&mut self) {
        if self.state.is_terminal() {
            return;
        }

        let msg_ref = self.make_ref();
        let leave = PhoenixMessage::leave(&self.topic, &msg_ref, &self.join_ref);
        if let Err(e) = self.send(&leave).await {
            warn!(error = %e, "phx_leaveの送信に失敗");
        }
        if let Err(e) = self.write.close().await {
            debug!(error = %e, "WebSocketのクローズに失敗");
        }

        self.set_state(SubscriptionState::Closed);
    }

    fn state(&self) -> SubscriptionState {
        self.state
    }
}
