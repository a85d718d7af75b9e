// Supabase Realtime（Phoenixチャンネル）による変更イベント購読

mod channel;
mod config;
mod protocol;

pub use channel::{
    ChangeFeed, ChannelTimings, HEARTBEAT_INTERVAL_SECS, JOIN_TIMEOUT_SECS, RealtimeChannel,
    RealtimeError,
};
pub use config::{
    DEFAULT_CHANNEL, DEFAULT_EVENT, DEFAULT_SCHEMA, DEFAULT_TABLE, REALTIME_CHANNEL_ENV,
    REALTIME_EVENT_ENV, REALTIME_SCHEMA_ENV, REALTIME_TABLE_ENV, RealtimeConfigError,
    RealtimeSubscriptionConfig,
};
pub use protocol::{PhoenixMessage, ServerEvent};

#[cfg(test)]
pub(crate) use channel::tests::MockChangeFeed;
