//! 購読ライフサイクルの状態遷移
//!
//! INIT → SUBSCRIBING → SUBSCRIBED → (ERROR | CLOSED)
//! INIT → SUBSCRIBING → (ERROR | CLOSED)

use std::fmt;
use thiserror::Error;

/// 購読状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// 未接続
    Init,
    /// 接続済み・参加応答待ち
    Subscribing,
    /// 参加完了、変更イベント受信中
    Subscribed,
    /// エラー終了（自動再接続はしない）
    Error,
    /// シャットダウンによる正常終了
    Closed,
}

/// 許可されていない状態遷移
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid subscription transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: SubscriptionState,
    pub to: SubscriptionState,
}

impl SubscriptionState {
    /// 次の状態へ遷移
    pub fn transition(self, to: SubscriptionState) -> Result<SubscriptionState, InvalidTransition> {
        use SubscriptionState::*;

        let allowed = matches!(
            (self, to),
            (Init, Subscribing)
                | (Subscribing, Subscribed)
                | (Subscribing, Error)
                | (Subscribing, Closed)
                | (Subscribed, Error)
                | (Subscribed, Closed)
        );

        if allowed {
            Ok(to)
        } else {
            Err(InvalidTransition { from: self, to })
        }
    }

    /// 終端状態かどうか
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubscriptionState::Error | SubscriptionState::Closed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionState::Init => "INIT",
            SubscriptionState::Subscribing => "SUBSCRIBING",
            SubscriptionState::Subscribed => "SUBSCRIBED",
            SubscriptionState::Error => "ERROR",
            SubscriptionState::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::SubscriptionState::*;
    use super::*;

    #[test]
    fn test_normal_lifecycle() {
        let state = Init.transition(Subscribing).unwrap();
        let state = state.transition(Subscribed).unwrap();
        let state = state.transition(Closed).unwrap();
        assert!(state.is_terminal());
    }

    #[test]
    fn test_join_failure_lifecycle() {
        let state = Init.transition(Subscribing).unwrap();
        assert_eq!(state.transition(Error), Ok(Error));
    }

    #[test]
    fn test_cannot_skip_subscribing() {
        assert_eq!(
            Init.transition(Subscribed),
            Err(InvalidTransition { from: Init, to: Subscribed })
        );
    }

    #[test]
    fn test_terminal_states_do_not_reopen() {
        assert!(Error.transition(Subscribing).is_err());
        assert!(Closed.transition(Subscribed).is_err());
        assert!(Error.transition(Closed).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Subscribed.to_string(), "SUBSCRIBED");
        let err = Init.transition(Closed).unwrap_err();
        assert_eq!(err.to_string(), "invalid subscription transition: INIT -> CLOSED");
    }
}
