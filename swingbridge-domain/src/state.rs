use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle of one device session.
///
/// The forward path is strictly ordered:
///
/// ```text
/// Idle -> Scanning -> Connecting -> DiscoveringServices
///      -> SubscribingNotifications -> Authenticating -> Ready
///      -> Disconnecting -> Idle
/// ```
///
/// Any state other than `Idle` may also abort to `Disconnecting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    Idle,
    Scanning,
    Connecting,
    DiscoveringServices,
    SubscribingNotifications,
    Authenticating,
    Ready,
    Disconnecting,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid transition {from:?} -> {to:?}")]
pub struct TransitionError {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

impl ConnectionState {
    /// The state that follows `self` on the forward path.
    pub fn next(self) -> ConnectionState {
        use ConnectionState::*;
        match self {
            Idle => Scanning,
            Scanning => Connecting,
            Connecting => DiscoveringServices,
            DiscoveringServices => SubscribingNotifications,
            SubscribingNotifications => Authenticating,
            Authenticating => Ready,
            Ready => Disconnecting,
            Disconnecting => Idle,
        }
    }

    pub fn can_transition_to(self, to: ConnectionState) -> bool {
        to == self.next() || (to == ConnectionState::Disconnecting && self != ConnectionState::Idle)
    }

    pub fn transition(self, to: ConnectionState) -> Result<ConnectionState, TransitionError> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(TransitionError { from: self, to })
        }
    }

    /// States in which a link is being established or is up.
    pub fn is_active(self) -> bool {
        use ConnectionState::*;
        matches!(
            self,
            Connecting | DiscoveringServices | SubscribingNotifications | Authenticating | Ready
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}
