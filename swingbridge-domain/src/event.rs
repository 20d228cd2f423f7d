use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::message::{ConnectionStatus, DecodedMessage};

/// Something a session reports on its event channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub at: DateTime<Utc>,
    pub kind: SessionEventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionEventKind {
    Message(DecodedMessage),
    Status(ConnectionStatus),
    Error(SessionFault),
}

/// Failures that cost the session its link.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionFault {
    #[error("no heartbeat for {missed} consecutive deadlines")]
    HeartbeatLost { missed: u32 },
    #[error("subscribing to {characteristic} failed after {attempts} attempts")]
    SubscribeExhausted { characteristic: Uuid, attempts: u32 },
    #[error("device rejected authentication with code {code}")]
    AuthRejected { code: u8 },
    #[error("device not ready {secs}s after authentication started")]
    BringUpTimeout { secs: u64 },
    #[error("notification stream closed")]
    LinkClosed,
}

impl SessionEvent {
    pub fn now(kind: SessionEventKind) -> Self {
        Self { at: Utc::now(), kind }
    }

    pub fn message(message: DecodedMessage) -> Self {
        Self::now(SessionEventKind::Message(message))
    }

    pub fn status(status: ConnectionStatus) -> Self {
        Self::now(SessionEventKind::Status(status))
    }

    pub fn error(fault: SessionFault) -> Self {
        Self::now(SessionEventKind::Error(fault))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn events_serialise_with_timestamp() {
        let event = SessionEvent::error(SessionFault::HeartbeatLost { missed: 3 });
        let json = serde_json::to_value(&event).unwrap();
        assert!(json["at"].is_string());
        assert_eq!(json["kind"]["Error"]["HeartbeatLost"]["missed"], 3);
        let back: SessionEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
