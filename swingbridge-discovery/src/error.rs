use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use swingbridge_domain::profile::MissingEndpoint;
use swingbridge_domain::protocol::AuthError;
use swingbridge_domain::state::{ConnectionState, TransitionError};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("no Bluetooth adapters found")]
    NoAdapter,
    #[error("peripheral {0} is not known to the adapter")]
    UnknownPeripheral(String),
    #[error("characteristic {0} was not discovered")]
    UnknownCharacteristic(Uuid),
    #[error(transparent)]
    Btleplug(#[from] btleplug::Error),
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("a scan is already running on this adapter")]
    AlreadyScanning,
    #[error("no matching device within {0:?}")]
    NotFound(Duration),
    #[error("scan cancelled")]
    Cancelled,
    #[error("cannot scan while {0}")]
    InvalidState(ConnectionState),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("a connection is already {0}")]
    AlreadyActive(ConnectionState),
    #[error("cannot connect while {0}")]
    InvalidState(ConnectionState),
    #[error("service {0} not found")]
    ServiceNotFound(Uuid),
    #[error("characteristic {uuid} not found")]
    CharacteristicNotFound { uuid: Uuid },
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl From<MissingEndpoint> for ConnectError {
    fn from(missing: MissingEndpoint) -> Self {
        match missing {
            MissingEndpoint::Service(uuid) => ConnectError::ServiceNotFound(uuid),
            MissingEndpoint::Characteristic(uuid) => ConnectError::CharacteristicNotFound { uuid },
        }
    }
}

#[derive(Debug, Error)]
pub enum SubscribeError {
    #[error("cannot subscribe while {0}")]
    InvalidState(ConnectionState),
    #[error("subscribing to {characteristic} failed after {attempts} attempts: {source}")]
    Exhausted {
        characteristic: Uuid,
        attempts: u32,
        source: BackendError,
    },
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("scan: {0}")]
    Scan(#[from] ScanError),
    #[error("connect: {0}")]
    Connect(#[from] ConnectError),
    #[error("subscribe: {0}")]
    Subscribe(#[from] SubscribeError),
    #[error("authenticate: {0}")]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}
