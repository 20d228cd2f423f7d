pub mod error;
mod heartbeat;
pub mod local;
pub mod scanner;
pub mod session;

#[cfg(test)]
mod fake;

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use tokio::sync::Mutex;
use uuid::Uuid;

use swingbridge_domain::peripheral::{Advertisement, PeripheralHandle};
use swingbridge_domain::profile::ServiceInfo;
use swingbridge_domain::protocol::RawNotification;

pub use error::{BackendError, ConnectError, ScanError, SessionError, SubscribeError};
pub use session::Session;

pub type NotificationStream = Pin<Box<dyn Stream<Item = RawNotification> + Send>>;

/// The local radio: scanning and opening links.
#[async_trait]
pub trait Central: Send + Sync + 'static {
    type Link: Link;

    async fn start_scan(&self) -> Result<(), BackendError>;
    async fn stop_scan(&self) -> Result<(), BackendError>;
    /// Everything heard since the scan started.
    async fn advertisements(&self) -> Result<Vec<Advertisement>, BackendError>;
    async fn connect(&self, handle: &PeripheralHandle) -> Result<Self::Link, BackendError>;
}

/// An open connection to one peripheral.
#[async_trait]
pub trait Link: Send + Sync + 'static {
    async fn discover_services(&self) -> Result<Vec<ServiceInfo>, BackendError>;
    async fn subscribe(&self, characteristic: Uuid) -> Result<(), BackendError>;
    async fn unsubscribe(&self, characteristic: Uuid) -> Result<(), BackendError>;
    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>, BackendError>;
    async fn write(
        &self,
        characteristic: Uuid,
        data: &[u8],
        with_response: bool,
    ) -> Result<(), BackendError>;
    async fn notifications(&self) -> Result<NotificationStream, BackendError>;
    async fn disconnect(&self) -> Result<(), BackendError>;
}

/// A central shared by several sessions.
///
/// The radio lock serialises scans and connects: a scan never waits for it,
/// a connect does.
pub struct SharedCentral<C> {
    central: Arc<C>,
    radio: Arc<Mutex<()>>,
}

impl<C> SharedCentral<C> {
    pub fn new(central: C) -> Self {
        Self {
            central: Arc::new(central),
            radio: Arc::new(Mutex::new(())),
        }
    }

    pub fn central(&self) -> &C {
        &self.central
    }
}

impl<C> Clone for SharedCentral<C> {
    fn clone(&self) -> Self {
        Self {
            central: self.central.clone(),
            radio: self.radio.clone(),
        }
    }
}
