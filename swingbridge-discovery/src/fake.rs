//! In-memory BLE backend for session tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc;
use tokio::time::{Instant, sleep};
use uuid::Uuid;

use swingbridge_domain::peripheral::{Advertisement, PeripheralHandle};
use swingbridge_domain::profile::{ServiceInfo, mlm2pro, r10};
use swingbridge_domain::protocol::RawNotification;

use crate::{BackendError, Central, Link, NotificationStream};

type Responder = Box<dyn Fn(Uuid, &[u8]) -> Vec<RawNotification> + Send>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    pub characteristic: Uuid,
    pub data: Vec<u8>,
    pub with_response: bool,
}

#[derive(Default)]
struct FakeState {
    advertisements: Vec<Advertisement>,
    scanning: bool,
    services: Vec<ServiceInfo>,
    reads: HashMap<Uuid, Vec<u8>>,
    subscribe_failures: HashMap<Uuid, u32>,
    subscribe_attempts: Vec<(Uuid, Instant)>,
    unsubscribed: Vec<Uuid>,
    writes: Vec<RecordedWrite>,
    connects: u32,
    disconnects: u32,
    connect_delay: Option<Duration>,
    notifier: Option<mpsc::UnboundedSender<RawNotification>>,
    responder: Option<Responder>,
}

#[derive(Clone, Default)]
pub struct FakeCentral {
    state: Arc<Mutex<FakeState>>,
}

pub struct FakeLink {
    state: Arc<Mutex<FakeState>>,
}

fn lock(state: &Mutex<FakeState>) -> MutexGuard<'_, FakeState> {
    state.lock().unwrap()
}

pub fn mlm2pro_services() -> Vec<ServiceInfo> {
    vec![ServiceInfo {
        uuid: mlm2pro::SERVICE,
        characteristics: vec![
            mlm2pro::AUTH_REQUEST,
            mlm2pro::COMMAND,
            mlm2pro::CONFIGURE,
            mlm2pro::EVENTS,
            mlm2pro::HEARTBEAT,
            mlm2pro::MEASUREMENT,
            mlm2pro::WRITE_RESPONSE,
        ],
    }]
}

pub fn r10_services() -> Vec<ServiceInfo> {
    vec![
        ServiceInfo {
            uuid: r10::SERVICE,
            characteristics: vec![r10::NOTIFIER, r10::WRITER],
        },
        ServiceInfo {
            uuid: r10::BATTERY_SERVICE,
            characteristics: vec![r10::BATTERY_LEVEL],
        },
        ServiceInfo {
            uuid: r10::DEVICE_INFO_SERVICE,
            characteristics: vec![r10::MODEL_NUMBER, r10::FIRMWARE_REVISION],
        },
    ]
}

impl FakeCentral {
    pub fn with_services(services: Vec<ServiceInfo>) -> Self {
        let central = Self::default();
        lock(&central.state).services = services;
        central
    }

    pub fn advertise(&self, advertisement: Advertisement) {
        lock(&self.state).advertisements.push(advertisement);
    }

    pub fn set_read(&self, characteristic: Uuid, value: &[u8]) {
        lock(&self.state).reads.insert(characteristic, value.to_vec());
    }

    pub fn fail_subscribe(&self, characteristic: Uuid, times: u32) {
        lock(&self.state).subscribe_failures.insert(characteristic, times);
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        lock(&self.state).connect_delay = Some(delay);
    }

    /// Answers every write with the notifications `responder` returns.
    pub fn respond_with(
        &self,
        responder: impl Fn(Uuid, &[u8]) -> Vec<RawNotification> + Send + 'static,
    ) {
        lock(&self.state).responder = Some(Box::new(responder));
    }

    pub fn notify(&self, characteristic: Uuid, value: &[u8]) {
        let state = lock(&self.state);
        if let Some(notifier) = &state.notifier {
            let _ = notifier.unbounded_send(RawNotification {
                characteristic,
                value: value.to_vec(),
            });
        }
    }

    /// Ends the notification stream as a dropped link would.
    pub fn close_notifications(&self) {
        lock(&self.state).notifier = None;
    }

    pub fn is_scanning(&self) -> bool {
        lock(&self.state).scanning
    }

    pub fn subscribe_attempts(&self, characteristic: Uuid) -> Vec<Instant> {
        lock(&self.state)
            .subscribe_attempts
            .iter()
            .filter(|(c, _)| *c == characteristic)
            .map(|(_, at)| *at)
            .collect()
    }

    pub fn total_subscribe_attempts(&self) -> usize {
        lock(&self.state).subscribe_attempts.len()
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        lock(&self.state).writes.clone()
    }

    pub fn writes_to(&self, characteristic: Uuid) -> Vec<Vec<u8>> {
        self.writes()
            .into_iter()
            .filter(|w| w.characteristic == characteristic)
            .map(|w| w.data)
            .collect()
    }

    pub fn unsubscribed(&self) -> Vec<Uuid> {
        lock(&self.state).unsubscribed.clone()
    }

    pub fn connects(&self) -> u32 {
        lock(&self.state).connects
    }

    pub fn disconnects(&self) -> u32 {
        lock(&self.state).disconnects
    }
}

#[async_trait]
impl Central for FakeCentral {
    type Link = FakeLink;

    async fn start_scan(&self) -> Result<(), BackendError> {
        lock(&self.state).scanning = true;
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), BackendError> {
        lock(&self.state).scanning = false;
        Ok(())
    }

    async fn advertisements(&self) -> Result<Vec<Advertisement>, BackendError> {
        Ok(lock(&self.state).advertisements.clone())
    }

    async fn connect(&self, handle: &PeripheralHandle) -> Result<FakeLink, BackendError> {
        let delay = {
            let mut state = lock(&self.state);
            if !state.advertisements.iter().any(|a| a.id == handle.id) {
                return Err(BackendError::UnknownPeripheral(handle.id.clone()));
            }
            state.connects += 1;
            state.connect_delay
        };
        if let Some(delay) = delay {
            sleep(delay).await;
        }
        Ok(FakeLink {
            state: self.state.clone(),
        })
    }
}

#[async_trait]
impl Link for FakeLink {
    async fn discover_services(&self) -> Result<Vec<ServiceInfo>, BackendError> {
        Ok(lock(&self.state).services.clone())
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<(), BackendError> {
        let mut state = lock(&self.state);
        state.subscribe_attempts.push((characteristic, Instant::now()));
        match state.subscribe_failures.get_mut(&characteristic) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(BackendError::Other(format!("subscribe to {characteristic} refused")))
            }
            _ => Ok(()),
        }
    }

    async fn unsubscribe(&self, characteristic: Uuid) -> Result<(), BackendError> {
        lock(&self.state).unsubscribed.push(characteristic);
        Ok(())
    }

    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>, BackendError> {
        lock(&self.state)
            .reads
            .get(&characteristic)
            .cloned()
            .ok_or(BackendError::UnknownCharacteristic(characteristic))
    }

    async fn write(
        &self,
        characteristic: Uuid,
        data: &[u8],
        with_response: bool,
    ) -> Result<(), BackendError> {
        let mut state = lock(&self.state);
        state.writes.push(RecordedWrite {
            characteristic,
            data: data.to_vec(),
            with_response,
        });
        let replies = match &state.responder {
            Some(responder) => responder(characteristic, data),
            None => Vec::new(),
        };
        if let Some(notifier) = &state.notifier {
            for reply in replies {
                let _ = notifier.unbounded_send(reply);
            }
        }
        Ok(())
    }

    async fn notifications(&self) -> Result<NotificationStream, BackendError> {
        let (tx, rx) = mpsc::unbounded();
        lock(&self.state).notifier = Some(tx);
        Ok(Box::pin(rx))
    }

    async fn disconnect(&self) -> Result<(), BackendError> {
        let mut state = lock(&self.state);
        state.disconnects += 1;
        state.notifier = None;
        Ok(())
    }
}
