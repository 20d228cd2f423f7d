//! The host's Bluetooth adapter via btleplug.

use async_trait::async_trait;
use btleplug::api::{
    Central as _, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tracing::{debug, info};
use uuid::Uuid;

use swingbridge_domain::peripheral::{Advertisement, PeripheralHandle};
use swingbridge_domain::profile::ServiceInfo;
use swingbridge_domain::protocol::RawNotification;

use crate::{BackendError, Central, Link, NotificationStream};

pub struct LocalCentral {
    adapter: Adapter,
}

impl LocalCentral {
    /// Uses the last adapter the platform reports.
    pub async fn new() -> Result<LocalCentral, BackendError> {
        let manager = Manager::new().await?;
        let mut adapters = manager.adapters().await?;
        let adapter = adapters.pop().ok_or(BackendError::NoAdapter)?;
        info!(adapter = %adapter.adapter_info().await?, "using Bluetooth adapter");
        Ok(LocalCentral { adapter })
    }

    async fn find(&self, handle: &PeripheralHandle) -> Result<Peripheral, BackendError> {
        for peripheral in self.adapter.peripherals().await? {
            if peripheral.id().to_string() == handle.id {
                return Ok(peripheral);
            }
        }
        Err(BackendError::UnknownPeripheral(handle.id.clone()))
    }
}

#[async_trait]
impl Central for LocalCentral {
    type Link = LocalLink;

    async fn start_scan(&self) -> Result<(), BackendError> {
        self.adapter.start_scan(ScanFilter::default()).await?;
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), BackendError> {
        self.adapter.stop_scan().await?;
        Ok(())
    }

    async fn advertisements(&self) -> Result<Vec<Advertisement>, BackendError> {
        let mut advertisements = Vec::new();
        for peripheral in self.adapter.peripherals().await? {
            let Some(properties) = peripheral.properties().await? else {
                continue;
            };
            let mut advertisement = Advertisement::new(
                peripheral.id().to_string(),
                properties.address.to_string(),
                properties.local_name,
            );
            advertisement.rssi = properties.rssi;
            advertisements.push(advertisement);
        }
        Ok(advertisements)
    }

    async fn connect(&self, handle: &PeripheralHandle) -> Result<LocalLink, BackendError> {
        let peripheral = self.find(handle).await?;
        if !peripheral.is_connected().await? {
            peripheral.connect().await?;
        }
        Ok(LocalLink { peripheral })
    }
}

pub struct LocalLink {
    peripheral: Peripheral,
}

impl LocalLink {
    fn characteristic(&self, uuid: Uuid) -> Result<Characteristic, BackendError> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or(BackendError::UnknownCharacteristic(uuid))
    }
}

#[async_trait]
impl Link for LocalLink {
    async fn discover_services(&self) -> Result<Vec<ServiceInfo>, BackendError> {
        self.peripheral.discover_services().await?;
        let services = self
            .peripheral
            .services()
            .into_iter()
            .map(|service| ServiceInfo {
                uuid: service.uuid,
                characteristics: service.characteristics.iter().map(|c| c.uuid).collect(),
            })
            .collect::<Vec<_>>();
        debug!(count = services.len(), "services discovered");
        Ok(services)
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<(), BackendError> {
        let characteristic = self.characteristic(characteristic)?;
        self.peripheral.subscribe(&characteristic).await?;
        Ok(())
    }

    async fn unsubscribe(&self, characteristic: Uuid) -> Result<(), BackendError> {
        let characteristic = self.characteristic(characteristic)?;
        self.peripheral.unsubscribe(&characteristic).await?;
        Ok(())
    }

    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>, BackendError> {
        let characteristic = self.characteristic(characteristic)?;
        Ok(self.peripheral.read(&characteristic).await?)
    }

    async fn write(
        &self,
        characteristic: Uuid,
        data: &[u8],
        with_response: bool,
    ) -> Result<(), BackendError> {
        let characteristic = self.characteristic(characteristic)?;
        let write_type = if with_response {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };
        self.peripheral.write(&characteristic, data, write_type).await?;
        Ok(())
    }

    async fn notifications(&self) -> Result<NotificationStream, BackendError> {
        let stream = self.peripheral.notifications().await?;
        Ok(Box::pin(stream.map(|n| RawNotification {
            characteristic: n.uuid,
            value: n.value,
        })))
    }

    async fn disconnect(&self) -> Result<(), BackendError> {
        if self.peripheral.is_connected().await? {
            self.peripheral.disconnect().await?;
        }
        Ok(())
    }
}
