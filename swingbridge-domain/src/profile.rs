//! Per-model GATT layout.
//!
//! A session engine is generic over the launch monitor; everything that
//! differs between models at the GATT level lives in a [`DeviceProfile`].

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::{Uuid, uuid};

pub mod mlm2pro {
    use super::*;

    pub const SERVICE: Uuid = uuid!("daf9b2a4-e4db-4be4-816d-298a050f25cd");
    pub const AUTH_REQUEST: Uuid = uuid!("b1e9ce5b-48c8-4a28-89dd-12ffd779f5e1");
    pub const COMMAND: Uuid = uuid!("1ea0fa51-1649-4603-9c5f-59c940323471");
    pub const CONFIGURE: Uuid = uuid!("df5990cf-47fb-4115-8fdd-40061d40af84");
    pub const EVENTS: Uuid = uuid!("02e525fd-7960-4ef0-bfb7-de0f514518ff");
    pub const HEARTBEAT: Uuid = uuid!("ef6a028e-f78b-47a4-b56c-dda6dae85cbf");
    pub const MEASUREMENT: Uuid = uuid!("76830bce-b9a7-4f69-aeaa-fd5b9f6b0f86");
    pub const WRITE_RESPONSE: Uuid = uuid!("cfbbcb0d-7121-4bc2-bf54-8284166d61f0");
}

pub mod r10 {
    use super::*;

    pub const SERVICE: Uuid = uuid!("6a4e2800-667b-11e3-949a-0800200c9a66");
    pub const NOTIFIER: Uuid = uuid!("6a4e2812-667b-11e3-949a-0800200c9a66");
    pub const WRITER: Uuid = uuid!("6a4e2822-667b-11e3-949a-0800200c9a66");
    pub const BATTERY_SERVICE: Uuid = uuid!("0000180f-0000-1000-8000-00805f9b34fb");
    pub const BATTERY_LEVEL: Uuid = uuid!("00002a19-0000-1000-8000-00805f9b34fb");
    pub const DEVICE_INFO_SERVICE: Uuid = uuid!("0000180a-0000-1000-8000-00805f9b34fb");
    pub const MODEL_NUMBER: Uuid = uuid!("00002a24-0000-1000-8000-00805f9b34fb");
    pub const SERIAL_NUMBER: Uuid = uuid!("00002a25-0000-1000-8000-00805f9b34fb");
    pub const FIRMWARE_REVISION: Uuid = uuid!("00002a26-0000-1000-8000-00805f9b34fb");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceModel {
    Mlm2Pro,
    R10,
}

impl std::fmt::Display for DeviceModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceModel::Mlm2Pro => write!(f, "MLM2PRO"),
            DeviceModel::R10 => write!(f, "R10"),
        }
    }
}

/// A service and its characteristics as discovered on a live link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub uuid: Uuid,
    pub characteristics: Vec<Uuid>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MissingEndpoint {
    #[error("service {0} not found")]
    Service(Uuid),
    #[error("characteristic {0} not found")]
    Characteristic(Uuid),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProfile {
    pub model: DeviceModel,
    pub service: Uuid,
    /// Must exist in `service`.
    pub required: Vec<Uuid>,
    /// Subscribed once discovered; a subset of `required`.
    pub notify: Vec<Uuid>,
    /// Subscribed when present anywhere on the device.
    pub optional_notify: Vec<Uuid>,
    /// Read once after discovery when present.
    pub info_reads: Vec<Uuid>,
    /// Keep-alive written by the heartbeat monitor.
    pub keep_alive: Uuid,
}

/// What a profile resolved to against a concrete device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Negotiated {
    pub notify: Vec<Uuid>,
    pub info_reads: Vec<Uuid>,
}

impl DeviceProfile {
    pub fn for_model(model: DeviceModel) -> DeviceProfile {
        match model {
            DeviceModel::Mlm2Pro => DeviceProfile {
                model,
                service: mlm2pro::SERVICE,
                required: vec![
                    mlm2pro::AUTH_REQUEST,
                    mlm2pro::COMMAND,
                    mlm2pro::CONFIGURE,
                    mlm2pro::EVENTS,
                    mlm2pro::HEARTBEAT,
                    mlm2pro::MEASUREMENT,
                    mlm2pro::WRITE_RESPONSE,
                ],
                notify: vec![
                    mlm2pro::EVENTS,
                    mlm2pro::HEARTBEAT,
                    mlm2pro::MEASUREMENT,
                    mlm2pro::WRITE_RESPONSE,
                ],
                optional_notify: vec![],
                info_reads: vec![],
                keep_alive: mlm2pro::HEARTBEAT,
            },
            DeviceModel::R10 => DeviceProfile {
                model,
                service: r10::SERVICE,
                required: vec![r10::NOTIFIER, r10::WRITER],
                notify: vec![r10::NOTIFIER],
                optional_notify: vec![r10::BATTERY_LEVEL],
                info_reads: vec![r10::MODEL_NUMBER, r10::FIRMWARE_REVISION, r10::SERIAL_NUMBER],
                keep_alive: r10::WRITER,
            },
        }
    }

    pub fn negotiate(&self, services: &[ServiceInfo]) -> Result<Negotiated, MissingEndpoint> {
        let primary = services
            .iter()
            .find(|s| s.uuid == self.service)
            .ok_or(MissingEndpoint::Service(self.service))?;
        if let Some(missing) = self
            .required
            .iter()
            .find(|c| !primary.characteristics.contains(c))
        {
            return Err(MissingEndpoint::Characteristic(*missing));
        }

        let present = |uuid: &Uuid| services.iter().any(|s| s.characteristics.contains(uuid));
        let mut notify = self.notify.clone();
        notify.extend(self.optional_notify.iter().filter(|&c| present(c)));
        let info_reads = self.info_reads.iter().copied().filter(|c| present(c)).collect();
        Ok(Negotiated { notify, info_reads })
    }
}
