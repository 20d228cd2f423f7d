//! Sans-IO protocol engines.
//!
//! An engine turns raw notifications into [`DecodedMessage`]s and tells the
//! session what to write back. It never touches the radio itself, so both
//! launch monitors can be driven by the same session code and tested without
//! hardware.

use thiserror::Error;
use uuid::Uuid;

use crate::config::ShotEnvironment;
use crate::context::ConnectionContext;
use crate::crypto::DecryptError;
use crate::message::DecodedMessage;
use crate::mlm2pro::Mlm2ProEngine;
use crate::profile::DeviceModel;
use crate::r10::R10Engine;
use crate::r10::framing::FrameError;
use crate::r10::proto::ProtoError;
use crate::state::ConnectionState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawNotification {
    pub characteristic: Uuid,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundWrite {
    pub characteristic: Uuid,
    pub data: Vec<u8>,
    pub with_response: bool,
}

impl OutboundWrite {
    pub fn with_response(characteristic: Uuid, data: impl Into<Vec<u8>>) -> Self {
        Self {
            characteristic,
            data: data.into(),
            with_response: true,
        }
    }

    pub fn without_response(characteristic: Uuid, data: impl Into<Vec<u8>>) -> Self {
        Self {
            characteristic,
            data: data.into(),
            with_response: false,
        }
    }
}

/// Progress of authentication (MLM2PRO) or the handshake (R10).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BringUp {
    Complete,
    Rejected { code: u8 },
}

/// Why a notification produced no message. Never fatal to the session.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DropReason {
    #[error("decrypt: {0}")]
    Decrypt(#[from] DecryptError),
    #[error("frame: {0}")]
    Frame(#[from] FrameError),
    #[error("protobuf: {0}")]
    Proto(#[from] ProtoError),
    #[error("misread shot")]
    Misread,
    #[error("measurement of {0} bytes is too short")]
    TooShort(usize),
    #[error("unexpected handshake reply {0:02x?}")]
    UnexpectedHandshake(Vec<u8>),
    #[error("unrecognised payload {payload:02x?} on {characteristic}")]
    Unrecognised { characteristic: Uuid, payload: Vec<u8> },
}

#[derive(Debug, Default, PartialEq)]
pub struct Reaction {
    pub messages: Vec<DecodedMessage>,
    pub writes: Vec<OutboundWrite>,
    pub bring_up: Option<BringUp>,
    /// The device proved it is alive.
    pub heartbeat: bool,
    pub dropped: Vec<DropReason>,
}

impl Reaction {
    pub fn discard(&mut self, reason: impl Into<DropReason>) {
        self.dropped.push(reason.into());
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("authentication already in progress")]
    AlreadyInFlight,
    #[error("cannot authenticate while {0}")]
    InvalidState(ConnectionState),
    #[error("device rejected authentication with code {0}")]
    Rejected(u8),
    #[error("no authentication reply within {0:?}")]
    Timeout(std::time::Duration),
    #[error("auth write failed: {0}")]
    Write(String),
}

/// Claims the bring-up slot of `ctx` once it is in `Authenticating`.
pub(crate) fn claim_bring_up(ctx: &mut ConnectionContext) -> Result<(), AuthError> {
    if ctx.state() != ConnectionState::Authenticating {
        return Err(AuthError::InvalidState(ctx.state()));
    }
    if !ctx.begin_bring_up() {
        return Err(AuthError::AlreadyInFlight);
    }
    Ok(())
}

#[derive(Debug)]
pub enum Protocol {
    Mlm2Pro(Mlm2ProEngine),
    R10(R10Engine),
}

impl Protocol {
    pub fn for_model(model: DeviceModel, environment: ShotEnvironment) -> Protocol {
        match model {
            DeviceModel::Mlm2Pro => Protocol::Mlm2Pro(Mlm2ProEngine::new(environment)),
            DeviceModel::R10 => Protocol::R10(R10Engine::new(environment)),
        }
    }

    pub fn model(&self) -> DeviceModel {
        match self {
            Protocol::Mlm2Pro(_) => DeviceModel::Mlm2Pro,
            Protocol::R10(_) => DeviceModel::R10,
        }
    }

    /// Writes that start authentication or the handshake.
    pub fn start_bring_up(
        &mut self,
        ctx: &mut ConnectionContext,
    ) -> Result<Vec<OutboundWrite>, AuthError> {
        match self {
            Protocol::Mlm2Pro(engine) => engine.start_bring_up(ctx),
            Protocol::R10(engine) => engine.start_bring_up(ctx),
        }
    }

    pub fn on_notification(
        &mut self,
        ctx: &mut ConnectionContext,
        characteristic: Uuid,
        value: &[u8],
    ) -> Reaction {
        match self {
            Protocol::Mlm2Pro(engine) => engine.on_notification(ctx, characteristic, value),
            Protocol::R10(engine) => engine.on_notification(ctx, characteristic, value),
        }
    }

    pub fn keep_alive(&self, ctx: &ConnectionContext) -> Option<OutboundWrite> {
        match self {
            Protocol::Mlm2Pro(engine) => Some(engine.keep_alive(ctx)),
            Protocol::R10(engine) => engine.keep_alive(ctx),
        }
    }

    /// Decodes the one-off reads made after service discovery.
    pub fn info_message(&self, reads: &[(Uuid, Vec<u8>)]) -> Option<DecodedMessage> {
        match self {
            Protocol::Mlm2Pro(_) => None,
            Protocol::R10(_) => crate::r10::device_info(reads),
        }
    }

    /// Writes to send before a deliberate disconnect.
    pub fn farewell(&self, ctx: &ConnectionContext) -> Vec<OutboundWrite> {
        match self {
            Protocol::Mlm2Pro(engine) => engine.farewell(ctx),
            Protocol::R10(_) => Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        match self {
            Protocol::Mlm2Pro(_) => {}
            Protocol::R10(engine) => engine.reset(),
        }
    }
}
