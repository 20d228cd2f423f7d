//! MLM2PRO payload layouts.
//!
//! Measurement and event notifications arrive AES encrypted; write responses
//! and heartbeats are plaintext.

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::bytes::{Endian, IntWidth, int_to_bytes, read_i16_le, read_u16_le};
use crate::config::ShotEnvironment;
use crate::context::ConnectionContext;
use crate::crypto::{Cipher, ENCRYPTION_TYPE, MLM2PRO_CIPHER};
use crate::message::{
    AuthResponse, BallData, DecodedMessage, DeviceEvent, ShotMeasurement, WriteResponse,
};
use crate::profile::mlm2pro as profile;
use crate::protocol::{AuthError, BringUp, DropReason, OutboundWrite, Reaction, claim_bring_up};
use crate::state::ConnectionState;

/// The device reports a misread shot as a measurement of all zero bytes.
pub const MISREAD_SENTINEL: [u8; 21] = [0; 21];

pub const ARM_COMMAND: [u8; 7] = [0x01, 0x0d, 0x00, 0x01, 0x00, 0x00, 0x00];
pub const DISARM_COMMAND: [u8; 7] = [0x01, 0x0d, 0x00, 0x00, 0x00, 0x00, 0x00];
pub const KEEP_ALIVE: [u8; 1] = [0x01];

const AUTH_PROTOCOL_VERSION: u8 = 0x01;
const CONFIGURE_SENSOR_PARAMETERS: u8 = 0x01;

const KIND_CONFIGURATION: u8 = 1;
const KIND_AUTH: u8 = 2;

/// Device speed units (tenths) to miles per hour.
const SPEED_TO_MPH: f64 = 2.2375;

/// One shot as laid out by the firmware: eight little-endian 16-bit fields.
/// Speeds and angles are in tenths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMeasurement {
    pub club_speed: u16,
    pub ball_speed: u16,
    pub hla: i16,
    pub vla: i16,
    pub spin_axis: i16,
    pub total_spin: u16,
    pub carry_distance: u16,
    pub total_distance: u16,
}

impl RawMeasurement {
    pub const LEN: usize = 16;

    pub fn decode(bytes: &[u8]) -> Option<RawMeasurement> {
        Some(RawMeasurement {
            club_speed: read_u16_le(bytes, 0)?,
            ball_speed: read_u16_le(bytes, 2)?,
            hla: read_i16_le(bytes, 4)?,
            vla: read_i16_le(bytes, 6)?,
            spin_axis: read_i16_le(bytes, 8)?,
            total_spin: read_u16_le(bytes, 10)?,
            carry_distance: read_u16_le(bytes, 12)?,
            total_distance: read_u16_le(bytes, 14)?,
        })
    }

    pub fn encode(&self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        let fields = [
            self.club_speed.to_le_bytes(),
            self.ball_speed.to_le_bytes(),
            self.hla.to_le_bytes(),
            self.vla.to_le_bytes(),
            self.spin_axis.to_le_bytes(),
            self.total_spin.to_le_bytes(),
            self.carry_distance.to_le_bytes(),
            self.total_distance.to_le_bytes(),
        ];
        for (chunk, field) in out.chunks_exact_mut(2).zip(fields) {
            chunk.copy_from_slice(&field);
        }
        out
    }

    pub fn ball_data(&self) -> BallData {
        BallData {
            ball_speed_mph: f64::from(self.ball_speed) / 10.0 * SPEED_TO_MPH,
            club_speed_mph: Some(f64::from(self.club_speed) / 10.0 * SPEED_TO_MPH),
            vla_deg: f64::from(self.vla) / 10.0,
            hla_deg: f64::from(self.hla) / 10.0,
            spin_axis_deg: f64::from(self.spin_axis) / 10.0,
            total_spin_rpm: f64::from(self.total_spin),
        }
    }
}

pub fn is_misread(payload: &[u8]) -> bool {
    payload.len() >= RawMeasurement::LEN && payload.iter().all(|b| *b == 0)
}

/// Outcome of decoding a decrypted measurement payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Measurement {
    Shot(RawMeasurement),
    Misread,
    TooShort(usize),
}

pub fn decode_measurement(payload: &[u8]) -> Measurement {
    if is_misread(payload) {
        return Measurement::Misread;
    }
    match RawMeasurement::decode(payload) {
        Some(raw) => Measurement::Shot(raw),
        None => Measurement::TooShort(payload.len()),
    }
}

pub fn decode_event(payload: &[u8]) -> Option<DecodedMessage> {
    let event = match payload {
        [0, ..] => DeviceEvent::ShotDetected,
        [1, ..] => DeviceEvent::Processing,
        [2, ..] => DeviceEvent::Ready,
        [3, level, ..] => return Some(DecodedMessage::BatteryLevel(*level)),
        [5, 0, ..] => DeviceEvent::Misread,
        [5, 1, ..] => DeviceEvent::Disarmed,
        _ => return None,
    };
    Some(DecodedMessage::DeviceEvent(event))
}

pub fn decode_write_response(payload: &[u8]) -> Option<WriteResponse> {
    let response = match payload {
        [KIND_AUTH, 0, ..] => WriteResponse::Auth(AuthResponse::Accepted {
            initial_parameters_required: true,
        }),
        [KIND_AUTH, 1, ..] => WriteResponse::Auth(AuthResponse::Accepted {
            initial_parameters_required: false,
        }),
        [KIND_AUTH, code, ..] => WriteResponse::Auth(AuthResponse::Rejected { code: *code }),
        [KIND_CONFIGURATION, status, ..] => WriteResponse::ConfigurationAck { status: *status },
        [kind, status, rest @ ..] => WriteResponse::Unknown {
            kind: *kind,
            status: *status,
            payload: rest.to_vec(),
        },
        _ => return None,
    };
    Some(response)
}

/// Auth request: protocol version, encryption type, then the session key.
pub fn auth_request(cipher: &Cipher) -> Vec<u8> {
    let mut payload = vec![AUTH_PROTOCOL_VERSION];
    payload.extend_from_slice(&ENCRYPTION_TYPE);
    payload.extend_from_slice(cipher.key_bytes());
    payload
}

/// Sensor parameters sent once after auth when the device asks for them.
pub fn initial_parameters(environment: &ShotEnvironment) -> Vec<u8> {
    let mut payload = vec![CONFIGURE_SENSOR_PARAMETERS];
    payload.extend(int_to_bytes(environment.altitude_m, Endian::Little, IntWidth::Short));
    payload.extend(int_to_bytes(environment.temperature_c, Endian::Little, IntWidth::Short));
    payload
}

impl From<RawMeasurement> for DecodedMessage {
    fn from(raw: RawMeasurement) -> Self {
        DecodedMessage::ShotMeasurement(ShotMeasurement::Mlm2Pro(raw))
    }
}

/// Drives authentication and decodes notifications for one MLM2PRO link.
#[derive(Debug)]
pub struct Mlm2ProEngine {
    cipher: &'static Cipher,
    environment: ShotEnvironment,
}

impl Mlm2ProEngine {
    pub fn new(environment: ShotEnvironment) -> Self {
        Self {
            cipher: &MLM2PRO_CIPHER,
            environment,
        }
    }

    pub fn start_bring_up(
        &mut self,
        ctx: &mut ConnectionContext,
    ) -> Result<Vec<OutboundWrite>, AuthError> {
        claim_bring_up(ctx)?;
        Ok(vec![OutboundWrite::with_response(
            profile::AUTH_REQUEST,
            auth_request(self.cipher),
        )])
    }

    pub fn on_notification(
        &mut self,
        ctx: &mut ConnectionContext,
        characteristic: Uuid,
        value: &[u8],
    ) -> Reaction {
        let mut reaction = Reaction {
            heartbeat: ctx.profile.notify.contains(&characteristic),
            ..Reaction::default()
        };
        match characteristic {
            profile::MEASUREMENT => match self.cipher.decrypt(value) {
                Ok(plaintext) => match decode_measurement(&plaintext) {
                    Measurement::Shot(raw) => reaction.messages.push(raw.into()),
                    Measurement::Misread => reaction.discard(DropReason::Misread),
                    Measurement::TooShort(len) => reaction.discard(DropReason::TooShort(len)),
                },
                Err(e) => reaction.discard(e),
            },
            profile::EVENTS => match self.cipher.decrypt(value) {
                Ok(plaintext) => match decode_event(&plaintext) {
                    Some(message) => reaction.messages.push(message),
                    None => reaction.discard(DropReason::Unrecognised {
                        characteristic,
                        payload: plaintext,
                    }),
                },
                Err(e) => reaction.discard(e),
            },
            profile::WRITE_RESPONSE => match decode_write_response(value) {
                Some(response) => {
                    self.on_write_response(ctx, &response, &mut reaction);
                    reaction.messages.push(DecodedMessage::WriteResponse(response));
                }
                None => reaction.discard(DropReason::Unrecognised {
                    characteristic,
                    payload: value.to_vec(),
                }),
            },
            profile::HEARTBEAT => reaction.messages.push(DecodedMessage::HeartbeatAck),
            _ => reaction.discard(DropReason::Unrecognised {
                characteristic,
                payload: value.to_vec(),
            }),
        }
        reaction
    }

    fn on_write_response(
        &self,
        ctx: &mut ConnectionContext,
        response: &WriteResponse,
        reaction: &mut Reaction,
    ) {
        let WriteResponse::Auth(auth) = response else {
            return;
        };
        if !ctx.bring_up_in_flight() {
            debug!(?auth, "auth response outside of authentication");
            return;
        }
        ctx.end_bring_up();
        match *auth {
            AuthResponse::Accepted {
                initial_parameters_required,
            } => {
                if initial_parameters_required {
                    reaction.writes.push(OutboundWrite::with_response(
                        profile::CONFIGURE,
                        initial_parameters(&self.environment),
                    ));
                }
                reaction
                    .writes
                    .push(OutboundWrite::with_response(profile::COMMAND, ARM_COMMAND));
                reaction.bring_up = Some(BringUp::Complete);
            }
            AuthResponse::Rejected { code } => {
                reaction.bring_up = Some(BringUp::Rejected { code });
            }
        }
    }

    pub fn keep_alive(&self, ctx: &ConnectionContext) -> OutboundWrite {
        OutboundWrite::without_response(ctx.profile.keep_alive, KEEP_ALIVE)
    }

    pub fn farewell(&self, ctx: &ConnectionContext) -> Vec<OutboundWrite> {
        if ctx.state() == ConnectionState::Ready {
            vec![OutboundWrite::with_response(profile::COMMAND, DISARM_COMMAND)]
        } else {
            Vec::new()
        }
    }
}
