//! Just enough protobuf to speak the R10 launch monitor service.
//!
//! The device wraps every request, response and alert in a `WrapperProto`
//! message. Only the fields the connector uses are modelled; everything else is
//! skipped while reading.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ShotEnvironment;

// TODO: confirm these field numbers against a captured R10 session; they are
// provisional and not yet checked on hardware.
mod field {
    // WrapperProto
    pub const SERVICE: u32 = 1;
    pub const EVENT: u32 = 2;

    // LaunchMonitorService
    pub const STATUS_REQUEST: u32 = 1;
    pub const STATUS_RESPONSE: u32 = 2;
    pub const WAKE_UP_REQUEST: u32 = 3;
    pub const WAKE_UP_RESPONSE: u32 = 4;
    pub const SHOT_CONFIG_REQUEST: u32 = 11;
    pub const SHOT_CONFIG_RESPONSE: u32 = 12;

    // EventSharing
    pub const SUBSCRIBE_REQUEST: u32 = 1;
    pub const SUBSCRIBE_RESPONSE: u32 = 2;
    pub const NOTIFICATION: u32 = 3;

    // AlertNotification
    pub const ALERT_TYPE: u32 = 1;
    pub const ALERT_DETAILS: u32 = 1001;

    // AlertDetails
    pub const DETAILS_STATE: u32 = 1;
    pub const DETAILS_METRICS: u32 = 2;
    pub const DETAILS_ERROR: u32 = 3;

    // StatusResponse / State / WakeUpResponse / ShotConfigResponse / Error
    pub const STATE: u32 = 1;
    pub const STATUS: u32 = 1;
    pub const SUCCESS: u32 = 1;
    pub const ERROR_CODE: u32 = 1;

    // Metrics
    pub const SHOT_ID: u32 = 1;
    pub const SHOT_TYPE: u32 = 2;
    pub const BALL_METRICS: u32 = 3;
    pub const CLUB_METRICS: u32 = 4;

    // BallMetrics
    pub const LAUNCH_ANGLE: u32 = 1;
    pub const LAUNCH_DIRECTION: u32 = 2;
    pub const BALL_SPEED: u32 = 3;
    pub const SPIN_AXIS: u32 = 4;
    pub const TOTAL_SPIN: u32 = 5;

    // ClubMetrics
    pub const CLUB_HEAD_SPEED: u32 = 1;
    pub const CLUB_ANGLE_FACE: u32 = 2;
    pub const CLUB_ANGLE_PATH: u32 = 3;
    pub const ATTACK_ANGLE: u32 = 4;

    // ShotConfigRequest
    pub const TEMPERATURE: u32 = 1;
    pub const HUMIDITY: u32 = 2;
    pub const ALTITUDE: u32 = 3;
    pub const AIR_DENSITY: u32 = 4;
    pub const TEE_RANGE: u32 = 5;

    // SubscribeRequest
    pub const ALERT_TYPES: u32 = 1;
}

/// Alert type the connector subscribes to.
const ALERT_LAUNCH_MONITOR: u64 = 8;

const WIRE_VARINT: u8 = 0;
const WIRE_FIXED64: u8 = 1;
const WIRE_LEN: u8 = 2;
const WIRE_FIXED32: u8 = 5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtoError {
    #[error("message truncated at offset {0}")]
    Truncated(usize),
    #[error("varint longer than 10 bytes at offset {0}")]
    VarintOverflow(usize),
    #[error("unsupported wire type {0}")]
    UnsupportedWireType(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceState {
    Standby,
    InterferenceTest,
    Waiting,
    Recording,
    Processing,
    Error,
    Unknown(u32),
}

impl From<u64> for DeviceState {
    fn from(value: u64) -> Self {
        match value {
            0 => DeviceState::Standby,
            1 => DeviceState::InterferenceTest,
            2 => DeviceState::Waiting,
            3 => DeviceState::Recording,
            4 => DeviceState::Processing,
            5 => DeviceState::Error,
            other => DeviceState::Unknown(other as u32),
        }
    }
}

#[cfg(test)]
impl DeviceState {
    fn to_wire(self) -> u64 {
        match self {
            DeviceState::Standby => 0,
            DeviceState::InterferenceTest => 1,
            DeviceState::Waiting => 2,
            DeviceState::Recording => 3,
            DeviceState::Processing => 4,
            DeviceState::Error => 5,
            DeviceState::Unknown(v) => u64::from(v),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShotMetrics {
    pub shot_id: u32,
    pub shot_type: u32,
    pub ball_speed_mps: f32,
    pub launch_angle_deg: f32,
    pub launch_direction_deg: f32,
    pub spin_axis_deg: f32,
    pub total_spin_rpm: f32,
    pub club_head_speed_mps: Option<f32>,
    pub club_face_deg: Option<f32>,
    pub club_path_deg: Option<f32>,
    pub attack_angle_deg: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertDetails {
    pub state: Option<DeviceState>,
    pub metrics: Option<ShotMetrics>,
    pub error_code: Option<u32>,
}

/// A decoded `WrapperProto` payload.
#[derive(Debug, Clone, PartialEq)]
pub enum R10Message {
    StatusResponse(DeviceState),
    WakeUpResponse { status: u64 },
    ShotConfigResponse { success: bool },
    SubscribeResponse,
    Alert(AlertDetails),
}

// ---------------------------------------------------------------------------
// wire helpers
// ---------------------------------------------------------------------------

fn put_varint(buf: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        buf.push((value as u8) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

fn read_varint(buf: &[u8], pos: &mut usize) -> Result<u64, ProtoError> {
    let start = *pos;
    let mut value = 0u64;
    for shift in (0..70).step_by(7) {
        let byte = *buf.get(*pos).ok_or(ProtoError::Truncated(*pos))?;
        *pos += 1;
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(ProtoError::VarintOverflow(start))
}

#[derive(Debug, Default)]
pub struct ProtoWriter {
    buf: Vec<u8>,
}

impl ProtoWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(&mut self, field: u32, wire: u8) {
        put_varint(&mut self.buf, (u64::from(field) << 3) | u64::from(wire));
    }

    pub fn varint(mut self, field: u32, value: u64) -> Self {
        self.key(field, WIRE_VARINT);
        put_varint(&mut self.buf, value);
        self
    }

    pub fn float(mut self, field: u32, value: f32) -> Self {
        self.key(field, WIRE_FIXED32);
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn message(mut self, field: u32, bytes: &[u8]) -> Self {
        self.key(field, WIRE_LEN);
        put_varint(&mut self.buf, bytes.len() as u64);
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireValue<'a> {
    Varint(u64),
    Fixed64(u64),
    Bytes(&'a [u8]),
    Fixed32(u32),
}

impl<'a> WireValue<'a> {
    fn as_u64(&self) -> Option<u64> {
        match self {
            WireValue::Varint(v) | WireValue::Fixed64(v) => Some(*v),
            WireValue::Fixed32(v) => Some(u64::from(*v)),
            WireValue::Bytes(_) => None,
        }
    }

    fn as_f32(&self) -> Option<f32> {
        match self {
            WireValue::Fixed32(v) => Some(f32::from_bits(*v)),
            _ => None,
        }
    }

    fn as_bytes(&self) -> Option<&'a [u8]> {
        match self {
            WireValue::Bytes(b) => Some(*b),
            _ => None,
        }
    }
}

/// Iterates over `(field number, value)` pairs; stops after the first error.
pub struct ProtoReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ProtoReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn read_field(&mut self) -> Result<(u32, WireValue<'a>), ProtoError> {
        let key = read_varint(self.buf, &mut self.pos)?;
        let field = (key >> 3) as u32;
        let value = match (key & 0x7) as u8 {
            WIRE_VARINT => WireValue::Varint(read_varint(self.buf, &mut self.pos)?),
            WIRE_FIXED64 => {
                let bytes = self.take(8)?;
                let mut array = [0u8; 8];
                array.copy_from_slice(bytes);
                WireValue::Fixed64(u64::from_le_bytes(array))
            }
            WIRE_LEN => {
                let len = read_varint(self.buf, &mut self.pos)? as usize;
                WireValue::Bytes(self.take(len)?)
            }
            WIRE_FIXED32 => {
                let bytes = self.take(4)?;
                WireValue::Fixed32(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
            }
            other => return Err(ProtoError::UnsupportedWireType(other)),
        };
        Ok((field, value))
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ProtoError> {
        let end = self.pos.checked_add(len).ok_or(ProtoError::Truncated(self.pos))?;
        let bytes = self.buf.get(self.pos..end).ok_or(ProtoError::Truncated(self.pos))?;
        self.pos = end;
        Ok(bytes)
    }
}

impl<'a> Iterator for ProtoReader<'a> {
    type Item = Result<(u32, WireValue<'a>), ProtoError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.buf.len() {
            return None;
        }
        let result = self.read_field();
        if result.is_err() {
            self.pos = self.buf.len();
        }
        Some(result)
    }
}

// ---------------------------------------------------------------------------
// requests
// ---------------------------------------------------------------------------

fn service_request(field: u32, body: &[u8]) -> Vec<u8> {
    let service = ProtoWriter::new().message(field, body).finish();
    ProtoWriter::new().message(field::SERVICE, &service).finish()
}

pub fn wake_up_request() -> Vec<u8> {
    service_request(field::WAKE_UP_REQUEST, &[])
}

pub fn status_request() -> Vec<u8> {
    service_request(field::STATUS_REQUEST, &[])
}

pub fn shot_config_request(environment: &ShotEnvironment) -> Vec<u8> {
    let body = ProtoWriter::new()
        .float(field::TEMPERATURE, environment.temperature_c as f32)
        .float(field::HUMIDITY, environment.humidity)
        .float(field::ALTITUDE, environment.altitude_m as f32)
        .float(field::AIR_DENSITY, environment.air_density)
        .float(field::TEE_RANGE, environment.tee_range_m)
        .finish();
    service_request(field::SHOT_CONFIG_REQUEST, &body)
}

pub fn subscribe_alerts_request() -> Vec<u8> {
    let request = ProtoWriter::new()
        .varint(field::ALERT_TYPES, ALERT_LAUNCH_MONITOR)
        .finish();
    let event = ProtoWriter::new()
        .message(field::SUBSCRIBE_REQUEST, &request)
        .finish();
    ProtoWriter::new().message(field::EVENT, &event).finish()
}

// ---------------------------------------------------------------------------
// responses and alerts
// ---------------------------------------------------------------------------

pub fn decode_wrapper(buf: &[u8]) -> Result<Vec<R10Message>, ProtoError> {
    let mut messages = Vec::new();
    for entry in ProtoReader::new(buf) {
        let (number, value) = entry?;
        let Some(body) = value.as_bytes() else {
            continue;
        };
        match number {
            field::SERVICE => decode_service(body, &mut messages)?,
            field::EVENT => decode_event(body, &mut messages)?,
            _ => {}
        }
    }
    Ok(messages)
}

fn decode_service(buf: &[u8], out: &mut Vec<R10Message>) -> Result<(), ProtoError> {
    for entry in ProtoReader::new(buf) {
        let (number, value) = entry?;
        let Some(body) = value.as_bytes() else {
            continue;
        };
        match number {
            field::STATUS_RESPONSE => {
                let state = find_message(body, field::STATE)?
                    .map(decode_state)
                    .transpose()?
                    .unwrap_or(DeviceState::Standby);
                out.push(R10Message::StatusResponse(state));
            }
            field::WAKE_UP_RESPONSE => {
                let status = find_u64(body, field::STATUS)?.unwrap_or(0);
                out.push(R10Message::WakeUpResponse { status });
            }
            field::SHOT_CONFIG_RESPONSE => {
                let success = find_u64(body, field::SUCCESS)?.unwrap_or(0) != 0;
                out.push(R10Message::ShotConfigResponse { success });
            }
            _ => {}
        }
    }
    Ok(())
}

fn decode_event(buf: &[u8], out: &mut Vec<R10Message>) -> Result<(), ProtoError> {
    for entry in ProtoReader::new(buf) {
        let (number, value) = entry?;
        match (number, value.as_bytes()) {
            (field::SUBSCRIBE_RESPONSE, Some(_)) => out.push(R10Message::SubscribeResponse),
            (field::NOTIFICATION, Some(body)) => {
                if let Some(details) = find_message(body, field::ALERT_DETAILS)? {
                    out.push(R10Message::Alert(decode_details(details)?));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn decode_state(buf: &[u8]) -> Result<DeviceState, ProtoError> {
    Ok(DeviceState::from(find_u64(buf, field::STATE)?.unwrap_or(0)))
}

fn decode_details(buf: &[u8]) -> Result<AlertDetails, ProtoError> {
    let mut details = AlertDetails::default();
    for entry in ProtoReader::new(buf) {
        let (number, value) = entry?;
        let Some(body) = value.as_bytes() else {
            continue;
        };
        match number {
            field::DETAILS_STATE => details.state = Some(decode_state(body)?),
            field::DETAILS_METRICS => details.metrics = Some(decode_metrics(body)?),
            field::DETAILS_ERROR => {
                details.error_code = Some(find_u64(body, field::ERROR_CODE)?.unwrap_or(0) as u32)
            }
            _ => {}
        }
    }
    Ok(details)
}

fn decode_metrics(buf: &[u8]) -> Result<ShotMetrics, ProtoError> {
    let mut metrics = ShotMetrics::default();
    for entry in ProtoReader::new(buf) {
        let (number, value) = entry?;
        match number {
            field::SHOT_ID => metrics.shot_id = value.as_u64().unwrap_or(0) as u32,
            field::SHOT_TYPE => metrics.shot_type = value.as_u64().unwrap_or(0) as u32,
            field::BALL_METRICS => {
                if let Some(body) = value.as_bytes() {
                    decode_ball_metrics(body, &mut metrics)?;
                }
            }
            field::CLUB_METRICS => {
                if let Some(body) = value.as_bytes() {
                    decode_club_metrics(body, &mut metrics)?;
                }
            }
            _ => {}
        }
    }
    Ok(metrics)
}

fn decode_ball_metrics(buf: &[u8], metrics: &mut ShotMetrics) -> Result<(), ProtoError> {
    for entry in ProtoReader::new(buf) {
        let (number, value) = entry?;
        let Some(v) = value.as_f32() else {
            continue;
        };
        match number {
            field::LAUNCH_ANGLE => metrics.launch_angle_deg = v,
            field::LAUNCH_DIRECTION => metrics.launch_direction_deg = v,
            field::BALL_SPEED => metrics.ball_speed_mps = v,
            field::SPIN_AXIS => metrics.spin_axis_deg = v,
            field::TOTAL_SPIN => metrics.total_spin_rpm = v,
            _ => {}
        }
    }
    Ok(())
}

fn decode_club_metrics(buf: &[u8], metrics: &mut ShotMetrics) -> Result<(), ProtoError> {
    for entry in ProtoReader::new(buf) {
        let (number, value) = entry?;
        let Some(v) = value.as_f32() else {
            continue;
        };
        match number {
            field::CLUB_HEAD_SPEED => metrics.club_head_speed_mps = Some(v),
            field::CLUB_ANGLE_FACE => metrics.club_face_deg = Some(v),
            field::CLUB_ANGLE_PATH => metrics.club_path_deg = Some(v),
            field::ATTACK_ANGLE => metrics.attack_angle_deg = Some(v),
            _ => {}
        }
    }
    Ok(())
}

fn find_message(buf: &[u8], wanted: u32) -> Result<Option<&[u8]>, ProtoError> {
    for entry in ProtoReader::new(buf) {
        let (number, value) = entry?;
        if number == wanted {
            if let Some(body) = value.as_bytes() {
                return Ok(Some(body));
            }
        }
    }
    Ok(None)
}

fn find_u64(buf: &[u8], wanted: u32) -> Result<Option<u64>, ProtoError> {
    for entry in ProtoReader::new(buf) {
        let (number, value) = entry?;
        if number == wanted {
            return Ok(value.as_u64());
        }
    }
    Ok(None)
}

/// Encoders for the device side of the conversation, used to simulate an R10.
#[cfg(test)]
pub(crate) mod device {
    use super::*;

    fn state_message(state: DeviceState) -> Vec<u8> {
        ProtoWriter::new().varint(field::STATE, state.to_wire()).finish()
    }

    pub fn status_response(state: DeviceState) -> Vec<u8> {
        let response = ProtoWriter::new()
            .message(field::STATE, &state_message(state))
            .finish();
        service_request(field::STATUS_RESPONSE, &response)
    }

    pub fn alert(details: &AlertDetails) -> Vec<u8> {
        let mut writer = ProtoWriter::new();
        if let Some(state) = details.state {
            writer = writer.message(field::DETAILS_STATE, &state_message(state));
        }
        if let Some(metrics) = &details.metrics {
            writer = writer.message(field::DETAILS_METRICS, &encode_metrics(metrics));
        }
        if let Some(code) = details.error_code {
            let error = ProtoWriter::new().varint(field::ERROR_CODE, u64::from(code)).finish();
            writer = writer.message(field::DETAILS_ERROR, &error);
        }
        let notification = ProtoWriter::new()
            .varint(field::ALERT_TYPE, ALERT_LAUNCH_MONITOR)
            .message(field::ALERT_DETAILS, &writer.finish())
            .finish();
        let event = ProtoWriter::new()
            .message(field::NOTIFICATION, &notification)
            .finish();
        ProtoWriter::new().message(field::EVENT, &event).finish()
    }

    fn encode_metrics(metrics: &ShotMetrics) -> Vec<u8> {
        let ball = ProtoWriter::new()
            .float(field::LAUNCH_ANGLE, metrics.launch_angle_deg)
            .float(field::LAUNCH_DIRECTION, metrics.launch_direction_deg)
            .float(field::BALL_SPEED, metrics.ball_speed_mps)
            .float(field::SPIN_AXIS, metrics.spin_axis_deg)
            .float(field::TOTAL_SPIN, metrics.total_spin_rpm)
            .finish();
        let mut club = ProtoWriter::new();
        for (number, value) in [
            (field::CLUB_HEAD_SPEED, metrics.club_head_speed_mps),
            (field::CLUB_ANGLE_FACE, metrics.club_face_deg),
            (field::CLUB_ANGLE_PATH, metrics.club_path_deg),
            (field::ATTACK_ANGLE, metrics.attack_angle_deg),
        ] {
            if let Some(v) = value {
                club = club.float(number, v);
            }
        }
        ProtoWriter::new()
            .varint(field::SHOT_ID, u64::from(metrics.shot_id))
            .varint(field::SHOT_TYPE, u64::from(metrics.shot_type))
            .message(field::BALL_METRICS, &ball)
            .message(field::CLUB_METRICS, &club.finish())
            .finish()
    }
}
