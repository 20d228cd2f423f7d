use serde::{Deserialize, Serialize};

use crate::mlm2pro::RawMeasurement;
use crate::r10::proto::{DeviceState, ShotMetrics};

/// Metres per second to miles per hour.
const MPS_TO_MPH: f64 = 2.23694;

/// Messages produced by the protocol decoders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DecodedMessage {
    ShotMeasurement(ShotMeasurement),
    DeviceEvent(DeviceEvent),
    BatteryLevel(u8),
    HeartbeatAck,
    WriteResponse(WriteResponse),
    StatusResponse(DeviceState),
    DeviceInfo(DeviceInfo),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ShotMeasurement {
    Mlm2Pro(RawMeasurement),
    R10(ShotMetrics),
}

/// Ball flight in the units the simulator side expects.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BallData {
    pub ball_speed_mph: f64,
    pub club_speed_mph: Option<f64>,
    pub vla_deg: f64,
    pub hla_deg: f64,
    pub spin_axis_deg: f64,
    pub total_spin_rpm: f64,
}

impl ShotMeasurement {
    pub fn ball_data(&self) -> BallData {
        match self {
            ShotMeasurement::Mlm2Pro(raw) => raw.ball_data(),
            ShotMeasurement::R10(metrics) => BallData {
                ball_speed_mph: f64::from(metrics.ball_speed_mps) * MPS_TO_MPH,
                club_speed_mph: metrics
                    .club_head_speed_mps
                    .map(|speed| f64::from(speed) * MPS_TO_MPH),
                vla_deg: f64::from(metrics.launch_angle_deg),
                hla_deg: f64::from(metrics.launch_direction_deg),
                spin_axis_deg: f64::from(metrics.spin_axis_deg),
                total_spin_rpm: f64::from(metrics.total_spin_rpm),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceEvent {
    ShotDetected,
    Processing,
    Ready,
    Misread,
    Disarmed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteResponse {
    Auth(AuthResponse),
    ConfigurationAck { status: u8 },
    Unknown { kind: u8, status: u8, payload: Vec<u8> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthResponse {
    Accepted { initial_parameters_required: bool },
    Rejected { code: u8 },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub model: Option<String>,
    pub firmware: Option<String>,
    pub serial: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
    Error,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn r10_metrics_convert_to_mph() {
        let shot = ShotMeasurement::R10(ShotMetrics {
            shot_id: 7,
            ball_speed_mps: 60.0,
            launch_angle_deg: 12.5,
            launch_direction_deg: -1.5,
            spin_axis_deg: 3.0,
            total_spin_rpm: 2500.0,
            club_head_speed_mps: Some(40.0),
            ..ShotMetrics::default()
        });
        let ball = shot.ball_data();
        assert!((ball.ball_speed_mph - 134.2164).abs() < 1e-3);
        assert!((ball.club_speed_mph.unwrap() - 89.4776).abs() < 1e-3);
        assert_eq!(ball.vla_deg, 12.5);
        assert_eq!(ball.hla_deg, -1.5);
    }

    #[test]
    fn decoded_message_serialises() {
        let json = serde_json::to_string(&DecodedMessage::BatteryLevel(80)).unwrap();
        assert_eq!(json, "{\"BatteryLevel\":80}");
    }
}
