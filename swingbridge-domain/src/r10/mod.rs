//! Garmin Approach R10.
//!
//! Bring-up is a header handshake on the interface characteristics followed by
//! protobuf requests carried in framed, COBS encoded, chunked writes.

pub mod framing;
pub mod proto;

use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::bytes::to_hex;
use crate::config::ShotEnvironment;
use crate::context::ConnectionContext;
use crate::message::{DecodedMessage, DeviceEvent, DeviceInfo, ShotMeasurement};
use crate::profile::r10 as profile;
use crate::protocol::{AuthError, BringUp, DropReason, OutboundWrite, Reaction, claim_bring_up};

use framing::{
    FrameAssembler, FrameError, HANDSHAKE_CONTINUE, HANDSHAKE_OPEN, HANDSHAKE_REPLY_PREFIX,
    MessageType,
};
use proto::{DeviceState, R10Message};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum Phase {
    #[default]
    Idle,
    AwaitingHeader,
    Established,
}

#[derive(Debug)]
pub struct R10Engine {
    environment: ShotEnvironment,
    assembler: FrameAssembler,
    phase: Phase,
}

impl R10Engine {
    pub fn new(environment: ShotEnvironment) -> Self {
        Self {
            environment,
            assembler: FrameAssembler::default(),
            phase: Phase::Idle,
        }
    }

    pub fn reset(&mut self) {
        self.assembler.reset();
        self.phase = Phase::Idle;
    }

    pub fn start_bring_up(
        &mut self,
        ctx: &mut ConnectionContext,
    ) -> Result<Vec<OutboundWrite>, AuthError> {
        claim_bring_up(ctx)?;
        self.reset();
        self.phase = Phase::AwaitingHeader;
        Ok(vec![OutboundWrite::with_response(
            profile::WRITER,
            HANDSHAKE_OPEN,
        )])
    }

    pub fn on_notification(
        &mut self,
        ctx: &mut ConnectionContext,
        characteristic: Uuid,
        value: &[u8],
    ) -> Reaction {
        let mut reaction = Reaction::default();
        match (characteristic, self.phase) {
            (profile::BATTERY_LEVEL, _) => match value.first() {
                Some(level) => reaction.messages.push(DecodedMessage::BatteryLevel(*level)),
                None => reaction.discard(DropReason::TooShort(0)),
            },
            (profile::NOTIFIER, Phase::AwaitingHeader) => {
                self.on_handshake_reply(ctx, value, &mut reaction)
            }
            (profile::NOTIFIER, Phase::Established) => self.on_chunk(ctx, value, &mut reaction),
            _ => reaction.discard(DropReason::Unrecognised {
                characteristic,
                payload: value.to_vec(),
            }),
        }
        reaction
    }

    pub fn keep_alive(&self, ctx: &ConnectionContext) -> Option<OutboundWrite> {
        ctx.header()
            .map(|header| OutboundWrite::without_response(ctx.profile.keep_alive, vec![header]))
    }

    fn on_handshake_reply(
        &mut self,
        ctx: &mut ConnectionContext,
        value: &[u8],
        reaction: &mut Reaction,
    ) {
        let header = match value {
            [prefix @ .., header] if prefix == HANDSHAKE_REPLY_PREFIX => *header,
            _ => {
                reaction.discard(DropReason::UnexpectedHandshake(value.to_vec()));
                return;
            }
        };
        debug!("handshake header {header:#04x} received");
        ctx.set_header(header);
        reaction.writes.push(OutboundWrite::with_response(
            profile::WRITER,
            HANDSHAKE_CONTINUE,
        ));
        for request in [
            proto::wake_up_request(),
            proto::status_request(),
            proto::subscribe_alerts_request(),
            proto::shot_config_request(&self.environment),
        ] {
            reaction.writes.extend(request_writes(ctx, header, &request));
        }
        self.phase = Phase::Established;
        ctx.end_bring_up();
        reaction.bring_up = Some(BringUp::Complete);
        reaction.heartbeat = true;
    }

    fn on_chunk(&mut self, ctx: &mut ConnectionContext, value: &[u8], reaction: &mut Reaction) {
        let Some((header, chunk)) = value.split_first() else {
            return;
        };
        let Some(expected) = ctx.header() else {
            return;
        };
        if *header != expected {
            trace!(header, expected, "chunk with unexpected header");
        }
        for frame in self.assembler.push(chunk) {
            match frame {
                Ok(body) => {
                    reaction.heartbeat = true;
                    self.dispatch(ctx, expected, &body, reaction);
                }
                Err(e) => reaction.discard(e),
            }
        }
    }

    fn dispatch(&self, ctx: &mut ConnectionContext, header: u8, body: &[u8], reaction: &mut Reaction) {
        let [first, second, ..] = *body else {
            reaction.discard(FrameError::TooShort(body.len()));
            return;
        };
        match MessageType::from_bytes([first, second]) {
            kind @ (MessageType::ProtoRequest | MessageType::ProtoResponse) => {
                let envelope = match framing::parse_envelope(body) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        reaction.discard(e);
                        return;
                    }
                };
                let ack = framing::build_ack(kind, envelope.counter);
                reaction.writes.extend(frame_writes(header, &ack));
                match proto::decode_wrapper(&envelope.payload) {
                    Ok(messages) => {
                        for message in messages {
                            self.on_message(ctx, header, message, reaction);
                        }
                    }
                    Err(e) => reaction.discard(e),
                }
            }
            MessageType::DeviceInfo | MessageType::Config => {
                debug!(body = %to_hex(body), "device info/config frame");
            }
            MessageType::Ack => trace!(body = %to_hex(body), "ack"),
            MessageType::Unknown(_) => reaction.discard(DropReason::Unrecognised {
                characteristic: profile::NOTIFIER,
                payload: body.to_vec(),
            }),
        }
    }

    fn on_message(
        &self,
        ctx: &mut ConnectionContext,
        header: u8,
        message: R10Message,
        reaction: &mut Reaction,
    ) {
        match message {
            R10Message::StatusResponse(state) => {
                self.on_state(ctx, header, state, reaction);
            }
            R10Message::WakeUpResponse { status } => debug!(status, "wake up response"),
            R10Message::ShotConfigResponse { success } => {
                if !success {
                    warn!("device rejected shot configuration");
                }
            }
            R10Message::SubscribeResponse => debug!("alerts subscribed"),
            R10Message::Alert(details) => {
                if let Some(state) = details.state {
                    self.on_state(ctx, header, state, reaction);
                }
                if let Some(metrics) = details.metrics {
                    reaction
                        .messages
                        .push(DecodedMessage::ShotMeasurement(ShotMeasurement::R10(metrics)));
                }
                if let Some(code) = details.error_code {
                    warn!(code, "device reported an error");
                }
            }
        }
    }

    fn on_state(
        &self,
        ctx: &mut ConnectionContext,
        header: u8,
        state: DeviceState,
        reaction: &mut Reaction,
    ) {
        reaction.messages.push(DecodedMessage::StatusResponse(state));
        let event = match state {
            DeviceState::Waiting => Some(DeviceEvent::Ready),
            DeviceState::Recording => Some(DeviceEvent::ShotDetected),
            DeviceState::Processing => Some(DeviceEvent::Processing),
            DeviceState::Standby => {
                // the device dozes off after a while; wake it again
                reaction
                    .writes
                    .extend(request_writes(ctx, header, &proto::wake_up_request()));
                None
            }
            _ => None,
        };
        if let Some(event) = event {
            reaction.messages.push(DecodedMessage::DeviceEvent(event));
        }
    }
}

/// Frames a protobuf request with the next message counter.
fn request_writes(ctx: &mut ConnectionContext, header: u8, request: &[u8]) -> Vec<OutboundWrite> {
    let counter = ctx.next_sequence() as u8;
    let body = framing::build_envelope(MessageType::ProtoRequest, counter, request);
    frame_writes(header, &body)
}

fn frame_writes(header: u8, body: &[u8]) -> Vec<OutboundWrite> {
    framing::chunk_writes(header, &framing::encode_frame(body))
        .into_iter()
        .map(|chunk| OutboundWrite::with_response(profile::WRITER, chunk))
        .collect()
}

/// Collects the standard device information reads into one message.
pub fn device_info(reads: &[(Uuid, Vec<u8>)]) -> Option<DecodedMessage> {
    let mut info = DeviceInfo::default();
    for (characteristic, value) in reads {
        let text = String::from_utf8_lossy(value)
            .trim_end_matches('\0')
            .trim()
            .to_string();
        match *characteristic {
            profile::MODEL_NUMBER => info.model = Some(text),
            profile::FIRMWARE_REVISION => info.firmware = Some(text),
            profile::SERIAL_NUMBER => info.serial = Some(text),
            _ => {}
        }
    }
    (info != DeviceInfo::default()).then_some(DecodedMessage::DeviceInfo(info))
}
