use std::collections::BTreeSet;
use std::time::Instant;

use uuid::Uuid;

use crate::config::SessionConfig;
use crate::liveness::LivenessMonitor;
use crate::peripheral::PeripheralHandle;
use crate::profile::{DeviceProfile, Negotiated};
use crate::state::{ConnectionState, TransitionError};

/// Everything one session knows about its link.
///
/// Owned by a single session; its tasks share it behind a mutex and never hand
/// it to another session.
#[derive(Debug)]
pub struct ConnectionContext {
    state: ConnectionState,
    pub profile: DeviceProfile,
    pub peripheral: Option<PeripheralHandle>,
    pub negotiated: Negotiated,
    pub subscribed: BTreeSet<Uuid>,
    pub liveness: LivenessMonitor,
    message_counter: u32,
    header: Option<u8>,
    bring_up_in_flight: bool,
}

impl ConnectionContext {
    pub fn new(profile: DeviceProfile, config: &SessionConfig) -> Self {
        Self {
            state: ConnectionState::Idle,
            profile,
            peripheral: None,
            negotiated: Negotiated::default(),
            subscribed: BTreeSet::new(),
            liveness: LivenessMonitor::new(
                config.heartbeat_deadline(),
                config.max_missed_heartbeats,
            ),
            message_counter: 0,
            header: None,
            bring_up_in_flight: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn transition(&mut self, to: ConnectionState) -> Result<(), TransitionError> {
        self.state = self.state.transition(to)?;
        Ok(())
    }

    /// Drops all per-link state and returns to `Idle`.
    pub fn reset(&mut self) {
        self.state = ConnectionState::Idle;
        self.peripheral = None;
        self.negotiated = Negotiated::default();
        self.subscribed.clear();
        self.liveness.disarm();
        self.message_counter = 0;
        self.header = None;
        self.bring_up_in_flight = false;
    }

    pub fn mark_ready(&mut self, now: Instant) -> Result<(), TransitionError> {
        self.transition(ConnectionState::Ready)?;
        self.liveness.arm(now);
        Ok(())
    }

    pub fn message_counter(&self) -> u32 {
        self.message_counter
    }

    /// Returns the counter for the next outgoing message and advances it.
    pub fn next_sequence(&mut self) -> u32 {
        let current = self.message_counter;
        self.message_counter = self.message_counter.wrapping_add(1);
        current
    }

    pub fn header(&self) -> Option<u8> {
        self.header
    }

    pub fn set_header(&mut self, header: u8) {
        self.header = Some(header);
    }

    pub fn bring_up_in_flight(&self) -> bool {
        self.bring_up_in_flight
    }

    /// Claims the single bring-up slot; false when one is already running.
    pub fn begin_bring_up(&mut self) -> bool {
        !std::mem::replace(&mut self.bring_up_in_flight, true)
    }

    pub fn end_bring_up(&mut self) {
        self.bring_up_in_flight = false;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::profile::DeviceModel;

    fn context() -> ConnectionContext {
        ConnectionContext::new(
            DeviceProfile::for_model(DeviceModel::R10),
            &SessionConfig::default(),
        )
    }

    #[test]
    fn counter_advances_and_resets() {
        let mut ctx = context();
        assert_eq!(ctx.next_sequence(), 0);
        assert_eq!(ctx.next_sequence(), 1);
        assert_eq!(ctx.message_counter(), 2);
        ctx.reset();
        assert_eq!(ctx.message_counter(), 0);
    }

    #[test]
    fn only_one_bring_up_at_a_time() {
        let mut ctx = context();
        assert!(ctx.begin_bring_up());
        assert!(!ctx.begin_bring_up());
        ctx.end_bring_up();
        assert!(ctx.begin_bring_up());
    }

    #[test]
    fn ready_arms_liveness() {
        let mut ctx = context();
        for state in [
            ConnectionState::Scanning,
            ConnectionState::Connecting,
            ConnectionState::DiscoveringServices,
            ConnectionState::SubscribingNotifications,
            ConnectionState::Authenticating,
        ] {
            ctx.transition(state).unwrap();
        }
        ctx.mark_ready(Instant::now()).unwrap();
        assert!(ctx.liveness.is_armed());
        ctx.reset();
        assert_eq!(ctx.state(), ConnectionState::Idle);
        assert!(!ctx.liveness.is_armed());
    }

    #[test]
    fn invalid_transition_leaves_state() {
        let mut ctx = context();
        assert!(ctx.transition(ConnectionState::Ready).is_err());
        assert_eq!(ctx.state(), ConnectionState::Idle);
    }
}
