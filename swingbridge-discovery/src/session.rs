//! Drives one launch monitor through the connection state machine.
//!
//! A [`Session`] is a cheap handle; clones share the same link, context and
//! event channel. The context sits behind a mutex that only this session's own
//! notification, heartbeat and watchdog tasks touch.

use std::sync::{Arc, PoisonError};

use futures::StreamExt;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use swingbridge_domain::bytes::to_hex;
use swingbridge_domain::config::{DeviceSelection, SessionConfig};
use swingbridge_domain::context::ConnectionContext;
use swingbridge_domain::event::{SessionEvent, SessionFault};
use swingbridge_domain::liveness::Liveness;
use swingbridge_domain::message::ConnectionStatus;
use swingbridge_domain::peripheral::PeripheralHandle;
use swingbridge_domain::profile::DeviceProfile;
use swingbridge_domain::protocol::{
    AuthError, BringUp, DropReason, OutboundWrite, Protocol, RawNotification,
};
use swingbridge_domain::state::ConnectionState;

use crate::error::{ConnectError, ScanError, SessionError, SubscribeError};
use crate::{Central, Link, NotificationStream, SharedCentral, heartbeat, scanner};

struct Core<L> {
    ctx: ConnectionContext,
    protocol: Protocol,
    link: Option<Arc<L>>,
    tasks: Vec<JoinHandle<()>>,
}

struct Inner<C: Central> {
    shared: SharedCentral<C>,
    selection: DeviceSelection,
    config: SessionConfig,
    core: Mutex<Core<C::Link>>,
    events: mpsc::UnboundedSender<SessionEvent>,
    /// Token of the scan in flight, replaced each time a scan enters `Scanning`.
    scan_cancel: std::sync::Mutex<CancellationToken>,
}

pub struct Session<C: Central> {
    inner: Arc<Inner<C>>,
}

impl<C: Central> Clone for Session<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// What the heartbeat task needs for one tick.
pub(crate) struct Beat<L> {
    pub link: Arc<L>,
    pub keep_alive: Option<OutboundWrite>,
    pub liveness: Liveness,
}

impl<C: Central> Session<C> {
    pub fn new(
        shared: SharedCentral<C>,
        selection: DeviceSelection,
        config: SessionConfig,
    ) -> (Session<C>, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let profile = DeviceProfile::for_model(selection.model);
        let core = Core {
            ctx: ConnectionContext::new(profile, &config),
            protocol: Protocol::for_model(selection.model, config.environment.clone()),
            link: None,
            tasks: Vec::new(),
        };
        let inner = Inner {
            shared,
            selection,
            config,
            core: Mutex::new(core),
            events,
            scan_cancel: std::sync::Mutex::new(CancellationToken::new()),
        };
        (
            Session {
                inner: Arc::new(inner),
            },
            rx,
        )
    }

    pub async fn state(&self) -> ConnectionState {
        self.inner.core.lock().await.ctx.state()
    }

    pub fn selection(&self) -> &DeviceSelection {
        &self.inner.selection
    }

    pub(crate) fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Characteristics negotiated for notifications on the current link.
    pub async fn notify_characteristics(&self) -> Vec<Uuid> {
        self.inner.core.lock().await.ctx.negotiated.notify.clone()
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        if self.inner.events.send(event).is_err() {
            trace!("event receiver dropped");
        }
    }

    /// Scans for the selected device. On success the session stays in
    /// `Scanning` holding the handle until [`Session::connect`].
    pub async fn scan(&self) -> Result<PeripheralHandle, ScanError> {
        let Ok(_radio) = self.inner.shared.radio.try_lock() else {
            warn!(model = %self.inner.selection.model, "scan rejected, adapter already scanning");
            return Err(ScanError::AlreadyScanning);
        };
        let cancel = {
            let mut core = self.inner.core.lock().await;
            let state = core.ctx.state();
            if state != ConnectionState::Idle {
                return Err(ScanError::InvalidState(state));
            }
            core.ctx
                .transition(ConnectionState::Scanning)
                .map_err(|e| ScanError::InvalidState(e.from))?;
            let cancel = CancellationToken::new();
            *self.scan_token() = cancel.clone();
            cancel
        };

        let matcher = self.inner.selection.matcher();
        let result = scanner::find_first(
            self.inner.shared.central(),
            &matcher,
            self.inner.config.scan_timeout(),
            &cancel,
        )
        .await;

        let mut core = self.inner.core.lock().await;
        let result = match result {
            Ok(_) if core.ctx.state() != ConnectionState::Scanning => Err(ScanError::Cancelled),
            other => other,
        };
        match result {
            Ok(handle) => {
                core.ctx.peripheral = Some(handle.clone());
                Ok(handle)
            }
            Err(e) => {
                warn!(error = %e, "scan ended without a device");
                abort_to_idle(&mut core);
                Err(e)
            }
        }
    }

    /// Cancels the scan in flight. Takes effect even if the scan has not
    /// reached the radio yet.
    pub fn stop_scan(&self) {
        self.scan_token().cancel();
    }

    fn scan_token(&self) -> std::sync::MutexGuard<'_, CancellationToken> {
        self.inner
            .scan_cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens the link and discovers services. Only valid right after a
    /// successful scan.
    pub async fn connect(&self, handle: &PeripheralHandle) -> Result<(), ConnectError> {
        {
            let mut core = self.inner.core.lock().await;
            let state = core.ctx.state();
            if state.is_active() {
                warn!(%handle, %state, "connect rejected, session already active");
                return Err(ConnectError::AlreadyActive(state));
            }
            if state != ConnectionState::Scanning {
                return Err(ConnectError::InvalidState(state));
            }
            core.ctx
                .transition(ConnectionState::Connecting)
                .map_err(|e| ConnectError::InvalidState(e.from))?;
            core.ctx.peripheral = Some(handle.clone());
        }
        self.emit(SessionEvent::status(ConnectionStatus::Connecting));

        match self.open_link(handle).await {
            Ok(()) => Ok(()),
            Err(e) => {
                error!(%handle, error = %e, "connect failed");
                self.emit(SessionEvent::status(ConnectionStatus::Error));
                self.disconnect().await;
                Err(e)
            }
        }
    }

    async fn open_link(&self, handle: &PeripheralHandle) -> Result<(), ConnectError> {
        let link = {
            let _radio = self.inner.shared.radio.lock().await;
            Arc::new(self.inner.shared.central().connect(handle).await?)
        };
        info!(%handle, "link open");
        {
            let mut core = self.inner.core.lock().await;
            if let Err(e) = core.ctx.transition(ConnectionState::DiscoveringServices) {
                drop(core);
                if let Err(error) = link.disconnect().await {
                    debug!(%error, "closing abandoned link failed");
                }
                return Err(ConnectError::InvalidState(e.from));
            }
            core.link = Some(link.clone());
        }

        let services = link.discover_services().await?;
        let negotiated = self.inner.core.lock().await.ctx.profile.negotiate(&services)?;
        debug!(notify = ?negotiated.notify, reads = ?negotiated.info_reads, "services negotiated");

        let mut reads = Vec::new();
        for characteristic in &negotiated.info_reads {
            match link.read(*characteristic).await {
                Ok(value) => reads.push((*characteristic, value)),
                Err(error) => warn!(%characteristic, %error, "device information read failed"),
            }
        }
        let stream = link.notifications().await?;

        let mut core = self.inner.core.lock().await;
        core.ctx.negotiated = negotiated;
        if let Some(info) = core.protocol.info_message(&reads) {
            self.emit(SessionEvent::message(info));
        }
        let pump = tokio::spawn(self.clone().pump_notifications(link, stream));
        core.tasks.push(pump);
        Ok(())
    }

    /// Subscribes to each characteristic, retrying with a fixed backoff.
    /// Exhausting the attempts on any of them tears the session down.
    pub async fn subscribe_notifications(
        &self,
        characteristics: &[Uuid],
    ) -> Result<(), SubscribeError> {
        let link = {
            let mut core = self.inner.core.lock().await;
            let state = core.ctx.state();
            let Some(link) = core.link.clone() else {
                return Err(SubscribeError::InvalidState(state));
            };
            core.ctx
                .transition(ConnectionState::SubscribingNotifications)
                .map_err(|e| SubscribeError::InvalidState(e.from))?;
            link
        };
        for characteristic in characteristics {
            if let Err(e) = self.subscribe_with_retry(&link, *characteristic).await {
                error!(error = %e, "giving up on notifications");
                if let SubscribeError::Exhausted {
                    characteristic,
                    attempts,
                    ..
                } = &e
                {
                    self.emit(SessionEvent::error(SessionFault::SubscribeExhausted {
                        characteristic: *characteristic,
                        attempts: *attempts,
                    }));
                }
                self.disconnect().await;
                return Err(e);
            }
        }
        Ok(())
    }

    async fn subscribe_with_retry(
        &self,
        link: &C::Link,
        characteristic: Uuid,
    ) -> Result<(), SubscribeError> {
        let attempts = self.inner.config.subscribe_attempts.max(1);
        let mut attempt = 1;
        loop {
            match link.subscribe(characteristic).await {
                Ok(()) => {
                    debug!(%characteristic, attempt, "subscribed");
                    self.inner
                        .core
                        .lock()
                        .await
                        .ctx
                        .subscribed
                        .insert(characteristic);
                    return Ok(());
                }
                Err(source) if attempt >= attempts => {
                    return Err(SubscribeError::Exhausted {
                        characteristic,
                        attempts,
                        source,
                    });
                }
                Err(error) => {
                    warn!(%characteristic, attempt, %error, "subscribe failed, retrying");
                    sleep(self.inner.config.subscribe_backoff()).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Re-runs the subscribe cycle without changing state, stopping at the
    /// first characteristic that exhausts its attempts.
    pub(crate) async fn resubscribe(&self, link: &C::Link) -> Result<(), SubscribeError> {
        for characteristic in self.notify_characteristics().await {
            self.subscribe_with_retry(link, characteristic).await?;
        }
        Ok(())
    }

    /// Starts authentication (MLM2PRO) or the handshake (R10). Completion is
    /// reported on the event channel as `ConnectionStatus::Connected`.
    pub async fn authenticate(&self) -> Result<(), AuthError> {
        let (link, writes) = {
            let mut core = self.inner.core.lock().await;
            let Core {
                ctx,
                protocol,
                link,
                ..
            } = &mut *core;
            let Some(link) = link.clone() else {
                return Err(AuthError::InvalidState(ctx.state()));
            };
            if ctx.state() == ConnectionState::SubscribingNotifications {
                ctx.transition(ConnectionState::Authenticating)
                    .map_err(|e| AuthError::InvalidState(e.from))?;
            }
            let writes = protocol.start_bring_up(ctx).inspect_err(|error| {
                warn!(%error, "authenticate rejected");
            })?;
            info!(model = %protocol.model(), "authenticating");
            (link, writes)
        };

        for write in &writes {
            if let Err(error) = link
                .write(write.characteristic, &write.data, write.with_response)
                .await
            {
                self.inner.core.lock().await.ctx.end_bring_up();
                return Err(AuthError::Write(error.to_string()));
            }
        }

        let watchdog = tokio::spawn(self.clone().bring_up_watchdog());
        self.inner.core.lock().await.tasks.push(watchdog);
        Ok(())
    }

    async fn bring_up_watchdog(self) {
        let timeout = self.inner.config.bring_up_timeout();
        sleep(timeout).await;
        if self.state().await == ConnectionState::Authenticating {
            error!(?timeout, "device did not become ready");
            self.emit(SessionEvent::error(SessionFault::BringUpTimeout {
                secs: timeout.as_secs(),
            }));
            self.disconnect_in_background();
        }
    }

    async fn pump_notifications(self, link: Arc<C::Link>, mut stream: NotificationStream) {
        while let Some(notification) = stream.next().await {
            self.on_notification(&link, notification).await;
        }
        let state = self.state().await;
        if !matches!(state, ConnectionState::Idle | ConnectionState::Disconnecting) {
            warn!(%state, "notification stream closed");
            self.emit(SessionEvent::error(SessionFault::LinkClosed));
            self.disconnect_in_background();
        }
    }

    async fn on_notification(&self, link: &C::Link, notification: RawNotification) {
        let RawNotification {
            characteristic,
            value,
        } = notification;
        trace!(%characteristic, value = %to_hex(&value), "notification");

        let reaction = {
            let mut core = self.inner.core.lock().await;
            let Core { ctx, protocol, .. } = &mut *core;
            let reaction = protocol.on_notification(ctx, characteristic, &value);
            if reaction.heartbeat {
                ctx.liveness.heartbeat_received(Instant::now().into_std());
            }
            reaction
        };

        for reason in &reaction.dropped {
            match reason {
                DropReason::Misread => info!("misread shot ignored"),
                _ => warn!(%characteristic, %reason, "notification dropped"),
            }
        }
        for write in &reaction.writes {
            if let Err(error) = link
                .write(write.characteristic, &write.data, write.with_response)
                .await
            {
                warn!(characteristic = %write.characteristic, %error, "write failed");
            }
        }
        for message in reaction.messages {
            self.emit(SessionEvent::message(message));
        }
        match reaction.bring_up {
            Some(BringUp::Complete) => self.on_ready().await,
            Some(BringUp::Rejected { code }) => {
                error!(code, "authentication rejected");
                self.emit(SessionEvent::error(SessionFault::AuthRejected { code }));
                self.disconnect_in_background();
            }
            None => {}
        }
    }

    async fn on_ready(&self) {
        let mut core = self.inner.core.lock().await;
        if let Err(error) = core.ctx.mark_ready(Instant::now().into_std()) {
            warn!(%error, "bring-up completed in an unexpected state");
            return;
        }
        if let Some(peripheral) = &core.ctx.peripheral {
            info!(%peripheral, "launch monitor ready");
        }
        let task = heartbeat::spawn(self.clone());
        core.tasks.push(task);
        drop(core);
        self.emit(SessionEvent::status(ConnectionStatus::Connected));
    }

    /// Liveness bookkeeping for one heartbeat tick; `None` once not `Ready`.
    pub(crate) async fn beat(&self) -> Option<Beat<C::Link>> {
        let mut core = self.inner.core.lock().await;
        if core.ctx.state() != ConnectionState::Ready {
            return None;
        }
        let link = core.link.clone()?;
        let keep_alive = core.protocol.keep_alive(&core.ctx);
        let liveness = core.ctx.liveness.check(Instant::now().into_std());
        Some(Beat {
            link,
            keep_alive,
            liveness,
        })
    }

    /// Best-effort teardown: disarm, unsubscribe, close the link, stop the
    /// session's tasks and return to `Idle`.
    pub async fn disconnect(&self) {
        self.stop_scan();
        let (state, link, farewell, subscribed, tasks) = {
            let mut core = self.inner.core.lock().await;
            let state = core.ctx.state();
            if matches!(state, ConnectionState::Idle | ConnectionState::Disconnecting) {
                return;
            }
            let farewell = core.protocol.farewell(&core.ctx);
            if let Err(error) = core.ctx.transition(ConnectionState::Disconnecting) {
                debug!(%error, "disconnect transition");
            }
            let subscribed: Vec<Uuid> = core.ctx.subscribed.iter().copied().collect();
            (
                state,
                core.link.take(),
                farewell,
                subscribed,
                std::mem::take(&mut core.tasks),
            )
        };
        info!(from = %state, "disconnecting");

        for task in tasks {
            task.abort();
        }
        if let Some(link) = link {
            for write in farewell {
                if let Err(error) = link
                    .write(write.characteristic, &write.data, write.with_response)
                    .await
                {
                    debug!(%error, "farewell write failed");
                }
            }
            for characteristic in subscribed {
                if let Err(error) = link.unsubscribe(characteristic).await {
                    debug!(%characteristic, %error, "unsubscribe failed");
                }
            }
            if let Err(error) = link.disconnect().await {
                warn!(%error, "disconnect failed");
            }
        }

        {
            let mut core = self.inner.core.lock().await;
            core.ctx.reset();
            core.protocol.reset();
        }
        self.emit(SessionEvent::status(ConnectionStatus::Disconnected));
    }

    /// Disconnects from a task the teardown does not abort.
    pub(crate) fn disconnect_in_background(&self) {
        let session = self.clone();
        tokio::spawn(async move { session.disconnect().await });
    }

    /// Scan, connect, subscribe and start authentication in one go.
    pub async fn connect_device(&self) -> Result<PeripheralHandle, SessionError> {
        let handle = self.scan().await?;
        self.connect(&handle).await?;
        let characteristics = self.notify_characteristics().await;
        self.subscribe_notifications(&characteristics).await?;
        if let Err(error) = self.authenticate().await {
            self.disconnect().await;
            return Err(error.into());
        }
        Ok(handle)
    }
}

fn abort_to_idle<L>(core: &mut Core<L>) {
    if let Err(error) = core.ctx.transition(ConnectionState::Disconnecting) {
        debug!(%error, "abort transition");
    }
    core.ctx.reset();
    core.protocol.reset();
}
