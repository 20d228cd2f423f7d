use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, warn};

use swingbridge_domain::event::{SessionEvent, SessionFault};
use swingbridge_domain::liveness::Liveness;

use crate::error::SubscribeError;
use crate::session::{Beat, Session};
use crate::{Central, Link};

/// Keeps a `Ready` session alive until it leaves `Ready` or stops answering.
pub(crate) fn spawn<C: Central>(session: Session<C>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(session.config().heartbeat_tick());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(Beat {
                link,
                keep_alive,
                liveness,
            }) = session.beat().await
            else {
                debug!("session left Ready, heartbeat stopped");
                break;
            };
            if let Some(write) = keep_alive
                && let Err(error) = link
                    .write(write.characteristic, &write.data, write.with_response)
                    .await
            {
                warn!(%error, "keep-alive write failed");
            }
            match liveness {
                Liveness::Alive => {}
                Liveness::Resubscribe { missed } => {
                    warn!(missed, "heartbeat deadline passed, resubscribing");
                    if let Err(e) = session.resubscribe(&link).await {
                        error!(error = %e, "resubscribe gave up");
                        if let SubscribeError::Exhausted {
                            characteristic,
                            attempts,
                            ..
                        } = e
                        {
                            session.emit(SessionEvent::error(SessionFault::SubscribeExhausted {
                                characteristic,
                                attempts,
                            }));
                        }
                        session.disconnect_in_background();
                        break;
                    }
                }
                Liveness::Lost { missed } => {
                    error!(missed, "launch monitor stopped responding");
                    session.emit(SessionEvent::error(SessionFault::HeartbeatLost { missed }));
                    session.disconnect_in_background();
                    break;
                }
            }
        }
    })
}
