use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use swingbridge_domain::peripheral::{NameMatcher, PeripheralHandle};

use crate::{Central, ScanError};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Scans until an advertisement matches, `timeout` elapses or `cancel` fires.
#[instrument(skip(central, cancel), level = "debug")]
pub async fn find_first<C: Central>(
    central: &C,
    matcher: &NameMatcher,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<PeripheralHandle, ScanError> {
    if cancel.is_cancelled() {
        return Err(ScanError::Cancelled);
    }
    central.start_scan().await?;
    let outcome = tokio::select! {
        _ = cancel.cancelled() => Err(ScanError::Cancelled),
        found = poll_until_match(central, matcher) => found,
        _ = sleep(timeout) => Err(ScanError::NotFound(timeout)),
    };
    if let Err(error) = central.stop_scan().await {
        debug!(%error, "failed to stop scan cleanly");
    }
    outcome
}

async fn poll_until_match<C: Central>(
    central: &C,
    matcher: &NameMatcher,
) -> Result<PeripheralHandle, ScanError> {
    loop {
        for advertisement in central.advertisements().await? {
            if let Some(handle) = advertisement.try_into_handle(matcher) {
                info!(%handle, rssi = ?advertisement.rssi, "found launch monitor");
                return Ok(handle);
            }
        }
        sleep(POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fake::FakeCentral;
    use swingbridge_domain::peripheral::Advertisement;

    fn mlm2pro_matcher() -> NameMatcher {
        NameMatcher::Prefixes(vec!["MLM2-".to_string(), "BlueZ ".to_string()])
    }

    #[tokio::test(start_paused = true)]
    async fn finds_device_by_prefix() {
        let central = FakeCentral::default();
        central.advertise(Advertisement::new("1", "AA:BB", Some("Speaker".to_string())));
        central.advertise(Advertisement::new("2", "CC:DD", Some("MLM2-12345".to_string())));
        let handle = find_first(&central, &mlm2pro_matcher(), Duration::from_secs(40), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(handle.name, "MLM2-12345");
        assert_eq!(handle.id, "2");
        assert!(!central.is_scanning());
    }

    #[tokio::test(start_paused = true)]
    async fn device_appearing_later_is_found() {
        let central = FakeCentral::default();
        let background = central.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(5)).await;
            background.advertise(Advertisement::new("9", "EE:FF", Some("BlueZ 5.64".to_string())));
        });
        let handle = find_first(&central, &mlm2pro_matcher(), Duration::from_secs(40), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(handle.name, "BlueZ 5.64");
    }

    #[tokio::test(start_paused = true)]
    async fn times_out() {
        let central = FakeCentral::default();
        central.advertise(Advertisement::new("1", "AA:BB", Some("Speaker".to_string())));
        let result = find_first(&central, &mlm2pro_matcher(), Duration::from_secs(40), &CancellationToken::new()).await;
        assert!(matches!(result, Err(ScanError::NotFound(d)) if d == Duration::from_secs(40)));
        assert!(!central.is_scanning());
    }

    #[tokio::test(start_paused = true)]
    async fn can_be_cancelled() {
        let central = FakeCentral::default();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });
        let result = find_first(&central, &mlm2pro_matcher(), Duration::from_secs(40), &cancel).await;
        assert!(matches!(result, Err(ScanError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_start_never_scans() {
        let central = FakeCentral::default();
        central.advertise(Advertisement::new("2", "CC:DD", Some("MLM2-12345".to_string())));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = find_first(&central, &mlm2pro_matcher(), Duration::from_secs(40), &cancel).await;
        assert!(matches!(result, Err(ScanError::Cancelled)));
        assert!(!central.is_scanning());
    }
}
