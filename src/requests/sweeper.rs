//! Background sweep of stale registry entries

use super::RequestRegistry;
use crate::config::RequestConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Run [`RequestRegistry::cleanup_old`] every `interval` until `shutdown` fires
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use chatkeep::requests::{spawn_sweeper, RequestRegistry};
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() {
///     let registry = Arc::new(RequestRegistry::new());
///     let shutdown = CancellationToken::new();
///     let handle = spawn_sweeper(
///         Arc::clone(&registry),
///         Duration::from_secs(60),
///         Duration::from_secs(300),
///         shutdown.clone(),
///     );
///     shutdown.cancel();
///     handle.await.unwrap();
/// }
/// ```
pub fn spawn_sweeper(
    registry: Arc<RequestRegistry>,
    interval: Duration,
    max_age: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let interval = interval.max(Duration::from_millis(1));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    tracing::debug!("Request sweeper stopped");
                    break;
                }

                _ = ticker.tick() => {
                    registry.cleanup_old(max_age);
                }
            }
        }
    })
}

/// Start a sweeper using the interval and age limit from `config`
pub fn spawn_configured_sweeper(
    registry: Arc<RequestRegistry>,
    config: &RequestConfig,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tracing::debug!(
        interval_secs = config.sweep_interval_seconds,
        max_age_secs = config.max_age_seconds,
        "Starting request sweeper"
    );
    spawn_sweeper(registry, config.sweep_interval(), config.max_age(), shutdown)
}
