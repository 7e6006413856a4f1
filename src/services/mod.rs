pub mod deadline_watcher;
pub mod notification_worker;

use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub use deadline_watcher::DeadlineWatcher;
pub use notification_worker::NotificationWorker;

/// Sleeps for `duration` unless `token` fires first. Returns `true` if cancelled.
pub async fn sleep_or_cancelled(token: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = token.cancelled() => true,
        _ = tokio::time::sleep(duration) => false,
    }
}
