//! Background auto-lock and token-expiry checks

use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::controller::SessionController;

/// Run [`SessionController::check_timers`] every `period` until cancelled
///
/// The task only holds a weak handle, so it stops by itself once the
/// controller is dropped.
pub(crate) fn spawn(
    controller: Weak<SessionController>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Session monitor cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    let Some(controller) = controller.upgrade() else {
                        debug!("Session monitor stopping, controller dropped");
                        break;
                    };
                    controller.check_timers().await;
                }
            }
        }
    })
}
