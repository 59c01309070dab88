use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

use super::socket::OutboundFrame;

/// Heartbeat interval that keeps hosting proxies from reaping idle sockets
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);

/// Periodic transport-level ping on a connection's outbound channel.
///
/// Unanswered pings are not treated as a disconnect; the transport's own
/// error and close events decide that.
pub struct KeepAlive {
    task: JoinHandle<()>,
}

impl KeepAlive {
    pub fn start(outbound: mpsc::UnboundedSender<OutboundFrame>, period: Duration) -> Self {
        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if outbound.send(OutboundFrame::Ping).is_err() {
                    debug!("Outbound channel closed, heartbeat finished");
                    break;
                }
            }
        });
        Self { task }
    }

    pub fn stop(self) {
        self.task.abort();
    }
}
