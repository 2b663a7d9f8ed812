use super::MetadataSource;
use crate::notice::TerminationNotice;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Polls a metadata source until a termination notice shows up.
///
/// `wait_for_notice` consumes the poller, so a notice is handed off at most
/// once per poller.
pub struct TerminationPoller<S> {
    source: S,
    interval: Duration,
}

impl<S: MetadataSource> TerminationPoller<S> {
    pub fn new(source: S, interval: Duration) -> Self {
        Self { source, interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Single poll. Transient errors are logged and reported as no notice.
    pub async fn poll_once(&self) -> Option<TerminationNotice> {
        match self.source.fetch_notice().await {
            Ok(notice) => notice,
            Err(e) => {
                warn!("Metadata poll failed, treating as no notice: {}", e);
                None
            }
        }
    }

    /// Poll on a fixed cadence until a notice arrives or `cancel` fires.
    /// Returns `None` only when cancelled.
    pub async fn wait_for_notice(self, cancel: &CancellationToken) -> Option<TerminationNotice> {
        info!(
            "Watching for termination notices every {:?}",
            self.interval
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cycles: u64 = 0;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Poll loop cancelled after {} cycles, no notice seen", cycles);
                    return None;
                }
                _ = ticker.tick() => {}
            }

            cycles += 1;
            let notice = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Poll loop cancelled after {} cycles, no notice seen", cycles);
                    return None;
                }
                notice = self.poll_once() => notice,
            };

            match notice {
                Some(notice) => {
                    info!("Termination notice received: {}", notice);
                    return Some(notice);
                }
                None => debug!("No termination notice (cycle {})", cycles),
            }
        }
    }
}
