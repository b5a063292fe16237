//! Keepalive Watchdog: periodic liveness ping while a stream is active.
//!
//! The browser tears down a native host that looks idle. While a session
//! streams, the watchdog calls its sink every `period`; the host turns that
//! into a `KEEPALIVE` frame on stdout. It never touches session data.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Called on every tick with the id of the session being kept alive.
pub type KeepaliveSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Upper bound for the period; hosts are suspended after about a minute.
pub const MAX_KEEPALIVE_PERIOD: Duration = Duration::from_secs(59);

pub struct KeepaliveWatchdog {
    period: Duration,
    sink: KeepaliveSink,
    task: Option<JoinHandle<()>>,
}

impl KeepaliveWatchdog {
    pub fn new(period: Duration, sink: KeepaliveSink) -> Self {
        Self {
            period: period.clamp(Duration::from_millis(1), MAX_KEEPALIVE_PERIOD),
            sink,
            task: None,
        }
    }

    /// Start ticking for `session_id`, replacing any running timer.
    pub fn start(&mut self, session_id: &str) {
        self.stop();

        let period = self.period;
        let sink = Arc::clone(&self.sink);
        let session_id = session_id.to_string();

        self.task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                tracing::trace!(session_id = %session_id, "keepalive tick");
                sink(&session_id);
            }
        }));
        tracing::debug!(period_ms = period.as_millis() as u64, "keepalive watchdog started");
    }

    /// Cancel the timer. Safe to call when not running.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!("keepalive watchdog stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for KeepaliveWatchdog {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_sink() -> (KeepaliveSink, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        (Arc::new(move |_: &str| {
            c.fetch_add(1, Ordering::SeqCst);
        }), count)
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_while_running_and_stops() {
        let (sink, count) = counting_sink();
        let mut watchdog = KeepaliveWatchdog::new(Duration::from_secs(20), sink);

        watchdog.start("s1");
        assert!(watchdog.is_running());
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        watchdog.stop();
        assert!(!watchdog.is_running());
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (sink, _) = counting_sink();
        let mut watchdog = KeepaliveWatchdog::new(Duration::from_secs(20), sink);
        watchdog.stop();
        watchdog.start("s1");
        watchdog.stop();
        watchdog.stop();
        assert!(!watchdog.is_running());
    }

    #[test]
    fn test_period_is_clamped_below_a_minute() {
        let (sink, _) = counting_sink();
        let watchdog = KeepaliveWatchdog::new(Duration::from_secs(300), sink);
        assert_eq!(watchdog.period, MAX_KEEPALIVE_PERIOD);
    }
}
