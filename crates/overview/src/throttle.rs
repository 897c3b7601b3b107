//! Trailing throttle: at most one fire per interval, first fire immediate,
//! and a trigger that lands during the cooldown is served once it ends.
//!
//! The throttle does not own the refresh operation. `trigger` and
//! `on_elapsed` return `true` when the caller should run it now. The cooldown
//! timer is a spawned task that reports back through `notify`, so expiry is
//! handled on the caller's event queue like any other event.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::task::JoinHandle;
use tracing::debug;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

/// Posted when a cooldown ends. Expiries from a cancelled or superseded
/// cooldown carry an old generation and are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownElapsed {
    pub generation: u64,
}

type Notify = Arc<dyn Fn(CooldownElapsed) + Send + Sync>;

pub struct Throttle {
    interval: Duration,
    cooling: bool,
    pending: bool,
    generation: u64,
    timer: Option<JoinHandle<()>>,
    notify: Notify,
    fires: u64,
}

impl Throttle {
    pub fn new<F>(interval: Duration, notify: F) -> Self
    where
        F: Fn(CooldownElapsed) + Send + Sync + 'static,
    {
        Self { interval, cooling: false, pending: false, generation: 0, timer: None, notify: Arc::new(notify), fires: 0 }
    }

    pub fn interval(&self) -> Duration { self.interval }
    pub fn is_cooling(&self) -> bool { self.cooling }
    pub fn is_pending(&self) -> bool { self.pending }
    pub fn fires(&self) -> u64 { self.fires }

    /// Returns `true` if the wrapped operation should run now.
    #[must_use]
    pub fn trigger(&mut self) -> bool {
        if self.cooling {
            if !self.pending {
                counter!("throttle_deferred_total", 1);
            }
            self.pending = true;
            return false;
        }
        self.fire();
        true
    }

    /// Handle a cooldown expiry; returns `true` if the trailing call should run now.
    #[must_use]
    pub fn on_elapsed(&mut self, ev: CooldownElapsed) -> bool {
        if !self.cooling || ev.generation != self.generation {
            debug!(generation = ev.generation, current = self.generation, "throttle: stale expiry ignored");
            return false;
        }
        self.timer = None;
        if self.pending {
            self.pending = false;
            self.fire();
            true
        } else {
            self.cooling = false;
            debug!("throttle: idle");
            false
        }
    }

    /// Stop the cooldown timer and forget any pending call.
    pub fn cancel(&mut self) {
        if let Some(h) = self.timer.take() {
            h.abort();
        }
        if self.cooling {
            debug!(pending = self.pending, "throttle: cancelled");
        }
        self.cooling = false;
        self.pending = false;
        self.generation = self.generation.wrapping_add(1);
    }

    fn fire(&mut self) {
        self.fires += 1;
        self.generation = self.generation.wrapping_add(1);
        self.cooling = true;
        counter!("throttle_fired_total", 1);
        if let Some(h) = self.timer.take() {
            h.abort();
        }
        let generation = self.generation;
        let interval = self.interval;
        let notify = Arc::clone(&self.notify);
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            notify(CooldownElapsed { generation });
        }));
        debug!(generation, interval_ms = %interval.as_millis(), "throttle: fired; cooling");
    }
}

impl Drop for Throttle {
    fn drop(&mut self) {
        if let Some(h) = self.timer.take() {
            h.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    const D: Duration = Duration::from_secs(10);

    fn secs(v: &[u64]) -> Vec<Duration> { v.iter().map(|s| Duration::from_secs(*s)).collect() }

    /// Run triggers at the given offsets and collect fire offsets until `horizon`.
    async fn drive(triggers: &[Duration], horizon: Duration) -> Vec<Duration> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut th = Throttle::new(D, move |ev| { let _ = tx.send(ev); });
        let start = Instant::now();
        let mut fires = Vec::new();
        let mut next = 0usize;
        loop {
            let deadline = triggers.get(next).copied().unwrap_or(horizon).min(horizon);
            tokio::select! {
                biased;
                Some(ev) = rx.recv() => {
                    if th.on_elapsed(ev) { fires.push(start.elapsed()); }
                }
                _ = tokio::time::sleep_until(start + deadline) => {
                    if next < triggers.len() && triggers[next] <= horizon {
                        if th.trigger() { fires.push(start.elapsed()); }
                        next += 1;
                    } else {
                        break;
                    }
                }
            }
        }
        fires
    }

    #[tokio::test(start_paused = true)]
    async fn triggers_during_cooldown_collapse_into_one_trailing_fire() {
        let fires = drive(&secs(&[0, 2, 4]), Duration::from_secs(60)).await;
        assert_eq!(fires, secs(&[0, 10]));
    }

    #[tokio::test(start_paused = true)]
    async fn single_trigger_fires_once() {
        let fires = drive(&secs(&[3]), Duration::from_secs(60)).await;
        assert_eq!(fires, secs(&[3]));
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_after_idle_fires_immediately_again() {
        // 0 fires; cooldown ends at 10 with nothing pending; 25 fires at once.
        let fires = drive(&secs(&[0, 25]), Duration::from_secs(60)).await;
        assert_eq!(fires, secs(&[0, 25]));
    }

    #[tokio::test(start_paused = true)]
    async fn steady_triggers_respect_rate_bound() {
        // 700ms period never lines up with a 10s cooldown boundary
        let triggers: Vec<Duration> = (0..65u64).map(|k| Duration::from_millis(k * 700 + 100)).collect();
        let horizon = Duration::from_secs(90);
        let fires = drive(&triggers, horizon).await;
        for pair in fires.windows(2) {
            assert!(pair[1] - pair[0] >= D, "fires too close: {:?}", pair);
        }
        // any window of length T holds at most ceil(T/D) + 1 fires
        let t = Duration::from_secs(25);
        for (i, start) in fires.iter().enumerate() {
            let in_window = fires[i..].iter().take_while(|f| **f - *start <= t).count();
            let bound = (t.as_secs_f64() / D.as_secs_f64()).ceil() as usize + 1;
            assert!(in_window <= bound);
        }
        assert_eq!(fires.first().copied(), Some(Duration::from_millis(100)));
        // the last trigger (44.9s) lands in the cooldown that started at 40.1s
        assert_eq!(fires.last().copied(), Some(Duration::from_millis(50_100)));
        assert_eq!(fires.len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_drops_pending_call_and_stale_expiry() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut th = Throttle::new(D, move |ev| { let _ = tx.send(ev); });
        assert!(th.trigger());
        assert!(!th.trigger());
        assert!(th.is_pending());
        let stale = CooldownElapsed { generation: 1 };
        th.cancel();
        assert!(!th.is_cooling());
        assert!(!th.is_pending());
        tokio::time::advance(Duration::from_secs(30)).await;
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
        // an expiry already queued before cancel changes nothing
        assert!(!th.on_elapsed(stale));
        assert_eq!(th.fires(), 1);
    }
}
