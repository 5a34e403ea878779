use super::FetcherManager;
use log::{debug, info};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Cadence state of one manager instance. The counters live here and are
/// reset only by constructing a new manager.
pub(crate) struct CheckerState {
    tick_count: AtomicU64,
    last_restart_count: AtomicU64,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl CheckerState {
    pub(crate) fn new() -> Self {
        Self {
            tick_count: AtomicU64::new(0),
            last_restart_count: AtomicU64::new(0),
            handle: Mutex::new(None),
        }
    }
}

impl FetcherManager {
    /// Checker firings observed so far. Firings against an empty pool do
    /// not count.
    pub fn tick_count(&self) -> u64 {
        self.checker.tick_count.load(Ordering::Relaxed)
    }

    /// Arms the checker unless it already runs. Called on admission so the
    /// first pool member brings the timer up.
    pub(crate) fn arm_checker(&self) {
        if self.checker.handle.lock().is_some() {
            return;
        }
        self.schedule_checker();
    }

    /// Cancels any armed checker and spawns a fresh periodic task at the
    /// configured interval.
    pub(crate) fn schedule_checker(&self) {
        let mut slot = self.checker.handle.lock();
        if let Some(handle) = slot.take() {
            handle.abort();
        }
        let me = self.me.clone();
        let period = self.check_interval();
        *slot = Some(tokio::spawn(async move {
            let mut timer = tokio::time::interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first interval tick completes immediately
            timer.tick().await;
            loop {
                timer.tick().await;
                let Some(manager) = me.upgrade() else { break };
                manager.on_checker_tick();
            }
        }));
        info!("fetcher checker armed with period {:?}", period);
    }

    /// Idempotent: cancelling with no checker armed is a no-op. A later
    /// admission re-arms.
    pub fn cancel_checker(&self) {
        if let Some(handle) = self.checker.handle.lock().take() {
            handle.abort();
            info!("fetcher checker cancelled");
        }
    }

    pub(crate) fn checker_armed(&self) -> bool {
        self.checker.handle.lock().is_some()
    }

    /// One checker firing: restart every member whenever cumulative elapsed
    /// time crosses another multiple of the restart period, probe liveness
    /// on all other ticks.
    pub(crate) fn on_checker_tick(&self) {
        if self.pool.is_empty() {
            return;
        }
        let ticks = self.checker.tick_count.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("fetcher check count: {}", ticks);

        let (check_interval, restart_period) = {
            let conf = self.configuration.lock();
            (conf.check_interval, conf.restart_period)
        };
        let mut count_to_restart = 0;
        let restart_period_secs = restart_period.as_secs();
        if restart_period_secs > 0 {
            let check_interval_secs = check_interval.as_millis() as u64 / 1000;
            count_to_restart = ticks * check_interval_secs / restart_period_secs;
        }

        if count_to_restart > self.checker.last_restart_count.load(Ordering::SeqCst) {
            self.checker
                .last_restart_count
                .store(count_to_restart, Ordering::SeqCst);
            info!("bouncing all fetchers, round {}", count_to_restart);
            self.restart_all();
        } else {
            self.check_health();
        }
    }
}
