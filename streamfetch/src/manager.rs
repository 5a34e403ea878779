use crate::fetcher::{FetcherFactory, StreamFetcher};
use crate::manager::configuration::ManagerConfiguration;
use crate::manager::scheduler::CheckerState;
use crate::probe::ReachabilityProbe;
use crate::source::{ItemKind, SourceRecord};
use crate::store::SyncSourceStore;
use anyhow::{anyhow, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;

pub mod configuration;
mod playlist;
mod scheduler;

/// Supervises the pool of active fetcher jobs: duplicate-free admission,
/// periodic health checks, cadence-based blanket restarts, and playlist
/// failover. One job per source id; the pool is the sole owner of a job
/// while it is active, and removal is the only teardown path.
///
/// Arming the checker spawns a tokio task, so operations that may admit a
/// job must run inside a tokio runtime.
pub struct FetcherManager {
    me: Weak<FetcherManager>,
    store: SyncSourceStore,
    factory: Arc<dyn FetcherFactory>,
    probe: Arc<dyn ReachabilityProbe>,
    configuration: Mutex<ManagerConfiguration>,
    pool: DashMap<String, Arc<dyn StreamFetcher>>,
    checker: CheckerState,
}

impl FetcherManager {
    pub fn new(
        store: SyncSourceStore,
        factory: Arc<dyn FetcherFactory>,
        probe: Arc<dyn ReachabilityProbe>,
        configuration: ManagerConfiguration,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            store,
            factory,
            probe,
            configuration: Mutex::new(configuration),
            pool: DashMap::new(),
            checker: CheckerState::new(),
        })
    }

    pub fn is_running(&self, source_id: &str) -> bool {
        self.pool.contains_key(source_id)
    }

    pub fn pool_size(&self) -> usize {
        self.pool.len()
    }

    pub fn running_ids(&self) -> Vec<String> {
        self.pool.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Starts a fetcher for the record unless one is already active for its
    /// id. Construction and engine-start failures are logged and surface as
    /// `None`; the pool boundary never propagates them.
    pub fn start(&self, record: &SourceRecord) -> Option<Arc<dyn StreamFetcher>> {
        if self.is_running(&record.id) {
            return None;
        }
        let mut fetcher = match self.build_fetcher(record) {
            Ok(fetcher) => fetcher,
            Err(e) => {
                error!("failed to build fetcher for source {}: {}", record.id, e);
                return None;
            }
        };
        fetcher.set_restart_on_failure(self.restart_on_failure());
        self.launch(fetcher)
    }

    /// Starts every record in order, then (re-)arms the checker.
    pub fn start_many(&self, records: &[SourceRecord]) {
        for record in records {
            self.start(record);
        }
        self.schedule_checker();
    }

    /// Stops and removes the job for the id. Returns whether one was found.
    pub fn stop(&self, source_id: &str) -> bool {
        match self.pool.remove(source_id) {
            Some((id, fetcher)) => {
                info!("stopping fetcher for source {}", id);
                if let Err(e) = fetcher.stop() {
                    warn!("fetcher for source {} did not stop cleanly: {}", id, e);
                }
                true
            }
            None => false,
        }
    }

    /// Marks sources whose engine reports not-alive as degraded by clearing
    /// their quality metrics. Dead jobs stay pool members until the next
    /// restart cycle.
    pub fn check_health(&self) {
        for entry in self.pool.iter() {
            let fetcher = entry.value();
            if !fetcher.is_alive() {
                info!(
                    "source {} is not alive, clearing its quality metrics (url: {})",
                    entry.key(),
                    fetcher.source_url()
                );
                if let Err(e) = self.store.lock().clear_quality_metrics(entry.key()) {
                    warn!(
                        "failed to clear quality metrics for source {}: {}",
                        entry.key(),
                        e
                    );
                }
            }
        }
    }

    /// Bounces every pool member: graceful stop when alive, then an
    /// unconditional start. Runs on cadence, independent of observed health.
    pub fn restart_all(&self) {
        for entry in self.pool.iter() {
            let fetcher = entry.value();
            if fetcher.is_alive() {
                info!("stopping fetcher {} before restart", entry.key());
                if let Err(e) = fetcher.stop() {
                    warn!("fetcher {} did not stop cleanly: {}", entry.key(), e);
                }
            } else {
                info!("fetcher {} is not alive", entry.key());
            }
            if let Err(e) = fetcher.start() {
                warn!("failed to restart fetcher {}: {}", entry.key(), e);
            }
        }
    }

    pub fn check_interval(&self) -> Duration {
        self.configuration.lock().check_interval
    }

    /// Applies on the next (re-)arming of the checker.
    pub fn set_check_interval(&self, interval: Duration) {
        self.configuration.lock().check_interval = interval;
    }

    pub fn restart_period(&self) -> Duration {
        self.configuration.lock().restart_period
    }

    /// Read on every tick; takes effect without rearming.
    pub fn set_restart_period(&self, period: Duration) {
        self.configuration.lock().restart_period = period;
    }

    pub fn restart_on_failure(&self) -> bool {
        self.configuration.lock().restart_on_failure
    }

    pub fn set_restart_on_failure(&self, restart: bool) {
        self.configuration.lock().restart_on_failure = restart;
    }

    fn build_fetcher(&self, record: &SourceRecord) -> Result<Box<dyn StreamFetcher>> {
        let url = record
            .url
            .as_deref()
            .ok_or_else(|| anyhow!("source {} has no stream url", record.id))?;
        self.factory.create(&record.id, url, ItemKind::Stream)
    }

    /// Starts the engine for a freshly built job and admits it to the pool.
    /// The membership entry is reserved before the engine start, so two
    /// racing launches for one source id cannot both get in; the loser's
    /// job is dropped unstarted.
    pub(crate) fn launch(
        &self,
        fetcher: Box<dyn StreamFetcher>,
    ) -> Option<Arc<dyn StreamFetcher>> {
        let launched = match self.pool.entry(fetcher.source_id().to_string()) {
            Entry::Occupied(entry) => {
                debug!("a fetcher is already registered for source {}", entry.key());
                None
            }
            Entry::Vacant(slot) => {
                if let Err(e) = fetcher.start() {
                    error!("failed to start fetcher for source {}: {}", slot.key(), e);
                    None
                } else {
                    let fetcher: Arc<dyn StreamFetcher> = Arc::from(fetcher);
                    slot.insert(fetcher.clone());
                    Some(fetcher)
                }
            }
        };
        if launched.is_some() {
            self.arm_checker();
        }
        launched
    }

    pub(crate) fn update_record(&self, record: &SourceRecord) -> bool {
        match self.store.lock().update_fields(&record.id, record) {
            Ok(updated) => updated,
            Err(e) => {
                warn!("failed to persist source {}: {}", record.id, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::FakeFactory;
    use crate::probe::FakeProbe;
    use crate::source::{SourceKind, SourceRecordBuilder};
    use crate::store::MemoryStore;
    use std::sync::atomic::Ordering;

    fn live_record(id: &str, url: &str) -> SourceRecord {
        SourceRecordBuilder::default()
            .id(id.to_string())
            .kind(SourceKind::Live)
            .url(Some(url.to_string()))
            .build_and_validate()
            .unwrap()
    }

    fn make_manager(factory: Arc<FakeFactory>) -> (Arc<FetcherManager>, Arc<Mutex<MemoryStore>>) {
        let store = Arc::new(Mutex::new(MemoryStore::default()));
        let manager = FetcherManager::new(
            store.clone(),
            factory,
            Arc::new(FakeProbe::default()),
            ManagerConfiguration::default(),
        );
        (manager, store)
    }

    #[tokio::test]
    async fn second_start_for_the_same_source_is_refused() {
        let factory = Arc::new(FakeFactory::new());
        let (manager, _store) = make_manager(factory.clone());
        let record = live_record("cam-1", "rtsp://origin/1");

        assert!(manager.start(&record).is_some());
        assert!(manager.start(&record).is_none());
        assert_eq!(manager.pool_size(), 1);
        assert_eq!(factory.created().len(), 1);
        assert!(manager.is_running("cam-1"));
    }

    #[tokio::test]
    async fn stop_removes_the_job_and_reports_membership() {
        let factory = Arc::new(FakeFactory::new());
        let (manager, _store) = make_manager(factory.clone());

        assert!(!manager.stop("cam-1"));
        manager.start(&live_record("cam-1", "rtsp://origin/1"));
        assert!(manager.stop("cam-1"));
        assert!(!manager.is_running("cam-1"));
        assert_eq!(factory.last().unwrap().stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn construction_failure_surfaces_as_none() {
        let factory = Arc::new(FakeFactory::new().fail_create_for("rtsp://origin/broken"));
        let (manager, _store) = make_manager(factory.clone());

        assert!(manager
            .start(&live_record("cam-1", "rtsp://origin/broken"))
            .is_none());
        assert_eq!(manager.pool_size(), 0);
        assert!(!manager.checker_armed());

        // a record with no url at all cannot be built either
        let mut no_url = live_record("cam-2", "rtsp://origin/2");
        no_url.url = None;
        assert!(manager.start(&no_url).is_none());
    }

    #[tokio::test]
    async fn engine_start_failure_keeps_the_pool_empty() {
        let factory = Arc::new(FakeFactory::new().fail_start_for("rtsp://origin/flaky"));
        let (manager, _store) = make_manager(factory);

        assert!(manager
            .start(&live_record("cam-1", "rtsp://origin/flaky"))
            .is_none());
        assert!(!manager.is_running("cam-1"));
    }

    #[tokio::test]
    async fn start_applies_the_restart_on_failure_default() {
        let factory = Arc::new(FakeFactory::new());
        let (manager, _store) = make_manager(factory.clone());

        manager.start(&live_record("cam-1", "rtsp://origin/1"));
        assert!(factory
            .last()
            .unwrap()
            .restart_on_failure
            .load(Ordering::SeqCst));

        manager.set_restart_on_failure(false);
        manager.start(&live_record("cam-2", "rtsp://origin/2"));
        assert!(!factory
            .last()
            .unwrap()
            .restart_on_failure
            .load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn dead_sources_are_degraded_but_stay_members() {
        let factory = Arc::new(FakeFactory::new());
        let (manager, store) = make_manager(factory.clone());

        manager.start(&live_record("cam-1", "rtsp://origin/1"));
        manager.start(&live_record("cam-2", "rtsp://origin/2"));
        let dead = factory.created().into_iter().next().unwrap();
        dead.alive.store(false, Ordering::SeqCst);

        manager.check_health();
        assert_eq!(store.lock().cleared(), [dead.source_id.clone()]);
        assert!(manager.is_running(&dead.source_id));
        assert_eq!(manager.pool_size(), 2);
    }

    #[tokio::test]
    async fn restart_all_bounces_every_member() {
        let factory = Arc::new(FakeFactory::new());
        let (manager, _store) = make_manager(factory.clone());

        manager.start(&live_record("cam-1", "rtsp://origin/1"));
        manager.start(&live_record("cam-2", "rtsp://origin/2"));
        let handles = factory.created();
        // one member died silently
        handles[1].alive.store(false, Ordering::SeqCst);

        manager.restart_all();

        // the live member was stopped first, the dead one started as-is
        assert_eq!(handles[0].stops.load(Ordering::SeqCst), 1);
        assert_eq!(handles[0].starts.load(Ordering::SeqCst), 2);
        assert_eq!(handles[1].stops.load(Ordering::SeqCst), 0);
        assert_eq!(handles[1].starts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn start_many_admits_each_record_and_arms_the_checker() {
        let factory = Arc::new(FakeFactory::new());
        let (manager, _store) = make_manager(factory);

        let records = vec![
            live_record("cam-1", "rtsp://origin/1"),
            live_record("cam-2", "rtsp://origin/2"),
        ];
        manager.start_many(&records);

        assert!(manager.is_running("cam-1"));
        assert!(manager.is_running("cam-2"));
        assert!(manager.checker_armed());
        let mut ids = manager.running_ids();
        ids.sort();
        assert_eq!(ids, ["cam-1", "cam-2"]);
    }
}
