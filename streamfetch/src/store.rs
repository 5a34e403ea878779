use crate::source::SourceRecord;
use anyhow::Result;
use parking_lot::Mutex;
use std::sync::Arc;

/// Persistence collaborator for source records. Implementations own the
/// schema; the manager only needs record lookup, field updates and the
/// quality-metrics reset issued when a fetcher goes silent.
pub trait SourceStore: Send {
    fn get(&mut self, source_id: &str) -> Result<Option<SourceRecord>>;

    /// Overwrites the stored record for `source_id`. Returns whether a
    /// record was found and updated.
    fn update_fields(&mut self, source_id: &str, record: &SourceRecord) -> Result<bool>;

    fn clear_quality_metrics(&mut self, source_id: &str) -> Result<()>;
}

pub type SyncSourceStore = Arc<Mutex<dyn SourceStore>>;

#[cfg(test)]
#[derive(Default)]
pub struct MemoryStore {
    records: hashbrown::HashMap<String, SourceRecord>,
    cleared: Vec<String>,
    fail_updates: bool,
}

#[cfg(test)]
impl MemoryStore {
    pub fn with_records(records: impl IntoIterator<Item = SourceRecord>) -> Self {
        let mut store = Self::default();
        for record in records {
            store.insert(record);
        }
        store
    }

    pub fn insert(&mut self, record: SourceRecord) {
        self.records.insert(record.id.clone(), record);
    }

    /// Source ids whose quality metrics have been cleared, in call order.
    pub fn cleared(&self) -> &[String] {
        &self.cleared
    }

    /// Makes every subsequent `update_fields` report failure.
    pub fn fail_updates(&mut self) {
        self.fail_updates = true;
    }
}

#[cfg(test)]
impl SourceStore for MemoryStore {
    fn get(&mut self, source_id: &str) -> Result<Option<SourceRecord>> {
        Ok(self.records.get(source_id).cloned())
    }

    fn update_fields(&mut self, source_id: &str, record: &SourceRecord) -> Result<bool> {
        if self.fail_updates || !self.records.contains_key(source_id) {
            return Ok(false);
        }
        self.records.insert(source_id.to_string(), record.clone());
        Ok(true)
    }

    fn clear_quality_metrics(&mut self, source_id: &str) -> Result<()> {
        self.cleared.push(source_id.to_string());
        Ok(())
    }
}
