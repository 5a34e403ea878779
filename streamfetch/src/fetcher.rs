use crate::source::ItemKind;
use anyhow::Result;

/// One-shot hook invoked by the engine when a job terminates, whether the
/// source was exhausted or failed. Receives the ended job's source id and
/// nothing else.
pub type CompletionListener = Box<dyn FnOnce(&str) + Send + 'static>;

/// A running ingestion job inside the external fetch engine. The pool is
/// the sole owner of these while they are active; the setters take `&mut`
/// so policy and listener wiring can only happen before a job is admitted.
pub trait StreamFetcher: Send + Sync {
    fn start(&self) -> Result<()>;

    fn stop(&self) -> Result<()>;

    /// Polled, not pushed: the engine's current view of whether the job is
    /// still ingesting.
    fn is_alive(&self) -> bool;

    fn source_id(&self) -> &str;

    fn source_url(&self) -> &str;

    /// Whether the engine should restart the job on its own when ingestion
    /// fails.
    fn set_restart_on_failure(&mut self, restart: bool);

    fn set_completion_listener(&mut self, listener: CompletionListener);
}

/// Builds engine jobs for the pool. Fallible: a construction failure is
/// caught at the pool boundary and surfaced as an empty start result.
pub trait FetcherFactory: Send + Sync {
    fn create(&self, source_id: &str, url: &str, kind: ItemKind) -> Result<Box<dyn StreamFetcher>>;
}

#[cfg(test)]
pub use fake::{FakeFactory, FakeFetcher, FakeFetcherHandle};
