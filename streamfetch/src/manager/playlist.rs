//! Playlist failover: decide which candidate to play, advance on completion
//! or unreachability, persist the cursor as it moves. An invocation chain
//! probes at most the current item and one successor before marking the
//! playlist finished; it never scans the whole list.

use super::FetcherManager;
use crate::fetcher::CompletionListener;
use crate::source::{PlaylistItem, SourceKind, SourceRecord, SourceStatus};
use log::{error, info, warn};

impl FetcherManager {
    /// Starts (or resumes) playback of a playlist at its persisted cursor.
    /// Returns whether a candidate's fetcher ended up running.
    pub fn start_playlist(&self, record: &SourceRecord) -> bool {
        if self.is_running(&record.id) {
            warn!("playlist is already running for source {}", record.id);
            return false;
        }
        if record.items.is_empty() {
            warn!("playlist {} has no items to play", record.id);
            return false;
        }

        let mut playlist = record.clone();
        if playlist.current_index >= playlist.items.len() {
            warn!(
                "resetting current play index to 0 because it is out of range for source {}",
                playlist.id
            );
            playlist.current_index = 0;
        }

        let item = playlist.items[playlist.current_index].clone();
        if self.probe.check(&item.url) {
            playlist.status = SourceStatus::Broadcasting;
            self.update_record(&playlist);
            self.launch_playlist_item(&playlist, &item)
        } else {
            warn!(
                "current playlist item url {} is unreachable for source {}",
                item.url, playlist.id
            );
            self.skip_to_next_item(&mut playlist);
            let next = playlist.items[playlist.current_index].clone();
            if self.probe.check(&next.url) {
                self.start_playlist(&playlist)
            } else {
                playlist.status = SourceStatus::Finished;
                self.update_record(&playlist);
                false
            }
        }
    }

    /// Engine callback for an ended playlist item: advance the cursor and
    /// start the next candidate, unless the stored record is gone or
    /// already finished.
    pub fn play_next_item(&self, source_id: &str) {
        // the ended job may still be registered
        self.stop(source_id);

        let record = match self.store.lock().get(source_id) {
            Ok(record) => record,
            Err(e) => {
                warn!("failed to load source {}: {}", source_id, e);
                return;
            }
        };
        let Some(mut playlist) = record else { return };
        if playlist.status == SourceStatus::Finished || playlist.items.is_empty() {
            return;
        }

        self.skip_to_next_item(&mut playlist);
        let item = playlist.items[playlist.current_index].clone();
        if self.probe.check(&item.url) {
            self.update_record(&playlist);
            self.launch_playlist_item(&playlist, &item);
        } else {
            info!(
                "current playlist item url {} is unreachable for source {}",
                item.url, source_id
            );
            self.skip_to_next_item(&mut playlist);
            self.start_playlist(&playlist);
        }
    }

    /// Stops the playlist's job and persists its finished state. Reports
    /// whether the persisted update succeeded.
    pub fn stop_playlist(&self, source_id: &str) -> bool {
        self.stop(source_id);
        let record = match self.store.lock().get(source_id) {
            Ok(record) => record,
            Err(e) => {
                warn!("failed to load source {}: {}", source_id, e);
                None
            }
        };
        let Some(mut record) = record else {
            warn!("no record found for source {}", source_id);
            return false;
        };
        if record.kind != SourceKind::Playlist {
            return false;
        }
        record.status = SourceStatus::Finished;
        self.update_record(&record)
    }

    fn launch_playlist_item(&self, playlist: &SourceRecord, item: &PlaylistItem) -> bool {
        let mut fetcher = match self.factory.create(&playlist.id, &item.url, item.kind) {
            Ok(fetcher) => fetcher,
            Err(e) => {
                error!("failed to build fetcher for playlist {}: {}", playlist.id, e);
                return false;
            }
        };
        fetcher.set_completion_listener(self.playlist_listener());
        // failover, not the engine, recovers playlist items
        fetcher.set_restart_on_failure(false);
        self.launch(fetcher).is_some()
    }

    fn playlist_listener(&self) -> CompletionListener {
        let me = self.me.clone();
        Box::new(move |source_id: &str| {
            if let Some(manager) = me.upgrade() {
                manager.play_next_item(source_id);
            }
        })
    }

    /// Advances the cursor with wrap-around and persists it.
    fn skip_to_next_item(&self, playlist: &mut SourceRecord) {
        playlist.current_index = playlist.next_index();
        info!(
            "next playlist index for source {} is {}",
            playlist.id, playlist.current_index
        );
        self.update_record(playlist);
    }
}
