use anyhow::{bail, Result};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    #[serde(rename = "live")]
    Live,
    #[serde(rename = "playlist")]
    Playlist,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum SourceStatus {
    #[serde(rename = "idle")]
    Idle,
    #[serde(rename = "broadcasting")]
    Broadcasting,
    #[serde(rename = "finished")]
    Finished,
}

/// What the fetch engine is asked to ingest from a single URL.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    #[serde(rename = "stream")]
    Stream,
    #[serde(rename = "vod")]
    Vod,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PlaylistItem {
    pub url: String,
    pub kind: ItemKind,
}

impl PlaylistItem {
    pub fn new(url: impl Into<String>, kind: ItemKind) -> Self {
        Self {
            url: url.into(),
            kind,
        }
    }
}

/// Externally persisted description of a live or playlist source. The
/// manager reads and writes these through the [`crate::store::SourceStore`]
/// collaborator; it never owns them.
#[derive(Debug, Serialize, Deserialize, Clone, Builder)]
#[builder(default)]
pub struct SourceRecord {
    pub id: String,
    pub app: String,
    pub kind: SourceKind,
    pub status: SourceStatus,
    pub url: Option<String>,
    pub items: Vec<PlaylistItem>,
    /// Cursor into `items`; in [0, items.len()) while the playlist is
    /// active, normalized to 0 before use otherwise.
    pub current_index: usize,
}

impl Default for SourceRecord {
    fn default() -> Self {
        Self {
            id: String::new(),
            app: String::new(),
            kind: SourceKind::Live,
            status: SourceStatus::Idle,
            url: None,
            items: Vec::new(),
            current_index: 0,
        }
    }
}

impl SourceRecord {
    /// The playlist position after the current one, wrapping past the last
    /// item back to 0.
    pub fn next_index(&self) -> usize {
        let next = self.current_index + 1;
        if self.items.len() <= next {
            0
        } else {
            next
        }
    }

    pub fn current_item(&self) -> Option<&PlaylistItem> {
        self.items.get(self.current_index)
    }

    pub fn json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl SourceRecordBuilder {
    pub fn build_and_validate(&mut self) -> Result<SourceRecord> {
        let record = self.build()?;
        if record.id.is_empty() {
            bail!("Source id is empty!");
        }
        match record.kind {
            SourceKind::Live if record.url.is_none() => {
                bail!("Live source {} has no stream url!", record.id)
            }
            SourceKind::Playlist if record.items.is_empty() => {
                bail!("Playlist {} has no items!", record.id)
            }
            _ => {}
        }
        Ok(record)
    }
}
