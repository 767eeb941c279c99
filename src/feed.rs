#![forbid(unsafe_code)]

//! The persisted feed: record shape, loading, last-write-wins merging, and
//! the sorted, bounded write-out.

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::debug;

/// One entry of `feed.json`.
///
/// Fields the listing API did not provide are kept as `null` so the file
/// shape stays uniform. Unknown keys found in a previous feed are carried
/// through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecord {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub published: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub thumbnail: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub channel_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle_url: Option<String>,
    #[serde(flatten)]
    pub extras: serde_json::Map<String, Value>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Reads the previous feed. A file that is not a JSON array counts as "no
/// prior feed"; inside the array, only entries that cannot be keyed (e.g. a
/// `null` id) are dropped.
pub fn load_feed(path: &Path) -> Vec<VideoRecord> {
    if !path.exists() {
        return Vec::new();
    }
    let parsed = File::open(path)
        .map_err(anyhow::Error::from)
        .and_then(|file| {
            serde_json::from_reader::<_, Vec<Value>>(BufReader::new(file))
                .map_err(anyhow::Error::from)
        });
    let entries = match parsed {
        Ok(entries) => entries,
        Err(err) => {
            debug!(path = %path.display(), error = %err, "ignoring unreadable prior feed");
            return Vec::new();
        }
    };

    entries
        .into_iter()
        .enumerate()
        .filter_map(|(position, entry)| {
            serde_json::from_value::<VideoRecord>(entry)
                .inspect_err(|err| {
                    debug!(position, error = %err, "skipping malformed prior feed entry");
                })
                .ok()
        })
        .collect()
}

/// Id-keyed accumulator. Overwriting an id keeps its first insertion slot,
/// which makes ties in the final sort deterministic.
#[derive(Debug, Default)]
pub struct FeedMerger {
    records: Vec<VideoRecord>,
    index: HashMap<String, usize>,
}

impl FeedMerger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prior(prior: Vec<VideoRecord>) -> Self {
        let mut merger = Self::new();
        merger.insert_all(prior);
        merger
    }

    pub fn insert(&mut self, record: VideoRecord) {
        match self.index.get(&record.id) {
            Some(&slot) => self.records[slot] = record,
            None => {
                self.index.insert(record.id.clone(), self.records.len());
                self.records.push(record);
            }
        }
    }

    pub fn insert_all(&mut self, records: impl IntoIterator<Item = VideoRecord>) {
        for record in records {
            self.insert(record);
        }
    }

    /// Newest first, capped at `retention`. Records without a publish time
    /// sink to the end.
    pub fn finish(self, retention: usize) -> Vec<VideoRecord> {
        let mut records = self.records;
        records.sort_by(|a, b| b.published.cmp(&a.published));
        records.truncate(retention);
        records
    }
}

/// Writes the feed as indented UTF-8 JSON via a temporary sibling so a
/// crash never leaves a half-written file behind.
pub fn save_feed(path: &Path, records: &[VideoRecord]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).with_context(|| format!("Creating {}", parent.display()))?;
    }

    let tmp_path = path.with_extension("json.tmp");
    {
        let file = File::create(&tmp_path)
            .with_context(|| format!("Creating {}", tmp_path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, records)
            .with_context(|| format!("Serializing feed to {}", tmp_path.display()))?;
        writer.write_all(b"\n")?;
        writer.flush()?;
    }
    fs::rename(&tmp_path, path)
        .with_context(|| format!("Replacing {}", path.display()))?;
    Ok(())
}
