#![forbid(unsafe_code)]

//! Channel registry and uploads-playlist resolution.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

const CHANNEL_PREFIX: &str = "UC";
const UPLOADS_PREFIX: &str = "UU";

/// A tracked channel as listed in `channels.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
}

/// Reads the registry in file order. A missing file is an empty registry.
pub fn load_channels(path: &Path) -> Result<Vec<Channel>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path).with_context(|| format!("Opening {}", path.display()))?;
    let channels: Vec<Channel> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Parsing channel registry {}", path.display()))?;
    Ok(channels)
}

/// Every channel has an implicit "uploads" playlist whose id is the channel
/// id with `UC` swapped for `UU`.
pub fn uploads_playlist_id(channel_id: &str) -> String {
    match channel_id.strip_prefix(CHANNEL_PREFIX) {
        Some(rest) => format!("{UPLOADS_PREFIX}{rest}"),
        None => channel_id.to_string(),
    }
}
