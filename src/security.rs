#![forbid(unsafe_code)]

//! Process and credential hygiene for the updater.

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use nix::unistd::Uid;
use std::io::Write;
use tempfile::NamedTempFile;
use tracing::warn;

use crate::config::CookieBlob;

/// Logs a warning when the updater runs as root. The run still proceeds:
/// CI containers commonly execute as uid 0, and files written there end up
/// root-owned.
pub fn warn_if_root(process: &str) -> bool {
    match root_warning(Uid::current(), process) {
        Some(message) => {
            warn!("{message}");
            true
        }
        None => false,
    }
}

fn root_warning(uid: Uid, process: &str) -> Option<String> {
    uid.is_root().then(|| {
        format!(
            "{process} is running as root; feed and caption files will be owned by root"
        )
    })
}

/// Writes the cookie blob to a private temporary file for yt-dlp.
///
/// The file is removed when the returned handle is dropped, so callers keep
/// it alive only for the duration of a single downloader call.
pub fn stage_cookies(blob: &CookieBlob) -> Result<NamedTempFile> {
    let contents = match blob {
        CookieBlob::Plain(text) => text.clone().into_bytes(),
        CookieBlob::Base64(encoded) => STANDARD
            .decode(encoded.trim())
            .context("decoding YTDLP_COOKIES_BASE64")?,
    };

    // NamedTempFile is created with 0600 on unix.
    let mut file = tempfile::Builder::new()
        .prefix("cookies-")
        .suffix(".txt")
        .tempfile()
        .context("creating cookie staging file")?;
    file.write_all(&contents)
        .context("writing cookie staging file")?;
    if !contents.ends_with(b"\n") {
        file.write_all(b"\n")?;
    }
    file.flush()?;
    Ok(file)
}
