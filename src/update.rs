#![forbid(unsafe_code)]

//! One full refresh: registry, per-channel listing walk, optional captions,
//! merge, and write-out.

use anyhow::Result;
use tracing::{error, info, info_span};

use crate::captions::CaptionSource;
use crate::channels::{load_channels, uploads_playlist_id};
use crate::config::UpdateSettings;
use crate::feed::{FeedMerger, load_feed, save_feed};
use crate::listing::{ListingTransport, fetch_playlist_videos};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    pub channels: usize,
    pub fetched: usize,
    pub total: usize,
    pub written: bool,
}

/// Runs a refresh against `transport`. Only a failure to write the feed is
/// returned as an error; everything else degrades to partial or stale data.
pub fn run_update(
    settings: &UpdateSettings,
    transport: &dyn ListingTransport,
    captions: Option<&dyn CaptionSource>,
) -> Result<UpdateSummary> {
    let channels = match load_channels(&settings.channels_file) {
        Ok(channels) => channels,
        Err(err) => {
            error!(
                error = %format!("{err:#}"),
                "channel registry unreadable; leaving feed untouched"
            );
            return Ok(UpdateSummary::default());
        }
    };
    if channels.is_empty() {
        info!(
            path = %settings.channels_file.display(),
            "no tracked channels found"
        );
    }

    let prior = load_feed(&settings.feed_file);
    info!(prior = prior.len(), "loaded existing feed");
    let mut merger = FeedMerger::with_prior(prior);

    let mut fetched = 0;
    for channel in &channels {
        // Listing and caption failures logged below carry the channel fields.
        let _channel_span = info_span!(
            "channel",
            channel_id = %channel.id,
            channel_name = %channel.name
        )
        .entered();
        info!("fetching videos");

        let playlist_id = uploads_playlist_id(&channel.id);
        let mut videos = fetch_playlist_videos(
            transport,
            &playlist_id,
            settings.page_size,
            settings.fetch_limit,
        );
        info!(count = videos.len(), "found videos");

        if let Some(source) = captions {
            for video in &mut videos {
                video.subtitle_url = source.caption_for(&video.id);
            }
        }

        fetched += videos.len();
        merger.insert_all(videos);
    }

    let feed = merger.finish(settings.retention_limit);
    save_feed(&settings.feed_file, &feed)?;
    info!(
        total = feed.len(),
        path = %settings.feed_file.display(),
        "update complete"
    );

    Ok(UpdateSummary {
        channels: channels.len(),
        fetched,
        total: feed.len(),
        written: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FETCH_LIMIT, MAX_PAGE_SIZE, RETENTION_LIMIT};
    use crate::listing::{ListingPage, PageRequest};
    use anyhow::bail;
    use std::fs;
    use std::io::{self, Write};
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    #[derive(Clone, Default)]
    struct CapturedLog(Arc<Mutex<Vec<u8>>>);

    impl CapturedLog {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct Offline;

    impl ListingTransport for Offline {
        fn fetch_page(&self, _request: &PageRequest<'_>) -> Result<ListingPage> {
            bail!("network unavailable")
        }
    }

    fn settings_in(root: &Path) -> UpdateSettings {
        UpdateSettings {
            channels_file: root.join("data").join("channels.json"),
            feed_file: root.join("public").join("feed.json"),
            captions_dir: root.join("public").join("subtitles"),
            captions_enabled: false,
            api_key: Some("key".into()),
            api_base: String::new(),
            ytdlp_path: root.join("yt-dlp"),
            cookies: None,
            page_size: MAX_PAGE_SIZE,
            fetch_limit: FETCH_LIMIT,
            retention_limit: RETENTION_LIMIT,
        }
    }

    #[test]
    fn missing_registry_still_writes_feed() -> Result<()> {
        let temp = tempdir()?;
        let settings = settings_in(temp.path());
        let summary = run_update(&settings, &Offline, None)?;
        assert_eq!(
            summary,
            UpdateSummary {
                channels: 0,
                fetched: 0,
                total: 0,
                written: true
            }
        );
        assert_eq!(fs::read_to_string(&settings.feed_file)?.trim(), "[]");
        Ok(())
    }

    #[test]
    fn offline_run_keeps_prior_feed() -> Result<()> {
        let temp = tempdir()?;
        let settings = settings_in(temp.path());
        fs::create_dir_all(settings.channels_file.parent().unwrap())?;
        fs::write(&settings.channels_file, r#"[{"id":"UCabc","name":"Test"}]"#)?;
        fs::create_dir_all(settings.feed_file.parent().unwrap())?;
        fs::write(
            &settings.feed_file,
            r#"[{"id":"old","title":"kept","published":"2023-01-01T00:00:00Z","thumbnail":""}]"#,
        )?;

        let summary = run_update(&settings, &Offline, None)?;
        assert_eq!(summary.channels, 1);
        assert_eq!(summary.fetched, 0);
        assert_eq!(summary.total, 1);
        let feed = load_feed(&settings.feed_file);
        assert_eq!(feed[0].title.as_deref(), Some("kept"));
        Ok(())
    }

    #[test]
    fn unreadable_registry_leaves_feed_untouched() -> Result<()> {
        let temp = tempdir()?;
        let settings = settings_in(temp.path());
        fs::create_dir_all(settings.channels_file.parent().unwrap())?;
        fs::write(&settings.channels_file, "not json")?;

        let summary = run_update(&settings, &Offline, None)?;
        assert!(!summary.written);
        assert!(!settings.feed_file.exists());
        Ok(())
    }

    #[test]
    fn listing_failures_are_logged_with_channel_identity() -> Result<()> {
        let temp = tempdir()?;
        let settings = settings_in(temp.path());
        fs::create_dir_all(settings.channels_file.parent().unwrap())?;
        fs::write(
            &settings.channels_file,
            r#"[{"id":"UCabc","name":"Test Channel"}]"#,
        )?;

        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, || run_update(&settings, &Offline, None))?;

        let output = log.contents();
        let failure = output
            .lines()
            .find(|line| line.contains("error fetching playlist page"))
            .expect("listing failure logged");
        assert!(failure.contains("channel_id=UCabc"), "{failure}");
        assert!(failure.contains("channel_name=Test Channel"), "{failure}");
        assert!(failure.contains("playlist_id=\"UUabc\""), "{failure}");
        assert!(failure.contains("network unavailable"), "{failure}");
        Ok(())
    }
}
