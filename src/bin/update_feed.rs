#![forbid(unsafe_code)]

//! Batch job that refreshes `feed.json` from the uploads playlists of every
//! channel in `channels.json`. Meant to be run from cron or CI.

use anyhow::Result;
use clap::Parser;
use feed_updater::{
    captions::{CaptionFetcher, CaptionSource},
    config::{SettingsOverrides, resolve_settings},
    listing::HttpListing,
    logging::init_tracing,
    security::warn_if_root,
    update::run_update,
};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "update_feed", about = "Refresh the channel video feed")]
struct Cli {
    /// Directory holding channels.json
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Directory receiving feed.json
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Caption cache directory (defaults to <output-dir>/subtitles)
    #[arg(long)]
    captions_dir: Option<PathBuf>,

    /// Alternate .env file
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Skip caption downloads for this run
    #[arg(long)]
    no_captions: bool,
}

impl Cli {
    fn overrides(self) -> SettingsOverrides {
        SettingsOverrides {
            data_dir: self.data_dir,
            output_dir: self.output_dir,
            captions_dir: self.captions_dir,
            captions_enabled: self.no_captions.then_some(false),
            env_path: self.env_file,
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    warn_if_root("update_feed");

    let settings = resolve_settings(Cli::parse().overrides())?;
    info!("starting content update");

    let Some(api_key) = settings.api_key.as_deref() else {
        error!("YOUTUBE_API_KEY is not set; nothing to do");
        return Ok(());
    };

    let transport = HttpListing::new(&settings.api_base, api_key);
    let fetcher = settings
        .captions_enabled
        .then(|| CaptionFetcher::from_settings(&settings));
    let captions = fetcher.as_ref().map(|fetcher| fetcher as &dyn CaptionSource);

    let summary = run_update(&settings, &transport, captions)?;
    info!(
        channels = summary.channels,
        fetched = summary.fetched,
        total = summary.total,
        written = summary.written,
        "feed refreshed"
    );
    Ok(())
}
