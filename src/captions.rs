#![forbid(unsafe_code)]

//! English caption retrieval through yt-dlp, backed by an on-disk cache.
//!
//! The caption directory doubles as cross-run state: once `<id>.en.vtt` (or a
//! regional variant) exists, the downloader is never called for that video
//! again.

use std::fs;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::{CAPTIONS_SUBDIR, CookieBlob, UpdateSettings};
use crate::security::stage_cookies;

const CAPTION_EXT: &str = "vtt";
const CAPTION_LANGS: &str = "en.*";
const WATCH_URL: &str = "https://www.youtube.com/watch?v=";

/// Anything that can attach a caption path to a video id.
pub trait CaptionSource {
    /// Returns the caption path relative to the feed's public directory, or
    /// `None` when no caption could be obtained.
    fn caption_for(&self, video_id: &str) -> Option<String>;
}

pub fn caption_file_name(video_id: &str) -> String {
    format!("{video_id}.en.{CAPTION_EXT}")
}

/// yt-dlp backed caption fetcher.
#[derive(Debug, Clone)]
pub struct CaptionFetcher {
    output_dir: PathBuf,
    public_prefix: String,
    program: PathBuf,
    cookies: Option<CookieBlob>,
}

impl CaptionFetcher {
    pub fn new(output_dir: impl Into<PathBuf>, program: impl Into<PathBuf>) -> Self {
        let output_dir = output_dir.into();
        let public_prefix = output_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| CAPTIONS_SUBDIR.to_string());
        Self {
            output_dir,
            public_prefix,
            program: program.into(),
            cookies: None,
        }
    }

    pub fn from_settings(settings: &UpdateSettings) -> Self {
        let mut fetcher = Self::new(&settings.captions_dir, &settings.ytdlp_path);
        // Caption paths in the feed are relative to the directory holding it.
        if let Some(prefix) = settings
            .feed_file
            .parent()
            .and_then(|public| settings.captions_dir.strip_prefix(public).ok())
            .filter(|relative| !relative.as_os_str().is_empty())
        {
            fetcher.public_prefix = prefix
                .components()
                .map(|part| part.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
        }
        fetcher.cookies = settings.cookies.clone();
        fetcher
    }

    pub fn with_cookies(mut self, cookies: Option<CookieBlob>) -> Self {
        self.cookies = cookies;
        self
    }

    fn public_path(&self, file_name: &str) -> String {
        if self.public_prefix.is_empty() {
            file_name.to_string()
        } else {
            format!("{}/{}", self.public_prefix, file_name)
        }
    }

    /// Runs yt-dlp for a single video. Failures are logged and swallowed.
    fn download(&self, video_id: &str) {
        if let Err(err) = fs::create_dir_all(&self.output_dir) {
            warn!(
                video_id,
                dir = %self.output_dir.display(),
                error = %err,
                "could not create caption directory"
            );
            return;
        }

        // Held until the end of this call; dropping it deletes the file.
        let staged = match self.cookies.as_ref().map(stage_cookies).transpose() {
            Ok(staged) => staged,
            Err(err) => {
                warn!(video_id, error = %format!("{err:#}"), "ignoring unusable cookies");
                None
            }
        };

        let output_template = self.output_dir.join(format!("{video_id}.%(ext)s"));
        let mut command = Command::new(&self.program);
        command
            .arg("--skip-download")
            .arg("--write-subs")
            .arg("--write-auto-subs")
            .arg("--sub-langs")
            .arg(CAPTION_LANGS)
            .arg("--sub-format")
            .arg(CAPTION_EXT)
            .arg("--output")
            .arg(&output_template)
            .stdout(Stdio::null());
        if let Some(file) = &staged {
            command.arg("--cookies").arg(file.path());
        }
        // Video ids may begin with '-'.
        command.arg("--").arg(format!("{WATCH_URL}{video_id}"));

        match command.status() {
            Ok(status) if status.success() => {}
            Ok(status) => {
                warn!(video_id, %status, "caption download exited unsuccessfully");
            }
            Err(err) => {
                warn!(
                    video_id,
                    program = %self.program.display(),
                    error = %err,
                    "failed to run caption downloader"
                );
            }
        }
    }

    /// Looks for any `<id>.*.vtt` file, e.g. `abc.en-US.vtt`.
    fn find_variant(&self, video_id: &str) -> Option<String> {
        let prefix = format!("{video_id}.");
        let suffix = format!(".{CAPTION_EXT}");
        let mut matches: Vec<String> = WalkDir::new(&self.output_dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(&prefix) && name.ends_with(&suffix))
            .collect();
        matches.sort();
        matches.into_iter().next()
    }
}

impl CaptionSource for CaptionFetcher {
    fn caption_for(&self, video_id: &str) -> Option<String> {
        let file_name = caption_file_name(video_id);
        if self.output_dir.join(&file_name).exists() {
            debug!(video_id, "caption already cached");
            return Some(self.public_path(&file_name));
        }
        if let Some(variant) = self.find_variant(video_id) {
            debug!(video_id, file = %variant, "regional caption already cached");
            return Some(self.public_path(&variant));
        }

        self.download(video_id);

        if self.output_dir.join(&file_name).exists() {
            return Some(self.public_path(&file_name));
        }
        match self.find_variant(video_id) {
            Some(variant) => Some(self.public_path(&variant)),
            None => {
                debug!(video_id, "no english caption available");
                None
            }
        }
    }
}
