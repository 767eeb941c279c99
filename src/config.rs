#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_DATA_DIR: &str = "Backend/data";
pub const DEFAULT_OUTPUT_DIR: &str = "Backend/public";
pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/youtube/v3/playlistItems";
pub const DEFAULT_YTDLP: &str = "yt-dlp";
pub const CHANNELS_FILE: &str = "channels.json";
pub const FEED_FILE: &str = "feed.json";
pub const CAPTIONS_SUBDIR: &str = "subtitles";

/// The listing API never returns more than this many items per page.
pub const MAX_PAGE_SIZE: u32 = 50;
pub const FETCH_LIMIT: usize = 100;
pub const RETENTION_LIMIT: usize = 1000;
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything a single update run needs to know, resolved once at startup.
#[derive(Debug, Clone)]
pub struct UpdateSettings {
    pub channels_file: PathBuf,
    pub feed_file: PathBuf,
    pub captions_dir: PathBuf,
    pub captions_enabled: bool,
    pub api_key: Option<String>,
    pub api_base: String,
    pub ytdlp_path: PathBuf,
    pub cookies: Option<CookieBlob>,
    pub page_size: u32,
    pub fetch_limit: usize,
    pub retention_limit: usize,
}

/// Cookie text for yt-dlp as it arrived through the environment.
#[derive(Clone, PartialEq, Eq)]
pub enum CookieBlob {
    Plain(String),
    Base64(String),
}

impl std::fmt::Debug for CookieBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CookieBlob::Plain(_) => f.write_str("CookieBlob::Plain(..)"),
            CookieBlob::Base64(_) => f.write_str("CookieBlob::Base64(..)"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub data_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub captions_dir: Option<PathBuf>,
    pub captions_enabled: Option<bool>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_settings(overrides: SettingsOverrides) -> Result<UpdateSettings> {
    let env_path = overrides
        .env_path
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(env_path)?;
    Ok(build_settings(&file_vars, env_var_string, overrides))
}

fn build_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: SettingsOverrides,
) -> UpdateSettings {
    let data_dir = overrides
        .data_dir
        .or_else(|| lookup_value("FEED_DATA_DIR", file_vars, &env_lookup).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
    let output_dir = overrides
        .output_dir
        .or_else(|| lookup_value("FEED_OUTPUT_DIR", file_vars, &env_lookup).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
    let captions_dir = overrides
        .captions_dir
        .or_else(|| lookup_value("FEED_CAPTIONS_DIR", file_vars, &env_lookup).map(PathBuf::from))
        .unwrap_or_else(|| output_dir.join(CAPTIONS_SUBDIR));
    let captions_enabled = overrides
        .captions_enabled
        .or_else(|| {
            lookup_value("FEED_CAPTIONS", file_vars, &env_lookup)
                .and_then(|value| parse_flag(&value))
        })
        .unwrap_or(true);
    let api_key = lookup_value("YOUTUBE_API_KEY", file_vars, &env_lookup);
    let api_base = lookup_value("FEED_API_BASE", file_vars, &env_lookup)
        .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
    let ytdlp_path = lookup_value("YTDLP_PATH", file_vars, &env_lookup)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_YTDLP));
    let cookies = lookup_value("YTDLP_COOKIES", file_vars, &env_lookup)
        .map(CookieBlob::Plain)
        .or_else(|| {
            lookup_value("YTDLP_COOKIES_BASE64", file_vars, &env_lookup).map(CookieBlob::Base64)
        });

    UpdateSettings {
        channels_file: data_dir.join(CHANNELS_FILE),
        feed_file: output_dir.join(FEED_FILE),
        captions_dir,
        captions_enabled,
        api_key,
        api_base,
        ytdlp_path,
        cookies,
        page_size: MAX_PAGE_SIZE,
        fetch_limit: FETCH_LIMIT,
        retention_limit: RETENTION_LIMIT,
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key)
        .or_else(|| file_vars.get(key).cloned())
        .filter(|value| !value.trim().is_empty())
}

pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn make_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    fn settings_from(contents: &str) -> UpdateSettings {
        let cfg = make_config(contents);
        let vars = read_env_file(cfg.path()).unwrap();
        build_settings(&vars, |_| None, SettingsOverrides::default())
    }

    #[test]
    fn defaults_follow_backend_layout() {
        let settings = settings_from("");
        assert_eq!(
            settings.channels_file,
            PathBuf::from("Backend/data/channels.json")
        );
        assert_eq!(settings.feed_file, PathBuf::from("Backend/public/feed.json"));
        assert_eq!(
            settings.captions_dir,
            PathBuf::from("Backend/public/subtitles")
        );
        assert!(settings.captions_enabled);
        assert!(settings.api_key.is_none());
        assert!(settings.cookies.is_none());
        assert_eq!(settings.api_base, DEFAULT_API_BASE);
        assert_eq!(settings.ytdlp_path, PathBuf::from("yt-dlp"));
        assert_eq!(settings.page_size, 50);
        assert_eq!(settings.fetch_limit, 100);
        assert_eq!(settings.retention_limit, 1000);
    }

    #[test]
    fn captions_dir_follows_output_dir() {
        let settings = settings_from("FEED_OUTPUT_DIR=\"/srv/feed\"\n");
        assert_eq!(settings.feed_file, PathBuf::from("/srv/feed/feed.json"));
        assert_eq!(settings.captions_dir, PathBuf::from("/srv/feed/subtitles"));
    }

    #[test]
    fn blank_api_key_is_treated_as_missing() {
        let settings = settings_from("YOUTUBE_API_KEY=\"   \"\n");
        assert!(settings.api_key.is_none());
    }

    #[test]
    fn env_wins_over_file() {
        let vars = read_env_file(make_config("YOUTUBE_API_KEY=\"file-key\"\n").path()).unwrap();
        let settings = build_settings(
            &vars,
            |key| (key == "YOUTUBE_API_KEY").then(|| "env-key".to_string()),
            SettingsOverrides::default(),
        );
        assert_eq!(settings.api_key.as_deref(), Some("env-key"));
    }

    #[test]
    fn overrides_win_over_env_and_file() {
        let vars = read_env_file(
            make_config("FEED_DATA_DIR=\"/file-data\"\nFEED_CAPTIONS=\"on\"\n").path(),
        )
        .unwrap();
        let settings = build_settings(
            &vars,
            |key| (key == "FEED_OUTPUT_DIR").then(|| "/env-out".to_string()),
            SettingsOverrides {
                data_dir: Some(PathBuf::from("/cli-data")),
                captions_enabled: Some(false),
                ..SettingsOverrides::default()
            },
        );
        assert_eq!(settings.channels_file, PathBuf::from("/cli-data/channels.json"));
        assert_eq!(settings.feed_file, PathBuf::from("/env-out/feed.json"));
        assert!(!settings.captions_enabled);
    }

    #[test]
    fn caption_flag_parsing() {
        assert!(!settings_from("FEED_CAPTIONS=off\n").captions_enabled);
        assert!(!settings_from("FEED_CAPTIONS=0\n").captions_enabled);
        assert!(settings_from("FEED_CAPTIONS=YES\n").captions_enabled);
        assert!(settings_from("FEED_CAPTIONS=maybe\n").captions_enabled);
    }

    #[test]
    fn plain_cookies_preferred_over_base64() {
        let settings =
            settings_from("YTDLP_COOKIES=\"raw\"\nYTDLP_COOKIES_BASE64=\"cmF3\"\n");
        assert_eq!(settings.cookies, Some(CookieBlob::Plain("raw".into())));
        let settings = settings_from("YTDLP_COOKIES_BASE64=\"cmF3\"\n");
        assert_eq!(settings.cookies, Some(CookieBlob::Base64("cmF3".into())));
    }

    #[test]
    fn cookie_debug_output_is_redacted() {
        let blob = CookieBlob::Plain("SID=secret".into());
        assert!(!format!("{blob:?}").contains("secret"));
    }

    #[test]
    fn read_env_file_handles_export_and_quotes() {
        let cfg = make_config(
            r#"
            export YOUTUBE_API_KEY="abc"
            FEED_DATA_DIR='/data'
            YTDLP_PATH =  "/opt/yt-dlp"
            FEED_CAPTIONS=off
            # comment
            INVALID_LINE
            "#,
        );
        let vars = read_env_file(cfg.path()).unwrap();
        assert_eq!(vars.get("YOUTUBE_API_KEY").unwrap(), "abc");
        assert_eq!(vars.get("FEED_DATA_DIR").unwrap(), "/data");
        assert_eq!(vars.get("YTDLP_PATH").unwrap(), "/opt/yt-dlp");
        assert_eq!(vars.get("FEED_CAPTIONS").unwrap(), "off");
        assert!(!vars.contains_key("INVALID_LINE"));
    }

    #[test]
    fn read_env_file_missing_file_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let vars = read_env_file(&dir.path().join("missing.env")).unwrap();
        assert!(vars.is_empty());
    }
}
