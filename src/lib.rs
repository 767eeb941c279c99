#![forbid(unsafe_code)]

//! Keeps `feed.json` in sync with the uploads of a set of tracked channels.

pub mod captions;
pub mod channels;
pub mod config;
pub mod feed;
pub mod listing;
pub mod logging;
pub mod security;
pub mod update;
