#![allow(clippy::uninlined_format_args)]

pub mod api;
pub mod app;
pub mod config;
pub mod data;
pub mod feed;
pub mod log;
pub mod media;
pub mod notify;
pub mod playback;
pub mod player;
pub mod storage;
pub mod ui;
pub mod update;
pub mod views;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
