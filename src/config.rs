use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_ENV_PREFIX: &str = "CLIPDECK";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub views: ViewsConfig,
    #[serde(default)]
    pub ui: UIConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub player: PlayerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub bearer_token: String,
    #[serde(default = "default_api_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            bearer_token: String::new(),
            timeout: default_api_timeout(),
        }
    }
}

fn default_base_url() -> String {
    crate::api::DEFAULT_BASE_URL.to_string()
}

fn default_user_agent() -> String {
    format!("clipdeck/{} (+https://github.com/clipdeck/clipdeck)", crate::VERSION)
}

fn default_api_timeout() -> Duration {
    Duration::from_secs(20)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_debounce", with = "humantime_serde")]
    pub debounce: Duration,
    #[serde(default = "default_backoff_base", with = "humantime_serde")]
    pub backoff_base: Duration,
    #[serde(default = "default_category")]
    pub default_category: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_retries: default_max_retries(),
            debounce: default_debounce(),
            backoff_base: default_backoff_base(),
            default_category: default_category(),
        }
    }
}

fn default_page_size() -> u32 {
    crate::feed::DEFAULT_PAGE_SIZE
}

fn default_max_retries() -> u32 {
    crate::feed::DEFAULT_MAX_RETRIES
}

fn default_debounce() -> Duration {
    crate::feed::DEFAULT_DEBOUNCE
}

fn default_backoff_base() -> Duration {
    crate::feed::DEFAULT_BACKOFF_BASE
}

fn default_category() -> String {
    "all".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViewsConfig {
    #[serde(default = "default_play_threshold", with = "humantime_serde")]
    pub play_threshold: Duration,
    #[serde(default = "default_cooldown", with = "humantime_serde")]
    pub cooldown: Duration,
}

impl Default for ViewsConfig {
    fn default() -> Self {
        Self {
            play_threshold: default_play_threshold(),
            cooldown: default_cooldown(),
        }
    }
}

fn default_play_threshold() -> Duration {
    crate::views::DEFAULT_PLAY_THRESHOLD
}

fn default_cooldown() -> Duration {
    crate::views::DEFAULT_COOLDOWN
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UIConfig {
    #[serde(default = "default_theme")]
    pub theme: String,
}

impl Default for UIConfig {
    fn default() -> Self {
        Self {
            theme: default_theme(),
        }
    }
}

fn default_theme() -> String {
    "default".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaConfig {
    #[serde(default = "default_cache_dir")]
    pub cache_dir: Option<PathBuf>,
    #[serde(default = "default_max_size_bytes")]
    pub max_size_bytes: i64,
    #[serde(default = "default_media_ttl_duration", with = "humantime_serde")]
    pub default_ttl: Duration,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_max_queue_depth")]
    pub max_queue_depth: usize,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            max_size_bytes: default_max_size_bytes(),
            default_ttl: default_media_ttl_duration(),
            workers: default_workers(),
            max_queue_depth: default_max_queue_depth(),
        }
    }
}

fn default_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("clipdeck"))
}

fn default_max_size_bytes() -> i64 {
    200 * 1024 * 1024
}

fn default_media_ttl_duration() -> Duration {
    Duration::from_secs(6 * 60 * 60)
}

fn default_workers() -> usize {
    2
}

fn default_max_queue_depth() -> usize {
    64
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerConfig {
    #[serde(default = "default_video_command")]
    pub video_command: Vec<String>,
    #[serde(default = "default_video_detach")]
    pub video_detach: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            video_command: default_video_command(),
            video_detach: default_video_detach(),
        }
    }
}

fn default_video_command() -> Vec<String> {
    vec!["mpv".into(), "--fs".into(), "%URL%".into()]
}

fn default_video_detach() -> bool {
    true
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            let from_file = read_config_file(path)?;
            cfg = merge_config(cfg, from_file);
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    if !other.api.base_url.is_empty() {
        base.api.base_url = other.api.base_url;
    }
    if !other.api.user_agent.is_empty() {
        base.api.user_agent = other.api.user_agent;
    }
    if !other.api.bearer_token.is_empty() {
        base.api.bearer_token = other.api.bearer_token;
    }
    base.api.timeout = other.api.timeout;

    if other.feed.page_size != 0 {
        base.feed.page_size = other.feed.page_size;
    }
    base.feed.max_retries = other.feed.max_retries;
    base.feed.debounce = other.feed.debounce;
    base.feed.backoff_base = other.feed.backoff_base;
    if !other.feed.default_category.is_empty() {
        base.feed.default_category = other.feed.default_category;
    }

    base.views.play_threshold = other.views.play_threshold;
    base.views.cooldown = other.views.cooldown;

    if !other.ui.theme.is_empty() {
        base.ui.theme = other.ui.theme;
    }

    if other.media.cache_dir.is_some() {
        base.media.cache_dir = other.media.cache_dir;
    }
    if other.media.max_size_bytes != 0 {
        base.media.max_size_bytes = other.media.max_size_bytes;
    }
    base.media.default_ttl = other.media.default_ttl;
    if other.media.workers != 0 {
        base.media.workers = other.media.workers;
    }
    if other.media.max_queue_depth != 0 {
        base.media.max_queue_depth = other.media.max_queue_depth;
    }

    if !other.player.video_command.is_empty() {
        base.player.video_command = other.player.video_command;
    }
    base.player.video_detach = other.player.video_detach;

    base
}

/// Environment overrides are applied last, key by key, onto the merged
/// config so an env var never resets unrelated file-provided values.
fn apply_env(cfg: &mut Config, prefix: &str) {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    for (key, value) in map {
        apply_env_value(cfg, &key, value);
    }
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "api.base_url" => cfg.api.base_url = value,
        "api.user_agent" => cfg.api.user_agent = value,
        "api.bearer_token" => cfg.api.bearer_token = value,
        "api.timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.api.timeout = duration;
            }
        }
        "feed.page_size" => {
            if let Ok(parsed) = value.parse::<u32>() {
                cfg.feed.page_size = parsed;
            }
        }
        "feed.max_retries" => {
            if let Ok(parsed) = value.parse::<u32>() {
                cfg.feed.max_retries = parsed;
            }
        }
        "feed.debounce" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.feed.debounce = duration;
            }
        }
        "feed.backoff_base" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.feed.backoff_base = duration;
            }
        }
        "feed.default_category" => cfg.feed.default_category = value,
        "views.play_threshold" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.views.play_threshold = duration;
            }
        }
        "views.cooldown" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.views.cooldown = duration;
            }
        }
        "ui.theme" => cfg.ui.theme = value,
        "media.cache_dir" => cfg.media.cache_dir = Some(PathBuf::from(value)),
        "media.max_size_bytes" => {
            if let Ok(parsed) = value.parse::<i64>() {
                cfg.media.max_size_bytes = parsed;
            }
        }
        "media.default_ttl" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.media.default_ttl = duration;
            }
        }
        "media.workers" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.media.workers = parsed;
            }
        }
        "media.max_queue_depth" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.media.max_queue_depth = parsed;
            }
        }
        "player.video_command" => {
            cfg.player.video_command = value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        "player.video_detach" => {
            cfg.player.video_detach = matches!(value.as_str(), "1" | "true" | "TRUE" | "True");
        }
        _ => {}
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("clipdeck").join("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_defaults_without_files() {
        let cfg = load(LoadOptions {
            config_file: Some(PathBuf::from("/nonexistent/config.yaml")),
            env_prefix: Some("CLIPDECK_TEST_NONE".into()),
        })
        .unwrap();
        assert_eq!(cfg.ui.theme, "default");
        assert_eq!(cfg.feed.page_size, 10);
        assert_eq!(cfg.views.play_threshold, Duration::from_secs(2));
        assert_eq!(cfg.views.cooldown, Duration::from_secs(3 * 60 * 60));
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "api:\n  base_url: https://staging.example/api/\nfeed:\n  page_size: 5\n  default_category: amv\n",
        )
        .unwrap();
        let cfg = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("CLIPDECK_TEST_NONE".into()),
        })
        .unwrap();
        assert_eq!(cfg.api.base_url, "https://staging.example/api/");
        assert_eq!(cfg.feed.page_size, 5);
        assert_eq!(cfg.feed.default_category, "amv");
        // Untouched sections keep their defaults.
        assert_eq!(cfg.media.workers, 2);
    }

    #[test]
    fn env_overrides() {
        env::set_var("CLIPDECK_ENVTEST_UI__THEME", "midnight");
        env::set_var("CLIPDECK_ENVTEST_FEED__PAGE_SIZE", "25");
        let cfg = load(LoadOptions {
            config_file: Some(PathBuf::from("/nonexistent/config.yaml")),
            env_prefix: Some("CLIPDECK_ENVTEST".into()),
        })
        .unwrap();
        assert_eq!(cfg.ui.theme, "midnight");
        assert_eq!(cfg.feed.page_size, 25);
        env::remove_var("CLIPDECK_ENVTEST_UI__THEME");
        env::remove_var("CLIPDECK_ENVTEST_FEED__PAGE_SIZE");
    }

    #[test]
    fn env_override_keeps_unrelated_file_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "api:\n  timeout: 50s\n").unwrap();

        env::set_var("CLIPDECK_ENVKEEP_UI__THEME", "midnight");
        let cfg = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("CLIPDECK_ENVKEEP".into()),
        })
        .unwrap();
        env::remove_var("CLIPDECK_ENVKEEP_UI__THEME");

        assert_eq!(cfg.ui.theme, "midnight");
        assert_eq!(cfg.api.timeout, Duration::from_secs(50));
    }
}
