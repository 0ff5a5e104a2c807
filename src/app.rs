use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use semver::Version;

use crate::api;
use crate::config;
use crate::data::{
    ApiCommentService, ApiFeedService, ApiInteractionService, ApiLeaderboardService,
    ApiNotificationService, ApiProfileService, ApiViewService, CommentService, FeedService,
    InteractionService, LeaderboardService, MockCommentService, MockFeedService,
    MockInteractionService, MockLeaderboardService, MockProfileService, MockViewService,
    NotificationService, ProfileService, ViewService,
};
use crate::feed;
use crate::log::debug_log;
use crate::media;
use crate::notify;
use crate::playback;
use crate::storage;
use crate::ui;
use crate::update;

const CATEGORIES: &[&str] = &["all", "amv", "edit", "wip"];

pub fn run() -> Result<()> {
    let cfg = config::load(config::LoadOptions::default()).context("load configuration")?;

    let store = match storage::Store::open(storage::Options::default()) {
        Ok(store) => Some(Arc::new(store)),
        Err(err) => {
            // The app still works without local state; views just re-send
            // after a restart and thumbnails are fetched every time.
            debug_log(format!("app: open store failed: {}", err));
            None
        }
    };

    let client = match api::Client::new(api::ClientConfig {
        user_agent: cfg.api.user_agent.clone(),
        base_url: Some(cfg.api.base_url.clone()),
        bearer_token: if cfg.api.bearer_token.is_empty() {
            None
        } else {
            Some(cfg.api.bearer_token.clone())
        },
        timeout: Some(cfg.api.timeout),
        http_client: None,
    }) {
        Ok(client) => Some(Arc::new(client)),
        Err(err) => {
            debug_log(format!("app: api client init failed: {}", err));
            None
        }
    };

    let (
        feed_service,
        view_service,
        interaction_service,
        comment_service,
        leaderboard_service,
        profile_service,
        notification_service,
    ): (
        Arc<dyn FeedService>,
        Arc<dyn ViewService>,
        Arc<dyn InteractionService>,
        Arc<dyn CommentService>,
        Arc<dyn LeaderboardService>,
        Arc<dyn ProfileService>,
        Option<Arc<dyn NotificationService>>,
    ) = match client.as_ref() {
        Some(client) => (
            Arc::new(ApiFeedService::new(client.clone())),
            Arc::new(ApiViewService::new(client.clone())),
            Arc::new(ApiInteractionService::new(client.clone())),
            Arc::new(ApiCommentService::new(client.clone())),
            Arc::new(ApiLeaderboardService::new(client.clone())),
            Arc::new(ApiProfileService::new(client.clone())),
            Some(Arc::new(ApiNotificationService::new(client.clone()))),
        ),
        None => (
            Arc::new(MockFeedService),
            Arc::new(MockViewService),
            Arc::new(MockInteractionService),
            Arc::new(MockCommentService),
            Arc::new(MockLeaderboardService),
            Arc::new(MockProfileService),
            None,
        ),
    };

    let media = store.as_ref().and_then(|store| {
        match media::Manager::new(
            store.clone(),
            media::Config {
                cache_dir: cfg.media.cache_dir.clone(),
                max_size_bytes: cfg.media.max_size_bytes,
                default_ttl: cfg.media.default_ttl,
                workers: cfg.media.workers,
                max_queue_depth: cfg.media.max_queue_depth,
                http_client: None,
            },
        ) {
            Ok(manager) => Some(Arc::new(manager)),
            Err(err) => {
                debug_log(format!("app: media manager init failed: {}", err));
                None
            }
        }
    });

    let mut status_message = match client {
        Some(_) => format!("Connected to {}", cfg.api.base_url),
        None => "Offline mode: showing sample clips.".to_string(),
    };
    if let Some(update) = startup_update_check() {
        status_message = format!(
            "Update available: v{} ({})",
            update.version, update.release_url
        );
    }

    let mut model = ui::Model::new(ui::Options {
        status_message,
        categories: CATEGORIES.iter().map(|s| s.to_string()).collect(),
        default_category: cfg.feed.default_category.clone(),
        feed_service,
        interaction_service,
        view_service,
        comment_service,
        leaderboard_service,
        profile_service,
        notification_service,
        store,
        media,
        playback: Arc::new(playback::Context::new()),
        feed_options: feed::Options {
            page_size: cfg.feed.page_size,
            max_retries: cfg.feed.max_retries,
            debounce: cfg.feed.debounce,
            backoff_base: cfg.feed.backoff_base,
        },
        views: cfg.views.clone(),
        player: cfg.player.clone(),
        poll_interval: notify::DEFAULT_POLL_INTERVAL,
    });

    model.run()
}

/// Best-effort release check at startup. Skipped when the env var is set;
/// failures never block the UI.
fn startup_update_check() -> Option<update::UpdateInfo> {
    if env::var(update::SKIP_UPDATE_ENV).is_ok() {
        return None;
    }
    let current = Version::parse(crate::VERSION).ok()?;
    match update::check_for_update(&current) {
        Ok(info) => info,
        Err(err) => {
            debug_log(format!("app: update check failed: {}", err));
            None
        }
    }
}
