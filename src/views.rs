use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

pub const DEFAULT_PLAY_THRESHOLD: Duration = Duration::from_millis(2000);
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(3 * 60 * 60);

/// Decides when a clip has earned a "view": a fixed stretch of
/// uninterrupted playback, at most once per post per cool-down window.
///
/// The tracker is pure bookkeeping driven by play/pause events and a
/// caller-supplied clock; actually recording the view (the network call) is
/// the caller's job and is best-effort.
pub struct Tracker {
    threshold: Duration,
    cooldown: Duration,
    /// Post id -> deadline at which the pending play segment matures.
    pending: HashMap<String, Instant>,
    /// Post id -> when a view was last emitted for it.
    recorded: HashMap<String, Instant>,
}

impl Tracker {
    pub fn new(threshold: Duration, cooldown: Duration) -> Self {
        Self {
            threshold,
            cooldown,
            pending: HashMap::new(),
            recorded: HashMap::new(),
        }
    }

    /// Seeds the cool-down cache from the persisted view log so a restart
    /// does not double-count recent views. Entries older than the window
    /// are ignored.
    pub fn hydrate(&mut self, log: &[(String, DateTime<Utc>)], now: Instant) {
        let wall_now = Utc::now();
        for (id, recorded_at) in log {
            let age = wall_now.signed_duration_since(*recorded_at);
            let Ok(age) = age.to_std() else {
                continue;
            };
            if age < self.cooldown {
                if let Some(instant) = now.checked_sub(age) {
                    self.recorded.insert(id.clone(), instant);
                }
            }
        }
    }

    /// Play event: arms the threshold timer unless one is already pending
    /// for this post. An already-armed timer is never extended.
    pub fn on_play(&mut self, post_id: &str, now: Instant) {
        self.pending
            .entry(post_id.to_string())
            .or_insert(now + self.threshold);
    }

    /// Pause or ended event: the play segment did not survive the
    /// threshold, so no view is recorded for it.
    pub fn on_pause(&mut self, post_id: &str) {
        self.pending.remove(post_id);
    }

    pub fn on_ended(&mut self, post_id: &str) {
        self.on_pause(post_id);
    }

    /// Returns the posts whose pending segment has matured. Matured posts
    /// are cleared from the pending set (a later play/pause cycle can arm a
    /// new one) and stamped into the cool-down cache; posts still inside
    /// the cool-down window are dropped without reaching the caller.
    pub fn due(&mut self, now: Instant) -> Vec<String> {
        let matured: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();

        let mut out = Vec::new();
        for id in matured {
            self.pending.remove(&id);
            let suppressed = self
                .recorded
                .get(&id)
                .map_or(false, |at| now.duration_since(*at) < self.cooldown);
            if suppressed {
                continue;
            }
            self.recorded.insert(id.clone(), now);
            out.push(id);
        }
        out
    }

    pub fn has_pending(&self, post_id: &str) -> bool {
        self.pending.contains_key(post_id)
    }
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new(DEFAULT_PLAY_THRESHOLD, DEFAULT_COOLDOWN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> Tracker {
        Tracker::new(Duration::from_millis(2000), Duration::from_secs(3 * 60 * 60))
    }

    #[test]
    fn pause_before_threshold_cancels() {
        let mut t = tracker();
        let t0 = Instant::now();
        t.on_play("p1", t0);
        t.on_pause("p1");
        assert!(t.due(t0 + Duration::from_secs(10)).is_empty());
    }

    #[test]
    fn sustained_play_fires_exactly_once() {
        let mut t = tracker();
        let t0 = Instant::now();
        t.on_play("p1", t0);
        assert!(t.due(t0 + Duration::from_millis(1999)).is_empty());
        assert_eq!(t.due(t0 + Duration::from_millis(2000)), vec!["p1"]);
        // Timer slot cleared: nothing more without a new play event.
        assert!(t.due(t0 + Duration::from_secs(60)).is_empty());
    }

    #[test]
    fn play_event_does_not_extend_pending_timer() {
        let mut t = tracker();
        let t0 = Instant::now();
        t.on_play("p1", t0);
        t.on_play("p1", t0 + Duration::from_millis(1500));
        assert_eq!(t.due(t0 + Duration::from_millis(2000)), vec!["p1"]);
    }

    #[test]
    fn repeat_view_within_cooldown_is_suppressed() {
        let mut t = tracker();
        let t0 = Instant::now();
        t.on_play("p1", t0);
        assert_eq!(t.due(t0 + Duration::from_secs(2)), vec!["p1"]);

        let later = t0 + Duration::from_secs(60);
        t.on_play("p1", later);
        assert!(t.due(later + Duration::from_secs(2)).is_empty());
        assert!(!t.has_pending("p1"));
    }

    #[test]
    fn repeat_view_after_cooldown_records_again() {
        let mut t = Tracker::new(Duration::from_secs(2), Duration::from_secs(100));
        let t0 = Instant::now();
        t.on_play("p1", t0);
        assert_eq!(t.due(t0 + Duration::from_secs(2)), vec!["p1"]);

        let later = t0 + Duration::from_secs(150);
        t.on_play("p1", later);
        assert_eq!(t.due(later + Duration::from_secs(2)), vec!["p1"]);
    }

    #[test]
    fn independent_posts_track_independently() {
        let mut t = tracker();
        let t0 = Instant::now();
        t.on_play("p1", t0);
        t.on_play("p2", t0 + Duration::from_secs(1));
        t.on_pause("p2");
        let due = t.due(t0 + Duration::from_secs(5));
        assert_eq!(due, vec!["p1"]);
    }

    #[test]
    fn hydrated_log_suppresses_recent_views() {
        let mut t = tracker();
        let now = Instant::now();
        let log = vec![
            ("recent".to_string(), Utc::now() - chrono::Duration::minutes(5)),
            ("old".to_string(), Utc::now() - chrono::Duration::hours(4)),
        ];
        t.hydrate(&log, now);

        t.on_play("recent", now);
        t.on_play("old", now);
        let due = t.due(now + Duration::from_secs(2));
        assert_eq!(due, vec!["old"]);
    }
}
