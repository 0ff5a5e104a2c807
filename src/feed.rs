use std::collections::HashSet;
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::api::{ApiError, Page, Post};
use crate::data::FeedService;
use crate::log::debug_log;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct Options {
    pub page_size: u32,
    pub max_retries: u32,
    pub debounce: Duration,
    pub backoff_base: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            debounce: DEFAULT_DEBOUNCE,
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }
}

/// Incremental loader for one filtered, cursor-ordered feed.
///
/// State transitions happen in two phases so the fetch itself can run on a
/// worker thread: `begin_load` checks the gates and hands out a ticket that
/// acts as the in-flight lock, `apply` folds the response back in. A filter
/// change bumps the generation, so tickets issued before it are discarded
/// on apply instead of clobbering the fresh feed.
pub struct Controller {
    opts: Options,
    category: Option<String>,
    posts: Vec<Post>,
    seen: HashSet<String>,
    cursor: Option<String>,
    exhausted: bool,
    error: Option<String>,
    in_flight: bool,
    generation: u64,
    last_load: Option<Instant>,
    bypass_debounce: bool,
}

/// Permission for exactly one paged fetch (plus its retries).
#[derive(Debug, Clone)]
pub struct LoadTicket {
    generation: u64,
    attempt: u32,
    pub category: Option<String>,
    pub cursor: Option<String>,
}

#[derive(Debug)]
pub enum Applied {
    /// Page folded in. `exhausted` is true when this was the last page.
    Appended { added: usize, exhausted: bool },
    /// Transient failure; fetch the same page again after `delay`.
    Retry { ticket: LoadTicket, delay: Duration },
    /// Retries exceeded or definitive rejection. Error state is set and the
    /// feed is closed to further loads.
    Failed,
    /// Ticket predates a filter change; response discarded.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded { added: usize, exhausted: bool },
    Failed,
    Skipped,
}

impl Controller {
    pub fn new(category: Option<String>, opts: Options) -> Self {
        Self {
            opts,
            category,
            posts: Vec::new(),
            seen: HashSet::new(),
            cursor: None,
            exhausted: false,
            error: None,
            in_flight: false,
            generation: 0,
            last_load: None,
            // The first load of a session is caller-initiated, not
            // scroll-triggered, so it skips the debounce gate.
            bypass_debounce: true,
        }
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn posts_mut(&mut self) -> &mut [Post] {
        &mut self.posts
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight
    }

    /// Discards the accumulated feed and starts over for a new filter key.
    /// In-flight responses for the old key become stale. The next load is
    /// immediate (no debounce).
    pub fn set_filter(&mut self, category: Option<String>) {
        self.category = category;
        self.posts.clear();
        self.seen.clear();
        self.cursor = None;
        self.exhausted = false;
        self.error = None;
        self.in_flight = false;
        self.generation += 1;
        self.last_load = None;
        self.bypass_debounce = true;
    }

    /// Gate for one fetch. Returns `None` when a load is already in flight,
    /// the feed is exhausted or errored, or the debounce interval since the
    /// last trigger has not elapsed.
    pub fn begin_load(&mut self, now: Instant) -> Option<LoadTicket> {
        if self.in_flight || self.exhausted || self.error.is_some() {
            return None;
        }
        if !self.bypass_debounce {
            if let Some(last) = self.last_load {
                if now.duration_since(last) < self.opts.debounce {
                    return None;
                }
            }
        }
        self.in_flight = true;
        self.last_load = Some(now);
        self.bypass_debounce = false;
        Some(LoadTicket {
            generation: self.generation,
            attempt: 0,
            category: self.category.clone(),
            cursor: self.cursor.clone(),
        })
    }

    pub fn apply(&mut self, ticket: LoadTicket, result: Result<Page<Post>, ApiError>) -> Applied {
        if ticket.generation != self.generation {
            // Filter changed while the request was out; the reset already
            // cleared in_flight for the new generation.
            return Applied::Stale;
        }

        match result {
            Ok(page) => {
                self.in_flight = false;
                let short = (page.results.len() as u32) < self.opts.page_size;
                let mut added = 0;
                for post in page.results {
                    if self.seen.insert(post.id.clone()) {
                        self.posts.push(post);
                        added += 1;
                    }
                }
                self.cursor = page.next;
                if short || self.cursor.is_none() {
                    self.exhausted = true;
                }
                Applied::Appended {
                    added,
                    exhausted: self.exhausted,
                }
            }
            Err(err) if err.is_transient() && ticket.attempt < self.opts.max_retries => {
                let attempt = ticket.attempt + 1;
                let delay = self.backoff_delay(attempt);
                debug_log(format!(
                    "feed: transient error ({}), retry {} of {} in {:?}",
                    err, attempt, self.opts.max_retries, delay
                ));
                Applied::Retry {
                    ticket: LoadTicket {
                        attempt,
                        ..ticket
                    },
                    delay,
                }
            }
            Err(err) => {
                // Fails closed: the error is advisory to the UI and the feed
                // stops auto-loading until the filter changes.
                self.in_flight = false;
                self.error = Some(err.to_string());
                self.exhausted = true;
                Applied::Failed
            }
        }
    }

    /// Blocking driver for worker threads: begin, fetch, retry with backoff,
    /// apply.
    pub fn load_more(&mut self, svc: &dyn FeedService) -> LoadOutcome {
        let Some(mut ticket) = self.begin_load(Instant::now()) else {
            return LoadOutcome::Skipped;
        };
        loop {
            let result = svc.page(
                ticket.category.as_deref(),
                ticket.cursor.as_deref(),
                self.opts.page_size,
            );
            match self.apply(ticket, result) {
                Applied::Appended { added, exhausted } => {
                    return LoadOutcome::Loaded { added, exhausted };
                }
                Applied::Retry { ticket: next, delay } => {
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                    ticket = next;
                }
                Applied::Failed => return LoadOutcome::Failed,
                Applied::Stale => return LoadOutcome::Skipped,
            }
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.opts.backoff_base;
        if base.is_zero() {
            return Duration::ZERO;
        }
        let exp = base.saturating_mul(1u32 << (attempt.saturating_sub(1)).min(16));
        // +/-25% jitter so parallel clients do not retry in lockstep.
        let jitter = rand::thread_rng().gen_range(0.75..=1.25);
        exp.mul_f64(jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Author, ClipStatus};
    use parking_lot::Mutex;

    fn post(id: &str) -> Post {
        Post {
            id: id.into(),
            author: Author {
                username: "editor".into(),
                avatar: None,
                total_points: 0,
                is_followed: false,
            },
            video_url: format!("https://cdn.example/{}.mp4", id),
            thumbnail: None,
            caption: String::new(),
            status: ClipStatus::Ready,
            plus_one_count: 0,
            plus_two_count: 0,
            total_score: 0,
            view_count: 0,
            comment_count: 0,
            created_at: chrono::Utc::now(),
            user_vote: None,
        }
    }

    fn page(ids: &[&str], next: Option<&str>) -> Page<Post> {
        Page {
            results: ids.iter().map(|id| post(id)).collect(),
            next: next.map(|s| s.to_string()),
        }
    }

    struct ScriptedFeed {
        responses: Mutex<Vec<Result<Page<Post>, ApiError>>>,
        calls: Mutex<Vec<(Option<String>, Option<String>)>>,
    }

    impl ScriptedFeed {
        fn new(responses: Vec<Result<Page<Post>, ApiError>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().len()
        }
    }

    impl FeedService for ScriptedFeed {
        fn page(
            &self,
            category: Option<&str>,
            cursor: Option<&str>,
            _limit: u32,
        ) -> Result<Page<Post>, ApiError> {
            self.calls
                .lock()
                .push((category.map(String::from), cursor.map(String::from)));
            let mut responses = self.responses.lock();
            if responses.is_empty() {
                Ok(Page {
                    results: Vec::new(),
                    next: None,
                })
            } else {
                responses.remove(0)
            }
        }
    }

    fn fast_options() -> Options {
        Options {
            page_size: 10,
            max_retries: 2,
            debounce: Duration::from_millis(300),
            backoff_base: Duration::ZERO,
        }
    }

    #[test]
    fn full_then_short_page_exhausts_feed() {
        let ids: Vec<String> = (0..10).map(|i| format!("p{}", i)).collect();
        let first: Vec<&str> = ids.iter().map(|s| s.as_str()).collect();
        let svc = ScriptedFeed::new(vec![
            Ok(page(&first, Some("abc"))),
            Ok(page(&["p10", "p11", "p12", "p13"], None)),
        ]);
        let mut ctrl = Controller::new(Some("amv".into()), fast_options());

        assert_eq!(
            ctrl.load_more(&svc),
            LoadOutcome::Loaded {
                added: 10,
                exhausted: false
            }
        );
        // Second cursor is the token the server handed back.
        let ticket = ctrl.begin_load(Instant::now() + Duration::from_secs(1)).unwrap();
        assert_eq!(ticket.cursor.as_deref(), Some("abc"));
        let result = svc.page(
            ticket.category.as_deref(),
            ticket.cursor.as_deref(),
            10,
        );
        ctrl.apply(ticket, result);

        assert_eq!(ctrl.posts().len(), 14);
        assert!(ctrl.exhausted());

        // Exhausted feed never touches the network again.
        let calls = svc.call_count();
        assert_eq!(ctrl.load_more(&svc), LoadOutcome::Skipped);
        assert_eq!(svc.call_count(), calls);
    }

    #[test]
    fn appended_posts_are_deduplicated() {
        let svc = ScriptedFeed::new(vec![
            Ok(page(&["a", "b", "c"], Some("t1"))),
            Ok(page(&["b", "c", "d"], None)),
        ]);
        let mut ctrl = Controller::new(None, fast_options());
        ctrl.load_more(&svc);
        assert!(ctrl.exhausted()); // 3 < page_size
        let ids: Vec<&str> = ctrl.posts().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn dedup_across_pages() {
        let mut opts = fast_options();
        opts.page_size = 3;
        let svc = ScriptedFeed::new(vec![
            Ok(page(&["a", "b", "c"], Some("t1"))),
            Ok(page(&["b", "c", "d"], None)),
        ]);
        let mut ctrl = Controller::new(None, opts);
        ctrl.load_more(&svc);
        let ticket = ctrl.begin_load(Instant::now() + Duration::from_secs(1)).unwrap();
        let result = svc.page(None, ticket.cursor.as_deref(), 3);
        ctrl.apply(ticket, result);

        let ids: Vec<&str> = ctrl.posts().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn only_one_load_in_flight() {
        let mut ctrl = Controller::new(None, fast_options());
        let now = Instant::now();
        let first = ctrl.begin_load(now);
        assert!(first.is_some());
        assert!(ctrl.begin_load(now).is_none());
        assert!(ctrl.begin_load(now + Duration::from_secs(5)).is_none());
    }

    #[test]
    fn rapid_triggers_are_debounced() {
        let svc = ScriptedFeed::new(vec![Ok(page(&["a"], Some("t1")))]);
        let mut opts = fast_options();
        opts.page_size = 1;
        let mut ctrl = Controller::new(None, opts);

        let start = Instant::now();
        let ticket = ctrl.begin_load(start).unwrap();
        let result = svc.page(None, None, 1);
        ctrl.apply(ticket, result);

        // Within the debounce window: no-op.
        assert!(ctrl.begin_load(start + Duration::from_millis(100)).is_none());
        // Past it: allowed.
        assert!(ctrl.begin_load(start + Duration::from_millis(400)).is_some());
    }

    #[test]
    fn transient_errors_retry_then_fail_closed() {
        let svc = ScriptedFeed::new(vec![
            Err(ApiError::Server { status: 500 }),
            Err(ApiError::Server { status: 502 }),
            Err(ApiError::Server { status: 503 }),
        ]);
        let mut ctrl = Controller::new(None, fast_options());

        assert_eq!(ctrl.load_more(&svc), LoadOutcome::Failed);
        // Initial attempt plus max_retries retries.
        assert_eq!(svc.call_count(), 3);
        assert!(ctrl.exhausted());
        assert!(ctrl.error().is_some());
        assert_eq!(ctrl.load_more(&svc), LoadOutcome::Skipped);
        assert_eq!(svc.call_count(), 3);
    }

    #[test]
    fn transient_error_then_success_recovers() {
        let svc = ScriptedFeed::new(vec![
            Err(ApiError::RateLimited),
            Ok(page(&["a", "b"], None)),
        ]);
        let mut ctrl = Controller::new(None, fast_options());
        assert_eq!(
            ctrl.load_more(&svc),
            LoadOutcome::Loaded {
                added: 2,
                exhausted: true
            }
        );
        assert!(ctrl.error().is_none());
    }

    #[test]
    fn rejections_fail_without_retry() {
        let svc = ScriptedFeed::new(vec![Err(ApiError::NotFound)]);
        let mut ctrl = Controller::new(None, fast_options());
        assert_eq!(ctrl.load_more(&svc), LoadOutcome::Failed);
        assert_eq!(svc.call_count(), 1);
        assert!(ctrl.exhausted());
    }

    #[test]
    fn filter_change_resets_and_loads_immediately() {
        let svc = ScriptedFeed::new(vec![
            Ok(page(&["a"], None)),
            Ok(page(&["x", "y"], None)),
        ]);
        let mut opts = fast_options();
        opts.page_size = 1;
        let mut ctrl = Controller::new(Some("amv".into()), opts);
        ctrl.load_more(&svc);
        assert!(ctrl.exhausted());

        ctrl.set_filter(Some("wip".into()));
        assert!(ctrl.posts().is_empty());
        assert!(!ctrl.exhausted());
        assert!(ctrl.error().is_none());

        // Bypasses the debounce even though the last trigger just happened.
        match ctrl.load_more(&svc) {
            LoadOutcome::Loaded { added, .. } => assert_eq!(added, 2),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(svc.calls.lock()[1].0.as_deref(), Some("wip"));
    }

    #[test]
    fn stale_response_after_filter_change_is_discarded() {
        let mut ctrl = Controller::new(Some("amv".into()), fast_options());
        let ticket = ctrl.begin_load(Instant::now()).unwrap();

        ctrl.set_filter(Some("wip".into()));
        let applied = ctrl.apply(ticket, Ok(page(&["old1", "old2"], Some("t9"))));
        assert!(matches!(applied, Applied::Stale));
        assert!(ctrl.posts().is_empty());
        // The new generation can still load.
        assert!(ctrl.begin_load(Instant::now()).is_some());
    }
}
