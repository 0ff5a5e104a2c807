use std::collections::HashMap;
use std::io::{self, Stdout};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context as AnyhowContext, Result};
use chrono::Utc;
use crossbeam_channel::{unbounded, Receiver, Sender};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use parking_lot::Mutex;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::{Frame, Terminal};
use textwrap::wrap;
use unicode_width::UnicodeWidthStr;

use crate::api::{
    ApiError, Comment, LeaderboardEntry, LeaderboardPeriod, Page, Post, Profile, VoteSnapshot,
    VoteValue,
};
use crate::config;
use crate::data::{
    CommentService, FeedService, InteractionService, LeaderboardService, NotificationService,
    ProfileService, ViewService,
};
use crate::feed::{self, Applied, LoadTicket};
use crate::log::debug_log;
use crate::media;
use crate::notify;
use crate::playback::{self, PlayRejected, Playable};
use crate::player;
use crate::storage;
use crate::views;

const CARD_HEIGHT: u16 = 7;
/// Start loading the next page when selection is this close to the end.
const LOAD_AHEAD: usize = 4;
const TICK: Duration = Duration::from_millis(100);

const COLOR_BG: Color = Color::Rgb(30, 30, 46);
const COLOR_PANEL_BG: Color = Color::Rgb(24, 24, 36);
const COLOR_BORDER_IDLE: Color = Color::Rgb(49, 50, 68);
const COLOR_BORDER_FOCUSED: Color = Color::Rgb(137, 180, 250);
const COLOR_TEXT_PRIMARY: Color = Color::Rgb(205, 214, 244);
const COLOR_TEXT_SECONDARY: Color = Color::Rgb(166, 173, 200);
const COLOR_ACCENT: Color = Color::Rgb(137, 180, 250);
const COLOR_SUCCESS: Color = Color::Rgb(166, 227, 161);
const COLOR_ERROR: Color = Color::Rgb(243, 139, 168);

/// In-memory playback state of one clip card. The terminal cannot decode
/// video inline, so "playing" is the coordination state the selector
/// maintains; the external player ('o') is the actual screen.
pub struct ClipHandle {
    state: Mutex<ClipState>,
}

#[derive(Default)]
struct ClipState {
    playing: bool,
    muted: bool,
}

impl ClipHandle {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ClipState {
                muted: true,
                ..Default::default()
            }),
        })
    }

    pub fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    pub fn is_muted(&self) -> bool {
        self.state.lock().muted
    }
}

impl Playable for ClipHandle {
    fn play(&self) -> Result<(), PlayRejected> {
        self.state.lock().playing = true;
        Ok(())
    }

    fn pause(&self) {
        self.state.lock().playing = false;
    }

    fn set_muted(&self, muted: bool) {
        self.state.lock().muted = muted;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    Feed,
    Comments,
    Leaderboard,
    Profile,
}

struct CommentsPane {
    post_id: String,
    author: String,
    comments: Vec<Comment>,
    loading: bool,
    error: Option<String>,
    scroll: usize,
}

struct LeaderboardPane {
    period: LeaderboardPeriod,
    entries: Vec<LeaderboardEntry>,
    loading: bool,
    error: Option<String>,
}

struct ProfilePane {
    username: String,
    profile: Option<Profile>,
    posts: Vec<Post>,
    loading: bool,
    error: Option<String>,
}

enum UiMsg {
    FeedResult {
        ticket: LoadTicket,
        result: Result<Page<Post>, ApiError>,
    },
    VoteFailed {
        post_id: String,
        snapshot: VoteSnapshot,
        error: String,
    },
    FollowSettled {
        username: String,
        followed: bool,
        error: Option<String>,
    },
    CommentsLoaded {
        post_id: String,
        result: Result<Page<Comment>, ApiError>,
    },
    ReplyPosted {
        post_id: String,
        result: Result<Comment, ApiError>,
    },
    LeaderboardLoaded {
        period: LeaderboardPeriod,
        result: Result<Vec<LeaderboardEntry>, ApiError>,
    },
    ProfileLoaded {
        username: String,
        result: Result<(Profile, Page<Post>), ApiError>,
    },
}

pub struct Options {
    pub status_message: String,
    pub categories: Vec<String>,
    pub default_category: String,
    pub feed_service: Arc<dyn FeedService>,
    pub interaction_service: Arc<dyn InteractionService>,
    pub view_service: Arc<dyn ViewService>,
    pub comment_service: Arc<dyn CommentService>,
    pub leaderboard_service: Arc<dyn LeaderboardService>,
    pub profile_service: Arc<dyn ProfileService>,
    pub notification_service: Option<Arc<dyn NotificationService>>,
    pub store: Option<Arc<storage::Store>>,
    pub media: Option<Arc<media::Manager>>,
    pub playback: Arc<playback::Context>,
    pub feed_options: feed::Options,
    pub views: config::ViewsConfig,
    pub player: config::PlayerConfig,
    pub poll_interval: Duration,
}

pub struct Model {
    controller: feed::Controller,
    playback: Arc<playback::Context>,
    tracker: views::Tracker,
    cards: HashMap<String, Arc<ClipHandle>>,
    last_active: Option<String>,

    feed_service: Arc<dyn FeedService>,
    interaction_service: Arc<dyn InteractionService>,
    view_service: Arc<dyn ViewService>,
    comment_service: Arc<dyn CommentService>,
    leaderboard_service: Arc<dyn LeaderboardService>,
    profile_service: Arc<dyn ProfileService>,
    store: Option<Arc<storage::Store>>,
    media: Option<Arc<media::Manager>>,

    categories: Vec<String>,
    category_index: usize,
    player_cfg: config::PlayerConfig,
    page_size: u32,

    view: View,
    comments: Option<CommentsPane>,
    leaderboard: Option<LeaderboardPane>,
    profile: Option<ProfilePane>,
    input: Option<String>,

    selected: usize,
    feed_area: Rect,
    status: String,
    unread: i64,

    tx: Sender<UiMsg>,
    rx: Receiver<UiMsg>,
    notify_handle: Option<notify::Handle>,
    notification_service: Option<Arc<dyn NotificationService>>,
    poll_interval: Duration,
}

impl Model {
    pub fn new(options: Options) -> Self {
        let (tx, rx) = unbounded();
        let category_index = options
            .categories
            .iter()
            .position(|c| c == &options.default_category)
            .unwrap_or(0);
        let category = options
            .categories
            .get(category_index)
            .cloned()
            .unwrap_or_else(|| "all".into());
        let filter = if category == "all" { None } else { Some(category) };

        let mut tracker =
            views::Tracker::new(options.views.play_threshold, options.views.cooldown);
        if let Some(store) = options.store.as_ref() {
            let cutoff = Utc::now()
                - chrono::Duration::from_std(options.views.cooldown)
                    .unwrap_or_else(|_| chrono::Duration::hours(3));
            match store.recent_views(cutoff) {
                Ok(records) => {
                    let log: Vec<(String, chrono::DateTime<Utc>)> = records
                        .into_iter()
                        .map(|r| (r.post_id, r.recorded_at))
                        .collect();
                    tracker.hydrate(&log, Instant::now());
                }
                Err(err) => debug_log(format!("ui: hydrate view log failed: {}", err)),
            }
            let _ = store.prune_views(cutoff);
        }

        let page_size = options.feed_options.page_size;

        Self {
            controller: feed::Controller::new(filter, options.feed_options),
            playback: options.playback,
            tracker,
            cards: HashMap::new(),
            last_active: None,
            feed_service: options.feed_service,
            interaction_service: options.interaction_service,
            view_service: options.view_service,
            comment_service: options.comment_service,
            leaderboard_service: options.leaderboard_service,
            profile_service: options.profile_service,
            store: options.store,
            media: options.media,
            categories: options.categories,
            category_index,
            player_cfg: options.player,
            page_size,
            view: View::Feed,
            comments: None,
            leaderboard: None,
            profile: None,
            input: None,
            selected: 0,
            feed_area: Rect::new(0, 0, 80, 24),
            status: options.status_message,
            unread: 0,
            tx,
            rx,
            notify_handle: None,
            notification_service: options.notification_service,
            poll_interval: options.poll_interval,
        }
    }

    pub fn run(&mut self) -> Result<()> {
        enable_raw_mode().context("enable raw mode")?;
        io::stdout()
            .execute(EnterAlternateScreen)
            .context("enter alternate screen")?;
        let backend = CrosstermBackend::new(io::stdout());
        let mut terminal = Terminal::new(backend).context("create terminal")?;

        let result = self.event_loop(&mut terminal);

        disable_raw_mode().ok();
        io::stdout().execute(LeaveAlternateScreen).ok();
        if let Some(handle) = self.notify_handle.take() {
            handle.stop();
        }
        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        if let Some(svc) = self.notification_service.clone() {
            self.notify_handle = Some(notify::spawn(svc, self.poll_interval));
        }
        self.trigger_load();

        loop {
            self.drain_messages();
            self.flush_due_views();

            terminal.draw(|frame| self.draw(frame))?;

            if event::poll(TICK).context("poll input")? {
                if let Event::Key(key) = event::read().context("read input")? {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    if self.handle_key(key.code) {
                        return Ok(());
                    }
                }
            }

            if self.view == View::Feed {
                self.update_playback();
                self.maybe_load_ahead();
            }
        }
    }

    /// Returns true when the user asked to quit.
    fn handle_key(&mut self, code: KeyCode) -> bool {
        if self.input.is_some() {
            self.handle_compose_key(code);
            return false;
        }
        match self.view {
            View::Feed => match code {
                KeyCode::Char('q') | KeyCode::Esc => return true,
                KeyCode::Char('j') | KeyCode::Down => self.move_selection(1),
                KeyCode::Char('k') | KeyCode::Up => self.move_selection(-1),
                KeyCode::Enter => self.open_comments(),
                KeyCode::Char('L') => self.open_leaderboard(),
                KeyCode::Char('u') => self.open_profile(),
                KeyCode::Char('m') => {
                    let enabled = self.playback.toggle_audio();
                    self.status = if enabled {
                        "Audio on (applies to the active clip only).".into()
                    } else {
                        "Audio muted everywhere.".into()
                    };
                }
                KeyCode::Char('1') => self.vote(VoteValue::PlusOne),
                KeyCode::Char('2') => self.vote(VoteValue::PlusTwo),
                KeyCode::Char('f') => self.toggle_follow(),
                KeyCode::Char('o') => self.open_player(),
                KeyCode::Char('O') => self.open_browser(),
                KeyCode::Char('c') => self.next_category(),
                KeyCode::Char('R') => self.refresh(),
                _ => {}
            },
            View::Comments => match code {
                KeyCode::Char('q') | KeyCode::Esc => self.view = View::Feed,
                KeyCode::Char('j') | KeyCode::Down => {
                    if let Some(pane) = self.comments.as_mut() {
                        let max = pane.comments.len().saturating_sub(1);
                        pane.scroll = (pane.scroll + 1).min(max);
                    }
                }
                KeyCode::Char('k') | KeyCode::Up => {
                    if let Some(pane) = self.comments.as_mut() {
                        pane.scroll = pane.scroll.saturating_sub(1);
                    }
                }
                KeyCode::Char('r') => self.input = Some(String::new()),
                _ => {}
            },
            View::Leaderboard => match code {
                KeyCode::Char('q') | KeyCode::Esc => self.view = View::Feed,
                KeyCode::Char('p') => self.cycle_period(),
                _ => {}
            },
            View::Profile => match code {
                KeyCode::Char('q') | KeyCode::Esc => self.view = View::Feed,
                _ => {}
            },
        }
        false
    }

    fn handle_compose_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Esc => self.input = None,
            KeyCode::Enter => self.submit_reply(),
            KeyCode::Backspace => {
                if let Some(input) = self.input.as_mut() {
                    input.pop();
                }
            }
            KeyCode::Char(c) => {
                if let Some(input) = self.input.as_mut() {
                    input.push(c);
                }
            }
            _ => {}
        }
    }

    /// Leaving the feed empties the visible set, which pauses whatever was
    /// playing and cancels its pending view timer.
    fn enter_view(&mut self, view: View) {
        if self.view == View::Feed && view != View::Feed {
            self.park_playback();
        }
        self.view = view;
    }

    fn park_playback(&mut self) {
        for id in self.cards.keys() {
            self.playback.observe(id, None);
        }
        self.playback.select(viewport_rows(self.feed_area) as f32 / 2.0);
        if let Some(old) = self.last_active.take() {
            self.tracker.on_pause(&old);
        }
    }

    fn drain_messages(&mut self) {
        while let Ok(msg) = self.rx.try_recv() {
            match msg {
                UiMsg::FeedResult { ticket, result } => self.apply_feed_result(ticket, result),
                UiMsg::VoteFailed {
                    post_id,
                    snapshot,
                    error,
                } => {
                    if let Some(post) = self
                        .controller
                        .posts_mut()
                        .iter_mut()
                        .find(|p| p.id == post_id)
                    {
                        post.revert_to(snapshot);
                    }
                    self.status = format!("Vote failed: {}", error);
                }
                UiMsg::FollowSettled {
                    username,
                    followed,
                    error,
                } => match error {
                    Some(error) => {
                        self.patch_follow(&username, !followed);
                        self.status = format!("Follow failed: {}", error);
                    }
                    None => {
                        self.status = if followed {
                            format!("Following {}.", username)
                        } else {
                            format!("Unfollowed {}.", username)
                        };
                    }
                },
                UiMsg::CommentsLoaded { post_id, result } => {
                    self.apply_comments_result(post_id, result);
                }
                UiMsg::ReplyPosted { post_id, result } => {
                    self.apply_reply_result(post_id, result);
                }
                UiMsg::LeaderboardLoaded { period, result } => {
                    self.apply_leaderboard_result(period, result);
                }
                UiMsg::ProfileLoaded { username, result } => {
                    self.apply_profile_result(username, result);
                }
            }
        }
        if let Some(handle) = self.notify_handle.as_ref() {
            while let Ok(event) = handle.events.try_recv() {
                match event {
                    notify::Event::UnreadCount(count) => self.unread = count,
                }
            }
        }
    }

    fn apply_feed_result(&mut self, ticket: LoadTicket, result: Result<Page<Post>, ApiError>) {
        match self.controller.apply(ticket, result) {
            Applied::Appended { added, exhausted } => {
                if added > 0 {
                    self.status = format!("Loaded {} clips.", added);
                } else if exhausted {
                    self.status = "No more posts.".into();
                }
                self.sync_cards();
            }
            Applied::Retry { ticket, delay } => {
                let tx = self.tx.clone();
                let svc = self.feed_service.clone();
                let limit = self.page_size;
                thread::spawn(move || {
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                    let result = svc.page(ticket.category.as_deref(), ticket.cursor.as_deref(), limit);
                    let _ = tx.send(UiMsg::FeedResult { ticket, result });
                });
            }
            Applied::Failed => {
                self.status = format!(
                    "Could not load the feed: {}. Press R to retry.",
                    self.controller.error().unwrap_or("unknown error")
                );
            }
            Applied::Stale => {}
        }
    }

    fn trigger_load(&mut self) {
        let Some(ticket) = self.controller.begin_load(Instant::now()) else {
            return;
        };
        let tx = self.tx.clone();
        let svc = self.feed_service.clone();
        let limit = self.page_size;
        thread::spawn(move || {
            let result = svc.page(ticket.category.as_deref(), ticket.cursor.as_deref(), limit);
            let _ = tx.send(UiMsg::FeedResult { ticket, result });
        });
    }

    fn maybe_load_ahead(&mut self) {
        let len = self.controller.posts().len();
        if len == 0 || self.selected + LOAD_AHEAD >= len {
            self.trigger_load();
        }
    }

    fn move_selection(&mut self, delta: i64) {
        let len = self.controller.posts().len();
        if len == 0 {
            return;
        }
        let max = len as i64 - 1;
        self.selected = (self.selected as i64 + delta).clamp(0, max) as usize;
    }

    /// Mirrors the accumulated feed into mounted clip handles: new posts get
    /// a handle, posts that left the feed are unmounted from the selector.
    fn sync_cards(&mut self) {
        let ids: Vec<String> = self.controller.posts().iter().map(|p| p.id.clone()).collect();
        for id in &ids {
            if !self.cards.contains_key(id) {
                let handle = ClipHandle::new();
                self.playback.register(id.clone(), handle.clone());
                self.cards.insert(id.clone(), handle);
            }
        }
        let stale: Vec<String> = self
            .cards
            .keys()
            .filter(|id| !ids.contains(id))
            .cloned()
            .collect();
        for id in stale {
            self.playback.remove(&id);
            self.tracker.on_pause(&id);
            self.cards.remove(&id);
        }
    }

    /// Recomputes card visibility from the current scroll position and runs
    /// selection, then forwards playback transitions into the view tracker.
    fn update_playback(&mut self) {
        let posts = self.controller.posts();
        if posts.is_empty() {
            return;
        }
        let viewport = viewport_rows(self.feed_area);
        let offset = scroll_offset(self.selected, posts.len(), viewport);

        for (index, post) in posts.iter().enumerate() {
            let center = card_center(index, offset, viewport);
            self.playback.observe(&post.id, center);
            if center.is_some() {
                if let (Some(media), Some(thumb)) = (self.media.as_ref(), post.thumbnail.as_ref())
                {
                    media.prefetch(thumb);
                }
            }
        }
        self.playback.select(viewport as f32 / 2.0);

        let active = self.playback.active();
        if active != self.last_active {
            let now = Instant::now();
            if let Some(old) = self.last_active.take() {
                self.tracker.on_pause(&old);
            }
            if let Some(new) = active.as_ref() {
                self.tracker.on_play(new, now);
            }
            self.last_active = active;
        }
    }

    /// Sends matured views to the backend. Best-effort: errors are logged
    /// and forgotten, never shown.
    fn flush_due_views(&mut self) {
        for post_id in self.tracker.due(Instant::now()) {
            if let Some(store) = self.store.as_ref() {
                if let Err(err) = store.record_view(&post_id, Utc::now()) {
                    debug_log(format!("ui: persist view {} failed: {}", post_id, err));
                }
            }
            let svc = self.view_service.clone();
            thread::spawn(move || {
                if let Err(err) = svc.track_view(&post_id) {
                    debug_log(format!("ui: track view {} failed: {}", post_id, err));
                }
            });
        }
    }

    fn vote(&mut self, value: VoteValue) {
        let Some(post) = self.controller.posts_mut().get_mut(self.selected) else {
            return;
        };
        let post_id = post.id.clone();
        // Same vote again clears it, like tapping the highlighted button.
        let next = if post.user_vote == Some(value) {
            None
        } else {
            Some(value)
        };
        let snapshot = post.apply_vote(next);

        let svc = self.interaction_service.clone();
        let tx = self.tx.clone();
        thread::spawn(move || {
            let result = match next {
                Some(value) => svc.vote(&post_id, value),
                None => svc.remove_vote(&post_id),
            };
            if let Err(err) = result {
                let _ = tx.send(UiMsg::VoteFailed {
                    post_id,
                    snapshot,
                    error: err.to_string(),
                });
            }
        });
    }

    fn toggle_follow(&mut self) {
        let Some(post) = self.controller.posts().get(self.selected) else {
            return;
        };
        let username = post.author.username.clone();
        let follow = !post.author.is_followed;
        self.patch_follow(&username, follow);

        let svc = self.interaction_service.clone();
        let tx = self.tx.clone();
        thread::spawn(move || {
            let result = if follow {
                svc.follow(&username)
            } else {
                svc.unfollow(&username)
            };
            let _ = tx.send(UiMsg::FollowSettled {
                username,
                followed: follow,
                error: result.err().map(|e| e.to_string()),
            });
        });
    }

    fn patch_follow(&mut self, username: &str, followed: bool) {
        for post in self.controller.posts_mut() {
            if post.author.username == username {
                post.author.is_followed = followed;
            }
        }
    }

    fn open_comments(&mut self) {
        let Some(post) = self.controller.posts().get(self.selected) else {
            return;
        };
        let post_id = post.id.clone();
        let author = post.author.username.clone();
        self.comments = Some(CommentsPane {
            post_id: post_id.clone(),
            author,
            comments: Vec::new(),
            loading: true,
            error: None,
            scroll: 0,
        });
        self.enter_view(View::Comments);

        let svc = self.comment_service.clone();
        let tx = self.tx.clone();
        thread::spawn(move || {
            let result = svc.load_comments(&post_id);
            let _ = tx.send(UiMsg::CommentsLoaded { post_id, result });
        });
    }

    fn apply_comments_result(&mut self, post_id: String, result: Result<Page<Comment>, ApiError>) {
        let Some(pane) = self.comments.as_mut() else {
            return;
        };
        // A response for a previously opened clip is ignored.
        if pane.post_id != post_id {
            return;
        }
        pane.loading = false;
        match result {
            Ok(page) => pane.comments = page.results,
            Err(err) => pane.error = Some(err.to_string()),
        }
    }

    fn submit_reply(&mut self) {
        let Some(text) = self.input.take() else {
            return;
        };
        let body = text.trim().to_string();
        if body.is_empty() {
            return;
        }
        let Some(pane) = self.comments.as_ref() else {
            return;
        };
        let post_id = pane.post_id.clone();
        self.status = "Posting reply...".into();

        let svc = self.comment_service.clone();
        let tx = self.tx.clone();
        thread::spawn(move || {
            let result = svc.reply(&post_id, &body);
            let _ = tx.send(UiMsg::ReplyPosted { post_id, result });
        });
    }

    fn apply_reply_result(&mut self, post_id: String, result: Result<Comment, ApiError>) {
        match result {
            Ok(comment) => {
                if let Some(pane) = self.comments.as_mut() {
                    if pane.post_id == post_id {
                        pane.comments.push(comment);
                    }
                }
                if let Some(post) = self
                    .controller
                    .posts_mut()
                    .iter_mut()
                    .find(|p| p.id == post_id)
                {
                    post.comment_count += 1;
                }
                self.status = "Reply posted.".into();
            }
            Err(err) => self.status = format!("Reply failed: {}", err),
        }
    }

    fn open_leaderboard(&mut self) {
        let period = LeaderboardPeriod::Week;
        self.leaderboard = Some(LeaderboardPane {
            period,
            entries: Vec::new(),
            loading: true,
            error: None,
        });
        self.enter_view(View::Leaderboard);
        self.fetch_leaderboard(period);
    }

    fn cycle_period(&mut self) {
        let Some(pane) = self.leaderboard.as_mut() else {
            return;
        };
        pane.period = next_period(pane.period);
        pane.entries.clear();
        pane.loading = true;
        pane.error = None;
        let period = pane.period;
        self.fetch_leaderboard(period);
    }

    fn fetch_leaderboard(&mut self, period: LeaderboardPeriod) {
        let svc = self.leaderboard_service.clone();
        let tx = self.tx.clone();
        thread::spawn(move || {
            let result = svc.leaderboard(period);
            let _ = tx.send(UiMsg::LeaderboardLoaded { period, result });
        });
    }

    fn apply_leaderboard_result(
        &mut self,
        period: LeaderboardPeriod,
        result: Result<Vec<LeaderboardEntry>, ApiError>,
    ) {
        let Some(pane) = self.leaderboard.as_mut() else {
            return;
        };
        // A response for a period the user already cycled past is ignored.
        if pane.period != period {
            return;
        }
        pane.loading = false;
        match result {
            Ok(entries) => pane.entries = entries,
            Err(err) => pane.error = Some(err.to_string()),
        }
    }

    fn open_profile(&mut self) {
        let Some(post) = self.controller.posts().get(self.selected) else {
            return;
        };
        let username = post.author.username.clone();
        self.profile = Some(ProfilePane {
            username: username.clone(),
            profile: None,
            posts: Vec::new(),
            loading: true,
            error: None,
        });
        self.enter_view(View::Profile);

        let svc = self.profile_service.clone();
        let tx = self.tx.clone();
        let limit = self.page_size;
        thread::spawn(move || {
            let result = svc
                .profile(&username)
                .and_then(|profile| {
                    svc.posts(&username, None, limit)
                        .map(|page| (profile, page))
                });
            let _ = tx.send(UiMsg::ProfileLoaded { username, result });
        });
    }

    fn apply_profile_result(
        &mut self,
        username: String,
        result: Result<(Profile, Page<Post>), ApiError>,
    ) {
        let Some(pane) = self.profile.as_mut() else {
            return;
        };
        if pane.username != username {
            return;
        }
        pane.loading = false;
        match result {
            Ok((profile, page)) => {
                pane.profile = Some(profile);
                pane.posts = page.results;
            }
            Err(err) => pane.error = Some(err.to_string()),
        }
    }

    fn open_player(&mut self) {
        let Some(post) = self.controller.posts().get(self.selected) else {
            return;
        };
        match player::launch(&self.player_cfg, &post.video_url) {
            Ok(()) => self.status = format!("Playing {} externally.", post.id),
            Err(err) => self.status = format!("Player failed: {}", err),
        }
    }

    fn open_browser(&mut self) {
        let Some(post) = self.controller.posts().get(self.selected) else {
            return;
        };
        let url = format!("https://clipdeck.app/post/{}", post.id);
        if let Err(err) = player::open_in_browser(&url) {
            self.status = format!("Browser failed: {}", err);
        }
    }

    fn next_category(&mut self) {
        if self.categories.is_empty() {
            return;
        }
        self.category_index = (self.category_index + 1) % self.categories.len();
        let category = self.categories[self.category_index].clone();
        self.status = format!("Category: {}", category);
        let filter = if category == "all" { None } else { Some(category) };
        self.reset_feed(filter);
    }

    fn refresh(&mut self) {
        let filter = self.controller.category().map(String::from);
        self.status = "Refreshing feed.".into();
        self.reset_feed(filter);
    }

    fn reset_feed(&mut self, filter: Option<String>) {
        self.controller.set_filter(filter);
        self.selected = 0;
        for (id, _) in self.cards.drain() {
            self.playback.remove(&id);
            self.tracker.on_pause(&id);
        }
        self.last_active = None;
        self.trigger_load();
    }

    fn draw(&mut self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(CARD_HEIGHT),
                Constraint::Length(1),
            ])
            .split(frame.size());

        self.feed_area = chunks[1];
        self.draw_header(frame, chunks[0]);
        match self.view {
            View::Feed => self.draw_feed(frame, chunks[1]),
            View::Comments => self.draw_comments(frame, chunks[1]),
            View::Leaderboard => self.draw_leaderboard(frame, chunks[1]),
            View::Profile => self.draw_profile(frame, chunks[1]),
        }
        self.draw_footer(frame, chunks[2]);
    }

    fn draw_header(&self, frame: &mut Frame, area: Rect) {
        let category = self
            .categories
            .get(self.category_index)
            .map(String::as_str)
            .unwrap_or("all");
        let audio = if self.playback.audio_enabled() {
            "audio on"
        } else {
            "muted"
        };
        let mut spans = vec![
            Span::styled(
                " Clipdeck ",
                Style::default()
                    .fg(COLOR_ACCENT)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!("[{}] ", category),
                Style::default().fg(COLOR_TEXT_PRIMARY),
            ),
            Span::styled(format!("({}) ", audio), Style::default().fg(COLOR_TEXT_SECONDARY)),
        ];
        if self.unread > 0 {
            spans.push(Span::styled(
                format!("• {} unread", self.unread),
                Style::default().fg(COLOR_SUCCESS),
            ));
        }
        let header = Paragraph::new(Line::from(spans))
            .style(Style::default().bg(COLOR_BG));
        frame.render_widget(header, area);
    }

    fn draw_feed(&self, frame: &mut Frame, area: Rect) {
        let posts = self.controller.posts();
        if posts.is_empty() {
            let message = if self.controller.is_loading() {
                "Loading clips..."
            } else if self.controller.error().is_some() {
                "Feed unavailable. Press R to retry."
            } else {
                "No posts found."
            };
            let empty = Paragraph::new(message)
                .alignment(Alignment::Center)
                .style(Style::default().fg(COLOR_TEXT_SECONDARY).bg(COLOR_BG));
            frame.render_widget(empty, area);
            return;
        }

        let viewport = viewport_rows(area);
        let offset = scroll_offset(self.selected, posts.len(), viewport);

        for (index, post) in posts.iter().enumerate() {
            let Some((y, height, clip_top)) = card_slice(index, offset, viewport) else {
                continue;
            };
            let card_area = Rect::new(
                area.x,
                area.y + y,
                area.width,
                height.min(area.height.saturating_sub(y)),
            );
            if card_area.height == 0 {
                continue;
            }
            self.draw_card(frame, card_area, index, post, clip_top);
        }

        if self.controller.exhausted() && self.controller.error().is_none() {
            let bottom = posts.len() as i64 * CARD_HEIGHT as i64 - offset;
            if bottom >= 0 && (bottom as u16) < area.height {
                let note = Rect::new(area.x, area.y + bottom as u16, area.width, 1);
                let text = Paragraph::new("No more posts")
                    .alignment(Alignment::Center)
                    .style(Style::default().fg(COLOR_TEXT_SECONDARY));
                frame.render_widget(text, note);
            }
        }
    }

    fn draw_card(&self, frame: &mut Frame, area: Rect, index: usize, post: &Post, clip_top: u16) {
        let selected = index == self.selected;
        let handle = self.cards.get(&post.id);
        let playing = handle.map_or(false, |h| h.is_playing());
        let muted = handle.map_or(true, |h| h.is_muted());

        let border_style = if selected {
            Style::default().fg(COLOR_BORDER_FOCUSED)
        } else {
            Style::default().fg(COLOR_BORDER_IDLE)
        };

        let playback_marker = match (playing, muted) {
            (true, false) => "▶ playing",
            (true, true) => "▶ playing (muted)",
            (false, _) => "⏸ paused",
        };
        let vote_marker = match post.user_vote {
            Some(VoteValue::PlusOne) => " [+1]",
            Some(VoteValue::PlusTwo) => " [+2]",
            None => "",
        };
        let follow_marker = if post.author.is_followed {
            " following"
        } else {
            ""
        };

        let title = format!(
            " {} · {}{} ",
            truncate(&post.author.username, 24),
            playback_marker,
            follow_marker,
        );

        let mut lines: Vec<Line> = Vec::new();
        let inner_width = area.width.saturating_sub(2).max(10) as usize;
        for wrapped in wrap(&post.caption, inner_width).into_iter().take(2) {
            lines.push(Line::from(Span::styled(
                wrapped.to_string(),
                Style::default().fg(COLOR_TEXT_PRIMARY),
            )));
        }
        lines.push(Line::from(Span::styled(
            format!(
                "score {}  (+1 × {}, +2 × {}){}",
                post.total_score, post.plus_one_count, post.plus_two_count, vote_marker
            ),
            Style::default().fg(COLOR_TEXT_SECONDARY),
        )));
        lines.push(Line::from(Span::styled(
            format!(
                "{} views · {} comments · {}",
                post.view_count,
                post.comment_count,
                post.created_at.format("%Y-%m-%d %H:%M")
            ),
            Style::default().fg(COLOR_TEXT_SECONDARY),
        )));

        // A card scrolled partially off the top keeps its bottom rows on
        // screen; the inner text scrolls up by the clipped amount.
        let card = Paragraph::new(lines)
            .scroll((clip_top, 0))
            .block(
                Block::default()
                    .title(title)
                    .borders(Borders::ALL)
                    .border_style(border_style)
                    .style(Style::default().bg(COLOR_PANEL_BG)),
            );
        frame.render_widget(card, area);
    }

    fn draw_comments(&self, frame: &mut Frame, area: Rect) {
        let Some(pane) = self.comments.as_ref() else {
            return;
        };
        let title = format!(" Comments · {}'s clip ", pane.author);

        let mut lines: Vec<Line> = Vec::new();
        if pane.loading {
            lines.push(Line::from(Span::styled(
                "Loading comments...",
                Style::default().fg(COLOR_TEXT_SECONDARY),
            )));
        } else if let Some(error) = pane.error.as_ref() {
            lines.push(Line::from(Span::styled(
                format!("Could not load comments: {}", error),
                Style::default().fg(COLOR_ERROR),
            )));
        } else if pane.comments.is_empty() {
            lines.push(Line::from(Span::styled(
                "No comments yet. Press r to reply.",
                Style::default().fg(COLOR_TEXT_SECONDARY),
            )));
        }

        let inner_width = area.width.saturating_sub(2).max(10) as usize;
        for comment in pane.comments.iter().skip(pane.scroll) {
            lines.push(Line::from(Span::styled(
                format!(
                    "{} · {}",
                    comment.author.username,
                    comment.created_at.format("%Y-%m-%d %H:%M")
                ),
                Style::default()
                    .fg(COLOR_ACCENT)
                    .add_modifier(Modifier::BOLD),
            )));
            for wrapped in wrap(&comment.body, inner_width) {
                lines.push(Line::from(Span::styled(
                    wrapped.to_string(),
                    Style::default().fg(COLOR_TEXT_PRIMARY),
                )));
            }
            lines.push(Line::from(""));
        }

        let panel = Paragraph::new(lines).block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(Style::default().fg(COLOR_BORDER_FOCUSED))
                .style(Style::default().bg(COLOR_PANEL_BG)),
        );
        frame.render_widget(panel, area);
    }

    fn draw_leaderboard(&self, frame: &mut Frame, area: Rect) {
        let Some(pane) = self.leaderboard.as_ref() else {
            return;
        };
        let title = format!(" Leaderboard · {} ", pane.period.as_str());

        let mut lines: Vec<Line> = Vec::new();
        if pane.loading {
            lines.push(Line::from(Span::styled(
                "Loading leaderboard...",
                Style::default().fg(COLOR_TEXT_SECONDARY),
            )));
        } else if let Some(error) = pane.error.as_ref() {
            lines.push(Line::from(Span::styled(
                format!("Could not load leaderboard: {}", error),
                Style::default().fg(COLOR_ERROR),
            )));
        }
        for entry in &pane.entries {
            lines.push(Line::from(Span::styled(
                format!(
                    "{:>3}. {}  {} pts",
                    entry.rank,
                    truncate(&entry.username, 24),
                    entry.points
                ),
                Style::default().fg(COLOR_TEXT_PRIMARY),
            )));
        }

        let panel = Paragraph::new(lines).block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(Style::default().fg(COLOR_BORDER_FOCUSED))
                .style(Style::default().bg(COLOR_PANEL_BG)),
        );
        frame.render_widget(panel, area);
    }

    fn draw_profile(&self, frame: &mut Frame, area: Rect) {
        let Some(pane) = self.profile.as_ref() else {
            return;
        };
        let title = format!(" {} ", pane.username);

        let mut lines: Vec<Line> = Vec::new();
        if pane.loading {
            lines.push(Line::from(Span::styled(
                "Loading profile...",
                Style::default().fg(COLOR_TEXT_SECONDARY),
            )));
        } else if let Some(error) = pane.error.as_ref() {
            lines.push(Line::from(Span::styled(
                format!("Could not load profile: {}", error),
                Style::default().fg(COLOR_ERROR),
            )));
        }

        let inner_width = area.width.saturating_sub(2).max(10) as usize;
        if let Some(profile) = pane.profile.as_ref() {
            if !profile.bio.is_empty() {
                for wrapped in wrap(&profile.bio, inner_width) {
                    lines.push(Line::from(Span::styled(
                        wrapped.to_string(),
                        Style::default().fg(COLOR_TEXT_PRIMARY),
                    )));
                }
            }
            let follow = if profile.is_followed { " · following" } else { "" };
            lines.push(Line::from(Span::styled(
                format!(
                    "{} pts · {} clips{}",
                    profile.total_points, profile.post_count, follow
                ),
                Style::default().fg(COLOR_TEXT_SECONDARY),
            )));
            lines.push(Line::from(""));
        }

        if !pane.posts.is_empty() {
            lines.push(Line::from(Span::styled(
                "Recent clips:",
                Style::default()
                    .fg(COLOR_ACCENT)
                    .add_modifier(Modifier::BOLD),
            )));
            for post in &pane.posts {
                let caption = if post.caption.is_empty() {
                    post.id.as_str()
                } else {
                    post.caption.as_str()
                };
                lines.push(Line::from(Span::styled(
                    format!("  {}  (score {})", truncate(caption, inner_width.saturating_sub(14)), post.total_score),
                    Style::default().fg(COLOR_TEXT_PRIMARY),
                )));
            }
        }

        let panel = Paragraph::new(lines).block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(Style::default().fg(COLOR_BORDER_FOCUSED))
                .style(Style::default().bg(COLOR_PANEL_BG)),
        );
        frame.render_widget(panel, area);
    }

    fn draw_footer(&self, frame: &mut Frame, area: Rect) {
        if let Some(input) = self.input.as_ref() {
            let compose = Line::from(vec![
                Span::styled(" Reply: ", Style::default().fg(COLOR_ACCENT)),
                Span::styled(input.clone(), Style::default().fg(COLOR_TEXT_PRIMARY)),
                Span::styled(
                    "  (enter send, esc cancel)",
                    Style::default().fg(COLOR_TEXT_SECONDARY),
                ),
            ]);
            frame.render_widget(
                Paragraph::new(compose).style(Style::default().bg(COLOR_BG)),
                area,
            );
            return;
        }

        let status_style = if self.controller.error().is_some() {
            Style::default().fg(COLOR_ERROR)
        } else {
            Style::default().fg(COLOR_TEXT_SECONDARY)
        };
        let keys = match self.view {
            View::Feed => {
                " j/k scroll · enter comments · L board · u profile · m audio · 1/2 vote · f follow · o play · c category · q quit "
            }
            View::Comments => " j/k scroll · r reply · q back ",
            View::Leaderboard => " p period · q back ",
            View::Profile => " q back ",
        };
        let footer = Line::from(vec![
            Span::styled(keys, Style::default().fg(COLOR_TEXT_SECONDARY)),
            Span::styled(self.status.clone(), status_style),
        ]);
        frame.render_widget(
            Paragraph::new(footer).style(Style::default().bg(COLOR_BG)),
            area,
        );
    }
}

fn next_period(period: LeaderboardPeriod) -> LeaderboardPeriod {
    match period {
        LeaderboardPeriod::Week => LeaderboardPeriod::Month,
        LeaderboardPeriod::Month => LeaderboardPeriod::AllTime,
        LeaderboardPeriod::AllTime => LeaderboardPeriod::Week,
    }
}

fn viewport_rows(area: Rect) -> u16 {
    area.height.max(CARD_HEIGHT)
}

/// Scroll offset (in rows) keeping the selected card fully inside the
/// viewport, clamped to the feed's total height.
fn scroll_offset(selected: usize, len: usize, viewport: u16) -> i64 {
    let total = len as i64 * CARD_HEIGHT as i64;
    let viewport = viewport as i64;
    let card_top = selected as i64 * CARD_HEIGHT as i64;
    let card_bottom = card_top + CARD_HEIGHT as i64;

    let max_offset = (total - viewport).max(0);
    let mut offset = card_bottom - viewport;
    if offset < 0 {
        offset = 0;
    }
    if card_top < offset {
        offset = card_top;
    }
    offset.min(max_offset)
}

/// Vertical center of a card relative to the viewport top, or `None` when
/// less than half the card is inside it (the visibility threshold).
fn card_center(index: usize, offset: i64, viewport: u16) -> Option<f32> {
    let top = index as i64 * CARD_HEIGHT as i64 - offset;
    let bottom = top + CARD_HEIGHT as i64;
    let visible_top = top.max(0);
    let visible_bottom = bottom.min(viewport as i64);
    let visible_rows = visible_bottom - visible_top;
    if visible_rows * 2 < CARD_HEIGHT as i64 {
        return None;
    }
    Some((top + bottom) as f32 / 2.0)
}

/// Screen slice of a card that has any rows inside the viewport: its y
/// offset within the feed area, its on-screen height, and how many rows
/// were clipped off its top. Every card the selector counts as visible
/// (half-card threshold) has a slice, so a playing card is always drawn.
fn card_slice(index: usize, offset: i64, viewport: u16) -> Option<(u16, u16, u16)> {
    let top = index as i64 * CARD_HEIGHT as i64 - offset;
    let bottom = top + CARD_HEIGHT as i64;
    let visible_top = top.max(0);
    let visible_bottom = bottom.min(viewport as i64);
    if visible_bottom <= visible_top {
        return None;
    }
    Some((
        visible_top as u16,
        (visible_bottom - visible_top) as u16,
        (visible_top - top) as u16,
    ))
}

fn truncate(text: &str, max_width: usize) -> String {
    if text.width() <= max_width {
        return text.to_string();
    }
    let mut out = String::new();
    for ch in text.chars() {
        if out.width() + 1 >= max_width {
            break;
        }
        out.push(ch);
    }
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Author, ClipStatus};
    use crate::data::{
        MockCommentService, MockFeedService, MockInteractionService, MockLeaderboardService,
        MockProfileService, MockViewService,
    };

    fn test_model() -> Model {
        Model::new(Options {
            status_message: String::new(),
            categories: vec!["all".into()],
            default_category: "all".into(),
            feed_service: Arc::new(MockFeedService),
            interaction_service: Arc::new(MockInteractionService),
            view_service: Arc::new(MockViewService),
            comment_service: Arc::new(MockCommentService),
            leaderboard_service: Arc::new(MockLeaderboardService),
            profile_service: Arc::new(MockProfileService),
            notification_service: None,
            store: None,
            media: None,
            playback: Arc::new(playback::Context::new()),
            feed_options: feed::Options::default(),
            views: config::ViewsConfig::default(),
            player: config::PlayerConfig::default(),
            poll_interval: Duration::from_secs(60),
        })
    }

    fn sample_post(id: &str) -> Post {
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

    fn sample_comment(id: &str, post_id: &str) -> Comment {
        Comment {
            id: id.into(),
            post: post_id.into(),
            author: Author {
                username: "viewer".into(),
                avatar: None,
                total_points: 0,
                is_followed: false,
            },
            body: "Great sync.".into(),
            reply_count: 0,
            created_at: chrono::Utc::now(),
        }
    }

    fn seed_feed(model: &mut Model, ids: &[&str]) {
        let ticket = model.controller.begin_load(Instant::now()).unwrap();
        let page = Page {
            results: ids.iter().map(|id| sample_post(id)).collect(),
            next: None,
        };
        model.controller.apply(ticket, Ok(page));
        model.sync_cards();
    }

    #[test]
    fn scroll_offset_keeps_selection_visible() {
        // 10 cards of 7 rows in a 21-row viewport: three fit at a time.
        assert_eq!(scroll_offset(0, 10, 21), 0);
        assert_eq!(scroll_offset(2, 10, 21), 0);
        assert_eq!(scroll_offset(3, 10, 21), 7);
        assert_eq!(scroll_offset(9, 10, 21), 49);
    }

    #[test]
    fn scroll_offset_clamps_for_short_feeds() {
        assert_eq!(scroll_offset(0, 1, 21), 0);
        assert_eq!(scroll_offset(0, 2, 21), 0);
    }

    #[test]
    fn card_center_requires_half_visible() {
        // Fully visible first card in a 21-row viewport.
        assert_eq!(card_center(0, 0, 21), Some(3.5));
        // Scrolled so card 0 has 3 of 7 rows left: below threshold.
        assert_eq!(card_center(0, 4, 21), None);
        // 4 of 7 rows still inside: counts as visible.
        assert!(card_center(0, 3, 21).is_some());
        // A card entirely below the fold is not visible.
        assert_eq!(card_center(5, 0, 21), None);
    }

    #[test]
    fn centers_order_matches_screen_position() {
        let a = card_center(0, 0, 21).unwrap();
        let b = card_center(1, 0, 21).unwrap();
        assert!(a < b);
    }

    #[test]
    fn every_selectable_card_is_drawn() {
        // Any card the selector counts as visible must have a draw slice,
        // including cards partially scrolled off the top.
        for offset in 0..70 {
            for index in 0..10 {
                if card_center(index, offset, 21).is_some() {
                    assert!(
                        card_slice(index, offset, 21).is_some(),
                        "card {} at offset {} selectable but not drawn",
                        index,
                        offset
                    );
                }
            }
        }
    }

    #[test]
    fn clipped_card_slice_scrolls_its_text() {
        // Card 0 with 4 of 7 rows above the fold: drawn at the top, 3 rows
        // tall, inner text shifted by the clipped amount.
        assert_eq!(card_slice(0, 4, 21), Some((0, 3, 4)));
        // Fully visible card is untouched.
        assert_eq!(card_slice(1, 0, 21), Some((7, 7, 0)));
        // Fully scrolled-out card has no slice.
        assert_eq!(card_slice(0, 7, 21), None);
    }

    #[test]
    fn truncate_respects_width() {
        assert_eq!(truncate("short", 10), "short");
        let long = truncate("a-rather-long-username", 10);
        assert!(long.width() <= 10);
        assert!(long.ends_with('…'));
    }

    #[test]
    fn period_cycles_through_all_variants() {
        let start = LeaderboardPeriod::Week;
        let mut period = start;
        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(period);
            period = next_period(period);
        }
        assert_eq!(period, start);
        assert_eq!(seen.len(), 3);
        assert!(seen.contains(&LeaderboardPeriod::Month));
        assert!(seen.contains(&LeaderboardPeriod::AllTime));
    }

    #[test]
    fn comments_result_fills_matching_pane() {
        let mut model = test_model();
        model.comments = Some(CommentsPane {
            post_id: "p1".into(),
            author: "editor".into(),
            comments: Vec::new(),
            loading: true,
            error: None,
            scroll: 0,
        });

        model.apply_comments_result(
            "p1".into(),
            Ok(Page {
                results: vec![sample_comment("c1", "p1")],
                next: None,
            }),
        );

        let pane = model.comments.as_ref().unwrap();
        assert!(!pane.loading);
        assert_eq!(pane.comments.len(), 1);
    }

    #[test]
    fn comments_result_for_other_clip_is_ignored() {
        let mut model = test_model();
        model.comments = Some(CommentsPane {
            post_id: "p2".into(),
            author: "editor".into(),
            comments: Vec::new(),
            loading: true,
            error: None,
            scroll: 0,
        });

        model.apply_comments_result(
            "p1".into(),
            Ok(Page {
                results: vec![sample_comment("c1", "p1")],
                next: None,
            }),
        );

        let pane = model.comments.as_ref().unwrap();
        assert!(pane.loading);
        assert!(pane.comments.is_empty());
    }

    #[test]
    fn posted_reply_lands_in_pane_and_bumps_count() {
        let mut model = test_model();
        seed_feed(&mut model, &["p1"]);
        model.comments = Some(CommentsPane {
            post_id: "p1".into(),
            author: "editor".into(),
            comments: Vec::new(),
            loading: false,
            error: None,
            scroll: 0,
        });

        model.apply_reply_result("p1".into(), Ok(sample_comment("c9", "p1")));

        assert_eq!(model.comments.as_ref().unwrap().comments.len(), 1);
        assert_eq!(model.controller.posts()[0].comment_count, 1);
        assert_eq!(model.status, "Reply posted.");
    }

    #[test]
    fn failed_reply_surfaces_in_status_only() {
        let mut model = test_model();
        model.comments = Some(CommentsPane {
            post_id: "p1".into(),
            author: "editor".into(),
            comments: Vec::new(),
            loading: false,
            error: None,
            scroll: 0,
        });

        model.apply_reply_result("p1".into(), Err(ApiError::RateLimited));

        assert!(model.comments.as_ref().unwrap().comments.is_empty());
        assert!(model.status.starts_with("Reply failed"));
    }

    #[test]
    fn leaderboard_result_for_stale_period_is_ignored() {
        let mut model = test_model();
        model.leaderboard = Some(LeaderboardPane {
            period: LeaderboardPeriod::Month,
            entries: Vec::new(),
            loading: true,
            error: None,
        });

        // A late response for the period the user cycled away from.
        model.apply_leaderboard_result(LeaderboardPeriod::Week, Ok(vec![]));
        assert!(model.leaderboard.as_ref().unwrap().loading);

        model.apply_leaderboard_result(
            LeaderboardPeriod::Month,
            Ok(vec![LeaderboardEntry {
                rank: 1,
                username: "editor".into(),
                avatar: None,
                points: 90,
            }]),
        );
        let pane = model.leaderboard.as_ref().unwrap();
        assert!(!pane.loading);
        assert_eq!(pane.entries.len(), 1);
    }

    #[test]
    fn profile_result_fills_pane() {
        let mut model = test_model();
        model.profile = Some(ProfilePane {
            username: "editor".into(),
            profile: None,
            posts: Vec::new(),
            loading: true,
            error: None,
        });

        model.apply_profile_result(
            "editor".into(),
            Ok((
                Profile {
                    username: "editor".into(),
                    bio: "AMV editor.".into(),
                    avatar: None,
                    total_points: 42,
                    post_count: 3,
                    is_followed: false,
                },
                Page {
                    results: vec![sample_post("p1")],
                    next: None,
                },
            )),
        );

        let pane = model.profile.as_ref().unwrap();
        assert!(!pane.loading);
        assert_eq!(pane.profile.as_ref().unwrap().total_points, 42);
        assert_eq!(pane.posts.len(), 1);
    }

    #[test]
    fn leaving_feed_parks_the_active_clip() {
        let mut model = test_model();
        seed_feed(&mut model, &["p1"]);

        model.playback.observe("p1", Some(3.5));
        model.playback.select(10.0);
        let handle = model.cards.get("p1").unwrap().clone();
        assert!(handle.is_playing());

        model.enter_view(View::Comments);
        assert!(!handle.is_playing());
        assert!(model.playback.active().is_none());
        assert!(model.last_active.is_none());
    }

    #[test]
    fn compose_mode_edits_and_cancels() {
        let mut model = test_model();
        model.view = View::Comments;
        model.input = Some(String::new());

        model.handle_compose_key(KeyCode::Char('h'));
        model.handle_compose_key(KeyCode::Char('i'));
        model.handle_compose_key(KeyCode::Backspace);
        assert_eq!(model.input.as_deref(), Some("h"));

        model.handle_compose_key(KeyCode::Esc);
        assert!(model.input.is_none());
    }
}
