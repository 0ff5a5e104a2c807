use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::log::debug_log;

/// Capability surface of one mounted clip. The UI owns the real handle;
/// the selection algorithm only ever plays, pauses, and mutes through it.
pub trait Playable: Send + Sync {
    /// May be refused (autoplay policy, decoder not ready). A refusal is
    /// not an error to the selector; the clip simply does not play.
    fn play(&self) -> Result<(), PlayRejected>;
    fn pause(&self);
    fn set_muted(&self, muted: bool);
}

#[derive(Debug, thiserror::Error)]
#[error("playback rejected: {reason}")]
pub struct PlayRejected {
    pub reason: String,
}

struct Entry {
    handle: Arc<dyn Playable>,
}

#[derive(Default)]
struct Inner {
    handles: HashMap<String, Entry>,
    /// Insertion-ordered set of clips currently past the visibility
    /// threshold, with their vertical-center offset. Order is first-observed
    /// and decides ties; re-entering pushes to the back.
    visible: Vec<(String, f32)>,
    active: Option<String>,
    audio_enabled: bool,
    last_center: Option<f32>,
}

/// Coordinates playback across every mounted clip card: exactly one clip
/// plays at a time (the visible one nearest the viewport's vertical
/// center), and audio is a single shared flag, never per-card.
///
/// One context is created per feed session and dropped with it; nothing
/// here is process-global.
pub struct Context {
    inner: Mutex<Inner>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Mounts a clip. New clips start muted and paused regardless of the
    /// shared audio flag; only selection makes a clip audible.
    pub fn register(&self, id: impl Into<String>, handle: Arc<dyn Playable>) {
        let id = id.into();
        handle.set_muted(true);
        self.inner.lock().handles.insert(id, Entry { handle });
    }

    /// Unmounts a clip: removes it from the visible set and registry. If it
    /// was the active clip, selection re-runs over what remains.
    pub fn remove(&self, id: &str) {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.handles.remove(id) {
            entry.handle.pause();
        }
        inner.visible.retain(|(vid, _)| vid != id);
        if inner.active.as_deref() == Some(id) {
            inner.active = None;
            Self::select_locked(&mut inner);
        }
    }

    /// Visibility callback: `Some(center)` on enter or position update,
    /// `None` on exit. Exiting the threshold while playing pauses the clip
    /// immediately so rapid scrolling never leaves two clips running.
    pub fn observe(&self, id: &str, center: Option<f32>) {
        let mut inner = self.inner.lock();
        match center {
            Some(center) => {
                if let Some(idx) = inner.visible.iter().position(|(vid, _)| vid == id) {
                    inner.visible[idx].1 = center;
                } else {
                    inner.visible.push((id.to_string(), center));
                }
            }
            None => {
                inner.visible.retain(|(vid, _)| vid != id);
                if inner.active.as_deref() == Some(id) {
                    if let Some(entry) = inner.handles.get(id) {
                        entry.handle.pause();
                        entry.handle.set_muted(true);
                    }
                    inner.active = None;
                }
            }
        }
    }

    /// Runs selection against the given viewport center: the visible clip
    /// with minimum distance wins (first observed on a tie), every other
    /// clip is paused before the winner starts.
    pub fn select(&self, viewport_center: f32) {
        let mut inner = self.inner.lock();
        inner.last_center = Some(viewport_center);
        Self::select_locked(&mut inner);
    }

    fn select_locked(inner: &mut Inner) {
        let Some(center) = inner.last_center else {
            return;
        };

        let mut best: Option<(&str, f32)> = None;
        for (id, clip_center) in &inner.visible {
            if !inner.handles.contains_key(id.as_str()) {
                continue;
            }
            let distance = (clip_center - center).abs();
            // Strict comparison keeps the first-observed clip on ties.
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((id.as_str(), distance));
            }
        }

        let Some((winner, _)) = best else {
            // Nothing visible: park the previously active clip.
            if let Some(active) = inner.active.take() {
                if let Some(entry) = inner.handles.get(&active) {
                    entry.handle.pause();
                    entry.handle.set_muted(true);
                }
            }
            return;
        };
        let winner = winner.to_string();

        if inner.active.as_deref() == Some(winner.as_str()) {
            // Already active; just keep the mute state in sync.
            if let Some(entry) = inner.handles.get(&winner) {
                entry.handle.set_muted(!inner.audio_enabled);
            }
            return;
        }

        // Pause step runs before the play step.
        for (id, entry) in &inner.handles {
            if id != &winner {
                entry.handle.pause();
                entry.handle.set_muted(true);
            }
        }

        if let Some(entry) = inner.handles.get(&winner) {
            entry.handle.set_muted(!inner.audio_enabled);
            if let Err(rejected) = entry.handle.play() {
                debug_log(format!("playback: {} refused to start: {}", winner, rejected));
            }
        }
        inner.active = Some(winner);
    }

    pub fn active(&self) -> Option<String> {
        self.inner.lock().active.clone()
    }

    pub fn audio_enabled(&self) -> bool {
        self.inner.lock().audio_enabled
    }

    /// Flips the shared audio flag and broadcasts the result to every
    /// mounted clip at once. Only the active clip is ever audible; enabling
    /// audio is never undone automatically.
    pub fn toggle_audio(&self) -> bool {
        let mut inner = self.inner.lock();
        inner.audio_enabled = !inner.audio_enabled;
        let enabled = inner.audio_enabled;
        for (id, entry) in &inner.handles {
            let is_active = inner.active.as_deref() == Some(id.as_str());
            entry.handle.set_muted(!(enabled && is_active));
        }
        enabled
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;

    #[derive(Default)]
    struct ClipState {
        playing: bool,
        muted: bool,
        play_calls: usize,
    }

    struct FakeClip {
        state: PlMutex<ClipState>,
        reject: bool,
    }

    impl FakeClip {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                state: PlMutex::new(ClipState {
                    muted: true,
                    ..Default::default()
                }),
                reject: false,
            })
        }

        fn rejecting() -> Arc<Self> {
            Arc::new(Self {
                state: PlMutex::new(ClipState {
                    muted: true,
                    ..Default::default()
                }),
                reject: true,
            })
        }

        fn playing(&self) -> bool {
            self.state.lock().playing
        }

        fn muted(&self) -> bool {
            self.state.lock().muted
        }
    }

    impl Playable for FakeClip {
        fn play(&self) -> Result<(), PlayRejected> {
            if self.reject {
                return Err(PlayRejected {
                    reason: "autoplay blocked".into(),
                });
            }
            let mut state = self.state.lock();
            state.playing = true;
            state.play_calls += 1;
            Ok(())
        }

        fn pause(&self) {
            self.state.lock().playing = false;
        }

        fn set_muted(&self, muted: bool) {
            self.state.lock().muted = muted;
        }
    }

    fn mounted(ctx: &Context, id: &str) -> Arc<FakeClip> {
        let clip = FakeClip::new();
        ctx.register(id, clip.clone());
        clip
    }

    #[test]
    fn nearest_to_center_wins() {
        let ctx = Context::new();
        let a = mounted(&ctx, "a");
        let b = mounted(&ctx, "b");
        let c = mounted(&ctx, "c");

        ctx.observe("a", Some(10.0));
        ctx.observe("b", Some(48.0));
        ctx.observe("c", Some(90.0));
        ctx.select(50.0);

        assert!(!a.playing());
        assert!(b.playing());
        assert!(!c.playing());
        assert_eq!(ctx.active().as_deref(), Some("b"));
    }

    #[test]
    fn tie_breaks_to_first_observed() {
        let ctx = Context::new();
        let a = mounted(&ctx, "a");
        let b = mounted(&ctx, "b");

        ctx.observe("b", Some(60.0));
        ctx.observe("a", Some(40.0));
        ctx.select(50.0);

        // Both are 10 away; "b" entered the visible set first.
        assert!(b.playing());
        assert!(!a.playing());
    }

    #[test]
    fn at_most_one_clip_plays_during_rapid_scroll() {
        let ctx = Context::new();
        let clips: Vec<_> = (0..5)
            .map(|i| mounted(&ctx, &format!("c{}", i)))
            .collect();

        for step in 0..20 {
            let offset = step as f32 * 13.0;
            for (i, _) in clips.iter().enumerate() {
                let center = i as f32 * 50.0 - offset;
                let visible = (0.0..=100.0).contains(&center);
                ctx.observe(&format!("c{}", i), visible.then_some(center));
            }
            ctx.select(50.0);
            let playing = clips.iter().filter(|c| c.playing()).count();
            assert!(playing <= 1, "step {}: {} clips playing", step, playing);
        }
    }

    #[test]
    fn exiting_clip_is_paused_and_excluded() {
        let ctx = Context::new();
        let a = mounted(&ctx, "a");
        let b = mounted(&ctx, "b");

        ctx.observe("a", Some(50.0));
        ctx.observe("b", Some(80.0));
        ctx.select(50.0);
        assert!(a.playing());

        ctx.observe("a", None);
        assert!(!a.playing());
        ctx.select(50.0);
        assert!(b.playing());
        assert_eq!(ctx.active().as_deref(), Some("b"));
    }

    #[test]
    fn empty_visible_set_parks_playback() {
        let ctx = Context::new();
        let a = mounted(&ctx, "a");
        ctx.observe("a", Some(50.0));
        ctx.select(50.0);
        assert!(a.playing());

        ctx.observe("a", None);
        ctx.select(50.0);
        assert!(!a.playing());
        assert!(ctx.active().is_none());
    }

    #[test]
    fn audio_toggle_broadcasts_to_all_clips() {
        let ctx = Context::new();
        let a = mounted(&ctx, "a");
        let b = mounted(&ctx, "b");

        ctx.observe("a", Some(50.0));
        ctx.observe("b", Some(90.0));
        ctx.select(50.0);

        // Everything starts muted, active or not.
        assert!(a.muted());
        assert!(b.muted());

        assert!(ctx.toggle_audio());
        assert!(!a.muted());
        assert!(b.muted());

        // A newly selected clip inherits the enabled flag.
        ctx.observe("a", None);
        ctx.select(50.0);
        assert!(b.playing());
        assert!(!b.muted());
    }

    #[test]
    fn only_active_clip_is_ever_audible() {
        let ctx = Context::new();
        let a = mounted(&ctx, "a");
        let b = mounted(&ctx, "b");
        ctx.observe("a", Some(50.0));
        ctx.observe("b", Some(90.0));
        ctx.select(50.0);
        ctx.toggle_audio();

        // Move the center so "b" takes over; "a" must drop to muted.
        ctx.observe("a", Some(10.0));
        ctx.select(85.0);
        assert!(a.muted());
        assert!(!b.muted());
        assert!(!a.playing());
        assert!(b.playing());
    }

    #[test]
    fn removing_active_clip_reselects() {
        let ctx = Context::new();
        let a = mounted(&ctx, "a");
        let b = mounted(&ctx, "b");
        ctx.observe("a", Some(50.0));
        ctx.observe("b", Some(70.0));
        ctx.select(50.0);
        assert!(a.playing());

        ctx.remove("a");
        assert!(!a.playing());
        assert!(b.playing());
        assert_eq!(ctx.active().as_deref(), Some("b"));
    }

    #[test]
    fn play_rejection_is_swallowed() {
        let ctx = Context::new();
        let a = FakeClip::rejecting();
        ctx.register("a", a.clone());
        let b = mounted(&ctx, "b");

        ctx.observe("a", Some(50.0));
        ctx.observe("b", Some(90.0));
        ctx.select(50.0);
        assert!(!a.playing());

        // Selection keeps working for other clips afterwards.
        ctx.observe("a", None);
        ctx.select(50.0);
        assert!(b.playing());
    }
}
