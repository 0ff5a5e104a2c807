use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::data::NotificationService;
use crate::log::debug_log;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Interval gate for unread-count polling: one fetch at a time, no fetch
/// while paused (UI hidden), next fetch only after the interval elapses.
/// Fetch failures are swallowed; the badge just goes stale.
pub struct Poller {
    interval: Duration,
    last_fetch: Option<Instant>,
    in_flight: bool,
    paused: bool,
}

impl Poller {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_fetch: None,
            in_flight: false,
            paused: false,
        }
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Resuming clears the interval clock so the count refreshes right away.
    pub fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            self.last_fetch = None;
        }
    }

    pub fn should_fetch(&self, now: Instant) -> bool {
        if self.paused || self.in_flight {
            return false;
        }
        match self.last_fetch {
            Some(last) => now.duration_since(last) >= self.interval,
            None => true,
        }
    }

    pub fn begin(&mut self, now: Instant) {
        self.in_flight = true;
        self.last_fetch = Some(now);
    }

    pub fn complete(&mut self) {
        self.in_flight = false;
    }
}

impl Default for Poller {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

pub enum Event {
    UnreadCount(i64),
}

pub struct Handle {
    pub events: Receiver<Event>,
    stop: Sender<()>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Handle {
    pub fn stop(mut self) {
        let _ = self.stop.send(());
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

/// Polls the unread notification count on a worker thread, delivering
/// counts over a channel for the UI loop to drain.
pub fn spawn(svc: Arc<dyn NotificationService>, interval: Duration) -> Handle {
    let (event_tx, event_rx) = unbounded();
    let (stop_tx, stop_rx) = unbounded::<()>();
    let poller = Arc::new(Mutex::new(Poller::new(interval)));

    let thread = thread::spawn(move || loop {
        // Wake frequently so stop requests are honored promptly.
        match stop_rx.recv_timeout(Duration::from_millis(500)) {
            Ok(()) => break,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
        }

        let now = Instant::now();
        {
            let mut poller = poller.lock();
            if !poller.should_fetch(now) {
                continue;
            }
            poller.begin(now);
        }

        match svc.unread_count() {
            Ok(count) => {
                let _ = event_tx.send(Event::UnreadCount(count));
            }
            Err(err) => {
                debug_log(format!("notify: unread count fetch failed: {}", err));
            }
        }
        poller.lock().complete();
    });

    Handle {
        events: event_rx,
        stop: stop_tx,
        thread: Some(thread),
    }
}
