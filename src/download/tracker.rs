use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::{interval, Duration};

/// Panel title shown while nothing is downloading.
pub const DEFAULT_TITLE: &str = "─ Playlist ──┤ 0 downloads ├";

const SPINNER: &[char] = &['|', '/', '-', '\\'];
const TICK: Duration = Duration::from_millis(100);

/// Shared progress state for the download pipeline.
///
/// Each download calls [`begin`](DownloadTracker::begin) once and
/// [`finish`](DownloadTracker::finish) exactly once, on success and on
/// failure alike. The 0 -> 1 transition spawns a single ticker task
/// that re-renders the spinner title every 100 ms and exits when the
/// in-flight count returns to zero; concurrent downloads share that one
/// task and only contribute to the displayed count.
#[derive(Clone)]
pub struct DownloadTracker {
    inner: Arc<Inner>,
}

struct Inner {
    in_flight: AtomicUsize,
    title_tx: watch::Sender<String>,
    done_tx: mpsc::UnboundedSender<()>,
    // Held by the ticker task for its whole lifetime; only one ticker
    // exists at a time, so the lock is never contended.
    done_rx: Mutex<mpsc::UnboundedReceiver<()>>,
}

impl DownloadTracker {
    pub fn new() -> Self {
        let (title_tx, _) = watch::channel(DEFAULT_TITLE.to_string());
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        DownloadTracker {
            inner: Arc::new(Inner {
                in_flight: AtomicUsize::new(0),
                title_tx,
                done_tx,
                done_rx: Mutex::new(done_rx),
            }),
        }
    }

    /// Live title feed for whatever renders the panel.
    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.inner.title_tx.subscribe()
    }

    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Registers one new download. Must be paired with one `finish`.
    pub fn begin(&self) {
        let prev = self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
        if prev == 0 {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(animate(inner));
        }
    }

    /// Signals one completed download. The ticker decrements the count
    /// once per signal, so a failed download never leaves a stuck
    /// "downloading" title.
    pub fn finish(&self) {
        let _ = self.inner.done_tx.send(());
    }
}

impl Default for DownloadTracker {
    fn default() -> Self {
        Self::new()
    }
}

async fn animate(inner: Arc<Inner>) {
    let mut done_rx = inner.done_rx.lock().await;
    let mut ticker = interval(TICK);
    let mut frame = 0usize;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let count = inner.in_flight.load(Ordering::SeqCst);
                let glyph = SPINNER[frame % SPINNER.len()];
                frame = frame.wrapping_add(1);
                let _ = inner.title_tx.send(format!(
                    "─ Playlist ──┤ {count} downloads {glyph} ├"
                ));
            }
            Some(()) = done_rx.recv() => {
                if inner.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
                    let _ = inner.title_tx.send(DEFAULT_TITLE.to_string());
                    break;
                }
            }
        }
    }
}
