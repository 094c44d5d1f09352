// stats.rs - Aggregates cell events into cumulative and per-second counters

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded, select, tick};
use tracing::debug;

use crate::display::{Display, StatsWindow};
use crate::event::{CellEvent, EventKind, EventSink};

/// Rows reserved for the stats window at the bottom of the display.
pub const STATS_HEIGHT: usize = 3;

const WINDOW: Duration = Duration::from_secs(1);
const RENDER_EVERY: Duration = Duration::from_millis(250);
// Events folded per lock acquisition.
const DRAIN_BATCH: usize = 1024;

/// Counter state. `apply` and `roll_window` are the whole aggregation logic;
/// the background thread only decides when to call them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsCounters {
    pub heartbeats: i64,
    pub heartbeats_per_second: i64,
    pub broadcasts: i64,
    pub broadcasts_per_second: i64,
    pub died: i64,
    pub died_per_second: i64,
    window_heartbeats: i64,
    window_broadcasts: i64,
    window_died: i64,
}

impl StatsCounters {
    pub fn apply(&mut self, event: CellEvent) {
        let n = event.count;
        match event.kind {
            EventKind::Heartbeat => {
                self.heartbeats += n;
                self.window_heartbeats += n;
            }
            EventKind::Broadcast => {
                self.broadcasts += n;
                self.window_broadcasts += n;
            }
            EventKind::Died => {
                self.died += n;
                self.window_died += n;
            }
            // A resurrection cancels out a death.
            EventKind::Resurrected => {
                self.died -= n;
                self.window_died -= n;
            }
        }
    }

    /// Closes the current one-second window.
    pub fn roll_window(&mut self) {
        self.heartbeats_per_second = std::mem::take(&mut self.window_heartbeats);
        self.broadcasts_per_second = std::mem::take(&mut self.window_broadcasts);
        self.died_per_second = std::mem::take(&mut self.window_died);
    }
}

impl fmt::Display for StatsCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Died: {} d/s: {} Broadcasts: {} b/s {} Heartbeats: {} h/s {}",
            self.died,
            self.died_per_second,
            self.broadcasts,
            self.broadcasts_per_second,
            self.heartbeats,
            self.heartbeats_per_second,
        )
    }
}

/// Collects events from every cell on a dedicated thread.
///
/// `record_event` blocks once the queue is full; that is the intended
/// back-pressure on cells, events are never dropped while running.
pub struct StatsAggregator {
    events: Sender<CellEvent>,
    counters: Arc<Mutex<StatsCounters>>,
    stop: Mutex<Option<Sender<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl StatsAggregator {
    pub fn new(display: &dyn Display, capacity: usize) -> Self {
        let (rows, cols) = display.dimensions();
        let window = display.create_stats_window(STATS_HEIGHT, cols, rows.saturating_sub(STATS_HEIGHT), 0);

        let (events, events_rx) = bounded(capacity.max(1));
        let (stop, stop_rx) = bounded(0);
        let counters = Arc::new(Mutex::new(StatsCounters::default()));

        let shared = Arc::clone(&counters);
        let worker = thread::spawn(move || collect(events_rx, stop_rx, shared, window));

        Self {
            events,
            counters,
            stop: Mutex::new(Some(stop)),
            worker: Mutex::new(Some(worker)),
        }
    }

    fn counters(&self) -> MutexGuard<'_, StatsCounters> {
        lock(&self.counters)
    }

    pub fn record_event(&self, event: CellEvent) {
        debug!(event = %event.kind, count = event.count, "add event");
        // Only fails after shutdown, when nobody is listening anymore.
        let _ = self.events.send(event);
    }

    pub fn snapshot(&self) -> StatsCounters {
        *self.counters()
    }

    pub fn summary(&self) -> String {
        self.counters().to_string()
    }

    /// Stops the background thread. Later events are discarded.
    pub fn shutdown(&self) {
        drop(lock(&self.stop).take());
        if let Some(worker) = lock(&self.worker).take() {
            let _ = worker.join();
        }
    }
}

impl EventSink for StatsAggregator {
    fn record_event(&self, event: CellEvent) {
        StatsAggregator::record_event(self, event);
    }
}

impl Drop for StatsAggregator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn collect(
    events: Receiver<CellEvent>,
    stop: Receiver<()>,
    counters: Arc<Mutex<StatsCounters>>,
    mut window: Box<dyn StatsWindow>,
) {
    let window_ticker = tick(WINDOW);
    let render_ticker = tick(RENDER_EVERY);

    loop {
        select! {
            recv(events) -> event => match event {
                Ok(event) => {
                    let mut c = lock(&counters);
                    c.apply(event);
                    for event in events.try_iter().take(DRAIN_BATCH) {
                        c.apply(event);
                    }
                }
                Err(_) => break,
            },
            recv(window_ticker) -> _ => lock(&counters).roll_window(),
            recv(render_ticker) -> _ => {
                let summary = lock(&counters).to_string();
                render(window.as_mut(), &summary);
            }
            recv(stop) -> _ => break,
        }
    }
}

fn render(window: &mut dyn StatsWindow, summary: &str) {
    window.move_print(0, 0, &" ".repeat(summary.len() + 20));
    window.move_print(1, 0, summary);
    window.nout_refresh();
    debug!(data = summary, "stats update");
}
