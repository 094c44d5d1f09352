// cell.rs - A Game of Life cell running as two independent async loops
//
// The broadcaster loop pushes "I'm alive" onto the cell's outbound channel.
// The sampler loop drains every neighbour's channel once per tick, builds a
// fresh neighbour mask and applies Conway's rule. Deaths are pushed to the
// neighbours immediately, births are only seen on the next broadcast.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, trace};

use crate::config::Rates;
use crate::event::{CellEvent, EventKind, EventSink};
use crate::rule::{self, Transition};

/// Called with the new alive bit after every state change.
pub type RenderHook = Box<dyn Fn(bool) + Send + Sync>;

/// Minimal life-state capability.
pub trait Life {
    fn state(&self) -> bool;
    fn set_state(&self, alive: bool);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Location {
    pub row: usize,
    pub col: usize,
}

impl Location {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.row, self.col)
    }
}

struct CellState {
    alive: bool,
    neighbor_mask: u8,
    inbound: Vec<broadcast::Receiver<bool>>,
    render: Option<RenderHook>,
    events: Option<Arc<dyn EventSink>>,
}

impl CellState {
    fn outbox(&self) -> Outbox {
        Outbox {
            sink: self.events.clone(),
            kinds: [None; 2],
        }
    }

    fn draw(&self) {
        if let Some(render) = &self.render {
            render(self.alive);
        }
    }
}

/// Events raised under the cell lock. They reach the sink only after the
/// lock is released, so a full stats queue never blocks readers of the cell.
struct Outbox {
    sink: Option<Arc<dyn EventSink>>,
    kinds: [Option<EventKind>; 2],
}

impl Outbox {
    fn push(&mut self, kind: EventKind) {
        if let Some(slot) = self.kinds.iter_mut().find(|slot| slot.is_none()) {
            *slot = Some(kind);
        }
    }

    fn deliver(self) {
        if let Some(sink) = self.sink {
            for kind in self.kinds.into_iter().flatten() {
                sink.record_event(CellEvent::once(kind));
            }
        }
    }
}

pub struct Cell {
    location: Location,
    rates: Arc<Rates>,
    outbound: broadcast::Sender<bool>,
    // One lock per cell: the sampler tick and any external edit are serialised here.
    state: Mutex<CellState>,
}

impl Cell {
    pub fn new(location: Location, alive: bool, rates: Arc<Rates>, signal_capacity: usize) -> Self {
        let (outbound, _) = broadcast::channel(signal_capacity.max(1));
        Self {
            location,
            rates,
            outbound,
            state: Mutex::new(CellState {
                alive,
                neighbor_mask: 0,
                inbound: Vec::with_capacity(8),
                render: None,
                events: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CellState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn state(&self) -> bool {
        self.lock().alive
    }

    /// Neighbour bits from the last sample, first wired neighbour highest.
    pub fn neighbor_mask(&self) -> u8 {
        self.lock().neighbor_mask
    }

    pub fn neighbor_count(&self) -> usize {
        self.lock().inbound.len()
    }

    /// A new read handle on this cell's outbound signal.
    pub fn subscribe(&self) -> broadcast::Receiver<bool> {
        self.outbound.subscribe()
    }

    pub fn set_render_hook(&self, hook: RenderHook) {
        self.lock().render = Some(hook);
    }

    pub fn set_event_sink(&self, sink: Arc<dyn EventSink>) {
        self.lock().events = Some(sink);
    }

    /// Changes state and tells the neighbours right away.
    pub fn set_state(&self, alive: bool) {
        let outbox = {
            let mut state = self.lock();
            let mut outbox = state.outbox();
            self.publish(&mut state, alive, &mut outbox);
            outbox
        };
        outbox.deliver();
    }

    /// Changes state without notifying anyone; neighbours find out on
    /// their next poll of a broadcast.
    pub fn silent_set_state(&self, alive: bool) {
        let mut state = self.lock();
        state.alive = alive;
        state.draw();
    }

    fn publish(&self, state: &mut CellState, alive: bool, outbox: &mut Outbox) {
        state.alive = alive;
        state.draw();
        if !alive {
            outbox.push(EventKind::Died);
        }
        // No receivers only happens on a 1x1 grid.
        let _ = self.outbound.send(alive);
        outbox.push(EventKind::Broadcast);
    }

    /// Subscribes to `neighbor` and folds its current state into the mask.
    ///
    /// Wiring happens before [`run`](Self::run); the bootstrap bit is
    /// replaced by the first real sample.
    pub fn wire_neighbor(&self, neighbor: &Cell) {
        let source = neighbor.subscribe();
        let neighbor_alive = neighbor.state();

        let mut state = self.lock();
        state.inbound.push(source);
        state.neighbor_mask = (state.neighbor_mask << 1) | u8::from(neighbor_alive);
        trace!(cell = %self.location, neighbor = %neighbor.location, "adding neighbor");
    }

    /// One broadcaster iteration.
    pub fn broadcast_tick(&self) {
        let outbox = {
            let state = self.lock();
            let mut outbox = state.outbox();
            outbox.push(EventKind::Heartbeat);
            if state.alive {
                let _ = self.outbound.send(true);
                outbox.push(EventKind::Broadcast);
            }
            outbox
        };
        outbox.deliver();
    }

    /// Polls every neighbour once and returns the fresh mask.
    pub fn sample(&self) -> u8 {
        let mut state = self.lock();
        Self::poll_neighbors(&mut state)
    }

    /// Applies the rule to an already sampled mask.
    pub fn apply_mask(&self, mask: u8) -> Transition {
        let (transition, outbox) = {
            let mut state = self.lock();
            self.apply(&mut state, mask)
        };
        outbox.deliver();
        transition
    }

    /// One sampler iteration: poll, then apply.
    pub fn sampler_tick(&self) -> Transition {
        let (transition, outbox) = {
            let mut state = self.lock();
            let mask = Self::poll_neighbors(&mut state);
            self.apply(&mut state, mask)
        };
        outbox.deliver();
        transition
    }

    fn poll_neighbors(state: &mut CellState) -> u8 {
        let mask = state
            .inbound
            .iter_mut()
            .fold(0u8, |mask, source| (mask << 1) | u8::from(drain(source)));
        state.neighbor_mask = mask;
        mask
    }

    fn apply(&self, state: &mut CellState, mask: u8) -> (Transition, Outbox) {
        let mut outbox = state.outbox();
        let current = state.alive;
        let transition = rule::next_state(current, mask.count_ones());
        if transition.changes(current) {
            debug!(
                cell = %self.location,
                before = current,
                after = transition.next,
                reason = %transition.reason,
                "state change"
            );
            if transition.next {
                outbox.push(EventKind::Resurrected);
                state.alive = true;
                state.draw();
            } else {
                self.publish(state, false, &mut outbox);
            }
        }
        (transition, outbox)
    }

    /// Starts the broadcaster and sampler loops on the current runtime.
    ///
    /// Both loops stop once `shutdown` flips to `true` or its sender is
    /// dropped, at most one interval later.
    pub fn run(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> [JoinHandle<()>; 2] {
        let broadcaster = tokio::spawn(Arc::clone(self).broadcast_loop(shutdown.clone()));
        let sampler = tokio::spawn(Arc::clone(self).sample_loop(shutdown));
        [broadcaster, sampler]
    }

    async fn broadcast_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        while !*shutdown.borrow() {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = time::sleep(self.rates.broadcast_interval()) => self.broadcast_tick(),
            }
        }
        trace!(cell = %self.location, "broadcaster stopped");
    }

    async fn sample_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        while !*shutdown.borrow() {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = time::sleep(self.rates.read_interval()) => {
                    self.sampler_tick();
                }
            }
        }
        trace!(cell = %self.location, "sampler stopped");
    }
}

/// Empties one neighbour channel. The bit is the latest value seen; falling
/// behind still counts as a sign of life.
fn drain(source: &mut broadcast::Receiver<bool>) -> bool {
    let mut latest = false;
    loop {
        match source.try_recv() {
            Ok(alive) => latest = alive,
            Err(TryRecvError::Lagged(_)) => latest = true,
            Err(TryRecvError::Empty | TryRecvError::Closed) => return latest,
        }
    }
}

impl Life for Cell {
    fn state(&self) -> bool {
        Cell::state(self)
    }

    fn set_state(&self, alive: bool) {
        Cell::set_state(self, alive)
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Cell")
            .field("location", &self.location)
            .field("alive", &state.alive)
            .field("neighbor_mask", &format_args!("{:#010b}", state.neighbor_mask))
            .field("neighbors", &state.inbound.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<CellEvent>>,
    }

    impl Recorder {
        fn kinds(&self) -> Vec<EventKind> {
            self.events.lock().unwrap().iter().map(|e| e.kind).collect()
        }
    }

    impl EventSink for Recorder {
        fn record_event(&self, event: CellEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    /// Notes whether the watched cell's lock was free when each event arrived.
    #[derive(Default)]
    struct LockWatcher {
        cell: Mutex<Option<Arc<Cell>>>,
        lock_free: Mutex<Vec<bool>>,
    }

    impl EventSink for LockWatcher {
        fn record_event(&self, _event: CellEvent) {
            if let Some(cell) = self.cell.lock().unwrap().clone() {
                let free = cell.state.try_lock().is_ok();
                self.lock_free.lock().unwrap().push(free);
            }
        }
    }

    fn cell(row: usize, col: usize, alive: bool) -> Cell {
        Cell::new(Location::new(row, col), alive, Arc::new(Rates::new(10, 5)), 8)
    }

    fn neighbours(alive: &[bool]) -> Vec<Cell> {
        alive.iter().enumerate().map(|(i, &a)| cell(0, i, a)).collect()
    }

    #[test]
    fn location_label() {
        assert_eq!(Location::new(3, 14).to_string(), "3-14");
    }

    #[test]
    fn set_state_publishes_silent_set_state_does_not() {
        let c = cell(0, 0, false);
        let mut rx = c.subscribe();

        c.silent_set_state(true);
        assert!(c.state());
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));

        c.set_state(false);
        assert!(!c.state());
        assert_eq!(rx.try_recv(), Ok(false));
    }

    #[test]
    fn render_hook_sees_every_change() {
        let c = cell(0, 0, false);
        let draws = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&draws);
        c.set_render_hook(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        c.silent_set_state(true);
        c.set_state(false);
        assert_eq!(draws.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn wiring_seeds_mask_with_current_states() {
        let c = cell(1, 1, false);
        for n in neighbours(&[true, false, true]) {
            c.wire_neighbor(&n);
        }
        assert_eq!(c.neighbor_count(), 3);
        assert_eq!(c.neighbor_mask(), 0b101);
    }

    #[test]
    fn broadcast_only_while_alive() {
        let c = cell(0, 0, false);
        let sink = Arc::new(Recorder::default());
        c.set_event_sink(sink.clone());
        let mut rx = c.subscribe();

        c.broadcast_tick();
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));

        c.silent_set_state(true);
        c.broadcast_tick();
        assert_eq!(rx.try_recv(), Ok(true));
        assert_eq!(
            sink.kinds(),
            vec![EventKind::Heartbeat, EventKind::Heartbeat, EventKind::Broadcast]
        );
    }

    #[test]
    fn sample_is_a_fresh_bitmap_per_tick() {
        let c = cell(1, 1, false);
        let ns = neighbours(&[true, true, false]);
        for n in &ns {
            c.wire_neighbor(n);
        }
        for n in &ns {
            n.broadcast_tick();
            n.broadcast_tick();
        }
        assert_eq!(c.sample(), 0b110);
        // Nothing new since the last poll.
        assert_eq!(c.sample(), 0);
    }

    #[test]
    fn death_notice_overrides_earlier_heartbeat() {
        let c = cell(1, 1, false);
        let n = cell(0, 0, true);
        c.wire_neighbor(&n);
        n.broadcast_tick();
        n.set_state(false);
        assert_eq!(c.sample(), 0);
    }

    #[test]
    fn lagging_neighbour_still_counts() {
        let c = Cell::new(Location::new(1, 1), false, Arc::new(Rates::default()), 2);
        let n = Cell::new(Location::new(0, 0), true, Arc::new(Rates::default()), 2);
        c.wire_neighbor(&n);
        for _ in 0..5 {
            n.broadcast_tick();
        }
        assert_eq!(c.sample(), 1);
    }

    #[test]
    fn isolated_cell_dies_after_one_tick() {
        let c = cell(0, 0, true);
        let sink = Arc::new(Recorder::default());
        c.set_event_sink(sink.clone());
        let quiet = neighbours(&[false, false, false]);
        for n in &quiet {
            c.wire_neighbor(n);
        }
        let mut rx = c.subscribe();

        let t = c.sampler_tick();
        assert!(!t.next);
        assert_eq!(t.reason, rule::Reason::Underpopulation);
        assert!(!c.state());
        assert_eq!(rx.try_recv(), Ok(false));
        assert_eq!(sink.kinds(), vec![EventKind::Died, EventKind::Broadcast]);
    }

    #[test]
    fn birth_is_silent_and_reported() {
        let c = cell(1, 1, false);
        let sink = Arc::new(Recorder::default());
        c.set_event_sink(sink.clone());
        let ns = neighbours(&[true, true, true, false]);
        for n in &ns {
            c.wire_neighbor(n);
        }
        let mut rx = c.subscribe();

        let t = c.apply_mask(0b1110);
        assert_eq!(t.reason, rule::Reason::Reproduction);
        assert!(c.state());
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
        assert_eq!(sink.kinds(), vec![EventKind::Resurrected]);
    }

    #[test]
    fn events_are_recorded_outside_the_cell_lock() {
        let c = Arc::new(cell(1, 1, true));
        let watcher = Arc::new(LockWatcher::default());
        c.set_event_sink(watcher.clone());
        *watcher.cell.lock().unwrap() = Some(Arc::clone(&c));
        let quiet = cell(0, 0, false);
        c.wire_neighbor(&quiet);

        c.broadcast_tick();
        assert!(!c.sampler_tick().next);
        c.set_state(true);
        assert_eq!(c.apply_mask(0).reason, rule::Reason::Underpopulation);

        // Breaks the cell -> sink -> cell cycle.
        watcher.cell.lock().unwrap().take();
        let seen = watcher.lock_free.lock().unwrap().clone();
        assert_eq!(seen.len(), 7);
        assert!(seen.iter().all(|&free| free));
    }

    #[test]
    fn survival_emits_nothing() {
        let c = cell(1, 1, true);
        let sink = Arc::new(Recorder::default());
        c.set_event_sink(sink.clone());
        assert_eq!(c.apply_mask(0b11).reason, rule::Reason::Survival);
        assert!(sink.kinds().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn loops_stop_on_shutdown() {
        let c = Arc::new(cell(0, 0, true));
        let mut rx = c.subscribe();
        let (tx, shutdown) = watch::channel(false);
        let handles = c.run(shutdown);

        time::sleep(Duration::from_millis(12)).await;
        assert_eq!(rx.try_recv(), Ok(true));

        tx.send(true).unwrap();
        for h in handles {
            h.await.unwrap();
        }
    }
}
