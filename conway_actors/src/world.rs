// world.rs - Owns the grid of cell actors, wires neighbourhoods and starts them

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::cell::{Cell, Location};
use crate::config::{LifeConfig, Rates};
use crate::display::{Display, glyph_for};
use crate::error::WorldError;
use crate::event::EventSink;
use crate::stats::StatsAggregator;

/// Moore neighbourhood, scanned row by row. This is also the wiring order,
/// so bit 7 of a full mask is the north-west neighbour.
#[rustfmt::skip]
const MOORE_OFFSETS: [(isize, isize); 8] = [
    (-1, -1), (-1, 0), (-1, 1),
    (0, -1),           (0, 1),
    (1, -1),  (1, 0),  (1, 1),
];

pub type Grid = Vec<Vec<Arc<Cell>>>;

pub struct World {
    display: Arc<dyn Display>,
    config: LifeConfig,
    rates: Arc<Rates>,
    stats: Arc<StatsAggregator>,
    cells: Grid,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    bootstrapped: AtomicBool,
}

impl World {
    /// Builds a grid of dead cells sized from `display`.
    pub fn new(display: Arc<dyn Display>, config: LifeConfig) -> Result<Self, WorldError> {
        config.validate()?;
        let (rows, cols) = display.dimensions();
        if rows == 0 || cols == 0 {
            return Err(WorldError::EmptyGrid);
        }

        let rates = Arc::new(Rates::from(&config));
        let cells = (0..rows)
            .map(|row| {
                (0..cols)
                    .map(|col| {
                        Arc::new(Cell::new(
                            Location::new(row, col),
                            false,
                            Arc::clone(&rates),
                            config.signal_capacity,
                        ))
                    })
                    .collect()
            })
            .collect();
        let stats = Arc::new(StatsAggregator::new(display.as_ref(), config.event_capacity));
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            display,
            config,
            rates,
            stats,
            cells,
            shutdown,
            tasks: Mutex::new(Vec::new()),
            bootstrapped: AtomicBool::new(false),
        })
    }

    /// Default configuration with the given seed probability.
    pub fn with_probability(display: Arc<dyn Display>, seed_probability: f64) -> Result<Self, WorldError> {
        Self::new(display, LifeConfig { seed_probability, ..LifeConfig::default() })
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.cells.len(), self.cells[0].len())
    }

    pub fn cells(&self) -> &Grid {
        &self.cells
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&Arc<Cell>> {
        self.cells.get(row).and_then(|r| r.get(col))
    }

    pub fn rates(&self) -> &Arc<Rates> {
        &self.rates
    }

    pub fn stats(&self) -> &Arc<StatsAggregator> {
        &self.stats
    }

    pub fn population(&self) -> usize {
        self.cells.iter().flatten().filter(|c| c.state()).count()
    }

    pub fn is_running(&self) -> bool {
        !lock(&self.tasks).is_empty()
    }

    /// Points every cell's render hook at the display and its events at
    /// the stats aggregator. Must happen before any state change so the
    /// first draw reflects the seed.
    pub fn attach_callbacks(&self) {
        let sink: Arc<dyn EventSink> = self.stats.clone();
        for (row, cells) in self.cells.iter().enumerate() {
            for (col, cell) in cells.iter().enumerate() {
                let display = Arc::clone(&self.display);
                cell.set_render_hook(Box::new(move |alive| {
                    display.draw_at(row, col, glyph_for(alive));
                    display.buffer_update();
                }));
                cell.set_event_sink(Arc::clone(&sink));
            }
        }
    }

    /// Brings each cell to life with chance `probability`. Returns how many.
    pub fn seed<R: Rng>(&self, probability: f64, rng: &mut R) -> usize {
        let mut seeded = 0;
        for cell in self.cells.iter().flatten() {
            if rng.random::<f64>() < probability {
                cell.silent_set_state(true);
                seeded += 1;
            }
        }
        seeded
    }

    /// Connects every cell to its in-bounds Moore neighbours. Call once,
    /// before the cells are started.
    pub fn wire_topology(&self) {
        let (rows, cols) = self.dimensions();
        for (row, cells) in self.cells.iter().enumerate() {
            for (col, cell) in cells.iter().enumerate() {
                for (nr, nc) in neighbours(row, col, rows, cols) {
                    cell.wire_neighbor(&self.cells[nr][nc]);
                }
            }
        }
    }

    /// Spawns both loops of every cell on the current tokio runtime.
    pub fn start(&self) {
        let mut tasks = lock(&self.tasks);
        for cell in self.cells.iter().flatten() {
            tasks.extend(cell.run(self.shutdown.subscribe()));
        }
    }

    /// Callbacks, seed, wiring, then start. Must run inside a tokio runtime.
    pub fn bootstrap(&self) -> Result<(), WorldError> {
        if self.bootstrapped.swap(true, Ordering::SeqCst) {
            return Err(WorldError::AlreadyBootstrapped);
        }
        self.attach_callbacks();

        let mut rng = match self.config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let seeded = self.seed(self.config.seed_probability, &mut rng);
        self.display.refresh();

        self.wire_topology();
        self.start();

        let (rows, cols) = self.dimensions();
        info!(rows, cols, seeded, "world bootstrapped");
        Ok(())
    }

    /// Runs one synchronous generation through the cells' own channels:
    /// everyone broadcasts, everyone samples, then everyone applies.
    ///
    /// Only meaningful while the loops are not running.
    pub fn step_generation(&self) {
        let cells: Vec<&Arc<Cell>> = self.cells.iter().flatten().collect();
        for cell in &cells {
            cell.broadcast_tick();
        }
        let masks: Vec<u8> = cells.iter().map(|c| c.sample()).collect();
        for (cell, mask) in cells.iter().zip(masks) {
            cell.apply_mask(mask);
        }
    }

    /// Forces a cell alive or dead without notifying its neighbours.
    pub fn force_state(&self, row: usize, col: usize, alive: bool) -> Result<(), WorldError> {
        let (rows, cols) = self.dimensions();
        let cell = self
            .cell(row, col)
            .ok_or(WorldError::OutOfBounds { row, col, rows, cols })?;
        cell.silent_set_state(alive);
        Ok(())
    }

    /// Sprinkles life over the disc of `radius` around `(row, col)`, each
    /// cell turning alive with chance `density`. Parts outside the grid are
    /// clipped. Returns how many cells were set.
    pub fn spawn_cluster<R: Rng>(
        &self,
        row: usize,
        col: usize,
        radius: usize,
        density: f64,
        rng: &mut R,
    ) -> usize {
        let (rows, cols) = self.dimensions();
        // Nothing past the far edge can land on the grid.
        let r = radius.min(rows.max(cols));
        let top = row.saturating_sub(r);
        let bottom = row.saturating_add(r).min(rows - 1);
        let left = col.saturating_sub(r);
        let right = col.saturating_add(r).min(cols - 1);

        let mut spawned = 0;
        for y in top..=bottom {
            for x in left..=right {
                let (dy, dx) = (y.abs_diff(row), x.abs_diff(col));
                if dx * dx + dy * dy > r * r || rng.random::<f64>() >= density {
                    continue;
                }
                if let Some(cell) = self.cell(y, x) {
                    cell.silent_set_state(true);
                    spawned += 1;
                }
            }
        }
        spawned
    }

    /// Redraws every cell and flushes the display.
    pub fn draw_world(&self) {
        self.display.clear();
        for (row, cells) in self.cells.iter().enumerate() {
            for (col, cell) in cells.iter().enumerate() {
                self.display.draw_at(row, col, glyph_for(cell.state()));
            }
        }
        self.display.buffer_update();
        self.display.refresh();
    }

    /// Cancels every cell loop, waits for them, then stops the stats thread.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        let tasks = std::mem::take(&mut *lock(&self.tasks));
        let count = tasks.len();
        for task in tasks {
            let _ = task.await;
        }
        self.stats.shutdown();
        info!(tasks = count, "world shut down");
    }
}

impl Drop for World {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-bounds Moore neighbours of `(row, col)`; no wraparound.
pub fn neighbours(row: usize, col: usize, rows: usize, cols: usize) -> impl Iterator<Item = (usize, usize)> {
    MOORE_OFFSETS.iter().filter_map(move |&(dr, dc)| {
        let nr = row.checked_add_signed(dr).filter(|&r| r < rows)?;
        let nc = col.checked_add_signed(dc).filter(|&c| c < cols)?;
        Some((nr, nc))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::FrameBuffer;
    use proptest::prelude::*;

    fn world(rows: usize, cols: usize) -> (World, FrameBuffer) {
        let fb = FrameBuffer::new(rows, cols);
        let world = World::with_probability(Arc::new(fb.clone()), 0.0).unwrap();
        (world, fb)
    }

    #[test]
    fn rejects_empty_display() {
        let fb = FrameBuffer::new(0, 10);
        let err = World::with_probability(Arc::new(fb), 0.1).err();
        assert_eq!(err, Some(WorldError::EmptyGrid));
    }

    #[test]
    fn rejects_invalid_config() {
        let fb = FrameBuffer::new(3, 3);
        let err = World::with_probability(Arc::new(fb), 2.0).err();
        assert!(matches!(err, Some(WorldError::Config(_))));
    }

    #[test]
    fn neighbour_counts_by_position() {
        assert_eq!(neighbours(0, 0, 5, 5).count(), 3);
        assert_eq!(neighbours(0, 2, 5, 5).count(), 5);
        assert_eq!(neighbours(2, 0, 5, 5).count(), 5);
        assert_eq!(neighbours(4, 4, 5, 5).count(), 3);
        assert_eq!(neighbours(2, 2, 5, 5).count(), 8);
        assert_eq!(neighbours(0, 0, 1, 1).count(), 0);
    }

    #[test]
    fn seeding_respects_extremes() {
        let (w, fb) = world(4, 4);
        w.attach_callbacks();
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(w.seed(0.0, &mut rng), 0);
        assert_eq!(w.seed(1.0, &mut rng), 16);
        assert_eq!(w.population(), 16);
        assert!(fb.alive_cells().iter().flatten().all(|&a| a));
    }

    #[test]
    fn force_state_is_bounds_checked() {
        let (w, fb) = world(3, 4);
        w.attach_callbacks();
        assert_eq!(w.force_state(2, 3, true), Ok(()));
        assert!(fb.is_alive_at(2, 3));
        assert_eq!(
            w.force_state(3, 0, true),
            Err(WorldError::OutOfBounds { row: 3, col: 0, rows: 3, cols: 4 })
        );
        assert_eq!(w.population(), 1);
    }

    #[test]
    fn cluster_is_clipped_to_disc_and_grid() {
        let (w, _) = world(6, 6);
        let mut rng = StdRng::seed_from_u64(9);
        let spawned = w.spawn_cluster(0, 0, 2, 1.0, &mut rng);
        // Quarter disc of radius 2 inside the grid: (0..=2, 0..=2) minus (2,1),(1,2),(2,2).
        assert_eq!(spawned, 6);
        assert_eq!(w.population(), 6);
        assert!(!w.cell(2, 2).unwrap().state());
        assert!(w.cell(2, 0).unwrap().state());
    }

    #[test]
    fn huge_cluster_radius_covers_grid_without_overflow() {
        let (w, _) = world(5, 5);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(w.spawn_cluster(2, 2, 1usize << 32, 1.0, &mut rng), 25);
        assert_eq!(w.population(), 25);
    }

    #[test]
    fn cluster_centred_far_off_grid_is_ignored() {
        let (w, _) = world(5, 5);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(w.spawn_cluster(usize::MAX, usize::MAX, usize::MAX, 1.0, &mut rng), 0);
        assert_eq!(w.population(), 0);
    }

    #[test]
    fn zero_density_cluster_does_nothing() {
        let (w, _) = world(6, 6);
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(w.spawn_cluster(3, 3, 2, 0.0, &mut rng), 0);
    }

    #[test]
    fn draw_world_mirrors_cells() {
        let (w, fb) = world(2, 2);
        w.cell(1, 0).unwrap().silent_set_state(true);
        w.draw_world();
        assert_eq!(fb.alive_cells(), vec![vec![false, false], vec![true, false]]);
        assert_eq!(fb.flushes().1, 1);
    }

    #[test]
    fn bootstrap_only_once() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let (w, _) = world(3, 3);
        {
            let _guard = rt.enter();
            assert_eq!(w.bootstrap(), Ok(()));
            assert_eq!(w.bootstrap(), Err(WorldError::AlreadyBootstrapped));
        }
        assert!(w.is_running());
        rt.block_on(w.shutdown());
        assert!(!w.is_running());
    }

    proptest! {
        #[test]
        fn wiring_matches_in_bounds_neighbours(rows in 1usize..7, cols in 1usize..7) {
            let (w, _) = world(rows, cols);
            w.wire_topology();
            for (row, cells) in w.cells().iter().enumerate() {
                for (col, cell) in cells.iter().enumerate() {
                    let expected = neighbours(row, col, rows, cols).count();
                    prop_assert_eq!(cell.neighbor_count(), expected);
                    prop_assert!(neighbours(row, col, rows, cols).all(|(r, c)| r < rows && c < cols));
                }
            }
        }
    }
}
