// main.rs - Actor-based Conway's Game of Life in an egui window
// Every cell runs on the tokio runtime below; the window only paints the
// frame buffer the cells draw into and feeds edits back into the world.

use std::error::Error;
use std::sync::Arc;

use conway_actors::{FrameBuffer, LifeConfig, World};
use eframe::egui;
use egui::Color32;
use tracing::info;

mod logging;
mod patterns;
mod ui;

pub const GRID_SIZE: usize = 50;     // 50x50 playing area
pub const CLUSTER_RADIUS: usize = 2; // Brush radius for drawn life
pub const CLUSTER_DENSITY: f64 = 0.7;

fn main() -> Result<(), Box<dyn Error>> {
    logging::init("app.log")?;
    let config = LifeConfig::from_env()?;
    let seed_probability = config.seed_probability;

    let runtime = tokio::runtime::Runtime::new()?;
    let frame = FrameBuffer::new(GRID_SIZE, GRID_SIZE);
    let world = Arc::new(World::new(Arc::new(frame.clone()), config)?);
    {
        // Cell loops are spawned onto this runtime
        let _guard = runtime.enter();
        world.bootstrap()?;
    }

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([800.0, 1000.0]),
        ..Default::default()
    };

    let app = GameOfLife::new(Arc::clone(&world), frame, seed_probability);
    let result = eframe::run_native(
        "Actor Conway's Game of Life",
        options,
        Box::new(move |_cc| Box::new(app)),
    );

    runtime.block_on(world.shutdown());
    info!("window closed");
    result?;
    Ok(())
}

/// Window state; the simulation itself lives in `world`.
pub struct GameOfLife {
    world: Arc<World>,
    frame: FrameBuffer,
    pub seed_probability: f64,
    pub live_color: Color32,
    pub dead_color: Color32,
    pub selected_pattern: usize,
    last_drag_cell: Option<(usize, usize)>,
}

impl GameOfLife {
    pub fn new(world: Arc<World>, frame: FrameBuffer, seed_probability: f64) -> Self {
        Self {
            world,
            frame,
            seed_probability,
            live_color: Color32::from_rgb(0, 200, 0),
            dead_color: Color32::from_rgb(40, 40, 40),
            selected_pattern: 0,
            last_drag_cell: None,
        }
    }

    pub fn clear_grid(&self) {
        for cell in self.world.cells().iter().flatten() {
            cell.silent_set_state(false);
        }
    }

    pub fn apply_random_pattern(&self) {
        self.clear_grid();
        let seeded = self.world.seed(self.seed_probability, &mut rand::rng());
        info!(seeded, "reseeded world");
    }

    pub fn apply_selected_pattern(&self) {
        if let Some(pattern) = patterns::PATTERNS.get(self.selected_pattern) {
            self.clear_grid();
            let placed = patterns::stamp(&self.world, pattern);
            info!(pattern = pattern.name, placed, "stamped pattern");
        }
    }

    /// Draws a random cluster of life under the pointer. While dragging,
    /// only a move to a different cell draws again.
    pub fn draw_life(&mut self, row: usize, col: usize) {
        if self.last_drag_cell == Some((row, col)) {
            return;
        }
        self.last_drag_cell = Some((row, col));
        self.world
            .spawn_cluster(row, col, CLUSTER_RADIUS, CLUSTER_DENSITY, &mut rand::rng());
    }

    pub fn release_pointer(&mut self) {
        self.last_drag_cell = None;
    }
}
