// display.rs - Drawing surface consumed by the world and the stats line

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub const ALIVE_GLYPH: char = '0';
pub const DEAD_GLYPH: char = '-';

pub fn glyph_for(alive: bool) -> char {
    if alive { ALIVE_GLYPH } else { DEAD_GLYPH }
}

/// A drawing surface.
///
/// Every cell draws into the display from its own task, so implementations
/// must be safe to call from many threads at once: all methods take `&self`
/// and synchronise internally.
pub trait Display: Send + Sync {
    /// `(rows, cols)` of the drawable area.
    fn dimensions(&self) -> (usize, usize);
    fn draw_at(&self, row: usize, col: usize, glyph: char);
    /// Stage pending draws for the next refresh.
    fn buffer_update(&self);
    fn clear(&self);
    fn refresh(&self);
    /// A text region for the stats summary.
    fn create_stats_window(&self, height: usize, width: usize, row: usize, col: usize) -> Box<dyn StatsWindow>;
}

pub trait StatsWindow: Send {
    fn move_print(&mut self, row: usize, col: usize, text: &str);
    fn clear(&mut self);
    fn nout_refresh(&mut self);
}

#[derive(Debug)]
struct Surface {
    glyphs: Vec<Vec<char>>,
    stats: Vec<String>,
    buffer_updates: u64,
    refreshes: u64,
    stats_refreshes: u64,
}

/// In-memory [`Display`] backed by a glyph grid.
///
/// Used by the GUI, which paints from it every frame, and by tests.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    rows: usize,
    cols: usize,
    surface: Arc<Mutex<Surface>>,
}

impl FrameBuffer {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            surface: Arc::new(Mutex::new(Surface {
                glyphs: vec![vec![DEAD_GLYPH; cols]; rows],
                stats: Vec::new(),
                buffer_updates: 0,
                refreshes: 0,
                stats_refreshes: 0,
            })),
        }
    }

    fn surface(&self) -> MutexGuard<'_, Surface> {
        self.surface.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn glyph_at(&self, row: usize, col: usize) -> Option<char> {
        self.surface().glyphs.get(row).and_then(|r| r.get(col)).copied()
    }

    pub fn is_alive_at(&self, row: usize, col: usize) -> bool {
        self.glyph_at(row, col) == Some(ALIVE_GLYPH)
    }

    /// Copy of the whole grid as alive flags, row major.
    pub fn alive_cells(&self) -> Vec<Vec<bool>> {
        self.surface()
            .glyphs
            .iter()
            .map(|row| row.iter().map(|&g| g == ALIVE_GLYPH).collect())
            .collect()
    }

    /// Most recent non-empty line written into a stats window.
    pub fn stats_line(&self) -> Option<String> {
        self.surface()
            .stats
            .iter()
            .rev()
            .find(|line| !line.trim().is_empty())
            .map(|line| line.trim_end().to_string())
    }

    /// `(buffer_updates, refreshes)` seen so far.
    pub fn flushes(&self) -> (u64, u64) {
        let surface = self.surface();
        (surface.buffer_updates, surface.refreshes)
    }

    /// Times the stats window was staged for refresh.
    pub fn stats_refreshes(&self) -> u64 {
        self.surface().stats_refreshes
    }
}

impl Display for FrameBuffer {
    fn dimensions(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    fn draw_at(&self, row: usize, col: usize, glyph: char) {
        let mut surface = self.surface();
        if let Some(slot) = surface.glyphs.get_mut(row).and_then(|r| r.get_mut(col)) {
            *slot = glyph;
        }
    }

    fn buffer_update(&self) {
        self.surface().buffer_updates += 1;
    }

    fn clear(&self) {
        let mut surface = self.surface();
        for row in surface.glyphs.iter_mut() {
            row.fill(DEAD_GLYPH);
        }
    }

    fn refresh(&self) {
        self.surface().refreshes += 1;
    }

    fn create_stats_window(&self, height: usize, _width: usize, _row: usize, _col: usize) -> Box<dyn StatsWindow> {
        self.surface().stats = vec![String::new(); height];
        Box::new(FrameStatsWindow { surface: Arc::clone(&self.surface) })
    }
}

/// Stats region of a [`FrameBuffer`]; lines are kept apart from the grid.
struct FrameStatsWindow {
    surface: Arc<Mutex<Surface>>,
}

impl StatsWindow for FrameStatsWindow {
    fn move_print(&mut self, row: usize, col: usize, text: &str) {
        let mut surface = self.surface.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(line) = surface.stats.get_mut(row) {
            let mut chars: Vec<char> = line.chars().collect();
            if chars.len() < col {
                chars.resize(col, ' ');
            }
            chars.truncate(col);
            chars.extend(text.chars());
            *line = chars.into_iter().collect();
        }
    }

    fn clear(&mut self) {
        let mut surface = self.surface.lock().unwrap_or_else(PoisonError::into_inner);
        for line in surface.stats.iter_mut() {
            line.clear();
        }
    }

    fn nout_refresh(&mut self) {
        self.surface.lock().unwrap_or_else(PoisonError::into_inner).stats_refreshes += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn draws_inside_bounds_only() {
        let fb = FrameBuffer::new(2, 3);
        fb.draw_at(1, 2, ALIVE_GLYPH);
        fb.draw_at(5, 5, ALIVE_GLYPH);
        assert!(fb.is_alive_at(1, 2));
        assert_eq!(fb.glyph_at(0, 0), Some(DEAD_GLYPH));
        assert_eq!(fb.glyph_at(5, 5), None);
        fb.clear();
        assert!(!fb.is_alive_at(1, 2));
    }

    #[test]
    fn concurrent_draws_are_all_applied() {
        let fb = FrameBuffer::new(16, 16);
        let handles: Vec<_> = (0..16)
            .map(|row| {
                let fb = fb.clone();
                thread::spawn(move || {
                    for col in 0..16 {
                        fb.draw_at(row, col, ALIVE_GLYPH);
                        fb.buffer_update();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(fb.alive_cells().iter().flatten().all(|&alive| alive));
        assert_eq!(fb.flushes().0, 256);
    }

    #[test]
    fn stats_window_overwrites_lines() {
        let fb = FrameBuffer::new(4, 10);
        let mut window = fb.create_stats_window(3, 10, 1, 0);
        window.move_print(0, 0, "          ");
        window.move_print(1, 0, "Died: 2");
        assert_eq!(fb.stats_line().as_deref(), Some("Died: 2"));
        window.move_print(1, 0, "Died: 3");
        assert_eq!(fb.stats_line().as_deref(), Some("Died: 3"));
        window.clear();
        assert_eq!(fb.stats_line(), None);
    }

    #[test]
    fn stats_refreshes_are_counted_apart_from_the_grid() {
        let fb = FrameBuffer::new(4, 10);
        let mut window = fb.create_stats_window(3, 10, 1, 0);
        window.nout_refresh();
        window.nout_refresh();
        fb.buffer_update();
        assert_eq!(fb.stats_refreshes(), 2);
        assert_eq!(fb.flushes(), (1, 0));
    }
}
