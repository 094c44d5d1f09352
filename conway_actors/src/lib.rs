// lib.rs - Conway's Game of Life where every cell is its own async actor
//
// Cells never see a shared grid. Each one broadcasts its state on a small
// channel and samples its neighbours' channels on its own clock, so the
// simulation is only eventually consistent between neighbours.

pub mod cell;
pub mod config;
pub mod display;
pub mod error;
pub mod event;
pub mod rule;
pub mod stats;
pub mod world;

pub use cell::{Cell, Life, Location};
pub use config::{LifeConfig, Rates};
pub use display::{Display, FrameBuffer, StatsWindow};
pub use error::{ConfigError, WorldError};
pub use event::{CellEvent, EventKind, EventSink};
pub use rule::{Reason, Transition, next_state};
pub use stats::{StatsAggregator, StatsCounters};
pub use world::World;
