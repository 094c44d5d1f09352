// config.rs - Startup configuration and the live-tunable rate knobs

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_SEED_PROBABILITY: f64 = 0.13;
pub const DEFAULT_READ_INTERVAL_MS: u64 = 500;
pub const DEFAULT_BROADCAST_INTERVAL_MS: u64 = 250;
pub const DEFAULT_SIGNAL_CAPACITY: usize = 8;
pub const DEFAULT_EVENT_CAPACITY: usize = 10_000;

/// Everything needed to build a [`World`](crate::World).
#[derive(Debug, Clone, PartialEq)]
pub struct LifeConfig {
    /// Chance that a cell starts alive.
    pub seed_probability: f64,
    pub read_interval_ms: u64,
    pub broadcast_interval_ms: u64,
    /// Slots in each cell's outbound signal channel.
    pub signal_capacity: usize,
    /// Slots in the stats event queue; producers block once it is full.
    pub event_capacity: usize,
    /// Fixed seed for the bootstrap draw. `None` seeds from the OS.
    pub rng_seed: Option<u64>,
}

impl Default for LifeConfig {
    fn default() -> Self {
        Self {
            seed_probability: DEFAULT_SEED_PROBABILITY,
            read_interval_ms: DEFAULT_READ_INTERVAL_MS,
            broadcast_interval_ms: DEFAULT_BROADCAST_INTERVAL_MS,
            signal_capacity: DEFAULT_SIGNAL_CAPACITY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            rng_seed: None,
        }
    }
}

impl LifeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.seed_probability) {
            return Err(ConfigError::InvalidProbability(self.seed_probability));
        }
        if self.read_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval("read_interval_ms"));
        }
        if self.broadcast_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval("broadcast_interval_ms"));
        }
        if self.signal_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("signal_capacity"));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("event_capacity"));
        }
        Ok(())
    }

    /// Defaults overridden by `LIFE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each known key.
    ///
    /// Recognised keys: `LIFE_SEED_PROBABILITY`, `LIFE_READ_RATE_MS`,
    /// `LIFE_BROADCAST_RATE_MS`, `LIFE_RNG_SEED`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(p) = parse_var(&lookup, "LIFE_SEED_PROBABILITY")? {
            config.seed_probability = p;
        }
        if let Some(ms) = parse_var(&lookup, "LIFE_READ_RATE_MS")? {
            config.read_interval_ms = ms;
        }
        if let Some(ms) = parse_var(&lookup, "LIFE_BROADCAST_RATE_MS")? {
            config.broadcast_interval_ms = ms;
        }
        if let Some(seed) = parse_var(&lookup, "LIFE_RNG_SEED")? {
            config.rng_seed = Some(seed);
        }
        config.validate()?;
        Ok(config)
    }
}

fn parse_var<F, T>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&'static str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidVariable { name, value: raw }),
    }
}

/// Process-wide timing shared by every cell.
///
/// Cells re-read both intervals on every tick, so a store here retunes the
/// whole running simulation. Values are clamped to at least 1ms.
#[derive(Debug)]
pub struct Rates {
    read_ms: AtomicU64,
    broadcast_ms: AtomicU64,
}

impl Rates {
    pub fn new(read_ms: u64, broadcast_ms: u64) -> Self {
        Self {
            read_ms: AtomicU64::new(read_ms.max(1)),
            broadcast_ms: AtomicU64::new(broadcast_ms.max(1)),
        }
    }

    pub fn read_interval_ms(&self) -> u64 {
        self.read_ms.load(Ordering::Relaxed)
    }

    pub fn broadcast_interval_ms(&self) -> u64 {
        self.broadcast_ms.load(Ordering::Relaxed)
    }

    pub fn read_interval(&self) -> Duration {
        Duration::from_millis(self.read_interval_ms())
    }

    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast_interval_ms())
    }

    pub fn set_read_interval_ms(&self, ms: u64) {
        self.read_ms.store(ms.max(1), Ordering::Relaxed);
    }

    pub fn set_broadcast_interval_ms(&self, ms: u64) {
        self.broadcast_ms.store(ms.max(1), Ordering::Relaxed);
    }

    /// Upper bound on how long a running loop takes to notice a shutdown.
    pub fn shutdown_latency(&self) -> Duration {
        self.read_interval().max(self.broadcast_interval())
    }
}

impl Default for Rates {
    fn default() -> Self {
        Self::new(DEFAULT_READ_INTERVAL_MS, DEFAULT_BROADCAST_INTERVAL_MS)
    }
}

impl From<&LifeConfig> for Rates {
    fn from(config: &LifeConfig) -> Self {
        Self::new(config.read_interval_ms, config.broadcast_interval_ms)
    }
}
