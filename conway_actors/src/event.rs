// event.rs - Lifecycle events emitted by cells

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Heartbeat,
    Broadcast,
    Died,
    Resurrected,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Heartbeat => "heartbeat",
            EventKind::Broadcast => "broadcast",
            EventKind::Died => "died",
            EventKind::Resurrected => "resurrected",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellEvent {
    pub kind: EventKind,
    pub count: i64,
}

impl CellEvent {
    pub const fn new(kind: EventKind, count: i64) -> Self {
        Self { kind, count }
    }

    pub const fn once(kind: EventKind) -> Self {
        Self::new(kind, 1)
    }
}

/// Anything that can absorb cell events. Shared by every cell in a world.
pub trait EventSink: Send + Sync {
    fn record_event(&self, event: CellEvent);
}
