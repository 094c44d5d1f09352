// rule.rs - Conway's transition rule as a pure function

use std::fmt;

/// Why a cell ended up in its next state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    Underpopulation,
    Overpopulation,
    Survival,
    Reproduction,
    Dormant,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Reason::Underpopulation => "under-population",
            Reason::Overpopulation => "over-population",
            Reason::Survival => "survival",
            Reason::Reproduction => "reproduction",
            Reason::Dormant => "dormant",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: bool,
    pub reason: Reason,
}

impl Transition {
    /// True when the cell flips state.
    pub fn changes(&self, current: bool) -> bool {
        self.next != current
    }
}

/// Standard B3/S23 rule over the number of alive Moore neighbours.
pub fn next_state(alive: bool, alive_count: u32) -> Transition {
    let (next, reason) = match (alive, alive_count) {
        (true, 0..=1) => (false, Reason::Underpopulation),
        (true, 2) | (true, 3) => (true, Reason::Survival),
        (true, _) => (false, Reason::Overpopulation),
        (false, 3) => (true, Reason::Reproduction),
        (false, _) => (false, Reason::Dormant),
    };
    Transition { next, reason }
}
