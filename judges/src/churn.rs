//! Counters for fact-store mutations made by a judge or a full cycle.

use std::fmt;
use std::ops::{Add, AddAssign};

/// How many facts were inserted, deleted, and added (net) by an execution.
///
/// A cycle starts from [`Churn::default()`] and accumulates the churn of
/// every judge that ran. A cycle whose churn [`is_zero`](Churn::is_zero) is
/// the fixpoint signal that stops the update loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Churn {
    /// Facts inserted into the store.
    pub inserted: u64,
    /// Facts deleted from the store.
    pub deleted: u64,
    /// Net growth of the store (never negative).
    pub added: u64,
}

impl Churn {
    pub const fn new(inserted: u64, deleted: u64, added: u64) -> Self {
        Self {
            inserted,
            deleted,
            added,
        }
    }

    /// True iff all three counters are zero.
    pub fn is_zero(&self) -> bool {
        self.inserted == 0 && self.deleted == 0 && self.added == 0
    }
}

impl Add for Churn {
    type Output = Churn;

    fn add(self, other: Churn) -> Churn {
        Churn {
            inserted: self.inserted + other.inserted,
            deleted: self.deleted + other.deleted,
            added: self.added + other.added,
        }
    }
}

impl AddAssign for Churn {
    fn add_assign(&mut self, other: Churn) {
        *self = *self + other;
    }
}

impl fmt::Display for Churn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.inserted, self.deleted, self.added)
    }
}
