//! Sweep leaderboard: bounded, deduplicated, sorted by score.
//!
//! Entries are ordered by descending score; equal scores keep the lower global
//! index first, so the ranking does not depend on the order in which units
//! report. Deduplication key: the global index. A repeated index only replaces
//! its entry when the new score is higher.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use gridlab_core::params::ParameterAssignment;
use gridlab_core::statistics::Statistics;

/// One scored combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub index: u64,
    pub score: f64,
    pub assignment: ParameterAssignment,
    /// Fingerprint of the resolved execution definition.
    pub fingerprint: String,
    pub statistics: Statistics,
}

impl RankedEntry {
    /// Ranking order: higher score first, then lower index.
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .partial_cmp(&self.score)
            .unwrap_or(Ordering::Equal)
            .then(self.index.cmp(&other.index))
    }
}

/// Outcome of an insert operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertResult {
    Inserted,
    /// Replaced the entry for the same index (better score).
    Replaced,
    /// Skipped: non-finite score, duplicate without improvement, or not in
    /// the top K.
    Skipped,
}

#[derive(Debug, Clone)]
pub struct Leaderboard {
    entries: Vec<RankedEntry>,
    max_size: usize,
}

impl Leaderboard {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: Vec::with_capacity(max_size.min(1024)),
            max_size,
        }
    }

    pub fn insert(&mut self, entry: RankedEntry) -> InsertResult {
        if !entry.score.is_finite() {
            return InsertResult::Skipped;
        }

        if let Some(pos) = self.entries.iter().position(|e| e.index == entry.index) {
            if entry.score > self.entries[pos].score {
                self.entries[pos] = entry;
                self.sort_entries();
                return InsertResult::Replaced;
            }
            return InsertResult::Skipped;
        }

        if self.entries.len() < self.max_size {
            self.entries.push(entry);
            self.sort_entries();
            return InsertResult::Inserted;
        }
        match self.entries.last() {
            Some(worst) if entry.rank_cmp(worst) == Ordering::Less => {
                self.entries.pop();
                self.entries.push(entry);
                self.sort_entries();
                InsertResult::Inserted
            }
            _ => InsertResult::Skipped,
        }
    }

    pub fn best(&self) -> Option<&RankedEntry> {
        self.entries.first()
    }

    pub fn entries(&self) -> &[RankedEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<RankedEntry> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    fn sort_entries(&mut self) {
        self.entries.sort_by(RankedEntry::rank_cmp);
    }
}
