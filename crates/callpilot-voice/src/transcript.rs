//! Positional diffing of transcript snapshots.

use callpilot_types::{TranscriptChange, TranscriptEntry};

/// Remembers the last transcript snapshot of a session.
#[derive(Debug, Clone, Default)]
pub struct TranscriptDiff {
    previous: Vec<TranscriptEntry>,
}

impl TranscriptDiff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compares `snapshot` entry by entry with the previous one and returns
    /// the entries that are new or whose content changed.
    pub fn apply(&mut self, snapshot: Vec<TranscriptEntry>) -> Vec<TranscriptChange> {
        let changes = snapshot
            .iter()
            .enumerate()
            .filter(|(index, entry)| self.previous.get(*index) != Some(*entry))
            .map(|(index, entry)| TranscriptChange {
                index,
                entry: entry.clone(),
            })
            .collect();
        self.previous = snapshot;
        changes
    }

    pub fn snapshot(&self) -> &[TranscriptEntry] {
        &self.previous
    }

    pub fn reset(&mut self) {
        self.previous.clear();
    }
}
