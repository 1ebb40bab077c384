//! Write buffer for the per-epoch reputation changes pushed to the
//! `reputation` table.

use witnet_explorer_storage::storage::{DeltaKind, ExplorerStorage, ReputationDelta, Result};

use crate::trs::{Address, Epoch};

/// Buffer of reputation changes. Records are appended in memory while an
/// update cycle runs and flushed to the store as one batch at the end.
#[derive(Debug, Default)]
pub struct ReputationJournal {
    deltas: Vec<ReputationDelta>,
}

impl ReputationJournal {
    /// Empty journal
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer one reputation change
    pub fn append(&mut self, address: Address, epoch: Epoch, amount: i64, kind: DeltaKind) {
        log::debug!(
            "Inserting {} reputation difference ({}) for address {} at epoch {}",
            amount,
            kind,
            address,
            epoch
        );
        self.deltas.push(ReputationDelta {
            address,
            epoch,
            amount,
            kind,
        });
    }

    /// Number of buffered records
    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    /// True when no records are buffered
    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    /// Insert the whole buffer into the store as a single batch, preserving
    /// append order. The buffer is cleared only after the insert succeeds, so
    /// a failed flush can be retried.
    pub fn flush<S: ExplorerStorage>(&mut self, storage: &mut S) -> Result<usize> {
        if self.deltas.is_empty() {
            return Ok(0);
        }

        storage.insert_reputation_deltas(&self.deltas)?;
        let inserted = self.deltas.len();
        log::debug!("Inserted {} reputation differences", inserted);
        self.deltas.clear();

        Ok(inserted)
    }
}
