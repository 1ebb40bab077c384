//! Storage backend that keeps the reputation tables in heap-allocated maps.
//!
//! Please note that this backend lacks persistence. It mirrors the semantics
//! of the relational schema (sequential address ids, append-only reputation
//! rows, one `trs` row per epoch) and is mainly useful for tests.

use std::collections::{BTreeMap, HashMap};

use crate::storage::{Epoch, ExplorerStorage, ReputationDelta, Result, TrsRow};

/// In-memory rendition of the explorer's reputation tables.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InMemoryStorage {
    /// The `addresses` table: address to assigned id
    pub addresses: HashMap<String, u64>,
    /// The append-only `reputation` table
    pub reputation: Vec<ReputationDelta>,
    /// The `trs` table, keyed by epoch
    pub trs: BTreeMap<Epoch, TrsRow>,
}

impl InMemoryStorage {
    /// Builds a new storage with all three tables empty
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExplorerStorage for InMemoryStorage {
    fn addresses(&self) -> Result<Vec<(String, u64)>> {
        Ok(self
            .addresses
            .iter()
            .map(|(address, id)| (address.clone(), *id))
            .collect())
    }

    fn insert_addresses(&mut self, addresses: &[String]) -> Result<()> {
        let mut inserted = 0;
        for address in addresses {
            if !self.addresses.contains_key(address) {
                // Ids are assigned sequentially starting at 1, like a serial
                // primary key. Rows are never deleted.
                let id = self.addresses.len() as u64 + 1;
                self.addresses.insert(address.clone(), id);
                inserted += 1;
            }
        }
        log::debug!("Inserted {} addresses", inserted);

        Ok(())
    }

    fn insert_reputation_deltas(&mut self, deltas: &[ReputationDelta]) -> Result<()> {
        self.reputation.extend_from_slice(deltas);

        Ok(())
    }

    fn insert_trs(&mut self, row: TrsRow) -> Result<()> {
        self.trs.insert(row.epoch, row);

        Ok(())
    }

    fn trs(&self, epoch: Epoch) -> Result<Option<TrsRow>> {
        Ok(self.trs.get(&epoch).cloned())
    }
}
