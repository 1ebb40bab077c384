//! Mapping between identity addresses and the compact integer ids assigned
//! by the `addresses` table.

use std::collections::HashMap;

use witnet_explorer_storage::storage::{ExplorerStorage, Result};

use crate::trs::Address;

/// Local cache of the `addresses` table, kept in both directions.
///
/// Ids are assigned by the store; both directions are rebuilt together on
/// every refresh so they cannot drift apart.
#[derive(Debug, Default)]
pub struct AddressBook {
    address_to_id: HashMap<Address, u64>,
    id_to_address: HashMap<u64, Address>,
}

impl AddressBook {
    /// Empty address book
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of known addresses
    pub fn len(&self) -> usize {
        self.address_to_id.len()
    }

    /// True when no address is known
    pub fn is_empty(&self) -> bool {
        self.address_to_id.is_empty()
    }

    /// Id assigned to `address`, if known
    pub fn id(&self, address: &str) -> Option<u64> {
        self.address_to_id.get(address).copied()
    }

    /// Address assigned to `id`, if known
    pub fn address(&self, id: u64) -> Option<&Address> {
        self.id_to_address.get(&id)
    }

    /// Reload the whole mapping from the store
    pub fn refresh<S: ExplorerStorage>(&mut self, storage: &S) -> Result<()> {
        self.address_to_id.clear();
        self.id_to_address.clear();
        for (address, id) in storage.addresses()? {
            self.address_to_id.insert(address.clone(), id);
            self.id_to_address.insert(id, address);
        }

        Ok(())
    }

    /// Make sure every address in `addresses` has an id, bulk inserting the
    /// unknown ones and refreshing the local mapping afterwards
    pub fn ensure_ids<'a, S, I>(&mut self, addresses: I, storage: &mut S) -> Result<()>
    where
        S: ExplorerStorage,
        I: IntoIterator<Item = &'a Address>,
    {
        let to_insert: Vec<String> = addresses
            .into_iter()
            .filter(|address| !self.address_to_id.contains_key(*address))
            .cloned()
            .collect();

        if !to_insert.is_empty() {
            storage.insert_addresses(&to_insert)?;
            self.refresh(storage)?;
        }

        Ok(())
    }

    /// Resolve a list of ids to addresses, refreshing the mapping when an id
    /// is unknown. Ids still missing after a refresh are an error.
    pub fn resolve_ids<S: ExplorerStorage>(
        &mut self,
        ids: &[u64],
        storage: &S,
    ) -> Result<Vec<Address>> {
        if ids.iter().any(|id| !self.id_to_address.contains_key(id)) {
            log::warn!("Not all ids were found in the id to address mapping");
            self.refresh(storage)?;
        }

        ids.iter()
            .map(|id| {
                self.id_to_address.get(id).cloned().ok_or_else(|| {
                    failure::format_err!("Id {} is missing from the addresses table", id)
                })
            })
            .collect()
    }
}
