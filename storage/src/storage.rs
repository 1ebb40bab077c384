//! # Storage
//!
//! Generic `ExplorerStorage` trait that can be implemented for different
//! specific storage backends.
use std::{fmt, result};

/// Result with error set to `failure::Error`
pub type Result<T> = result::Result<T, failure::Error>;

/// Block slot index used as the engine clock
pub type Epoch = u32;

/// Kind of reputation change recorded in the `reputation` table
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum DeltaKind {
    /// Reputation distributed to an honest identity
    Gain,
    /// Reputation slashed from a lying identity
    Lie,
    /// Reputation that crossed its expiration threshold
    Expire,
}

impl fmt::Display for DeltaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            DeltaKind::Gain => "gain",
            DeltaKind::Lie => "lie",
            DeltaKind::Expire => "expire",
        };
        f.write_str(kind)
    }
}

/// One row of the append-only `reputation` table
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReputationDelta {
    /// Identity address
    pub address: String,
    /// Epoch at which the change happened
    pub epoch: Epoch,
    /// Signed amount of reputation points
    pub amount: i64,
    /// Kind of change
    pub kind: DeltaKind,
}

/// One row of the `trs` table: the full reputation set at one epoch, with
/// identities stored as compact integer ids to keep rows small
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TrsRow {
    /// Epoch this row describes (primary key)
    pub epoch: Epoch,
    /// Ids of the identities, parallel to `reputations`
    pub address_ids: Vec<u64>,
    /// Reputation of each identity, parallel to `address_ids`
    pub reputations: Vec<u64>,
}

/// Generic trait that exposes the three reputation tables of the explorer
/// database: `addresses`, `reputation` and `trs`.
///
/// This trait can be easily implemented for any specific storage backend
/// solution (relational databases, volatile memory, etc.)
pub trait ExplorerStorage {
    /// Return every `(address, id)` pair of the `addresses` table
    fn addresses(&self) -> Result<Vec<(String, u64)>>;

    /// Bulk insert addresses, assigning a stable id to each new one.
    /// Addresses already present keep their id (upsert on the primary key).
    fn insert_addresses(&mut self, addresses: &[String]) -> Result<()>;

    /// Append a batch of rows to the `reputation` table, preserving order
    fn insert_reputation_deltas(&mut self, deltas: &[ReputationDelta]) -> Result<()>;

    /// Insert the full reputation set for one epoch (upsert on `epoch`)
    fn insert_trs(&mut self, row: TrsRow) -> Result<()>;

    /// Return the `trs` row for the given epoch, if any
    fn trs(&self, epoch: Epoch) -> Result<Option<TrsRow>>;
}
