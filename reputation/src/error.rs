//! Error type definitions for the reputation module.

use failure::Fail;
use std::fmt;

use crate::trs::{Address, Alpha, Epoch, Reputation};

/// The error type for operations of the reputation engine
#[derive(Debug, PartialEq, Eq, Fail)]
pub enum ReputationError {
    /// Proposed epoch for updating is not later than the current one
    #[fail(
        display = "Proposed epoch for updating ({}) is not later than current ({})",
        new_epoch, current_epoch
    )]
    InvalidUpdateEpoch {
        /// Epoch the caller asked to process
        new_epoch: Epoch,
        /// Last epoch the engine processed
        current_epoch: Epoch,
    },
    /// An expired packet subtracts more reputation than its identity holds
    #[fail(
        display = "Reputation of identity {} would become negative after expiring",
        address
    )]
    NegativeReputation {
        /// Identity whose cached reputation underflowed
        address: Address,
    },
    /// The expiry queue does not hold enough packets to cover a penalization
    #[fail(
        display = "The expiry queue is missing {} reputation points of penalized identity {}",
        missing, address
    )]
    InconsistentQueue {
        /// Identity being penalized
        address: Address,
        /// Amount the packets failed to account for
        missing: u64,
    },
    /// A loaded snapshot's identity map disagrees with its expiry queue
    #[fail(display = "Snapshot identities do not match the reputation in its expiry queue")]
    MismatchedSnapshot,
}

/// Received an alpha < max_alpha
#[derive(Debug, PartialEq, Eq)]
pub struct NonSortedAlpha {
    /// The expiration of the packet that could not be inserted
    pub alpha: Alpha,
    /// The highest expiration in the queue
    pub max_alpha: Alpha,
}

impl fmt::Display for NonSortedAlpha {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Received an alpha < max_alpha: {:?} < {:?}",
            self.alpha, self.max_alpha
        )
    }
}

impl Fail for NonSortedAlpha {}

/// Error in the penalization function
#[derive(Debug, PartialEq, Eq)]
pub struct RepError {
    /// Reputation before applying the penalization function
    pub old_rep: Reputation,
    /// Reputation the penalization function tried to leave
    pub new_rep: Reputation,
}

impl fmt::Display for RepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Penalization function returned more reputation than allowed: {:?} > {:?}",
            self.new_rep, self.old_rep
        )
    }
}

impl Fail for RepError {}
