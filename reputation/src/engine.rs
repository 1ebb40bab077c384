//! Reputation engine: the epoch by epoch accounting of the Total Reputation
//! Set.
//!
//! Every epoch the caller hands in how often each identity revealed, matched
//! the tally consensus, errored or lied, and the engine expires old
//! reputation, issues new reputation (one point per witnessing act until the
//! issuance ceiling), slashes liars and distributes the resulting bounty
//! evenly over the honest identities. The engine records every change in the
//! delta journal and pushes the full reputation set to the store once per
//! processed epoch.

use std::{
    cmp,
    collections::HashMap,
    convert::TryFrom,
    fmt,
    path::Path,
};

use itertools::Itertools;

use witnet_explorer_storage::storage::{DeltaKind, ExplorerStorage, TrsRow};

use crate::addresses::AddressBook;
use crate::eligibility::calculate_eligibilities;
use crate::error::ReputationError;
use crate::journal::ReputationJournal;
use crate::snapshot::{self, Snapshot};
use crate::trs::{
    penalize_factor, Address, Alpha, Epoch, Reputation, TotalReputationSet,
};

/// Ceiling on cumulative reputation issuance
pub const REPUTATION_ISSUANCE_STOP: u64 = 1 << 20;
/// Fraction of its reputation an identity keeps per lie
pub const PENALIZATION_FACTOR: f64 = 0.5;
/// Number of witnessing acts before a reputation packet expires
pub const REPUTATION_EXPIRATION: u64 = 20_000;

/// Identities counted with their multiplicity during one epoch
pub type IdentityCount = HashMap<Address, u32>;

/// Amount of reputation issued when the witnessing act counter moves from
/// `old_alpha` to `new_alpha`: one point per act, until the counter reaches
/// `REPUTATION_ISSUANCE_STOP`
pub fn reputation_issuance(old_alpha: Alpha, new_alpha: Alpha) -> Reputation {
    if old_alpha.0 >= REPUTATION_ISSUANCE_STOP {
        // Don't create new reputation
        Reputation(0)
    } else {
        // Create new reputation up to the total amount the system is allowed
        // to create
        let new = cmp::min(REPUTATION_ISSUANCE_STOP, new_alpha.0);
        Reputation(new - old_alpha.0)
    }
}

// Identities which reveal multiple times during one epoch only receive one
// slice of reputation, so only their presence matters here
fn filter_honest_identities(
    honest: &IdentityCount,
    errors: &IdentityCount,
    liars: &IdentityCount,
) -> Vec<Address> {
    honest
        .iter()
        .filter(|(address, truths)| {
            liars.get(*address).copied().unwrap_or(0) == 0
                && **truths >= errors.get(*address).copied().unwrap_or(0)
        })
        .map(|(address, _truths)| address.clone())
        .sorted()
        .collect()
}

/// Running maxima over every update cycle processed by this engine
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct EngineStats {
    /// Largest reputation reward handed to a single identity in one epoch
    pub max_reputation_distributed: Reputation,
    /// Largest reputation slash applied to a single identity in one epoch
    pub max_reputation_slashed: Reputation,
}

impl fmt::Display for EngineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Maximum reputation distributed to a single identity: {}",
            self.max_reputation_distributed.0
        )?;
        write!(
            f,
            "Maximum reputation slashed from a single identity: {}",
            self.max_reputation_slashed.0
        )
    }
}

/// Accounting summary of one update cycle
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct UpdateResult {
    /// Number of witnessing acts before the update
    pub old_alpha: Alpha,
    /// Witnessing acts added by this epoch
    pub new_witnessing_acts: u64,
    /// Leftover reputation from the previous epoch
    pub extra_rep_previous_epoch: Reputation,
    /// Reputation that expired
    pub expired_rep: Reputation,
    /// Reputation that was created
    pub issued_rep: Reputation,
    /// Reputation subtracted from dishonest identities
    pub penalized_rep: Reputation,
    /// Total reputation that can be divided amongst all the honest identities
    pub reputation_bounty: Reputation,
    /// Reputation gained by each honest identity
    pub rep_reward: Reputation,
    /// Number of honest identities
    pub num_honest: u32,
    /// Leftover reputation for the next epoch
    pub extra_reputation: Reputation,
}

/// Reputation set reconstructed from the store for one epoch, with relative
/// eligibilities expressed as percentages
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrsReport {
    /// Epoch of the row the report was built from (zero when none was found)
    pub epoch: Epoch,
    /// `(address, reputation, eligibility %)` sorted by reputation descending
    pub identities: Vec<(Address, Reputation, f64)>,
    /// Sum of all the reputation in the set
    pub total_reputation: Reputation,
}

/// Reputation Engine
///
/// Tracks the Total Reputation Set across epochs: it owns the identity map
/// and the expiry queue, the undistributed leftover, the witnessing act
/// counter, and the journal and address book used to push each epoch's
/// accounting to the injected store.
#[derive(Debug)]
pub struct ReputationEngine<S: ExplorerStorage> {
    storage: S,
    trs: TotalReputationSet,
    witnessing_acts: Alpha,
    leftover_reputation: Reputation,
    epoch: Epoch,
    journal: ReputationJournal,
    addresses: AddressBook,
    stats: EngineStats,
    first_update: bool,
}

impl<S: ExplorerStorage> ReputationEngine<S> {
    /// Fresh engine with all counters at zero
    pub fn new(storage: S) -> Result<Self, failure::Error> {
        let mut engine = Self {
            storage,
            trs: TotalReputationSet::new(),
            witnessing_acts: Alpha(0),
            leftover_reputation: Reputation(0),
            epoch: 0,
            journal: ReputationJournal::new(),
            addresses: AddressBook::new(),
            stats: EngineStats::default(),
            first_update: false,
        };
        // Get an initial id to address mapping
        engine.addresses.refresh(&engine.storage)?;

        Ok(engine)
    }

    /// Restore an engine from a snapshot, verifying that its identity map
    /// matches the reputation aggregated from its expiry queue
    pub fn from_snapshot(snapshot: Snapshot, storage: S) -> Result<Self, failure::Error> {
        let trs = TotalReputationSet::from_queue(
            snapshot.reputation_expiry.iter().map(|(alpha, diff)| {
                (
                    *alpha,
                    diff.iter().map(|(address, rep)| (address.clone(), *rep)),
                )
            }),
        )?;

        if trs.num_identities() != snapshot.identities.len()
            || snapshot
                .identities
                .iter()
                .any(|(address, rep)| trs.get(address) != *rep)
        {
            return Err(ReputationError::MismatchedSnapshot.into());
        }

        let mut engine = Self {
            storage,
            trs,
            witnessing_acts: snapshot.witnessing_acts,
            leftover_reputation: snapshot.leftover_reputation,
            epoch: snapshot.epoch,
            journal: ReputationJournal::new(),
            addresses: AddressBook::new(),
            stats: EngineStats::default(),
            first_update: true,
        };
        engine.addresses.refresh(&engine.storage)?;

        Ok(engine)
    }

    /// Load an engine from the snapshot file at `path`. A missing file logs
    /// a warning and yields a fresh engine.
    pub fn load(path: &Path, storage: S) -> Result<Self, failure::Error> {
        match snapshot::load(path)? {
            Some(snapshot) => Self::from_snapshot(snapshot, storage),
            None => {
                log::warn!(
                    "The supplied TRS snapshot file does not exist, initializing all data to zero"
                );
                Self::new(storage)
            }
        }
    }

    /// The Total Reputation Set as of the last processed epoch
    pub fn trs(&self) -> &TotalReputationSet {
        &self.trs
    }

    /// Last epoch the engine processed
    pub fn current_epoch(&self) -> Epoch {
        self.epoch
    }

    /// Total witnessing acts seen so far
    pub fn current_alpha(&self) -> Alpha {
        self.witnessing_acts
    }

    /// Reputation left undistributed by the last processed epoch
    pub fn leftover_reputation(&self) -> Reputation {
        self.leftover_reputation
    }

    /// Running maxima over all processed epochs
    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// The injected store
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Advance the engine by one epoch.
    ///
    /// `revealing`, `honest`, `errors` and `liars` count how many times each
    /// identity revealed, matched the tally consensus, errored or lied
    /// during `epoch`. The order of the accounting steps is part of the
    /// protocol: expiry runs against the pre-update counter, issuance is
    /// capped, penalties feed the bounty distributed to honest identities,
    /// and the undistributed remainder carries over to the next epoch.
    pub fn update(
        &mut self,
        epoch: Epoch,
        revealing: &IdentityCount,
        honest: &IdentityCount,
        errors: &IdentityCount,
        liars: &IdentityCount,
    ) -> Result<UpdateResult, failure::Error> {
        if epoch <= self.epoch {
            return Err(ReputationError::InvalidUpdateEpoch {
                new_epoch: epoch,
                current_epoch: self.epoch,
            }
            .into());
        }

        // A snapshot persisted long before the first live update deserves a
        // heads up, since every skipped epoch gets accounted as a gap
        if self.first_update && epoch - self.epoch > 10 {
            log::warn!(
                "TRS snapshot was persisted at epoch {}, first update is at {}",
                self.epoch,
                epoch
            );
        }
        self.first_update = false;

        // The received epochs are not sequential: run the expiry cycle of
        // the skipped epoch before processing the new one
        if self.epoch != 0 && epoch > self.epoch + 1 {
            self.expire_in_next_epoch()?;
            // Remove all zero-reputation identities
            self.trs.clean();
            // Save the TRS with expired reputation to the store
            self.insert_trs_row(self.epoch + 1)?;
        }
        if self.epoch != 0 && epoch > self.epoch + 2 {
            log::debug!(
                "{} -- {} from previous epoch + 0 expired + 0 issued + 0 penalized = {}",
                self.epoch + 2,
                self.leftover_reputation.0,
                self.leftover_reputation.0
            );
        }

        // Do not update this earlier: the phantom expiry above still
        // requires the old epoch
        self.epoch = epoch;

        let honest_identities = filter_honest_identities(honest, errors, liars);

        // Calculate witnessing acts for this epoch
        let new_witnessing_acts: u64 = revealing.values().map(|count| u64::from(*count)).sum();
        let old_alpha = self.witnessing_acts;
        let new_alpha = Alpha(old_alpha.0 + new_witnessing_acts);
        log::debug!(
            "{} -- Witnessing acts: Total {} + new {}",
            self.epoch,
            old_alpha.0,
            new_witnessing_acts
        );

        // Expire against the pre-update counter: reputation whose threshold
        // falls inside this epoch's acts stays until the next epoch
        let expired_rep = self.expire_reputation(self.epoch)?;

        // There is some reputation issued for every witnessing act
        let issued_rep = reputation_issuance(old_alpha, new_alpha);

        // Penalize liars and accumulate the reputation
        let penalized_rep = self.penalize_liars(liars)?;

        // Calculate the total bounty to distribute
        let extra_rep_previous_epoch = self.leftover_reputation;
        let mut reputation_bounty = extra_rep_previous_epoch;
        reputation_bounty += expired_rep;
        reputation_bounty += issued_rep;
        reputation_bounty += penalized_rep;
        log::debug!(
            "{} -- {} from previous epoch + {} expired + {} issued + {} penalized = {}",
            self.epoch,
            extra_rep_previous_epoch.0,
            expired_rep.0,
            issued_rep.0,
            penalized_rep.0,
            reputation_bounty.0
        );

        // Distribute the bounty evenly over all honest identities
        let num_honest = u32::try_from(honest_identities.len()).unwrap();
        let mut rep_reward = Reputation(0);
        let mut gained_rep = Reputation(0);
        if num_honest > 0 {
            let reward = Reputation(reputation_bounty.0 / u64::from(num_honest));
            if reward > Reputation(0) {
                // All the reputation earned in this epoch expires at once
                let expire_alpha = Alpha(new_alpha.0 + REPUTATION_EXPIRATION);
                for address in &honest_identities {
                    log::debug!(
                        "{} -- {} reputation score has increased by {} points",
                        self.epoch,
                        address,
                        reward.0
                    );
                    self.journal
                        .append(address.clone(), self.epoch, reward.0 as i64, DeltaKind::Gain);
                }
                self.trs.gain(
                    expire_alpha,
                    honest_identities
                        .iter()
                        .map(|address| (address.clone(), reward)),
                )?;

                if reward > self.stats.max_reputation_distributed {
                    self.stats.max_reputation_distributed = reward;
                }

                rep_reward = reward;
                gained_rep = Reputation(reward.0 * u64::from(num_honest));
            }
        }

        // Leftover reputation to distribute next epoch
        self.leftover_reputation = Reputation(reputation_bounty.0 - gained_rep.0);

        // Update the amount of witnessing acts
        self.witnessing_acts = new_alpha;

        // Remove all zero-reputation identities
        self.trs.clean();

        // Push this epoch's accounting to the store: the delta batch first,
        // then the full reputation set
        self.journal.flush(&mut self.storage)?;
        self.insert_trs_row(self.epoch)?;

        Ok(UpdateResult {
            old_alpha,
            new_witnessing_acts,
            extra_rep_previous_epoch,
            expired_rep,
            issued_rep,
            penalized_rep,
            reputation_bounty,
            rep_reward,
            num_honest,
            extra_reputation: self.leftover_reputation,
        })
    }

    /// Reconstruct the reputation set as of `epoch` from the store, walking
    /// back to the closest persisted row. Returns an empty report when no
    /// row exists at or before `epoch`.
    pub fn get_trs(&mut self, epoch: Epoch) -> Result<TrsReport, failure::Error> {
        let mut e = epoch;
        let row = loop {
            match self.storage.trs(e)? {
                Some(row) => break Some(row),
                None if e <= 1 => break None,
                None => e -= 1,
            }
        };

        let row = match row {
            Some(row) => row,
            None => return Ok(TrsReport::default()),
        };

        let addresses = self.addresses.resolve_ids(&row.address_ids, &self.storage)?;
        let identities: HashMap<Address, Reputation> = addresses
            .into_iter()
            .zip(row.reputations.iter().map(|rep| Reputation(*rep)))
            .collect();
        let total_reputation = Reputation(identities.values().map(|rep| rep.0).sum());

        let eligibilities = calculate_eligibilities(&identities);
        let identities = identities
            .into_iter()
            .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)))
            .map(|(address, reputation)| {
                let eligibility = eligibilities.get(&address).copied().unwrap_or(0.0) * 100.0;
                (address, reputation, eligibility)
            })
            .collect();

        Ok(TrsReport {
            epoch: row.epoch,
            identities,
            total_reputation,
        })
    }

    /// Value copy of the full engine state, with fixed key order
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            witnessing_acts: self.witnessing_acts,
            leftover_reputation: self.leftover_reputation,
            reputation_expiry: self
                .trs
                .queue()
                .map(|(alpha, diff)| {
                    (
                        *alpha,
                        diff.map(|(address, rep)| (address.clone(), *rep)).collect(),
                    )
                })
                .collect(),
            epoch: self.epoch,
            identities: self
                .trs
                .identities()
                .map(|(address, rep)| (address.clone(), *rep))
                .collect(),
        }
    }

    /// Persist the full engine state to the snapshot file at `path`
    pub fn persist(&self, path: &Path) -> Result<(), failure::Error> {
        snapshot::persist(path, &self.snapshot())
    }

    // Subtract every packet with a threshold at or below the current
    // witnessing act counter, recording one journal entry per packet entry
    fn expire_reputation(&mut self, epoch: Epoch) -> Result<Reputation, failure::Error> {
        let expired = self.trs.expire(&self.witnessing_acts)?;

        let mut total = Reputation(0);
        for (address, amount) in expired {
            total += amount;
            log::debug!(
                "{} -- {} reputation expired for {}",
                epoch,
                amount.0,
                address
            );
            self.journal
                .append(address, epoch, -(amount.0 as i64), DeltaKind::Expire);
        }

        Ok(total)
    }

    // Run the expiry cycle of the next epoch ahead of time, carrying
    // whatever expires into the leftover
    fn expire_in_next_epoch(&mut self) -> Result<(), failure::Error> {
        log::debug!("Expiring reputation in next epoch");
        let expired = self.expire_reputation(self.epoch + 1)?;
        if expired > Reputation(0) {
            log::debug!(
                "{} -- {} from previous epoch + {} expired + 0 issued + 0 penalized = {}",
                self.epoch + 1,
                self.leftover_reputation.0,
                expired.0,
                self.leftover_reputation.0 + expired.0
            );
            self.leftover_reputation += expired;
        }

        Ok(())
    }

    // Slash every liar: a liar keeps `PENALIZATION_FACTOR ^ lies` of its
    // reputation, subtracted from its most recently earned packets
    fn penalize_liars(&mut self, liars: &IdentityCount) -> Result<Reputation, failure::Error> {
        let mut total = Reputation(0);
        for (address, num_lies) in liars.iter().sorted_by(|a, b| a.0.cmp(b.0)) {
            if self.trs.get(address) == Reputation(0) {
                continue;
            }

            let subtracted = self
                .trs
                .penalize(address, penalize_factor(PENALIZATION_FACTOR, *num_lies))?;
            if subtracted > Reputation(0) {
                log::debug!(
                    "{} -- The reputation score of {} has been slashed by {} points",
                    self.epoch,
                    address,
                    subtracted.0
                );
                self.journal.append(
                    address.clone(),
                    self.epoch,
                    -(subtracted.0 as i64),
                    DeltaKind::Lie,
                );
                if subtracted > self.stats.max_reputation_slashed {
                    self.stats.max_reputation_slashed = subtracted;
                }
                total += subtracted;
            }
        }

        Ok(total)
    }

    // The `trs` table stores identities as compact integer ids: make sure
    // every address has one, then emit the parallel arrays sorted by address
    fn insert_trs_row(&mut self, epoch: Epoch) -> Result<(), failure::Error> {
        let identities: Vec<(&Address, Reputation)> = self
            .trs
            .identities()
            .map(|(address, rep)| (address, *rep))
            .sorted_by(|a, b| a.0.cmp(b.0))
            .collect();

        self.addresses.ensure_ids(
            identities.iter().map(|(address, _rep)| *address),
            &mut self.storage,
        )?;

        let mut address_ids = Vec::with_capacity(identities.len());
        let mut reputations = Vec::with_capacity(identities.len());
        for (address, reputation) in identities {
            let id = self.addresses.id(address).ok_or_else(|| {
                failure::format_err!("Address {} is missing from the addresses table", address)
            })?;
            address_ids.push(id);
            reputations.push(reputation.0);
        }

        self.storage.insert_trs(TrsRow {
            epoch,
            address_ids,
            reputations,
        })?;
        log::debug!("Inserted the TRS for epoch {}", epoch);

        Ok(())
    }
}
