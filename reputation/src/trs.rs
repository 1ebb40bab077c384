//! Total Reputation Set

use std::{
    cmp::Ordering,
    collections::{hash_map::Entry, HashMap, VecDeque},
    fmt, iter,
    ops::{AddAssign, SubAssign},
};

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::{NonSortedAlpha, RepError, ReputationError};

/// Identity address as rendered by the node. Treated as an opaque key,
/// never parsed.
pub type Address = String;

/// Block slot index used as the engine clock
pub use witnet_explorer_storage::storage::Epoch;

/// Amount of reputation points held by an identity. Never negative.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Ord, PartialEq, PartialOrd, Serialize,
)]
pub struct Reputation(pub u64);

impl AddAssign for Reputation {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0
    }
}

impl SubAssign for Reputation {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0
    }
}

/// Total number of witnessing acts seen since genesis, used as the clock for
/// reputation expiration
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Ord, PartialEq, PartialOrd, Serialize,
)]
pub struct Alpha(pub u64);

impl AddAssign for Alpha {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0
    }
}

/// Returns the penalization function for an identity that lied `num_lies`
/// times: it keeps `factor ^ num_lies` of its current reputation, rounded
/// down.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn penalize_factor(factor: f64, num_lies: u32) -> impl Fn(Reputation) -> Reputation {
    move |Reputation(r)| Reputation((r as f64 * factor.powf(f64::from(num_lies))) as u64)
}

/// Total Reputation Set
///
/// This data structure keeps track of the total reputation associated to
/// every identity. Reputation is issued in "packets" which expire once the
/// witnessing act counter crosses their threshold. In order to keep track of
/// what to expire and when, the reputation packets are stored in a queue
/// ordered by expiration.
///
/// The method `gain(alpha, vec![(id1, diff1)])` will add a packet with value
/// `diff1` to identity `id1`, which will expire at time `alpha`.
///
/// The method `expire(alpha)` will invalidate all the reputation packets with
/// `expiration_time <= alpha`.
///
/// The method `penalize(id, f)` will apply a penalization function `f` to an
/// identity `id`. The penalization amount will be subtracted from the most
/// recent reputation packets (those which will expire later).
#[derive(Clone, Debug, Default)]
pub struct TotalReputationSet {
    // A cache of <identity: total_reputation>
    // All the identities with reputation are in the cache: identities
    // not in the cache must have null reputation
    map: HashMap<Address, Reputation>,
    // The list of reputation packets ordered by expiration
    queue: VecDeque<(Alpha, HashMap<Address, Reputation>)>,
}

impl TotalReputationSet {
    /// Builds a new empty Trs
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a new Trs from an ordered list of packets
    pub fn from_queue<I1, I2>(queue: I1) -> Result<Self, NonSortedAlpha>
    where
        I1: IntoIterator<Item = (Alpha, I2)>,
        I2: IntoIterator<Item = (Address, Reputation)>,
    {
        let mut trs = Self::new();
        for (alpha, diff) in queue {
            trs.gain(alpha, diff)?;
        }

        Ok(trs)
    }

    /// Provides an iterator over the underlying queue
    pub fn queue(
        &self,
    ) -> impl Iterator<Item = (&Alpha, impl Iterator<Item = (&Address, &Reputation)>)> {
        self.queue.iter().map(|(a, h)| (a, h.iter()))
    }

    /// Insert reputation packets with expiration
    pub fn gain<I>(&mut self, expiration: Alpha, diff: I) -> Result<(), NonSortedAlpha>
    where
        I: IntoIterator<Item = (Address, Reputation)>,
    {
        let zero = Reputation(0);
        match self.queue.back_mut() {
            Some((max_alpha, _)) if *max_alpha > expiration => {
                // This data structure is designed to work with ordered
                // inserts: a packet cannot expire before the most recent one
                Err(NonSortedAlpha {
                    alpha: expiration,
                    max_alpha: *max_alpha,
                })
            }
            Some((max_alpha, back)) if *max_alpha == expiration => {
                // Insert reputation packets with the same expiration time as
                // the most recent packet: merge the two maps
                for (k, v) in diff.into_iter().filter(|(_k, v)| *v > zero) {
                    // Update identity cache
                    increment_cache(&mut self.map, k.clone(), v);
                    // Merge with previous entry, or insert new
                    *back.entry(k).or_default() += v;
                }
                Ok(())
            }
            _ => {
                // Empty queue or last entry with alpha < expiration: insert new entry
                let mut back: HashMap<Address, Reputation> = HashMap::new();
                for (k, v) in diff.into_iter().filter(|(_k, v)| *v > zero) {
                    // Update identity cache
                    increment_cache(&mut self.map, k.clone(), v);
                    *back.entry(k).or_default() += v;
                }
                self.queue.push_back((expiration, back));
                Ok(())
            }
        }
    }

    /// Expire all the reputation packets with a threshold not above `alpha`.
    /// Returns the drained `(identity, amount)` entries, in queue order and
    /// with the entries of each packet sorted by identity, so the caller can
    /// record every subtraction.
    // This assumes that the queue is sorted by expiration
    pub fn expire(&mut self, alpha: &Alpha) -> Result<Vec<(Address, Reputation)>, ReputationError> {
        let mut expired = vec![];
        while let Some((expiration, _)) = self.queue.front() {
            if expiration > alpha {
                // Done
                break;
            }

            let (_, front) = self.queue.pop_front().unwrap();
            for (k, v) in front.into_iter().sorted_by(|a, b| a.0.cmp(&b.0)) {
                // Update identity cache
                decrement_cache(&mut self.map, k.clone(), v)
                    .map_err(|_| ReputationError::NegativeReputation { address: k.clone() })?;
                expired.push((k, v));
            }
        }

        Ok(expired)
    }

    /// Penalize one identity. It is always preferred to use `penalize_many`,
    /// when possible. `next_v` is a function that given the total reputation
    /// of an identity, returns the reputation remaining after the
    /// penalization.
    pub fn penalize<F>(&mut self, id: &Address, next_v: F) -> Result<Reputation, failure::Error>
    where
        F: FnMut(Reputation) -> Reputation,
    {
        self.penalize_many(iter::once((id, next_v)))
    }

    /// The more efficient version of `penalize`.
    pub fn penalize_many<'a, F, I>(&mut self, ids_fs: I) -> Result<Reputation, failure::Error>
    where
        F: FnMut(Reputation) -> Reputation,
        I: IntoIterator<Item = (&'a Address, F)>,
    {
        let mut total_subtracted = Reputation(0);
        let mut to_subtract = ids_fs
            .into_iter()
            .filter_map(|(id, mut next_v)| {
                let mut old_v = self.get(id);
                // next_v returns the new value of v
                let new_v = next_v(self.get(id));
                match new_v.cmp(&old_v) {
                    Ordering::Greater => {
                        // Overflow: return error
                        Some(Err(RepError {
                            old_rep: old_v,
                            new_rep: new_v,
                        }))
                    }
                    Ordering::Equal => {
                        // When there is no reputation to subtract, we can skip this identity
                        None
                    }
                    Ordering::Less => {
                        old_v -= new_v;
                        let ts = old_v;
                        total_subtracted += ts;
                        // Update cache. Cannot fail because we just checked for overflow
                        decrement_cache(&mut self.map, id.clone(), ts).unwrap();
                        Some(Ok((id.clone(), ts)))
                    }
                }
            })
            .collect::<Result<HashMap<Address, Reputation>, RepError>>()?;

        // Iterate back to front
        for (_, rep_diff) in self.queue.iter_mut().rev() {
            Self::expire_packets(rep_diff, &mut to_subtract);
            // All the identities have been penalized, done
            if to_subtract.is_empty() {
                break;
            }
        }

        // The queue no longer holds enough packets to cover the penalization:
        // upstream classification went out of sync with this state
        if let Some((address, missing)) = to_subtract.into_iter().next() {
            return Err(ReputationError::InconsistentQueue {
                address,
                missing: missing.0,
            }
            .into());
        }

        Ok(total_subtracted)
    }

    fn expire_packets(
        rep_diff: &mut HashMap<Address, Reputation>,
        to_subtract: &mut HashMap<Address, Reputation>,
    ) {
        // Retain those identities which still have some reputation to lose.
        // Here we are essentially operating on the intersection of the two
        // maps, removing some elements which pertain to both maps.
        // Iterate over the map with fewer elements:
        if to_subtract.len() < rep_diff.len() {
            to_subtract.retain(|id, ts| {
                if let Entry::Occupied(mut x) = rep_diff.entry(id.clone()) {
                    let (retain_rep_diff, retain_ts) = Self::spend_packet(x.get_mut(), ts);
                    if !retain_rep_diff {
                        x.remove();
                    }
                    retain_ts
                } else {
                    // This identity has not gained any reputation packet in this alpha, retain
                    true
                }
            });
        } else {
            rep_diff.retain(|id, x| {
                if let Entry::Occupied(mut ts) = to_subtract.entry(id.clone()) {
                    let (retain_rep_diff, retain_ts) = Self::spend_packet(x, ts.get_mut());
                    if !retain_ts {
                        ts.remove();
                    }
                    retain_rep_diff
                } else {
                    // This identity does not need to be penalized, retain
                    true
                }
            });
        }
    }

    // Subtract `ts` from packet entry `x`. Returns (retain_x, retain_ts).
    // if x > ts, keep the entry but remove `ts`
    // if x == ts, remove both
    // if x < ts, remove the entry but keep `ts`
    fn spend_packet(x: &mut Reputation, ts: &mut Reputation) -> (bool, bool) {
        match (*x).cmp(ts) {
            Ordering::Greater => {
                // Mutate this entry, subtracting the required value
                *x -= *ts;
                (true, false)
            }
            Ordering::Equal => (false, false),
            Ordering::Less => {
                // Remove this entry and decrease the remaining value to subtract
                *ts -= *x;
                (false, true)
            }
        }
    }

    /// Get the reputation for this identity.
    /// If the identity does not exist, return null reputation.
    pub fn get(&self, id: &str) -> Reputation {
        self.map.get(id).copied().unwrap_or_default()
    }

    /// Get the sum of the reputation of many identities.
    /// If an identity does not exist, it counts as null reputation.
    pub fn get_sum<'a, I>(&'a self, ids: I) -> Reputation
    where
        I: IntoIterator<Item = &'a Address>,
    {
        ids.into_iter().fold(Reputation(0), |mut acc, id| {
            acc += self.get(id);
            acc
        })
    }

    /// Get the sum of the reputation of all the identities
    pub fn get_total_sum(&self) -> Reputation {
        self.map.values().fold(Reputation(0), |mut acc, v| {
            acc += *v;
            acc
        })
    }

    /// Get the number of identities with non-null reputation
    pub fn num_identities(&self) -> usize {
        self.map.len()
    }

    /// Iterator over all the identities and their corresponding reputation
    pub fn identities(&self) -> impl Iterator<Item = (&Address, &Reputation)> {
        self.map.iter()
    }

    /// Remove every identity with null reputation from the cache. Calling it
    /// twice in a row leaves the set unchanged.
    pub fn clean(&mut self) {
        self.map.retain(|_id, v| *v > Reputation(0));
    }

    /// Clear the Trs
    pub fn clear(&mut self) {
        self.map.clear();
        self.queue.clear();
    }
}

impl PartialEq for TotalReputationSet {
    fn eq(&self, other: &Self) -> bool {
        // Equality is fully defined by equality of queues
        self.queue == other.queue
    }
}

impl fmt::Display for TotalReputationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self
            .map
            .iter()
            .sorted_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)))
            .map(|(id, rep)| format!("\"{}\": {}", id, rep.0))
            .join(", ");
        write!(f, "{{{}}}", entries)
    }
}

/// Tried to decrement a cache entry when there is not enough to subtract.
#[derive(Copy, Clone, Debug)]
struct InconsistentCacheError;

/// Increment a cache entry
fn increment_cache(map: &mut HashMap<Address, Reputation>, k: Address, v: Reputation) {
    if v != Reputation(0) {
        *map.entry(k).or_default() += v;
    }
}

/// Decrement a cache entry.
/// This function returns an error when there is not enough to subtract,
/// or the identity does not exist
fn decrement_cache(
    map: &mut HashMap<Address, Reputation>,
    k: Address,
    v: Reputation,
) -> Result<(), InconsistentCacheError> {
    if v == Reputation(0) {
        // Decrementing zero always succeeds
        return Ok(());
    }

    if let Entry::Occupied(mut x) = map.entry(k) {
        match x.get().cmp(&v) {
            Ordering::Greater => {
                // Decrement entry
                *x.get_mut() -= v;
                Ok(())
            }
            Ordering::Equal => {
                // Back to null reputation, remove entry from cache
                x.remove_entry();
                Ok(())
            }
            Ordering::Less => {
                // Error: not enough to subtract
                Err(InconsistentCacheError)
            }
        }
    } else {
        // Error: identity does not exist
        Err(InconsistentCacheError)
    }
}
