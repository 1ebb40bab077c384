//! Trapezoidal eligibility distribution.
//!
//! Block proposal eligibility is derived from the reputation ranking: the
//! total reputation is reshaped as a trapezoid over the identities sorted by
//! reputation, so the best reputed identities weigh more while nobody drops
//! to a null chance.

use std::collections::HashMap;

use itertools::Itertools;

use crate::trs::{Address, Reputation};

/// Calculate the result of `y = m*x + k`, rounded to the nearest integer
/// (ties to even) and saturated at zero
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn magic_line(x: f64, m: f64, k: f64) -> u64 {
    let res = m * x + k;
    if res < 0.0 {
        0
    } else {
        res.round_ties_even() as u64
    }
}

/// Calculate the values and the total reputation of the upper triangle of
/// the trapezoid
fn trapezoid_triangle(total_rep: u64, num_ids: usize, minimum_rep: u64) -> (Vec<u64>, u64) {
    // Calculate parameters for the curve y = m*x + k
    // k: 1.5 times the average of the total reputation above the minimum
    #[allow(clippy::cast_precision_loss)]
    let average = total_rep as f64 / num_ids as f64;
    let k = 1.5 * (average - minimum_rep as f64);
    // m: negative slope that reaches zero at the last rank
    let m = if num_ids > 1 {
        -k / (num_ids - 1) as f64
    } else {
        0.0
    };

    let mut triangle = Vec::with_capacity(num_ids);
    let mut total_triangle = 0;
    for i in 0..num_ids {
        let rep = magic_line(i as f64, m, k);
        triangle.push(rep);
        total_triangle += rep;
    }

    (triangle, total_triangle)
}

/// Reshape the reputation of the given identities as a trapezoid over their
/// reputation ranking, returning the per-identity weights and the total
/// reputation. Ranking ties are broken by address, so the result does not
/// depend on map iteration order.
pub fn trapezoidal_eligibility(
    identities: &HashMap<Address, Reputation>,
) -> (HashMap<Address, u64>, u64) {
    if identities.is_empty() {
        return (HashMap::new(), 0);
    }

    let ranked: Vec<(&Address, u64)> = identities
        .iter()
        .map(|(address, reputation)| (address, reputation.0))
        .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)))
        .collect();
    let total_rep: u64 = ranked.iter().map(|(_, rep)| rep).sum();
    let minimum_rep = ranked.last().map(|(_, rep)| *rep).unwrap_or_default();

    // Calculate the upper triangle reputation of the trapezoid
    let (triangle, total_triangle) = trapezoid_triangle(total_rep, ranked.len(), minimum_rep);

    // To complete the trapezoid, an offset needs to be added (the rectangle
    // at the base), spreading the remainder one unit at a time over the
    // first ranks
    let remaining = total_rep - total_triangle;
    let offset = remaining / ranked.len() as u64;
    let extra = remaining % ranked.len() as u64;

    let eligibility = ranked
        .into_iter()
        .zip(triangle)
        .enumerate()
        .map(|(i, ((address, _), rep))| {
            let mut weight = rep + offset;
            if (i as u64) < extra {
                weight += 1;
            }
            (address.clone(), weight)
        })
        .collect();

    (eligibility, total_rep)
}

/// Relative eligibility of every identity: the trapezoid weight plus one,
/// normalized over the total reputation plus the number of identities, so
/// every identity keeps a nonzero chance
#[allow(clippy::cast_precision_loss)]
pub fn calculate_eligibilities(
    identities: &HashMap<Address, Reputation>,
) -> HashMap<Address, f64> {
    let (eligibility, total_rep) = trapezoidal_eligibility(identities);
    let denominator = (total_rep + identities.len() as u64) as f64;

    identities
        .keys()
        .map(|address| {
            let weight = eligibility.get(address).copied().unwrap_or(0);
            (address.clone(), (weight + 1) as f64 / denominator)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rep_map(reps: &[(&str, u64)]) -> HashMap<Address, Reputation> {
        reps.iter()
            .map(|(id, rep)| ((*id).to_string(), Reputation(*rep)))
            .collect()
    }

    #[test]
    fn empty_map() {
        let (eligibility, total) = trapezoidal_eligibility(&HashMap::new());
        assert!(eligibility.is_empty());
        assert_eq!(total, 0);
        assert!(calculate_eligibilities(&HashMap::new()).is_empty());
    }

    #[test]
    fn single_identity() {
        let identities = rep_map(&[("wit1alice", 16)]);
        let (eligibility, total) = trapezoidal_eligibility(&identities);
        // The triangle degenerates to zero and the whole reputation goes to
        // the rectangular base
        assert_eq!(eligibility["wit1alice"], 16);
        assert_eq!(total, 16);

        let eligibilities = calculate_eligibilities(&identities);
        assert!((eligibilities["wit1alice"] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn three_identities() {
        // S = 16, minimum 1: k = 6.5, m = -3.25, triangle [6, 3, 0],
        // base offset 2 with one extra unit for the first rank
        let identities = rep_map(&[("wit1alice", 10), ("wit1bob", 5), ("wit1carol", 1)]);
        let (eligibility, total) = trapezoidal_eligibility(&identities);
        assert_eq!(total, 16);
        assert_eq!(eligibility["wit1alice"], 9);
        assert_eq!(eligibility["wit1bob"], 5);
        assert_eq!(eligibility["wit1carol"], 2);

        let eligibilities = calculate_eligibilities(&identities);
        assert!((eligibilities["wit1alice"] - 10.0 / 19.0).abs() < 1e-12);
        assert!((eligibilities["wit1bob"] - 6.0 / 19.0).abs() < 1e-12);
        assert!((eligibilities["wit1carol"] - 3.0 / 19.0).abs() < 1e-12);
    }

    #[test]
    fn uniform_reputation_keeps_flat_distribution() {
        let identities = rep_map(&[("wit1alice", 5), ("wit1bob", 5), ("wit1carol", 5)]);
        let (eligibility, total) = trapezoidal_eligibility(&identities);
        // No spread above the minimum: the triangle is flat and everyone
        // keeps their share
        assert_eq!(total, 15);
        assert_eq!(eligibility["wit1alice"], 5);
        assert_eq!(eligibility["wit1bob"], 5);
        assert_eq!(eligibility["wit1carol"], 5);
    }

    #[test]
    fn ties_break_by_address() {
        let identities = rep_map(&[("wit1carol", 7), ("wit1alice", 7), ("wit1bob", 2)]);
        let (eligibility, _total) = trapezoidal_eligibility(&identities);
        // wit1alice and wit1carol hold the same reputation: the first rank
        // (and any extra base unit) goes to the lexicographically smaller one
        assert!(eligibility["wit1alice"] >= eligibility["wit1carol"]);
        assert!(eligibility["wit1carol"] >= eligibility["wit1bob"]);
    }

    #[test]
    fn weights_preserve_total_reputation() {
        let identities = rep_map(&[
            ("wit1alice", 123),
            ("wit1bob", 77),
            ("wit1carol", 40),
            ("wit1dave", 12),
            ("wit1erin", 3),
        ]);
        let (eligibility, total) = trapezoidal_eligibility(&identities);
        assert_eq!(eligibility.values().sum::<u64>(), total);
    }

    #[test]
    fn eligibilities_sum_to_one() {
        for identities in &[
            rep_map(&[("wit1alice", 1)]),
            rep_map(&[("wit1alice", 10), ("wit1bob", 5), ("wit1carol", 1)]),
            rep_map(&[
                ("wit1alice", 1000),
                ("wit1bob", 500),
                ("wit1carol", 499),
                ("wit1dave", 1),
            ]),
        ] {
            let eligibilities = calculate_eligibilities(identities);
            let sum: f64 = eligibilities.values().sum();
            assert!((sum - 1.0).abs() < 1e-9, "sum was {}", sum);
        }
    }

    #[test]
    fn triangle_is_decreasing() {
        let (triangle, _total) = trapezoid_triangle(1000, 10, 1);
        for pair in triangle.windows(2) {
            assert!(pair[0] >= pair[1]);
        }
        assert_eq!(*triangle.last().unwrap(), 0);
    }
}
