//! Round-robin ("chess tournament") pair scheduling
//!
//! Every unordered index pair (i, j), i < j, is assigned to exactly one round,
//! and the pairs inside a round are disjoint so their rotations can be applied
//! concurrently. Uses the circle method: index `m - 1` stays fixed while the
//! others rotate one position per round.
//!
//! For odd `P` the table is built for `P + 1` players; whoever is paired with
//! the phantom player sits the round out (the bye). That gives `P` rounds of
//! `(P - 1) / 2` pairs instead of `P - 1`.

use crate::error::{JacobiError, Result};

/// Marks "no bye this round" in the flattened device layout
pub const NO_BYE: u32 = u32::MAX;

/// Immutable pairing table shared by every sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairSchedule {
    size: usize,
    pairs_per_round: usize,
    /// `num_rounds * pairs_per_round` pairs, round-major, each stored as (min, max)
    pairs: Vec<(usize, usize)>,
    byes: Vec<Option<usize>>,
}

impl PairSchedule {
    /// Build the schedule for a `p`×`p` matrix
    pub fn new(p: usize) -> Result<Self> {
        if p < 2 {
            return Err(JacobiError::InvalidInput(format!(
                "pair schedule needs at least 2 indices, got {}",
                p
            )));
        }

        let m = p + p % 2;
        let phantom = m - 1;
        let num_rounds = m - 1;
        let pairs_per_round = p / 2;

        let mut pairs = Vec::with_capacity(num_rounds * pairs_per_round);
        let mut byes = Vec::with_capacity(num_rounds);

        for round in 0..num_rounds {
            let mut bye = None;
            for slot in 0..m / 2 {
                let index1 = (slot + round) % (m - 1);
                let index2 = if slot != 0 {
                    (m - slot + round - 1) % (m - 1)
                } else {
                    m - 1
                };
                let (lo, hi) = (index1.min(index2), index1.max(index2));

                if p % 2 == 1 && hi == phantom {
                    bye = Some(lo);
                } else {
                    pairs.push((lo, hi));
                }
            }
            byes.push(bye);
        }

        debug_assert_eq!(pairs.len(), num_rounds * pairs_per_round);

        Ok(Self {
            size: p,
            pairs_per_round,
            pairs,
            byes,
        })
    }

    /// Matrix dimension the schedule was built for
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn num_rounds(&self) -> usize {
        self.byes.len()
    }

    pub fn pairs_per_round(&self) -> usize {
        self.pairs_per_round
    }

    /// Total rotations per sweep, i.e. P(P-1)/2
    pub fn total_pairs(&self) -> usize {
        self.pairs.len()
    }

    /// The disjoint pairs of one round
    pub fn round(&self, round: usize) -> &[(usize, usize)] {
        let start = round * self.pairs_per_round;
        &self.pairs[start..start + self.pairs_per_round]
    }

    /// Index sitting out `round`, if P is odd
    pub fn bye(&self, round: usize) -> Option<usize> {
        self.byes[round]
    }

    /// `[round][slot][2]` layout for device upload
    pub fn flat_pairs(&self) -> Vec<u32> {
        self.pairs
            .iter()
            .flat_map(|&(k, l)| [k as u32, l as u32])
            .collect()
    }

    /// One entry per round, `NO_BYE` when every index is paired
    pub fn flat_byes(&self) -> Vec<u32> {
        self.byes
            .iter()
            .map(|b| b.map_or(NO_BYE, |i| i as u32))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn check_complete(p: usize) {
        let schedule = PairSchedule::new(p).unwrap();
        let expected_rounds = if p % 2 == 0 { p - 1 } else { p };
        assert_eq!(schedule.num_rounds(), expected_rounds, "p = {}", p);
        assert_eq!(schedule.total_pairs(), p * (p - 1) / 2, "p = {}", p);

        let mut seen = HashSet::new();
        for r in 0..schedule.num_rounds() {
            let mut used = HashSet::new();
            for &(k, l) in schedule.round(r) {
                assert!(k < l && l < p);
                assert!(used.insert(k), "index {} repeated in round {}", k, r);
                assert!(used.insert(l), "index {} repeated in round {}", l, r);
                assert!(seen.insert((k, l)), "pair ({}, {}) scheduled twice", k, l);
            }
            match schedule.bye(r) {
                Some(b) => {
                    assert_eq!(p % 2, 1);
                    assert!(!used.contains(&b), "bye {} was paired in round {}", b, r);
                    assert_eq!(used.len() + 1, p);
                }
                None => assert_eq!(used.len(), p),
            }
        }
        assert_eq!(seen.len(), p * (p - 1) / 2);
    }

    #[test]
    fn test_pairing_completeness() {
        for p in 2..=33 {
            check_complete(p);
        }
        check_complete(128);
        check_complete(257);
    }

    #[test]
    fn test_rejects_small_size() {
        assert!(matches!(PairSchedule::new(0), Err(JacobiError::InvalidInput(_))));
        assert!(matches!(PairSchedule::new(1), Err(JacobiError::InvalidInput(_))));
    }

    #[test]
    fn test_four_player_table() {
        let schedule = PairSchedule::new(4).unwrap();
        assert_eq!(schedule.round(0), &[(0, 3), (1, 2)]);
        assert_eq!(schedule.round(1), &[(1, 3), (0, 2)]);
        assert_eq!(schedule.round(2), &[(2, 3), (0, 1)]);
    }

    #[test]
    fn test_flat_layout() {
        let schedule = PairSchedule::new(3).unwrap();
        let flat = schedule.flat_pairs();
        assert_eq!(flat.len(), schedule.num_rounds() * schedule.pairs_per_round() * 2);

        let byes = schedule.flat_byes();
        assert_eq!(byes.len(), 3);
        assert!(byes.iter().all(|&b| b != NO_BYE));

        let even = PairSchedule::new(6).unwrap();
        assert!(even.flat_byes().iter().all(|&b| b == NO_BYE));
    }
}
