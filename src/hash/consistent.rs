//! Consistent hash selection over hashable candidates.
//!
//! # Responsibilities
//! - Rank candidates by distance between their nearest replica and the key
//! - Single and multi selection, with an unhashed shuffle mode
//! - Dispersion: hash-ordered prefix of `limit`, optionally shuffled
//!
//! # Design Decisions
//! - Ranking is keyed on the bit pattern of the non-negative error, which
//!   orders identically to the float value
//! - A tied error is bumped to the next representable value until free
//! - Empty candidate lists yield `None` / empty, never a panic

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::hash::hashable::{hash_value, Hashable};

/// How many hash-ranked candidates an HTTP answer may spread over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Dispersion {
    /// Size of the hash-ordered prefix to choose from.
    pub limit: usize,
    /// Shuffle the prefix before picking.
    pub shuffled: bool,
}

impl Default for Dispersion {
    fn default() -> Self {
        Self {
            limit: 1,
            shuffled: true,
        }
    }
}

/// Stateless selector. Cheap to copy; holds no per-request state.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsistentHasher;

impl ConsistentHasher {
    pub fn new() -> Self {
        Self
    }

    /// Order every candidate by ascending placement error for `hash_key`.
    pub fn rank<'a, T: Hashable>(&self, candidates: &'a [T], hash_key: &str) -> Vec<&'a T> {
        let target = hash_value(hash_key);
        let mut ordered: BTreeMap<u64, &'a T> = BTreeMap::new();

        for candidate in candidates {
            let Some(mut error) = candidate.placement_error(target) else {
                continue;
            };
            while ordered.contains_key(&error.to_bits()) {
                error = next_up(error);
            }
            ordered.insert(error.to_bits(), candidate);
        }

        ordered.into_values().collect()
    }

    /// Pick one candidate for `hash_key`, or a random one when `shuffle` is set.
    pub fn select_hashable<'a, T: Hashable>(
        &self,
        candidates: &'a [T],
        hash_key: &str,
        shuffle: bool,
    ) -> Option<&'a T> {
        if candidates.is_empty() {
            return None;
        }
        if shuffle {
            return candidates.choose(&mut rand::thread_rng());
        }
        self.rank(candidates, hash_key).into_iter().next()
    }

    /// Pick up to `limit` candidates in hash order, or a random permutation
    /// truncated to `limit` when `shuffle` is set.
    pub fn select_hashables<'a, T: Hashable>(
        &self,
        candidates: &'a [T],
        limit: usize,
        hash_key: &str,
        shuffle: bool,
    ) -> Vec<&'a T> {
        if shuffle {
            let mut picked: Vec<&'a T> = candidates.iter().collect();
            picked.shuffle(&mut rand::thread_rng());
            picked.truncate(limit);
            return picked;
        }

        let mut ranked = self.rank(candidates, hash_key);
        ranked.truncate(limit);
        ranked
    }

    /// The hash-ordered prefix of `dispersion.limit`, shuffled when configured.
    pub fn select_dispersed<'a, T: Hashable>(
        &self,
        candidates: &'a [T],
        dispersion: &Dispersion,
        hash_key: &str,
    ) -> Vec<&'a T> {
        let mut picked = self.select_hashables(candidates, dispersion.limit.max(1), hash_key, false);
        if dispersion.shuffled && picked.len() > 1 {
            picked.shuffle(&mut rand::thread_rng());
        }
        picked
    }

    /// First candidate of [`Self::select_dispersed`].
    pub fn select_dispersed_one<'a, T: Hashable>(
        &self,
        candidates: &'a [T],
        dispersion: &Dispersion,
        hash_key: &str,
    ) -> Option<&'a T> {
        self.select_dispersed(candidates, dispersion, hash_key).into_iter().next()
    }
}

/// Smallest float greater than a non-negative finite `value`.
#[inline]
fn next_up(value: f64) -> f64 {
    f64::from_bits(value.to_bits() + 1)
}
