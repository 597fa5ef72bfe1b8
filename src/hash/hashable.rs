//! Replica point generation for hashable entities.
//!
//! Each entity contributes `count` pseudo-random points on the number line.
//! Points derive from `identity + "--" + i` so that every router instance
//! holding the same snapshot computes identical points.

use std::sync::Arc;

use sha2::{Digest, Sha256};

/// Hash a key onto the replica number line.
///
/// The leading 128 bits of the SHA-256 digest are read as a big-endian
/// unsigned integer and collapsed to `f64`. Only relative distances matter,
/// so the precision loss is harmless.
#[inline]
#[must_use]
pub fn hash_value(key: &str) -> f64 {
    let digest = Sha256::digest(key.as_bytes());
    let mut head = [0u8; 16];
    head.copy_from_slice(&digest[..16]);
    u128::from_be_bytes(head) as f64
}

/// Sorted, deduplicated replica points for one entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplicaSet {
    points: Vec<f64>,
}

impl ReplicaSet {
    /// Generate `count` replica points for `identity`.
    ///
    /// Colliding points are collapsed, so the result may hold fewer than
    /// `count` entries.
    pub fn generate(identity: &str, count: usize) -> Self {
        let mut points: Vec<f64> = (0..count)
            .map(|i| hash_value(&format!("{identity}--{i}")))
            .collect();
        points.sort_by(f64::total_cmp);
        points.dedup();
        Self { points }
    }

    pub fn points(&self) -> &[f64] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The replica point closest to `target`.
    ///
    /// Targets outside the range clamp to the first or last point. On an
    /// exact midpoint the lower neighbour wins.
    pub fn closest(&self, target: f64) -> Option<f64> {
        let first = *self.points.first()?;
        let last = *self.points.last()?;

        let idx = self.points.partition_point(|p| *p < target);
        if idx == 0 {
            return Some(first);
        }
        if idx == self.points.len() {
            return Some(last);
        }

        let lower = self.points[idx - 1];
        let upper = self.points[idx];
        if target - lower <= upper - target {
            Some(lower)
        } else {
            Some(upper)
        }
    }
}

/// An entity that can take part in consistent hash selection.
pub trait Hashable {
    fn replicas(&self) -> &ReplicaSet;

    /// Distance from `target` to this entity's nearest replica point.
    fn placement_error(&self, target: f64) -> Option<f64> {
        self.replicas().closest(target).map(|p| (p - target).abs())
    }
}

impl<T: Hashable + ?Sized> Hashable for Arc<T> {
    fn replicas(&self) -> &ReplicaSet {
        (**self).replicas()
    }
}

impl<T: Hashable + ?Sized> Hashable for &T {
    fn replicas(&self) -> &ReplicaSet {
        (**self).replicas()
    }
}
