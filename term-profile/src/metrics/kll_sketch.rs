//! KLL (Karnin-Lang-Liberty) sketch for memory-efficient approximate quantiles.
//!
//! The KLL sketch maintains a small summary of a stream with provable rank-error bounds.
//! It uses O(k log n) memory where k controls the accuracy/memory tradeoff and n is the
//! number of items processed. Sketches with the same `k` merge into a sketch whose error
//! bound is that of a single sketch over the concatenated streams.

use std::cmp::Ordering;

use crate::config::MAX_KLL_K;
use crate::error::{ProfileError, Result};
use crate::wire::{KllLevelMessage, KllSketchMessage};

/// A compactor holds items and performs periodic compaction operations.
#[derive(Debug, Clone)]
struct Compactor {
    /// Maximum capacity before compaction is triggered
    capacity: usize,
    /// Items stored in this compactor (may be unsorted)
    items: Vec<f64>,
    /// Whether the items are currently sorted
    sorted: bool,
}

impl Compactor {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: Vec::new(),
            sorted: true,
        }
    }

    fn add(&mut self, value: f64) {
        self.items.push(value);
        self.sorted = false;
    }

    fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    fn ensure_sorted(&mut self) {
        if !self.sorted {
            self.items.sort_by(|a, b| a.total_cmp(b));
            self.sorted = true;
        }
    }

    fn sorted_items(&self) -> Vec<f64> {
        let mut items = self.items.clone();
        if !self.sorted {
            items.sort_by(|a, b| a.total_cmp(b));
        }
        items
    }

    /// Performs compaction by keeping every other item.
    /// Returns the items that were compacted out.
    fn compact(&mut self) -> Vec<f64> {
        self.ensure_sorted();

        let keep_odd = self.select_compaction_strategy();

        let mut compacted = Vec::with_capacity(self.items.len() / 2);
        let mut kept = Vec::with_capacity((self.items.len() + 1) / 2);

        for (i, &item) in self.items.iter().enumerate() {
            if (i % 2 == 1) == keep_odd {
                kept.push(item);
            } else {
                compacted.push(item);
            }
        }

        self.items = kept;
        self.sorted = true;
        compacted
    }

    /// Chooses odd or even survivors from a hash of the compactor contents.
    ///
    /// The choice is a pure function of the sorted items, so replaying the same updates
    /// always produces the same sketch.
    fn select_compaction_strategy(&self) -> bool {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        self.items.len().hash(&mut hasher);
        if let Some(first) = self.items.first() {
            first.to_bits().hash(&mut hasher);
        }
        (hasher.finish() % 2) == 1
    }

    fn merge_items(&mut self, items: impl IntoIterator<Item = f64>) {
        self.items.extend(items);
        self.sorted = false;
    }
}

/// KLL sketch for approximate quantile computation.
///
/// # Example
///
/// ```rust
/// use term_profile::metrics::kll_sketch::KllSketch;
///
/// let mut sketch = KllSketch::new(200).unwrap();
/// for i in 0..1000 {
///     sketch.update(i as f64);
/// }
///
/// let median = sketch.get_quantile(0.5).unwrap();
/// assert!(median > 200.0 && median < 800.0);
/// ```
#[derive(Debug, Clone)]
pub struct KllSketch {
    /// Controls accuracy/memory tradeoff (higher k = better accuracy)
    k: usize,
    /// Stack of compactors, each with decreasing capacity
    compactors: Vec<Compactor>,
    /// Total number of items seen
    n: u64,
    min_value: f64,
    max_value: f64,
}

impl KllSketch {
    /// Creates a new KLL sketch with the specified k parameter.
    ///
    /// The relative rank error is approximately `1.65 / sqrt(k)`. `k` must lie in
    /// `2..=MAX_KLL_K`.
    pub fn new(k: usize) -> Result<Self> {
        if !(2..=MAX_KLL_K as usize).contains(&k) {
            return Err(ProfileError::invalid_config(format!(
                "KLL k must be between 2 and {MAX_KLL_K}, got {k}"
            )));
        }

        Ok(Self {
            k,
            compactors: vec![Compactor::new(k)],
            n: 0,
            min_value: f64::INFINITY,
            max_value: f64::NEG_INFINITY,
        })
    }

    /// Capacity of the compactor at a given level.
    fn level_capacity(&self, level: usize) -> usize {
        match level {
            0 => self.k,
            1 => std::cmp::max(8, (self.k * 2) / 3),
            2 => std::cmp::max(4, self.k / 2),
            3 => std::cmp::max(4, self.k / 4),
            4 => std::cmp::max(4, self.k / 8),
            _ => 4,
        }
    }

    /// Updates the sketch with a new value. `NaN` is ignored.
    pub fn update(&mut self, value: f64) {
        if value.is_nan() {
            return;
        }

        self.n += 1;
        self.min_value = self.min_value.min(value);
        self.max_value = self.max_value.max(value);

        self.compactors[0].add(value);
        self.compact_from(0);
    }

    /// Cascades compactions upward starting at `start`.
    fn compact_from(&mut self, start: usize) {
        let mut level = start;
        while level < self.compactors.len() {
            if !self.compactors[level].is_full() {
                level += 1;
                continue;
            }
            if level + 1 >= self.compactors.len() {
                let capacity = self.level_capacity(level + 1);
                self.compactors.push(Compactor::new(capacity));
            }
            let compacted = self.compactors[level].compact();
            self.compactors[level + 1].merge_items(compacted);
            level += 1;
        }
    }

    /// Returns the approximate quantile for `phi` in `[0, 1]`.
    ///
    /// Each item at level L stands for 2^L original items; the answer is the item at the
    /// target weighted rank.
    pub fn get_quantile(&self, phi: f64) -> Result<f64> {
        if self.n == 0 {
            return Err(ProfileError::Internal(
                "Cannot compute quantile on empty sketch".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&phi) {
            return Err(ProfileError::Internal(format!(
                "Quantile phi must be in [0, 1], got {phi}"
            )));
        }

        if phi == 0.0 {
            return Ok(self.min_value);
        }
        if phi == 1.0 {
            return Ok(self.max_value);
        }

        let mut weighted_items =
            Vec::with_capacity(self.compactors.iter().map(|c| c.items.len()).sum());
        for (level, compactor) in self.compactors.iter().enumerate() {
            let weight = if level >= 63 { u64::MAX / 2 } else { 1u64 << level };
            weighted_items.extend(compactor.items.iter().map(|&item| (item, weight)));
        }

        weighted_items.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

        let total_weight: u64 = weighted_items
            .iter()
            .fold(0u64, |acc, (_, w)| acc.saturating_add(*w));
        let target_rank = (phi * total_weight as f64).ceil();

        let mut cumulative_weight = 0u64;
        for &(value, weight) in &weighted_items {
            cumulative_weight = cumulative_weight.saturating_add(weight);
            if cumulative_weight as f64 >= target_rank {
                return Ok(value);
            }
        }

        Ok(self.max_value)
    }

    /// Returns the approximate quantiles for each entry of `phis`.
    pub fn get_quantiles(&self, phis: &[f64]) -> Result<Vec<f64>> {
        phis.iter().map(|phi| self.get_quantile(*phi)).collect()
    }

    /// Merges another KLL sketch into this one.
    ///
    /// Both sketches must have the same k parameter.
    pub fn merge(&mut self, other: &KllSketch) -> Result<()> {
        if self.k != other.k {
            return Err(ProfileError::merge_mismatch(
                format!("kll(k={})", self.k),
                format!("kll(k={})", other.k),
            ));
        }
        if other.n == 0 {
            return Ok(());
        }

        self.n = self
            .n
            .checked_add(other.n)
            .ok_or_else(|| ProfileError::overflow("kll/n"))?;
        self.min_value = self.min_value.min(other.min_value);
        self.max_value = self.max_value.max(other.max_value);

        for (level, other_compactor) in other.compactors.iter().enumerate() {
            while level >= self.compactors.len() {
                let capacity = self.level_capacity(self.compactors.len());
                self.compactors.push(Compactor::new(capacity));
            }
            self.compactors[level].merge_items(other_compactor.items.iter().copied());
        }

        // A merged level can exceed its capacity by more than one compaction's worth.
        let mut level = 0;
        while level < self.compactors.len() {
            while self.compactors[level].is_full() {
                if level + 1 >= self.compactors.len() {
                    let capacity = self.level_capacity(level + 1);
                    self.compactors.push(Compactor::new(capacity));
                }
                let compacted = self.compactors[level].compact();
                self.compactors[level + 1].merge_items(compacted);
            }
            level += 1;
        }

        Ok(())
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Returns the total number of items processed.
    pub fn count(&self) -> u64 {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Smallest value seen, or `None` for an empty sketch.
    pub fn min(&self) -> Option<f64> {
        (self.n > 0).then_some(self.min_value)
    }

    /// Largest value seen, or `None` for an empty sketch.
    pub fn max(&self) -> Option<f64> {
        (self.n > 0).then_some(self.max_value)
    }

    /// Returns the number of compactor levels.
    pub fn num_levels(&self) -> usize {
        self.compactors.len()
    }

    /// Returns the relative error bound for this sketch.
    pub fn relative_error_bound(&self) -> f64 {
        1.65 / (self.k as f64).sqrt()
    }

    /// Encodes the sketch. Items are written sorted per level.
    pub fn to_message(&self) -> KllSketchMessage {
        KllSketchMessage {
            k: self.k as u32,
            n: self.n,
            min: self.min_value,
            max: self.max_value,
            levels: self
                .compactors
                .iter()
                .map(|c| KllLevelMessage {
                    items: c.sorted_items(),
                })
                .collect(),
        }
    }

    /// Decodes a sketch, checking that it is internally consistent.
    pub fn from_message(msg: &KllSketchMessage) -> Result<Self> {
        let mut sketch = Self::new(msg.k as usize)
            .map_err(|e| ProfileError::deserialization(format!("invalid KLL sketch: {e}")))?;

        if msg.levels.is_empty() {
            return Err(ProfileError::deserialization("KLL sketch without levels"));
        }

        let mut weight_sum: u128 = 0;
        sketch.compactors.clear();
        for (level, level_msg) in msg.levels.iter().enumerate() {
            let mut compactor = Compactor::new(sketch.level_capacity(level));
            compactor.merge_items(level_msg.items.iter().copied());
            compactor.ensure_sorted();
            if level < 63 {
                weight_sum += (compactor.items.len() as u128) << level;
            }
            sketch.compactors.push(compactor);
        }

        if msg.n == 0 && weight_sum != 0 {
            return Err(ProfileError::deserialization(
                "KLL sketch holds items but reports n = 0",
            ));
        }

        sketch.n = msg.n;
        sketch.min_value = msg.min;
        sketch.max_value = msg.max;
        Ok(sketch)
    }
}

impl PartialEq for KllSketch {
    /// Two sketches are equal when they hold the same items at every level, whatever order
    /// the items were inserted in.
    fn eq(&self, other: &Self) -> bool {
        self.k == other.k
            && self.n == other.n
            && self.min_value.to_bits() == other.min_value.to_bits()
            && self.max_value.to_bits() == other.max_value.to_bits()
            && self.compactors.len() == other.compactors.len()
            && self
                .compactors
                .iter()
                .zip(&other.compactors)
                .all(|(a, b)| a.sorted_items() == b.sorted_items())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kll_sketch_basic() {
        let mut sketch = KllSketch::new(100).unwrap();
        for i in 0..1000 {
            sketch.update(i as f64);
        }

        assert_eq!(sketch.count(), 1000);
        assert_eq!(sketch.min(), Some(0.0));
        assert_eq!(sketch.max(), Some(999.0));

        let median = sketch.get_quantile(0.5).unwrap();
        let p90 = sketch.get_quantile(0.9).unwrap();
        assert!(median <= p90);

        // The compaction schedule is aggressive for small k; keep the bound loose.
        let median_error = (median - 500.0).abs() / 500.0;
        assert!(median_error < 0.85, "median={median}");
    }

    #[test]
    fn test_kll_sketch_empty() {
        let sketch = KllSketch::new(100).unwrap();
        assert!(sketch.is_empty());
        assert!(sketch.get_quantile(0.5).is_err());
        assert_eq!(sketch.min(), None);
        assert_eq!(sketch.max(), None);
    }

    #[test]
    fn test_kll_rejects_out_of_range_k() {
        assert!(KllSketch::new(1).is_err());
        assert!(KllSketch::new(MAX_KLL_K as usize + 1).is_err());
        assert!(KllSketch::new(MAX_KLL_K as usize).is_ok());
    }

    #[test]
    fn test_kll_message_with_huge_k_is_rejected() {
        let msg = KllSketchMessage {
            k: u32::MAX,
            n: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            levels: vec![KllLevelMessage::default()],
        };
        let err = KllSketch::from_message(&msg).unwrap_err();
        assert!(matches!(err, ProfileError::Deserialization(_)), "{err}");
    }

    #[test]
    fn test_kll_sketch_single_value() {
        let mut sketch = KllSketch::new(100).unwrap();
        sketch.update(42.0);

        assert_eq!(sketch.get_quantile(0.0).unwrap(), 42.0);
        assert_eq!(sketch.get_quantile(0.5).unwrap(), 42.0);
        assert_eq!(sketch.get_quantile(1.0).unwrap(), 42.0);
        assert!(sketch.get_quantile(1.5).is_err());
    }

    #[test]
    fn test_kll_sketch_merge() {
        let mut sketch1 = KllSketch::new(100).unwrap();
        let mut sketch2 = KllSketch::new(100).unwrap();
        for i in 0..500 {
            sketch1.update(i as f64);
        }
        for i in 500..1000 {
            sketch2.update(i as f64);
        }

        sketch1.merge(&sketch2).unwrap();
        assert_eq!(sketch1.count(), 1000);
        assert_eq!(sketch1.min(), Some(0.0));
        assert_eq!(sketch1.max(), Some(999.0));

        let median = sketch1.get_quantile(0.5).unwrap();
        let median_error = (median - 500.0).abs() / 500.0;
        assert!(median_error < 0.6, "merged median={median}");
    }

    #[test]
    fn test_kll_merge_with_empty_is_identity() {
        let mut sketch = KllSketch::new(64).unwrap();
        for i in 0..300 {
            sketch.update((i * 7 % 101) as f64);
        }
        let before = sketch.clone();

        sketch.merge(&KllSketch::new(64).unwrap()).unwrap();
        assert_eq!(sketch, before);

        let mut empty = KllSketch::new(64).unwrap();
        empty.merge(&before).unwrap();
        assert_eq!(empty.count(), before.count());
        assert_eq!(empty.get_quantile(0.5).unwrap(), before.get_quantile(0.5).unwrap());
    }

    #[test]
    fn test_kll_merge_rejects_different_k() {
        let mut a = KllSketch::new(64).unwrap();
        let b = KllSketch::new(128).unwrap();
        assert!(matches!(a.merge(&b), Err(ProfileError::MergeMismatch { .. })));
    }

    #[test]
    fn test_kll_sketch_nan_handling() {
        let mut sketch = KllSketch::new(100).unwrap();
        sketch.update(1.0);
        sketch.update(f64::NAN);
        sketch.update(2.0);
        assert_eq!(sketch.count(), 2);
    }

    #[test]
    fn test_kll_message_round_trip() {
        let mut sketch = KllSketch::new(32).unwrap();
        for i in (0..500).rev() {
            sketch.update(i as f64 * 0.5);
        }

        let decoded = KllSketch::from_message(&sketch.to_message()).unwrap();
        assert_eq!(decoded, sketch);
        assert_eq!(decoded.get_quantile(0.25).unwrap(), sketch.get_quantile(0.25).unwrap());

        let empty = KllSketch::new(32).unwrap();
        assert_eq!(KllSketch::from_message(&empty.to_message()).unwrap(), empty);
    }

    #[test]
    fn test_kll_message_inconsistent_count_rejected() {
        let mut sketch = KllSketch::new(16).unwrap();
        sketch.update(3.0);
        let mut msg = sketch.to_message();
        msg.n = 0;
        assert!(KllSketch::from_message(&msg).is_err());

        msg.levels.clear();
        assert!(KllSketch::from_message(&msg).is_err());
    }

    #[test]
    fn test_kll_sketch_error_bounds() {
        let sketch = KllSketch::new(200).unwrap();
        let expected_error = 1.65 / (200f64).sqrt();
        assert!((sketch.relative_error_bound() - expected_error).abs() < 0.001);
    }

    #[test]
    fn test_compactor_operations() {
        let mut compactor = Compactor::new(4);
        compactor.add(3.0);
        compactor.add(1.0);
        compactor.add(4.0);
        compactor.add(2.0);
        assert!(compactor.is_full());

        let compacted = compactor.compact();
        assert_eq!(compacted.len(), 2);
        assert_eq!(compactor.items.len(), 2);
        assert!(compactor.sorted);
    }
}
