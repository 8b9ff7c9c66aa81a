//! Key types and weight functions.
//!
//! Every node aggregates `weight_i(key) * multiplicity` for each configured
//! exponent `a_i`, where `weight_i(k) = max(k, 0)^a_i`. An empty exponent list
//! is valid: the tree then only maintains plain multiplicity counts.

use std::fmt::{Debug, Display};

/// Integer key stored in the tree (degree or balance).
pub trait TreeKey: Copy + Ord + Debug + Display + Default {
    /// Base of the weight transform, `max(key, 0)` as a float.
    fn weight_base(self) -> f64;

    /// True if the key may be stored by the rank index facade.
    fn is_positive(self) -> bool;
}

macro_rules! impl_unsigned_key {
    ($($t:ty),*) => {$(
        impl TreeKey for $t {
            #[inline]
            fn weight_base(self) -> f64 {
                self as f64
            }

            #[inline]
            fn is_positive(self) -> bool {
                self > 0
            }
        }
    )*};
}

macro_rules! impl_signed_key {
    ($($t:ty),*) => {$(
        impl TreeKey for $t {
            #[inline]
            fn weight_base(self) -> f64 {
                if self > 0 { self as f64 } else { 0.0 }
            }

            #[inline]
            fn is_positive(self) -> bool {
                self > 0
            }
        }
    )*};
}

impl_unsigned_key!(u32, u64);
impl_signed_key!(i32, i64);

/// Ordered list of weight exponents, fixed at tree construction.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WeightSet {
    exponents: Vec<f64>,
}

impl WeightSet {
    pub fn new(exponents: impl Into<Vec<f64>>) -> Self {
        Self {
            exponents: exponents.into(),
        }
    }

    /// Number of weight functions (M).
    #[inline]
    pub fn width(&self) -> usize {
        self.exponents.len()
    }

    pub fn exponents(&self) -> &[f64] {
        &self.exponents
    }

    /// Contribution of `multiplicity` copies of a key with the given base
    /// to aggregate slot `slot`.
    ///
    /// All aggregate maintenance and rank descents go through this one
    /// function so stored sums match an independent recomputation exactly.
    #[inline]
    pub fn contribution(&self, slot: usize, base: f64, multiplicity: u64) -> f64 {
        base.powf(self.exponents[slot]) * multiplicity as f64
    }
}

/// Fixed-width output buffer for rank and norm queries.
///
/// Created once per caller and passed by reference into every query, so a
/// query never allocates once the buffer has reached the tree's width.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankVector {
    /// Unweighted count (multiplicity sum).
    pub count: u64,
    /// One weighted sum per exponent.
    pub weighted: Vec<f64>,
}

impl RankVector {
    pub fn new(width: usize) -> Self {
        Self {
            count: 0,
            weighted: vec![0.0; width],
        }
    }

    pub(crate) fn reset(&mut self, width: usize) {
        self.count = 0;
        if self.weighted.len() == width {
            self.weighted.iter_mut().for_each(|x| *x = 0.0);
        } else {
            self.weighted.clear();
            self.weighted.resize(width, 0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_keys_clamp_to_zero() {
        assert_eq!((-5i64).weight_base(), 0.0);
        assert_eq!(7i64.weight_base(), 7.0);
        assert!(!0i32.is_positive());
        assert!(3u32.is_positive());
    }

    #[test]
    fn test_contribution() {
        let w = WeightSet::new(vec![0.0, 1.0, 2.0]);
        assert_eq!(w.width(), 3);
        assert_eq!(w.contribution(0, 3.0, 2), 2.0);
        assert_eq!(w.contribution(1, 3.0, 2), 6.0);
        assert_eq!(w.contribution(2, 3.0, 2), 18.0);
    }

    #[test]
    fn test_rank_vector_reset_resizes() {
        let mut v = RankVector::new(1);
        v.count = 3;
        v.weighted[0] = 1.5;
        v.reset(3);
        assert_eq!(v.count, 0);
        assert_eq!(v.weighted, vec![0.0; 3]);
    }
}
