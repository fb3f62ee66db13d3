//! Per-frame variant plans

use std::ops::Index;

use crate::config::ScanOptions;
use crate::types::{Polarity, Rotation, Variant};

/// Upper bound on detector calls for one frame
pub const MAX_VARIANTS: usize = 4;

/// Ordered detector attempts for one frame.
///
/// The order is fixed: base rotation, alternate rotation, then the same two
/// rotations inverted. Options only remove slots, they never reorder them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariantPlan {
    slots: [Variant; MAX_VARIANTS],
    len: usize,
}

impl VariantPlan {
    pub fn new(base: Rotation, options: ScanOptions) -> Self {
        let alternate = base.quarter_turn();
        let mut plan = Self {
            slots: [Variant::new(base, Polarity::Normal); MAX_VARIANTS],
            len: 0,
        };

        plan.push(Variant::new(base, Polarity::Normal));
        if options.alternate_rotation {
            plan.push(Variant::new(alternate, Polarity::Normal));
        }
        if options.inverted_polarity {
            plan.push(Variant::new(base, Polarity::Inverted));
            if options.alternate_rotation {
                plan.push(Variant::new(alternate, Polarity::Inverted));
            }
        }
        plan
    }

    fn push(&mut self, variant: Variant) {
        self.slots[self.len] = variant;
        self.len += 1;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, index: usize) -> Option<Variant> {
        self.as_slice().get(index).copied()
    }

    pub fn as_slice(&self) -> &[Variant] {
        &self.slots[..self.len]
    }

    pub fn iter(&self) -> impl Iterator<Item = Variant> + '_ {
        self.as_slice().iter().copied()
    }

    /// True if any planned variant needs the inverted image
    pub fn needs_inversion(&self) -> bool {
        self.iter().any(|v| v.polarity == Polarity::Inverted)
    }
}

impl Index<usize> for VariantPlan {
    type Output = Variant;

    fn index(&self, index: usize) -> &Variant {
        &self.as_slice()[index]
    }
}
