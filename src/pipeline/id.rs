//! Identity types for the pipeline system.
//!
//! All IDs are newtypes over `u32` that serve as direct array indices
//! into their respective storage vectors, providing O(1) lookup.

use std::fmt;

/// Index into the vehicle's binding list (registration order).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct PartId(pub u32);

impl PartId {
    pub const INVALID: PartId = PartId(u32::MAX);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for PartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "PartId(INVALID)")
        } else {
            write!(f, "PartId({})", self.0)
        }
    }
}

impl fmt::Display for PartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Compact store slot. High 20 bits = key group, low 12 bits = position in group.
/// Supports up to ~1M key groups with 4096 keys each.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeySlot(pub u32);

impl KeySlot {
    const POS_BITS: u32 = 12;
    const POS_MASK: u32 = (1 << Self::POS_BITS) - 1;

    pub fn new(group: u32, position: u16) -> Self {
        debug_assert!(position < (1 << Self::POS_BITS) as u16);
        Self((group << Self::POS_BITS) | (position as u32 & Self::POS_MASK))
    }

    #[inline]
    pub fn group(self) -> usize {
        (self.0 >> Self::POS_BITS) as usize
    }

    #[inline]
    pub fn position(self) -> usize {
        (self.0 & Self::POS_MASK) as usize
    }
}

impl fmt::Debug for KeySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "KeySlot(group={}, pos={})",
            self.group(),
            self.position()
        )
    }
}
