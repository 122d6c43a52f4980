//! Edge handles for the BDD manager.

use std::fmt::{Display, Formatter};
use std::ops::Neg;

/// A possibly complemented edge to a BDD node.
///
/// The sign carries the complement bit and the magnitude is the node index.
/// Index `0` is never allocated.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Ref(i32);

impl Ref {
    pub const fn positive(index: u32) -> Self {
        assert!(index != 0 && index <= i32::MAX as u32);
        Self(index as i32)
    }

    pub const fn is_negated(self) -> bool {
        self.0 < 0
    }

    pub const fn negate(self) -> Self {
        Self(-self.0)
    }

    /// Strips the complement bit.
    pub const fn regular(self) -> Self {
        Self(self.0.abs())
    }

    pub const fn index(self) -> u32 {
        self.0.unsigned_abs()
    }

    pub fn negate_if(self, flag: bool) -> Self {
        if flag {
            -self
        } else {
            self
        }
    }

    /// Raw signed value, useful as a stable identity in tests and exports.
    pub const fn get(self) -> i32 {
        self.0
    }
}

impl Neg for Ref {
    type Output = Self;

    fn neg(self) -> Self::Output {
        self.negate()
    }
}

impl Display for Ref {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", if self.is_negated() { "~" } else { "" }, self.index())
    }
}
