//! Sandbox effects.
//!
//! Every builtin declares the host effects it performs. The sandbox only
//! binds builtins whose effects are all allowed, so a pure evaluation
//! (the default) cannot reach the console, the clock, or entropy.
//!
//! Internally an `EffectSet` is a `u64` bitmask.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[repr(u8)]
pub enum Effect {
    /// Console output (`display`, `newline`)
    Io = 0,
    Time = 1,
    Rand = 2,
}

impl Effect {
    #[inline]
    pub fn bit(self) -> u64 {
        1u64 << (self as u8)
    }

    pub fn name(self) -> &'static str {
        match self {
            Effect::Io => "io",
            Effect::Time => "time",
            Effect::Rand => "rand",
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Effect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_EFFECTS
            .iter()
            .copied()
            .find(|e| e.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown effect `{}` (expected io, time or rand)", s))
    }
}

/// All known effects, in discriminant order.
pub const ALL_EFFECTS: &[Effect] = &[Effect::Io, Effect::Time, Effect::Rand];

#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct EffectSet {
    bits: u64,
}

impl fmt::Debug for EffectSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl EffectSet {
    /// No effects.
    pub const fn pure() -> Self {
        Self { bits: 0 }
    }

    pub const fn singleton(e: Effect) -> Self {
        Self {
            bits: 1u64 << (e as u8),
        }
    }

    #[inline]
    pub fn is_pure(&self) -> bool {
        self.bits == 0
    }

    #[inline]
    pub fn contains(&self, e: Effect) -> bool {
        (self.bits & e.bit()) != 0
    }

    #[inline]
    pub fn insert(&mut self, e: Effect) {
        self.bits |= e.bit();
    }

    pub fn union(self, other: Self) -> Self {
        Self {
            bits: self.bits | other.bits,
        }
    }

    /// Is `self ⊆ other`?
    pub fn is_subset_of(&self, other: &Self) -> bool {
        (self.bits | other.bits) == other.bits
    }

    /// Effects in `self` that `allowed` does not contain.
    pub fn denied_by(&self, allowed: &Self) -> Self {
        Self {
            bits: self.bits & !allowed.bits,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Effect> {
        let mask = self.bits;
        ALL_EFFECTS
            .iter()
            .copied()
            .filter(move |e| (mask & e.bit()) != 0)
    }
}

impl FromIterator<Effect> for EffectSet {
    fn from_iter<I: IntoIterator<Item = Effect>>(iter: I) -> Self {
        let mut set = Self::pure();
        for e in iter {
            set.insert(e);
        }
        set
    }
}

impl fmt::Display for EffectSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, e) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", e)?;
        }
        write!(f, "}}")
    }
}
