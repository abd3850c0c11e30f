use serde::{Deserialize, Serialize};
use std::fmt;

/// Integer credit amount. Credits are whole units, never fractional,
/// and never negative.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Credits(u64);

impl Credits {
    pub const ZERO: Credits = Credits(0);

    pub const fn new(value: u64) -> Self {
        Credits(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Subtraction that fails on underflow instead of panicking.
    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Credits)
    }

    /// Subtraction clamped at zero.
    pub fn saturating_sub(self, rhs: Self) -> Self {
        Credits(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Display for Credits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Credits {
    fn from(value: u64) -> Self {
        Credits(value)
    }
}

impl std::ops::Add for Credits {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Credits(self.0 + rhs.0)
    }
}

impl std::ops::AddAssign for Credits {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_preserves_value() {
        assert_eq!(Credits::new(42).get(), 42);
    }

    #[test]
    fn default_is_zero() {
        assert_eq!(Credits::default(), Credits::ZERO);
        assert!(Credits::default().is_zero());
    }

    #[test]
    fn display_formats_whole_units() {
        assert_eq!(Credits::new(0).to_string(), "0");
        assert_eq!(Credits::new(125).to_string(), "125");
    }

    #[test]
    fn add() {
        assert_eq!(Credits::new(100) + Credits::new(50), Credits::new(150));
    }

    #[test]
    fn add_assign() {
        let mut c = Credits::new(100);
        c += Credits::new(50);
        assert_eq!(c, Credits::new(150));
    }

    #[test]
    fn checked_sub_underflow_is_none() {
        assert_eq!(Credits::new(3).checked_sub(Credits::new(5)), None);
        assert_eq!(
            Credits::new(5).checked_sub(Credits::new(3)),
            Some(Credits::new(2))
        );
    }

    #[test]
    fn saturating_sub_clamps_at_zero() {
        assert_eq!(
            Credits::new(3).saturating_sub(Credits::new(5)),
            Credits::ZERO
        );
    }

    #[test]
    fn ordering() {
        assert!(Credits::new(100) < Credits::new(200));
        assert!(Credits::new(200) > Credits::new(100));
    }
}
