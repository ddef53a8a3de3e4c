//! Rational numbers for tick resolutions

use serde::{Deserialize, Serialize};

/// Reduced fraction `num / den` with a positive denominator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct Ratio {
    pub num: i64,
    pub den: i64,
}

impl Ratio {
    /// Build a ratio, normalizing sign and reducing to lowest terms.
    ///
    /// Returns `None` when `den` is zero.
    pub fn new(num: i64, den: i64) -> Option<Self> {
        if den == 0 {
            return None;
        }
        let sign = if den < 0 { -1 } else { 1 };
        let g = gcd(num.unsigned_abs(), den.unsigned_abs()).max(1) as i64;
        Some(Self { num: sign * num / g, den: sign * den / g })
    }

    /// Ratio `1 / den`, the usual form of a tick resolution.
    pub fn per(den: i64) -> Option<Self> {
        Self::new(1, den)
    }

    pub fn is_positive(&self) -> bool {
        self.num > 0 && self.den > 0
    }

    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl Default for Ratio {
    fn default() -> Self {
        Self { num: 1, den: 1 }
    }
}

impl std::fmt::Display for Ratio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

pub(crate) fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Least common multiple, `None` on overflow.
pub(crate) fn lcm(a: u64, b: u64) -> Option<u64> {
    if a == 0 || b == 0 {
        return Some(0);
    }
    (a / gcd(a, b)).checked_mul(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_reduces_and_normalizes_sign() {
        assert_eq!(Ratio::new(2, 4), Some(Ratio { num: 1, den: 2 }));
        assert_eq!(Ratio::new(3, -9), Some(Ratio { num: -1, den: 3 }));
        assert_eq!(Ratio::new(1, 0), None);
        assert!(Ratio::per(1000).map(|r| r.is_positive()).unwrap_or(false));
    }

    #[test]
    fn lcm_of_resolution_denominators() {
        assert_eq!(lcm(1000, 1024), Some(128_000));
        assert_eq!(lcm(4, 6), Some(12));
        assert_eq!(lcm(u64::MAX, u64::MAX - 1), None);
    }
}
