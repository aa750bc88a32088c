use std::fmt;

use serde::{Deserialize, Serialize};

/// Fee rate in satoshis per 1000 bytes of serialized size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeeRate {
    sat_per_kb: i64,
}

impl FeeRate {
    pub const ZERO: FeeRate = FeeRate { sat_per_kb: 0 };

    pub fn from_sat_per_kb(sat_per_kb: i64) -> Self {
        Self { sat_per_kb }
    }

    pub fn sat_per_kb(&self) -> i64 {
        self.sat_per_kb
    }

    /// Fee owed by `size` bytes at this rate. A positive rate never rounds
    /// down to a zero fee for a non-empty payload.
    pub fn fee_for(&self, size: u64) -> i64 {
        let fee = self.sat_per_kb * size as i64 / 1000;
        if fee == 0 && size != 0 && self.sat_per_kb != 0 {
            if self.sat_per_kb > 0 {
                return 1;
            }
            return -1;
        }
        fee
    }

    /// Rate implied by paying `fee` satoshis for `size` bytes.
    pub fn from_fee_and_size(fee: i64, size: u64) -> Self {
        if size == 0 {
            return Self::ZERO;
        }
        Self {
            sat_per_kb: fee * 1000 / size as i64,
        }
    }
}

impl fmt::Display for FeeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} sat/kB", self.sat_per_kb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fee_for_size() {
        let rate = FeeRate::from_sat_per_kb(1000);
        assert_eq!(rate.fee_for(250), 250);
        assert_eq!(rate.fee_for(1000), 1000);
    }

    #[test]
    fn test_fee_never_rounds_to_zero() {
        let rate = FeeRate::from_sat_per_kb(1);
        assert_eq!(rate.fee_for(100), 1);
        assert_eq!(FeeRate::ZERO.fee_for(100), 0);
        assert_eq!(rate.fee_for(0), 0);
    }

    #[test]
    fn test_from_fee_and_size() {
        let rate = FeeRate::from_fee_and_size(5000, 250);
        assert_eq!(rate.sat_per_kb(), 20_000);
        assert_eq!(FeeRate::from_fee_and_size(1, 0), FeeRate::ZERO);
    }
}
