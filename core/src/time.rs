use std::time::{SystemTime, UNIX_EPOCH};

/// Source of network-adjusted time. The node keeps a median offset against
/// its peers; template building and the priority lane read through this so
/// tests can pin the clock.
pub trait TimeSource: Send + Sync {
    fn adjusted_time(&self) -> u32;
}

/// Wall-clock time source with no peer offset.
#[derive(Debug, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn adjusted_time(&self) -> u32 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0)
    }
}

/// Fixed time source for tests.
#[derive(Debug)]
pub struct FixedTimeSource(pub u32);

impl TimeSource for FixedTimeSource {
    fn adjusted_time(&self) -> u32 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_time_is_sane() {
        // Past 2020, before 2120.
        let now = SystemTimeSource.adjusted_time();
        assert!(now > 1_577_836_800);
        assert!(now < u32::MAX);
    }

    #[test]
    fn test_fixed_time() {
        assert_eq!(FixedTimeSource(1234).adjusted_time(), 1234);
    }
}
