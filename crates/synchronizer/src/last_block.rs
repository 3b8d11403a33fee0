use std::time::{Duration, Instant};

/// The last block on L1 as observed at some point in time, valid until its TTL expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastBlockOnL1 {
    last_block: u64,
    expires_at: Instant,
    lasts_forever: bool,
}

impl Default for LastBlockOnL1 {
    fn default() -> Self {
        Self { last_block: 0, expires_at: Instant::now(), lasts_forever: false }
    }
}

impl LastBlockOnL1 {
    /// Returns a new [`LastBlockOnL1`] observed now. A `None` TTL never expires.
    pub fn new(last_block: u64, ttl: Option<Duration>) -> Self {
        let now = Instant::now();
        match ttl {
            Some(ttl) => Self { last_block, expires_at: now + ttl, lasts_forever: false },
            None => Self { last_block, expires_at: now, lasts_forever: true },
        }
    }

    /// Returns the block number.
    pub const fn last_block(&self) -> u64 {
        self.last_block
    }

    /// Block 0 is the "unknown" value.
    pub const fn is_valid(&self) -> bool {
        self.last_block != 0
    }

    /// Returns true if the TTL expired. An invalid value is always outdated.
    pub fn is_outdated(&self) -> bool {
        if !self.is_valid() {
            return true;
        }
        !self.lasts_forever && Instant::now() >= self.expires_at
    }

    /// Returns the time left until the TTL expires, `None` if it never does.
    pub fn time_to_expiry(&self) -> Option<Duration> {
        (!self.lasts_forever).then(|| self.expires_at.saturating_duration_since(Instant::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_invalid_and_outdated() {
        let last_block = LastBlockOnL1::default();
        assert!(!last_block.is_valid());
        assert!(last_block.is_outdated());
    }

    #[test]
    fn test_ttl_expiry() {
        let fresh = LastBlockOnL1::new(100, Some(Duration::from_secs(60)));
        assert!(fresh.is_valid());
        assert!(!fresh.is_outdated());
        assert!(fresh.time_to_expiry().is_some_and(|d| d > Duration::from_secs(50)));

        let expired = LastBlockOnL1::new(100, Some(Duration::ZERO));
        assert!(expired.is_outdated());
    }

    #[test]
    fn test_lasts_forever() {
        let forever = LastBlockOnL1::new(100, None);
        assert!(!forever.is_outdated());
        assert_eq!(forever.time_to_expiry(), None);
    }
}
