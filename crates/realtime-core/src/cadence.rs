//! Per-task tick cadence.
//!
//! A [`Cadence`] fires on every Nth tick of the shared scheduler, so one
//! timer can drive tasks with different periods. The first firing is on
//! tick N, not tick 1: weather with N=2 skips the startup tick and runs on
//! ticks 2, 4, 6, ...

use std::num::NonZeroU64;

/// Fires once every `period` ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    period: NonZeroU64,
    /// Ticks since the last firing, in `0..period`.
    elapsed: u64,
}

impl Cadence {
    /// A cadence that fires every `period` ticks.
    pub const fn every(period: NonZeroU64) -> Self {
        Self { period, elapsed: 0 }
    }

    /// A cadence from a raw tick count. Zero is treated as one.
    pub fn every_ticks(period: u64) -> Self {
        Self::every(NonZeroU64::new(period).unwrap_or(NonZeroU64::MIN))
    }

    /// A cadence that fires on every tick.
    pub const fn always() -> Self {
        Self::every(NonZeroU64::MIN)
    }

    /// The configured period.
    pub const fn period(&self) -> u64 {
        self.period.get()
    }

    /// Advance by one tick. Returns `true` if the task is due this tick.
    pub fn tick(&mut self) -> bool {
        self.elapsed = self
            .elapsed
            .saturating_add(1)
            .checked_rem(self.period.get())
            .unwrap_or(0);
        self.elapsed == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn firings(cadence: &mut Cadence, ticks: usize) -> Vec<bool> {
        (0..ticks).map(|_| cadence.tick()).collect()
    }

    #[test]
    fn every_other_tick_starts_on_second() {
        let mut cadence = Cadence::every_ticks(2);
        assert_eq!(
            firings(&mut cadence, 6),
            vec![false, true, false, true, false, true]
        );
    }

    #[test]
    fn always_fires_each_tick() {
        let mut cadence = Cadence::always();
        assert!(firings(&mut cadence, 4).into_iter().all(|due| due));
    }

    #[test]
    fn zero_period_is_one() {
        let mut cadence = Cadence::every_ticks(0);
        assert_eq!(cadence.period(), 1);
        assert!(cadence.tick());
    }

    #[test]
    fn longer_period() {
        let mut cadence = Cadence::every_ticks(3);
        assert_eq!(
            firings(&mut cadence, 7),
            vec![false, false, true, false, false, true, false]
        );
    }
}
