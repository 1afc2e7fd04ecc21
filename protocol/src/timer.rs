//! The round-timer profiles a host can pick when starting the draft.

use std::time::Duration;

/// Floor for a single pick, no matter how deep into the pack the draft is.
pub const MIN_ROUND_TIME: Duration = Duration::from_secs(3);

/// Every elapsed round shaves this much off the budget.
const DECREMENT_SECS: u64 = 5;

/// The pacing profiles. Each starts from a base budget and tightens by
/// [`DECREMENT_SECS`] per round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundTimer {
    /// Starts at 90 s.
    Leisurely,
    /// Starts at 75 s.
    Slow,
    /// Starts at 55 s, a happy medium between slow and fast.
    Moderate,
    /// Starts at 40 s, based on official WOTC timing.
    Fast,
}

impl RoundTimer {
    /// Parses the wire value from a `start_game` request. Returns `None` for
    /// the empty string and anything unrecognized, which both mean "no
    /// timer".
    pub fn parse(value: &str) -> Option<RoundTimer> {
        match value {
            "leisurely" => Some(RoundTimer::Leisurely),
            "slow" => Some(RoundTimer::Slow),
            "moderate" => Some(RoundTimer::Moderate),
            "fast" => Some(RoundTimer::Fast),
            _ => None,
        }
    }

    fn base_secs(self) -> u64 {
        match self {
            RoundTimer::Leisurely => 90,
            RoundTimer::Slow => 75,
            RoundTimer::Moderate => 55,
            RoundTimer::Fast => 40,
        }
    }

    /// Pick budget for the given 1-based round within the current pack.
    pub fn round_time(self, round: u32) -> Duration {
        let spent = DECREMENT_SECS.saturating_mul(u64::from(round.saturating_sub(1)));
        let budget = Duration::from_secs(self.base_secs().saturating_sub(spent));
        budget.max(MIN_ROUND_TIME)
    }
}
