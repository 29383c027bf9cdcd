//! Bounded hardware polling
//!
//! Reset and port timing windows are part of the UHCI protocol contract, so
//! waits on hardware state are explicit tick loops with an iteration bound
//! and a defined fallback, never unbounded sleeps.

use embedded_hal::delay::DelayNs;

use crate::error::Result;

/// Result of a bounded wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WaitOutcome {
    /// Predicate became true within the tick budget
    Satisfied,
    /// Tick budget expired with the predicate still false
    TimedOut,
}

impl WaitOutcome {
    /// Whether the condition was observed before the budget expired
    #[inline(always)]
    pub fn is_satisfied(self) -> bool {
        matches!(self, Self::Satisfied)
    }
}

/// Poll `predicate` up to `max_ticks` times, sleeping `tick_ms` before each
/// check.
///
/// The delay runs before the first check, matching the hardware windows the
/// reset and port protocols expect. Register read failures inside the
/// predicate propagate to the caller.
pub fn wait_until<D, F>(
    delay: &mut D,
    max_ticks: u32,
    tick_ms: u32,
    mut predicate: F,
) -> Result<WaitOutcome>
where
    D: DelayNs,
    F: FnMut() -> Result<bool>,
{
    for _ in 0..max_ticks {
        delay.delay_ms(tick_ms);
        if predicate()? {
            return Ok(WaitOutcome::Satisfied);
        }
    }
    Ok(WaitOutcome::TimedOut)
}
