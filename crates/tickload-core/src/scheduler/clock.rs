//! Clock sources feeding scheduler tasks
//!
//! A task reads one of two clocks: the scaled clock (host time subject to a
//! time scale, e.g. a paused simulation) or the unscaled clock (real time).
//! The scheduler only ever asks for a reading; who advances the clock is up
//! to the host.

use parking_lot::Mutex;
use tickload_types::ClockDomain;

/// Source of the two clock readings, in seconds
pub trait ClockSource: Send + Sync {
    /// Current reading of the given clock
    fn now(&self, domain: ClockDomain) -> f64;

    /// Called by `TaskScheduler::tick` with the deltas the host passed in.
    /// Clocks that read host time directly can ignore it.
    fn advance(&self, _scaled_delta: f64, _unscaled_delta: f64) {}
}

/// Clock that only moves when the scheduler is ticked
#[derive(Debug, Default)]
pub struct TickClock {
    readings: Mutex<Readings>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Readings {
    scaled: f64,
    unscaled: f64,
}

impl TickClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ClockSource for TickClock {
    fn now(&self, domain: ClockDomain) -> f64 {
        let readings = self.readings.lock();
        match domain {
            ClockDomain::Scaled => readings.scaled,
            ClockDomain::Unscaled => readings.unscaled,
        }
    }

    fn advance(&self, scaled_delta: f64, unscaled_delta: f64) {
        let mut readings = self.readings.lock();
        // Clocks never run backwards
        if scaled_delta.is_finite() && scaled_delta > 0.0 {
            readings.scaled += scaled_delta;
        }
        if unscaled_delta.is_finite() && unscaled_delta > 0.0 {
            readings.unscaled += unscaled_delta;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domains_advance_independently() {
        let clock = TickClock::new();
        clock.advance(0.5, 1.0);
        clock.advance(0.0, 1.0);
        assert_eq!(clock.now(ClockDomain::Scaled), 0.5);
        assert_eq!(clock.now(ClockDomain::Unscaled), 2.0);
    }

    #[test]
    fn negative_and_nan_deltas_are_ignored() {
        let clock = TickClock::new();
        clock.advance(1.0, 1.0);
        clock.advance(-3.0, f64::NAN);
        assert_eq!(clock.now(ClockDomain::Scaled), 1.0);
        assert_eq!(clock.now(ClockDomain::Unscaled), 1.0);
    }
}
