use chrono::NaiveDateTime;

use crate::sim::types::SimConfig;

/// One tick of the [`Clock`]: step index and its timestamp label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub step: usize,
    pub timestamp: NaiveDateTime,
}

/// A simulation clock that walks the fixed-interval timestamp index of a run.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDateTime;
/// use prosumer_sim::sim::clock::Clock;
/// use prosumer_sim::sim::types::SimConfig;
///
/// let start = NaiveDateTime::parse_from_str("2021-06-01 00:00", "%Y-%m-%d %H:%M").unwrap();
/// let mut clock = Clock::new(&SimConfig::new(start, 900.0, 3, 0));
/// let mut steps = Vec::new();
///
/// clock.run(|tick| steps.push(tick.step));
/// assert_eq!(steps, vec![0, 1, 2]);
/// ```
#[derive(Debug, Clone)]
pub struct Clock {
    config: SimConfig,
    current: usize,
}

impl Clock {
    pub fn new(config: &SimConfig) -> Self {
        Self {
            config: config.clone(),
            current: 0,
        }
    }

    /// Advances the clock by one step.
    ///
    /// # Returns
    ///
    /// * `Some(tick)` - The step before advancing, with its timestamp
    /// * `None` - If every step of the run has been handed out
    pub fn tick(&mut self) -> Option<Tick> {
        if self.current < self.config.steps {
            let step = self.current;
            self.current += 1;
            Some(Tick {
                step,
                timestamp: self.config.timestamp(step),
            })
        } else {
            None
        }
    }

    /// Steps left before the clock completes.
    pub fn remaining(&self) -> usize {
        self.config.steps - self.current
    }

    /// Calls `f` for each remaining tick.
    pub fn run(&mut self, mut f: impl FnMut(Tick)) {
        while let Some(tick) = self.tick() {
            f(tick);
        }
    }

    /// Calls `f` for each remaining tick, stopping at the first error.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by `f`; later ticks are not run.
    pub fn try_run<E>(&mut self, mut f: impl FnMut(Tick) -> Result<(), E>) -> Result<(), E> {
        while let Some(tick) = self.tick() {
            f(tick)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn config(steps: usize) -> SimConfig {
        let start = NaiveDateTime::parse_from_str("2021-06-01 00:00:00", "%Y-%m-%d %H:%M:%S")
            .expect("valid timestamp");
        SimConfig::new(start, 900.0, steps, 0)
    }

    #[test]
    fn test_tick() {
        let cfg = config(2);
        let mut clock = Clock::new(&cfg);
        assert_eq!(clock.remaining(), 2);
        assert_eq!(clock.tick().map(|t| t.step), Some(0));
        let second = clock.tick().expect("second tick");
        assert_eq!(second.timestamp, cfg.start + TimeDelta::minutes(15));
        assert_eq!(clock.tick(), None);
        assert_eq!(clock.remaining(), 0);
    }

    #[test]
    fn test_run() {
        let mut clock = Clock::new(&config(3));
        let mut steps = Vec::new();
        clock.run(|tick| steps.push(tick.step));
        assert_eq!(steps, vec![0, 1, 2]);
    }

    #[test]
    fn test_try_run_stops_at_error() {
        let mut clock = Clock::new(&config(5));
        let mut seen = Vec::new();
        let r = clock.try_run(|tick| {
            seen.push(tick.step);
            if tick.step == 2 { Err("boom") } else { Ok(()) }
        });
        assert_eq!(r, Err("boom"));
        assert_eq!(seen, vec![0, 1, 2]);
        assert_eq!(clock.remaining(), 2);
    }
}
