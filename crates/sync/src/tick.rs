use std::time::Duration;

/// Accumulates wall-clock time and hands it out in fixed ticks.
#[derive(Debug, Clone)]
pub struct FixedTimestep {
    tick_rate: u32,
    dt: Duration,
    accumulator: Duration,
}

/// Longest frame the accumulator will absorb; anything beyond is dropped so
/// a stalled host does not spiral trying to catch up.
const MAX_FRAME: Duration = Duration::from_millis(250);

impl FixedTimestep {
    pub fn new(tick_rate: u32) -> Self {
        let tick_rate = tick_rate.max(1);
        Self {
            tick_rate,
            dt: Duration::from_secs_f64(1.0 / tick_rate as f64),
            accumulator: Duration::ZERO,
        }
    }

    pub fn tick_rate(&self) -> u32 {
        self.tick_rate
    }

    pub fn dt(&self) -> Duration {
        self.dt
    }

    pub fn accumulate(&mut self, delta: Duration) {
        self.accumulator += delta.min(MAX_FRAME);
    }

    pub fn consume_tick(&mut self) -> bool {
        if self.accumulator >= self.dt {
            self.accumulator -= self.dt;
            true
        } else {
            false
        }
    }

    /// Time left until the next tick is due.
    pub fn until_next(&self) -> Duration {
        self.dt.saturating_sub(self.accumulator)
    }

    pub fn reset(&mut self) {
        self.accumulator = Duration::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consumes_whole_ticks_only() {
        let mut timestep = FixedTimestep::new(50);
        timestep.accumulate(Duration::from_millis(50));
        assert!(timestep.consume_tick());
        assert!(timestep.consume_tick());
        assert!(!timestep.consume_tick());
        assert_eq!(timestep.until_next(), Duration::from_millis(10));
    }

    #[test]
    fn long_stall_is_clamped() {
        let mut timestep = FixedTimestep::new(100);
        timestep.accumulate(Duration::from_secs(5));
        let ticks = std::iter::from_fn(|| timestep.consume_tick().then_some(())).count();
        assert_eq!(ticks, 25);
    }
}
