//! Contention window and backoff counter of the distributed coordination function.

/// Contention window with binary exponential growth.
#[derive(Clone, Debug)]
pub struct ContentionWindow {
    min: u32,
    max: u32,
    current: u32,
}

impl ContentionWindow {
    /// Creates the window starting at `min`.
    pub fn new(min: u32, max: u32) -> Self {
        Self {
            min,
            max: max.max(min),
            current: min,
        }
    }

    /// Returns the current window size.
    pub fn value(&self) -> u32 {
        self.current
    }

    /// Doubles the window after a failed attempt, up to the maximum.
    pub fn on_failure(&mut self) {
        self.current = self.current.saturating_mul(2).min(self.max);
    }

    /// Resets the window to the minimum after success or drop.
    pub fn reset(&mut self) {
        self.current = self.min;
    }
}

/// Backoff counter which runs down slot by slot while the medium is idle.
///
/// The countdown starts after the medium has been idle for an interframe space and is paused
/// (never reset) whenever the medium becomes busy.
#[derive(Clone, Debug, Default)]
pub struct Backoff {
    slots: u32,
    countdown_start: Option<f64>,
}

impl Backoff {
    /// Sets a new counter value.
    pub fn set(&mut self, slots: u32) {
        self.slots = slots;
        self.countdown_start = None;
    }

    /// Returns the number of remaining slots.
    pub fn slots(&self) -> u32 {
        self.slots
    }

    /// Checks whether the counter is running down.
    pub fn is_running(&self) -> bool {
        self.countdown_start.is_some()
    }

    /// Starts the countdown at `start` and returns the time it reaches zero.
    pub fn resume(&mut self, start: f64, slot: f64) -> f64 {
        self.countdown_start = Some(start);
        start + self.slots as f64 * slot
    }

    /// Stops the countdown at `now`, subtracting the slots which fully elapsed.
    pub fn pause(&mut self, now: f64, slot: f64) {
        if let Some(start) = self.countdown_start.take() {
            if now > start {
                // tolerate rounding of slot boundaries
                let elapsed = ((now - start) / slot + 1e-9).floor() as u32;
                self.slots -= elapsed.min(self.slots);
            }
        }
    }

    /// Marks the counter as expired.
    pub fn finish(&mut self) {
        self.slots = 0;
        self.countdown_start = None;
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(0, 15)]
    #[case(1, 30)]
    #[case(2, 60)]
    #[case(3, 120)]
    #[case(6, 960)]
    #[case(7, 1023)]
    #[case(12, 1023)]
    fn window_after_failures(#[case] failures: u32, #[case] expected: u32) {
        let mut cw = ContentionWindow::new(15, 1023);
        for _ in 0..failures {
            cw.on_failure();
        }
        assert_eq!(cw.value(), expected);
        assert_eq!(cw.value(), (15u32 << failures.min(10)).min(1023));
        cw.reset();
        assert_eq!(cw.value(), 15);
    }

    #[test]
    fn busy_medium_pauses_countdown() {
        let slot = 9e-6;
        let mut backoff = Backoff::default();
        backoff.set(10);
        let end = backoff.resume(34e-6, slot);
        assert!((end - (34e-6 + 90e-6)).abs() < 1e-12);

        // 3.5 slots elapsed, 3 are counted
        backoff.pause(34e-6 + 3.5 * slot, slot);
        assert_eq!(backoff.slots(), 7);
        assert!(!backoff.is_running());

        // busy before the countdown started
        backoff.resume(1e-3, slot);
        backoff.pause(0.9e-3, slot);
        assert_eq!(backoff.slots(), 7);

        backoff.resume(2e-3, slot);
        backoff.pause(2e-3 + 100. * slot, slot);
        assert_eq!(backoff.slots(), 0);
    }
}
