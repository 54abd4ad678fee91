//! Debounced filament-runout latch.
//!
//! The runout switch is a simple presence contact and chatters near the end
//! of a spool. `debounce_n` consecutive "absent" samples are required to
//! latch; any "present" sample resets the count. The latch holds until
//! `reset()` so the pause dispatcher sees a stable signal.

#[derive(Debug, Clone)]
pub struct RunoutLatch {
    debounce_n: u8,
    absent_count: u8,
    latched: bool,
}

impl RunoutLatch {
    pub fn new(debounce_n: u8) -> Self {
        Self {
            debounce_n: debounce_n.max(1),
            absent_count: 0,
            latched: false,
        }
    }

    /// Feed one switch sample (`true` = filament present). Returns the latch
    /// state after the sample.
    pub fn sample(&mut self, present: bool) -> bool {
        if present {
            self.absent_count = 0;
        } else if !self.latched {
            self.absent_count = self.absent_count.saturating_add(1);
            if self.absent_count >= self.debounce_n {
                tracing::warn!(samples = self.absent_count, "filament runout latched");
                self.latched = true;
            }
        }
        self.latched
    }

    pub fn is_runout(&self) -> bool {
        self.latched
    }

    pub fn reset(&mut self) {
        self.absent_count = 0;
        self.latched = false;
    }
}

#[cfg(test)]
mod tests {
    use super::RunoutLatch;

    #[test]
    fn latches_after_exactly_n_consecutive_absent_samples() {
        let mut r = RunoutLatch::new(3);
        assert!(!r.sample(false));
        assert!(!r.sample(false));
        assert!(r.sample(false));
        assert!(r.is_runout());
    }

    #[test]
    fn present_sample_resets_the_count() {
        let mut r = RunoutLatch::new(3);
        r.sample(false);
        r.sample(false);
        r.sample(true);
        assert!(!r.sample(false));
        assert!(!r.sample(false));
        assert!(!r.is_runout());
    }

    #[test]
    fn latch_holds_until_reset() {
        let mut r = RunoutLatch::new(1);
        r.sample(false);
        assert!(r.is_runout());
        // Filament re-seated; latch still holds for the dispatcher.
        r.sample(true);
        assert!(r.is_runout());
        r.reset();
        assert!(!r.is_runout());
    }

    #[test]
    fn zero_debounce_behaves_as_one() {
        let mut r = RunoutLatch::new(0);
        assert!(r.sample(false));
    }
}
