//! A 64-entry sliding bitmap for duplicate detection.
//!
//! Used twice: once over nonce counters (replay protection) and once over
//! reliable sequence numbers (at-most-once delivery). Bit 0 is the highest
//! value seen so far, bit `n` is `highest - n`.

/// How a value relates to what the window has already recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seen {
    New,
    Duplicate,
    /// Too far behind the highest value to tell. Nothing was recorded.
    Stale,
}

#[derive(Debug, Default, Clone)]
pub struct SlidingWindow {
    highest: Option<u64>,
    bitmap: u64,
}

impl SlidingWindow {
    /// How far behind the highest value an entry may arrive.
    pub const SIZE: u64 = 64;

    pub fn new() -> Self {
        Self::default()
    }

    /// Records `value` and returns `true` if it is new.
    ///
    /// Values more than [`Self::SIZE`] behind the highest one seen are
    /// treated as already seen.
    pub fn check_and_record(&mut self, value: u64) -> bool {
        self.record(value) == Seen::New
    }

    /// Records `value`, telling apart a real duplicate from one that fell
    /// out of the window.
    pub fn record(&mut self, value: u64) -> Seen {
        let Some(highest) = self.highest else {
            self.highest = Some(value);
            self.bitmap = 1;
            return Seen::New;
        };

        if value > highest {
            let shift = value - highest;
            self.bitmap = if shift >= Self::SIZE {
                1
            } else {
                (self.bitmap << shift) | 1
            };
            self.highest = Some(value);
            return Seen::New;
        }

        let offset = highest - value;
        if offset >= Self::SIZE {
            return Seen::Stale;
        }
        let bit = 1u64 << offset;
        if self.bitmap & bit != 0 {
            return Seen::Duplicate;
        }
        self.bitmap |= bit;
        Seen::New
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_and_record_first_value_accepted() {
        let mut w = SlidingWindow::new();
        assert!(w.check_and_record(0));
    }

    #[test]
    fn test_check_and_record_duplicate_rejected() {
        let mut w = SlidingWindow::new();
        assert!(w.check_and_record(5));
        assert!(!w.check_and_record(5));
    }

    #[test]
    fn test_check_and_record_out_of_order_within_window_accepted_once() {
        let mut w = SlidingWindow::new();
        assert!(w.check_and_record(10));
        assert!(w.check_and_record(8));
        assert!(w.check_and_record(9));
        assert!(!w.check_and_record(8));
        assert!(!w.check_and_record(9));
    }

    #[test]
    fn test_check_and_record_too_old_rejected() {
        let mut w = SlidingWindow::new();
        assert!(w.check_and_record(100));
        assert!(!w.check_and_record(100 - SlidingWindow::SIZE));
        assert!(w.check_and_record(100 - SlidingWindow::SIZE + 1));
    }

    #[test]
    fn test_record_distinguishes_duplicate_from_stale() {
        let mut w = SlidingWindow::new();
        assert_eq!(w.record(100), Seen::New);
        assert_eq!(w.record(100), Seen::Duplicate);
        assert_eq!(w.record(100 - SlidingWindow::SIZE), Seen::Stale);
        // A stale value leaves no trace.
        assert_eq!(w.record(100 - SlidingWindow::SIZE), Seen::Stale);
    }

    #[test]
    fn test_check_and_record_large_jump_resets_bitmap() {
        let mut w = SlidingWindow::new();
        assert!(w.check_and_record(1));
        assert!(w.check_and_record(1_000));
        assert!(!w.check_and_record(1_000));
        assert!(w.check_and_record(999));
    }
}
