//! Wall-clock slot ticks shared by all cell threads.
//!
//! Cell threads meet at the scheduler's sync point every slot, so they must
//! all stop at the same slot or the remaining ones wait forever. A stop
//! request therefore picks a slot that no thread has started yet.

use std::time::{Duration, Instant};

use nrsched_id::{SlotPoint, NOF_SFNS};
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct ClockState {
    /// Highest slot number any thread has started.
    highest_started: Option<u64>,
    /// First slot number that must not be started.
    stop_at: Option<u64>,
}

/// Hands out slot numbers paced at one slot period.
#[derive(Debug)]
pub struct SlotClock {
    numerology: u8,
    period: Duration,
    start: Instant,
    state: Mutex<ClockState>,
}

impl SlotClock {
    /// Create a new clock starting now. `nof_slots` of zero runs until
    /// [`SlotClock::stop`] is called.
    pub fn new(numerology: u8, period: Duration, nof_slots: u32) -> Self {
        Self {
            numerology,
            period,
            start: Instant::now(),
            state: Mutex::new(ClockState {
                highest_started: None,
                stop_at: (nof_slots > 0).then_some(u64::from(nof_slots)),
            }),
        }
    }

    /// Waits for slot `n` and returns its slot point, or `None` once the
    /// clock is stopped.
    pub fn begin_slot(&self, n: u64) -> Option<SlotPoint> {
        {
            let mut st = self.state.lock();
            if st.stop_at.is_some_and(|stop| n >= stop) {
                return None;
            }
            st.highest_started = Some(st.highest_started.map_or(n, |h| h.max(n)));
        }

        let offset = self
            .period
            .saturating_mul(u32::try_from(n).unwrap_or(u32::MAX));
        if let Some(deadline) = self.start.checked_add(offset) {
            let now = Instant::now();
            if deadline > now {
                std::thread::sleep(deadline - now);
            }
        }

        let period = u64::from(NOF_SFNS) * (10u64 << self.numerology);
        SlotPoint::from_count(self.numerology, (n % period) as u32).ok()
    }

    /// Stops every thread at the same, not yet started, slot. Returns that
    /// slot number.
    pub fn stop(&self) -> u64 {
        let mut st = self.state.lock();
        let next = st.highest_started.map_or(0, |h| h + 1);
        let stop = st.stop_at.map_or(next, |s| s.min(next));
        st.stop_at = Some(stop);
        stop
    }
}
