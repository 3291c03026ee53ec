//! A fixed-size timer wheel for delivery-timeout enforcement (spec.md §5,
//! SPEC_FULL.md §4). Each slot is an independently locked bucket of
//! callbacks; a background tick advances the wheel and fires whatever has
//! landed in the slot it just entered. Durations longer than `slot_count *
//! slot_interval` require the caller to reschedule from within the fired
//! callback (spec.md §5 "Cancellation").

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

type Callback = Box<dyn FnOnce() + Send + 'static>;

struct Slot {
    entries: Mutex<Vec<Callback>>,
}

struct Inner {
    slots: Vec<Slot>,
    slot_interval: Duration,
    cursor: AtomicUsize,
}

/// A handle shareable across the tasks that register timeouts and the
/// single task that drives `tick`.
#[derive(Clone)]
pub struct TimerWheel {
    inner: Arc<Inner>,
}

impl TimerWheel {
    pub fn new(slot_count: usize, slot_interval: Duration) -> Self {
        assert!(slot_count > 0, "a timer wheel needs at least one slot");
        let slots = (0..slot_count)
            .map(|_| Slot {
                entries: Mutex::new(Vec::new()),
            })
            .collect();
        Self {
            inner: Arc::new(Inner {
                slots,
                slot_interval,
                cursor: AtomicUsize::new(0),
            }),
        }
    }

    pub fn slot_count(&self) -> usize {
        self.inner.slots.len()
    }

    pub fn max_duration(&self) -> Duration {
        self.inner.slot_interval * self.inner.slots.len() as u32
    }

    /// Registers `callback` to fire no earlier than `after`. Durations
    /// beyond `max_duration()` are clamped to the wheel's last slot; the
    /// callback is expected to re-register itself if it still needs to
    /// wait longer once it fires.
    pub fn schedule(&self, after: Duration, callback: impl FnOnce() + Send + 'static) {
        let slot_count = self.inner.slots.len();
        let ticks = (duration_ticks(after, self.inner.slot_interval)).min(slot_count - 1);
        let cursor = self.inner.cursor.load(Ordering::Acquire);
        // `tick()` fires the slot it advances *into*, so the n-th tick call
        // from now lands on slot `cursor + n`; a zero-tick request still
        // needs one tick call to be observed, hence `max(ticks, 1)`.
        let slot = (cursor + ticks.max(1)) % slot_count;
        self.inner.slots[slot].entries.lock().push(Box::new(callback));
    }

    /// Advances the wheel by one slot interval, firing everything that
    /// landed in the slot being entered. Intended to be driven by a single
    /// periodic task (e.g. a `tokio::time::interval`).
    pub fn tick(&self) {
        let slot_count = self.inner.slots.len();
        let cursor = (self.inner.cursor.fetch_add(1, Ordering::AcqRel) + 1) % slot_count;
        let fired: Vec<Callback> = std::mem::take(&mut *self.inner.slots[cursor].entries.lock());
        for cb in fired {
            cb();
        }
    }

    pub fn slot_interval(&self) -> Duration {
        self.inner.slot_interval
    }
}

fn duration_ticks(d: Duration, slot_interval: Duration) -> usize {
    if slot_interval.is_zero() {
        return 0;
    }
    let ticks = d.as_secs_f64() / slot_interval.as_secs_f64();
    ticks.ceil() as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn fires_after_enough_ticks() {
        let wheel = TimerWheel::new(4, Duration::from_millis(10));
        let fired = Arc::new(AtomicBool::new(false));
        let f = fired.clone();
        wheel.schedule(Duration::from_millis(25), move || {
            f.store(true, Ordering::SeqCst);
        });

        wheel.tick();
        assert!(!fired.load(Ordering::SeqCst));
        wheel.tick();
        assert!(!fired.load(Ordering::SeqCst));
        wheel.tick();
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn zero_duration_fires_on_next_tick() {
        let wheel = TimerWheel::new(4, Duration::from_millis(10));
        let fired = Arc::new(AtomicBool::new(false));
        let f = fired.clone();
        wheel.schedule(Duration::from_millis(0), move || {
            f.store(true, Ordering::SeqCst);
        });
        wheel.tick();
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn duration_beyond_wheel_is_clamped_not_lost() {
        let wheel = TimerWheel::new(2, Duration::from_millis(10));
        let fired = Arc::new(AtomicBool::new(false));
        let f = fired.clone();
        wheel.schedule(Duration::from_secs(1000), move || {
            f.store(true, Ordering::SeqCst);
        });
        wheel.tick();
        wheel.tick();
        assert!(fired.load(Ordering::SeqCst));
    }
}
