use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct TimeBase {
    start: Instant,
}

impl TimeBase {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Monotonic microseconds since start.
    pub fn now_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::new()
    }
}

/// Time source and blocking delay used between output steps.
pub trait Clock: Send {
    fn now_us(&self) -> u64;
    fn sleep_us(&self, us: u64);
}

/// Real-time clock. Sleeps coarsely, then spins out the last stretch so
/// short step delays are not rounded up to the scheduler tick.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    timebase: TimeBase,
    spin_threshold: Duration,
}

impl MonotonicClock {
    pub const DEFAULT_SPIN_THRESHOLD: Duration = Duration::from_micros(200);

    pub fn new(timebase: TimeBase) -> Self {
        Self {
            timebase,
            spin_threshold: Self::DEFAULT_SPIN_THRESHOLD,
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new(TimeBase::new())
    }
}

impl Clock for MonotonicClock {
    fn now_us(&self) -> u64 {
        self.timebase.now_us()
    }

    fn sleep_us(&self, us: u64) {
        if us == 0 {
            return;
        }
        let wait = Duration::from_micros(us);
        let deadline = Instant::now() + wait;
        if wait > self.spin_threshold {
            thread::sleep(wait - self.spin_threshold);
        }
        while Instant::now() < deadline {
            std::hint::spin_loop();
        }
    }
}

/// Clock that only moves when slept on. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_us: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance_us(&self, us: u64) {
        self.now_us.fetch_add(us, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_us(&self) -> u64 {
        self.now_us.load(Ordering::SeqCst)
    }

    fn sleep_us(&self, us: u64) {
        self.advance_us(us);
    }
}
