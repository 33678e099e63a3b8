use crate::sweep::SweepState;
use std::sync::{Mutex, TryLockError};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SweepProgress {
    pub timestamp_us: u64,
    pub state: SweepState,
    pub samples_emitted: u64,
    pub cycles_completed: u64,
    pub last_level: u32,
    pub last_voltage: f64,
}

/// Latest-value slot between the sweep thread and whoever watches it.
///
/// Per-step updates never wait: if a reader holds the slot, that update is
/// skipped and the next step overwrites it anyway. Only the closing `Idle`
/// snapshot of a pass blocks.
#[derive(Debug, Default)]
pub struct ProgressExchange {
    latest: Mutex<SweepProgress>,
}

impl ProgressExchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called by the sweep engine every step (non-blocking)
    pub fn publish(&self, progress: SweepProgress) -> bool {
        match self.latest.try_lock() {
            Ok(mut slot) => {
                *slot = progress;
                true
            }
            Err(TryLockError::Poisoned(poisoned)) => {
                *poisoned.into_inner() = progress;
                true
            }
            Err(TryLockError::WouldBlock) => false,
        }
    }

    /// Final snapshot of a pass. Waits for the slot so a reader holding it
    /// cannot leave watchers stuck on the last running state.
    pub fn publish_idle(&self, timestamp_us: u64) {
        let mut slot = match self.latest.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        slot.state = SweepState::Idle;
        slot.timestamp_us = timestamp_us;
    }

    /// Called by monitor threads
    pub fn read(&self) -> SweepProgress {
        match self.latest.lock() {
            Ok(slot) => *slot,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_overwrites_previous_snapshot() {
        let exchange = ProgressExchange::new();
        assert_eq!(exchange.read().state, SweepState::Idle);

        assert!(exchange.publish(SweepProgress {
            samples_emitted: 1,
            last_level: 0,
            ..Default::default()
        }));
        assert!(exchange.publish(SweepProgress {
            samples_emitted: 2,
            last_level: 1,
            last_voltage: 0.5,
            ..Default::default()
        }));

        let latest = exchange.read();
        assert_eq!(latest.samples_emitted, 2);
        assert_eq!(latest.last_level, 1);
    }

    #[test]
    fn publish_skips_while_reader_holds_slot() {
        let exchange = ProgressExchange::new();
        let guard = exchange.latest.lock().unwrap();
        assert!(!exchange.publish(SweepProgress {
            samples_emitted: 7,
            ..Default::default()
        }));
        drop(guard);
        assert_eq!(exchange.read().samples_emitted, 0);
    }

    #[test]
    fn publish_idle_waits_for_held_slot() {
        use std::sync::{mpsc, Arc};
        use std::thread;
        use std::time::Duration;

        let exchange = Arc::new(ProgressExchange::new());
        assert!(exchange.publish(SweepProgress {
            state: SweepState::Ascending {
                rate_index: 0,
                cycle: 0,
                level: 4,
            },
            samples_emitted: 5,
            last_level: 4,
            ..Default::default()
        }));

        let (held_tx, held_rx) = mpsc::channel();
        let reader = {
            let exchange = Arc::clone(&exchange);
            thread::spawn(move || {
                let guard = exchange.latest.lock().unwrap();
                held_tx.send(()).unwrap();
                thread::sleep(Duration::from_millis(50));
                drop(guard);
            })
        };
        held_rx.recv().unwrap();

        exchange.publish_idle(1234);
        reader.join().unwrap();

        let latest = exchange.read();
        assert_eq!(latest.state, SweepState::Idle);
        assert_eq!(latest.timestamp_us, 1234);
        assert_eq!(latest.samples_emitted, 5);
        assert_eq!(latest.last_level, 4);
    }
}
