use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use sweep_core::ProgressExchange;
use tracing::info;

const POLL_SLICE: Duration = Duration::from_millis(50);

/// Log the sweep's latest step every `interval` until `stop` is raised.
pub fn start_progress_monitor(
    progress: Arc<ProgressExchange>,
    stop: Arc<AtomicBool>,
    interval: Duration,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut last_samples = 0u64;
        let mut last_report = Instant::now();
        while !stop.load(Ordering::Relaxed) {
            thread::sleep(POLL_SLICE.min(interval));
            if last_report.elapsed() < interval {
                continue;
            }

            let snapshot = progress.read();
            let elapsed_s = last_report.elapsed().as_secs_f64();
            last_report = Instant::now();
            if snapshot.samples_emitted == last_samples {
                continue;
            }

            let samples_per_s =
                (snapshot.samples_emitted - last_samples) as f64 / elapsed_s.max(f64::EPSILON);
            last_samples = snapshot.samples_emitted;
            info!(
                state = ?snapshot.state,
                samples_emitted = snapshot.samples_emitted,
                cycles_completed = snapshot.cycles_completed,
                level = snapshot.last_level,
                voltage = snapshot.last_voltage,
                samples_per_s = samples_per_s.round(),
                "Sweep progress"
            );
        }
    })
}
