use crate::runtime::config::RuntimeConfig;
use crate::runtime::logging::init_tracing;
use crate::runtime::{signal, telemetry};
use std::process::ExitCode;
use std::sync::{atomic::AtomicBool, Arc};
use std::thread;
use std::time::{Duration, Instant};
use sweep_core::{
    MonotonicClock, ProgressExchange, ReportSink, RunOutcome, SimulatedRig, SweepEngine, TimeBase,
};
use tracing::{error, info, warn};

const JOIN_POLL: Duration = Duration::from_millis(20);

pub fn run_from_args() -> ExitCode {
    let config = match RuntimeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            eprintln!("Run with --help for usage.");
            return ExitCode::from(2);
        }
    };
    if config.show_help {
        RuntimeConfig::print_help();
        return ExitCode::SUCCESS;
    }
    run(config)
}

pub fn run(config: RuntimeConfig) -> ExitCode {
    let _log_guard = init_tracing(config.json_logs);

    let timebase = TimeBase::new();
    let clock = MonotonicClock::new(timebase);
    let rig = SimulatedRig::new(config.rig.clone(), clock);
    let params = rig.params();
    info!(
        pwm_frequency_hz = params.pwm_frequency_hz,
        supply_voltage = params.supply_voltage,
        tau_s = params.tau_s,
        adc_lsb_v = params.adc.lsb_v(),
        "Using simulated PWM/ADC rig"
    );

    let progress = Arc::new(ProgressExchange::new());
    let sink = ReportSink::new(std::io::stdout(), config.report_format);
    let mut engine = match SweepEngine::new(config.sweep.clone(), rig.pwm(), rig.adc(), clock, sink)
    {
        Ok(engine) => engine.with_progress(Arc::clone(&progress)),
        Err(e) => {
            error!(error = %e, "Invalid sweep configuration");
            return ExitCode::from(2);
        }
    };

    for (rate_index, planned) in engine.plan().iter().enumerate() {
        info!(
            rate_index,
            rate = %planned.rate,
            delay_us = planned.delay_us,
            "Planned sweep rate"
        );
        if planned.delay_us == 0 {
            warn!(rate = %planned.rate, "Planned delay is zero; steps will run back to back");
        }
    }

    let stop = Arc::new(AtomicBool::new(false));
    if !signal::spawn_interrupt_listener(Arc::clone(&stop)) {
        warn!("Running without interrupt handling");
    }

    let monitor_stop = Arc::new(AtomicBool::new(false));
    let monitor_handle = config.progress_interval.map(|interval| {
        telemetry::start_progress_monitor(Arc::clone(&progress), Arc::clone(&monitor_stop), interval)
    });

    let stop_sweep = Arc::clone(&stop);
    let passes = config.passes;
    info!(passes = ?passes, "Starting sweep");
    let sweep_handle = thread::spawn(move || {
        let result = engine.run_passes(&stop_sweep, passes);
        (result, engine.stats().clone(), engine.sink().write_errors())
    });

    let deadline = config
        .run_seconds
        .map(|seconds| Instant::now() + Duration::from_secs(seconds));
    if let Some(seconds) = config.run_seconds {
        info!(seconds, "Running for limited duration");
    }
    while !sweep_handle.is_finished() {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            stop.store(true, std::sync::atomic::Ordering::Relaxed);
        }
        thread::sleep(JOIN_POLL);
    }

    let joined = sweep_handle.join();
    monitor_stop.store(true, std::sync::atomic::Ordering::Relaxed);
    if let Some(handle) = monitor_handle {
        let _ = handle.join();
    }

    let (result, stats, report_errors) = match joined {
        Ok(done) => done,
        Err(_) => {
            error!("Sweep thread panicked");
            return ExitCode::FAILURE;
        }
    };

    info!(
        samples_emitted = stats.samples_emitted,
        cycles_completed = stats.cycles_completed,
        rates_completed = stats.rates_completed,
        passes_completed = stats.passes_completed,
        max_overshoot_us = stats.max_overshoot_us,
        final_duty = rig.duty(),
        "Run complete"
    );
    if report_errors > 0 {
        warn!(report_errors, "Some sample lines could not be written");
    }

    match result {
        Ok(outcome) => {
            if outcome == RunOutcome::Cancelled {
                info!("Sweep stopped before finishing");
            }
            eprintln!("PWM stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Sweep failed");
            ExitCode::FAILURE
        }
    }
}
