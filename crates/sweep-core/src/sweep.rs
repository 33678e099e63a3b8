//! Ramp engine: drives the PWM output up and down through every level for
//! each planned rate, sampling the analog input after each step.
//!
//! The output is forced to zero duty whenever a run ends, whether it
//! completed, was stopped, hit a hardware fault or unwound from a panic.

use crate::error::{HardwareIoError, InvalidRateError, SweepError};
use crate::hal::{AnalogInput, PwmOutput, DUTY_CYCLE_MAX};
use crate::planner::{DelayScaling, IntervalPlanner, PlannedRate, SweepPlan, BASE_UNIT_US};
use crate::sample::{Sample, SampleSink};
use crate::sync::{ProgressExchange, SweepProgress};
use crate::timebase::Clock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const DEFAULT_SWEEP_RATES: [f64; 7] = [100.0, 20.0, 50.0, 100.0, 200.0, 250.0, 300.0];
pub const DEFAULT_RESOLUTION: u32 = 256;
pub const DEFAULT_CYCLES_PER_RATE: u32 = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct SweepConfig {
    pub rates: Vec<f64>,
    pub resolution: u32,
    pub cycles_per_rate: u32,
    pub base_unit_us: u64,
    pub scaling: DelayScaling,
    /// Native duty value that the top level maps to.
    pub output_max: u16,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            rates: DEFAULT_SWEEP_RATES.to_vec(),
            resolution: DEFAULT_RESOLUTION,
            cycles_per_rate: DEFAULT_CYCLES_PER_RATE,
            base_unit_us: BASE_UNIT_US,
            scaling: DelayScaling::default(),
            output_max: DUTY_CYCLE_MAX,
        }
    }
}

impl SweepConfig {
    pub fn planner(&self) -> IntervalPlanner {
        IntervalPlanner::new(self.base_unit_us, self.scaling)
    }

    pub fn plan(&self) -> Result<SweepPlan, InvalidRateError> {
        self.planner().plan(&self.rates, self.resolution)
    }
}

/// Scale a level in `[0, resolution-1]` onto `[0, output_max]`, truncating.
pub fn duty_for_level(level: u32, resolution: u32, output_max: u16) -> u16 {
    if resolution <= 1 {
        return 0;
    }
    let top = u64::from(resolution - 1);
    let level = u64::from(level).min(top);
    (level * u64::from(output_max) / top) as u16
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SweepState {
    #[default]
    Idle,
    Ascending {
        rate_index: usize,
        cycle: u32,
        level: u32,
    },
    Descending {
        rate_index: usize,
        cycle: u32,
        level: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Cancelled,
}

#[derive(Clone, Default, Debug)]
pub struct SweepStats {
    pub samples_emitted: u64,
    pub cycles_completed: u64,
    pub rates_completed: u64,
    pub passes_completed: u64,
    pub passes_cancelled: u64,
    pub hardware_faults: u64,
    /// Largest time slept past a planned delay.
    pub max_overshoot_us: u64,
}

/// Holds the output for the duration of a run and writes zero duty when
/// released or dropped.
struct SafeOffGuard<'a, O: PwmOutput> {
    output: &'a mut O,
    armed: bool,
}

impl<'a, O: PwmOutput> SafeOffGuard<'a, O> {
    fn new(output: &'a mut O) -> Self {
        Self {
            output,
            armed: true,
        }
    }

    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), HardwareIoError> {
        self.output.set_duty_cycle(duty)
    }

    fn release(mut self) -> Result<(), HardwareIoError> {
        self.armed = false;
        self.output.set_duty_cycle(0)
    }
}

impl<O: PwmOutput> Drop for SafeOffGuard<'_, O> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!("Sweep unwound mid-run, forcing output off");
        if let Err(e) = self.output.set_duty_cycle(0) {
            error!(error = %e, "Safe-off write failed while unwinding");
        }
    }
}

enum Step {
    Emitted,
    Stopped,
}

/// Borrowed view of the engine for the duration of one pass.
struct Ramp<'a, O: PwmOutput, I, C, S> {
    output: SafeOffGuard<'a, O>,
    input: &'a mut I,
    clock: &'a C,
    sink: &'a mut S,
    state: &'a mut SweepState,
    stats: &'a mut SweepStats,
    progress: Option<&'a ProgressExchange>,
    plan: &'a SweepPlan,
    cycles: u32,
    output_max: u16,
}

impl<O, I, C, S> Ramp<'_, O, I, C, S>
where
    O: PwmOutput,
    I: AnalogInput,
    C: Clock,
    S: SampleSink,
{
    fn sweep(&mut self, stop: &AtomicBool) -> Result<RunOutcome, SweepError> {
        let plan = self.plan;
        let resolution = plan.resolution();

        for (rate_index, planned) in plan.iter().enumerate() {
            debug!(
                rate_index,
                rate = %planned.rate,
                delay_us = planned.delay_us,
                "Sweeping rate"
            );
            for cycle in 0..self.cycles {
                for level in 0..resolution {
                    let state = SweepState::Ascending {
                        rate_index,
                        cycle,
                        level,
                    };
                    if let Step::Stopped = self.step(stop, planned, state, level)? {
                        return Ok(RunOutcome::Cancelled);
                    }
                }
                for level in (0..resolution).rev() {
                    let state = SweepState::Descending {
                        rate_index,
                        cycle,
                        level,
                    };
                    if let Step::Stopped = self.step(stop, planned, state, level)? {
                        return Ok(RunOutcome::Cancelled);
                    }
                }
                self.stats.cycles_completed += 1;
            }
            self.stats.rates_completed += 1;
        }
        Ok(RunOutcome::Completed)
    }

    fn step(
        &mut self,
        stop: &AtomicBool,
        planned: &PlannedRate,
        state: SweepState,
        level: u32,
    ) -> Result<Step, SweepError> {
        if stop.load(Ordering::Relaxed) {
            return Ok(Step::Stopped);
        }
        *self.state = state;

        let duty = duty_for_level(level, self.plan.resolution(), self.output_max);
        self.output
            .set_duty_cycle(duty)
            .map_err(|source| SweepError::Hardware { state, source })?;

        let before_us = self.clock.now_us();
        self.clock.sleep_us(planned.delay_us);
        let slept_us = self.clock.now_us().saturating_sub(before_us);
        self.stats.max_overshoot_us = self
            .stats
            .max_overshoot_us
            .max(slept_us.saturating_sub(planned.delay_us));

        // A stop that arrived during the wait must not produce another sample.
        if stop.load(Ordering::Relaxed) {
            return Ok(Step::Stopped);
        }

        let voltage = self
            .input
            .read_voltage()
            .map_err(|source| SweepError::Hardware { state, source })?;

        let timestamp_us = self.clock.now_us();
        self.sink.accept(Sample {
            timestamp_us,
            level,
            duty,
            voltage,
            rate: planned.rate,
            delay_us: planned.delay_us,
        });
        self.stats.samples_emitted += 1;

        if let Some(progress) = self.progress {
            progress.publish(SweepProgress {
                timestamp_us,
                state,
                samples_emitted: self.stats.samples_emitted,
                cycles_completed: self.stats.cycles_completed,
                last_level: level,
                last_voltage: voltage,
            });
        }
        Ok(Step::Emitted)
    }
}

pub struct SweepEngine<O, I, C, S> {
    output: O,
    input: I,
    clock: C,
    sink: S,
    config: SweepConfig,
    plan: SweepPlan,
    state: SweepState,
    stats: SweepStats,
    progress: Option<Arc<ProgressExchange>>,
}

impl<O, I, C, S> SweepEngine<O, I, C, S>
where
    O: PwmOutput,
    I: AnalogInput,
    C: Clock,
    S: SampleSink,
{
    /// Plans every rate up front. An invalid configuration is rejected here,
    /// before the hardware handles are ever touched.
    pub fn new(
        config: SweepConfig,
        output: O,
        input: I,
        clock: C,
        sink: S,
    ) -> Result<Self, InvalidRateError> {
        let plan = config.plan()?;
        Ok(Self {
            output,
            input,
            clock,
            sink,
            config,
            plan,
            state: SweepState::Idle,
            stats: SweepStats::default(),
            progress: None,
        })
    }

    pub fn with_progress(mut self, progress: Arc<ProgressExchange>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn plan(&self) -> &SweepPlan {
        &self.plan
    }

    pub fn state(&self) -> SweepState {
        self.state
    }

    pub fn stats(&self) -> &SweepStats {
        &self.stats
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// One full pass over every planned rate. Returns to `Idle` with the
    /// output at zero duty however the pass ends.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<RunOutcome, SweepError> {
        info!(
            rates = self.plan.len(),
            resolution = self.plan.resolution(),
            cycles_per_rate = self.config.cycles_per_rate,
            "Starting sweep pass"
        );

        let (result, safe_off) = {
            let mut ramp = Ramp {
                output: SafeOffGuard::new(&mut self.output),
                input: &mut self.input,
                clock: &self.clock,
                sink: &mut self.sink,
                state: &mut self.state,
                stats: &mut self.stats,
                progress: self.progress.as_deref(),
                plan: &self.plan,
                cycles: self.config.cycles_per_rate,
                output_max: self.config.output_max,
            };
            let result = ramp.sweep(stop);
            (result, ramp.output.release())
        };

        self.state = SweepState::Idle;
        if let Some(progress) = &self.progress {
            progress.publish_idle(self.clock.now_us());
        }

        match (result, safe_off) {
            (Ok(outcome), Ok(())) => {
                match outcome {
                    RunOutcome::Completed => self.stats.passes_completed += 1,
                    RunOutcome::Cancelled => self.stats.passes_cancelled += 1,
                }
                info!(
                    ?outcome,
                    samples_emitted = self.stats.samples_emitted,
                    "Sweep pass finished, output off"
                );
                Ok(outcome)
            }
            (Ok(_), Err(e)) => {
                self.stats.hardware_faults += 1;
                error!(error = %e, "Safe-off write failed");
                Err(SweepError::SafeOff(e))
            }
            (Err(e), safe_off) => {
                self.stats.hardware_faults += 1;
                error!(error = %e, "Sweep aborted");
                if let Err(off) = safe_off {
                    error!(error = %off, "Safe-off write failed after abort");
                }
                Err(e)
            }
        }
    }

    /// Repeat passes until `passes` have completed (forever if `None`),
    /// the stop flag is raised, or a pass fails.
    pub fn run_passes(
        &mut self,
        stop: &AtomicBool,
        passes: Option<u64>,
    ) -> Result<RunOutcome, SweepError> {
        let mut completed = 0u64;
        loop {
            if passes.is_some_and(|limit| completed >= limit) {
                return Ok(RunOutcome::Completed);
            }
            if let RunOutcome::Cancelled = self.run(stop)? {
                return Ok(RunOutcome::Cancelled);
            }
            completed += 1;
        }
    }
}
