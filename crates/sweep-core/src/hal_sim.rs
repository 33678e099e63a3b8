use crate::error::HardwareIoError;
use crate::hal::{AnalogInput, PwmOutput, DUTY_CYCLE_MAX};
use crate::timebase::Clock;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// ADC front end: signed full scale and converter width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdcModel {
    pub full_scale_v: f64,
    pub bits: u32,
}

impl AdcModel {
    /// ADS1015 at gain 1: 12 bits over +/-4.096 V, 2 mV per count.
    pub const ADS1015_GAIN_1: Self = Self {
        full_scale_v: 4.096,
        bits: 12,
    };

    pub fn lsb_v(&self) -> f64 {
        self.full_scale_v / f64::from(1u32 << (self.bits - 1))
    }

    pub fn quantize(&self, volts: f64) -> f64 {
        let lsb = self.lsb_v();
        let clamped = volts.clamp(-self.full_scale_v, self.full_scale_v - lsb);
        (clamped / lsb).round() * lsb
    }
}

/// Bench rig model: PWM pin into an RC low-pass, read back by the ADC.
#[derive(Debug, Clone, PartialEq)]
pub struct RigParams {
    pub pwm_frequency_hz: u32,
    pub supply_voltage: f64,
    /// RC time constant of the output filter. Zero settles instantly.
    pub tau_s: f64,
    pub adc: AdcModel,
    /// How many duty writes to remember for inspection. Zero keeps none.
    pub history_limit: usize,
}

impl Default for RigParams {
    fn default() -> Self {
        Self {
            pwm_frequency_hz: 5_000,
            supply_voltage: 3.3,
            tau_s: 0.001,
            adc: AdcModel::ADS1015_GAIN_1,
            history_limit: 0,
        }
    }
}

/// Which call (zero-based) of an operation should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fault {
    #[default]
    Never,
    At(u64),
    From(u64),
}

impl Fault {
    fn hits(self, call: u64) -> bool {
        match self {
            Self::Never => false,
            Self::At(n) => call == n,
            Self::From(n) => call >= n,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FaultPlan {
    pub write: Fault,
    pub read: Fault,
}

struct RigState {
    params: RigParams,
    faults: FaultPlan,
    clock: Box<dyn Clock>,
    duty: u16,
    filtered_v: f64,
    last_update_us: u64,
    writes: u64,
    reads: u64,
    history: VecDeque<u16>,
}

impl RigState {
    fn target_v(&self) -> f64 {
        f64::from(self.duty) / f64::from(DUTY_CYCLE_MAX) * self.params.supply_voltage
    }

    fn advance(&mut self) {
        let now_us = self.clock.now_us();
        let dt_s = now_us.saturating_sub(self.last_update_us) as f64 / 1_000_000.0;
        self.last_update_us = now_us;

        let target = self.target_v();
        if self.params.tau_s <= 0.0 {
            self.filtered_v = target;
        } else {
            self.filtered_v += (target - self.filtered_v) * (1.0 - (-dt_s / self.params.tau_s).exp());
        }
    }
}

/// Simulated PWM-to-ADC loop. Clones share the same rig; hand out
/// [`SimulatedRig::pwm`] and [`SimulatedRig::adc`] to the engine and keep a
/// clone to inspect what the hardware saw.
#[derive(Clone)]
pub struct SimulatedRig {
    shared: Arc<Mutex<RigState>>,
}

impl SimulatedRig {
    pub fn new(params: RigParams, clock: impl Clock + 'static) -> Self {
        let last_update_us = clock.now_us();
        Self {
            shared: Arc::new(Mutex::new(RigState {
                history: VecDeque::with_capacity(params.history_limit),
                params,
                faults: FaultPlan::default(),
                clock: Box::new(clock),
                duty: 0,
                filtered_v: 0.0,
                last_update_us,
                writes: 0,
                reads: 0,
            })),
        }
    }

    pub fn with_faults(self, faults: FaultPlan) -> Self {
        self.lock().faults = faults;
        self
    }

    pub fn pwm(&self) -> SimPwm {
        SimPwm { rig: self.clone() }
    }

    pub fn adc(&self) -> SimAdc {
        SimAdc { rig: self.clone() }
    }

    pub fn params(&self) -> RigParams {
        self.lock().params.clone()
    }

    pub fn duty(&self) -> u16 {
        self.lock().duty
    }

    pub fn writes(&self) -> u64 {
        self.lock().writes
    }

    pub fn reads(&self) -> u64 {
        self.lock().reads
    }

    /// Accepted duty writes, oldest first, bounded by `history_limit`.
    pub fn duty_history(&self) -> Vec<u16> {
        self.lock().history.iter().copied().collect()
    }

    fn lock(&self) -> MutexGuard<'_, RigState> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct SimPwm {
    rig: SimulatedRig,
}

impl PwmOutput for SimPwm {
    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), HardwareIoError> {
        let mut state = self.rig.lock();
        let call = state.writes;
        state.writes += 1;
        if state.faults.write.hits(call) {
            return Err(HardwareIoError::output(format!(
                "simulated bus fault on write #{call}"
            )));
        }

        // Settle under the old duty before switching.
        state.advance();
        state.duty = duty;
        if state.params.history_limit > 0 {
            if state.history.len() == state.params.history_limit {
                state.history.pop_front();
            }
            state.history.push_back(duty);
        }
        Ok(())
    }
}

pub struct SimAdc {
    rig: SimulatedRig,
}

impl AnalogInput for SimAdc {
    fn read_voltage(&mut self) -> Result<f64, HardwareIoError> {
        let mut state = self.rig.lock();
        let call = state.reads;
        state.reads += 1;
        if state.faults.read.hits(call) {
            return Err(HardwareIoError::input(format!(
                "simulated bus fault on read #{call}"
            )));
        }

        state.advance();
        Ok(state.params.adc.quantize(state.filtered_v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timebase::ManualClock;

    fn instant_rig(clock: ManualClock) -> SimulatedRig {
        SimulatedRig::new(
            RigParams {
                tau_s: 0.0,
                history_limit: 8,
                ..Default::default()
            },
            clock,
        )
    }

    #[test]
    fn ads1015_counts_are_two_millivolts() {
        let adc = AdcModel::ADS1015_GAIN_1;
        assert!((adc.lsb_v() - 0.002).abs() < 1e-12);
        assert!((adc.quantize(1.2345) - 1.234).abs() < 1e-9);
        assert!((adc.quantize(10.0) - 4.094).abs() < 1e-9);
    }

    #[test]
    fn full_duty_reads_supply_voltage() {
        let rig = instant_rig(ManualClock::new());
        let mut pwm = rig.pwm();
        let mut adc = rig.adc();

        pwm.set_duty_cycle(DUTY_CYCLE_MAX).unwrap();
        assert!((adc.read_voltage().unwrap() - 3.3).abs() < 0.002);

        pwm.set_duty_cycle(0).unwrap();
        assert_eq!(adc.read_voltage().unwrap(), 0.0);
    }

    #[test]
    fn filter_lags_behind_duty_step() {
        let clock = ManualClock::new();
        let rig = SimulatedRig::new(
            RigParams {
                tau_s: 0.001,
                ..Default::default()
            },
            clock.clone(),
        );
        let mut pwm = rig.pwm();
        let mut adc = rig.adc();

        pwm.set_duty_cycle(DUTY_CYCLE_MAX).unwrap();
        clock.advance_us(1_000);
        let one_tau = adc.read_voltage().unwrap();
        assert!((one_tau - 3.3 * (1.0 - (-1.0f64).exp())).abs() < 0.004);

        clock.advance_us(10_000);
        assert!((adc.read_voltage().unwrap() - 3.3).abs() < 0.004);
    }

    #[test]
    fn history_is_bounded() {
        let rig = instant_rig(ManualClock::new());
        let mut pwm = rig.pwm();
        for duty in 0..10u16 {
            pwm.set_duty_cycle(duty).unwrap();
        }
        assert_eq!(rig.duty_history(), vec![2, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(rig.writes(), 10);
    }

    #[test]
    fn injected_faults_fail_selected_calls() {
        let rig = instant_rig(ManualClock::new()).with_faults(FaultPlan {
            write: Fault::At(1),
            read: Fault::From(2),
        });
        let mut pwm = rig.pwm();
        let mut adc = rig.adc();

        assert!(pwm.set_duty_cycle(10).is_ok());
        assert!(pwm.set_duty_cycle(20).is_err());
        assert!(pwm.set_duty_cycle(0).is_ok());
        assert_eq!(rig.duty_history(), vec![10, 0]);

        assert!(adc.read_voltage().is_ok());
        assert!(adc.read_voltage().is_ok());
        assert!(adc.read_voltage().is_err());
        assert!(adc.read_voltage().is_err());
    }
}
