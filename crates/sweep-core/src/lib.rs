pub mod error;
pub mod hal;
#[cfg(feature = "simulation")]
pub mod hal_sim;
pub mod planner;
pub mod sample;
pub mod sweep;
pub mod sync;
pub mod timebase;

pub use error::{HardwareIoError, InvalidRateError, IoDirection, SweepError};
pub use hal::{AnalogInput, PwmOutput, DUTY_CYCLE_MAX};
#[cfg(feature = "simulation")]
pub use hal_sim::{AdcModel, Fault, FaultPlan, RigParams, SimAdc, SimPwm, SimulatedRig};
pub use planner::{DelayScaling, IntervalPlanner, PlannedRate, SweepPlan, SweepRate};
pub use sample::{ChannelSink, ReportFormat, ReportSink, Sample, SampleSink};
pub use sweep::{duty_for_level, RunOutcome, SweepConfig, SweepEngine, SweepState, SweepStats};
pub use sync::{ProgressExchange, SweepProgress};
pub use timebase::{Clock, ManualClock, MonotonicClock, TimeBase};
