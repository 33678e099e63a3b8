use crate::error::HardwareIoError;

/// Native duty-cycle ceiling of a 16-bit PWM peripheral.
pub const DUTY_CYCLE_MAX: u16 = u16::MAX;

/// Duty-cycle output driven by the sweep engine.
pub trait PwmOutput: Send {
    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), HardwareIoError>;
}

/// Voltage source sampled after every output step.
pub trait AnalogInput: Send {
    fn read_voltage(&mut self) -> Result<f64, HardwareIoError>;
}

impl<T: PwmOutput + ?Sized> PwmOutput for Box<T> {
    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), HardwareIoError> {
        (**self).set_duty_cycle(duty)
    }
}

impl<T: AnalogInput + ?Sized> AnalogInput for Box<T> {
    fn read_voltage(&mut self) -> Result<f64, HardwareIoError> {
        (**self).read_voltage()
    }
}
