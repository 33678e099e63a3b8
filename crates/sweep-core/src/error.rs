//! Error types for planning and running sweeps.

use crate::sweep::SweepState;
use thiserror::Error;

/// Configuration rejected before any hardware is touched.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum InvalidRateError {
    #[error("sweep rate at position {index} must be positive and finite, got {value}")]
    NonPositive { index: usize, value: f64 },

    #[error("resolution must be at least one output level")]
    Resolution,

    #[error("fixed delay divisor must be non-zero")]
    Divisor,

    #[error("no sweep rates configured")]
    Empty,
}

/// Which side of the rig failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoDirection {
    Output,
    Input,
}

impl std::fmt::Display for IoDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Output => f.write_str("pwm output"),
            Self::Input => f.write_str("analog input"),
        }
    }
}

/// A bus or device failure reported by a hardware capability.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{direction} failed: {message}")]
pub struct HardwareIoError {
    pub direction: IoDirection,
    pub message: String,
}

impl HardwareIoError {
    pub fn output(message: impl Into<String>) -> Self {
        Self {
            direction: IoDirection::Output,
            message: message.into(),
        }
    }

    pub fn input(message: impl Into<String>) -> Self {
        Self {
            direction: IoDirection::Input,
            message: message.into(),
        }
    }
}

/// Why a sweep run did not finish cleanly.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error(transparent)]
    InvalidRate(#[from] InvalidRateError),

    /// The run aborted mid-ramp. Safe-off was attempted before this was returned.
    #[error("sweep aborted in {state:?}: {source}")]
    Hardware {
        state: SweepState,
        #[source]
        source: HardwareIoError,
    },

    /// The ramp itself finished (or was stopped) but the final zero-duty write failed.
    #[error("safe-off write failed: {0}")]
    SafeOff(#[source] HardwareIoError),
}

impl SweepError {
    /// The underlying hardware fault, if this error came from the rig.
    pub fn hardware_fault(&self) -> Option<&HardwareIoError> {
        match self {
            Self::Hardware { source, .. } | Self::SafeOff(source) => Some(source),
            Self::InvalidRate(_) => None,
        }
    }
}
