//! Sweep rate to per-step delay conversion.
//!
//! A rate is turned into the time spent on each output level:
//! `delay_us = floor(base_unit_us / (rate * divisor))`. The divisor is either
//! the fixed constant the bench rig was calibrated with (128) or the actual
//! number of output levels, see [`DelayScaling`].

use crate::error::InvalidRateError;
use serde::Serialize;

/// One second, expressed in the microsecond delays the planner produces.
pub const BASE_UNIT_US: u64 = 1_000_000;

/// Divisor used by the original bench rig regardless of resolution.
pub const LEGACY_DELAY_DIVISOR: u32 = 128;

/// Ramp speed in the rig's nominal mV/s units. Always positive and finite.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct SweepRate(f64);

impl SweepRate {
    pub fn new(value: f64) -> Option<Self> {
        (value.is_finite() && value > 0.0).then_some(Self(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl std::fmt::Display for SweepRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the rate is multiplied by before dividing the base unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayScaling {
    /// Constant divisor, independent of how many levels the ramp has.
    Fixed(u32),
    /// Divide by the number of output levels in one ramp direction.
    Resolution,
}

impl Default for DelayScaling {
    fn default() -> Self {
        Self::Fixed(LEGACY_DELAY_DIVISOR)
    }
}

impl DelayScaling {
    pub fn divisor(self, resolution: u32) -> u32 {
        match self {
            Self::Fixed(divisor) => divisor,
            Self::Resolution => resolution,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannedRate {
    pub rate: SweepRate,
    pub delay_us: u64,
}

/// Delays for every configured rate, in configuration order.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepPlan {
    resolution: u32,
    rates: Vec<PlannedRate>,
}

impl SweepPlan {
    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    pub fn delay_us(&self, index: usize) -> Option<u64> {
        self.rates.get(index).map(|planned| planned.delay_us)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlannedRate> {
        self.rates.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalPlanner {
    pub base_unit_us: u64,
    pub scaling: DelayScaling,
}

impl Default for IntervalPlanner {
    fn default() -> Self {
        Self {
            base_unit_us: BASE_UNIT_US,
            scaling: DelayScaling::default(),
        }
    }
}

impl IntervalPlanner {
    pub fn new(base_unit_us: u64, scaling: DelayScaling) -> Self {
        Self {
            base_unit_us,
            scaling,
        }
    }

    /// Plan every rate. Fails on the first invalid input; nothing is
    /// partially planned.
    pub fn plan(&self, rates: &[f64], resolution: u32) -> Result<SweepPlan, InvalidRateError> {
        if resolution == 0 {
            return Err(InvalidRateError::Resolution);
        }
        if rates.is_empty() {
            return Err(InvalidRateError::Empty);
        }
        let divisor = self.scaling.divisor(resolution);
        if divisor == 0 {
            return Err(InvalidRateError::Divisor);
        }

        let rates = rates
            .iter()
            .enumerate()
            .map(|(index, &value)| {
                let rate =
                    SweepRate::new(value).ok_or(InvalidRateError::NonPositive { index, value })?;
                Ok(PlannedRate {
                    rate,
                    delay_us: self.delay_us(rate, divisor),
                })
            })
            .collect::<Result<Vec<_>, InvalidRateError>>()?;

        Ok(SweepPlan { resolution, rates })
    }

    // Float-to-int casts saturate, so vanishingly small rates clamp to u64::MAX.
    fn delay_us(&self, rate: SweepRate, divisor: u32) -> u64 {
        let per_level = self.base_unit_us as f64 / (rate.value() * f64::from(divisor));
        per_level.floor() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_divisor_matches_bench_rig() {
        let plan = IntervalPlanner::default().plan(&[100.0], 256).unwrap();
        assert_eq!(plan.delay_us(0), Some(78));
    }

    #[test]
    fn resolution_divisor_couples_to_step_count() {
        let planner = IntervalPlanner::new(BASE_UNIT_US, DelayScaling::Resolution);
        let plan = planner.plan(&[100.0], 256).unwrap();
        assert_eq!(plan.delay_us(0), Some(39));
    }

    #[test]
    fn default_rate_list_plans_in_order() {
        let rates = [100.0, 20.0, 50.0, 100.0, 200.0, 250.0, 300.0];
        let plan = IntervalPlanner::default().plan(&rates, 256).unwrap();
        let delays: Vec<u64> = plan.iter().map(|p| p.delay_us).collect();
        assert_eq!(delays, vec![78, 390, 156, 78, 39, 31, 26]);
        assert_eq!(plan.resolution(), 256);
        assert_eq!(plan.len(), rates.len());
    }

    #[test]
    fn very_fast_rates_degenerate_to_zero_delay() {
        let plan = IntervalPlanner::default().plan(&[1.0e7], 256).unwrap();
        assert_eq!(plan.delay_us(0), Some(0));
    }

    #[test]
    fn rejects_zero_and_negative_rates() {
        let planner = IntervalPlanner::default();
        assert_eq!(
            planner.plan(&[100.0, 0.0], 256),
            Err(InvalidRateError::NonPositive {
                index: 1,
                value: 0.0
            })
        );
        assert!(matches!(
            planner.plan(&[-5.0], 256),
            Err(InvalidRateError::NonPositive { index: 0, .. })
        ));
        assert!(matches!(
            planner.plan(&[f64::NAN], 256),
            Err(InvalidRateError::NonPositive { index: 0, .. })
        ));
    }

    #[test]
    fn rejects_degenerate_configuration() {
        let planner = IntervalPlanner::default();
        assert_eq!(planner.plan(&[100.0], 0), Err(InvalidRateError::Resolution));
        assert_eq!(planner.plan(&[], 256), Err(InvalidRateError::Empty));

        let zero_divisor = IntervalPlanner::new(BASE_UNIT_US, DelayScaling::Fixed(0));
        assert_eq!(
            zero_divisor.plan(&[100.0], 256),
            Err(InvalidRateError::Divisor)
        );
    }
}
