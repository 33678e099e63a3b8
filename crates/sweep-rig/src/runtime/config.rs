use std::time::Duration;
use sweep_core::{DelayScaling, ReportFormat, RigParams, SweepConfig};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{flag} expects a value")]
    MissingValue { flag: String },

    #[error("invalid value '{value}' for {flag}: {reason}")]
    InvalidValue {
        flag: String,
        value: String,
        reason: String,
    },

    #[error("unknown option '{0}'")]
    UnknownFlag(String),
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub show_help: bool,
    pub sweep: SweepConfig,
    pub rig: RigParams,
    /// Passes over the full rate list; `None` repeats until interrupted.
    pub passes: Option<u64>,
    pub run_seconds: Option<u64>,
    pub json_logs: bool,
    pub report_format: ReportFormat,
    pub progress_interval: Option<Duration>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            show_help: false,
            sweep: SweepConfig::default(),
            rig: RigParams::default(),
            passes: None,
            run_seconds: None,
            json_logs: false,
            report_format: ReportFormat::Text,
            progress_interval: Some(Duration::from_millis(1000)),
        }
    }
}

fn value<'a>(args: &'a [String], i: usize) -> Result<&'a str, ConfigError> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| ConfigError::MissingValue {
            flag: args[i].clone(),
        })
}

fn parse<T>(flag: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue {
            flag: flag.to_string(),
            value: raw.to_string(),
            reason: e.to_string(),
        })
}

fn parse_rates(flag: &str, raw: &str) -> Result<Vec<f64>, ConfigError> {
    raw.split(',')
        .filter(|part| !part.trim().is_empty())
        .map(|part| parse::<f64>(flag, part))
        .collect()
}

fn parse_scaling(flag: &str, raw: &str) -> Result<DelayScaling, ConfigError> {
    match raw.trim() {
        "resolution" => Ok(DelayScaling::Resolution),
        other => match other.strip_prefix("fixed:") {
            Some(divisor) => Ok(DelayScaling::Fixed(parse(flag, divisor)?)),
            None => Err(ConfigError::InvalidValue {
                flag: flag.to_string(),
                value: raw.to_string(),
                reason: "expected 'resolution' or 'fixed:<divisor>'".to_string(),
            }),
        },
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let args: Vec<String> = std::env::args().collect();
        Self::from_args(&args)
    }

    /// Rate values themselves are checked by the planner, not here.
    pub fn from_args(args: &[String]) -> Result<Self, ConfigError> {
        let mut cfg = RuntimeConfig::default();
        let mut i = 1;
        while i < args.len() {
            let flag = args[i].as_str();
            match flag {
                "--rates" => {
                    cfg.sweep.rates = parse_rates(flag, value(args, i)?)?;
                    i += 1;
                }
                "--resolution" => {
                    cfg.sweep.resolution = parse(flag, value(args, i)?)?;
                    i += 1;
                }
                "--cycles" => {
                    cfg.sweep.cycles_per_rate = parse(flag, value(args, i)?)?;
                    i += 1;
                }
                "--base-unit-us" => {
                    cfg.sweep.base_unit_us = parse(flag, value(args, i)?)?;
                    i += 1;
                }
                "--scaling" => {
                    cfg.sweep.scaling = parse_scaling(flag, value(args, i)?)?;
                    i += 1;
                }
                "--output-max" => {
                    cfg.sweep.output_max = parse(flag, value(args, i)?)?;
                    i += 1;
                }
                "--passes" => {
                    cfg.passes = Some(parse(flag, value(args, i)?)?);
                    i += 1;
                }
                "--run-seconds" => {
                    cfg.run_seconds = Some(parse(flag, value(args, i)?)?);
                    i += 1;
                }
                "--json-logs" => {
                    cfg.json_logs = true;
                }
                "--json-samples" => {
                    cfg.report_format = ReportFormat::JsonLines;
                }
                "--progress-ms" => {
                    let ms: u64 = parse(flag, value(args, i)?)?;
                    cfg.progress_interval = (ms > 0).then(|| Duration::from_millis(ms));
                    i += 1;
                }
                "--sim-vref" => {
                    cfg.rig.supply_voltage = parse(flag, value(args, i)?)?;
                    i += 1;
                }
                "--sim-tau-ms" => {
                    let ms: f64 = parse(flag, value(args, i)?)?;
                    cfg.rig.tau_s = ms / 1000.0;
                    i += 1;
                }
                "--sim-pwm-hz" => {
                    cfg.rig.pwm_frequency_hz = parse(flag, value(args, i)?)?;
                    i += 1;
                }
                "--help" | "-h" => {
                    cfg.show_help = true;
                    break;
                }
                other => return Err(ConfigError::UnknownFlag(other.to_string())),
            }
            i += 1;
        }
        Ok(cfg)
    }

    pub fn print_help() {
        println!(
            r#"sweep-rig - PWM voltage sweep with synchronous ADC sampling

USAGE:
    sweep-rig [OPTIONS]

OPTIONS:
    --rates <LIST>          Comma-separated sweep rates in mV/s [default: 100,20,50,100,200,250,300]
    --resolution <N>        Output levels per ramp direction [default: 256]
    --cycles <N>            Up/down ramp cycles per rate [default: 2]
    --base-unit-us <US>     Time base for the delay formula [default: 1000000]
    --scaling <MODE>        Delay divisor: fixed:<N> or resolution [default: fixed:128]
    --output-max <N>        Native duty value of the top level [default: 65535]
    --passes <N>            Passes over the rate list, then exit [default: until interrupted]
    --run-seconds <SECS>    Stop after a fixed duration
    --json-logs             Output logs in JSON format (for log aggregation)
    --json-samples          Print samples as JSON lines instead of text
    --progress-ms <MS>      Progress log interval, 0 disables [default: 1000]
    --sim-vref <VOLTS>      Simulated PWM supply voltage [default: 3.3]
    --sim-tau-ms <MS>       Simulated RC filter time constant [default: 1]
    --sim-pwm-hz <HZ>       Simulated PWM carrier frequency [default: 5000]
    -h, --help              Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log filter (e.g., RUST_LOG=debug,sweep_core=trace)

Samples are written to stdout, logs to stderr. Ctrl-C stops the sweep and
turns the PWM output off.

EXAMPLES:
    # Bench rig defaults, forever
    sweep-rig

    # One pass, delay coupled to resolution, machine-readable samples
    sweep-rig --passes 1 --scaling resolution --json-samples
"#
        );
    }
}
