//! Samples emitted by the sweep engine and the sinks that receive them.

use crate::planner::SweepRate;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::Serialize;
use std::io::Write;
use tracing::warn;

/// One output step: the level commanded, the voltage read back after the
/// planned delay, and the rate it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    pub timestamp_us: u64,
    pub level: u32,
    pub duty: u16,
    pub voltage: f64,
    pub rate: SweepRate,
    pub delay_us: u64,
}

/// Receiver of samples. Called synchronously from the sweep loop, so
/// implementations must return promptly.
pub trait SampleSink: Send {
    fn accept(&mut self, sample: Sample);
}

impl SampleSink for Vec<Sample> {
    fn accept(&mut self, sample: Sample) {
        self.push(sample);
    }
}

impl<S: SampleSink + ?Sized> SampleSink for Box<S> {
    fn accept(&mut self, sample: Sample) {
        (**self).accept(sample);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    /// The bench rig's console line.
    #[default]
    Text,
    JsonLines,
}

/// Writes one line per sample.
pub struct ReportSink<W: Write + Send> {
    writer: W,
    format: ReportFormat,
    write_errors: u64,
}

impl<W: Write + Send> ReportSink<W> {
    pub fn new(writer: W, format: ReportFormat) -> Self {
        Self {
            writer,
            format,
            write_errors: 0,
        }
    }

    pub fn write_errors(&self) -> u64 {
        self.write_errors
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_sample(&mut self, sample: &Sample) -> std::io::Result<()> {
        match self.format {
            ReportFormat::Text => writeln!(
                self.writer,
                "PWM Value: {}, ADC Voltage: {:.3} V, Sweep rate: {} mV/s, Interval: {} us",
                sample.level, sample.voltage, sample.rate, sample.delay_us
            ),
            ReportFormat::JsonLines => {
                serde_json::to_writer(&mut self.writer, sample)?;
                self.writer.write_all(b"\n")
            }
        }
    }
}

impl<W: Write + Send> SampleSink for ReportSink<W> {
    fn accept(&mut self, sample: Sample) {
        if let Err(e) = self.write_sample(&sample) {
            // First failure is worth a log line; a closed pipe would flood otherwise.
            if self.write_errors == 0 {
                warn!(error = %e, "Failed to write sample report");
            }
            self.write_errors += 1;
        }
    }
}

/// Bounded hand-off to another thread. Never blocks; samples are dropped
/// and counted when the consumer falls behind.
pub struct ChannelSink {
    tx: Sender<Sample>,
    dropped: u64,
    disconnected: bool,
}

impl ChannelSink {
    pub fn bounded(capacity: usize) -> (Self, Receiver<Sample>) {
        let (tx, rx) = bounded(capacity);
        (
            Self {
                tx,
                dropped: 0,
                disconnected: false,
            },
            rx,
        )
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl SampleSink for ChannelSink {
    fn accept(&mut self, sample: Sample) {
        match self.tx.try_send(sample) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => self.dropped += 1,
            Err(TrySendError::Disconnected(_)) => {
                if !self.disconnected {
                    warn!("Sample receiver disconnected; discarding further samples");
                    self.disconnected = true;
                }
                self.dropped += 1;
            }
        }
    }
}
