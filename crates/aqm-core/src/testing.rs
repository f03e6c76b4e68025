//! Recording fakes of every collaborator, for unit tests

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use embassy_time::Duration;

use crate::diagnostics::Diagnostics;
use crate::frame::Frame;
use crate::indicator::{Indicator, IndicatorMode};
use crate::sensors::{Channel, Quantity, SensorError, SensorSource};
use crate::transport::{Transport, TransportError};

/// Sensors that return whatever was last `set`, and fail for the rest
pub struct FakeSensors {
    values: Vec<(Quantity, f32)>,
    pub reads: Vec<Quantity>,
    pub intervals: Vec<(Channel, Duration)>,
    pub calibrations: u32,
    pub fail_calibration: bool,
}

impl FakeSensors {
    pub fn new() -> Self {
        Self {
            values: Vec::new(),
            reads: Vec::new(),
            intervals: Vec::new(),
            calibrations: 0,
            fail_calibration: false,
        }
    }

    pub fn set(&mut self, quantity: Quantity, value: f32) {
        self.values.retain(|(q, _)| *q != quantity);
        self.values.push((quantity, value));
    }

    /// Most recent interval pushed for `channel`
    pub fn interval(&self, channel: Channel) -> Option<Duration> {
        self.intervals
            .iter()
            .rev()
            .find(|(c, _)| *c == channel)
            .map(|(_, d)| *d)
    }
}

impl SensorSource for FakeSensors {
    fn read(&mut self, quantity: Quantity) -> Result<f32, SensorError> {
        self.reads.push(quantity);
        self.values
            .iter()
            .find(|(q, _)| *q == quantity)
            .map(|(_, v)| *v)
            .ok_or(SensorError::NotReady {
                sensor: quantity.sensor_name(),
            })
    }

    fn set_update_interval(&mut self, channel: Channel, interval: Duration) {
        self.intervals.push((channel, interval));
    }

    fn calibrate_co2_reference(&mut self) -> Result<(), SensorError> {
        self.calibrations += 1;
        if self.fail_calibration {
            Err(SensorError::ReadFailed {
                sensor: "CO2 module",
                operation: "calibrate",
            })
        } else {
            Ok(())
        }
    }
}

/// A modem that becomes ready after `not_ready_polls` readiness checks
pub struct FakeTransport {
    pub not_ready_polls: u32,
    pub polls: u32,
    pub sent: Vec<Frame>,
    pub fail_with: Option<TransportError>,
}

impl FakeTransport {
    pub fn ready() -> Self {
        Self::ready_after(0)
    }

    pub fn ready_after(not_ready_polls: u32) -> Self {
        Self {
            not_ready_polls,
            polls: 0,
            sent: Vec::new(),
            fail_with: None,
        }
    }
}

impl Transport for FakeTransport {
    fn is_ready(&mut self) -> bool {
        self.polls += 1;
        self.polls > self.not_ready_polls
    }

    fn send_confirmed(&mut self, frame: Frame) -> Result<(), TransportError> {
        self.sent.push(frame);
        match self.fail_with {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct FakeIndicator {
    pub modes: Vec<IndicatorMode>,
    pub pulses: Vec<Duration>,
}

impl FakeIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> IndicatorMode {
        self.modes.last().copied().unwrap_or(IndicatorMode::Off)
    }
}

impl Indicator for FakeIndicator {
    fn set_mode(&mut self, mode: IndicatorMode) {
        self.modes.push(mode);
    }

    fn pulse(&mut self, duration: Duration) {
        self.pulses.push(duration);
    }
}

#[derive(Default)]
pub struct RecordingDiagnostics {
    pub lines: Vec<String>,
}

impl RecordingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|line| line.contains(needle))
    }
}

impl Diagnostics for RecordingDiagnostics {
    fn line(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }
}
