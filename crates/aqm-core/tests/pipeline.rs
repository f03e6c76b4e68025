//! End-to-end runs of the node through the real run loop and a manual clock

use std::collections::HashMap;

use aqm_core::app_state::{AppState, ButtonEvent};
use aqm_core::calibration::CalibrationPhase;
use aqm_core::config::NodeConfig;
use aqm_core::diagnostics::Diagnostics;
use aqm_core::frame::{DecodedFrame, Frame, Header};
use aqm_core::indicator::{Indicator, IndicatorMode};
use aqm_core::scheduler::{Clock, ManualClock, RunLoop};
use aqm_core::sensors::{Channel, Quantity, SensorError, SensorEvent, SensorSource};
use aqm_core::transport::{Transport, TransportError};
use embassy_time::{Duration, Instant};

#[derive(Default)]
struct Bench {
    values: HashMap<Quantity, f32>,
    co2_interval: Option<Duration>,
    references: u32,
}

impl SensorSource for Bench {
    fn read(&mut self, quantity: Quantity) -> Result<f32, SensorError> {
        self.values
            .get(&quantity)
            .copied()
            .ok_or(SensorError::NotReady {
                sensor: quantity.sensor_name(),
            })
    }

    fn set_update_interval(&mut self, channel: Channel, interval: Duration) {
        if channel == Channel::Co2 {
            self.co2_interval = Some(interval);
        }
    }

    fn calibrate_co2_reference(&mut self) -> Result<(), SensorError> {
        self.references += 1;
        Ok(())
    }
}

/// Joins after `join_polls` readiness checks
#[derive(Default)]
struct Modem {
    join_polls: u32,
    polls: u32,
    frames: Vec<Frame>,
}

impl Transport for Modem {
    fn is_ready(&mut self) -> bool {
        self.polls += 1;
        self.polls > self.join_polls
    }

    fn send_confirmed(&mut self, frame: Frame) -> Result<(), TransportError> {
        self.frames.push(frame);
        Ok(())
    }
}

#[derive(Default)]
struct Led {
    mode: Option<IndicatorMode>,
}

impl Indicator for Led {
    fn set_mode(&mut self, mode: IndicatorMode) {
        self.mode = Some(mode);
    }

    fn pulse(&mut self, _duration: Duration) {}
}

#[derive(Default)]
struct Console {
    lines: Vec<String>,
}

impl Diagnostics for Console {
    fn line(&mut self, line: &str) {
        self.lines.push(line.to_owned());
    }
}

type Node = AppState<Bench, Modem, Led, Console>;

fn node(join_polls: u32) -> Node {
    AppState::new(
        NodeConfig::default(),
        Bench::default(),
        Modem {
            join_polls,
            ..Modem::default()
        },
        Led::default(),
        Console::default(),
    )
}

/// Step the clock in `step` increments up to `total`, running due tasks.
fn run_for<C: Clock>(
    node: &mut Node,
    run_loop: &mut RunLoop<C>,
    clock: &ManualClock,
    total: Duration,
    step: Duration,
) {
    let end = clock.now() + total;
    while clock.now() < end {
        clock.advance(step);
        node.run_due(run_loop);
    }
}

#[test]
fn test_boot_frame_waits_for_join_then_carries_readings() {
    let clock = ManualClock::new(Instant::from_secs(0));
    let mut run_loop: RunLoop<_> = RunLoop::new(&clock);
    let mut node = node(5);
    node.start(&mut run_loop).unwrap();

    {
        let bench = node.sensors_mut();
        bench.values.insert(Quantity::Temperature, 21.3);
        bench.values.insert(Quantity::Humidity, 45.0);
        bench.values.insert(Quantity::Pressure, 101_300.0);
        bench.values.insert(Quantity::Altitude, 250.0);
        bench.values.insert(Quantity::Tvoc, 120.0);
        bench.values.insert(Quantity::Co2, 800.0);
        bench.values.insert(Quantity::BatteryVoltage, 3.7);
        bench.values.insert(Quantity::BatteryPercentage, 80.0);
    }
    for channel in Channel::ALL {
        node.on_sensor_event(SensorEvent::Update(channel), &mut run_loop);
    }

    node.run_due(&mut run_loop);
    assert!(node.transport_mut().frames.is_empty(), "modem has not joined yet");

    run_for(
        &mut node,
        &mut run_loop,
        &clock,
        Duration::from_millis(500),
        Duration::from_millis(100),
    );

    let frames = &node.transport_mut().frames;
    assert_eq!(frames.len(), 1, "exactly one frame once the modem is ready");
    assert_eq!(frames[0].hex().as_str(), "0025d5005afa0178002003");
    assert_eq!(node.transport_mut().polls, 6);
}

#[test]
fn test_steady_state_sends_every_fifteen_minutes() {
    let clock = ManualClock::new(Instant::from_secs(0));
    let mut run_loop: RunLoop<_> = RunLoop::new(&clock);
    let mut node = node(0);
    node.start(&mut run_loop).unwrap();
    node.run_due(&mut run_loop);

    run_for(
        &mut node,
        &mut run_loop,
        &clock,
        Duration::from_secs(45 * 60),
        Duration::from_secs(1),
    );

    let headers: Vec<u8> = node
        .transport_mut()
        .frames
        .iter()
        .map(|f| f.header_byte())
        .collect();
    assert_eq!(headers, [0, 1, 1, 1]);
}

#[test]
fn test_button_click_frame_decodes_on_the_backend() {
    let clock = ManualClock::new(Instant::from_secs(0));
    let mut run_loop: RunLoop<_> = RunLoop::new(&clock);
    let mut node = node(0);
    node.start(&mut run_loop).unwrap();
    node.run_due(&mut run_loop);

    node.sensors_mut().values.insert(Quantity::Co2, 1234.0);
    node.on_sensor_event(SensorEvent::Update(Channel::Co2), &mut run_loop);
    node.on_button(ButtonEvent::Click, &mut run_loop);
    node.run_due(&mut run_loop);

    let frames = &node.transport_mut().frames;
    assert_eq!(frames.len(), 2, "publish and click collapse into one send");
    let decoded = DecodedFrame::parse(frames[1].as_ref()).unwrap();
    assert_eq!(decoded.header, Header::ButtonClick.as_byte());
    assert_eq!(decoded.co2, Some(1234.0));
    assert_eq!(decoded.temperature, None);
}

#[test]
fn test_calibration_runs_alongside_transmit() {
    let clock = ManualClock::new(Instant::from_secs(0));
    let mut run_loop: RunLoop<_> = RunLoop::new(&clock);
    let mut node = node(0);
    node.start(&mut run_loop).unwrap();
    node.run_due(&mut run_loop);

    assert_eq!(
        node.toggle_calibration(&mut run_loop).unwrap(),
        CalibrationPhase::Armed
    );
    run_for(
        &mut node,
        &mut run_loop,
        &clock,
        Duration::from_secs(5 * 60 + 14 * 60),
        Duration::from_secs(30),
    );

    assert_eq!(node.calibration_phase(), CalibrationPhase::Idle);
    assert_eq!(node.sensors_mut().references, 15);
    assert_eq!(node.sensors_mut().co2_interval, Some(Duration::from_secs(60)));
    assert_eq!(node.indicator().mode, Some(IndicatorMode::Off));
    assert!(
        node.diagnostics()
            .lines
            .iter()
            .any(|l| l == "calibration finished")
    );
    assert_eq!(
        node.transport_mut().frames.len(),
        2,
        "transmit keeps its own cadence during calibration"
    );
}
