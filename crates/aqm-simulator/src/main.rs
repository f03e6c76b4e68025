//! Desktop simulator for the air-quality monitor telemetry core.
//!
//! Runs `aqm-core` against synthetic sensors, a modem that joins after a
//! few polls and a stdout console, in (optionally accelerated) real time.
//!
//! # Commands (type a letter, then Enter)
//!
//! | Key | Action                          |
//! |-----|---------------------------------|
//! | c   | Button click                    |
//! | h   | Button hold                     |
//! | k   | Toggle CO₂ calibration          |
//! | s   | Send now                        |
//! | p   | Print status                    |
//! | q   | Quit                            |
//!
//! # Flags
//!
//! `--speed N` runs the node clock N times faster than the wall clock.
//! `--join-polls N` makes the modem report not-ready for the first N polls.
//! `--config PATH` loads a postcard-encoded `NodeConfig` blob.

use std::io::BufRead;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel as CommandChannel;
use embassy_time::{Duration, Instant};
use log::{error, info, warn};

use aqm_core::app_state::{AppError, AppState, ButtonEvent};
use aqm_core::config::NodeConfig;
use aqm_core::diagnostics::Diagnostics;
use aqm_core::frame::{DecodedFrame, Frame};
use aqm_core::indicator::{Indicator, IndicatorMode};
use aqm_core::scheduler::{Clock, RunLoop};
use aqm_core::sensors::{Channel, Quantity, SensorError, SensorEvent, SensorSource};
use aqm_core::transport::{Transport, TransportError, TransportEvent};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Upper bound on how long the main loop sleeps between checks.
const MAX_IDLE: StdDuration = StdDuration::from_millis(20);

/// Every this many frames the simulated network fails to acknowledge.
const FAIL_EVERY: u32 = 5;

const DEFAULT_JOIN_POLLS: u32 = 20;

// ---------------------------------------------------------------------------
// Console commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Click,
    Hold,
    Calibrate,
    Send,
    Status,
    Quit,
}

impl Command {
    fn parse(input: &str) -> Option<Self> {
        match input.trim() {
            "c" => Some(Self::Click),
            "h" => Some(Self::Hold),
            "k" => Some(Self::Calibrate),
            "s" => Some(Self::Send),
            "p" => Some(Self::Status),
            "q" => Some(Self::Quit),
            _ => None,
        }
    }
}

/// Commands from the stdin reader thread to the main loop
static COMMANDS: CommandChannel<CriticalSectionRawMutex, Command, 8> = CommandChannel::new();

fn spawn_stdin_reader() {
    std::thread::spawn(|| {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            match Command::parse(&line) {
                Some(command) => {
                    if COMMANDS.try_send(command).is_err() {
                        warn!("Command queue full, dropping {:?}", command);
                    }
                }
                None => warn!("Unknown command {:?}", line.trim()),
            }
        }
        // EOF on stdin ends the simulation.
        let _ = COMMANDS.try_send(Command::Quit);
    });
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Wall clock scaled by `speed`, starting at zero.
struct SimClock {
    origin: std::time::Instant,
    speed: u64,
}

impl SimClock {
    fn new(speed: u64) -> Self {
        Self {
            origin: std::time::Instant::now(),
            speed: speed.max(1),
        }
    }

    /// Wall time until the node clock reaches `at`
    fn wall_until(&self, at: Instant) -> StdDuration {
        let node_us = at.saturating_duration_since(self.now()).as_micros();
        StdDuration::from_micros(node_us / self.speed)
    }
}

impl Clock for SimClock {
    fn now(&self) -> Instant {
        let micros = self.origin.elapsed().as_micros() as u64;
        Instant::from_micros(micros.saturating_mul(self.speed))
    }
}

// ---------------------------------------------------------------------------
// Synthetic sensors
// ---------------------------------------------------------------------------

/// Sensors following slow sinusoids. Each channel raises an update event
/// on its own cadence, as programmed by the core.
struct SimSensors {
    intervals: [Duration; Channel::ALL.len()],
    next_sample: [Instant; Channel::ALL.len()],
    now_secs: f32,
}

impl SimSensors {
    fn new() -> Self {
        Self {
            intervals: [Duration::from_secs(1); Channel::ALL.len()],
            next_sample: [Instant::from_ticks(0); Channel::ALL.len()],
            now_secs: 0.0,
        }
    }

    /// Channels whose sampling period has elapsed at `now`
    fn due_events(&mut self, now: Instant) -> Vec<SensorEvent> {
        self.now_secs = now.as_millis() as f32 / 1000.0;
        let mut events = Vec::new();
        for (index, channel) in Channel::ALL.into_iter().enumerate() {
            if now >= self.next_sample[index] {
                self.next_sample[index] = now + self.intervals[index];
                events.push(SensorEvent::Update(channel));
            }
        }
        events
    }

    fn index(channel: Channel) -> usize {
        Channel::ALL
            .iter()
            .position(|c| *c == channel)
            .unwrap_or_default()
    }
}

impl SensorSource for SimSensors {
    fn read(&mut self, quantity: Quantity) -> Result<f32, SensorError> {
        let t = self.now_secs;
        let value = match quantity {
            // Temperature: 20–26 °C with slow drift
            Quantity::Temperature => 23.0 + 3.0 * (t / 600.0).sin() + 0.3 * (t / 37.0).cos(),
            Quantity::Humidity => 50.0 + 10.0 * (t / 900.0).sin() + 2.0 * (t / 23.0).cos(),
            // Raw driver reading, pascal
            Quantity::Pressure => 101_325.0 + 150.0 * (t / 1800.0).sin(),
            Quantity::Altitude => 120.0 + 12.0 * (t / 1800.0).sin(),
            Quantity::Tvoc => 150.0 + 100.0 * (t / 400.0).sin().abs(),
            Quantity::Co2 => 600.0 + 200.0 * (t / 1500.0).sin() + 30.0 * (t / 41.0).cos(),
            Quantity::BatteryVoltage => 3.0 - 0.2 * (t / 86_400.0).min(1.0),
            Quantity::BatteryPercentage => 100.0 - 40.0 * (t / 86_400.0).min(1.0),
        };
        Ok(value)
    }

    fn set_update_interval(&mut self, channel: Channel, interval: Duration) {
        info!("{:?} sampling every {} s", channel, interval.as_secs());
        self.intervals[Self::index(channel)] = interval;
    }

    fn calibrate_co2_reference(&mut self) -> Result<(), SensorError> {
        info!("CO₂ module: reference set at {:.0} ppm", self.read(Quantity::Co2)?);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Modem
// ---------------------------------------------------------------------------

/// A modem that needs `join_polls` readiness checks to join, then accepts
/// every frame and reports its fate on the next loop iteration.
struct SimModem {
    join_polls: u32,
    polls: u32,
    frames: u32,
    pending: Vec<TransportEvent>,
}

impl SimModem {
    fn new(join_polls: u32) -> Self {
        Self {
            join_polls,
            polls: 0,
            frames: 0,
            pending: Vec::new(),
        }
    }

    fn take_events(&mut self) -> Vec<TransportEvent> {
        std::mem::take(&mut self.pending)
    }
}

impl Transport for SimModem {
    fn is_ready(&mut self) -> bool {
        if self.polls < self.join_polls {
            self.polls += 1;
            if self.polls == self.join_polls {
                info!("Modem joined after {} polls", self.polls);
            }
            return false;
        }
        true
    }

    fn send_confirmed(&mut self, frame: Frame) -> Result<(), TransportError> {
        if self.polls < self.join_polls {
            return Err(TransportError::NotJoined);
        }
        self.frames += 1;
        info!("Modem TX: {:?}", DecodedFrame::from(&frame));

        if self.frames % FAIL_EVERY == 0 {
            self.pending.push(TransportEvent::Retransmitted);
            self.pending.push(TransportEvent::Failed);
        } else {
            self.pending.push(TransportEvent::Sent);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// LED and console
// ---------------------------------------------------------------------------

struct SimLed;

impl Indicator for SimLed {
    fn set_mode(&mut self, mode: IndicatorMode) {
        info!("LED {:?}", mode);
    }

    fn pulse(&mut self, duration: Duration) {
        info!("LED pulse {} ms", duration.as_millis());
    }
}

struct StdoutConsole;

impl Diagnostics for StdoutConsole {
    fn line(&mut self, line: &str) {
        println!("> {}", line);
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

struct Options {
    speed: u64,
    join_polls: u32,
    config: NodeConfig,
}

/// Parse a flag value, keeping `current` (with a warning) when it is invalid.
fn parse_flag<T: FromStr + std::fmt::Display>(flag: &str, value: &str, current: T) -> T {
    match value.parse() {
        Ok(parsed) => parsed,
        Err(_) => {
            warn!("Invalid {} value {:?}, keeping {}", flag, value, current);
            current
        }
    }
}

fn parse_options(mut args: impl Iterator<Item = String>) -> Result<Options, AppError> {
    let mut options = Options {
        speed: 1,
        join_polls: DEFAULT_JOIN_POLLS,
        config: NodeConfig::default(),
    };

    while let Some(arg) = args.next() {
        let value = args.next();
        match (arg.as_str(), value) {
            ("--speed", Some(v)) => {
                options.speed = parse_flag("--speed", &v, options.speed).max(1);
            }
            ("--join-polls", Some(v)) => {
                options.join_polls = parse_flag("--join-polls", &v, options.join_polls);
            }
            ("--config", Some(path)) => match std::fs::read(&path) {
                Ok(bytes) => options.config = NodeConfig::from_bytes(&bytes)?,
                Err(e) => error!("Cannot read {}: {}", path, e),
            },
            (other, _) => warn!("Ignoring argument {:?}", other),
        }
    }
    Ok(options)
}

fn main() {
    env_logger::init();
    info!("Starting air-quality monitor simulator");
    info!("Keys: c=Click  h=Hold  k=Calibration  s=Send  p=Status  q=Quit");

    let options = match parse_options(std::env::args().skip(1)) {
        Ok(options) => options,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    info!(
        "Speed {}×, modem joins after {} polls",
        options.speed, options.join_polls
    );

    let clock = SimClock::new(options.speed);
    let mut run_loop: RunLoop<&SimClock> = RunLoop::new(&clock);
    let mut app = AppState::new(
        options.config,
        SimSensors::new(),
        SimModem::new(options.join_polls),
        SimLed,
        StdoutConsole,
    );

    if let Err(e) = app.start(&mut run_loop) {
        error!("Boot failed: {}", e);
        std::process::exit(1);
    }
    spawn_stdin_reader();

    // -----------------------------------------------------------------------
    // Main loop
    // -----------------------------------------------------------------------
    'running: loop {
        // --- Console commands ---------------------------------------------
        while let Ok(command) = COMMANDS.try_receive() {
            match command {
                Command::Click => app.on_button(ButtonEvent::Click, &mut run_loop),
                Command::Hold => app.on_button(ButtonEvent::Hold, &mut run_loop),
                Command::Calibrate => match app.toggle_calibration(&mut run_loop) {
                    Ok(phase) => info!("Calibration {:?}", phase),
                    Err(e) => error!("Calibration toggle failed: {}", e),
                },
                Command::Send => app.trigger_send(None, &mut run_loop),
                Command::Status => app.print_status(),
                Command::Quit => break 'running,
            }
        }

        // --- Sensor events ------------------------------------------------
        let now = clock.now();
        for event in app.sensors_mut().due_events(now) {
            app.on_sensor_event(event, &mut run_loop);
        }

        // --- Scheduled tasks ----------------------------------------------
        app.run_due(&mut run_loop);

        // --- Transport feedback -------------------------------------------
        for event in app.transport_mut().take_events() {
            app.on_transport_event(event);
        }

        // --- Pacing -------------------------------------------------------
        let idle = run_loop
            .next_deadline()
            .map(|at| clock.wall_until(at))
            .unwrap_or(MAX_IDLE)
            .min(MAX_IDLE);
        std::thread::sleep(idle);
    }

    info!("Simulator exiting");
}
