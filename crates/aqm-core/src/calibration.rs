//! CO2 background calibration sequencer
//!
//! A session takes a fixed number of reference measurements, spaced by
//! the measurement interval, after an initial settling delay. While a
//! session is active the indicator blinks fast and the CO2 sensor samples
//! at the calibration cadence.
//!
//! ```text
//! Idle --toggle--> Armed --first tick--> Running --last tick--> Idle
//!                    |                      |
//!                    +-------toggle---------+------------------> Idle
//! ```
//!
//! Toggling is the only control. A new session always starts from the full
//! measurement count.

use embassy_time::Duration;
use log::{info, warn};

use crate::config::CalibrationSettings;
use crate::diagnostics::{self, Diagnostics};
use crate::indicator::{Indicator, IndicatorMode};
use crate::scheduler::{Scheduler, SchedulerError, Task, TaskHandle, deadline_after};
use crate::sensors::{Channel, SensorSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationPhase {
    /// No session
    Idle,
    /// Waiting out the settling delay
    Armed,
    /// Taking measurements
    Running,
}

impl CalibrationPhase {
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Idle)
    }
}

#[derive(Debug, Clone, Copy)]
struct Session {
    handle: TaskHandle,
    remaining: u8,
    running: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Stopped,
    Finished,
}

pub struct CalibrationSequencer {
    settings: CalibrationSettings,
    /// CO2 sampling interval outside of calibration
    normal_interval: Duration,
    session: Option<Session>,
}

impl CalibrationSequencer {
    pub fn new(settings: CalibrationSettings, normal_interval: Duration) -> Self {
        Self {
            settings,
            normal_interval,
            session: None,
        }
    }

    pub fn phase(&self) -> CalibrationPhase {
        match self.session {
            None => CalibrationPhase::Idle,
            Some(Session { running: false, .. }) => CalibrationPhase::Armed,
            Some(Session { running: true, .. }) => CalibrationPhase::Running,
        }
    }

    /// Measurements left in the current session
    pub fn remaining(&self) -> Option<u8> {
        self.session.map(|s| s.remaining)
    }

    /// Handle of the pending calibration task, if a session is active
    pub fn handle(&self) -> Option<TaskHandle> {
        self.session.map(|s| s.handle)
    }

    /// Start a session when idle, stop the current one otherwise.
    /// Returns the phase after the toggle.
    pub fn toggle<Sch, S, I, D>(
        &mut self,
        scheduler: &mut Sch,
        sensors: &mut S,
        indicator: &mut I,
        diag: &mut D,
    ) -> Result<CalibrationPhase, SchedulerError>
    where
        Sch: Scheduler + ?Sized,
        S: SensorSource + ?Sized,
        I: Indicator + ?Sized,
        D: Diagnostics + ?Sized,
    {
        if self.session.is_some() {
            self.stop(StopReason::Stopped, scheduler, sensors, indicator, diag);
        } else {
            self.start(scheduler, indicator, diag)?;
        }
        Ok(self.phase())
    }

    fn start<Sch, I, D>(
        &mut self,
        scheduler: &mut Sch,
        indicator: &mut I,
        diag: &mut D,
    ) -> Result<(), SchedulerError>
    where
        Sch: Scheduler + ?Sized,
        I: Indicator + ?Sized,
        D: Diagnostics + ?Sized,
    {
        let at = deadline_after(scheduler.now(), self.settings.start_delay());
        let handle = scheduler.register(Task::Calibration, at)?;

        self.session = Some(Session {
            handle,
            remaining: self.settings.measurements,
            running: false,
        });
        indicator.set_mode(IndicatorMode::BlinkFast);

        info!(
            "CO2 calibration started: {} measurements, first in {} s",
            self.settings.measurements,
            self.settings.start_delay().as_secs()
        );
        diag.line("calibration started");
        Ok(())
    }

    /// Run one measurement of the session owning `handle`.
    pub fn on_tick<Sch, S, I, D>(
        &mut self,
        handle: TaskHandle,
        scheduler: &mut Sch,
        sensors: &mut S,
        indicator: &mut I,
        diag: &mut D,
    ) where
        Sch: Scheduler + ?Sized,
        S: SensorSource + ?Sized,
        I: Indicator + ?Sized,
        D: Diagnostics + ?Sized,
    {
        let Some(session) = self.session.as_mut().filter(|s| s.handle == handle) else {
            warn!("Ignoring calibration tick for {:?}: no such session", handle);
            return;
        };
        session.running = true;

        sensors.set_update_interval(Channel::Co2, self.settings.sensor_interval());
        if let Err(e) = sensors.calibrate_co2_reference() {
            warn!("CO2 reference command failed: {}", e);
        }

        session.remaining = session.remaining.saturating_sub(1);
        let remaining = session.remaining;
        diagnostics::emit(
            diag,
            format_args!("calibration: {} measurements left", remaining),
        );

        if remaining == 0 {
            self.stop(StopReason::Finished, scheduler, sensors, indicator, diag);
        } else {
            scheduler.plan_relative(handle, self.settings.measure_interval());
        }
    }

    fn stop<Sch, S, I, D>(
        &mut self,
        reason: StopReason,
        scheduler: &mut Sch,
        sensors: &mut S,
        indicator: &mut I,
        diag: &mut D,
    ) where
        Sch: Scheduler + ?Sized,
        S: SensorSource + ?Sized,
        I: Indicator + ?Sized,
        D: Diagnostics + ?Sized,
    {
        let Some(session) = self.session.take() else {
            return;
        };

        scheduler.cancel(session.handle);
        indicator.set_mode(IndicatorMode::Off);
        sensors.set_update_interval(Channel::Co2, self.normal_interval);

        match reason {
            StopReason::Stopped => {
                info!(
                    "CO2 calibration stopped with {} measurements left",
                    session.remaining
                );
                diag.line("calibration stopped");
            }
            StopReason::Finished => {
                info!("CO2 calibration finished");
                diag.line("calibration finished");
            }
        }
    }
}
