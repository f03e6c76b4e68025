//! Application-wide state and error types
//!
//! [`AppState`] owns the snapshot, the four telemetry components and every
//! hardware collaborator. The scheduler is passed into each entry point so
//! the host decides how tasks are driven.

mod events;

pub use events::*;

use log::{debug, info};
use thiserror_no_std::Error;

use crate::calibration::{CalibrationPhase, CalibrationSequencer};
use crate::config::{ConfigError, NodeConfig};
use crate::diagnostics::Diagnostics;
use crate::frame::Header;
use crate::indicator::Indicator;
use crate::publish::{PublishEngine, PublishOutcome};
use crate::scheduler::{Clock, RunLoop, Scheduler, SchedulerError, Task, TaskHandle};
use crate::sensors::{Channel, SensorEvent, SensorSource};
use crate::snapshot::Snapshot;
use crate::status::StatusReport;
use crate::transmit::{TransmitLoop, TransmitOutcome};
use crate::transport::{Transport, TransportEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppRunState {
    Uninitialized,
    Running,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppError {
    #[error("Scheduler error: {0}")]
    Scheduler(SchedulerError),
    #[error("Config error: {0}")]
    Config(ConfigError),
    #[error("Node already started")]
    AlreadyStarted,
}

impl From<SchedulerError> for AppError {
    fn from(e: SchedulerError) -> Self {
        Self::Scheduler(e)
    }
}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

/// Main application state container
pub struct AppState<S, T, I, D>
where
    S: SensorSource,
    T: Transport,
    I: Indicator,
    D: Diagnostics,
{
    run_state: AppRunState,
    config: NodeConfig,
    snapshot: Snapshot,
    publish: PublishEngine,
    calibration: CalibrationSequencer,
    transmit: TransmitLoop,
    sensors: S,
    transport: T,
    indicator: I,
    diag: D,
}

impl<S, T, I, D> AppState<S, T, I, D>
where
    S: SensorSource,
    T: Transport,
    I: Indicator,
    D: Diagnostics,
{
    pub fn new(config: NodeConfig, sensors: S, transport: T, indicator: I, diag: D) -> Self {
        Self {
            run_state: AppRunState::Uninitialized,
            config,
            snapshot: Snapshot::new(),
            publish: PublishEngine::new(config.channels),
            calibration: CalibrationSequencer::new(
                config.calibration,
                config.intervals.get(Channel::Co2),
            ),
            transmit: TransmitLoop::new(config.transmit),
            sensors,
            transport,
            indicator,
            diag,
        }
    }

    /// Boot sequence: program sensor cadences, flash the indicator and
    /// queue the boot frame.
    pub fn start<Sch: Scheduler + ?Sized>(&mut self, scheduler: &mut Sch) -> Result<(), AppError> {
        if self.run_state != AppRunState::Uninitialized {
            return Err(AppError::AlreadyStarted);
        }

        for channel in Channel::ALL {
            self.sensors
                .set_update_interval(channel, self.config.intervals.get(channel));
        }
        self.indicator.pulse(BOOT_PULSE);
        self.transmit.start(scheduler)?;

        info!("{} v{} started", NODE_NAME, env!("CARGO_PKG_VERSION"));
        self.run_state = AppRunState::Running;
        Ok(())
    }

    pub fn run_state(&self) -> AppRunState {
        self.run_state
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Latest accepted readings
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn calibration_phase(&self) -> CalibrationPhase {
        self.calibration.phase()
    }

    pub fn transmit(&self) -> &TransmitLoop {
        &self.transmit
    }

    pub fn sensors_mut(&mut self) -> &mut S {
        &mut self.sensors
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn indicator(&self) -> &I {
        &self.indicator
    }

    pub fn diagnostics(&self) -> &D {
        &self.diag
    }

    /// Feed a driver event through the publish engine. A publish pulls the
    /// transmit task forward.
    pub fn on_sensor_event<Sch: Scheduler + ?Sized>(
        &mut self,
        event: SensorEvent,
        scheduler: &mut Sch,
    ) -> PublishOutcome {
        let channel = match event {
            SensorEvent::Update(channel) => channel,
            SensorEvent::Error(channel) => {
                debug!("{:?} driver reported an error", channel);
                return PublishOutcome::Skipped;
            }
        };

        let outcome = self.publish.on_update(
            channel,
            &mut self.sensors,
            &mut self.snapshot,
            scheduler.now(),
        );
        if outcome.is_published() {
            self.transmit.request_send(None, scheduler);
        }
        outcome
    }

    pub fn on_button<Sch: Scheduler + ?Sized>(&mut self, event: ButtonEvent, scheduler: &mut Sch) {
        debug!("Button {:?}", event);
        self.indicator.pulse(BUTTON_PULSE);
        self.transmit.request_send(Some(event.header()), scheduler);
    }

    pub fn toggle_calibration<Sch: Scheduler + ?Sized>(
        &mut self,
        scheduler: &mut Sch,
    ) -> Result<CalibrationPhase, AppError> {
        let phase = self.calibration.toggle(
            scheduler,
            &mut self.sensors,
            &mut self.indicator,
            &mut self.diag,
        )?;
        Ok(phase)
    }

    /// Send as soon as the transport allows, optionally with a one-shot
    /// header.
    pub fn trigger_send<Sch: Scheduler + ?Sized>(
        &mut self,
        header: Option<Header>,
        scheduler: &mut Sch,
    ) {
        self.transmit.request_send(header, scheduler);
    }

    /// Indicator feedback for transport outcomes. Suppressed while a
    /// calibration session owns the indicator.
    pub fn on_transport_event(&mut self, event: TransportEvent) {
        let pulse = match event {
            TransportEvent::Sent => Some(SENT_PULSE),
            TransportEvent::Failed => Some(FAILED_PULSE),
            TransportEvent::Retransmitted => None,
        };
        info!("Transport event: {:?}", event);

        if let Some(duration) = pulse
            && !self.calibration.phase().is_active()
        {
            self.indicator.pulse(duration);
        }
    }

    /// Dispatch a task that came due.
    pub fn run_task<Sch: Scheduler + ?Sized>(
        &mut self,
        handle: TaskHandle,
        task: Task,
        scheduler: &mut Sch,
    ) -> Option<TransmitOutcome> {
        match task {
            Task::Transmit => Some(self.transmit.on_tick(
                handle,
                &self.snapshot,
                scheduler,
                &mut self.transport,
                &mut self.diag,
            )),
            Task::Calibration => {
                self.calibration.on_tick(
                    handle,
                    scheduler,
                    &mut self.sensors,
                    &mut self.indicator,
                    &mut self.diag,
                );
                None
            }
        }
    }

    /// Run every task due at the run loop's current time. Returns how many
    /// ran.
    pub fn run_due<C: Clock, const N: usize>(&mut self, run_loop: &mut RunLoop<C, N>) -> usize {
        let mut ran = 0;
        while let Some((handle, task)) = run_loop.next_due() {
            self.run_task(handle, task, run_loop);
            ran += 1;
        }
        ran
    }

    /// Current value of every channel, unknown where never sampled
    pub fn report_status(&self) -> StatusReport {
        StatusReport::from_snapshot(&self.snapshot)
    }

    /// Write the status report to the diagnostic sink, one line per value.
    pub fn print_status(&mut self) {
        let report = self.report_status();
        for (quantity, _) in report.iter() {
            self.diag.line(&report.line(quantity));
        }
    }
}
