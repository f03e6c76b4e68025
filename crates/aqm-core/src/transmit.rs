//! Transmit retry loop
//!
//! One self-rescheduling task owns the uplink. Each time it fires it either
//! polls again shortly (modem not ready) or encodes the snapshot, hands the
//! frame to the transport and sleeps for the steady-state interval.
//! Requests for an immediate send pull the same task forward, so at most
//! one frame is ever in flight.

use log::{debug, info, warn};

use crate::config::TransmitSettings;
use crate::diagnostics::{self, Diagnostics};
use crate::frame::{Frame, Header};
use crate::scheduler::{Scheduler, SchedulerError, Task, TaskHandle};
use crate::snapshot::Snapshot;
use crate::transport::{Transport, TransportError};

/// What one firing of the transmit task did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmitOutcome {
    /// Transport not ready; polled again after the retry delay.
    NotReady,
    /// Frame handed to the transport.
    Sent(Frame),
    /// The transport refused the frame. The loop carries on as if sent.
    Failed(TransportError),
    /// The tick did not belong to this loop.
    Ignored,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransmitStats {
    pub sent: u32,
    pub failed: u32,
    pub not_ready_polls: u32,
}

pub struct TransmitLoop {
    settings: TransmitSettings,
    handle: Option<TaskHandle>,
    header: Header,
    stats: TransmitStats,
}

impl TransmitLoop {
    /// The first frame after boot carries [`Header::Boot`].
    pub fn new(settings: TransmitSettings) -> Self {
        Self {
            settings,
            handle: None,
            header: Header::Boot,
            stats: TransmitStats::default(),
        }
    }

    /// Header the next frame will carry
    pub fn header(&self) -> Header {
        self.header
    }

    pub fn stats(&self) -> TransmitStats {
        self.stats
    }

    pub fn handle(&self) -> Option<TaskHandle> {
        self.handle
    }

    /// Register the task to fire right away. Calling it again is a no-op.
    pub fn start<Sch: Scheduler + ?Sized>(
        &mut self,
        scheduler: &mut Sch,
    ) -> Result<TaskHandle, SchedulerError> {
        if let Some(handle) = self.handle {
            return Ok(handle);
        }
        let now = scheduler.now();
        let handle = scheduler.register(Task::Transmit, now)?;
        self.handle = Some(handle);
        Ok(handle)
    }

    /// Run the task now instead of at its planned time. `header`, if set,
    /// applies to the next frame only.
    pub fn request_send<Sch: Scheduler + ?Sized>(
        &mut self,
        header: Option<Header>,
        scheduler: &mut Sch,
    ) {
        if let Some(header) = header {
            self.header = header;
        }
        match self.handle {
            Some(handle) => scheduler.plan_now(handle),
            None => debug!("Send requested before the transmit task was started"),
        }
    }

    pub fn on_tick<Sch, T, D>(
        &mut self,
        handle: TaskHandle,
        snapshot: &Snapshot,
        scheduler: &mut Sch,
        transport: &mut T,
        diag: &mut D,
    ) -> TransmitOutcome
    where
        Sch: Scheduler + ?Sized,
        T: Transport + ?Sized,
        D: Diagnostics + ?Sized,
    {
        if self.handle != Some(handle) {
            warn!("Ignoring transmit tick for foreign handle {:?}", handle);
            return TransmitOutcome::Ignored;
        }

        if !transport.is_ready() {
            self.stats.not_ready_polls = self.stats.not_ready_polls.wrapping_add(1);
            scheduler.plan_relative(handle, self.settings.retry_delay());
            return TransmitOutcome::NotReady;
        }

        let frame = Frame::encode(self.header, snapshot);
        let outcome = match transport.send_confirmed(frame) {
            Ok(()) => {
                self.stats.sent = self.stats.sent.wrapping_add(1);
                info!("Uplink queued with header {:?}", self.header);
                TransmitOutcome::Sent(frame)
            }
            Err(e) => {
                self.stats.failed = self.stats.failed.wrapping_add(1);
                warn!("Uplink with header {:?} failed: {}", self.header, e);
                diagnostics::emit(diag, format_args!("send failed: {}", e));
                TransmitOutcome::Failed(e)
            }
        };
        diagnostics::emit(diag, format_args!("frame {}", frame.hex()));

        self.header = Header::Update;
        scheduler.plan_relative(handle, self.settings.send_interval());
        outcome
    }
}

#[cfg(test)]
mod tests {
    use embassy_time::{Duration, Instant};

    use super::*;
    use crate::scheduler::{Clock, ManualClock, RunLoop};
    use crate::testing::{FakeTransport, RecordingDiagnostics};

    fn started(run_loop: &mut RunLoop<&ManualClock>) -> (TransmitLoop, TaskHandle) {
        let mut transmit = TransmitLoop::new(TransmitSettings::default());
        let handle = transmit.start(run_loop).unwrap();
        (transmit, handle)
    }

    #[test]
    fn test_not_ready_polls_back_off_then_send_once() {
        const K: u32 = 7;
        let clock = ManualClock::new(Instant::from_secs(10));
        let mut run_loop: RunLoop<_> = RunLoop::new(&clock);
        let (mut transmit, _) = started(&mut run_loop);
        let mut transport = FakeTransport::ready_after(K);
        let mut diag = RecordingDiagnostics::new();
        let snapshot = Snapshot::new();

        for poll in 0..K {
            let Some((handle, _)) = run_loop.next_due() else {
                panic!("poll {} was not scheduled", poll);
            };
            let outcome =
                transmit.on_tick(handle, &snapshot, &mut run_loop, &mut transport, &mut diag);
            assert_eq!(outcome, TransmitOutcome::NotReady);
            assert_eq!(
                run_loop.next_deadline(),
                Some(clock.now() + Duration::from_millis(100)),
                "not-ready must back off by the retry delay"
            );
            clock.advance(Duration::from_millis(100));
        }
        assert!(transport.sent.is_empty());

        let Some((handle, _)) = run_loop.next_due() else {
            panic!("ready poll was not scheduled");
        };
        let outcome = transmit.on_tick(handle, &snapshot, &mut run_loop, &mut transport, &mut diag);

        assert!(matches!(outcome, TransmitOutcome::Sent(_)));
        assert_eq!(transport.sent.len(), 1);
        assert_eq!(transmit.stats().not_ready_polls, K);
        assert_eq!(
            run_loop.next_deadline(),
            Some(clock.now() + Duration::from_secs(15 * 60))
        );
    }

    #[test]
    fn test_boot_header_is_used_once() {
        let clock = ManualClock::new(Instant::from_secs(0));
        let mut run_loop: RunLoop<_> = RunLoop::new(&clock);
        let (mut transmit, handle) = started(&mut run_loop);
        let mut transport = FakeTransport::ready();
        let mut diag = RecordingDiagnostics::new();
        let snapshot = Snapshot::new();

        transmit.on_tick(handle, &snapshot, &mut run_loop, &mut transport, &mut diag);
        transmit.on_tick(handle, &snapshot, &mut run_loop, &mut transport, &mut diag);

        assert_eq!(transport.sent[0].header_byte(), Header::Boot.as_byte());
        assert_eq!(transport.sent[1].header_byte(), Header::Update.as_byte());
        assert!(diag.contains("frame 00ffffffffffffffffffff"));
    }

    #[test]
    fn test_button_header_overrides_exactly_one_frame() {
        let clock = ManualClock::new(Instant::from_secs(0));
        let mut run_loop: RunLoop<_> = RunLoop::new(&clock);
        let (mut transmit, handle) = started(&mut run_loop);
        let mut transport = FakeTransport::ready();
        let mut diag = RecordingDiagnostics::new();
        let snapshot = Snapshot::new();
        transmit.on_tick(handle, &snapshot, &mut run_loop, &mut transport, &mut diag);

        transmit.request_send(Some(Header::ButtonHold), &mut run_loop);
        assert_eq!(run_loop.next_due(), Some((handle, Task::Transmit)));
        transmit.on_tick(handle, &snapshot, &mut run_loop, &mut transport, &mut diag);
        transmit.on_tick(handle, &snapshot, &mut run_loop, &mut transport, &mut diag);

        let headers: alloc::vec::Vec<u8> = transport.sent.iter().map(|f| f.header_byte()).collect();
        assert_eq!(headers, [0, 3, 1]);
    }

    #[test]
    fn test_request_send_supersedes_steady_wait() {
        let clock = ManualClock::new(Instant::from_secs(0));
        let mut run_loop: RunLoop<_> = RunLoop::new(&clock);
        let (mut transmit, handle) = started(&mut run_loop);
        let mut transport = FakeTransport::ready();
        let mut diag = RecordingDiagnostics::new();
        let snapshot = Snapshot::new();
        run_loop.next_due();
        transmit.on_tick(handle, &snapshot, &mut run_loop, &mut transport, &mut diag);

        clock.advance(Duration::from_secs(30));
        assert_eq!(run_loop.next_due(), None);
        transmit.request_send(None, &mut run_loop);

        assert_eq!(run_loop.next_due(), Some((handle, Task::Transmit)));
        assert_eq!(transmit.header(), Header::Update);
    }

    #[test]
    fn test_send_failure_still_reschedules_and_flips_header() {
        let clock = ManualClock::new(Instant::from_secs(0));
        let mut run_loop: RunLoop<_> = RunLoop::new(&clock);
        let (mut transmit, handle) = started(&mut run_loop);
        let mut transport = FakeTransport::ready();
        transport.fail_with = Some(TransportError::Busy);
        let mut diag = RecordingDiagnostics::new();
        run_loop.next_due();

        let outcome =
            transmit.on_tick(handle, &Snapshot::new(), &mut run_loop, &mut transport, &mut diag);

        assert_eq!(outcome, TransmitOutcome::Failed(TransportError::Busy));
        assert_eq!(transmit.header(), Header::Update);
        assert_eq!(transmit.stats().failed, 1);
        assert!(diag.contains("send failed"));
        assert_eq!(
            run_loop.next_deadline(),
            Some(Instant::from_secs(15 * 60))
        );
    }

    #[test]
    fn test_foreign_handle_is_ignored() {
        let clock = ManualClock::new(Instant::from_secs(0));
        let mut run_loop: RunLoop<_> = RunLoop::new(&clock);
        let mut transmit = TransmitLoop::new(TransmitSettings::default());
        let mut transport = FakeTransport::ready();
        let mut diag = RecordingDiagnostics::new();
        let foreign = run_loop.register(Task::Calibration, clock.now()).unwrap();

        let outcome =
            transmit.on_tick(foreign, &Snapshot::new(), &mut run_loop, &mut transport, &mut diag);

        assert_eq!(outcome, TransmitOutcome::Ignored);
        assert_eq!(transport.polls, 0);
    }
}
