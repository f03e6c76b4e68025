//! Publish-decision engine
//!
//! Turns a raw sample into a "should I emit now" decision, per channel.
//! A value is published when it moved by at least the channel's threshold
//! since the last publish, or when the heartbeat deadline has passed.

use embassy_time::{Duration, Instant};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::ChannelPolicies;
use crate::scheduler::deadline_after;
use crate::sensors::{Channel, Quantity, SensorError, SensorSource};
use crate::snapshot::Snapshot;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub enum PublishPolicy {
    /// Publish on a change of at least `delta`, or after `heartbeat_ms`
    /// without a publish.
    Threshold { delta: f32, heartbeat_ms: u32 },
    /// Publish every valid sample.
    Always,
}

impl PublishPolicy {
    pub const fn threshold(delta: f32, heartbeat_ms: u32) -> Self {
        Self::Threshold {
            delta,
            heartbeat_ms,
        }
    }
}

/// Result of feeding one sensor event through the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Snapshot updated; the uplink pipeline should run now.
    Published,
    /// Snapshot updated without asking for an uplink (battery).
    Recorded,
    /// Valid sample, but not worth publishing yet.
    Suppressed,
    /// The read failed. Nothing changed.
    Skipped,
}

impl PublishOutcome {
    pub const fn is_published(self) -> bool {
        matches!(self, Self::Published)
    }
}

/// Debounce state of one channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PublishState {
    last_published: Option<f32>,
    next_forced: Instant,
}

impl Default for PublishState {
    fn default() -> Self {
        Self::new()
    }
}

impl PublishState {
    /// The deadline starts in the past so the first sample always publishes.
    pub const fn new() -> Self {
        Self {
            last_published: None,
            next_forced: Instant::MIN,
        }
    }

    pub const fn last_published(&self) -> Option<f32> {
        self.last_published
    }

    pub const fn next_forced(&self) -> Instant {
        self.next_forced
    }

    /// Would `value` be published at `now`? Does not mutate.
    pub fn is_due(&self, value: f32, policy: PublishPolicy, now: Instant) -> bool {
        match policy {
            PublishPolicy::Always => true,
            PublishPolicy::Threshold { delta, .. } => match self.last_published {
                None => true,
                Some(last) => libm::fabsf(value - last) >= delta || now >= self.next_forced,
            },
        }
    }

    /// Record a publish of `value` at `now`.
    pub fn commit(&mut self, value: f32, policy: PublishPolicy, now: Instant) {
        let heartbeat = match policy {
            PublishPolicy::Threshold { heartbeat_ms, .. } => {
                Duration::from_millis(heartbeat_ms as u64)
            }
            PublishPolicy::Always => Duration::from_ticks(0),
        };
        self.last_published = Some(value);
        self.next_forced = deadline_after(now, heartbeat);
    }

    /// Decide and, on publish, commit.
    pub fn evaluate(&mut self, value: f32, policy: PublishPolicy, now: Instant) -> bool {
        if self.is_due(value, policy, now) {
            self.commit(value, policy, now);
            true
        } else {
            false
        }
    }
}

/// Per-channel publish decisions feeding the snapshot
pub struct PublishEngine {
    policies: ChannelPolicies,
    temperature: PublishState,
    humidity: PublishState,
    barometer: PublishState,
    tvoc: PublishState,
    co2: PublishState,
}

impl PublishEngine {
    pub fn new(policies: ChannelPolicies) -> Self {
        Self {
            policies,
            temperature: PublishState::new(),
            humidity: PublishState::new(),
            barometer: PublishState::new(),
            tvoc: PublishState::new(),
            co2: PublishState::new(),
        }
    }

    pub fn state(&self, channel: Channel) -> Option<&PublishState> {
        match channel {
            Channel::Temperature => Some(&self.temperature),
            Channel::Humidity => Some(&self.humidity),
            Channel::Barometer => Some(&self.barometer),
            Channel::Tvoc => Some(&self.tvoc),
            Channel::Co2 => Some(&self.co2),
            Channel::Battery => None,
        }
    }

    /// Handle an update event from `channel`: pull the sample, decide, and
    /// write the snapshot on publish.
    pub fn on_update<S: SensorSource>(
        &mut self,
        channel: Channel,
        sensors: &mut S,
        snapshot: &mut Snapshot,
        now: Instant,
    ) -> PublishOutcome {
        let policies = self.policies;
        match channel {
            Channel::Temperature => single(
                &mut self.temperature,
                policies.temperature,
                Quantity::Temperature,
                sensors,
                snapshot,
                now,
            ),
            Channel::Humidity => single(
                &mut self.humidity,
                policies.humidity,
                Quantity::Humidity,
                sensors,
                snapshot,
                now,
            ),
            Channel::Tvoc => single(
                &mut self.tvoc,
                policies.tvoc,
                Quantity::Tvoc,
                sensors,
                snapshot,
                now,
            ),
            Channel::Co2 => single(
                &mut self.co2,
                policies.co2,
                Quantity::Co2,
                sensors,
                snapshot,
                now,
            ),
            Channel::Barometer => {
                barometer(&mut self.barometer, policies.barometer, sensors, snapshot, now)
            }
            Channel::Battery => battery(sensors, snapshot),
        }
    }
}

fn sample<S: SensorSource>(sensors: &mut S, quantity: Quantity) -> Result<f32, SensorError> {
    let value = sensors.read(quantity)?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(SensorError::Invalid {
            sensor: quantity.sensor_name(),
        })
    }
}

fn single<S: SensorSource>(
    state: &mut PublishState,
    policy: PublishPolicy,
    quantity: Quantity,
    sensors: &mut S,
    snapshot: &mut Snapshot,
    now: Instant,
) -> PublishOutcome {
    let value = match sample(sensors, quantity) {
        Ok(value) => value,
        Err(e) => {
            debug!("Skipping {:?} update: {}", quantity, e);
            return PublishOutcome::Skipped;
        }
    };

    if !state.evaluate(value, policy, now) {
        return PublishOutcome::Suppressed;
    }

    snapshot.set(quantity, value);
    PublishOutcome::Published
}

/// Pressure and altitude are published as a pair. Altitude is only read
/// once pressure has cleared its own test, and a failed altitude read
/// discards the whole update. Drivers report pascal; the threshold test
/// and the snapshot both use hectopascal.
fn barometer<S: SensorSource>(
    state: &mut PublishState,
    policy: PublishPolicy,
    sensors: &mut S,
    snapshot: &mut Snapshot,
    now: Instant,
) -> PublishOutcome {
    let hpa = match sample(sensors, Quantity::Pressure) {
        Ok(pascal) => pascal / 100.0,
        Err(e) => {
            debug!("Skipping barometer update: {}", e);
            return PublishOutcome::Skipped;
        }
    };

    if !state.is_due(hpa, policy, now) {
        return PublishOutcome::Suppressed;
    }

    let meters = match sample(sensors, Quantity::Altitude) {
        Ok(value) => value,
        Err(e) => {
            debug!("Dropping barometer pair, altitude unavailable: {}", e);
            return PublishOutcome::Skipped;
        }
    };

    state.commit(hpa, policy, now);
    snapshot.set(Quantity::Pressure, hpa);
    snapshot.set(Quantity::Altitude, meters);
    PublishOutcome::Published
}

/// Battery readings are stored as they come, each half independently.
fn battery<S: SensorSource>(sensors: &mut S, snapshot: &mut Snapshot) -> PublishOutcome {
    let mut outcome = PublishOutcome::Skipped;
    for quantity in [Quantity::BatteryVoltage, Quantity::BatteryPercentage] {
        match sample(sensors, quantity) {
            Ok(value) => {
                snapshot.set(quantity, value);
                outcome = PublishOutcome::Recorded;
            }
            Err(e) => debug!("Skipping {:?} update: {}", quantity, e),
        }
    }
    outcome
}
