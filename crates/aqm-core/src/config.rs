//! Node configuration
//!
//! Every tunable of the telemetry core in one place. [`NodeConfig::default`]
//! reproduces the constants the node ships with; a provisioning blob
//! encoded with postcard can replace them at composition time.
//!
//! Durations are stored as milliseconds so the structs stay plain data on
//! the wire.

use alloc::vec::Vec;

use embassy_time::Duration;
use log::error;
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::publish::PublishPolicy;
use crate::sensors::Channel;

const MINUTE_MS: u32 = 60 * 1000;

pub const TEMPERATURE_PUB_VALUE_CHANGE: f32 = 0.2;
pub const HUMIDITY_PUB_VALUE_CHANGE: f32 = 5.0;
/// In hectopascal, the snapshot unit.
pub const BAROMETER_PUB_VALUE_CHANGE: f32 = 10.0;
pub const TVOC_PUB_VALUE_CHANGE: f32 = 5.0;
pub const CO2_PUB_VALUE_CHANGE: f32 = 50.0;
pub const PUB_NO_CHANGE_INTERVAL_MS: u32 = 15 * MINUTE_MS;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("config blob could not be decoded")]
    Decode,
    #[error("config could not be encoded")]
    Encode,
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

/// Publish policy per debounced channel
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ChannelPolicies {
    pub temperature: PublishPolicy,
    pub humidity: PublishPolicy,
    pub barometer: PublishPolicy,
    pub tvoc: PublishPolicy,
    pub co2: PublishPolicy,
}

impl Default for ChannelPolicies {
    fn default() -> Self {
        Self {
            temperature: PublishPolicy::threshold(
                TEMPERATURE_PUB_VALUE_CHANGE,
                PUB_NO_CHANGE_INTERVAL_MS,
            ),
            humidity: PublishPolicy::threshold(HUMIDITY_PUB_VALUE_CHANGE, PUB_NO_CHANGE_INTERVAL_MS),
            barometer: PublishPolicy::threshold(
                BAROMETER_PUB_VALUE_CHANGE,
                PUB_NO_CHANGE_INTERVAL_MS,
            ),
            tvoc: PublishPolicy::threshold(TVOC_PUB_VALUE_CHANGE, PUB_NO_CHANGE_INTERVAL_MS),
            co2: PublishPolicy::threshold(CO2_PUB_VALUE_CHANGE, PUB_NO_CHANGE_INTERVAL_MS),
        }
    }
}

/// How often each driver samples in normal operation
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorIntervals {
    pub temperature_ms: u32,
    pub humidity_ms: u32,
    pub barometer_ms: u32,
    pub tvoc_ms: u32,
    pub co2_ms: u32,
    pub battery_ms: u32,
}

impl SensorIntervals {
    pub const fn get(&self, channel: Channel) -> Duration {
        let ms = match channel {
            Channel::Temperature => self.temperature_ms,
            Channel::Humidity => self.humidity_ms,
            Channel::Barometer => self.barometer_ms,
            Channel::Tvoc => self.tvoc_ms,
            Channel::Co2 => self.co2_ms,
            Channel::Battery => self.battery_ms,
        };
        Duration::from_millis(ms as u64)
    }
}

impl Default for SensorIntervals {
    fn default() -> Self {
        Self {
            temperature_ms: 2 * 1000,
            humidity_ms: 2 * 1000,
            barometer_ms: MINUTE_MS,
            tvoc_ms: 5 * 1000,
            co2_ms: MINUTE_MS,
            battery_ms: 60 * MINUTE_MS,
        }
    }
}

/// Background calibration of the CO2 sensor
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationSettings {
    /// Number of reference measurements in one session
    pub measurements: u8,
    /// Settling time before the first measurement
    pub start_delay_ms: u32,
    /// Spacing between measurements
    pub measure_interval_ms: u32,
    /// CO2 sampling interval while a session runs
    pub sensor_interval_ms: u32,
}

impl CalibrationSettings {
    pub const fn start_delay(&self) -> Duration {
        Duration::from_millis(self.start_delay_ms as u64)
    }

    pub const fn measure_interval(&self) -> Duration {
        Duration::from_millis(self.measure_interval_ms as u64)
    }

    pub const fn sensor_interval(&self) -> Duration {
        Duration::from_millis(self.sensor_interval_ms as u64)
    }
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            measurements: 15,
            start_delay_ms: 5 * MINUTE_MS,
            measure_interval_ms: MINUTE_MS,
            sensor_interval_ms: MINUTE_MS,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransmitSettings {
    /// Poll delay while the modem is not ready
    pub retry_delay_ms: u32,
    /// Steady-state spacing between uplinks
    pub send_interval_ms: u32,
}

impl TransmitSettings {
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms as u64)
    }

    pub const fn send_interval(&self) -> Duration {
        Duration::from_millis(self.send_interval_ms as u64)
    }
}

impl Default for TransmitSettings {
    fn default() -> Self {
        Self {
            retry_delay_ms: 100,
            send_interval_ms: 15 * MINUTE_MS,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq)]
pub struct NodeConfig {
    pub channels: ChannelPolicies,
    pub intervals: SensorIntervals,
    pub calibration: CalibrationSettings,
    pub transmit: TransmitSettings,
}

impl NodeConfig {
    /// Decode and validate a postcard provisioning blob
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: NodeConfig = postcard::from_bytes(bytes).map_err(|e| {
            error!("Failed to decode node config: {:?}", e);
            ConfigError::Decode
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Encode into a postcard provisioning blob
    pub fn to_bytes(&self) -> Result<Vec<u8>, ConfigError> {
        postcard::to_allocvec(self).map_err(|e| {
            error!("Failed to encode node config: {:?}", e);
            ConfigError::Encode
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.calibration.measurements == 0 {
            return Err(ConfigError::Invalid(
                "calibration needs at least one measurement",
            ));
        }
        if self.transmit.retry_delay_ms == 0 {
            return Err(ConfigError::Invalid("transmit retry delay must be non-zero"));
        }
        if self.transmit.send_interval_ms == 0 {
            return Err(ConfigError::Invalid("transmit interval must be non-zero"));
        }
        Ok(())
    }
}
