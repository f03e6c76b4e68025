//! Sensor collaborator interface
//!
//! The bus drivers themselves live outside this crate. A driver announces
//! fresh data with a [`SensorEvent`], after which the core pulls the value
//! through [`SensorSource::read`]. The core never polls on its own.

use embassy_time::Duration;
use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("{sensor}: no valid reading available")]
    NotReady { sensor: &'static str },
    #[error("{sensor}: {operation} failed")]
    ReadFailed {
        sensor: &'static str,
        operation: &'static str,
    },
    #[error("{sensor}: reading out of range")]
    Invalid { sensor: &'static str },
}

/// One physical quantity held in the snapshot.
///
/// `Pressure` is reported by drivers in pascal but stored in the snapshot
/// in hectopascal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantity {
    Temperature,
    Humidity,
    Pressure,
    Altitude,
    Tvoc,
    Co2,
    BatteryVoltage,
    BatteryPercentage,
}

impl Quantity {
    pub const ALL: [Quantity; 8] = [
        Quantity::Temperature,
        Quantity::Humidity,
        Quantity::Co2,
        Quantity::Tvoc,
        Quantity::Pressure,
        Quantity::Altitude,
        Quantity::BatteryVoltage,
        Quantity::BatteryPercentage,
    ];

    /// Get a short label for display
    pub const fn label(self) -> &'static str {
        match self {
            Self::Temperature => "Temperature",
            Self::Humidity => "Humidity",
            Self::Pressure => "Pressure",
            Self::Altitude => "Altitude",
            Self::Tvoc => "TVOC",
            Self::Co2 => "CO2",
            Self::BatteryVoltage | Self::BatteryPercentage => "Battery",
        }
    }

    /// Unit as stored in the snapshot
    pub const fn unit(self) -> &'static str {
        match self {
            Self::Temperature => "\u{b0}C",
            Self::Humidity | Self::BatteryPercentage => "%",
            Self::Pressure => "hPa",
            Self::Altitude => "m",
            Self::Tvoc => "ppb",
            Self::Co2 => "ppm",
            Self::BatteryVoltage => "V",
        }
    }

    /// Number of decimals shown on the status pages
    pub const fn precision(self) -> usize {
        match self {
            Self::Co2 | Self::Pressure | Self::BatteryPercentage => 0,
            Self::BatteryVoltage => 2,
            _ => 1,
        }
    }

    /// Driver name used in log and error messages
    pub const fn sensor_name(self) -> &'static str {
        match self {
            Self::Temperature => "TMP112",
            Self::Humidity => "humidity tag",
            Self::Pressure | Self::Altitude => "barometer tag",
            Self::Tvoc => "VOC-LP tag",
            Self::Co2 => "CO2 module",
            Self::BatteryVoltage | Self::BatteryPercentage => "battery module",
        }
    }
}

/// A sensor event source. Each channel has its own publish decision,
/// except the barometer which yields the pressure/altitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Temperature,
    Humidity,
    Barometer,
    Tvoc,
    Co2,
    Battery,
}

impl Channel {
    pub const ALL: [Channel; 6] = [
        Channel::Temperature,
        Channel::Humidity,
        Channel::Barometer,
        Channel::Tvoc,
        Channel::Co2,
        Channel::Battery,
    ];
}

/// Events delivered by the sensor drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorEvent {
    /// New data is available on the channel.
    Update(Channel),
    /// The driver gave up on a measurement cycle.
    Error(Channel),
}

/// Pull accessor over all attached sensor drivers.
pub trait SensorSource {
    /// Read the latest value of a quantity.
    fn read(&mut self, quantity: Quantity) -> Result<f32, SensorError>;

    /// Change how often the driver behind `channel` samples.
    fn set_update_interval(&mut self, channel: Channel, interval: Duration);

    /// Tell the CO2 sensor that the current concentration is the
    /// background reference it should calibrate against.
    fn calibrate_co2_reference(&mut self) -> Result<(), SensorError>;
}
