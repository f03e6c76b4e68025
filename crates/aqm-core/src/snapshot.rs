//! Latest-readings snapshot
//!
//! The single source of truth read by the frame encoder and by any display
//! layer. Each field is either the most recent accepted sample or `None`
//! for "unknown", which is not the same thing as zero.

use crate::sensors::Quantity;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Snapshot {
    /// Degrees Celsius
    pub temperature: Option<f32>,
    /// Relative humidity in percent
    pub humidity: Option<f32>,
    /// Barometric pressure in hectopascal
    pub pressure: Option<f32>,
    /// Altitude in meters
    pub altitude: Option<f32>,
    /// Total volatile organic compounds in ppb
    pub tvoc: Option<f32>,
    /// CO2 concentration in ppm
    pub co2: Option<f32>,
    /// Battery voltage in volts
    pub battery_voltage: Option<f32>,
    /// Battery charge level in percent
    pub battery_percentage: Option<f32>,
}

impl Snapshot {
    /// Create a snapshot with every field unknown
    pub const fn new() -> Self {
        Self {
            temperature: None,
            humidity: None,
            pressure: None,
            altitude: None,
            tvoc: None,
            co2: None,
            battery_voltage: None,
            battery_percentage: None,
        }
    }

    pub fn get(&self, quantity: Quantity) -> Option<f32> {
        match quantity {
            Quantity::Temperature => self.temperature,
            Quantity::Humidity => self.humidity,
            Quantity::Pressure => self.pressure,
            Quantity::Altitude => self.altitude,
            Quantity::Tvoc => self.tvoc,
            Quantity::Co2 => self.co2,
            Quantity::BatteryVoltage => self.battery_voltage,
            Quantity::BatteryPercentage => self.battery_percentage,
        }
    }

    pub(crate) fn set(&mut self, quantity: Quantity, value: f32) {
        let field = match quantity {
            Quantity::Temperature => &mut self.temperature,
            Quantity::Humidity => &mut self.humidity,
            Quantity::Pressure => &mut self.pressure,
            Quantity::Altitude => &mut self.altitude,
            Quantity::Tvoc => &mut self.tvoc,
            Quantity::Co2 => &mut self.co2,
            Quantity::BatteryVoltage => &mut self.battery_voltage,
            Quantity::BatteryPercentage => &mut self.battery_percentage,
        };
        *field = Some(value);
    }

    /// Number of fields currently holding a valid sample
    pub fn known_count(&self) -> usize {
        Quantity::ALL
            .iter()
            .filter(|q| self.get(**q).is_some())
            .count()
    }
}
