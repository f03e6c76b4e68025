//! Read-only status report over the snapshot
//!
//! Values are grouped into the same four pages the node's display shows,
//! and each can be rendered as a one-line `"<label> <value> <unit>"` string
//! for the diagnostic sink. Unknown values render as `--`.

use core::fmt::Write;

use heapless::String;

use crate::sensors::Quantity;
use crate::snapshot::Snapshot;

/// Capacity of one formatted status line
pub const STATUS_LINE_LEN: usize = 32;

/// The display pages, in order
pub const PAGES: [[Quantity; 2]; 4] = [
    [Quantity::Temperature, Quantity::Humidity],
    [Quantity::Co2, Quantity::Tvoc],
    [Quantity::Pressure, Quantity::Altitude],
    [Quantity::BatteryVoltage, Quantity::BatteryPercentage],
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusReport {
    values: [(Quantity, Option<f32>); Quantity::ALL.len()],
}

impl StatusReport {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            values: Quantity::ALL.map(|q| (q, snapshot.get(q))),
        }
    }

    pub fn get(&self, quantity: Quantity) -> Option<f32> {
        self.values
            .iter()
            .find(|(q, _)| *q == quantity)
            .and_then(|(_, v)| *v)
    }

    /// Every quantity with its value, in page order
    pub fn iter(&self) -> impl Iterator<Item = (Quantity, Option<f32>)> + '_ {
        self.values.iter().copied()
    }

    pub fn known_count(&self) -> usize {
        self.values.iter().filter(|(_, v)| v.is_some()).count()
    }

    pub fn line(&self, quantity: Quantity) -> String<STATUS_LINE_LEN> {
        format_line(quantity, self.get(quantity))
    }
}

fn format_line(quantity: Quantity, value: Option<f32>) -> String<STATUS_LINE_LEN> {
    let mut line = String::new();
    // Longest label plus value fits comfortably; overflow only truncates.
    let _ = match value {
        Some(v) => write!(
            line,
            "{} {:.*} {}",
            quantity.label(),
            quantity.precision(),
            v,
            quantity.unit()
        ),
        None => write!(line, "{} --", quantity.label()),
    };
    line
}
