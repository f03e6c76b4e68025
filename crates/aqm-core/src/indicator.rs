//! Status LED interface

use embassy_time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorMode {
    Off,
    BlinkFast,
}

pub trait Indicator {
    fn set_mode(&mut self, mode: IndicatorMode);

    /// Light up once for `duration`, then return to the current mode.
    fn pulse(&mut self, duration: Duration);
}
