use embassy_time::Duration;

use crate::frame::Header;

/// Name the node announces itself with
pub const NODE_NAME: &str = "air-quality-monitor";

pub const BOOT_PULSE: Duration = Duration::from_millis(2000);
pub const BUTTON_PULSE: Duration = Duration::from_millis(100);
pub const SENT_PULSE: Duration = Duration::from_millis(100);
pub const FAILED_PULSE: Duration = Duration::from_millis(1000);

/// User button gestures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    Click,
    Hold,
}

impl ButtonEvent {
    /// Header of the frame sent in response
    pub const fn header(self) -> Header {
        match self {
            Self::Click => Header::ButtonClick,
            Self::Hold => Header::ButtonHold,
        }
    }
}
