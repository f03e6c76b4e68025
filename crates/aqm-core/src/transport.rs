//! Radio transport interface
//!
//! The modem driver, its join procedure and session handling live outside
//! the core. The core only asks whether a link is up and hands over one
//! confirmed frame at a time.

use thiserror_no_std::Error;

use crate::frame::Frame;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport is not joined")]
    NotJoined,
    #[error("transport is busy with another frame")]
    Busy,
}

/// Outcome notifications reported by the transport after a send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    /// The network acknowledged the frame.
    Sent,
    /// Delivery failed after all retransmissions.
    Failed,
    /// The modem is retransmitting a frame that was not yet acknowledged.
    Retransmitted,
}

pub trait Transport {
    /// Is the link joined and idle?
    fn is_ready(&mut self) -> bool;

    /// Queue `frame` for a confirmed uplink. Takes ownership of the frame.
    fn send_confirmed(&mut self, frame: Frame) -> Result<(), TransportError>;
}
