//! Uplink frame encoding
//!
//! An uplink is one fixed 11-byte frame built fresh from the snapshot for
//! every transmission attempt. The buffer is pre-filled with [`SENTINEL`]
//! and a field whose value is unknown is simply not written, so the backend
//! can tell "no data" from a real zero.
//!
//! Binary format (little-endian):
//! - header: 1 byte (u8, [`Header`])
//! - battery: 1 byte (u8, `ceil(volts * 10)`)
//! - temperature: 2 bytes (i16, `celsius * 10`)
//! - humidity: 1 byte (u8, `percent * 2`)
//! - pressure: 2 bytes (u16, `hPa / 2`)
//! - tvoc: 2 bytes (u16, ppb)
//! - co2: 2 bytes (u16, ppm)
//!
//! Float to integer conversions truncate toward zero and saturate one below
//! the sentinel, so a known reading never reads back as "no data". The one
//! exception is a temperature of exactly -0.1 °C, whose two's complement is
//! `0xffff`.

use core::fmt::Write;

use heapless::String;
use thiserror_no_std::Error;

use crate::snapshot::Snapshot;

pub const FRAME_LEN: usize = 11;

/// Fill byte marking a field as "no data"
pub const SENTINEL: u8 = 0xff;

const MAX_U8: u8 = SENTINEL - 1;
const MAX_U16: u16 = 0xfffe;

const HEADER: usize = 0;
const BATTERY: usize = 1;
const TEMPERATURE: usize = 2;
const HUMIDITY: usize = 4;
const PRESSURE: usize = 5;
const TVOC: usize = 7;
const CO2: usize = 9;

/// Why a frame was sent
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Header {
    Boot = 0,
    Update = 1,
    ButtonClick = 2,
    ButtonHold = 3,
}

impl Header {
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Boot),
            1 => Some(Self::Update),
            2 => Some(Self::ButtonClick),
            3 => Some(Self::ButtonHold),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    bytes: [u8; FRAME_LEN],
}

impl Frame {
    /// Serialize `snapshot` behind `header`. Never fails.
    pub fn encode(header: Header, snapshot: &Snapshot) -> Self {
        let mut bytes = [SENTINEL; FRAME_LEN];
        bytes[HEADER] = header.as_byte();

        if let Some(volts) = snapshot.battery_voltage {
            bytes[BATTERY] = (libm::ceilf(volts * 10.0) as u8).min(MAX_U8);
        }
        if let Some(celsius) = snapshot.temperature {
            put(&mut bytes, TEMPERATURE, ((celsius * 10.0) as i16).to_le_bytes());
        }
        if let Some(percent) = snapshot.humidity {
            bytes[HUMIDITY] = ((percent * 2.0) as u8).min(MAX_U8);
        }
        if let Some(hpa) = snapshot.pressure {
            put(&mut bytes, PRESSURE, ((hpa / 2.0) as u16).min(MAX_U16).to_le_bytes());
        }
        if let Some(ppb) = snapshot.tvoc {
            put(&mut bytes, TVOC, (ppb as u16).min(MAX_U16).to_le_bytes());
        }
        if let Some(ppm) = snapshot.co2 {
            put(&mut bytes, CO2, (ppm as u16).min(MAX_U16).to_le_bytes());
        }

        Self { bytes }
    }

    pub const fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.bytes
    }

    pub const fn header_byte(&self) -> u8 {
        self.bytes[HEADER]
    }

    /// Lowercase hex of the whole frame, as pasted into backend decoders
    pub fn hex(&self) -> String<{ FRAME_LEN * 2 }> {
        let mut out = String::new();
        for byte in self.bytes {
            // Capacity is exactly two digits per byte.
            let _ = write!(out, "{:02x}", byte);
        }
        out
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

fn put<const W: usize>(bytes: &mut [u8; FRAME_LEN], offset: usize, value: [u8; W]) {
    bytes[offset..offset + W].copy_from_slice(&value);
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame must be {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
}

/// Backend view of an uplink, used for diagnostics.
///
/// A temperature of exactly -0.1 °C encodes to `0xffff` and reads back as
/// unknown; the wire format cannot tell the two apart.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodedFrame {
    pub header: u8,
    pub battery_voltage: Option<f32>,
    pub temperature: Option<f32>,
    pub humidity: Option<f32>,
    pub pressure: Option<f32>,
    pub tvoc: Option<f32>,
    pub co2: Option<f32>,
}

impl DecodedFrame {
    pub fn parse(bytes: &[u8]) -> Result<Self, FrameError> {
        let bytes: &[u8; FRAME_LEN] = bytes.try_into().map_err(|_| FrameError::Length {
            expected: FRAME_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self::from_array(bytes))
    }

    /// The header as a known [`Header`], `None` for an unknown byte
    pub const fn kind(&self) -> Option<Header> {
        Header::from_byte(self.header)
    }

    fn from_array(bytes: &[u8; FRAME_LEN]) -> Self {
        let u8_at = |offset: usize| Some(bytes[offset]).filter(|b| *b != SENTINEL);
        let u16_at = |offset: usize| {
            Some(u16::from_le_bytes([bytes[offset], bytes[offset + 1]])).filter(|v| *v != 0xffff)
        };

        Self {
            header: bytes[HEADER],
            battery_voltage: u8_at(BATTERY).map(|v| v as f32 / 10.0),
            temperature: u16_at(TEMPERATURE).map(|v| v as i16 as f32 / 10.0),
            humidity: u8_at(HUMIDITY).map(|v| v as f32 / 2.0),
            pressure: u16_at(PRESSURE).map(|v| v as f32 * 2.0),
            tvoc: u16_at(TVOC).map(|v| v as f32),
            co2: u16_at(CO2).map(|v| v as f32),
        }
    }
}

impl From<&Frame> for DecodedFrame {
    fn from(frame: &Frame) -> Self {
        Self::from_array(frame.as_bytes())
    }
}
