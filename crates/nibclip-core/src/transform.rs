//! Per-byte nibble transforms
//!
//! Every output byte depends only on the matching input byte, so the
//! transform runs in place over the read buffer.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What to keep of each byte
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NibbleMode {
    /// Bytes pass through unchanged
    #[default]
    None,
    /// Keep bits 0-3
    KeepLow,
    /// Move bits 4-7 down into bits 0-3
    ShiftHighToLow,
}

impl NibbleMode {
    /// Whether this mode changes bytes at all
    pub fn is_active(self) -> bool {
        self != NibbleMode::None
    }
}

impl fmt::Display for NibbleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NibbleMode::None => "none",
            NibbleMode::KeepLow => "low",
            NibbleMode::ShiftHighToLow => "high",
        };
        f.write_str(name)
    }
}

/// A 4-bit value written into the upper half of every transformed byte
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct FillNibble(u8);

impl FillNibble {
    /// Largest accepted fill value
    pub const MAX: u8 = 0x0F;

    /// Validate and wrap a fill value
    pub fn new(value: u8) -> Result<Self, ValidationError> {
        if value > Self::MAX {
            return Err(ValidationError::InvalidFillValue(value));
        }
        Ok(Self(value))
    }

    /// The raw 4-bit value
    pub fn value(self) -> u8 {
        self.0
    }

    /// The fill shifted into bits 4-7
    #[inline]
    pub fn high_bits(self) -> u8 {
        self.0 << 4
    }
}

impl TryFrom<u8> for FillNibble {
    type Error = ValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<FillNibble> for u8 {
    fn from(fill: FillNibble) -> Self {
        fill.0
    }
}

/// Transform a single byte
#[inline]
pub fn transform_byte(byte: u8, mode: NibbleMode, fill: FillNibble) -> u8 {
    match mode {
        NibbleMode::None => byte,
        NibbleMode::KeepLow => (byte & 0x0F) | fill.high_bits(),
        NibbleMode::ShiftHighToLow => ((byte >> 4) & 0x0F) | fill.high_bits(),
    }
}

/// Transform a buffer in place
pub fn apply(buffer: &mut [u8], mode: NibbleMode, fill: FillNibble) {
    if !mode.is_active() {
        return;
    }
    for byte in buffer.iter_mut() {
        *byte = transform_byte(*byte, mode, fill);
    }
}
