//! Hex color codec: `#rrggbbaa` strings to and from 4-byte RGBA pixels.
//!
//! The codec is a pure bijection over the 8-digit form. A 6-digit
//! `#rrggbb` is accepted on parse and implies full opacity. Parsing is
//! case-insensitive; encoding always emits lowercase 8-digit form.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default fill for a fresh canvas: fully-opaque white.
pub const WHITE: Pixel = Pixel([0xff, 0xff, 0xff, 0xff]);

/// A single RGBA pixel — the chunk unit of storage and conflict detection.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pixel(pub [u8; 4]);

/// Errors from parsing a hex color string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ColorParseError {
    /// Missing the leading `#`.
    #[error("color must start with '#': {0:?}")]
    MissingHash(String),

    /// Not 6 or 8 hex digits after the `#`.
    #[error("color must be #rrggbb or #rrggbbaa, got {0} digits")]
    BadLength(usize),

    /// A non-hex character in the digit portion.
    #[error("invalid hex digit in color: {0:?}")]
    BadDigit(String),
}

impl Pixel {
    /// Parse `#rrggbbaa` (or `#rrggbb`, implying alpha 255).
    pub fn from_hex(s: &str) -> Result<Self, ColorParseError> {
        let digits = s
            .strip_prefix('#')
            .ok_or_else(|| ColorParseError::MissingHash(s.to_string()))?;

        if !digits.is_ascii() {
            return Err(ColorParseError::BadDigit(s.to_string()));
        }

        let alpha = match digits.len() {
            6 => None,
            8 => Some(()),
            n => return Err(ColorParseError::BadLength(n)),
        };

        let byte = |i: usize| -> Result<u8, ColorParseError> {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| ColorParseError::BadDigit(s.to_string()))
        };

        let r = byte(0)?;
        let g = byte(2)?;
        let b = byte(4)?;
        let a = match alpha {
            Some(()) => byte(6)?,
            None => 0xff,
        };

        Ok(Pixel([r, g, b, a]))
    }

    /// Encode as a lowercase `#rrggbbaa` string.
    pub fn to_hex(&self) -> String {
        let [r, g, b, a] = self.0;
        format!("#{r:02x}{g:02x}{b:02x}{a:02x}")
    }

    /// The raw RGBA bytes.
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// Reconstruct from raw RGBA bytes.
    pub fn from_bytes(b: [u8; 4]) -> Self {
        Self(b)
    }
}

impl fmt::Display for Pixel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
