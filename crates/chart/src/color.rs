use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// An RGBA color with 8 bits per channel.
///
/// Serialized as a `"#rrggbbaa"` hex string so GraphDef JSON stays readable
/// and round-trips exactly. Parsing also accepts `#rgb`, `#rrggbb`, and a
/// small set of CSS-style names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

#[derive(Debug, Error, PartialEq)]
pub enum ColorParseError {
    #[error("unknown color {0:?}")]
    Unknown(String),
    #[error("malformed hex color {0:?}")]
    BadHex(String),
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 0xff }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// The same color with its alpha channel scaled by `percent` (0..=100).
    pub fn scale_alpha(self, percent: u8) -> Self {
        let pct = u32::from(percent.min(100));
        let a = (u32::from(self.a) * pct / 100) as u8;
        Self { a, ..self }
    }

    pub fn hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex())
    }
}

impl FromStr for Color {
    type Err = ColorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(hex) = s.strip_prefix('#') {
            return parse_hex(hex).ok_or_else(|| ColorParseError::BadHex(s.to_string()));
        }
        match s.to_ascii_lowercase().as_str() {
            "black" => Ok(Color::rgb(0x00, 0x00, 0x00)),
            "white" => Ok(Color::rgb(0xff, 0xff, 0xff)),
            "red" => Ok(Color::rgb(0xd6, 0x2f, 0x28)),
            "green" => Ok(Color::rgb(0x2e, 0x7d, 0x32)),
            "blue" => Ok(Color::rgb(0x1f, 0x77, 0xb4)),
            "orange" => Ok(Color::rgb(0xff, 0x7f, 0x0e)),
            "yellow" => Ok(Color::rgb(0xe7, 0xb4, 0x16)),
            "purple" => Ok(Color::rgb(0x94, 0x67, 0xbd)),
            "cyan" => Ok(Color::rgb(0x17, 0xbe, 0xcf)),
            "magenta" => Ok(Color::rgb(0xe3, 0x77, 0xc2)),
            "gray" | "grey" => Ok(Color::rgb(0x7f, 0x7f, 0x7f)),
            _ => Err(ColorParseError::Unknown(s.to_string())),
        }
    }
}

fn parse_hex(hex: &str) -> Option<Color> {
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok();
    match hex.len() {
        // #rgb shorthand: each nibble doubled
        3 => {
            let nib = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|n| n * 17);
            Some(Color::rgb(nib(0)?, nib(1)?, nib(2)?))
        }
        6 => Some(Color::rgb(channel(0)?, channel(1)?, channel(2)?)),
        8 => Some(Color::rgba(channel(0)?, channel(1)?, channel(2)?, channel(3)?)),
        _ => None,
    }
}

// --- Serde (string form, like the rest of the GraphDef envelope) ---

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.hex())
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
