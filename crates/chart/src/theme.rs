use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::color::Color;

/// Rendering theme. Resolves the fixed chrome colors (background, text,
/// axes, gridlines) and the per-theme line palettes.
///
/// All tables are constants so the same GraphDef always rasterises to the
/// same bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn background(self) -> Color {
        match self {
            Theme::Light => Color::rgb(0xff, 0xff, 0xff),
            Theme::Dark => Color::rgb(0x16, 0x16, 0x1d),
        }
    }

    pub fn text(self) -> Color {
        match self {
            Theme::Light => Color::rgb(0x00, 0x00, 0x00),
            Theme::Dark => Color::rgb(0xd0, 0xd0, 0xd6),
        }
    }

    pub fn axis(self) -> Color {
        match self {
            Theme::Light => Color::rgb(0x00, 0x00, 0x00),
            Theme::Dark => Color::rgb(0xb0, 0xb0, 0xb8),
        }
    }

    pub fn grid(self) -> Color {
        match self {
            Theme::Light => Color::rgb(0xd8, 0xd8, 0xd8),
            Theme::Dark => Color::rgb(0x3a, 0x3a, 0x44),
        }
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(format!("unknown theme {other:?} (expected light or dark)")),
        }
    }
}

/// Named line palette. Each palette is an ordered constant table of at
/// least eight entries; auto-coloring walks it modulo its length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Palette {
    #[default]
    Default,
    Atlas,
}

const LIGHT_DEFAULT: [Color; 8] = [
    Color::rgb(0x1f, 0x77, 0xb4),
    Color::rgb(0xff, 0x7f, 0x0e),
    Color::rgb(0x2c, 0xa0, 0x2c),
    Color::rgb(0xd6, 0x2f, 0x28),
    Color::rgb(0x94, 0x67, 0xbd),
    Color::rgb(0x8c, 0x56, 0x4b),
    Color::rgb(0xe3, 0x77, 0xc2),
    Color::rgb(0x17, 0xbe, 0xcf),
];

// Brighter variants so lines read against the near-black background.
const DARK_DEFAULT: [Color; 8] = [
    Color::rgb(0x4f, 0xa3, 0xe0),
    Color::rgb(0xff, 0x9f, 0x40),
    Color::rgb(0x58, 0xc4, 0x58),
    Color::rgb(0xf0, 0x5b, 0x54),
    Color::rgb(0xb4, 0x8b, 0xe0),
    Color::rgb(0xb0, 0x7a, 0x6e),
    Color::rgb(0xf0, 0x96, 0xd5),
    Color::rgb(0x3f, 0xd6, 0xe6),
];

const ATLAS: [Color; 9] = [
    Color::rgb(0xd6, 0x2f, 0x28),
    Color::rgb(0x2e, 0x7d, 0x32),
    Color::rgb(0x1f, 0x77, 0xb4),
    Color::rgb(0xff, 0x7f, 0x0e),
    Color::rgb(0x94, 0x67, 0xbd),
    Color::rgb(0x17, 0xbe, 0xcf),
    Color::rgb(0xe3, 0x77, 0xc2),
    Color::rgb(0x80, 0x80, 0x00),
    Color::rgb(0x7f, 0x7f, 0x7f),
];

impl Palette {
    pub fn colors(self, theme: Theme) -> &'static [Color] {
        match (self, theme) {
            (Palette::Default, Theme::Light) => &LIGHT_DEFAULT,
            (Palette::Default, Theme::Dark) => &DARK_DEFAULT,
            (Palette::Atlas, _) => &ATLAS,
        }
    }
}

impl FromStr for Palette {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Palette::Default),
            "atlas" => Ok(Palette::Atlas),
            other => Err(format!("unknown palette {other:?}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palettes_have_at_least_eight_entries() {
        for palette in [Palette::Default, Palette::Atlas] {
            for theme in [Theme::Light, Theme::Dark] {
                assert!(palette.colors(theme).len() >= 8);
            }
        }
    }

    #[test]
    fn palette_entries_are_distinct() {
        let colors = Palette::Default.colors(Theme::Light);
        for (i, a) in colors.iter().enumerate() {
            for b in &colors[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn serde_names_are_lowercase() {
        assert_eq!(serde_json::to_string(&Theme::Dark).unwrap(), "\"dark\"");
        assert_eq!(serde_json::to_string(&Palette::Atlas).unwrap(), "\"atlas\"");
    }

    #[test]
    fn from_str_rejects_unknown() {
        assert!("light".parse::<Theme>().is_ok());
        assert!("solarized".parse::<Theme>().is_err());
        assert!("atlas".parse::<Palette>().is_ok());
        assert!("viridis".parse::<Palette>().is_err());
    }
}
