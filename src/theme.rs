//! Theme loading: btop-style `theme[key]="value"` and hex → ratatui Color.

use ratatui::style::Color;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use crate::Palette;
use crate::piece::{PALETTE, Rgb, palette_index};

const fn hex(v: u32) -> Color {
    Color::Rgb((v >> 16) as u8, (v >> 8) as u8, v as u8)
}

/// One Dark colours, in game palette order: red, green, blue, yellow, orange, purple, cyan.
const ONEDARK_SAND: [Color; 7] = [
    hex(0xE06C75),
    hex(0x98C379),
    hex(0x61AFEF),
    hex(0xE5C07B),
    hex(0xD19A66),
    hex(0xC678DD),
    hex(0x56B6C2),
];

/// Grain/piece colours and UI colours loaded from a theme file.
#[derive(Debug, Clone)]
pub struct Theme {
    /// One terminal colour per game palette slot.
    pub sand: [Color; 7],
    /// Playfield background.
    pub bg: Color,
    /// Grid / border / walls.
    pub div_line: Color,
    /// Text (stats).
    pub main_fg: Color,
    /// Highlight / titles.
    pub title: Color,
    pub inactive_fg: Color,
}

#[derive(Debug, Error)]
pub enum ThemeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid hex: {0}")]
    InvalidHex(String),
}

impl Default for Theme {
    fn default() -> Self {
        Self::onedark_default()
    }
}

impl Theme {
    pub fn onedark_default() -> Self {
        Self {
            sand: ONEDARK_SAND,
            bg: hex(0x31353F),
            div_line: hex(0x3F444F),
            main_fg: hex(0xABB2BF),
            title: hex(0xE5C07B),
            inactive_fg: hex(0x5C6370),
        }
    }

    /// Load theme from a btop-style file: `theme[key]="value"` or `theme[key]='value'`.
    /// Falls back to One Dark if path is None or the file is missing.
    pub fn load(path: Option<&Path>, palette: Palette) -> Result<Self, ThemeError> {
        let mut theme = match path {
            Some(p) if p.exists() => {
                let s = std::fs::read_to_string(p)?;
                Self::from_map(&parse_theme_file(&s))
            }
            _ => Self::onedark_default(),
        };
        theme.apply_palette(palette);
        Ok(theme)
    }

    /// Override grain colours for high-contrast or colorblind play.
    pub fn apply_palette(&mut self, palette: Palette) {
        match palette {
            Palette::Normal => {}
            Palette::HighContrast => {
                // The raw game colours, fully saturated.
                self.sand = PALETTE.map(|Rgb(r, g, b)| Color::Rgb(r, g, b));
            }
            Palette::Colorblind => {
                // Paul Tol vibrant scheme.
                self.sand = [
                    hex(0xCC3311),
                    hex(0x009988),
                    hex(0x0077BB),
                    hex(0xBBBB00),
                    hex(0xEE7733),
                    hex(0xEE3377),
                    hex(0x33BBEE),
                ];
            }
        }
    }

    fn from_map(map: &HashMap<String, String>) -> Self {
        let get = |keys: &[&str], fallback: Color| {
            keys.iter()
                .find_map(|k| map.get(*k).and_then(|v| parse_hex(v).ok()))
                .unwrap_or(fallback)
        };
        let d = Self::onedark_default();
        Self {
            sand: [
                get(&["cpu_end", "temp_end"], d.sand[0]),
                get(&["mem_box", "cpu_start"], d.sand[1]),
                get(&["cpu_box"], d.sand[2]),
                get(&["cpu_mid"], d.sand[3]),
                get(&["used_mid", "download_mid"], d.sand[4]),
                get(&["net_box"], d.sand[5]),
                get(&["hi_fg", "proc_misc"], d.sand[6]),
            ],
            bg: get(&["meter_bg"], d.bg),
            div_line: get(&["div_line"], d.div_line),
            main_fg: get(&["main_fg"], d.main_fg),
            title: get(&["title"], d.title),
            inactive_fg: get(&["inactive_fg"], d.inactive_fg),
        }
    }

    /// Terminal colour for a game colour; off-palette colours pass through.
    pub fn grain_color(&self, color: Rgb) -> Color {
        match palette_index(color) {
            Some(i) => self.sand[i],
            None => Color::Rgb(color.0, color.1, color.2),
        }
    }
}

/// Parse btop-style theme file into key -> value map.
fn parse_theme_file(s: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in s.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(stripped) = line.strip_prefix("theme[") {
            if let Some(end) = stripped.find(']') {
                let key = stripped[..end].trim();
                let rest = stripped[end + 1..].trim();
                if let Some(eq) = rest.find('=') {
                    let value = rest[eq + 1..]
                        .trim()
                        .trim_matches('"')
                        .trim_matches('\'')
                        .to_string();
                    if !value.is_empty() {
                        map.insert(key.to_string(), value);
                    }
                }
            }
        }
    }
    map
}

/// Parse hex colour "#RRGGBB" or "#RGB" into ratatui Color.
pub fn parse_hex(s: &str) -> Result<Color, ThemeError> {
    let s = s.trim().trim_start_matches('#');
    let digit = |range: std::ops::Range<usize>| {
        s.get(range)
            .and_then(|d| u8::from_str_radix(d, 16).ok())
            .ok_or_else(|| ThemeError::InvalidHex(s.to_string()))
    };
    match s.len() {
        6 => Ok(Color::Rgb(digit(0..2)?, digit(2..4)?, digit(4..6)?)),
        3 => Ok(Color::Rgb(
            digit(0..1)? * 17,
            digit(1..2)? * 17,
            digit(2..3)? * 17,
        )),
        _ => Err(ThemeError::InvalidHex(s.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_6() {
        let c = parse_hex("#98C379").unwrap();
        assert!(matches!(c, Color::Rgb(0x98, 0xC3, 0x79)));
    }

    #[test]
    fn test_parse_hex_3() {
        let c = parse_hex("#FFF").unwrap();
        assert!(matches!(c, Color::Rgb(255, 255, 255)));
    }

    #[test]
    fn test_parse_hex_rejects_garbage() {
        assert!(parse_hex("#12345").is_err());
        assert!(parse_hex("#GG0000").is_err());
    }

    #[test]
    fn test_parse_theme_line() {
        let map = parse_theme_file(r##"theme[meter_bg]="#31353F""##);
        assert_eq!(map.get("meter_bg"), Some(&"#31353F".to_string()));
    }

    #[test]
    fn theme_file_overrides_only_listed_keys() {
        let map = parse_theme_file("theme[cpu_end]=\"#FF0000\"\ntheme[main_fg]='#010203'\n");
        let t = Theme::from_map(&map);
        assert_eq!(t.sand[0], Color::Rgb(255, 0, 0));
        assert_eq!(t.main_fg, Color::Rgb(1, 2, 3));
        assert_eq!(t.sand[1], ONEDARK_SAND[1]);
    }

    #[test]
    fn grain_colour_follows_palette_slot() {
        let mut t = Theme::default();
        assert_eq!(t.grain_color(PALETTE[2]), ONEDARK_SAND[2]);
        t.apply_palette(Palette::HighContrast);
        assert_eq!(t.grain_color(PALETTE[4]), Color::Rgb(255, 165, 0));
        assert_eq!(t.grain_color(Rgb(1, 2, 3)), Color::Rgb(1, 2, 3));
    }
}
