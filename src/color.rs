use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Validates a hex colour: `#rgb` or `#rrggbb`.
#[must_use]
pub fn is_valid_hex_color(s: &str) -> bool {
    match s.strip_prefix('#') {
        Some(hex) => matches!(hex.len(), 3 | 6) && hex.bytes().all(|b| b.is_ascii_hexdigit()),
        None => false,
    }
}

/// Validated hex colour from tenant branding.
///
/// Holding a `HexColor` proves the format is correct. Stored normalized to
/// lowercase `#rrggbb`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HexColor(String);

impl HexColor {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn rgb(&self) -> (u8, u8, u8) {
        let channel = |i: usize| u8::from_str_radix(&self.0[i..i + 2], 16).unwrap_or(0);
        (channel(1), channel(3), channel(5))
    }

    /// Convert to the HSL triplet used by the stylesheet's custom properties.
    #[must_use]
    pub fn to_hsl(&self) -> Hsl {
        let (r, g, b) = self.rgb();
        let (r, g, b) = (
            f64::from(r) / 255.0,
            f64::from(g) / 255.0,
            f64::from(b) / 255.0,
        );
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let l = (max + min) / 2.0;
        let delta = max - min;

        if delta == 0.0 {
            return Hsl::new(0.0, 0.0, l * 100.0);
        }

        let s = delta / (1.0 - (2.0 * l - 1.0).abs());
        let h = if max == r {
            60.0 * ((g - b) / delta).rem_euclid(6.0)
        } else if max == g {
            60.0 * ((b - r) / delta + 2.0)
        } else {
            60.0 * ((r - g) / delta + 4.0)
        };
        Hsl::new(h, s * 100.0, l * 100.0)
    }
}

impl fmt::Display for HexColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for HexColor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s.to_owned())
    }
}

impl TryFrom<String> for HexColor {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        let trimmed = s.trim();
        if !is_valid_hex_color(trimmed) {
            return Err(Error::InvalidColor(s));
        }
        let hex = trimmed[1..].to_ascii_lowercase();
        let normalized = if hex.len() == 3 {
            hex.chars().flat_map(|c| [c, c]).collect::<String>()
        } else {
            hex
        };
        Ok(Self(format!("#{normalized}")))
    }
}

impl From<HexColor> for String {
    fn from(c: HexColor) -> Self {
        c.0
    }
}

/// Hue (degrees), saturation and lightness (percent), rounded for CSS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hsl {
    pub h: u16,
    pub s: u8,
    pub l: u8,
}

impl Hsl {
    fn new(h: f64, s: f64, l: f64) -> Self {
        Self {
            h: (h.round() as u16) % 360,
            s: s.round().clamp(0.0, 100.0) as u8,
            l: l.round().clamp(0.0, 100.0) as u8,
        }
    }
}

/// Space-separated form, e.g. `217 91% 60%`, as consumed by `hsl(var(--primary))`.
impl fmt::Display for Hsl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}% {}%", self.h, self.s, self.l)
    }
}
