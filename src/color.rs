//! Mapping from token log-probabilities to highlight colors.

use std::fmt;
use std::str::FromStr;

/// An RGB color triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Build a color from arbitrary integers, clamping each channel into `0..=255`.
    pub fn clamped(r: i64, g: i64, b: i64) -> Self {
        let c = |v: i64| v.clamp(0, 255) as u8;
        Self::new(c(r), c(g), c(b))
    }

    /// `#rrggbb` form, as HTML exporters write it.
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    fn channels(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgb({},{},{})", self.r, self.g, self.b)
    }
}

impl From<Rgb> for crossterm::style::Color {
    fn from(c: Rgb) -> Self {
        crossterm::style::Color::Rgb {
            r: c.r,
            g: c.g,
            b: c.b,
        }
    }
}

/// Parses `"r,g,b"`, optionally wrapped in parentheses. Channels outside
/// `0..=255` are clamped.
impl FromStr for Rgb {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let inner = s.trim().trim_start_matches('(').trim_end_matches(')');
        let parts = inner
            .split(',')
            .map(|p| p.trim().parse::<i64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| format!("invalid color {s:?}: {e}"))?;
        match parts.as_slice() {
            [r, g, b] => Ok(Rgb::clamped(*r, *g, *b)),
            _ => Err(format!("invalid color {s:?}: expected three channels")),
        }
    }
}

/// Resolve the highlight color for a token.
///
/// The token's probability scales `accent` on top of `bg`. A channel never
/// drops below the background and never exceeds 255. With coloring disabled
/// the background is returned unchanged.
pub fn token_color(logprob: f64, bg: Rgb, accent: Rgb, include_coloring: bool) -> Rgb {
    if !include_coloring {
        return bg;
    }
    let prob = logprob.exp();
    let mut out = [0u8; 3];
    for (slot, (b, a)) in out
        .iter_mut()
        .zip(bg.channels().into_iter().zip(accent.channels()))
    {
        let b = f64::from(b);
        let raw = b + f64::from(a) * prob;
        *slot = raw.max(b).min(255.0) as u8;
    }
    Rgb::new(out[0], out[1], out[2])
}
