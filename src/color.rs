use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// One pixel's color. Channels are 8-bit; anything a caller sends in gets
/// rounded and clamped before it ends up here.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Color {
        Color { r, g, b }
    }

    /// Builds a color from floating channel values, rounding to the nearest
    /// integer and clamping into [0, 255].
    pub fn from_channels(r: f64, g: f64, b: f64) -> Color {
        Color {
            r: clamp_channel(r),
            g: clamp_channel(g),
            b: clamp_channel(b),
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}, {}]", self.r, self.g, self.b)
    }
}

fn clamp_channel(value: f64) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

// On the wire a color is a plain `[r, g, b]` array.
impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        [self.r, self.g, self.b].serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Color, D::Error> {
        let [r, g, b] = <[f64; 3]>::deserialize(deserializer)?;
        Ok(Color::from_channels(r, g, b))
    }
}

/// Evenly spaced values from `start` to `end`, both inclusive.
///
/// With no explicit `count`, roughly one step per unit of change is used so
/// that short distances produce short sequences. The closed form keeps both
/// endpoints exact instead of accumulating error by repeated addition.
pub fn linspace(start: f64, end: f64, count: Option<usize>) -> Vec<f64> {
    let count = count.unwrap_or_else(|| (end - start).round().max(1.0) as usize);

    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let last = (count - 1) as f64;
            (0..count)
                .map(|i| (i as f64 * end + (last - i as f64) * start) / last)
                .collect()
        }
    }
}

/// Per-channel interpolation from one color to another, one entry per frame.
pub struct PixelPlan {
    r: Vec<f64>,
    g: Vec<f64>,
    b: Vec<f64>,
}

impl PixelPlan {
    pub fn new(from: Color, to: Color, steps: usize) -> PixelPlan {
        PixelPlan {
            r: linspace(from.r as f64, to.r as f64, Some(steps)),
            g: linspace(from.g as f64, to.g as f64, Some(steps)),
            b: linspace(from.b as f64, to.b as f64, Some(steps)),
        }
    }

    pub fn frame(&self, step: usize) -> Color {
        Color::from_channels(self.r[step], self.g[step], self.b[step])
    }
}
