use crate::color::{Color, PixelPlan};
use crate::error::{Error, Result};

/// Stitches a multi-stop gradient across the whole strip.
///
/// The strip is split into one contiguous segment per adjacent stop pair.
/// When the pixel count does not divide evenly, the last segment absorbs the
/// remainder so the output length is always exactly `pixel_count`.
pub fn gradient(stops: &[Color], pixel_count: usize) -> Result<Vec<Color>> {
    if stops.len() < 2 {
        return Err(Error::InvalidInput(format!(
            "gradient needs at least 2 stops, got {}",
            stops.len()
        )));
    }

    let segments = stops.len() - 1;
    let segment_size = pixel_count / segments;
    let remainder = pixel_count - segment_size * segments;

    let mut out = Vec::with_capacity(pixel_count);
    for (k, pair) in stops.windows(2).enumerate() {
        let is_last = k == segments - 1;
        let count = segment_size + if is_last { remainder } else { 0 };
        out.extend(span(pair[0], pair[1], count));
    }

    Ok(out)
}

fn span(from: Color, to: Color, count: usize) -> Vec<Color> {
    let plan = PixelPlan::new(from, to, count);
    (0..count).map(|step| plan.frame(step)).collect()
}

/// One full sweep of the hue circle at full saturation and value, spread
/// over `pixel_count` equal hue steps.
pub fn rainbow(pixel_count: usize) -> Vec<Color> {
    (0..pixel_count)
        .map(|i| hue_to_rgb(360.0 * i as f64 / pixel_count as f64))
        .collect()
}

// Standard 6-sector HSV decomposition with S = V = 1, so chroma is 1 and
// there is no match offset to add back.
fn hue_to_rgb(hue: f64) -> Color {
    let h = hue / 60.0;
    let x = 1.0 - ((h % 2.0) - 1.0).abs();

    let (r, g, b) = match h as usize {
        0 => (1.0, x, 0.0),
        1 => (x, 1.0, 0.0),
        2 => (0.0, 1.0, x),
        3 => (0.0, x, 1.0),
        4 => (x, 0.0, 1.0),
        _ => (1.0, 0.0, x),
    };

    Color::from_channels(r * 255.0, g * 255.0, b * 255.0)
}
