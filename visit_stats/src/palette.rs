//! Hue-stepping palette for categorical chart series: N evenly spaced hues
//! at fixed saturation/lightness, opaque borders and half-alpha fills.

use plotters::style::{Color, RGBAColor, RGBColor};

const PALETTE_SATURATION: f64 = 0.75;
const PALETTE_LIGHTNESS: f64 = 0.5;
const FILL_ALPHA: f64 = 0.5;

#[derive(Clone, Debug)]
pub struct ColorSets {
    /// Fill colors, alpha 0.5.
    pub background: Vec<RGBAColor>,
    /// Opaque outline colors, same hues.
    pub border: Vec<RGBColor>,
}

/// Generate `n` evenly spaced categorical colors. `n = 0` yields two empty
/// sets; hues are pairwise distinct for any `n <= 360`.
pub fn color_sets(n: usize) -> ColorSets {
    let mut background = Vec::with_capacity(n);
    let mut border = Vec::with_capacity(n);
    for i in 0..n {
        let color = hsl_to_rgb(hue_degrees(i, n), PALETTE_SATURATION, PALETTE_LIGHTNESS);
        background.push(color.mix(FILL_ALPHA));
        border.push(color);
    }
    ColorSets { background, border }
}

/// Hue for slot `i` of `n`, in degrees on the color wheel.
fn hue_degrees(i: usize, n: usize) -> f64 {
    (360.0 * i as f64 / n as f64) % 360.0
}

fn hsl_to_rgb(hue: f64, saturation: f64, lightness: f64) -> RGBColor {
    let c = (1.0 - (2.0 * lightness - 1.0).abs()) * saturation;
    let x = c * (1.0 - ((hue / 60.0) % 2.0 - 1.0).abs());
    let m = lightness - c / 2.0;

    let (r, g, b) = match hue as u32 {
        0..=59 => (c, x, 0.0),
        60..=119 => (x, c, 0.0),
        120..=179 => (0.0, c, x),
        180..=239 => (0.0, x, c),
        240..=299 => (x, 0.0, c),
        300..=359 => (c, 0.0, x),
        _ => (0.0, 0.0, 0.0),
    };

    RGBColor(
        ((r + m) * 255.0).round() as u8,
        ((g + m) * 255.0).round() as u8,
        ((b + m) * 255.0).round() as u8,
    )
}
