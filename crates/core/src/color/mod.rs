//! Integer color math shared by the gradient animator and the compositor.
//!
//! Colors are packed the way the light bar driver expects them: red in the
//! lowest byte, then green, then blue. All math is done on `i32` with
//! truncating division so the results match what the device has always
//! been fed.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Result, VisualiserError};

/// Minimum value every channel is raised to before blending.
pub const FLOOR: i32 = 8;

/// Color the light is left at after shutdown.
pub const REST_COLOR: Color = Color::from_packed(0x00_22_33);

/// The idle animation hues, in traversal order.
pub const RAINBOW: [Color; 7] = [
    Color::from_packed(0xd3_00_94),
    Color::from_packed(0x82_00_4b),
    Color::from_packed(0xff_00_00),
    Color::from_packed(0x00_ff_00),
    Color::from_packed(0x00_ff_ff),
    Color::from_packed(0x00_7f_ff),
    Color::from_packed(0x00_00_ff),
];

const CHANNEL_MASK: u32 = 0xff;
const COLOR_MASK: u32 = 0x00ff_ffff;

/// Three 8-bit channel intensities packed into a single word.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Color(u32);

impl Color {
    pub const BLACK: Color = Color(0);

    /// Wraps an already packed value. Bits above the blue channel are dropped.
    pub const fn from_packed(packed: u32) -> Self {
        Self(packed & COLOR_MASK)
    }

    /// Creates a color from its three channels.
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self(r as u32 | (g as u32) << 8 | (b as u32) << 16)
    }

    /// Returns the packed value, red in the low byte.
    pub const fn packed(self) -> u32 {
        self.0
    }

    /// Returns the red channel.
    pub const fn r(self) -> u8 {
        (self.0 & CHANNEL_MASK) as u8
    }

    /// Returns the green channel.
    pub const fn g(self) -> u8 {
        ((self.0 >> 8) & CHANNEL_MASK) as u8
    }

    /// Returns the blue channel.
    pub const fn b(self) -> u8 {
        ((self.0 >> 16) & CHANNEL_MASK) as u8
    }

    /// Channels as `i32` in red, green, blue order, ready for [`lerp`].
    fn channels(self) -> [i32; 3] {
        [i32::from(self.r()), i32::from(self.g()), i32::from(self.b())]
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgb({}, {}, {})", self.r(), self.g(), self.b())
    }
}

/// Linear interpolation between `v0` and `v1` with `t` in `0..=255`.
///
/// The numerator is divided once, so `lerp(v, v, t) == v` for every `t`.
/// A `t` outside the range extrapolates instead of failing.
pub const fn lerp(v0: i32, v1: i32, t: i32) -> i32 {
    (v0 * (255 - t) + v1 * t) / 255
}

/// Packs three channel values. Each value keeps only its low 8 bits.
pub const fn pack(r: i32, g: i32, b: i32) -> Color {
    let r = r as u32 & CHANNEL_MASK;
    let g = g as u32 & CHANNEL_MASK;
    let b = b as u32 & CHANNEL_MASK;
    Color(r | g << 8 | b << 16)
}

/// Blends `c1` towards `c2` by `t / 255` after raising every channel of both
/// colors to at least [`FLOOR`].
pub fn blend(c1: Color, c2: Color, t: i32) -> Color {
    blend_with_floor(c1, c2, t, FLOOR)
}

/// [`blend`] with an explicit floor.
pub fn blend_with_floor(c1: Color, c2: Color, t: i32, floor: i32) -> Color {
    let [r1, g1, b1] = c1.channels().map(|value| value.max(floor));
    let [r2, g2, b2] = c2.channels().map(|value| value.max(floor));

    pack(lerp(r1, r2, t), lerp(g1, g2, t), lerp(b1, b2, t))
}

/// Non-empty, cyclic list of hues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Palette {
    colors: Vec<Color>,
}

impl Palette {
    /// Creates a palette cycling through `colors`.
    ///
    /// Fails with [`VisualiserError::InvalidInput`] when `colors` is empty.
    pub fn new(colors: Vec<Color>) -> Result<Self> {
        if colors.is_empty() {
            return Err(VisualiserError::InvalidInput(
                "a palette needs at least one color",
            ));
        }
        Ok(Self { colors })
    }

    /// Returns the built-in seven color rainbow.
    pub fn rainbow() -> Self {
        Self {
            colors: RAINBOW.to_vec(),
        }
    }

    /// Returns the number of colors in the palette.
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    /// Always false, kept for symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Entry at `index`, wrapping around the end of the palette.
    pub fn get(&self, index: usize) -> Color {
        self.colors[index % self.colors.len()]
    }

    /// Returns the colors in cycle order.
    pub fn colors(&self) -> &[Color] {
        &self.colors
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::rainbow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lerp_of_equal_values_is_identity() {
        for v in [0, 1, 8, 127, 200, 255] {
            for t in 0..=255 {
                assert_eq!(lerp(v, v, t), v, "v={v} t={t}");
            }
        }
    }

    #[test]
    fn lerp_hits_both_endpoints() {
        for (v0, v1) in [(0, 255), (255, 0), (13, 77), (200, 8)] {
            assert_eq!(lerp(v0, v1, 0), v0);
            assert_eq!(lerp(v0, v1, 255), v1);
        }
    }

    #[test]
    fn lerp_extrapolates_outside_range() {
        assert_eq!(lerp(0, 255, 510), 510);
        assert_eq!(lerp(100, 100, -20), 100);
    }

    #[test]
    fn pack_places_red_in_low_byte() {
        let color = pack(0x12, 0x34, 0x56);
        assert_eq!(color.packed(), 0x56_34_12);
        assert_eq!((color.r(), color.g(), color.b()), (0x12, 0x34, 0x56));
        assert_eq!(color, Color::new(0x12, 0x34, 0x56));
    }

    #[test]
    fn pack_masks_out_of_range_channels() {
        let color = pack(256 + 1, -1, 0x1ff);
        assert_eq!((color.r(), color.g(), color.b()), (1, 255, 255));
    }

    #[test]
    fn blend_of_black_never_drops_below_floor() {
        for t in 0..=255 {
            let color = blend(Color::BLACK, Color::BLACK, t);
            assert!(color.r() >= 8 && color.g() >= 8 && color.b() >= 8);
        }
    }

    #[test]
    fn blend_at_zero_is_floor_clamped_first_operand() {
        let c1 = Color::new(3, 120, 0);
        let c2 = Color::new(250, 250, 250);
        assert_eq!(blend(c1, c2, 0), Color::new(8, 120, 8));
    }

    #[test]
    fn blend_at_full_weight_is_second_operand() {
        let c1 = Color::new(10, 20, 30);
        let c2 = Color::new(200, 100, 50);
        assert_eq!(blend(c1, c2, 255), c2);
    }

    #[test]
    fn blend_uses_second_operand_blue_channel() {
        // Blue comes from bits 16..24 of both operands. A wider shift on one
        // side would collapse this to the floor.
        let blue = Color::new(0, 0, 255);
        let result = blend(Color::BLACK, blue, 255);
        assert_eq!(result.b(), 255);

        let halfway = blend(Color::BLACK, blue, 128);
        assert_eq!(halfway.b(), lerp(8, 255, 128) as u8);
    }

    #[test]
    fn blend_respects_custom_floor() {
        let color = blend_with_floor(Color::BLACK, Color::BLACK, 100, 0);
        assert_eq!(color, Color::BLACK);
    }

    #[test]
    fn rest_color_channels() {
        assert_eq!(
            (REST_COLOR.r(), REST_COLOR.g(), REST_COLOR.b()),
            (0x33, 0x22, 0x00)
        );
    }

    #[test]
    fn palette_rejects_empty_list() {
        assert!(matches!(
            Palette::new(Vec::new()),
            Err(VisualiserError::InvalidInput(_))
        ));
    }

    #[test]
    fn palette_wraps_indices() {
        let palette = Palette::rainbow();
        assert_eq!(palette.len(), 7);
        assert_eq!(palette.get(7), palette.get(0));
        assert_eq!(palette.get(9), RAINBOW[2]);
    }
}
