//! Colour helpers for chart primitives and the `#RRGGBB` strings used in
//! the settings and annotation files.

use iced_core::Color;
use palette::{FromColor, Hsva, rgb::Rgba};
use serde::{Deserialize, Deserializer, Serializer};

/// Candle wick colour.
pub const WICK: Color = Color::from_rgb(1.0, 0.0, 0.0);
/// Candle body colour.
pub const BODY: Color = Color::from_rgb(0.0, 0.5, 0.0);
pub const MOVING_AVERAGE: Color = Color::BLACK;
pub const DIVIDER: Color = Color::from_rgb(0.5, 0.5, 0.5);
pub const CROSSHAIR: Color = Color::BLACK;

pub fn hex_to_color(hex: &str) -> Option<Color> {
    let hex = hex.trim();
    if hex.len() == 7 || hex.len() == 9 {
        let hash = hex.get(0..1)?;
        let r = u8::from_str_radix(hex.get(1..3)?, 16);
        let g = u8::from_str_radix(hex.get(3..5)?, 16);
        let b = u8::from_str_radix(hex.get(5..7)?, 16);
        let a = (hex.len() == 9)
            .then(|| hex.get(7..9).and_then(|a| u8::from_str_radix(a, 16).ok()))
            .flatten();

        return match (hash, r, g, b, a) {
            ("#", Ok(r), Ok(g), Ok(b), None) if hex.len() == 7 => Some(Color::from_rgb8(r, g, b)),
            ("#", Ok(r), Ok(g), Ok(b), Some(a)) => {
                Some(Color::from_rgba8(r, g, b, f32::from(a) / 255.0))
            }
            _ => None,
        };
    }

    None
}

/// `#RRGGBB`, with an alpha byte appended only for translucent colours.
pub fn color_to_hex(color: Color) -> String {
    let [r, g, b, a] = color.into_rgba8();
    if a == u8::MAX {
        format!("#{r:02X}{g:02X}{b:02X}")
    } else {
        format!("#{r:02X}{g:02X}{b:02X}{a:02X}")
    }
}

/// Colour used for the selected annotation: brighter and slightly more saturated,
/// or darker when the base colour is already bright.
pub fn highlight(color: Color) -> Color {
    let mut hsva = to_hsva(color);
    if hsva.value > 0.85 {
        hsva.value = (hsva.value - 0.35).max(0.0);
    } else {
        hsva.value = (hsva.value + 0.35).min(1.0);
    }
    hsva.saturation = (hsva.saturation + 0.1).min(1.0);
    from_hsva(hsva)
}

pub fn from_hsva(color: Hsva) -> Color {
    to_color(palette::Srgba::from_color(color))
}

fn to_color(rgba: Rgba) -> Color {
    Color {
        r: rgba.color.red,
        g: rgba.color.green,
        b: rgba.color.blue,
        a: rgba.alpha,
    }
}

pub fn to_hsva(color: Color) -> Hsva {
    Hsva::from_color(Rgba::new(color.r, color.g, color.b, color.a))
}

pub mod hex {
    use super::*;

    pub fn serialize<S: Serializer>(color: &Color, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&color_to_hex(*color))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Color, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex_to_color(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid colour: {s}")))
    }
}
