//! Value types shared by the codec, the connection and the draw session.

use std::fmt;
use std::str::FromStr;

use crate::error::{PixelflutError, Result};

/// Alpha value meaning fully opaque.
pub const OPAQUE: u8 = 255;

/// An RGBA color. Alpha defaults to [`OPAQUE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    /// Create an opaque color.
    #[inline]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: OPAQUE }
    }

    /// Create a color with explicit alpha.
    #[inline]
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    #[inline]
    pub fn is_opaque(&self) -> bool {
        self.a == OPAQUE
    }

    /// Same color with alpha forced to [`OPAQUE`].
    #[inline]
    pub fn opaque(self) -> Self {
        Self { a: OPAQUE, ..self }
    }

    /// Parse `RRGGBB` or `RRGGBBAA` hex digits (no prefix).
    ///
    /// Returns `None` on any other length or a non-hex digit.
    pub fn from_hex_digits(hex: &str) -> Option<Self> {
        let bytes = hex.as_bytes();
        if bytes.len() != 6 && bytes.len() != 8 {
            return None;
        }

        let channel = |i: usize| -> Option<u8> {
            let pair = std::str::from_utf8(&bytes[i..i + 2]).ok()?;
            // from_str_radix accepts a leading '+', which is not a hex digit
            if !pair.bytes().all(|b| b.is_ascii_hexdigit()) {
                return None;
            }
            u8::from_str_radix(pair, 16).ok()
        };

        let r = channel(0)?;
        let g = channel(2)?;
        let b = channel(4)?;
        let a = if bytes.len() == 8 { channel(6)? } else { OPAQUE };

        Some(Self { r, g, b, a })
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::BLACK
    }
}

impl FromStr for Color {
    type Err = PixelflutError;

    /// Parse user-supplied color text such as `ff0000`, `#ff000080`.
    fn from_str(s: &str) -> Result<Self> {
        let digits = s.trim().trim_start_matches('#');
        Color::from_hex_digits(digits).ok_or_else(|| {
            PixelflutError::InvalidArgument(format!(
                "invalid color {s:?}: expected RRGGBB or RRGGBBAA hex digits"
            ))
        })
    }
}

impl fmt::Display for Color {
    /// Lowercase wire hex: `rrggbb` when opaque, `rrggbbaa` otherwise.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}{:02x}{:02x}", self.r, self.g, self.b)?;
        if !self.is_opaque() {
            write!(f, "{:02x}", self.a)?;
        }
        Ok(())
    }
}

impl From<[u8; 3]> for Color {
    fn from([r, g, b]: [u8; 3]) -> Self {
        Color::rgb(r, g, b)
    }
}

impl From<[u8; 4]> for Color {
    fn from([r, g, b, a]: [u8; 4]) -> Self {
        Color::rgba(r, g, b, a)
    }
}

/// A canvas coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

impl Point {
    #[inline]
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    pub const ORIGIN: Point = Point::new(0, 0);
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Canvas dimensions as reported by the server. Both are non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}

impl CanvasSize {
    /// Create a canvas size, rejecting zero dimensions.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(PixelflutError::InvalidArgument(format!(
                "canvas size must be positive, got {width}x{height}"
            )));
        }
        Ok(Self { width, height })
    }

    #[inline]
    pub fn contains(&self, point: Point) -> bool {
        point.x < self.width && point.y < self.height
    }
}

impl fmt::Display for CanvasSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
