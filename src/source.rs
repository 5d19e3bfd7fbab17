//! Pixel sources: anything with a width, a height and a color per pixel.
//!
//! Decoding and resizing belong to the `image` crate; the draw pipeline only
//! sees [`PixelSource`]. Solid fills use [`SolidColor`] so they travel the
//! same partition/worker path as images.

use std::path::Path;

use image::{imageops::FilterType, DynamicImage, RgbImage, RgbaImage};

use crate::error::{PixelflutError, Result};
use crate::protocol::{CanvasSize, Color};

/// A rectangular grid of color samples.
///
/// `pixel` is only called with `x < width()` and `y < height()`.
pub trait PixelSource: Send + Sync {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn pixel(&self, x: u32, y: u32) -> Color;
}

/// A rectangle of one color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolidColor {
    pub width: u32,
    pub height: u32,
    pub color: Color,
}

impl SolidColor {
    pub fn new(width: u32, height: u32, color: Color) -> Self {
        Self { width, height, color }
    }
}

impl PixelSource for SolidColor {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    fn pixel(&self, _x: u32, _y: u32) -> Color {
        self.color
    }
}

/// An in-memory row-major raster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    width: u32,
    height: u32,
    pixels: Vec<Color>,
}

impl Raster {
    /// Wrap row-major pixels; `pixels.len()` must equal `width * height`.
    pub fn new(width: u32, height: u32, pixels: Vec<Color>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(PixelflutError::InvalidArgument(format!(
                "raster {}x{} needs {} pixels, got {}",
                width,
                height,
                expected,
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Build a raster by evaluating `f(x, y)` for every pixel.
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> Color) -> Self {
        let mut pixels = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                pixels.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            pixels,
        }
    }
}

impl PixelSource for Raster {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    fn pixel(&self, x: u32, y: u32) -> Color {
        self.pixels[y as usize * self.width as usize + x as usize]
    }
}

impl PixelSource for RgbImage {
    fn width(&self) -> u32 {
        self.dimensions().0
    }

    fn height(&self) -> u32 {
        self.dimensions().1
    }

    #[inline]
    fn pixel(&self, x: u32, y: u32) -> Color {
        Color::from(self.get_pixel(x, y).0)
    }
}

impl PixelSource for RgbaImage {
    fn width(&self) -> u32 {
        self.dimensions().0
    }

    fn height(&self) -> u32 {
        self.dimensions().1
    }

    #[inline]
    fn pixel(&self, x: u32, y: u32) -> Color {
        Color::from(self.get_pixel(x, y).0)
    }
}

/// Shrink `image` to fit inside `canvas`, keeping the aspect ratio.
///
/// Images that already fit are returned unchanged; nothing is enlarged.
pub fn fit_to_canvas(image: DynamicImage, canvas: CanvasSize) -> DynamicImage {
    if image.width() <= canvas.width && image.height() <= canvas.height {
        return image;
    }
    tracing::debug!(
        "Resizing {}x{} image to fit {}",
        image.width(),
        image.height(),
        canvas
    );
    image.resize(canvas.width, canvas.height, FilterType::Triangle)
}

/// Decode the image at `path` and shrink it to fit `canvas`.
pub fn load_image(path: impl AsRef<Path>, canvas: CanvasSize) -> Result<RgbImage> {
    let path = path.as_ref();
    let image = image::open(path)?;
    tracing::info!(
        "Loaded {} ({}x{})",
        path.display(),
        image.width(),
        image.height()
    );
    Ok(fit_to_canvas(image, canvas).to_rgb8())
}
