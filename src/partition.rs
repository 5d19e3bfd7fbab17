//! Splitting a pixel source into vertical strips, one per worker.
//!
//! `part_width = width / workers`; strip `i` covers columns
//! `[i * part_width, (i + 1) * part_width)` and the last strip is stretched
//! to `width` so the division remainder is not dropped. Rows are never split.

use std::ops::Range;
use std::sync::Arc;

use crate::error::{PixelflutError, Result};
use crate::protocol::Color;
use crate::source::PixelSource;

/// Column range of one worker's share of the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Strip {
    /// Worker index, in left-to-right order.
    pub index: usize,
    /// Columns covered, relative to the source.
    pub columns: Range<u32>,
    pub height: u32,
}

impl Strip {
    /// Horizontal offset of the strip within the source.
    #[inline]
    pub fn offset(&self) -> u32 {
        self.columns.start
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.columns.end - self.columns.start
    }

    pub fn pixel_count(&self) -> u64 {
        self.width() as u64 * self.height as u64
    }
}

/// Split `width x height` into exactly `worker_count` strips.
///
/// Fails with `InvalidArgument` if `worker_count` is zero or larger than
/// `width` (that would produce empty strips).
pub fn partition(width: u32, height: u32, worker_count: usize) -> Result<Vec<Strip>> {
    if worker_count == 0 {
        return Err(PixelflutError::InvalidArgument(
            "worker count must be at least 1".into(),
        ));
    }
    if worker_count > width as usize {
        return Err(PixelflutError::InvalidArgument(format!(
            "worker count {} exceeds image width {}",
            worker_count, width
        )));
    }

    // worker_count <= width, so it fits in u32
    let workers = worker_count as u32;
    let part_width = width / workers;

    let strips = (0..workers)
        .map(|i| {
            let left = i * part_width;
            let right = if i + 1 == workers {
                width
            } else {
                (i + 1) * part_width
            };
            Strip {
                index: i as usize,
                columns: left..right,
                height,
            }
        })
        .collect();

    Ok(strips)
}

/// A strip bound to the source it reads from.
///
/// Reads go through the shared source; the chunk never copies pixels.
pub struct Chunk<S: ?Sized> {
    strip: Strip,
    source: Arc<S>,
}

impl<S: PixelSource + ?Sized> Chunk<S> {
    pub fn strip(&self) -> &Strip {
        &self.strip
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.strip.index
    }

    #[inline]
    pub fn offset(&self) -> u32 {
        self.strip.offset()
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.strip.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.strip.height
    }

    /// Sample at chunk-local `(x, y)`.
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> Color {
        self.source.pixel(self.strip.offset() + x, y)
    }
}

/// Partition `source` and bind every strip to it.
pub fn chunks<S: PixelSource + ?Sized>(source: &Arc<S>, worker_count: usize) -> Result<Vec<Chunk<S>>> {
    chunks_within(source, source.width(), source.height(), worker_count)
}

/// Partition only the top-left `width x height` region of `source`.
///
/// Used to skip the part of a source that lands off the canvas.
pub fn chunks_within<S: PixelSource + ?Sized>(
    source: &Arc<S>,
    width: u32,
    height: u32,
    worker_count: usize,
) -> Result<Vec<Chunk<S>>> {
    if width > source.width() || height > source.height() {
        return Err(PixelflutError::InvalidArgument(format!(
            "region {}x{} exceeds source {}x{}",
            width,
            height,
            source.width(),
            source.height()
        )));
    }

    let strips = partition(width, height, worker_count)?;
    Ok(strips
        .into_iter()
        .map(|strip| Chunk {
            strip,
            source: Arc::clone(source),
        })
        .collect())
}
