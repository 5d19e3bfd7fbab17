//! Draw session: one connection, one canvas, many concurrent workers.
//!
//! A [`Session`] is created by the size handshake and then turns pixel
//! sources into `PX` commands. A bulk draw partitions the source into one
//! strip per worker, spawns every worker on the runtime, and only then
//! joins them. Each worker walks its strip row by row (y outer, x inner)
//! and hands every finished row to the connection as a single message, so
//! commands from different workers interleave only at row boundaries.
//!
//! Bulk draws always send opaque colors; alpha is only honored by
//! [`Session::set_pixel`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use pixelflut_client::{ClientConfig, Color, Point, Session};
//! use pixelflut_client::source::SolidColor;
//!
//! let session = Session::connect(&ClientConfig::new("127.0.0.1", 1234)).await?;
//! session.fill_rect(Point::new(10, 10), 100, 50, Color::rgb(255, 0, 0)).await?;
//! session.close().await?;
//! ```

use std::collections::HashMap;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use tokio::task::{Id, JoinError, JoinSet};

use crate::config::{ClientConfig, FailurePolicy};
use crate::connection::Connection;
use crate::error::{PixelflutError, Result};
use crate::partition::{chunks_within, Chunk};
use crate::protocol::{
    decode_get_response_at, encode_get, encode_set, encode_set_into, CanvasSize, Color, Point,
    MAX_COMMAND_LEN,
};
use crate::source::{PixelSource, SolidColor};

/// Caller-level stop signal for a running draw.
///
/// Workers check it before each row. Commands already handed to the
/// connection are still written.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Outcome of a completed bulk draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrawReport {
    /// Strips drawn (= workers used).
    pub chunks: usize,
    /// `PX` set commands sent.
    pub commands: u64,
    /// Pixels skipped because they fall outside the canvas.
    pub clipped: u64,
}

/// Where a running worker is, for error reports.
struct InFlight {
    index: usize,
    /// Canvas columns of the strip.
    columns: Range<u32>,
    /// Canvas row currently being encoded.
    row: Arc<AtomicU32>,
}

/// A live connection plus the canvas size negotiated on it.
pub struct Session {
    connection: Arc<Connection>,
    canvas: CanvasSize,
    workers: usize,
    failure_policy: FailurePolicy,
    read_timeout: Duration,
}

impl Session {
    /// Connect to `config.address()` and run the size handshake.
    ///
    /// Fails before any drawing if connect or handshake fails.
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        let connection = Connection::connect(&config.address(), config.connection_options()).await?;
        Self::handshake(connection, config).await
    }

    /// Run the size handshake on an already opened connection.
    ///
    /// The connection is closed again if the handshake fails.
    pub async fn handshake(connection: Connection, config: &ClientConfig) -> Result<Self> {
        config.validate()?;

        let canvas = match connection.query_size().await {
            Ok(size) => size,
            Err(e) => {
                tracing::warn!("Size handshake failed: {}", e);
                let _ = connection.close().await;
                return Err(e);
            }
        };
        tracing::info!(
            "Canvas on {} is {}",
            connection.peer().unwrap_or("?"),
            canvas
        );

        Ok(Self {
            read_timeout: connection.options().read_timeout,
            connection: Arc::new(connection),
            canvas,
            workers: config.workers,
            failure_policy: config.failure_policy,
        })
    }

    /// Canvas size reported by the server at handshake.
    pub fn canvas_size(&self) -> CanvasSize {
        self.canvas
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Configured number of draw workers.
    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    fn check_bounds(&self, point: Point) -> Result<()> {
        if !self.canvas.contains(point) {
            return Err(PixelflutError::InvalidArgument(format!(
                "pixel {} is outside the {} canvas",
                point, self.canvas
            )));
        }
        Ok(())
    }

    /// Paint one pixel. Unlike bulk draws, alpha is sent as given.
    pub async fn set_pixel(&self, point: Point, color: Color) -> Result<()> {
        self.check_bounds(point)?;
        self.connection
            .send_command(encode_set(point.x, point.y, color))
            .await
    }

    /// Read one pixel back from the server.
    pub async fn get_pixel(&self, point: Point) -> Result<Color> {
        self.check_bounds(point)?;
        let line = self
            .connection
            .send_and_receive(encode_get(point.x, point.y), self.read_timeout)
            .await?;
        decode_get_response_at(&line, point)
    }

    /// Fill a rectangle with one color, through the bulk draw path.
    pub async fn fill_rect(
        &self,
        origin: Point,
        width: u32,
        height: u32,
        color: Color,
    ) -> Result<DrawReport> {
        tracing::info!(
            "Filling {}x{} at {} with {}",
            width,
            height,
            origin,
            color
        );
        let fill = Arc::new(SolidColor::new(width, height, color));
        self.draw(fill, origin).await
    }

    /// Fill the whole canvas with one color.
    pub async fn fill_canvas(&self, color: Color) -> Result<DrawReport> {
        self.fill_rect(Point::ORIGIN, self.canvas.width, self.canvas.height, color)
            .await
    }

    /// Draw `source` with its top-left corner at `origin`.
    pub async fn draw<S>(&self, source: Arc<S>, origin: Point) -> Result<DrawReport>
    where
        S: PixelSource + ?Sized + 'static,
    {
        self.draw_with_cancel(source, origin, &CancelFlag::new()).await
    }

    /// Like [`draw`](Self::draw), stopping early once `cancel` is set.
    ///
    /// A cancelled draw fails with [`PixelflutError::Cancelled`].
    pub async fn draw_with_cancel<S>(
        &self,
        source: Arc<S>,
        origin: Point,
        cancel: &CancelFlag,
    ) -> Result<DrawReport>
    where
        S: PixelSource + ?Sized + 'static,
    {
        let (width, height) = (source.width(), source.height());

        // Origins are unsigned, so only the right and bottom edges clip
        let visible_width = visible_extent(origin.x, width, self.canvas.width);
        let visible_height = visible_extent(origin.y, height, self.canvas.height);
        let clipped =
            width as u64 * height as u64 - visible_width as u64 * visible_height as u64;

        let mut report = DrawReport {
            clipped,
            ..DrawReport::default()
        };
        if clipped > 0 {
            tracing::warn!(
                "{} pixels fall outside the {} canvas and are skipped",
                clipped,
                self.canvas
            );
        }
        if visible_width == 0 || visible_height == 0 {
            return Ok(report);
        }

        // A strip must be at least one column wide
        let workers = self.workers.min(visible_width as usize);
        if workers < self.workers {
            tracing::debug!(
                "Only {} columns are visible, using {} of {} workers",
                visible_width,
                workers,
                self.workers
            );
        }

        let started = Instant::now();
        let chunks = chunks_within(&source, visible_width, visible_height, workers)?;
        report.chunks = chunks.len();

        // Spawn every worker before waiting on any of them
        let mut in_flight: HashMap<Id, InFlight> = HashMap::with_capacity(chunks.len());
        let mut set = JoinSet::new();
        for chunk in chunks {
            let left = origin.x + chunk.offset();
            let row = Arc::new(AtomicU32::new(origin.y));
            let info = InFlight {
                index: chunk.index(),
                columns: left..left + chunk.width(),
                row: Arc::clone(&row),
            };
            let handle = set.spawn(draw_chunk(
                chunk,
                origin,
                Arc::clone(&self.connection),
                cancel.clone(),
                row,
            ));
            in_flight.insert(handle.id(), info);
        }

        let mut first_error: Option<PixelflutError> = None;
        while let Some(joined) = set.join_next_with_id().await {
            let result = match joined {
                Ok((_, result)) => result,
                // Aborted by us after an earlier failure
                Err(e) if e.is_cancelled() => continue,
                Err(e) => Err(chunk_panicked(&in_flight, e)),
            };

            match result {
                Ok(commands) => report.commands += commands,
                Err(e) if first_error.is_none() => {
                    if self.failure_policy == FailurePolicy::AbortRemaining {
                        tracing::warn!("Draw worker failed, aborting the rest: {}", e);
                        set.abort_all();
                    } else {
                        tracing::warn!("Draw worker failed, letting the rest finish: {}", e);
                    }
                    first_error = Some(e);
                }
                Err(e) => tracing::debug!("Further draw worker failure: {}", e),
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        self.connection.flush().await?;

        tracing::info!(
            "Drew {}x{} at {} with {} workers: {} commands in {:?}",
            width,
            height,
            origin,
            report.chunks,
            report.commands,
            started.elapsed()
        );
        Ok(report)
    }

    /// Close the underlying connection. Idempotent.
    pub async fn close(&self) -> Result<()> {
        self.connection.close().await
    }
}

/// Length of `[start, start + len)` that lies below `limit`.
fn visible_extent(start: u32, len: u32, limit: u32) -> u32 {
    limit.saturating_sub(start).min(len)
}

fn chunk_panicked(in_flight: &HashMap<Id, InFlight>, err: JoinError) -> PixelflutError {
    let source = Box::new(PixelflutError::WorkerPanicked(err.to_string()));
    match in_flight.get(&err.id()) {
        Some(chunk) => PixelflutError::ChunkFailed {
            index: chunk.index,
            columns: chunk.columns.clone(),
            row: chunk.row.load(Ordering::Acquire),
            source,
        },
        None => *source,
    }
}

/// Emit one strip, row-major, one connection message per row.
///
/// The strip lies entirely on the canvas. `row` tracks the canvas row
/// being encoded.
async fn draw_chunk<S>(
    chunk: Chunk<S>,
    origin: Point,
    connection: Arc<Connection>,
    cancel: CancelFlag,
    row: Arc<AtomicU32>,
) -> Result<u64>
where
    S: PixelSource + ?Sized,
{
    let left = origin.x + chunk.offset();
    let width = chunk.width();
    let mut commands = 0u64;
    let mut buf = BytesMut::with_capacity(width as usize * MAX_COMMAND_LEN);

    tracing::debug!(
        "Chunk {}: columns {}..{}, {} rows",
        chunk.index(),
        left,
        left + width,
        chunk.height()
    );

    for y in 0..chunk.height() {
        if cancel.is_cancelled() {
            return Err(PixelflutError::Cancelled);
        }

        let canvas_y = origin.y + y;
        row.store(canvas_y, Ordering::Release);
        for x in 0..width {
            let color = chunk.pixel(x, y).opaque();
            encode_set_into(&mut buf, left + x, canvas_y, color);
        }
        commands += width as u64;

        if let Err(e) = connection.send_command(buf.split().freeze()).await {
            return Err(PixelflutError::ChunkFailed {
                index: chunk.index(),
                columns: left..left + width,
                row: canvas_y,
                source: Box::new(e),
            });
        }
    }

    tracing::debug!("Chunk {} done: {} commands", chunk.index(), commands);
    Ok(commands)
}
