//! Dedicated writer task for high-throughput command sending.
//!
//! Every draw worker shares one transport. Instead of an
//! `Arc<Mutex<BoxedWriter>>`, a single task owns the write half and receives
//! whole encoded commands through an mpsc channel. A message is always one or
//! more complete `\n`-terminated commands, so bytes from different workers
//! can interleave only at command boundaries.
//!
//! # Architecture
//!
//! ```text
//! Worker 1 ─┐
//! Worker 2 ─┼─► mpsc::Sender<Outbound> ─► Writer Task ─► TCP write half
//! Worker N ─┘
//! ```
//!
//! Ready messages are batched into a single `write_vectored` call.

use std::io::IoSlice;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{PixelflutError, Result};

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Maximum messages to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// Message to the writer task.
#[derive(Debug)]
enum Outbound {
    /// Encoded commands, written as-is.
    Data(Bytes),
    Control(Control),
}

#[derive(Debug)]
enum Control {
    /// Write everything queued before this, flush, then acknowledge.
    Flush(oneshot::Sender<Result<()>>),
    /// Like `Flush`, then shut down the write half and stop.
    Shutdown(oneshot::Sender<Result<()>>),
}

impl Control {
    fn ack(self, result: Result<()>) {
        let (Control::Flush(ack) | Control::Shutdown(ack)) = self;
        let _ = ack.send(result);
    }
}

/// Handle for sending commands to the writer task.
///
/// This is cheaply cloneable and can be shared across workers.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<Outbound>,
}

impl WriterHandle {
    /// Queue encoded commands for writing.
    ///
    /// Waits while the channel is full. Fails with `ConnectionClosed` once
    /// the writer task has stopped, either after a write error or a shutdown.
    pub async fn send(&self, commands: Bytes) -> Result<()> {
        self.tx
            .send(Outbound::Data(commands))
            .await
            .map_err(|_| PixelflutError::ConnectionClosed)
    }

    /// Wait until everything queued so far has been written and flushed.
    pub async fn flush(&self) -> Result<()> {
        self.request(|ack| Outbound::Control(Control::Flush(ack))).await
    }

    /// Drain the queue, shut down the write half and stop the task.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|ack| Outbound::Control(Control::Shutdown(ack))).await
    }

    async fn request(&self, make: fn(oneshot::Sender<Result<()>>) -> Outbound) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(make(ack_tx))
            .await
            .map_err(|_| PixelflutError::ConnectionClosed)?;
        ack_rx.await.map_err(|_| PixelflutError::ConnectionClosed)?
    }
}

/// Spawn the writer task and return a handle for sending commands.
///
/// # Returns
///
/// A tuple of `(WriterHandle, JoinHandle)`. The JoinHandle resolves with the
/// first write error, if any.
pub fn spawn_writer_task<W>(writer: W, channel_capacity: usize) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(channel_capacity.max(1));
    let task = tokio::spawn(writer_loop(rx, writer));
    (WriterHandle { tx }, task)
}

/// Main writer loop - receives commands and writes them to the transport.
async fn writer_loop<W>(mut rx: mpsc::Receiver<Outbound>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut batch: Vec<Bytes> = Vec::with_capacity(MAX_BATCH_SIZE);

    let outcome = loop {
        let mut control = match rx.recv().await {
            Some(Outbound::Data(bytes)) => {
                batch.push(bytes);
                None
            }
            Some(Outbound::Control(control)) => Some(control),
            // All handles dropped
            None => break writer.flush().await.map_err(PixelflutError::Io),
        };

        // Collect additional ready commands up to the next control message
        while control.is_none() && batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(Outbound::Data(bytes)) => batch.push(bytes),
                Ok(Outbound::Control(c)) => control = Some(c),
                Err(_) => break,
            }
        }

        let written = write_batch(&mut writer, &batch).await;
        batch.clear();

        match (written, control) {
            (Ok(()), None) => {}
            (Ok(()), Some(flush @ Control::Flush(_))) => flush.ack(Ok(())),
            (Ok(()), Some(shutdown @ Control::Shutdown(_))) => {
                let result = writer.shutdown().await.map_err(PixelflutError::Io);
                shutdown.ack(replicate(&result));
                break result;
            }
            (Err(e), control) => {
                tracing::error!("Writer task failed: {}", e);
                let result = Err(e);
                if let Some(control) = control {
                    control.ack(replicate(&result));
                }
                break result;
            }
        }
    };

    // Stop accepting commands, then answer anyone already waiting
    rx.close();
    while let Some(msg) = rx.recv().await {
        if let Outbound::Control(control) = msg {
            let reply = match &outcome {
                Ok(()) => Err(PixelflutError::ConnectionClosed),
                Err(_) => replicate(&outcome),
            };
            control.ack(reply);
        }
    }
    outcome
}

/// Copy a writer outcome for a waiter; `io::Error` is not `Clone`.
fn replicate(result: &Result<()>) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(PixelflutError::Io(e)) => Err(PixelflutError::Io(std::io::Error::new(
            e.kind(),
            e.to_string(),
        ))),
        Err(_) => Err(PixelflutError::ConnectionClosed),
    }
}

/// Write a batch of messages using scatter/gather I/O (write_vectored).
async fn write_batch<W>(writer: &mut W, batch: &[Bytes]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if batch.is_empty() {
        return writer.flush().await.map_err(PixelflutError::Io);
    }

    let slices: Vec<IoSlice<'_>> = batch.iter().map(|b| IoSlice::new(b)).collect();
    let total_size: usize = batch.iter().map(|b| b.len()).sum();

    // Fast path: kernel buffer takes everything at once
    let written = writer.write_vectored(&slices).await?;
    if written == total_size {
        writer.flush().await?;
        return Ok(());
    }
    if written == 0 {
        return Err(write_zero());
    }

    // Slow path: partial write, continue with the remaining data
    let mut total_written = written;
    while total_written < total_size {
        let remaining_slices = build_remaining_slices(batch, total_written);
        let n = writer.write_vectored(&remaining_slices).await?;
        if n == 0 {
            return Err(write_zero());
        }
        total_written += n;
    }

    writer.flush().await?;
    Ok(())
}

fn write_zero() -> PixelflutError {
    PixelflutError::Io(std::io::Error::new(
        std::io::ErrorKind::WriteZero,
        "write_vectored returned 0",
    ))
}

/// Build IoSlice array for remaining data after partial write.
fn build_remaining_slices(batch: &[Bytes], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len());
    let mut offset = 0;

    for bytes in batch {
        let end = offset + bytes.len();
        if skip_bytes < end {
            let start = skip_bytes.saturating_sub(offset);
            slices.push(IoSlice::new(&bytes[start..]));
        }
        offset = end;
    }

    slices
}
