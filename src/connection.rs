//! Connection to one Pixelflut server.
//!
//! A [`Connection`] owns exactly one transport stream. The write half goes to
//! the dedicated writer task (see [`crate::writer`]); the read half sits
//! behind a lock together with its [`LineBuffer`], and that lock is held for
//! a whole request/response round trip so responses never get crossed.
//!
//! Lifecycle: `Unopened → Open → Closed`. Sending or receiving outside
//! `Open` fails with [`PixelflutError::InvalidState`].

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::ConnectionOptions;
use crate::error::{PixelflutError, Result};
use crate::protocol::{decode_size_response, encode_size_query, CanvasSize, LineBuffer};
use crate::transport;
use crate::writer::{spawn_writer_task, WriterHandle};

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Unopened = 0,
    Open = 1,
    Closed = 2,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Unopened,
            1 => ConnectionState::Open,
            _ => ConnectionState::Closed,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Unopened => "unopened",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Read half plus the bytes read past the last response.
struct ResponseReader {
    half: Option<BoxedReader>,
    buffer: LineBuffer,
    chunk: Vec<u8>,
}

impl ResponseReader {
    /// Read one line, giving up after `timeout`.
    async fn read_line(&mut self, timeout: Duration) -> Result<String> {
        let half = self.half.as_mut().ok_or(PixelflutError::ConnectionClosed)?;
        let outcome =
            tokio::time::timeout(timeout, fill_line(half, &mut self.buffer, &mut self.chunk)).await;

        match outcome {
            Ok(result) => result,
            Err(_) => {
                // A late answer must not be taken for the next request's
                self.buffer.clear();
                Err(PixelflutError::Timeout {
                    operation: "response read",
                    after: timeout,
                })
            }
        }
    }
}

async fn fill_line(half: &mut BoxedReader, buffer: &mut LineBuffer, chunk: &mut [u8]) -> Result<String> {
    loop {
        if let Some(line) = buffer.next_line()? {
            return Ok(line);
        }
        let n = half.read(chunk).await?;
        if n == 0 {
            return Err(PixelflutError::ConnectionClosed);
        }
        if let Some(line) = buffer.push(&chunk[..n])? {
            return Ok(line);
        }
    }
}

/// A connection to one Pixelflut server.
///
/// Share it behind an `Arc`: every send/receive method takes `&self`.
pub struct Connection {
    options: ConnectionOptions,
    state: AtomicU8,
    peer: Option<String>,
    writer: Option<WriterHandle>,
    writer_task: Mutex<Option<JoinHandle<Result<()>>>>,
    reader: Mutex<ResponseReader>,
}

impl Connection {
    /// Create an unopened connection.
    pub fn new(options: ConnectionOptions) -> Self {
        let read_size = options.read_buffer_size.max(1);
        Self {
            options,
            state: AtomicU8::new(ConnectionState::Unopened as u8),
            peer: None,
            writer: None,
            writer_task: Mutex::new(None),
            reader: Mutex::new(ResponseReader {
                half: None,
                buffer: LineBuffer::new(read_size),
                chunk: vec![0u8; read_size],
            }),
        }
    }

    /// Create and open a TCP connection to `address` (`host:port`).
    pub async fn connect(address: &str, options: ConnectionOptions) -> Result<Self> {
        let mut connection = Self::new(options);
        connection.open(address).await?;
        Ok(connection)
    }

    /// Open a TCP connection to `address` within the connect timeout.
    ///
    /// No retry: refusal, DNS failure or timeout is returned as-is.
    pub async fn open(&mut self, address: &str) -> Result<()> {
        self.ensure_state(ConnectionState::Unopened, "open")?;

        let stream = transport::connect(address, self.options.connect_timeout).await?;
        let (read_half, write_half) = stream.into_split();
        self.install(Box::new(read_half), write_half, address.to_string());

        tracing::info!("Connected to {}", address);
        Ok(())
    }

    /// Open over an already established stream.
    pub fn attach<S>(&mut self, stream: S, peer: impl Into<String>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        self.ensure_state(ConnectionState::Unopened, "attach a stream")?;

        let (read_half, write_half) = tokio::io::split(stream);
        self.install(Box::new(read_half), write_half, peer.into());
        Ok(())
    }

    fn install<W>(&mut self, read_half: BoxedReader, write_half: W, peer: String)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (writer, task) = spawn_writer_task(write_half, self.options.channel_capacity);
        self.writer = Some(writer);
        *self.writer_task.get_mut() = Some(task);
        self.reader.get_mut().half = Some(read_half);
        self.peer = Some(peer);
        self.state
            .store(ConnectionState::Open as u8, Ordering::Release);
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Address or label of the peer, once opened.
    pub fn peer(&self) -> Option<&str> {
        self.peer.as_deref()
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    fn ensure_state(&self, expected: ConnectionState, operation: &'static str) -> Result<()> {
        let state = self.state();
        if state != expected {
            return Err(PixelflutError::InvalidState { operation, state });
        }
        Ok(())
    }

    fn open_writer(&self, operation: &'static str) -> Result<&WriterHandle> {
        self.ensure_state(ConnectionState::Open, operation)?;
        self.writer
            .as_ref()
            .ok_or(PixelflutError::InvalidState {
                operation,
                state: ConnectionState::Unopened,
            })
    }

    /// Queue encoded commands for the transport. Fire and forget.
    ///
    /// `commands` must hold whole `\n`-terminated commands; it is written
    /// contiguously.
    pub async fn send_command(&self, commands: Bytes) -> Result<()> {
        self.open_writer("send a command")?.send(commands).await
    }

    /// Wait until every queued command has been written to the transport.
    pub async fn flush(&self) -> Result<()> {
        self.open_writer("flush")?.flush().await
    }

    /// Write `request`, then read one response line within `timeout`.
    ///
    /// Round trips are serialized against each other; fire-and-forget
    /// commands from other tasks may still be written in between.
    pub async fn send_and_receive(&self, request: Bytes, timeout: Duration) -> Result<String> {
        let writer = self.open_writer("send a request")?;
        let mut reader = self.reader.lock().await;

        writer.send(request).await?;
        writer.flush().await?;
        reader.read_line(timeout).await
    }

    /// Ask the server for its canvas size.
    pub async fn query_size(&self) -> Result<CanvasSize> {
        let line = self
            .send_and_receive(encode_size_query(), self.options.read_timeout)
            .await?;
        let size = decode_size_response(&line)?;
        tracing::debug!("Canvas size {}", size);
        Ok(size)
    }

    /// Close the connection. Idempotent.
    ///
    /// Drains queued commands, shuts down the write half and drops the read
    /// half. Returns the writer's failure if one happened while open.
    pub async fn close(&self) -> Result<()> {
        let previous = self
            .state
            .swap(ConnectionState::Closed as u8, Ordering::AcqRel);
        if ConnectionState::from_u8(previous) != ConnectionState::Open {
            return Ok(());
        }

        let shutdown = match &self.writer {
            Some(writer) => writer.shutdown().await,
            None => Ok(()),
        };

        let task_result = match self.writer_task.lock().await.take() {
            Some(task) => task
                .await
                .unwrap_or_else(|e| Err(PixelflutError::Io(std::io::Error::other(e.to_string())))),
            None => Ok(()),
        };

        self.reader.lock().await.half = None;
        tracing::debug!("Connection to {} closed", self.peer.as_deref().unwrap_or("?"));

        // The task result carries the underlying I/O error
        task_result.and(shutdown)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .field("state", &self.state())
            .field("options", &self.options)
            .finish()
    }
}
