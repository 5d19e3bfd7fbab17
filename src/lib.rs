//! # pixelflut-client
//!
//! Async client for the Pixelflut protocol: paint a shared remote canvas by
//! streaming `PX {x} {y} {rrggbb}` commands over one TCP connection.
//!
//! ## Architecture
//!
//! - **Codec** ([`protocol`]): pure command encoding and response decoding
//! - **Connection** ([`Connection`]): one transport, size handshake, pixel
//!   read-back; all writes funnel through a dedicated writer task
//! - **Partitioner** ([`partition`]): vertical strips, one per worker
//! - **Session** ([`Session`]): concurrent workers drawing their strips
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use pixelflut_client::{source, ClientConfig, Point, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::new("127.0.0.1", 1234).workers(8);
//!     let session = Session::connect(&config).await?;
//!
//!     let image = source::load_image("wallpaper.png", session.canvas_size())?;
//!     session.draw(Arc::new(image), Point::ORIGIN).await?;
//!
//!     session.close().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod partition;
pub mod protocol;
pub mod source;
pub mod transport;

mod session;
mod writer;

pub use config::{ClientConfig, FailurePolicy};
pub use connection::{Connection, ConnectionState};
pub use error::{PixelflutError, Result};
pub use protocol::{CanvasSize, Color, Point};
pub use session::{CancelFlag, DrawReport, Session};
