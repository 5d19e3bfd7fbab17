//! Transport module - establishing the TCP stream to a Pixelflut server.

mod tcp;

pub use tcp::{connect, resolve};
