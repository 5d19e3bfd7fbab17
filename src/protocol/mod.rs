//! Protocol module - command codec, value types and response framing.
//!
//! This module implements the Pixelflut text protocol:
//! - Value types: [`Color`], [`Point`], [`CanvasSize`]
//! - Encoding of `PX` / `SIZE` commands and decoding of their responses
//! - Line buffer for accumulating partial response reads

mod command;
mod line_buffer;
mod types;

pub use command::{
    decode_get_response, decode_get_response_at, decode_size_response, encode_get,
    encode_set, encode_set_into, encode_size_query, Command, MAX_COMMAND_LEN,
};
pub use line_buffer::{LineBuffer, DEFAULT_MAX_LINE_LEN};
pub use types::{CanvasSize, Color, Point, OPAQUE};
