//! Command encoding and response decoding.
//!
//! Wire grammar (ASCII, one command per line):
//! ```text
//! SIZE\n                    -> SIZE {width} {height}\n
//! PX {x} {y} {rrggbb}\n     -> (no response)
//! PX {x} {y} {rrggbbaa}\n   -> (no response)
//! PX {x} {y}\n              -> PX {x} {y} {rrggbb}\n
//! ```
//!
//! All functions here are pure. Encoders write straight into a `BytesMut`
//! so a worker can pack a whole row of commands into one buffer.

use bytes::{BufMut, Bytes, BytesMut};

use super::types::{CanvasSize, Color, Point};
use crate::error::{PixelflutError, Result};

/// Longest possible encoded command: `PX 4294967295 4294967295 rrggbbaa\n`.
pub const MAX_COMMAND_LEN: usize = 3 + 10 + 1 + 10 + 1 + 8 + 1;

const SIZE_QUERY: &[u8] = b"SIZE\n";
const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// A single protocol command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Paint one pixel.
    Set(Point, Color),
    /// Read one pixel back.
    Get(Point),
    /// Ask for the canvas dimensions.
    SizeQuery,
}

impl Command {
    /// Encode into a fresh buffer.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(MAX_COMMAND_LEN);
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Append the encoded command to `buf`.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        match *self {
            Command::Set(p, color) => encode_set_into(buf, p.x, p.y, color),
            Command::Get(p) => encode_get_into(buf, p.x, p.y),
            Command::SizeQuery => buf.put_slice(SIZE_QUERY),
        }
    }

    /// Whether the server answers this command with a line.
    pub fn expects_response(&self) -> bool {
        !matches!(self, Command::Set(..))
    }
}

/// Encode `PX {x} {y} {hex}\n`. Alpha is omitted when it is 255.
pub fn encode_set(x: u32, y: u32, color: Color) -> Bytes {
    let mut buf = BytesMut::with_capacity(MAX_COMMAND_LEN);
    encode_set_into(&mut buf, x, y, color);
    buf.freeze()
}

/// Append `PX {x} {y} {hex}\n` to `buf`.
pub fn encode_set_into(buf: &mut BytesMut, x: u32, y: u32, color: Color) {
    buf.reserve(MAX_COMMAND_LEN);
    put_coordinates(buf, x, y);
    buf.put_u8(b' ');
    put_hex_byte(buf, color.r);
    put_hex_byte(buf, color.g);
    put_hex_byte(buf, color.b);
    if !color.is_opaque() {
        put_hex_byte(buf, color.a);
    }
    buf.put_u8(b'\n');
}

/// Encode `PX {x} {y}\n`.
pub fn encode_get(x: u32, y: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(MAX_COMMAND_LEN);
    encode_get_into(&mut buf, x, y);
    buf.freeze()
}

fn encode_get_into(buf: &mut BytesMut, x: u32, y: u32) {
    put_coordinates(buf, x, y);
    buf.put_u8(b'\n');
}

/// Encode `SIZE\n`.
pub fn encode_size_query() -> Bytes {
    Bytes::from_static(SIZE_QUERY)
}

/// Decode `SIZE {w} {h}`. A trailing line terminator is ignored.
pub fn decode_size_response(text: &str) -> Result<CanvasSize> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.len() != 3 {
        return Err(PixelflutError::Protocol(format!(
            "size response must have 3 tokens, got {}: {:?}",
            tokens.len(),
            text
        )));
    }
    if tokens[0] != "SIZE" {
        return Err(PixelflutError::Protocol(format!(
            "expected SIZE response, got {:?}",
            text
        )));
    }

    let width = parse_number(tokens[1], "width")?;
    let height = parse_number(tokens[2], "height")?;

    CanvasSize::new(width, height)
        .map_err(|_| PixelflutError::Protocol(format!("server reported empty canvas: {:?}", text)))
}

/// Decode `PX {x} {y} {hex}` and return the color.
pub fn decode_get_response(text: &str) -> Result<Color> {
    decode_pixel_line(text).map(|(_, color)| color)
}

/// Like [`decode_get_response`], but also checks the echoed coordinates.
pub fn decode_get_response_at(text: &str, expected: Point) -> Result<Color> {
    let (point, color) = decode_pixel_line(text)?;
    if point != expected {
        return Err(PixelflutError::Protocol(format!(
            "pixel response for {} does not match request for {}",
            point, expected
        )));
    }
    Ok(color)
}

fn decode_pixel_line(text: &str) -> Result<(Point, Color)> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.len() != 4 {
        return Err(PixelflutError::Protocol(format!(
            "pixel response must have 4 tokens, got {}: {:?}",
            tokens.len(),
            text
        )));
    }
    if tokens[0] != "PX" {
        return Err(PixelflutError::Protocol(format!(
            "expected PX response, got {:?}",
            text
        )));
    }

    let x = parse_number(tokens[1], "x")?;
    let y = parse_number(tokens[2], "y")?;
    let color = Color::from_hex_digits(tokens[3]).ok_or_else(|| {
        PixelflutError::Protocol(format!("invalid color token {:?}", tokens[3]))
    })?;

    Ok((Point::new(x, y), color))
}

fn parse_number(token: &str, what: &str) -> Result<u32> {
    // u32::from_str tolerates a leading '+'; the wire grammar does not
    if !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PixelflutError::Protocol(format!(
            "{} is not a number: {:?}",
            what, token
        )));
    }
    token
        .parse()
        .map_err(|_| PixelflutError::Protocol(format!("{} out of range: {:?}", what, token)))
}

#[inline]
fn put_coordinates(buf: &mut BytesMut, x: u32, y: u32) {
    buf.put_slice(b"PX ");
    put_decimal(buf, x);
    buf.put_u8(b' ');
    put_decimal(buf, y);
}

#[inline]
fn put_decimal(buf: &mut BytesMut, mut n: u32) {
    let mut digits = [0u8; 10];
    let mut i = digits.len();
    loop {
        i -= 1;
        digits[i] = b'0' + (n % 10) as u8;
        n /= 10;
        if n == 0 {
            break;
        }
    }
    buf.put_slice(&digits[i..]);
}

#[inline]
fn put_hex_byte(buf: &mut BytesMut, byte: u8) {
    buf.put_u8(HEX_DIGITS[(byte >> 4) as usize]);
    buf.put_u8(HEX_DIGITS[(byte & 0x0f) as usize]);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(bytes: &Bytes) -> &str {
        std::str::from_utf8(bytes).unwrap()
    }

    fn hex_token(cmd: &Bytes) -> String {
        text(cmd).trim_end().rsplit(' ').next().unwrap().to_string()
    }

    #[test]
    fn test_encode_set_opaque() {
        let cmd = encode_set(3, 4, Color::rgba(255, 0, 0, 255));
        assert_eq!(text(&cmd), "PX 3 4 ff0000\n");
    }

    #[test]
    fn test_encode_set_with_alpha() {
        let cmd = encode_set(3, 4, Color::rgba(255, 0, 0, 128));
        assert_eq!(text(&cmd), "PX 3 4 ff000080\n");
    }

    #[test]
    fn test_encode_set_hex_width_by_alpha() {
        for a in 0..=255u8 {
            for &(x, y) in &[(0u32, 0u32), (7, 1920), (u32::MAX, u32::MAX)] {
                let cmd = encode_set(x, y, Color::rgba(1, 0xab, 0xfe, a));
                let expected = if a == 255 { 6 } else { 8 };
                assert_eq!(hex_token(&cmd).len(), expected, "alpha {}", a);
            }
        }
    }

    #[test]
    fn test_encode_set_extreme_coordinates() {
        let cmd = encode_set(u32::MAX, 0, Color::rgba(0, 0, 0, 0));
        assert_eq!(text(&cmd), "PX 4294967295 0 00000000\n");

        let longest = encode_set(u32::MAX, u32::MAX, Color::rgba(0, 0, 0, 0));
        assert_eq!(longest.len(), MAX_COMMAND_LEN);
    }

    #[test]
    fn test_encode_set_into_appends() {
        let mut buf = BytesMut::new();
        encode_set_into(&mut buf, 0, 0, Color::WHITE);
        encode_set_into(&mut buf, 1, 0, Color::BLACK);
        assert_eq!(&buf[..], b"PX 0 0 ffffff\nPX 1 0 000000\n");
    }

    #[test]
    fn test_encode_get_and_size() {
        assert_eq!(text(&encode_get(10, 20)), "PX 10 20\n");
        assert_eq!(text(&encode_size_query()), "SIZE\n");
    }

    #[test]
    fn test_command_enum_encodes() {
        assert_eq!(
            Command::Set(Point::new(1, 2), Color::rgb(0, 0, 255)).encode(),
            encode_set(1, 2, Color::rgb(0, 0, 255))
        );
        assert_eq!(Command::Get(Point::new(1, 2)).encode(), encode_get(1, 2));
        assert_eq!(Command::SizeQuery.encode(), encode_size_query());
        assert!(!Command::Set(Point::ORIGIN, Color::BLACK).expects_response());
        assert!(Command::Get(Point::ORIGIN).expects_response());
        assert!(Command::SizeQuery.expects_response());
    }

    #[test]
    fn test_decode_size_response() {
        let size = decode_size_response("SIZE 800 600\n").unwrap();
        assert_eq!((size.width, size.height), (800, 600));
        assert!(decode_size_response("SIZE 800 600\r\n").is_ok());
    }

    #[test]
    fn test_decode_size_response_errors() {
        for bad in [
            "SIZE 800",
            "SIZE 800 600 1",
            "SIZ 800 600",
            "SIZE abc 600",
            "SIZE -1 600",
            "SIZE +8 600",
            "SIZE 0 600",
            "SIZE 99999999999 1",
            "",
        ] {
            let err = decode_size_response(bad).unwrap_err();
            assert!(matches!(err, PixelflutError::Protocol(_)), "{:?}", bad);
        }
    }

    #[test]
    fn test_decode_get_response() {
        assert_eq!(
            decode_get_response("PX 3 4 ff0000\n").unwrap(),
            Color::rgb(255, 0, 0)
        );
        assert_eq!(
            decode_get_response("PX 3 4 ff000080").unwrap(),
            Color::rgba(255, 0, 0, 128)
        );
    }

    #[test]
    fn test_decode_get_response_errors() {
        for bad in ["PX 3 4", "PX 3 4 ff0000 extra", "XP 3 4 ff0000", "PX 3 4 ff00", "PX a 4 ff0000"] {
            let err = decode_get_response(bad).unwrap_err();
            assert!(matches!(err, PixelflutError::Protocol(_)), "{:?}", bad);
        }
    }

    #[test]
    fn test_decode_get_response_at_checks_point() {
        assert!(decode_get_response_at("PX 3 4 ffffff", Point::new(3, 4)).is_ok());
        let err = decode_get_response_at("PX 4 3 ffffff", Point::new(3, 4)).unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn test_echo_of_set_recovers_color() {
        // A server that echoes a set command verbatim produces a valid get response
        for color in [
            Color::rgb(0, 0, 0),
            Color::rgb(0x12, 0x34, 0x56),
            Color::rgba(255, 254, 253, 7),
        ] {
            let cmd = encode_set(5, 6, color);
            let echoed = text(&cmd);
            assert_eq!(decode_get_response(echoed).unwrap(), color);
        }
    }
}
