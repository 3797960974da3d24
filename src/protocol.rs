/*!
 * Redis RESP Protocol Implementation
 *
 * Line-oriented request framing and RESP reply encoding. A request is a
 * multi-bulk array:
 *
 * ```text
 * *<argc>\r\n
 * $<len>\r\n      (skipped)
 * <arg>\r\n
 * ...
 * ```
 *
 * Every line is read up to `\n` with one trailing `\r` stripped. Argument
 * text is taken from its line; the bulk-length line before it is not
 * interpreted.
 */

use crate::error::CommandError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Upper bound on the argument count of a single request
pub const MAX_ARGS: i64 = 1024 * 1024;

/// Fixed reply to `INFO replication`
///
/// The declared length is part of the wire contract and is sent verbatim.
pub const INFO_REPLICATION: &[u8] = b"$9\r\nrole:master\r\n";

/// One unit consumed from a connection's input
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A line that does not open a multi-bulk request; ignored
    Skipped,
    /// The argument list of a request (command name first)
    Request(Vec<Bytes>),
    /// A request header that could not be parsed
    Invalid(CommandError),
}

/// Commands understood by cinder
#[derive(Debug, Clone, PartialEq)]
pub enum Cmd {
    /// GET key
    Get(Bytes),
    /// INFO replication
    Info,
    /// TYPE key
    Type(Bytes),
    /// CONFIG GET parameter
    ConfigGet(Bytes),
}

impl Cmd {
    /// Validate a request's arguments into a command
    ///
    /// Command names and the INFO section are matched case-insensitively.
    pub fn from_args(mut args: Vec<Bytes>) -> Result<Cmd, CommandError> {
        let name = match args.first() {
            Some(n) => n,
            None => return Err(CommandError::Unknown),
        };

        if name.eq_ignore_ascii_case(b"GET") {
            if args.len() != 2 {
                return Err(CommandError::Syntax("GET"));
            }
            Ok(Cmd::Get(args.swap_remove(1)))
        } else if name.eq_ignore_ascii_case(b"INFO") {
            if args.len() != 2 || !args[1].eq_ignore_ascii_case(b"replication") {
                return Err(CommandError::UnsupportedSection);
            }
            Ok(Cmd::Info)
        } else if name.eq_ignore_ascii_case(b"TYPE") {
            if args.len() != 2 {
                return Err(CommandError::Syntax("TYPE"));
            }
            Ok(Cmd::Type(args.swap_remove(1)))
        } else if name.eq_ignore_ascii_case(b"CONFIG") {
            if args.len() != 3 || !args[1].eq_ignore_ascii_case(b"GET") {
                return Err(CommandError::Syntax("CONFIG"));
            }
            Ok(Cmd::ConfigGet(args.swap_remove(2)))
        } else {
            Err(CommandError::Unknown)
        }
    }
}

/// Incremental request decoder
///
/// Holds the progress of a partially received frame so each byte of a
/// connection's buffer is scanned once. Offsets refer to the start of the
/// caller's buffer, which must only be appended to between calls until a
/// frame is returned.
#[derive(Debug, Default)]
pub struct Decoder {
    /// End of the last complete line belonging to the pending frame
    cursor: usize,
    /// Where the search for the next `\n` resumes
    scanned: usize,
    pending: Option<Pending>,
}

#[derive(Debug)]
struct Pending {
    /// Arguments still to be read
    remaining: i64,
    items: Vec<Bytes>,
    /// The next line is a bulk length line
    at_length: bool,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue decoding the frame at the start of `data`
    ///
    /// # Returns
    /// * `Some((consumed_bytes, frame))` - a complete frame; the decoder is
    ///   reset for the next one
    /// * `None` - incomplete data, need more bytes
    pub fn decode(&mut self, data: &[u8]) -> Option<(usize, Frame)> {
        loop {
            let (start, end) = self.next_line(data)?;
            let line = &data[start..end];

            let p = match self.pending.as_mut() {
                Some(p) => p,
                None => {
                    if line.first() != Some(&b'*') {
                        return Some(self.finish(Frame::Skipped));
                    }
                    let n = match parse_count(&line[1..]) {
                        Some(n) if n <= MAX_ARGS => n,
                        _ => return Some(self.finish(Frame::Invalid(CommandError::MultibulkLength))),
                    };
                    if n <= 0 {
                        return Some(self.finish(Frame::Request(Vec::new())));
                    }
                    self.pending = Some(Pending {
                        remaining: n,
                        items: Vec::with_capacity(n.min(16) as usize),
                        at_length: true,
                    });
                    continue;
                }
            };

            if p.at_length {
                p.at_length = false;
                continue;
            }
            p.items.push(Bytes::copy_from_slice(line));
            p.remaining -= 1;
            p.at_length = true;

            if p.remaining == 0 {
                let items = std::mem::take(&mut p.items);
                return Some(self.finish(Frame::Request(items)));
            }
        }
    }

    /// Decode every complete frame in `buf`
    ///
    /// Consumed bytes are removed from the buffer; a trailing partial frame
    /// is left in place and its progress kept in the decoder.
    pub fn decode_all(&mut self, buf: &mut BytesMut, out: &mut Vec<Frame>) {
        while let Some((consumed, frame)) = self.decode(&buf[..]) {
            buf.advance(consumed);
            out.push(frame);
        }
    }

    /// Locate the next complete line, returning its content range
    fn next_line(&mut self, data: &[u8]) -> Option<(usize, usize)> {
        let nl = match data[self.scanned..].iter().position(|&b| b == b'\n') {
            Some(i) => self.scanned + i,
            None => {
                self.scanned = data.len();
                return None;
            }
        };
        let start = self.cursor;
        let end = if nl > start && data[nl - 1] == b'\r' { nl - 1 } else { nl };
        self.cursor = nl + 1;
        self.scanned = self.cursor;
        Some((start, end))
    }

    fn finish(&mut self, frame: Frame) -> (usize, Frame) {
        let consumed = self.cursor;
        *self = Self::default();
        (consumed, frame)
    }
}

/// Parse a single frame from the start of `data`
///
/// # Returns
/// * `Some((consumed_bytes, frame))` - a complete frame
/// * `None` - incomplete data, need more bytes
pub fn parse_one(data: &[u8]) -> Option<(usize, Frame)> {
    Decoder::new().decode(data)
}

/// Parse every complete frame in `buf`
///
/// Consumed bytes are removed from the buffer; a trailing partial frame is
/// left for the next read.
pub fn parse_many(buf: &mut BytesMut, out: &mut Vec<Frame>) {
    Decoder::new().decode_all(buf, out);
}

/// Parse an optionally signed decimal count
fn parse_count(s: &[u8]) -> Option<i64> {
    std::str::from_utf8(s).ok()?.parse().ok()
}

//
// RESP Response Encoders
//

/// Write a simple string (`+OK\r\n`)
pub fn write_simple(s: &str, out: &mut BytesMut) {
    out.reserve(s.len() + 3);
    out.put_u8(b'+');
    out.put_slice(s.as_bytes());
    out.put_slice(b"\r\n");
}

/// Write an error line (`-ERR <message>\r\n`)
pub fn write_error(msg: &str, out: &mut BytesMut) {
    out.reserve(msg.len() + 7);
    out.put_slice(b"-ERR ");
    out.put_slice(msg.as_bytes());
    out.put_slice(b"\r\n");
}

/// Write a bulk string (`$<len>\r\n<data>\r\n`)
pub fn write_bulk(b: &[u8], out: &mut BytesMut) {
    let len_str = b.len().to_string();
    out.reserve(1 + len_str.len() + 2 + b.len() + 2);
    out.put_u8(b'$');
    out.put_slice(len_str.as_bytes());
    out.put_slice(b"\r\n");
    out.put_slice(b);
    out.put_slice(b"\r\n");
}

/// Write the null bulk string (`$-1\r\n`)
pub fn write_null(out: &mut BytesMut) {
    out.put_slice(b"$-1\r\n");
}

/// Write an array header (`*<count>\r\n`); elements follow separately
pub fn write_array_len(n: usize, out: &mut BytesMut) {
    out.put_u8(b'*');
    out.put_slice(n.to_string().as_bytes());
    out.put_slice(b"\r\n");
}

/// Encode a simple string response
pub fn resp_simple(s: &str) -> Vec<u8> {
    let mut out = BytesMut::new();
    write_simple(s, &mut out);
    out.to_vec()
}

/// Encode an error response
pub fn resp_error(msg: &str) -> Vec<u8> {
    let mut out = BytesMut::new();
    write_error(msg, &mut out);
    out.to_vec()
}

/// Encode a bulk string response
pub fn resp_bulk(b: &[u8]) -> Vec<u8> {
    let mut out = BytesMut::new();
    write_bulk(b, &mut out);
    out.to_vec()
}

/// Encode the null bulk response
pub fn resp_null() -> Vec<u8> {
    b"$-1\r\n".to_vec()
}
