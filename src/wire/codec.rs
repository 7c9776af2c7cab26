//! Newline framing for the agency wire protocol.
//!
//! Extracts one `\n`-terminated UTF-8 message at a time from the byte
//! stream, buffering any bytes past the delimiter for the next call.
//! Works over any AsyncRead/AsyncWrite when driven through `Framed`,
//! which also guarantees complete writes on `send`.

use std::io;

use tokio_util::bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

const DELIMITER: u8 = b'\n';

/// Codec that frames messages on `\n` and validates UTF-8.
///
/// Remembers how far the accumulation buffer has been scanned so partial
/// reads do not rescan the same bytes.
#[derive(Debug, Default)]
pub struct LineCodec {
    next_index: usize,
}

impl LineCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, io::Error> {
        match src[self.next_index..].iter().position(|b| *b == DELIMITER) {
            Some(offset) => {
                let end = self.next_index + offset;
                let mut frame = src.split_to(end + 1);
                frame.truncate(end);
                self.next_index = 0;

                let line = std::str::from_utf8(&frame)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
                    .to_string();
                Ok(Some(line))
            }
            None => {
                self.next_index = src.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>, io::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "peer closed the connection mid-message",
            )),
        }
    }
}

impl Encoder<String> for LineCodec {
    type Error = io::Error;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), io::Error> {
        dst.reserve(item.len() + 1);
        dst.put_slice(item.as_bytes());
        dst.put_u8(DELIMITER);
        Ok(())
    }
}
