//! RFC 6242 chunked framing.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use log::trace;
use once_cell::sync::Lazy;
use regex::bytes::Regex;

use super::{Decoded, Decoder};
use crate::error::FramingError;

/// Largest chunk size the framing allows.
pub const MAX_CHUNK_SIZE: u64 = 4_294_967_295;

const END_OF_CHUNKS: &[u8] = b"\n##\n";

/// A complete chunk header. Leading zeros are prohibited and the size has
/// at most ten digits.
static CHUNK_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\A\n#([1-9][0-9]{0,9})\n").expect("static regex"));

/// A chunk header cut short by the end of the buffered input.
static CHUNK_HEADER_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\A\n#[1-9][0-9]{0,9}\z").expect("static regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ScanningHeader,
    ScanningChunkSize,
    ScanningChunkData { bytes_left: u64 },
    ScanningEndMarker,
    Done,
    Failed,
}

/// Incremental decoder for one chunk-framed message.
///
/// ```
/// use ferrisconf::framing::{ChunkDecoder, Decoded, Decoder};
///
/// let mut decoder = ChunkDecoder::new();
/// assert_eq!(decoder.feed(b"\n#5\nhel").unwrap(), Decoded::NeedMore);
/// assert_eq!(
///     decoder.feed(b"lo\n##\n").unwrap(),
///     Decoded::Done(bytes::Bytes::from_static(b"hello"))
/// );
/// ```
#[derive(Debug)]
pub struct ChunkDecoder {
    state: State,
    pending: BytesMut,
    message: BytesMut,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self {
            state: State::ScanningHeader,
            pending: BytesMut::new(),
            message: BytesMut::new(),
        }
    }

    /// Whether a complete message has been produced.
    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    fn fail(&mut self, err: FramingError) -> Result<Decoded, FramingError> {
        self.state = State::Failed;
        Err(err)
    }

    fn snippet(&self) -> String {
        let end = self.pending.len().min(16);
        String::from_utf8_lossy(&self.pending[..end]).into_owned()
    }

    fn is_header_prefix(&self) -> bool {
        match self.pending.len() {
            0 => true,
            1 => &self.pending[..] == b"\n",
            2 => &self.pending[..] == b"\n#",
            _ => CHUNK_HEADER_PREFIX.is_match(&self.pending),
        }
    }
}

impl Default for ChunkDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ChunkDecoder {
    fn feed(&mut self, data: &[u8]) -> Result<Decoded, FramingError> {
        if matches!(self.state, State::Done | State::Failed) {
            return Err(FramingError::Finished);
        }
        self.pending.extend_from_slice(data);

        loop {
            match self.state {
                State::ScanningHeader => {
                    if self.pending.len() < 3 {
                        return Ok(Decoded::NeedMore);
                    }
                    if &self.pending[..2] != b"\n#" {
                        let snippet = self.snippet();
                        return self.fail(FramingError::BadHeader(snippet));
                    }
                    self.state = if self.pending[2] == b'#' {
                        State::ScanningEndMarker
                    } else {
                        State::ScanningChunkSize
                    };
                }
                State::ScanningChunkSize => {
                    let parsed = CHUNK_HEADER.captures(&self.pending).map(|caps| {
                        let header_len = caps.get(0).map_or(0, |m| m.end());
                        let size = std::str::from_utf8(&caps[1])
                            .ok()
                            .and_then(|digits| digits.parse::<u64>().ok());
                        (header_len, size)
                    });

                    match parsed {
                        Some((header_len, Some(size))) => {
                            if size > MAX_CHUNK_SIZE {
                                return self.fail(FramingError::ChunkTooLarge(size));
                            }
                            self.pending.advance(header_len);
                            trace!("chunk header: {} bytes follow", size);
                            self.state = State::ScanningChunkData { bytes_left: size };
                        }
                        Some((_, None)) => {
                            let snippet = self.snippet();
                            return self.fail(FramingError::BadChunkSize(snippet));
                        }
                        None if self.is_header_prefix() => return Ok(Decoded::NeedMore),
                        None => {
                            let snippet = self.snippet();
                            return self.fail(FramingError::BadChunkSize(snippet));
                        }
                    }
                }
                State::ScanningChunkData { bytes_left } => {
                    let available = self.pending.len() as u64;
                    let take = bytes_left.min(available) as usize;
                    self.message.put(self.pending.split_to(take));

                    let bytes_left = bytes_left - take as u64;
                    if bytes_left == 0 {
                        self.state = State::ScanningHeader;
                    } else {
                        self.state = State::ScanningChunkData { bytes_left };
                        return Ok(Decoded::NeedMore);
                    }
                }
                State::ScanningEndMarker => {
                    if self.pending.len() < END_OF_CHUNKS.len() {
                        return Ok(Decoded::NeedMore);
                    }
                    if &self.pending[..END_OF_CHUNKS.len()] != END_OF_CHUNKS {
                        let snippet = self.snippet();
                        return self.fail(FramingError::BadEndMarker(snippet));
                    }
                    self.pending.advance(END_OF_CHUNKS.len());
                    self.state = State::Done;
                    let message = self.message.split().freeze();
                    trace!("chunked message complete: {} bytes", message.len());
                    return Ok(Decoded::Done(message));
                }
                State::Done | State::Failed => return Err(FramingError::Finished),
            }
        }
    }

    fn buffered(&self) -> usize {
        match self.state {
            State::Done => 0,
            _ => self.pending.len() + self.message.len(),
        }
    }

    fn take_remaining(&mut self) -> Bytes {
        if self.state == State::Done {
            self.pending.split().freeze()
        } else {
            Bytes::new()
        }
    }
}

/// Frame `body` as a chunked message.
///
/// Bodies larger than [`MAX_CHUNK_SIZE`] are split across several chunks.
/// An empty body has no valid framing and is refused.
pub fn encode_chunked(body: &[u8]) -> Result<Bytes, FramingError> {
    if body.is_empty() {
        return Err(FramingError::EmptyMessage);
    }
    let mut out = BytesMut::with_capacity(body.len() + 32);
    for chunk in body.chunks(MAX_CHUNK_SIZE as usize) {
        out.put_slice(format!("\n#{}\n", chunk.len()).as_bytes());
        out.put_slice(chunk);
    }
    out.put_slice(END_OF_CHUNKS);
    Ok(out.freeze())
}
