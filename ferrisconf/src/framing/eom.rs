//! NETCONF 1.0 end-of-message framing, used for the hello exchange.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use memchr::memmem;

use super::{Decoded, Decoder};
use crate::error::FramingError;

/// Marker terminating every end-of-message framed message.
pub const EOM_MARKER: &[u8] = b"]]>]]>";

/// Incremental decoder for one `]]>]]>` terminated message.
///
/// Everything before the marker is the message. A marker split across
/// two reads is found because the scan resumes a marker length back.
#[derive(Debug, Default)]
pub struct EomDecoder {
    buffer: BytesMut,
    scanned: usize,
    done: bool,
}

impl EomDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for EomDecoder {
    fn feed(&mut self, data: &[u8]) -> Result<Decoded, FramingError> {
        if self.done {
            return Err(FramingError::Finished);
        }
        self.buffer.extend_from_slice(data);

        let start = self.scanned.saturating_sub(EOM_MARKER.len() - 1);
        match memmem::find(&self.buffer[start..], EOM_MARKER) {
            Some(offset) => {
                let end = start + offset;
                let message = self.buffer.split_to(end).freeze();
                self.buffer.advance(EOM_MARKER.len());
                self.done = true;
                Ok(Decoded::Done(message))
            }
            None => {
                self.scanned = self.buffer.len();
                Ok(Decoded::NeedMore)
            }
        }
    }

    fn buffered(&self) -> usize {
        if self.done { 0 } else { self.buffer.len() }
    }

    fn take_remaining(&mut self) -> Bytes {
        if self.done {
            self.buffer.split().freeze()
        } else {
            Bytes::new()
        }
    }
}

/// Frame `body` with the end-of-message marker.
pub fn encode_eom(body: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(body.len() + EOM_MARKER.len());
    out.put_slice(body);
    out.put_slice(EOM_MARKER);
    out.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_in_one_read() {
        let mut decoder = EomDecoder::new();
        let result = decoder.feed(b"<hello/>]]>]]>").unwrap();
        assert_eq!(result, Decoded::Done(Bytes::from_static(b"<hello/>")));
    }

    #[test]
    fn test_marker_split_across_reads() {
        let mut decoder = EomDecoder::new();
        assert_eq!(decoder.feed(b"<hello/>]]").unwrap(), Decoded::NeedMore);
        assert_eq!(decoder.feed(b">]").unwrap(), Decoded::NeedMore);
        assert_eq!(
            decoder.feed(b"]>\n").unwrap(),
            Decoded::Done(Bytes::from_static(b"<hello/>"))
        );
        assert_eq!(decoder.take_remaining(), Bytes::from_static(b"\n"));
    }

    #[test]
    fn test_lone_brackets_are_content() {
        let mut decoder = EomDecoder::new();
        let result = decoder.feed(b"<a>]]></a>]]>]]>").unwrap();
        assert_eq!(result, Decoded::Done(Bytes::from_static(b"<a>]]></a>")));
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut decoder = EomDecoder::new();
        let stream = encode_eom(b"<hello><capabilities/></hello>");
        let mut result = Decoded::NeedMore;
        for byte in stream.iter() {
            if let Decoded::Done(message) = decoder.feed(std::slice::from_ref(byte)).unwrap() {
                result = Decoded::Done(message);
                break;
            }
        }
        assert_eq!(
            result,
            Decoded::Done(Bytes::from_static(b"<hello><capabilities/></hello>"))
        );
    }

    #[test]
    fn test_done_rejects_more_input() {
        let mut decoder = EomDecoder::new();
        decoder.feed(b"x]]>]]>").unwrap();
        assert_eq!(decoder.feed(b"y"), Err(FramingError::Finished));
    }
}
