//! NETCONF message framing.
//!
//! Two framings are in use on a NETCONF/SSH channel (RFC 6242):
//!
//! - the end-of-message framing of NETCONF 1.0, where every message is
//!   followed by `]]>]]>`. The hello exchange always uses it.
//! - the chunked framing of NETCONF 1.1, where a message is a sequence of
//!   `\n#<size>\n<data>` chunks closed by `\n##\n`.
//!
//! Decoders are explicit state machines fed with whatever bytes the channel
//! delivers; they report [`Decoded::NeedMore`] until a whole message has
//! been assembled.

mod chunked;
mod eom;

pub use chunked::{ChunkDecoder, MAX_CHUNK_SIZE, encode_chunked};
pub use eom::{EOM_MARKER, EomDecoder, encode_eom};

use bytes::Bytes;

use crate::error::FramingError;

/// Outcome of feeding bytes to a decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// The message is not complete yet.
    NeedMore,
    /// A complete message.
    Done(Bytes),
}

/// A stateful message decoder.
pub trait Decoder: Send {
    /// Feed the next bytes received from the channel.
    fn feed(&mut self, data: &[u8]) -> Result<Decoded, FramingError>;

    /// Number of bytes held that do not yet belong to a finished message.
    fn buffered(&self) -> usize;

    /// Bytes received after the end of the completed message.
    fn take_remaining(&mut self) -> Bytes;
}

/// Which framing the session speaks after the hello exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// NETCONF 1.0 `]]>]]>` delimited messages.
    EndOfMessage,
    /// NETCONF 1.1 chunked messages.
    Chunked,
}

impl Framing {
    /// Frame an outbound message.
    pub fn encode(self, body: &[u8]) -> Result<Bytes, FramingError> {
        match self {
            Framing::EndOfMessage => Ok(encode_eom(body)),
            Framing::Chunked => encode_chunked(body),
        }
    }

    /// A fresh decoder for one inbound message.
    pub fn decoder(self) -> Box<dyn Decoder> {
        match self {
            Framing::EndOfMessage => Box::new(EomDecoder::new()),
            Framing::Chunked => Box::new(ChunkDecoder::new()),
        }
    }
}
