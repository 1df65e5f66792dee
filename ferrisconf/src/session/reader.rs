//! Reassembly of framed messages from channel reads.

use std::time::Duration;

use bytes::Bytes;
use log::trace;

use crate::error::{FramingError, Result, TransportError};
use crate::framing::{Decoded, Framing};
use crate::transport::NetconfChannel;

/// Reads one message at a time from a channel, keeping bytes that arrive
/// after the end of a message for the next read.
#[derive(Debug, Default)]
pub(crate) struct MessageReader {
    pending: Bytes,
    /// An LF directly followed the last end-of-message marker.
    trailing_lf: bool,
}

impl MessageReader {
    /// Read the next complete message.
    ///
    /// Peers commonly follow the hello's `]]>]]>` with one LF. When the
    /// next chunked message starts with `#`, that LF opens its header;
    /// otherwise it is dropped. No other bytes are skipped.
    pub(crate) async fn read<Ch: NetconfChannel>(
        &mut self,
        channel: &mut Ch,
        framing: Framing,
        timeout: Option<Duration>,
    ) -> Result<Bytes> {
        let mut decoder = framing.decoder();
        let mut held_lf = std::mem::take(&mut self.trailing_lf) && framing == Framing::Chunked;
        let mut data = std::mem::take(&mut self.pending);

        loop {
            if held_lf && !data.is_empty() {
                held_lf = false;
                if data[0] == b'#' {
                    decoder.feed(b"\n")?;
                }
            }

            if !data.is_empty() {
                if let Decoded::Done(message) = decoder.feed(&data)? {
                    let mut rest = decoder.take_remaining();
                    if framing == Framing::EndOfMessage && rest.first() == Some(&b'\n') {
                        rest = rest.slice(1..);
                        self.trailing_lf = true;
                    }
                    self.pending = rest;
                    trace!(
                        "message complete: {} bytes, {} bytes carried over",
                        message.len(),
                        self.pending.len()
                    );
                    return Ok(message);
                }
            }

            data = match next_bytes(channel, timeout).await? {
                Some(bytes) => bytes,
                None if decoder.buffered() > 0 => {
                    return Err(FramingError::Truncated(decoder.buffered()).into());
                }
                None => return Err(TransportError::Disconnected.into()),
            };
        }
    }
}

async fn next_bytes<Ch: NetconfChannel>(
    channel: &mut Ch,
    timeout: Option<Duration>,
) -> Result<Option<Bytes>> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, channel.recv())
            .await
            .map_err(|_| TransportError::Timeout(limit))?,
        None => channel.recv().await,
    }
}
