//! The peer's hello message.

use crate::error::ParseError;
use crate::framing::Framing;
use crate::tree::Element;

use super::message::BASE_1_1;

/// What the server announced in its hello.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerHello {
    pub session_id: Option<u64>,
    pub capabilities: Vec<String>,
}

impl PeerHello {
    pub fn parse(bytes: &[u8]) -> Result<PeerHello, ParseError> {
        let text = std::str::from_utf8(bytes)?;
        let root = Element::parse(text)?;
        if root.name != "hello" {
            return Err(ParseError::UnexpectedRoot {
                expected: "hello".to_string(),
                found: root.name,
            });
        }

        let capabilities = root
            .child("capabilities")
            .map(|caps| {
                caps.children_named("capability")
                    .map(|c| c.trimmed_text().to_string())
                    .filter(|c| !c.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        let session_id = root
            .child("session-id")
            .and_then(|id| id.trimmed_text().parse().ok());

        Ok(PeerHello {
            session_id,
            capabilities,
        })
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }

    /// Whether the peer speaks NETCONF 1.1 chunked framing.
    pub fn supports_chunked(&self) -> bool {
        self.has_capability(BASE_1_1)
    }

    /// Framing to use for the rest of the session.
    pub fn framing(&self) -> Framing {
        if self.supports_chunked() {
            Framing::Chunked
        } else {
            Framing::EndOfMessage
        }
    }
}
