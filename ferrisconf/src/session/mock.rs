//! In-memory NETCONF peer for session tests.

use std::collections::{HashSet, VecDeque};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::{Bytes, BytesMut};

use crate::error::{Result, TransportError};
use crate::framing::{Decoded, Decoder, Framing, encode_eom};
use crate::rpc::{BASE_1_0, BASE_1_1};
use crate::transport::{Connector, NetconfChannel};
use crate::tree::{Element, NETCONF_BASE_NS};

/// Scripted server behavior.
#[derive(Debug, Clone)]
pub(crate) struct MockPeer {
    chunked: bool,
    fragment: usize,
    data: String,
    rejects: HashSet<String>,
    garbles: HashSet<String>,
    ignores: HashSet<String>,
    bad_chunks: HashSet<String>,
    hang_ups: HashSet<usize>,
}

impl Default for MockPeer {
    fn default() -> Self {
        Self {
            chunked: true,
            fragment: 0,
            data: String::new(),
            rejects: HashSet::new(),
            garbles: HashSet::new(),
            ignores: HashSet::new(),
            bad_chunks: HashSet::new(),
            hang_ups: HashSet::new(),
        }
    }
}

impl MockPeer {
    /// Content of the `<data>` element in get and get-config replies.
    pub(crate) fn with_data(mut self, data: &str) -> Self {
        self.data = data.to_string();
        self
    }

    /// Deliver replies in pieces of `size` bytes.
    pub(crate) fn fragment(mut self, size: usize) -> Self {
        self.fragment = size;
        self
    }

    pub(crate) fn base_1_0_only(mut self) -> Self {
        self.chunked = false;
        self
    }

    /// Answer `operation` with an rpc-error.
    pub(crate) fn reject(mut self, operation: &str) -> Self {
        self.rejects.insert(operation.to_string());
        self
    }

    /// Answer `operation` with malformed XML.
    pub(crate) fn garble(mut self, operation: &str) -> Self {
        self.garbles.insert(operation.to_string());
        self
    }

    /// Never answer `operation`.
    pub(crate) fn ignore(mut self, operation: &str) -> Self {
        self.ignores.insert(operation.to_string());
        self
    }

    /// Answer `operation` with a non-decimal chunk size.
    pub(crate) fn bad_chunk_size(mut self, operation: &str) -> Self {
        self.bad_chunks.insert(operation.to_string());
        self
    }

    /// Close the channel instead of answering the `ordinal`th request
    /// (counted from 1 across all connections).
    pub(crate) fn hang_up_on(mut self, ordinal: usize) -> Self {
        self.hang_ups.insert(ordinal);
        self
    }
}

#[derive(Debug)]
struct MockState {
    peer: MockPeer,
    connects: AtomicUsize,
    hellos: AtomicUsize,
    refusals: AtomicUsize,
    ordinal: AtomicUsize,
    generation: AtomicUsize,
    next_session_id: AtomicUsize,
    requests: Mutex<Vec<String>>,
    bodies: Mutex<Vec<String>>,
}

/// Connects to an in-memory [`MockPeer`] and records what it sees.
#[derive(Debug, Clone)]
pub(crate) struct MockConnector {
    state: Arc<MockState>,
}

impl MockConnector {
    pub(crate) fn new(peer: MockPeer) -> Self {
        Self {
            state: Arc::new(MockState {
                peer,
                connects: AtomicUsize::new(0),
                hellos: AtomicUsize::new(0),
                refusals: AtomicUsize::new(0),
                ordinal: AtomicUsize::new(0),
                generation: AtomicUsize::new(0),
                next_session_id: AtomicUsize::new(1),
                requests: Mutex::new(Vec::new()),
                bodies: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Connection attempts, successful or not.
    pub(crate) fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// Client hellos received.
    pub(crate) fn hellos(&self) -> usize {
        self.state.hellos.load(Ordering::SeqCst)
    }

    /// Requests received, as `operation:message-id`.
    pub(crate) fn requests(&self) -> Vec<String> {
        self.state.requests.lock().unwrap().clone()
    }

    /// Raw request documents received.
    pub(crate) fn bodies(&self) -> Vec<String> {
        self.state.bodies.lock().unwrap().clone()
    }

    pub(crate) fn refuse_next_connect(&self) {
        self.state.refusals.fetch_add(1, Ordering::SeqCst);
    }

    /// Sever every open channel without a goodbye.
    pub(crate) fn drop_connection(&self) {
        self.state.generation.fetch_add(1, Ordering::SeqCst);
    }
}

impl Connector for MockConnector {
    type Channel = MockChannel;

    async fn connect(&self) -> Result<MockChannel> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        let refused = self
            .state
            .refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(TransportError::ConnectionFailed {
                host: "mock".to_string(),
                port: 830,
                source: io::Error::from(io::ErrorKind::ConnectionRefused),
            }
            .into());
        }

        let mut channel = MockChannel {
            state: Arc::clone(&self.state),
            generation: self.state.generation.load(Ordering::SeqCst),
            framing: Framing::EndOfMessage,
            decoder: Framing::EndOfMessage.decoder(),
            hello_seen: false,
            outbox: VecDeque::new(),
            closed: false,
        };
        channel.push_hello();
        Ok(channel)
    }

    fn target(&self) -> String {
        "admin@mock:830".to_string()
    }
}

/// Server end of one mock connection. Replies are produced synchronously
/// while the request is sent.
pub(crate) struct MockChannel {
    state: Arc<MockState>,
    generation: usize,
    framing: Framing,
    decoder: Box<dyn Decoder>,
    hello_seen: bool,
    outbox: VecDeque<Bytes>,
    closed: bool,
}

impl MockChannel {
    fn peer(&self) -> &MockPeer {
        &self.state.peer
    }

    fn severed(&self) -> bool {
        self.generation != self.state.generation.load(Ordering::SeqCst)
    }

    fn push_hello(&mut self) {
        let session_id = self.state.next_session_id.fetch_add(1, Ordering::SeqCst);
        let mut capabilities = format!("<capability>{}</capability>", BASE_1_0);
        if self.peer().chunked {
            capabilities.push_str(&format!("<capability>{}</capability>", BASE_1_1));
        }
        let hello = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <hello xmlns=\"{}\"><capabilities>{}</capabilities>\
             <session-id>{}</session-id></hello>",
            NETCONF_BASE_NS, capabilities, session_id
        );
        let mut framed = BytesMut::from(&encode_eom(hello.as_bytes())[..]);
        if self.peer().chunked {
            framed.extend_from_slice(b"\n");
        }
        self.push(framed.freeze());
    }

    fn push(&mut self, framed: Bytes) {
        match self.peer().fragment {
            0 => self.outbox.push_back(framed),
            size => {
                for piece in framed.chunks(size) {
                    self.outbox.push_back(Bytes::copy_from_slice(piece));
                }
            }
        }
    }

    fn handle(&mut self, message: Bytes) {
        if !self.hello_seen {
            self.hello_seen = true;
            self.state.hellos.fetch_add(1, Ordering::SeqCst);
            if self.peer().chunked {
                self.framing = Framing::Chunked;
            }
            return;
        }

        let body = String::from_utf8_lossy(&message).into_owned();
        let request = match Element::parse(&body) {
            Ok(request) => request,
            Err(_) => {
                self.closed = true;
                return;
            }
        };
        let message_id = request
            .attributes
            .iter()
            .find(|a| a.name == "message-id")
            .map(|a| a.value.clone())
            .unwrap_or_default();
        let operation = request
            .children
            .first()
            .map(|op| op.name.clone())
            .unwrap_or_default();

        let ordinal = self.state.ordinal.fetch_add(1, Ordering::SeqCst) + 1;
        self.state
            .requests
            .lock()
            .unwrap()
            .push(format!("{}:{}", operation, message_id));
        self.state.bodies.lock().unwrap().push(body);

        if self.peer().hang_ups.contains(&ordinal) {
            self.closed = true;
            return;
        }
        if self.peer().ignores.contains(&operation) {
            return;
        }

        let content = if self.peer().garbles.contains(&operation) {
            "<data></rpc-reply>".to_string()
        } else if self.peer().rejects.contains(&operation) {
            "<rpc-error><error-type>application</error-type>\
             <error-tag>invalid-value</error-tag>\
             <error-severity>error</error-severity>\
             <error-message>'vrf-name' is not valid</error-message></rpc-error>"
                .to_string()
        } else if operation == "get" || operation == "get-config" {
            format!("<data>{}</data>", self.peer().data)
        } else {
            "<ok/>".to_string()
        };
        let reply = format!(
            "<rpc-reply message-id=\"{}\" xmlns=\"{}\">{}</rpc-reply>",
            message_id, NETCONF_BASE_NS, content
        );

        let framed = if self.peer().bad_chunks.contains(&operation) {
            Bytes::from(format!("\n#x{}\n{}\n##\n", reply.len(), reply))
        } else {
            self.framing
                .encode(reply.as_bytes())
                .expect("replies are never empty")
        };
        self.push(framed);

        if operation == "close-session" {
            self.closed = true;
        }
    }
}

impl NetconfChannel for MockChannel {
    async fn send(&mut self, data: Bytes) -> Result<()> {
        if self.closed || self.severed() {
            return Err(TransportError::Disconnected.into());
        }
        let mut input = data;
        while !input.is_empty() {
            match self.decoder.feed(&input)? {
                Decoded::NeedMore => break,
                Decoded::Done(message) => {
                    input = self.decoder.take_remaining();
                    self.handle(message);
                    self.decoder = self.framing.decoder();
                }
            }
        }
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<Bytes>> {
        if self.severed() {
            return Ok(None);
        }
        if let Some(bytes) = self.outbox.pop_front() {
            return Ok(Some(bytes));
        }
        if self.closed {
            return Ok(None);
        }
        std::future::pending::<()>().await;
        Ok(None)
    }

    async fn close(self) -> Result<()> {
        Ok(())
    }
}
