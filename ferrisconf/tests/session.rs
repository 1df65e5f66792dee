//! Sessions against a simulated device running in its own task.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use ferrisconf::error::{Error, Result, TransportError};
use ferrisconf::framing::{Decoded, Framing, encode_eom};
use ferrisconf::reconcile::document::{in_sync_for_merge, in_sync_for_replace};
use ferrisconf::rpc::{BASE_1_0, BASE_1_1};
use ferrisconf::transport::{Connector, NetconfChannel};
use ferrisconf::tree::{DecodeOptions, Element, NETCONF_BASE_NS, decode_element, forest_to_xml};
use ferrisconf::{DefaultOperation, Session, SessionOptions};
use tokio::sync::mpsc;

const BLUE_VRF: &str = r#"<vrfs xmlns="http://cisco.com/ns/yang/Cisco-IOS-XR-infra-rsi-cfg">
  <vrf>
    <vrf-name>BLUE</vrf-name>
    <description>Generic external traffic</description>
    <create/>
  </vrf>
</vrfs>"#;

const PATH_VRFS: &str = r#"<vrfs xmlns="http://cisco.com/ns/yang/Cisco-IOS-XR-infra-rsi-cfg"/>"#;

#[derive(Default)]
struct DeviceState {
    running: String,
    candidate: String,
    log: Vec<(String, String)>,
}

/// A device with a candidate and a running datastore.
#[derive(Clone, Default)]
struct Device {
    state: Arc<Mutex<DeviceState>>,
}

impl Device {
    fn operations(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.log.iter().map(|(op, _)| op.clone()).collect()
    }

    fn message_ids(&self) -> Vec<u64> {
        let state = self.state.lock().unwrap();
        state.log.iter().filter_map(|(_, id)| id.parse().ok()).collect()
    }

    fn running(&self) -> String {
        self.state.lock().unwrap().running.clone()
    }

    /// Answer one request; `None` ends the session.
    fn answer(&self, request: &Element) -> Option<String> {
        let message_id = request
            .attributes
            .iter()
            .find(|a| a.name == "message-id")
            .map(|a| a.value.clone())
            .unwrap_or_default();
        let operation = request.children.first()?;

        let mut state = self.state.lock().unwrap();
        state.log.push((operation.name.clone(), message_id.clone()));

        let body = match operation.name.as_str() {
            "get-config" => format!("<data>{}</data>", state.running),
            "edit-config" => {
                let trees: Vec<_> = operation
                    .child("config")
                    .map(|config| {
                        config
                            .children
                            .iter()
                            .map(|e| decode_element(e, &DecodeOptions::default()))
                            .collect()
                    })
                    .unwrap_or_default();
                state.candidate = forest_to_xml(&trees);
                "<ok/>".to_string()
            }
            "commit" => {
                state.running = state.candidate.clone();
                "<ok/>".to_string()
            }
            _ => "<ok/>".to_string(),
        };
        Some(format!(
            "<rpc-reply message-id=\"{}\" xmlns=\"{}\">{}</rpc-reply>",
            message_id, NETCONF_BASE_NS, body
        ))
    }

    async fn serve(self, mut inbound: mpsc::UnboundedReceiver<Bytes>, outbound: mpsc::UnboundedSender<Bytes>) {
        let hello = format!(
            "<hello xmlns=\"{}\"><capabilities><capability>{}</capability>\
             <capability>{}</capability></capabilities><session-id>7</session-id></hello>",
            NETCONF_BASE_NS, BASE_1_0, BASE_1_1
        );
        if outbound.send(encode_eom(hello.as_bytes())).is_err() {
            return;
        }

        let mut framing = Framing::EndOfMessage;
        let mut decoder = framing.decoder();
        let mut greeted = false;
        while let Some(mut input) = inbound.recv().await {
            while !input.is_empty() {
                let message = match decoder.feed(&input) {
                    Ok(Decoded::NeedMore) => break,
                    Ok(Decoded::Done(message)) => message,
                    Err(_) => return,
                };
                input = decoder.take_remaining();

                if greeted {
                    let Ok(text) = std::str::from_utf8(&message) else {
                        return;
                    };
                    let Ok(request) = Element::parse(text) else {
                        return;
                    };
                    let Some(reply) = self.answer(&request) else {
                        return;
                    };
                    let Ok(framed) = framing.encode(reply.as_bytes()) else {
                        return;
                    };
                    if outbound.send(framed).is_err() {
                        return;
                    }
                    if request.child("close-session").is_some() {
                        return;
                    }
                } else {
                    greeted = true;
                    framing = Framing::Chunked;
                }
                decoder = framing.decoder();
            }
        }
    }
}

struct DeviceChannel {
    outbound: mpsc::UnboundedSender<Bytes>,
    inbound: mpsc::UnboundedReceiver<Bytes>,
}

impl NetconfChannel for DeviceChannel {
    async fn send(&mut self, data: Bytes) -> Result<()> {
        self.outbound
            .send(data)
            .map_err(|_| Error::from(TransportError::Disconnected))
    }

    async fn recv(&mut self) -> Result<Option<Bytes>> {
        Ok(self.inbound.recv().await)
    }

    async fn close(self) -> Result<()> {
        Ok(())
    }
}

impl Connector for Device {
    type Channel = DeviceChannel;

    async fn connect(&self) -> Result<DeviceChannel> {
        let (to_device, device_inbound) = mpsc::unbounded_channel();
        let (device_outbound, from_device) = mpsc::unbounded_channel();
        tokio::spawn(self.clone().serve(device_inbound, device_outbound));
        Ok(DeviceChannel {
            outbound: to_device,
            inbound: from_device,
        })
    }

    fn target(&self) -> String {
        "admin@xrv9k:830".to_string()
    }
}

#[tokio::test]
async fn test_apply_only_when_out_of_sync() {
    let _ = env_logger::builder().is_test(true).try_init();
    let device = Device::default();
    let session = Session::new(device.clone(), SessionOptions::default());

    let current = session.get_config(Some(PATH_VRFS)).await.unwrap();
    assert!(current.data().is_empty());
    assert!(!in_sync_for_merge(BLUE_VRF, &current.config_as_string()).unwrap());

    session
        .apply_config(DefaultOperation::Merge, BLUE_VRF)
        .await
        .unwrap();
    assert!(device.running().contains("<vrf-name>BLUE</vrf-name>"));

    let current = session.get_config(Some(PATH_VRFS)).await.unwrap();
    let current = current.config_as_string();
    assert!(in_sync_for_merge(BLUE_VRF, &current).unwrap());
    assert!(in_sync_for_replace(BLUE_VRF, &current).unwrap());

    session.close().await.unwrap();
    assert_eq!(
        device.operations(),
        vec!["get-config", "edit-config", "commit", "get-config", "close-session"]
    );
    assert_eq!(device.message_ids(), vec![1, 2, 3, 4, 5]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_are_serialized() {
    let device = Device::default();
    let session = Arc::new(Session::new(device.clone(), SessionOptions::default()));

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.commit().await.map(|_| ()) })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(device.message_ids(), (1..=16).collect::<Vec<u64>>());
    assert_eq!(session.message_id().await, 17);
}

#[tokio::test]
async fn test_session_reopens_after_close() {
    let device = Device::default();
    let session = Session::new(device.clone(), SessionOptions::default());

    session.commit().await.unwrap();
    session.close().await.unwrap();
    assert!(!session.is_open().await);

    session.commit().await.unwrap();
    assert!(session.is_open().await);
    assert_eq!(device.message_ids(), vec![1, 2, 1]);
}
