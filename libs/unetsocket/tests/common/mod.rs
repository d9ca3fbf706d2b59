//! Simulated network nodes for socket integration tests.
//!
//! Each node listens on 127.0.0.1:0 and plays a container with agents
//! `phy` (physical and datagram service), `node` (node info) and `arp`
//! (address resolution). Nodes started on the same [`Medium`] deliver
//! accepted datagrams to each other as notifications on `#phy__ntf`.

#![allow(dead_code)]

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::time::timeout;

pub const WAIT: Duration = Duration::from_secs(5);

/// Connections of every node, keyed by node address
pub type Medium = Arc<Mutex<HashMap<i32, UnboundedSender<String>>>>;

static TRACING: Once = Once::new();

pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn medium() -> Medium {
    Arc::new(Mutex::new(HashMap::new()))
}

pub struct MockNode {
    pub port: u16,
    pub address: i32,
    frames: UnboundedReceiver<Value>,
}

impl MockNode {
    /// Start a node called `name` with `address`; `B` is known to the
    /// resolver as address 31
    pub async fn start(name: &str, address: i32, medium: &Medium) -> Self {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (frames_tx, frames) = unbounded_channel();
        let medium = Arc::clone(medium);
        let name = name.to_string();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let (push_tx, mut push_rx) = unbounded_channel::<String>();
                medium.lock().insert(address, push_tx);

                let (read, mut write) = stream.into_split();
                let mut lines = BufReader::new(read).lines();
                loop {
                    tokio::select! {
                        line = lines.next_line() => match line {
                            Ok(Some(line)) => {
                                let Ok(frame) = serde_json::from_str::<Value>(&line) else {
                                    continue;
                                };
                                for reply in handle(&name, address, &medium, &frame) {
                                    let text = format!("{}\n", reply);
                                    if write.write_all(text.as_bytes()).await.is_err() {
                                        break;
                                    }
                                }
                                let _ = frames_tx.send(frame);
                            }
                            _ => break,
                        },
                        pushed = push_rx.recv() => match pushed {
                            Some(text) => {
                                let text = format!("{}\n", text);
                                if write.write_all(text.as_bytes()).await.is_err() {
                                    break;
                                }
                            }
                            None => break,
                        },
                    }
                }
            }
        });

        Self {
            port,
            address,
            frames,
        }
    }

    /// Next `send` frame's message
    pub async fn next_message(&mut self) -> Value {
        loop {
            let frame = timeout(WAIT, self.frames.recv())
                .await
                .expect("timed out waiting for a frame")
                .expect("node stopped");
            if frame["action"] == "send" {
                return frame["message"].clone();
            }
        }
    }

    /// Messages already received, without waiting
    pub fn drain_messages(&mut self) -> Vec<Value> {
        let mut messages = Vec::new();
        while let Ok(frame) = self.frames.try_recv() {
            if frame["action"] == "send" {
                messages.push(frame["message"].clone());
            }
        }
        messages
    }
}

const SERVICES: &[(&str, &str)] = &[
    ("org.arl.unet.Services.PHYSICAL", "phy"),
    ("org.arl.unet.Services.DATAGRAM", "phy"),
    ("org.arl.unet.Services.NODE_INFO", "node"),
    ("org.arl.unet.Services.ADDRESS_RESOLUTION", "arp"),
];

fn provider(service: &Value) -> Option<&'static str> {
    SERVICES
        .iter()
        .find(|(s, _)| service.as_str() == Some(*s))
        .map(|(_, agent)| *agent)
}

fn handle(name: &str, address: i32, medium: &Medium, frame: &Value) -> Vec<Value> {
    let id = frame["id"].clone();
    match frame["action"].as_str() {
        Some("agentForService") => vec![json!({
            "id": id,
            "inResponseTo": "agentForService",
            "agentID": provider(&frame["service"]),
        })],
        Some("agentsForService") => {
            let agents: Vec<&str> = provider(&frame["service"]).into_iter().collect();
            vec![json!({"id": id, "inResponseTo": "agentsForService", "agentIDs": agents})]
        }
        Some("send") => {
            let msg = &frame["message"];
            let data = &msg["data"];
            match (msg["clazz"].as_str(), data["recipient"].as_str()) {
                (Some("org.arl.unet.DatagramReq"), Some("phy")) => {
                    transmit(name, address, medium, data);
                    vec![envelope(reply(msg, "org.arl.fjage.Message", "AGREE", json!({})))]
                }
                (Some("org.arl.fjage.param.ParameterReq"), Some("node")) if data["param"] == "address" => {
                    vec![envelope(reply(
                        msg,
                        "org.arl.fjage.param.ParameterRsp",
                        "INFORM",
                        json!({"param": "org.arl.unet.nodeinfo.NodeInfoParam.address", "value": address}),
                    ))]
                }
                (Some("org.arl.unet.addr.AddressResolutionReq"), Some("arp")) => {
                    let rsp = match data["name"].as_str() {
                        Some("B") => reply(msg, "org.arl.unet.addr.AddressResolutionRsp", "INFORM", json!({"address": 31})),
                        _ => reply(msg, "org.arl.fjage.Message", "REFUSE", json!({})),
                    };
                    vec![envelope(rsp)]
                }
                _ => Vec::new(),
            }
        }
        _ => Vec::new(),
    }
}

/// Deliver a datagram to the node addressed by `req`, if it is on the medium
fn transmit(name: &str, from: i32, medium: &Medium, req: &Value) {
    let Some(to) = req["to"].as_i64() else {
        return;
    };
    let protocol = req["protocol"].as_i64().unwrap_or(0);
    let bytes: Vec<u8> = req["data"]
        .as_array()
        .map(|items| items.iter().filter_map(|v| v.as_i64()).map(|v| v as u8).collect())
        .unwrap_or_default();
    let clazz = if protocol >= 32 {
        "org.arl.unet.phy.RxFrameNtf"
    } else {
        "org.arl.unet.DatagramNtf"
    };
    let ntf = json!({
        "clazz": clazz,
        "data": {
            "msgID": gateway::message::guid(4),
            "perf": "INFORM",
            "sender": "phy",
            "recipient": "#phy__ntf",
            "from": from,
            "to": to,
            "protocol": protocol,
            "data": {"clazz": "[B", "data": STANDARD.encode(&bytes)},
        }
    });
    if let Some(peer) = medium.lock().get(&(to as i32)) {
        tracing::debug!(node = name, from, to, "Delivering datagram");
        let _ = peer.send(envelope(ntf).to_string());
    }
}

fn envelope(message: Value) -> Value {
    json!({"action": "send", "message": message})
}

fn reply(request: &Value, clazz: &str, perf: &str, extra: Value) -> Value {
    let req = &request["data"];
    let mut data = Map::new();
    data.insert("msgID".into(), json!(gateway::message::guid(4)));
    data.insert("perf".into(), json!(perf));
    data.insert("sender".into(), req["recipient"].clone());
    data.insert("recipient".into(), req["sender"].clone());
    data.insert("inReplyTo".into(), req["msgID"].clone());
    if let Value::Object(extra) = extra {
        data.extend(extra);
    }
    json!({"clazz": clazz, "data": data})
}
