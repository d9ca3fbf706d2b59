//! Scripted in-process container for integration tests.
//!
//! Listens on 127.0.0.1:0, records every frame the gateway writes and
//! answers through a handler closure. Uses real sockets, no mocked connector.

#![allow(dead_code)]

use serde_json::{json, Map, Value};
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::time::timeout;

pub const WAIT: Duration = Duration::from_secs(5);

pub type Handler = Arc<dyn Fn(&Value) -> Vec<Value> + Send + Sync>;

enum Control {
    Line(String),
    Drop,
}

pub struct MockContainer {
    pub port: u16,
    frames: UnboundedReceiver<Value>,
    control: UnboundedSender<Control>,
}

static TRACING: Once = Once::new();

/// Install a test subscriber honouring RUST_LOG
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

impl MockContainer {
    pub async fn start(handler: Handler) -> Self {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (frames_tx, frames) = unbounded_channel();
        let (control, mut control_rx) = unbounded_channel::<Control>();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let (read, mut write) = stream.into_split();
                let mut lines = BufReader::new(read).lines();
                loop {
                    tokio::select! {
                        line = lines.next_line() => match line {
                            Ok(Some(line)) => {
                                let Ok(frame) = serde_json::from_str::<Value>(&line) else {
                                    continue;
                                };
                                for reply in handler(&frame) {
                                    let text = format!("{}\n", reply);
                                    if write.write_all(text.as_bytes()).await.is_err() {
                                        break;
                                    }
                                }
                                let _ = frames_tx.send(frame);
                            }
                            _ => break,
                        },
                        control = control_rx.recv() => match control {
                            Some(Control::Line(text)) => {
                                let text = format!("{}\n", text);
                                if write.write_all(text.as_bytes()).await.is_err() {
                                    break;
                                }
                            }
                            Some(Control::Drop) => break,
                            None => return,
                        },
                    }
                }
            }
        });

        Self {
            port,
            frames,
            control,
        }
    }

    /// Container that knows the standard test directory and agents
    pub async fn standard() -> Self {
        Self::start(Arc::new(standard_handler())).await
    }

    pub fn url(&self) -> String {
        format!("tcp://127.0.0.1:{}", self.port)
    }

    /// Write a raw line to the connected gateway
    pub fn push(&self, text: impl Into<String>) {
        let _ = self.control.send(Control::Line(text.into()));
    }

    /// Deliver a message frame to the gateway
    pub fn push_message(&self, message: Value) {
        self.push(json!({"action": "send", "message": message}).to_string());
    }

    /// Drop the current connection; the container keeps listening
    pub fn drop_connection(&self) {
        let _ = self.control.send(Control::Drop);
    }

    pub async fn next_frame(&mut self) -> Value {
        timeout(WAIT, self.frames.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("container stopped")
    }

    /// Next frame satisfying `pred`, skipping others
    pub async fn frame_where(&mut self, pred: impl Fn(&Value) -> bool) -> Value {
        loop {
            let frame = self.next_frame().await;
            if pred(&frame) {
                return frame;
            }
        }
    }

    /// Next `send` frame's message
    pub async fn next_message(&mut self) -> Value {
        let frame = self.frame_where(|f| f["action"] == "send").await;
        frame["message"].clone()
    }

    /// Frames already received, without waiting
    pub fn drain(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.frames.try_recv() {
            frames.push(frame);
        }
        frames
    }
}

/// Message envelope replying to `request` with `perf` and extra `data`
pub fn reply(request: &Value, clazz: &str, perf: &str, extra: Value) -> Value {
    let req = &request["data"];
    let mut data = Map::new();
    data.insert("msgID".into(), json!(format!("rsp-{}", req["msgID"].as_str().unwrap_or(""))));
    data.insert("perf".into(), json!(perf));
    data.insert("sender".into(), req["recipient"].clone());
    data.insert("recipient".into(), req["sender"].clone());
    data.insert("inReplyTo".into(), req["msgID"].clone());
    if let Value::Object(extra) = extra {
        data.extend(extra);
    }
    json!({"clazz": clazz, "data": data})
}

/// Unsolicited message envelope
pub fn notification(clazz: &str, sender: &str, recipient: &str, extra: Value) -> Value {
    let mut data = Map::new();
    data.insert("msgID".into(), json!(gateway::message::guid(4)));
    data.insert("perf".into(), json!("INFORM"));
    data.insert("sender".into(), json!(sender));
    data.insert("recipient".into(), json!(recipient));
    if let Value::Object(extra) = extra {
        data.extend(extra);
    }
    json!({"clazz": clazz, "data": data})
}

pub const PHY_PREFIX: &str = "org.arl.unet.phy.Physical.";
pub const PARAMETER_RSP: &str = "org.arl.fjage.param.ParameterRsp";

/// Directory with agents `phy` and `link`; `phy` provides PHYSICAL and
/// answers parameter requests. Unknown services get no answer at all.
pub fn standard_handler() -> impl Fn(&Value) -> Vec<Value> + Send + Sync {
    let params = Arc::new(parking_lot::Mutex::new(Map::from_iter([
        (format!("{}MTU", PHY_PREFIX), json!(64)),
        (format!("{}powerLevel", PHY_PREFIX), json!(-10)),
        (format!("{}maxPowerLevel", PHY_PREFIX), json!(0)),
        ("org.arl.fjage.shell.name".to_string(), json!("phy")),
    ])));

    move |frame: &Value| {
        let id = frame["id"].clone();
        match frame["action"].as_str() {
            Some("agents") => vec![json!({"id": id, "inResponseTo": "agents", "agentIDs": ["phy", "link"]})],
            Some("containsAgent") => {
                let answer = matches!(frame["agentID"].as_str(), Some("phy") | Some("link"));
                vec![json!({"id": id, "inResponseTo": "containsAgent", "answer": answer})]
            }
            Some("services") => vec![json!({"id": id, "inResponseTo": "services", "services": ["org.arl.unet.Services.PHYSICAL"]})],
            Some("agentForService") if frame["service"] == "org.arl.unet.Services.PHYSICAL" => {
                vec![json!({"id": id, "inResponseTo": "agentForService", "agentID": "phy"})]
            }
            Some("agentsForService") if frame["service"] == "org.arl.unet.Services.PHYSICAL" => {
                vec![json!({"id": id, "inResponseTo": "agentsForService", "agentIDs": ["phy"]})]
            }
            Some("send") => {
                let msg = &frame["message"];
                let is_param = msg["clazz"] == "org.arl.fjage.param.ParameterReq";
                if is_param && msg["data"]["recipient"] == "phy" {
                    vec![json!({"action": "send", "message": answer_parameters(msg, &params)})]
                } else {
                    Vec::new()
                }
            }
            _ => Vec::new(),
        }
    }
}

fn qualified(params: &Map<String, Value>, name: &str) -> Option<String> {
    let short = name.rsplit('.').next().unwrap_or(name);
    params
        .keys()
        .find(|k| k.rsplit('.').next() == Some(short))
        .cloned()
}

fn answer_parameters(msg: &Value, params: &parking_lot::Mutex<Map<String, Value>>) -> Value {
    let data = &msg["data"];
    let mut params = params.lock();
    let all_keys: Vec<String> = params.keys().cloned().collect();

    let mut apply = |name: &str, value: Option<&Value>| -> Option<(String, Value)> {
        let key = qualified(&params, name)?;
        if let Some(value) = value {
            // powerLevel is clamped to maxPowerLevel
            let value = match (key.ends_with(".powerLevel"), value.as_i64()) {
                (true, Some(v)) if v > 0 => json!(0),
                _ => value.clone(),
            };
            params.insert(key.clone(), value);
        }
        params.get(&key).map(|v| (key, v.clone()))
    };

    if let Some(name) = data["param"].as_str() {
        return match apply(name, data.get("value")) {
            Some((key, value)) => reply(msg, PARAMETER_RSP, "INFORM", json!({"param": key, "value": value})),
            None => reply(msg, PARAMETER_RSP, "REFUSE", json!({})),
        };
    }

    let requested: Vec<(String, Option<Value>)> = match data["requests"].as_array() {
        Some(requests) => requests
            .iter()
            .filter_map(|r| Some((r["param"].as_str()?.to_string(), r.get("value").cloned())))
            .collect(),
        None => all_keys.into_iter().map(|k| (k, None)).collect(),
    };
    let mut values = Map::new();
    for (name, value) in &requested {
        if let Some((key, value)) = apply(name, value.as_ref()) {
            values.insert(key, value);
        }
    }
    let mut entries = values.into_iter();
    match entries.next() {
        Some((first_key, first_value)) => {
            let rest: Map<String, Value> = entries.collect();
            reply(
                msg,
                PARAMETER_RSP,
                "INFORM",
                json!({"param": first_key, "value": first_value, "values": rest}),
            )
        }
        None => reply(msg, PARAMETER_RSP, "REFUSE", json!({})),
    }
}
