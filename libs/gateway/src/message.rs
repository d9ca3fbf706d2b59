//! Message Model
//!
//! Messages exchanged with agents in the container. A message carries a
//! qualified class tag, identity/correlation headers, a performative and an
//! open bag of payload fields. Message classes are declared in a
//! process-wide registry keyed by short name so inbound messages can be
//! matched against class hierarchies.
//!
//! ## Wire form
//!
//! ```json
//! { "clazz": "org.arl.unet.DatagramReq",
//!   "data": { "msgID": "…", "perf": "REQUEST", "sender": "…",
//!             "recipient": "…", "inReplyTo": null, "to": 31, "data": [1,2,3] } }
//! ```

use crate::codec::decode_typed_arrays;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Qualified tag of the base message class
pub const BASE_CLASS: &str = "org.arl.fjage.Message";

const MSG_ID: &str = "msgID";
const PERF: &str = "perf";
const SENDER: &str = "sender";
const RECIPIENT: &str = "recipient";
const IN_REPLY_TO: &str = "inReplyTo";

/// Speech act of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Performative {
    /// Request an action to be performed
    Request,
    /// Agree to perform the requested action
    Agree,
    /// Refuse to perform the requested action
    Refuse,
    /// Failed to perform a requested or agreed action
    Failure,
    /// Notification of an event
    Inform,
    /// The answer to a query is true
    Confirm,
    /// The answer to a query is false
    Disconfirm,
    /// Query if some statement is true or false
    QueryIf,
    /// The message was not understood
    NotUnderstood,
    /// Call for proposal
    Cfp,
    /// Response to a call for proposal
    Propose,
    /// Cancel a pending request
    Cancel,
}

impl Performative {
    pub fn as_str(&self) -> &'static str {
        match self {
            Performative::Request => "REQUEST",
            Performative::Agree => "AGREE",
            Performative::Refuse => "REFUSE",
            Performative::Failure => "FAILURE",
            Performative::Inform => "INFORM",
            Performative::Confirm => "CONFIRM",
            Performative::Disconfirm => "DISCONFIRM",
            Performative::QueryIf => "QUERY_IF",
            Performative::NotUnderstood => "NOT_UNDERSTOOD",
            Performative::Cfp => "CFP",
            Performative::Propose => "PROPOSE",
            Performative::Cancel => "CANCEL",
        }
    }
}

impl fmt::Display for Performative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Performative {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        serde_json::from_value(Value::String(s.to_string())).map_err(|_| ())
    }
}

/// Generate a random id of `blocks` groups of four hex digits
pub fn guid(blocks: usize) -> String {
    (0..blocks)
        .map(|_| format!("{:04x}", rand::random::<u16>()))
        .collect()
}

/// Text after the last `.` of a qualified name
pub fn short_name(qualified: &str) -> &str {
    qualified.rsplit('.').next().unwrap_or(qualified)
}

static CLASS_REGISTRY: Lazy<RwLock<HashMap<String, Arc<MessageClass>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// A declared message class
#[derive(Debug)]
pub struct MessageClass {
    name: String,
    parent: Option<Arc<MessageClass>>,
}

impl MessageClass {
    /// Declare a class derived from the base message.
    ///
    /// Declaring a short name that already exists returns the existing class.
    pub fn declare(name: &str) -> Arc<MessageClass> {
        Self::register(name, None)
    }

    /// Declare a class derived from `parent`
    pub fn declare_with_parent(name: &str, parent: &Arc<MessageClass>) -> Arc<MessageClass> {
        Self::register(name, Some(Arc::clone(parent)))
    }

    fn register(name: &str, parent: Option<Arc<MessageClass>>) -> Arc<MessageClass> {
        let short = short_name(name).to_string();
        if let Some(existing) = CLASS_REGISTRY.read().get(&short) {
            return Arc::clone(existing);
        }
        let mut registry = CLASS_REGISTRY.write();
        let class = registry.entry(short).or_insert_with(|| {
            debug!(class = name, "Declared message class");
            Arc::new(MessageClass {
                name: name.to_string(),
                parent,
            })
        });
        Arc::clone(class)
    }

    /// Look up a declared class by short or qualified name
    pub fn lookup(name: &str) -> Option<Arc<MessageClass>> {
        CLASS_REGISTRY.read().get(short_name(name)).cloned()
    }

    /// Qualified name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn short_name(&self) -> &str {
        short_name(&self.name)
    }

    pub fn parent(&self) -> Option<&Arc<MessageClass>> {
        self.parent.as_ref()
    }

    /// True if this class is `other` or derives from it
    pub fn is_subclass_of(&self, other: &MessageClass) -> bool {
        if other.name == BASE_CLASS {
            return true;
        }
        let mut current = Some(self);
        while let Some(class) = current {
            if class.name == other.name {
                return true;
            }
            current = class.parent.as_deref();
        }
        false
    }

    /// A fresh message of this class
    pub fn message(&self) -> Message {
        Message::of_class(&self.name)
    }
}

/// A message exchanged with agents
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    clazz: String,
    pub msg_id: String,
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub perf: Option<Performative>,
    pub in_reply_to: Option<String>,
    fields: Map<String, Value>,
}

impl Default for Message {
    fn default() -> Self {
        Self::new()
    }
}

impl Message {
    /// An empty message of the base class
    pub fn new() -> Self {
        Self::of_class(BASE_CLASS)
    }

    /// An empty message with the given qualified class tag
    pub fn of_class(clazz: &str) -> Self {
        Self {
            clazz: clazz.to_string(),
            msg_id: guid(4),
            sender: None,
            recipient: None,
            perf: None,
            in_reply_to: None,
            fields: Map::new(),
        }
    }

    /// A response to `request`, addressed back to its sender
    pub fn reply_to(request: &Message, perf: Performative) -> Self {
        Self {
            recipient: request.sender.clone(),
            in_reply_to: Some(request.msg_id.clone()),
            perf: Some(perf),
            ..Self::new()
        }
    }

    /// A response of a specific class to `request`
    pub fn reply_of_class(clazz: &str, request: &Message, perf: Performative) -> Self {
        Self {
            clazz: clazz.to_string(),
            ..Self::reply_to(request, perf)
        }
    }

    /// Qualified class tag
    pub fn clazz(&self) -> &str {
        &self.clazz
    }

    pub fn short_name(&self) -> &str {
        short_name(&self.clazz)
    }

    /// Declared class for this message's tag, if any
    pub fn class(&self) -> Option<Arc<MessageClass>> {
        MessageClass::lookup(&self.clazz)
    }

    /// True if the message is of `class` or one of its subclasses
    pub fn is_instance_of(&self, class: &MessageClass) -> bool {
        if self.clazz == class.name() || class.name() == BASE_CLASS {
            return true;
        }
        match self.class() {
            Some(own) if own.name() == self.clazz => own.is_subclass_of(class),
            _ => false,
        }
    }

    pub fn with_perf(mut self, perf: Performative) -> Self {
        self.perf = Some(perf);
        self
    }

    pub fn with_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    /// Builder form of [`Message::set`]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Set a field. Header names (`msgID`, `perf`, ...) update the header.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
        self.apply_field(key.to_string(), value.into());
        self
    }

    /// Payload field by name
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key).filter(|v| !v.is_null())
    }

    /// Payload field converted to `T`
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn has(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    fn apply_field(&mut self, key: String, value: Value) {
        match key.as_str() {
            MSG_ID => {
                if let Some(id) = value.as_str() {
                    self.msg_id = id.to_string();
                }
            }
            PERF => self.perf = value.as_str().and_then(|s| s.parse().ok()),
            SENDER => self.sender = value.as_str().map(str::to_string),
            RECIPIENT => self.recipient = value.as_str().map(str::to_string),
            IN_REPLY_TO => self.in_reply_to = value.as_str().map(str::to_string),
            _ => {
                self.fields.insert(key, value);
            }
        }
    }

    /// The `data` object of the wire envelope
    fn data_value(&self) -> Value {
        let mut data = Map::new();
        data.insert(MSG_ID.to_string(), Value::String(self.msg_id.clone()));
        if let Some(perf) = self.perf {
            data.insert(PERF.to_string(), Value::String(perf.as_str().to_string()));
        }
        data.insert(SENDER.to_string(), opt_string(&self.sender));
        data.insert(RECIPIENT.to_string(), opt_string(&self.recipient));
        data.insert(IN_REPLY_TO.to_string(), opt_string(&self.in_reply_to));
        for (key, value) in &self.fields {
            if key.starts_with("__") {
                continue;
            }
            data.insert(key.clone(), value.clone());
        }
        Value::Object(data)
    }

    /// Wire envelope as a JSON value
    pub fn to_value(&self) -> Value {
        let mut envelope = Map::new();
        envelope.insert("clazz".to_string(), Value::String(self.clazz.clone()));
        envelope.insert("data".to_string(), self.data_value());
        Value::Object(envelope)
    }

    /// Wire envelope as JSON text
    pub fn serialize(&self) -> String {
        self.to_value().to_string()
    }

    /// Parse a wire envelope from text; `None` if malformed
    pub fn deserialize(text: &str) -> Option<Message> {
        match serde_json::from_str::<Value>(text) {
            Ok(mut value) => {
                decode_typed_arrays(&mut value);
                Self::from_value(value)
            }
            Err(e) => {
                warn!(error = %e, "Discarding malformed message JSON");
                None
            }
        }
    }

    /// Build a message from an already-parsed envelope; `None` if malformed
    pub fn from_value(value: Value) -> Option<Message> {
        let Value::Object(mut envelope) = value else {
            warn!("Discarding message envelope that is not an object");
            return None;
        };
        let clazz = match envelope.remove("clazz") {
            Some(Value::String(clazz)) => clazz,
            _ => {
                warn!("Discarding message envelope without clazz");
                return None;
            }
        };
        if MessageClass::lookup(&clazz).is_none() {
            debug!(class = %clazz, "Unknown message class, using base message");
        }
        let mut msg = Message::of_class(&clazz);
        if let Some(Value::Object(data)) = envelope.remove("data") {
            for (key, value) in data {
                msg.apply_field(key, value);
            }
        }
        Some(msg)
    }
}

fn opt_string(value: &Option<String>) -> Value {
    value
        .as_ref()
        .map(|s| Value::String(s.clone()))
        .unwrap_or(Value::Null)
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        let mut elided = false;
        for (key, value) in &self.fields {
            if key.starts_with("__") {
                continue;
            }
            match value {
                Value::Object(_) | Value::Array(_) => elided = true,
                Value::String(s) => parts.push(format!("{}:{}", key, s)),
                other => parts.push(format!("{}:{}", key, other)),
            }
        }
        let mut body = parts.join(" ");
        if elided {
            body.push_str(" ...");
        }
        let perf = self.perf.map(|p| p.as_str()).unwrap_or("");
        write!(f, "{}:{}[{}]", self.short_name(), perf, body.trim_start())
    }
}
