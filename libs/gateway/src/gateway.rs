//! Gateway
//!
//! The client-side agent that joins a remote container. It owns one
//! [`Connector`], correlates directory requests with their answers, routes
//! inbound messages to listeners, pending `receive` calls or a bounded queue,
//! and answers the container's own directory queries about this gateway.
//!
//! ## Inbound dispatch
//!
//! ```text
//! frame ──▶ id matches pending directory request? ──yes──▶ complete it
//!             │ no
//!             ▼
//!        action == "send"? ──yes──▶ addressed to us or a subscribed topic?
//!             │ no                       │ yes
//!             ▼                          ▼
//!      answer directory query     message listeners ▶ receive waiters ▶ queue
//! ```
//!
//! Locks are never held across an `.await` or while user callbacks run.

use crate::agent_id::AgentId;
use crate::codec::decode_typed_arrays;
use crate::config::{GatewayAddress, GatewayConfig};
use crate::connector::{Connector, ConnectorOptions, ConnectorState, ListenerId};
use crate::filter::{Filter, ReceiveTimeout};
use crate::message::{guid, Message, Performative};
use crate::protocol::{self, Frame};
use crate::{registry, GatewayError, Result};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Sees every inbound message for this gateway first; `true` consumes it
pub type MessageListener = Arc<dyn Fn(&Message) -> bool + Send + Sync>;
/// Observes gateway events of one kind
pub type EventListener = Arc<dyn Fn(&GatewayEvent) + Send + Sync>;

/// Kinds of observable gateway events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Raw inbound frame text
    Rx,
    /// Inbound frame after JSON parsing
    RxParsed,
    /// Inbound message, before routing
    RxMessage,
    /// Outbound message, after stamping
    TxMessage,
    /// Link up/down
    Connection,
}

#[derive(Debug, Clone)]
pub enum GatewayEvent {
    Rx(String),
    RxParsed(Value),
    RxMessage(Message),
    TxMessage(Message),
    Connection(bool),
}

impl GatewayEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            GatewayEvent::Rx(_) => EventKind::Rx,
            GatewayEvent::RxParsed(_) => EventKind::RxParsed,
            GatewayEvent::RxMessage(_) => EventKind::RxMessage,
            GatewayEvent::TxMessage(_) => EventKind::TxMessage,
            GatewayEvent::Connection(_) => EventKind::Connection,
        }
    }
}

struct Waiter {
    id: u64,
    filter: Filter,
    tx: oneshot::Sender<Message>,
}

#[derive(Default)]
struct Inbox {
    queue: VecDeque<Message>,
    /// Count of messages ever enqueued; detects arrivals between scans
    enqueued: u64,
    waiters: Vec<Waiter>,
    next_waiter: u64,
}

impl Inbox {
    fn enqueue(&mut self, msg: Message, capacity: usize) {
        while self.queue.len() >= capacity {
            if let Some(evicted) = self.queue.pop_front() {
                debug!(msg_id = %evicted.msg_id, "Queue full, evicting oldest message");
            }
        }
        self.queue.push_back(msg);
        self.enqueued += 1;
    }

    fn take_waiter(&mut self, id: u64) -> Option<Waiter> {
        let pos = self.waiters.iter().position(|w| w.id == id)?;
        Some(self.waiters.remove(pos))
    }
}

/// Removes a registered waiter when its `receive` call ends or is cancelled
struct WaiterGuard<'a> {
    inner: &'a GatewayInner,
    id: u64,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.inner.inbox.lock().take_waiter(self.id);
    }
}

pub(crate) struct GatewayInner {
    config: GatewayConfig,
    address: GatewayAddress,
    name: String,
    connector: Connector,
    closed: AtomicBool,
    inbox: Mutex<Inbox>,
    pending: Mutex<HashMap<String, oneshot::Sender<Frame>>>,
    subscriptions: Mutex<HashSet<String>>,
    message_listeners: Mutex<Vec<(ListenerId, MessageListener)>>,
    event_listeners: Mutex<Vec<(ListenerId, EventKind, EventListener)>>,
}

impl GatewayInner {
    pub(crate) fn url(&self) -> &url::Url {
        self.connector.url()
    }

    fn emit(&self, kind: EventKind, make: impl FnOnce() -> GatewayEvent) {
        let listeners: Vec<EventListener> = self
            .event_listeners
            .lock()
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .map(|(_, _, l)| Arc::clone(l))
            .collect();
        if listeners.is_empty() {
            return;
        }
        let event = make();
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                warn!(?kind, "Event listener panicked");
            }
        }
    }

    fn write_frame(&self, frame: &Frame) -> bool {
        self.connector.write(frame.to_json())
    }

    fn on_connection(&self, up: bool) {
        info!(gateway = %self.name, url = %self.url(), up, "Connection state changed");
        if up {
            self.write_frame(&Frame::alive(true));
            if self.config.announce_subscriptions {
                self.announce_subscriptions();
            }
        } else if !self.config.keep_alive || self.connector.state() == ConnectorState::Closed {
            // No reconnection follows, so directory calls stop waiting
            let abandoned = std::mem::take(&mut *self.pending.lock());
            if !abandoned.is_empty() {
                debug!(gateway = %self.name, count = abandoned.len(), "Abandoned directory requests");
            }
        }
        self.emit(EventKind::Connection, || GatewayEvent::Connection(up));
    }

    fn announce_subscriptions(&self) {
        let mut ids = vec![self.name.clone()];
        ids.extend(self.subscriptions.lock().iter().cloned());
        let frame = Frame {
            action: Some(protocol::ACTION_WANTS_MESSAGES_FOR.to_string()),
            agent_ids: Some(ids),
            ..Default::default()
        };
        self.write_frame(&frame);
    }

    fn on_frame(&self, text: String) {
        self.emit(EventKind::Rx, || GatewayEvent::Rx(text.clone()));

        let mut value: Value = match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(e) => {
                warn!(gateway = %self.name, error = %e, "Dropping malformed frame");
                return;
            }
        };
        decode_typed_arrays(&mut value);
        self.emit(EventKind::RxParsed, || GatewayEvent::RxParsed(value.clone()));

        let frame: Frame = match serde_json::from_value(value) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(gateway = %self.name, error = %e, "Dropping frame with unexpected shape");
                return;
            }
        };

        let waiter = frame
            .id
            .as_ref()
            .and_then(|id| self.pending.lock().remove(id));
        if let Some(tx) = waiter {
            let _ = tx.send(frame);
            return;
        }

        match frame.action.as_deref() {
            Some(protocol::ACTION_SEND) => match frame.message {
                Some(message) => self.on_message(message),
                None => debug!(gateway = %self.name, "Send frame without message"),
            },
            Some(action) => self.answer_directory(action, &frame),
            None => debug!(gateway = %self.name, "Ignoring frame without action"),
        }
    }

    fn on_message(&self, value: Value) {
        let Some(msg) = Message::from_value(value) else {
            return;
        };
        self.emit(EventKind::RxMessage, || GatewayEvent::RxMessage(msg.clone()));

        let for_us = match msg.recipient.as_deref() {
            Some(recipient) => {
                recipient == self.name || self.subscriptions.lock().contains(recipient)
            }
            None => false,
        };
        if !for_us {
            debug!(gateway = %self.name, recipient = ?msg.recipient, "Ignoring message for someone else");
            return;
        }

        let listeners: Vec<MessageListener> = self
            .message_listeners
            .lock()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener(&msg))) {
                Ok(true) => return,
                Ok(false) => {}
                Err(_) => warn!(msg_id = %msg.msg_id, "Message listener panicked"),
            }
        }

        self.deliver(msg);
    }

    /// Hand `msg` to the first matching waiter, else queue it
    fn deliver(&self, mut msg: Message) {
        let mut checked: HashSet<u64> = HashSet::new();
        loop {
            let candidates: Vec<(u64, Filter)> = {
                let mut inbox = self.inbox.lock();
                let fresh: Vec<(u64, Filter)> = inbox
                    .waiters
                    .iter()
                    .filter(|w| !checked.contains(&w.id))
                    .map(|w| (w.id, w.filter.clone()))
                    .collect();
                if fresh.is_empty() {
                    inbox.enqueue(msg, self.config.queue_size);
                    return;
                }
                fresh
            };

            for (id, filter) in candidates {
                checked.insert(id);
                if !filter.matches(&msg) {
                    continue;
                }
                let waiter = self.inbox.lock().take_waiter(id);
                if let Some(waiter) = waiter {
                    match waiter.tx.send(msg) {
                        Ok(()) => return,
                        Err(returned) => msg = returned,
                    }
                }
            }
        }
    }

    /// Remove and return the first queued message matching `filter`, along
    /// with the enqueue count observed by the scan
    fn take_queued(&self, filter: &Filter) -> (u64, Option<Message>) {
        if !filter.is_user_code() {
            let mut inbox = self.inbox.lock();
            let seen = inbox.enqueued;
            let found = inbox
                .queue
                .iter()
                .position(|m| filter.matches(m))
                .and_then(|pos| inbox.queue.remove(pos));
            return (seen, found);
        }

        loop {
            let (seen, snapshot): (u64, Vec<Message>) = {
                let inbox = self.inbox.lock();
                (inbox.enqueued, inbox.queue.iter().cloned().collect())
            };
            let Some(target) = snapshot.iter().find(|m| filter.matches(m)) else {
                return (seen, None);
            };
            let mut inbox = self.inbox.lock();
            if let Some(pos) = inbox.queue.iter().position(|m| m.msg_id == target.msg_id) {
                return (seen, inbox.queue.remove(pos));
            }
        }
    }

    fn answer_directory(&self, action: &str, request: &Frame) {
        let mut rsp = Frame::response_to(action, request.id.clone());
        match action {
            protocol::ACTION_AGENTS => rsp.agent_ids = Some(vec![self.name.clone()]),
            protocol::ACTION_CONTAINS_AGENT => {
                rsp.answer = Some(request.agent_id.as_deref() == Some(self.name.as_str()))
            }
            protocol::ACTION_SERVICES => rsp.services = Some(Vec::new()),
            protocol::ACTION_AGENT_FOR_SERVICE => rsp.agent_id = Some(String::new()),
            protocol::ACTION_AGENTS_FOR_SERVICE => rsp.agent_ids = Some(Vec::new()),
            other => {
                debug!(gateway = %self.name, action = other, "Ignoring unknown action");
                return;
            }
        }
        debug!(gateway = %self.name, action, "Answering directory query");
        self.write_frame(&rsp);
    }

    /// Send a directory request and wait for the frame answering it
    async fn directory_request(&self, mut frame: Frame) -> Option<Frame> {
        let id = guid(8);
        let action = frame.action.clone().unwrap_or_default();
        frame.id = Some(id.clone());

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id.clone(), tx);
        if !self.write_frame(&frame) {
            self.pending.lock().remove(&id);
            debug!(gateway = %self.name, action = %action, "Directory request not sent");
            return None;
        }

        let timeout = self.config.directory_timeout();
        let result = tokio::time::timeout(timeout, rx).await;
        self.pending.lock().remove(&id);
        match result {
            Ok(Ok(frame)) => Some(frame),
            Ok(Err(_)) => None,
            Err(_) => {
                warn!(
                    gateway = %self.name,
                    action = %action,
                    timeout_ms = timeout.as_millis() as u64,
                    "Directory request timed out"
                );
                None
            }
        }
    }

    fn directory_failure<T>(&self, action: &str, what: &str, empty: T) -> Result<T> {
        warn!(gateway = %self.name, action, "Unable to {}", what);
        if self.config.return_null_on_failure {
            Ok(empty)
        } else {
            Err(GatewayError::directory(action, format!("unable to {}", what)))
        }
    }
}

/// Handle to an open gateway; clones share the same gateway.
///
/// Inbound messages already queued stay queued across reconnects; call
/// [`flush`](Gateway::flush) to discard them. Outbound writes made while
/// the link is down are dropped.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

impl Gateway {
    /// Open the gateway for `config`'s address, or return the one already
    /// open for it. Must be called within a tokio runtime.
    pub fn open(config: GatewayConfig) -> Result<Gateway> {
        config.validate()?;
        let address = config.address();
        registry::get_or_create(&address, || Self::create(config))
    }

    /// Open a gateway from a URL-shaped address such as `tcp://host:1100`
    pub fn connect(url: &str) -> Result<Gateway> {
        Self::open(GatewayConfig::from_url(url)?)
    }

    fn create(config: GatewayConfig) -> Result<Gateway> {
        let url = config.url()?;
        let connector = Connector::new(url, ConnectorOptions::from(&config))?;
        let inner = Arc::new(GatewayInner {
            address: config.address(),
            name: format!("RustGW-{}", guid(4)),
            config,
            connector,
            closed: AtomicBool::new(false),
            inbox: Mutex::new(Inbox::default()),
            pending: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(HashSet::new()),
            message_listeners: Mutex::new(Vec::new()),
            event_listeners: Mutex::new(Vec::new()),
        });

        let weak = Arc::downgrade(&inner);
        inner.connector.set_read_callback(move |text| {
            if let Some(inner) = weak.upgrade() {
                inner.on_frame(text);
            }
        });
        let weak = Arc::downgrade(&inner);
        inner.connector.add_connection_listener(move |up| {
            if let Some(inner) = weak.upgrade() {
                inner.on_connection(up);
            }
        });
        inner.connector.start()?;

        info!(gateway = %inner.name, url = %inner.url(), "Gateway opened");
        Ok(Gateway { inner })
    }

    pub(crate) fn from_inner(inner: Arc<GatewayInner>) -> Self {
        Self { inner }
    }

    /// True if both handles refer to the same gateway
    pub fn ptr_eq(a: &Gateway, b: &Gateway) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.inner.config
    }

    pub fn address(&self) -> &GatewayAddress {
        &self.inner.address
    }

    /// This gateway's own agent id
    pub fn agent_id(&self) -> AgentId {
        self.agent(&self.inner.name)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connector.is_connected()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Default timeout for `request`/`receive` calls from the configuration
    pub fn request_timeout(&self) -> Duration {
        self.inner.config.request_timeout()
    }

    /// Close the link and unregister. Pending calls resolve empty.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.connector.close();
        registry::remove(&self.inner.address, self);
        self.inner.pending.lock().clear();
        self.inner.inbox.lock().waiters.clear();
        info!(gateway = %self.inner.name, "Gateway closed");
    }

    /// Stamp `msg` with this gateway as sender and write it.
    ///
    /// A missing performative becomes REQUEST for classes ending in `Req`,
    /// INFORM otherwise. Returns false if the frame could not be queued.
    pub fn send(&self, msg: &mut Message) -> bool {
        if self.is_closed() {
            return false;
        }
        msg.sender = Some(self.inner.name.clone());
        if msg.perf.is_none() {
            msg.perf = Some(if msg.short_name().ends_with("Req") {
                Performative::Request
            } else {
                Performative::Inform
            });
        }
        self.inner
            .emit(EventKind::TxMessage, || GatewayEvent::TxMessage(msg.clone()));
        debug!(gateway = %self.inner.name, msg = %msg, recipient = ?msg.recipient, "Sending message");
        self.inner.write_frame(&Frame::send(msg.to_value()))
    }

    /// Send `msg` and wait for the message replying to it
    pub async fn request(
        &self,
        mut msg: Message,
        timeout: impl Into<ReceiveTimeout>,
    ) -> Option<Message> {
        if !self.send(&mut msg) {
            return None;
        }
        self.receive(Filter::InReplyTo(msg.msg_id), timeout).await
    }

    /// Take the first queued message matching `filter` without waiting
    pub fn try_receive(&self, filter: impl Into<Filter>) -> Option<Message> {
        self.inner.take_queued(&filter.into()).1
    }

    /// Take the first message matching `filter`, waiting up to `timeout`
    /// for one to arrive. `NonBlocking` only looks at the queue.
    pub async fn receive(
        &self,
        filter: impl Into<Filter>,
        timeout: impl Into<ReceiveTimeout>,
    ) -> Option<Message> {
        let filter = filter.into();
        let timeout = timeout.into();

        let (id, mut rx) = loop {
            let (seen, found) = self.inner.take_queued(&filter);
            if found.is_some() {
                return found;
            }
            if timeout == ReceiveTimeout::NonBlocking || self.is_closed() {
                return None;
            }
            let mut inbox = self.inner.inbox.lock();
            if inbox.enqueued != seen {
                continue;
            }
            let (tx, rx) = oneshot::channel();
            let id = inbox.next_waiter;
            inbox.next_waiter += 1;
            inbox.waiters.push(Waiter {
                id,
                filter: filter.clone(),
                tx,
            });
            break (id, rx);
        };
        let _guard = WaiterGuard {
            inner: &self.inner,
            id,
        };

        let received = match timeout {
            ReceiveTimeout::After(d) => tokio::time::timeout(d, &mut rx)
                .await
                .ok()
                .and_then(|r| r.ok()),
            ReceiveTimeout::Forever => (&mut rx).await.ok(),
            ReceiveTimeout::NonBlocking => None,
        };
        if received.is_some() {
            return received;
        }
        // A message may have been handed over just as the timer fired
        self.inner.inbox.lock().take_waiter(id);
        rx.try_recv().ok()
    }

    /// Drop every queued inbound message
    pub fn flush(&self) {
        let dropped = {
            let mut inbox = self.inner.inbox.lock();
            let n = inbox.queue.len();
            inbox.queue.clear();
            n
        };
        debug!(gateway = %self.inner.name, dropped, "Flushed inbound queue");
    }

    pub fn queue_len(&self) -> usize {
        self.inner.inbox.lock().queue.len()
    }

    /// Id for the agent called `name`
    pub fn agent(&self, name: &str) -> AgentId {
        AgentId::new(name, false, Arc::downgrade(&self.inner))
    }

    /// Id for the topic called `name`
    pub fn topic(&self, name: &str) -> AgentId {
        AgentId::new(name, true, Arc::downgrade(&self.inner))
    }

    /// Notification topic of an agent: `name[__sub]__ntf`. Topics are
    /// returned unchanged.
    pub fn notification_topic(&self, agent: &AgentId, sub: Option<&str>) -> AgentId {
        if agent.is_topic() {
            return AgentId::new(agent.name(), true, Arc::downgrade(&self.inner));
        }
        let name = match sub {
            Some(sub) => format!("{}__{}__ntf", agent.name(), sub),
            None => format!("{}__ntf", agent.name()),
        };
        self.topic(&name)
    }

    /// Receive messages published on `topic`; an agent id subscribes to
    /// its notification topic
    pub fn subscribe(&self, topic: &AgentId) -> bool {
        let topic = self.notification_topic(topic, None);
        let added = self.inner.subscriptions.lock().insert(topic.to_wire());
        debug!(gateway = %self.inner.name, topic = %topic.to_wire(), added, "Subscribed");
        if self.inner.config.announce_subscriptions {
            self.inner.announce_subscriptions();
        }
        true
    }

    pub fn unsubscribe(&self, topic: &AgentId) -> bool {
        let topic = self.notification_topic(topic, None);
        let removed = self.inner.subscriptions.lock().remove(&topic.to_wire());
        debug!(gateway = %self.inner.name, topic = %topic.to_wire(), removed, "Unsubscribed");
        if removed && self.inner.config.announce_subscriptions {
            self.inner.announce_subscriptions();
        }
        removed
    }

    pub fn subscriptions(&self) -> Vec<AgentId> {
        self.inner
            .subscriptions
            .lock()
            .iter()
            .filter_map(|wire| wire.strip_prefix('#'))
            .map(|name| self.topic(name))
            .collect()
    }

    /// Agents in the container
    pub async fn agents(&self) -> Result<Vec<AgentId>> {
        let rsp = self
            .inner
            .directory_request(Frame::request(protocol::ACTION_AGENTS, ""))
            .await;
        match rsp.and_then(|f| f.agent_ids) {
            Some(names) => Ok(names.iter().map(|n| self.agent(n)).collect()),
            None => self
                .inner
                .directory_failure(protocol::ACTION_AGENTS, "get agents", Vec::new()),
        }
    }

    /// Whether the container hosts `agent`
    pub async fn contains_agent(&self, agent: &AgentId) -> Result<bool> {
        let mut frame = Frame::request(protocol::ACTION_CONTAINS_AGENT, "");
        frame.agent_id = Some(agent.to_wire());
        match self.inner.directory_request(frame).await.and_then(|f| f.answer) {
            Some(answer) => Ok(answer),
            None => self.inner.directory_failure(
                protocol::ACTION_CONTAINS_AGENT,
                "check agent",
                false,
            ),
        }
    }

    /// Services advertised in the container
    pub async fn services(&self) -> Result<Vec<String>> {
        let rsp = self
            .inner
            .directory_request(Frame::request(protocol::ACTION_SERVICES, ""))
            .await;
        match rsp.and_then(|f| f.services) {
            Some(services) => Ok(services),
            None => self
                .inner
                .directory_failure(protocol::ACTION_SERVICES, "get services", Vec::new()),
        }
    }

    /// An agent providing `service`
    pub async fn agent_for_service(&self, service: &str) -> Result<Option<AgentId>> {
        let mut frame = Frame::request(protocol::ACTION_AGENT_FOR_SERVICE, "");
        frame.service = Some(service.to_string());
        let rsp = self.inner.directory_request(frame).await;
        match rsp.and_then(|f| f.agent_id).filter(|name| !name.is_empty()) {
            Some(name) => Ok(Some(self.agent(&name))),
            None => self.inner.directory_failure(
                protocol::ACTION_AGENT_FOR_SERVICE,
                "find agent for service",
                None,
            ),
        }
    }

    /// Every agent providing `service`
    pub async fn agents_for_service(&self, service: &str) -> Result<Vec<AgentId>> {
        let mut frame = Frame::request(protocol::ACTION_AGENTS_FOR_SERVICE, "");
        frame.service = Some(service.to_string());
        let rsp = self.inner.directory_request(frame).await;
        match rsp.and_then(|f| f.agent_ids) {
            Some(names) => Ok(names.iter().map(|n| self.agent(n)).collect()),
            None => self.inner.directory_failure(
                protocol::ACTION_AGENTS_FOR_SERVICE,
                "find agents for service",
                Vec::new(),
            ),
        }
    }

    /// Register a listener that sees inbound messages before any `receive`
    pub fn add_message_listener(
        &self,
        listener: impl Fn(&Message) -> bool + Send + Sync + 'static,
    ) -> ListenerId {
        let id = ListenerId::next();
        self.inner
            .message_listeners
            .lock()
            .push((id, Arc::new(listener)));
        id
    }

    pub fn remove_message_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.message_listeners.lock();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn add_event_listener(
        &self,
        kind: EventKind,
        listener: impl Fn(&GatewayEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        let id = ListenerId::next();
        self.inner
            .event_listeners
            .lock()
            .push((id, kind, Arc::new(listener)));
        id
    }

    pub fn remove_event_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.event_listeners.lock();
        let before = listeners.len();
        listeners.retain(|(lid, _, _)| *lid != id);
        listeners.len() != before
    }

    /// Observe link up (`true`) and down (`false`) transitions
    pub fn add_connection_listener(
        &self,
        listener: impl Fn(bool) + Send + Sync + 'static,
    ) -> ListenerId {
        self.add_event_listener(EventKind::Connection, move |event| {
            if let GatewayEvent::Connection(up) = event {
                listener(*up);
            }
        })
    }

    pub fn remove_connection_listener(&self, id: ListenerId) -> bool {
        self.remove_event_listener(id)
    }
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("name", &self.inner.name)
            .field("url", &self.inner.url().as_str())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg_for(recipient: &str, n: i64) -> Message {
        Message::of_class("org.example.gw.SampleNtf")
            .with_recipient(recipient)
            .with("n", n)
    }

    #[test]
    fn test_inbox_evicts_oldest() {
        let mut inbox = Inbox::default();
        for n in 0..5 {
            inbox.enqueue(msg_for("gw", n), 3);
        }
        let kept: Vec<i64> = inbox
            .queue
            .iter()
            .filter_map(|m| m.get_as::<i64>("n"))
            .collect();
        assert_eq!(kept, vec![2, 3, 4]);
        assert_eq!(inbox.enqueued, 5);
    }

    #[test]
    fn test_take_waiter_once() {
        let mut inbox = Inbox::default();
        let (tx, _rx) = oneshot::channel();
        inbox.waiters.push(Waiter {
            id: 7,
            filter: Filter::Any,
            tx,
        });
        assert!(inbox.take_waiter(7).is_some());
        assert!(inbox.take_waiter(7).is_none());
    }

    #[test]
    fn test_event_kind() {
        assert_eq!(GatewayEvent::Connection(true).kind(), EventKind::Connection);
        assert_eq!(GatewayEvent::Rx(String::new()).kind(), EventKind::Rx);
    }
}
