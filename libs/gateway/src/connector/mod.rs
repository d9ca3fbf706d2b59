//! Connector
//!
//! Owns the byte-stream link to the container. A single background task per
//! connector dials, reads, writes and reconnects; callers talk to it through
//! a command channel and observe it through a read callback and connection
//! listeners.
//!
//! ## Lifecycle
//!
//! ```text
//! Connecting ──dial ok──▶ Open ──drop──▶ (keep_alive) wait reconnect_delay ──▶ Connecting
//!     │                    │                         │
//!     └─dial failed (first)┴── close() ──────────────┴────────────────────────▶ Closed
//! ```
//!
//! Writes issued while first connecting are held and flushed in order as
//! soon as the link opens, before listeners hear about it. Writes issued
//! after a link drops are discarded; callers that retry must re-submit once
//! the link is back. Listeners hear `true` on every up transition and
//! `false` once on every down transition.

pub mod framing;
mod tcp;
mod ws;


pub use framing::LineFramer;

use crate::config::{GatewayConfig, Scheme};
use crate::protocol::Frame;
use crate::{GatewayError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Handle returned when registering a listener; used to remove it again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    pub(crate) fn next() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Receives every inbound frame as text
pub type ReadCallback = Arc<dyn Fn(String) + Send + Sync>;
/// Receives link up (`true`) and down (`false`) transitions
pub type ConnectionListener = Arc<dyn Fn(bool) + Send + Sync>;

/// A connected byte-stream flavour
#[async_trait]
pub(crate) trait Link: Send {
    /// Send one frame; the link appends the terminator
    async fn write_frame(&mut self, text: &str) -> Result<()>;

    /// Next inbound frame, `None` once the peer has closed. Cancel-safe.
    async fn read_frame(&mut self) -> Result<Option<String>>;

    async fn shutdown(&mut self);
}

/// Link behaviour knobs
#[derive(Debug, Clone)]
pub struct ConnectorOptions {
    pub keep_alive: bool,
    pub reconnect_delay: Duration,
    pub connect_timeout: Duration,
}

impl Default for ConnectorOptions {
    fn default() -> Self {
        Self {
            keep_alive: true,
            reconnect_delay: Duration::from_millis(crate::config::DEFAULT_RECONNECT_DELAY_MS),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&GatewayConfig> for ConnectorOptions {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            keep_alive: config.keep_alive,
            reconnect_delay: config.reconnect_delay(),
            ..Default::default()
        }
    }
}

/// Connector lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorState {
    Connecting,
    Open,
    Closed,
}

enum Command {
    Write(String),
    Close,
}

enum SessionEnd {
    /// Torn down on request
    Closed,
    /// Lost the link; `announced` if listeners were told it was up
    Dropped { announced: bool },
}

struct Shared {
    url: Url,
    scheme: Scheme,
    options: ConnectorOptions,
    state: Mutex<ConnectorState>,
    read_callback: Mutex<Option<ReadCallback>>,
    listeners: Mutex<Vec<(ListenerId, ConnectionListener)>>,
}

impl Shared {
    /// Move to `Open` unless closed meanwhile
    fn set_open(&self) -> bool {
        let mut state = self.state.lock();
        if *state == ConnectorState::Closed {
            return false;
        }
        *state = ConnectorState::Open;
        true
    }

    fn set_connecting(&self) {
        let mut state = self.state.lock();
        if *state != ConnectorState::Closed {
            *state = ConnectorState::Connecting;
        }
    }

    fn set_closed(&self) {
        *self.state.lock() = ConnectorState::Closed;
    }

    fn is_closed(&self) -> bool {
        *self.state.lock() == ConnectorState::Closed
    }

    fn deliver(&self, text: String) {
        let callback = self.read_callback.lock().clone();
        match callback {
            Some(callback) => {
                if catch_unwind(AssertUnwindSafe(|| callback(text))).is_err() {
                    warn!(url = %self.url, "Read callback panicked");
                }
            }
            None => debug!(url = %self.url, "No read callback, dropping frame"),
        }
    }

    fn notify(&self, connected: bool) {
        let listeners: Vec<ConnectionListener> =
            self.listeners.lock().iter().map(|(_, l)| Arc::clone(l)).collect();
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(connected))).is_err() {
                warn!(url = %self.url, connected, "Connection listener panicked");
            }
        }
    }

    async fn dial(&self) -> Result<Box<dyn Link>> {
        let timeout = self.options.connect_timeout;
        let link: Box<dyn Link> = match self.scheme {
            Scheme::Tcp => Box::new(tcp::TcpLink::dial(&self.url, timeout).await?),
            Scheme::Ws | Scheme::Wss => Box::new(ws::WsLink::dial(&self.url, timeout).await?),
        };
        Ok(link)
    }
}

/// Client side of the link to a container
pub struct Connector {
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<Command>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Command>>>,
}

impl Connector {
    /// Create a connector without dialing. Callbacks registered before
    /// [`Connector::start`] observe the very first connection.
    pub fn new(url: Url, options: ConnectorOptions) -> Result<Self> {
        let scheme = Scheme::parse(url.scheme())?;
        let (commands, receiver) = mpsc::unbounded_channel();
        Ok(Self {
            shared: Arc::new(Shared {
                url,
                scheme,
                options,
                state: Mutex::new(ConnectorState::Connecting),
                read_callback: Mutex::new(None),
                listeners: Mutex::new(Vec::new()),
            }),
            commands,
            receiver: Mutex::new(Some(receiver)),
        })
    }

    /// Create a connector and start dialing on the current runtime
    pub fn open(url: Url, options: ConnectorOptions) -> Result<Self> {
        let connector = Self::new(url, options)?;
        connector.start()?;
        Ok(connector)
    }

    /// Spawn the link task. Starting twice is a no-op.
    pub fn start(&self) -> Result<()> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| GatewayError::runtime(format!("No tokio runtime: {}", e)))?;
        let Some(receiver) = self.receiver.lock().take() else {
            return Ok(());
        };
        handle.spawn(run(Arc::clone(&self.shared), receiver));
        Ok(())
    }

    /// Queue a frame. False once the connector is closed.
    pub fn write(&self, text: impl Into<String>) -> bool {
        if self.shared.is_closed() {
            return false;
        }
        self.commands.send(Command::Write(text.into())).is_ok()
    }

    pub fn set_read_callback(&self, callback: impl Fn(String) + Send + Sync + 'static) {
        *self.shared.read_callback.lock() = Some(Arc::new(callback));
    }

    pub fn add_connection_listener(
        &self,
        listener: impl Fn(bool) + Send + Sync + 'static,
    ) -> ListenerId {
        let id = ListenerId::next();
        self.shared.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    pub fn remove_connection_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.shared.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn state(&self) -> ConnectorState {
        *self.shared.state.lock()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectorState::Open
    }

    pub fn url(&self) -> &Url {
        &self.shared.url
    }

    /// Send the `{"alive": false}` sentinel and tear down. Never reconnects.
    pub fn close(&self) {
        {
            let mut state = self.shared.state.lock();
            if *state == ConnectorState::Closed {
                return;
            }
            *state = ConnectorState::Closed;
        }
        info!(url = %self.shared.url, "Closing connector");
        let _ = self.commands.send(Command::Close);
    }
}

impl Drop for Connector {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("url", &self.shared.url.as_str())
            .field("state", &self.state())
            .finish()
    }
}

async fn run(shared: Arc<Shared>, mut commands: mpsc::UnboundedReceiver<Command>) {
    let mut ever_connected = false;

    loop {
        debug!(url = %shared.url, "Dialing");
        match shared.dial().await {
            Ok(mut link) => {
                // Writes issued while a dropped link was down are stale
                let discard_queued = ever_connected;
                ever_connected = true;
                info!(url = %shared.url, "Connected");
                match session(&shared, link.as_mut(), &mut commands, discard_queued).await {
                    SessionEnd::Closed => return,
                    SessionEnd::Dropped { announced } => {
                        shared.set_connecting();
                        if announced {
                            shared.notify(false);
                        }
                    }
                }
            }
            Err(e) if !ever_connected => {
                warn!(url = %shared.url, error = %e, "Initial connection failed");
                shared.set_closed();
                shared.notify(false);
                return;
            }
            Err(e) => {
                warn!(url = %shared.url, error = %e, "Reconnection failed");
            }
        }

        if !shared.options.keep_alive || shared.is_closed() {
            shared.set_closed();
            return;
        }

        info!(
            url = %shared.url,
            delay_ms = shared.options.reconnect_delay.as_millis() as u64,
            "Scheduling reconnection"
        );
        let sleep = tokio::time::sleep(shared.options.reconnect_delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                command = commands.recv() => match command {
                    Some(Command::Write(text)) => {
                        debug!(url = %shared.url, len = text.len(), "Dropping write while link is down");
                    }
                    Some(Command::Close) | None => return,
                },
            }
        }
    }
}

async fn session(
    shared: &Shared,
    link: &mut dyn Link,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    discard_queued: bool,
) -> SessionEnd {
    if discard_queued {
        let mut dropped = 0usize;
        while let Ok(command) = commands.try_recv() {
            match command {
                Command::Write(_) => dropped += 1,
                Command::Close => {
                    teardown(shared, link, false).await;
                    return SessionEnd::Closed;
                }
            }
        }
        if dropped > 0 {
            debug!(url = %shared.url, dropped, "Discarded writes queued while reconnecting");
        }
    }

    let up = shared.set_open();
    while let Ok(command) = commands.try_recv() {
        match command {
            Command::Write(text) => {
                if let Err(e) = link.write_frame(&text).await {
                    warn!(url = %shared.url, error = %e, "Flushing queued write failed");
                    return SessionEnd::Dropped { announced: false };
                }
            }
            Command::Close => {
                teardown(shared, link, false).await;
                return SessionEnd::Closed;
            }
        }
    }

    let announced = up;
    if announced {
        shared.notify(true);
    }

    loop {
        tokio::select! {
            frame = link.read_frame() => match frame {
                Ok(Some(text)) => {
                    debug!(url = %shared.url, len = text.len(), "Frame received");
                    shared.deliver(text);
                }
                Ok(None) => {
                    info!(url = %shared.url, "Link closed by peer");
                    return SessionEnd::Dropped { announced };
                }
                Err(e) => {
                    warn!(url = %shared.url, error = %e, "Link read failed");
                    return SessionEnd::Dropped { announced };
                }
            },
            command = commands.recv() => match command {
                Some(Command::Write(text)) => {
                    debug!(url = %shared.url, len = text.len(), "Frame sent");
                    if let Err(e) = link.write_frame(&text).await {
                        warn!(url = %shared.url, error = %e, "Link write failed");
                        return SessionEnd::Dropped { announced };
                    }
                }
                Some(Command::Close) | None => {
                    teardown(shared, link, announced).await;
                    return SessionEnd::Closed;
                }
            },
        }
    }
}

async fn teardown(shared: &Shared, link: &mut dyn Link, announced: bool) {
    if let Err(e) = link.write_frame(&Frame::alive(false).to_json()).await {
        debug!(url = %shared.url, error = %e, "Could not send close sentinel");
    }
    link.shutdown().await;
    shared.set_closed();
    if announced {
        shared.notify(false);
    }
    info!(url = %shared.url, "Connector closed");
}
