//! Datagram Socket
//!
//! A socket exchanges application datagrams with other nodes through the
//! agents a node advertises. Outgoing datagrams go to the first agent
//! providing a transport, routing, link, physical or datagram service.
//! Incoming datagrams arrive as notifications on the topics of every
//! datagram provider, which the socket subscribes to when it opens.

use crate::messages::{self, ADDRESS_RESOLUTION_REQ, DATAGRAM_NTF, DATAGRAM_REQ, RX_FRAME_NTF};
use crate::{protocol, services, Result, SocketError};
use gateway::{
    AgentId, Filter, Gateway, GatewayConfig, GatewayError, Message, ParameterAccessible,
    Performative, ReceiveTimeout,
};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};

pub struct UnetSocket {
    gateway: Option<Gateway>,
    local_protocol: i32,
    remote_address: i32,
    remote_protocol: i32,
    timeout_ms: i64,
    provider: Mutex<Option<AgentId>>,
}

impl UnetSocket {
    /// Connect to the node at `host:port` over TCP
    pub async fn open(host: &str, port: u16) -> Result<Self> {
        Self::open_with(GatewayConfig::tcp(host, port)).await
    }

    /// Connect with an explicit gateway configuration.
    ///
    /// Must be called within a tokio runtime.
    pub async fn open_with(config: GatewayConfig) -> Result<Self> {
        messages::register_all();
        let gateway = Gateway::open(config)?;

        let providers = match gateway.agents_for_service(services::DATAGRAM).await {
            Ok(_) if !gateway.is_connected() => {
                gateway.close();
                let address = gateway.address().to_string();
                return Err(GatewayError::connection("node unreachable", address).into());
            }
            Ok(providers) => providers,
            Err(e) => {
                gateway.close();
                return Err(e.into());
            }
        };
        for agent in &providers {
            gateway.subscribe(agent);
        }
        info!(
            gateway = %gateway.name(),
            providers = providers.len(),
            "Socket opened"
        );

        Ok(Self {
            gateway: Some(gateway),
            local_protocol: -1,
            remote_address: -1,
            remote_protocol: protocol::DATA,
            timeout_ms: 0,
            provider: Mutex::new(None),
        })
    }

    /// Close the socket and its gateway
    pub fn close(&mut self) {
        if let Some(gateway) = self.gateway.take() {
            gateway.close();
            debug!(gateway = %gateway.name(), "Socket closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.gateway.is_none()
    }

    /// Only receive datagrams carrying `protocol`
    pub fn bind(&mut self, protocol: i32) -> Result<()> {
        self.open_gateway()?;
        self.local_protocol = protocol::check_application(protocol)?;
        Ok(())
    }

    pub fn unbind(&mut self) {
        self.local_protocol = -1;
    }

    pub fn is_bound(&self) -> bool {
        self.local_protocol >= 0
    }

    /// Set the default destination used by [`send_connected`](Self::send_connected)
    pub fn connect(&mut self, to: i32, protocol: i32) -> Result<()> {
        self.open_gateway()?;
        let protocol = protocol::check_application(protocol)?;
        if to < 0 {
            return Err(SocketError::InvalidAddress { address: to });
        }
        self.remote_address = to;
        self.remote_protocol = protocol;
        Ok(())
    }

    pub fn disconnect(&mut self) {
        self.remote_address = -1;
        self.remote_protocol = protocol::DATA;
    }

    pub fn is_connected(&self) -> bool {
        self.remote_address >= 0
    }

    /// Address of the local node, or -1 if it cannot be determined
    pub async fn local_address(&self) -> i32 {
        let Some(gateway) = &self.gateway else {
            return -1;
        };
        let node = match gateway.agent_for_service(services::NODE_INFO).await {
            Ok(Some(node)) => node,
            _ => return -1,
        };
        match node.get("address").await {
            Ok(Some(address)) => address.as_i64().map_or(-1, |a| a as i32),
            Ok(None) => -1,
            Err(e) => {
                debug!(error = %e, "Node address unavailable");
                -1
            }
        }
    }

    pub fn local_protocol(&self) -> i32 {
        self.local_protocol
    }

    pub fn remote_address(&self) -> i32 {
        self.remote_address
    }

    pub fn remote_protocol(&self) -> i32 {
        self.remote_protocol
    }

    /// Receive timeout in milliseconds; 0 makes [`receive`](Self::receive)
    /// non-blocking. Negative values are treated as 0.
    pub fn set_timeout(&mut self, ms: i64) {
        self.timeout_ms = ms.max(0);
    }

    pub fn timeout(&self) -> i64 {
        self.timeout_ms
    }

    /// Send `data` to the connected destination
    pub async fn send_connected(&self, data: &[u8]) -> Result<bool> {
        self.send(data, self.remote_address, self.remote_protocol)
            .await
    }

    /// Send `data` to node `to`. Returns false without sending anything for
    /// a negative address, a non-application protocol or a closed socket.
    pub async fn send(&self, data: &[u8], to: i32, protocol: i32) -> Result<bool> {
        if to < 0 || self.is_closed() {
            return Ok(false);
        }
        let req = DATAGRAM_REQ
            .message()
            .with("data", messages::datagram_value(data))
            .with("to", to)
            .with("protocol", protocol);
        self.send_request(req).await
    }

    /// Send a prepared `DatagramReq` and wait for the provider to accept it.
    ///
    /// A request without a recipient goes to the datagram provider. A
    /// request without a protocol is treated as DATA.
    pub async fn send_request(&self, mut req: Message) -> Result<bool> {
        let Some(gateway) = &self.gateway else {
            return Ok(false);
        };
        let protocol = match req.get("protocol") {
            None => protocol::DATA as i64,
            Some(p) => match p.as_i64() {
                Some(p) => p,
                None => return Ok(false),
            },
        };
        if i32::try_from(protocol)
            .map(|p| protocol::check_application(p).is_err())
            .unwrap_or(true)
        {
            debug!(protocol, "Refusing to send datagram with reserved protocol");
            return Ok(false);
        }
        if req.recipient.is_none() {
            let Some(provider) = self.provider(gateway).await else {
                warn!("No agent available to carry datagrams");
                return Ok(false);
            };
            req.recipient = Some(provider.to_wire());
        }

        let rsp = gateway.request(req, gateway.request_timeout()).await;
        let accepted = matches!(rsp.as_ref().and_then(|r| r.perf), Some(Performative::Agree));
        debug!(
            accepted,
            response = ?rsp.as_ref().map(|r| r.to_string()),
            "Datagram request answered"
        );
        Ok(accepted)
    }

    /// Next datagram for this socket, waiting up to the socket timeout.
    ///
    /// Only `DatagramNtf` and `RxFrameNtf` carrying DATA or a user protocol
    /// are accepted; a bound socket further requires its own protocol.
    pub async fn receive(&self) -> Result<Option<Message>> {
        let gateway = self.open_gateway()?;
        let local = self.local_protocol as i64;
        let filter = Filter::predicate(move |msg| {
            let clazz = msg.clazz();
            if clazz != DATAGRAM_NTF.name() && clazz != RX_FRAME_NTF.name() {
                return false;
            }
            match msg.get("protocol").and_then(Value::as_i64) {
                Some(p) => protocol::is_application(p) && (local < 0 || local == p),
                None => false,
            }
        });
        Ok(gateway
            .receive(filter, ReceiveTimeout::from(self.timeout_ms))
            .await)
    }

    /// Underlying gateway, `None` once closed
    pub fn gateway(&self) -> Option<&Gateway> {
        self.gateway.as_ref()
    }

    pub fn agent(&self, name: &str) -> Result<AgentId> {
        Ok(self.open_gateway()?.agent(name))
    }

    pub async fn agent_for_service(&self, service: &str) -> Result<Option<AgentId>> {
        Ok(self.open_gateway()?.agent_for_service(service).await?)
    }

    pub async fn agents_for_service(&self, service: &str) -> Result<Vec<AgentId>> {
        Ok(self.open_gateway()?.agents_for_service(service).await?)
    }

    /// Resolve a node name to its address
    pub async fn host(&self, name: &str) -> Result<Option<i32>> {
        let gateway = self.open_gateway()?;
        let Some(resolver) = gateway.agent_for_service(services::ADDRESS_RESOLUTION).await? else {
            return Ok(None);
        };
        let req = ADDRESS_RESOLUTION_REQ.message().with("name", name);
        let rsp = resolver.request(req, gateway.request_timeout()).await?;
        Ok(rsp
            .and_then(|r| r.get("address").and_then(Value::as_i64))
            .and_then(|a| i32::try_from(a).ok()))
    }

    fn open_gateway(&self) -> Result<&Gateway> {
        self.gateway.as_ref().ok_or(SocketError::Closed)
    }

    /// First agent able to carry datagrams, looked up once
    async fn provider(&self, gateway: &Gateway) -> Option<AgentId> {
        let cached = self.provider.lock().clone();
        if cached.is_some() {
            return cached;
        }
        for service in services::DATAGRAM_PROVIDERS {
            match gateway.agent_for_service(service).await {
                Ok(Some(agent)) => {
                    debug!(service, agent = %agent.name(), "Datagram provider found");
                    *self.provider.lock() = Some(agent.clone());
                    return Some(agent);
                }
                Ok(None) => {}
                Err(e) => debug!(service, error = %e, "Provider lookup failed"),
            }
        }
        None
    }
}

impl Drop for UnetSocket {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detached() -> UnetSocket {
        UnetSocket {
            gateway: None,
            local_protocol: -1,
            remote_address: -1,
            remote_protocol: protocol::DATA,
            timeout_ms: 0,
            provider: Mutex::new(None),
        }
    }

    #[test]
    fn test_timeout_clamped() {
        let mut socket = detached();
        socket.set_timeout(-5);
        assert_eq!(socket.timeout(), 0);
        socket.set_timeout(250);
        assert_eq!(socket.timeout(), 250);
    }

    #[test]
    fn test_closed_socket_refuses_configuration() {
        let mut socket = detached();
        assert!(socket.is_closed());
        assert!(matches!(socket.bind(protocol::USER), Err(SocketError::Closed)));
        assert!(matches!(socket.connect(3, protocol::DATA), Err(SocketError::Closed)));
        assert!(matches!(socket.agent("phy"), Err(SocketError::Closed)));
    }

    #[tokio::test]
    async fn test_closed_socket_operations() {
        let socket = detached();
        assert!(!socket.send(&[1, 2, 3], 5, protocol::DATA).await.unwrap());
        assert_eq!(socket.local_address().await, -1);
        assert!(matches!(socket.receive().await, Err(SocketError::Closed)));
        assert!(matches!(socket.host("B").await, Err(SocketError::Closed)));
    }

    #[test]
    fn test_unbind_and_disconnect_reset_state() {
        let mut socket = detached();
        socket.local_protocol = protocol::USER;
        socket.remote_address = 7;
        socket.remote_protocol = protocol::USER;
        assert!(socket.is_bound());
        assert!(socket.is_connected());

        socket.unbind();
        socket.disconnect();
        assert!(!socket.is_bound());
        assert!(!socket.is_connected());
        assert_eq!(socket.remote_protocol(), protocol::DATA);
    }
}
