//! Agent and topic identifiers

use crate::filter::ReceiveTimeout;
use crate::gateway::{Gateway, GatewayInner};
use crate::message::Message;
use crate::{GatewayError, Result};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

/// Names an agent or a topic inside the container.
///
/// An id remembers the gateway that created it without keeping it alive;
/// sending through an id whose gateway has been closed or dropped fails with
/// [`GatewayError::Closed`]. Two ids are equal when their wire forms are.
#[derive(Clone)]
pub struct AgentId {
    name: String,
    topic: bool,
    owner: Weak<GatewayInner>,
}

impl AgentId {
    pub(crate) fn new(name: impl Into<String>, topic: bool, owner: Weak<GatewayInner>) -> Self {
        Self {
            name: name.into(),
            topic,
            owner,
        }
    }

    /// An id not bound to any gateway, e.g. for comparisons
    pub fn detached(name: impl Into<String>, topic: bool) -> Self {
        Self::new(name, topic, Weak::new())
    }

    /// Parse a wire form (`name` or `#name`)
    pub fn from_wire(wire: &str) -> Self {
        match wire.strip_prefix('#') {
            Some(name) => Self::detached(name, true),
            None => Self::detached(wire, false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_topic(&self) -> bool {
        self.topic
    }

    /// `#name` for topics, `name` for agents
    pub fn to_wire(&self) -> String {
        if self.topic {
            format!("#{}", self.name)
        } else {
            self.name.clone()
        }
    }

    /// The owning gateway, if it is still open
    pub fn gateway(&self) -> Result<Gateway> {
        let inner: Arc<GatewayInner> = self.owner.upgrade().ok_or(GatewayError::Closed)?;
        let gateway = Gateway::from_inner(inner);
        if gateway.is_closed() {
            return Err(GatewayError::Closed);
        }
        Ok(gateway)
    }

    /// Address `msg` to this id and send it
    pub fn send(&self, msg: &mut Message) -> Result<bool> {
        let gateway = self.gateway()?;
        msg.recipient = Some(self.to_wire());
        Ok(gateway.send(msg))
    }

    /// Address `msg` to this id and wait for the reply
    pub async fn request(
        &self,
        mut msg: Message,
        timeout: impl Into<ReceiveTimeout>,
    ) -> Result<Option<Message>> {
        let gateway = self.gateway()?;
        msg.recipient = Some(self.to_wire());
        Ok(gateway.request(msg, timeout).await)
    }
}

impl PartialEq for AgentId {
    fn eq(&self, other: &Self) -> bool {
        self.to_wire() == other.to_wire()
    }
}

impl Eq for AgentId {}

impl Hash for AgentId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_wire().hash(state);
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.owner.upgrade() {
            Some(inner) => write!(f, "{} on {}", self.to_wire(), inner.url()),
            None => f.write_str(&self.to_wire()),
        }
    }
}

impl fmt::Debug for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AgentId").field(&self.to_wire()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_wire_form() {
        assert_eq!(AgentId::detached("phy", false).to_wire(), "phy");
        assert_eq!(AgentId::detached("phy__ntf", true).to_wire(), "#phy__ntf");
        let parsed = AgentId::from_wire("#phy__ntf");
        assert!(parsed.is_topic());
        assert_eq!(parsed.name(), "phy__ntf");
    }

    #[test]
    fn test_equality_by_wire_form() {
        let mut set = HashSet::new();
        set.insert(AgentId::detached("link", false));
        assert!(set.contains(&AgentId::from_wire("link")));
        assert!(!set.contains(&AgentId::from_wire("#link")));
    }

    #[test]
    fn test_hashed_and_compared_alike() {
        // a plain name that already carries the topic marker
        let plain = AgentId::detached("#x", false);
        let topic = AgentId::detached("x", true);
        assert_eq!(plain, topic);

        let mut set = HashSet::new();
        set.insert(plain);
        assert!(set.contains(&topic));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_detached_id_is_closed() {
        let id = AgentId::detached("phy", false);
        let mut msg = Message::new();
        assert!(matches!(id.send(&mut msg), Err(GatewayError::Closed)));
        assert_eq!(id.to_string(), "phy");
    }
}
