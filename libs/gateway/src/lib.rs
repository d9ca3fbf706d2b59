//! Agent Container Gateway
//!
//! Client library for exchanging JSON messages with agents in a remote
//! container over TCP or WebSocket. The gateway joins the container as a
//! lightweight agent: it sends messages, correlates replies, subscribes to
//! topics, queries the container's directory, and reads or writes agent
//! parameters.
//!
//! ```no_run
//! use gateway::{Gateway, GatewayConfig, ParameterAccessible};
//!
//! # async fn demo() -> gateway::Result<()> {
//! let gw = Gateway::open(GatewayConfig::tcp("localhost", 1100))?;
//! if let Some(phy) = gw.agent_for_service("org.arl.unet.Services.PHYSICAL").await? {
//!     let mtu = phy.get("MTU").await?;
//!     println!("MTU = {:?}", mtu);
//! }
//! gw.close();
//! # Ok(())
//! # }
//! ```

pub mod agent_id;
pub mod caching;
pub mod codec;
pub mod config;
pub mod connector;
pub mod error;
pub mod filter;
pub mod gateway;
pub mod message;
pub mod param;
pub mod protocol;
pub mod registry;

// Re-export commonly used types
pub use agent_id::AgentId;
pub use caching::{CachingAgentId, CachingGateway};
pub use config::{GatewayAddress, GatewayConfig, Scheme};
pub use connector::{Connector, ConnectorOptions, ConnectorState, ListenerId};
pub use error::{GatewayError, Result};
pub use filter::{Filter, ReceiveTimeout};
pub use gateway::{EventKind, Gateway, GatewayEvent};
pub use message::{Message, MessageClass, Performative};
pub use param::{ParamOptions, ParamSelector, ParamValues, ParameterAccessible};
