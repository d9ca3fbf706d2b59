//! Datagram sockets for underwater network nodes
//!
//! Thin layer over the agent container [`gateway`]: a [`UnetSocket`] sends
//! application datagrams to other nodes and receives the ones addressed to
//! it, using whichever agents the node advertises for the datagram
//! services.
//!
//! ```no_run
//! use unetsocket::{protocol, UnetSocket};
//!
//! # async fn demo() -> unetsocket::Result<()> {
//! let mut socket = UnetSocket::open("localhost", 1100).await?;
//! socket.bind(protocol::USER)?;
//! socket.set_timeout(1000);
//! if let Some(to) = socket.host("B").await? {
//!     socket.send(&[1, 2, 3], to, protocol::USER).await?;
//! }
//! if let Some(ntf) = socket.receive().await? {
//!     println!("received {:?}", unetsocket::messages::datagram_bytes(&ntf));
//! }
//! socket.close();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod messages;
pub mod protocol;
pub mod services;
pub mod socket;

pub use error::{Result, SocketError};
pub use socket::UnetSocket;
