//! Signalhub Network Library
//!
//! Room-based signaling relay for WebRTC-style peer negotiation.
//!
//! # Architecture
//!
//! - **Hub**: single event loop owning every room; joins, leaves and routed
//!   envelopes are applied one at a time
//! - **Pumps**: two tasks per connection, inbound (frames to hub) and
//!   outbound (mailbox to frames)
//! - **Server**: WebSocket and raw TCP listeners that hand identified
//!   connections to the pumps
//! - **Protocol**: JSON envelopes whose `data` is never inspected
//!
//! # Usage
//!
//! ```ignore
//! let config = Config::load_or_default(None)?;
//! let hub = Hub::spawn(config.hub.event_buffer);
//! let server = Server::start(&config.server, &config.hub, hub).await?;
//! ```

pub mod error;
mod frame;
pub mod hub;
pub mod peer;
pub mod protocol;
pub mod pump;
pub mod room;
pub mod server;
pub mod transport;

pub use error::{Error, Result};
pub use hub::{Hub, HubEvent, HubHandle};
pub use peer::{Mailbox, Peer, PeerKey};
pub use protocol::{Envelope, Hello, MessageType};
pub use room::Room;
pub use server::Server;
