#![warn(missing_docs)]

//! Peerwire: a small public API facade for the workspace.
//!
//! This crate re-exports the surface needed to exchange datagrams with
//! remote peers over UDP:
//!
//! - The peer facade and its events (`Peer`, `PeerEvent`)
//! - Peer identity (`OwnerId`, `client_id_for_ip`)
//! - Configuration (`Config`) and errors (`ErrorKind`, `Result`)
//! - Payload transform hooks (`Compressor`, `Encrypter`)
//!
//! Example
//! ```no_run
//! use std::time::Duration;
//! use peerwire::{client_id_for_ip, Peer, PeerEvent};
//!
//! let client_id = client_id_for_ip("192.168.2.101").unwrap();
//! let mut peer = Peer::new("0.0.0.0:40001", &client_id).unwrap();
//!
//! peer.listen(
//!     Duration::from_secs(5),
//!     Duration::from_secs(30),
//!     Some(Box::new(|remote, event| {
//!         if let PeerEvent::Data { payload, .. } = event {
//!             println!("{} -> {}", remote.owner_id(), String::from_utf8_lossy(&payload));
//!         }
//!     })),
//!     Some(Box::new(|err| {
//!         eprintln!("{}", err);
//!         false
//!     })),
//! )
//! .unwrap();
//!
//! peer.send("203.0.113.9:40001", b"hello").unwrap();
//! ```

// Core: configuration, errors, identity, transforms
pub use peerwire_core::{
    config::Config,
    constants,
    error::{ErrorKind, Result},
    identity::{client_id_for_ip, ipv6_octets, OwnerId},
    transform::{Compressor, Encrypter, Transforms, XorEncrypter, ZlibCompressor},
    transport::DatagramSocket,
};
// Host: the peer facade and its events
pub use peerwire_host::{ErrorHandler, MessageHandler, Peer, PeerEvent, UdpTransport};
// Peer state: snapshots handed to callbacks, seedable records
pub use peerwire_peer::RemotePeer;
// Protocol: message-type registry
pub use peerwire_protocol::message::{MessageKind, USER_MESSAGE_START};

/// Convenience prelude with the most commonly used items.
pub mod prelude {
    pub use crate::{
        client_id_for_ip, Config, ErrorKind, MessageKind, OwnerId, Peer, PeerEvent, RemotePeer,
        Result,
    };
}
