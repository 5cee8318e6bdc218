#![warn(missing_docs)]

//! peerwire-peer: state kept for every remote endpoint.
//!
//! The registry owns one [`RemotePeer`] record per observed owner id plus
//! the reassembly slot for that owner's in-flight fragmented message.
//! External code only ever sees cloned snapshots of records; the engine
//! holds the single mutable copy.

mod reassembly;
mod registry;
mod remote;

pub use reassembly::Reassembly;
pub use registry::PeerRegistry;
pub use remote::RemotePeer;
