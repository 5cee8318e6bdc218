//! Events delivered to the application and the handler types that receive
//! them.

use peerwire_core::error::ErrorKind;
use peerwire_peer::RemotePeer;

/// Events pushed to the message handler, always accompanied by a snapshot
/// of the peer they concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// An application message arrived. `message_type` is `DATA` (0) or a
    /// host-defined value (55..=255); `payload` is the bytes after the
    /// type, with all transforms already reversed.
    Data {
        /// The message-type byte.
        message_type: u8,
        /// The message body.
        payload: Vec<u8>,
    },
    /// A fresh rolling round-trip average for this peer, in microseconds.
    /// Synthesized locally whenever a keepalive echo returns.
    Latency(u16),
    /// This peer was observed for the first time this session. Always
    /// delivered before any other event for the peer.
    Connected,
    /// This peer went silent past the idle timeout and has been removed
    /// from the registry. Delivered exactly once per removal.
    Disconnected,
}

/// Receives peer events. Runs on the engine's worker threads: keep it
/// quick, and never call `close` from inside it.
pub type MessageHandler = Box<dyn FnMut(&RemotePeer, PeerEvent) + Send>;

/// Receives per-datagram and transport errors. Return `true` to treat the
/// error as fatal and stop the receive loop, `false` to carry on.
pub type ErrorHandler = Box<dyn FnMut(&ErrorKind) -> bool + Send>;

pub(crate) struct Handlers {
    pub(crate) on_message: MessageHandler,
    pub(crate) on_error: ErrorHandler,
}
