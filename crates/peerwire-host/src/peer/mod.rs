//! The peer facade and the state shared with its worker threads.

mod dispatch;
mod send;

use std::{
    io,
    net::{SocketAddr, ToSocketAddrs},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, Sender};
use peerwire_core::{
    config::Config,
    constants::UDP_HEADER_SIZE,
    error::{ErrorKind, Result},
    identity::OwnerId,
    time::{Clock, SystemClock},
    transform::{Compressor, Encrypter, Transforms},
    transport::DatagramSocket,
};
use peerwire_peer::{PeerRegistry, RemotePeer};
use peerwire_protocol::message;
use tracing::{debug, warn};

use crate::{
    event::{ErrorHandler, Handlers, MessageHandler, PeerEvent},
    socket::UdpTransport,
};

/// State behind the engine mutex: everything the receive loop, ticker, and
/// sending threads mutate.
pub(crate) struct EngineState {
    pub(crate) registry: PeerRegistry,
    /// Reusable buffer holding the next outbound datagram.
    pub(crate) scratch: Vec<u8>,
    /// Next outgoing sequence number; every emitted datagram consumes one.
    pub(crate) sequence: u16,
    pub(crate) transforms: Transforms,
}

impl EngineState {
    pub(crate) fn next_sequence(&mut self) -> u16 {
        let sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);
        sequence
    }
}

/// State shared between the facade and its worker threads.
pub(crate) struct Shared<S: DatagramSocket> {
    pub(crate) socket: S,
    /// Tombstone: cleared by `close()`, checked by every loop iteration.
    pub(crate) open: AtomicBool,
    /// Zero point for the microsecond timestamps in PING/PONG payloads.
    pub(crate) epoch: Instant,
    pub(crate) client_id: [u8; 2],
    pub(crate) own_id: OwnerId,
    pub(crate) config: Config,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) state: Mutex<EngineState>,
    pub(crate) handlers: Mutex<Handlers>,
}

impl<S: DatagramSocket> Shared<S> {
    /// Microseconds elapsed between the epoch and `now`.
    pub(crate) fn micros_at(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.epoch).as_micros() as u64
    }

    /// Delivers an event to the message handler. Callers must not hold the
    /// engine mutex: handlers are allowed to send.
    pub(crate) fn emit(&self, peer: &RemotePeer, event: PeerEvent) {
        let mut handlers = self.handlers.lock().unwrap();
        (handlers.on_message)(peer, event);
    }

    /// Reports an error to the error handler; returns `true` when the
    /// handler wants the receive loop to stop.
    pub(crate) fn report(&self, err: ErrorKind) -> bool {
        let mut handlers = self.handlers.lock().unwrap();
        (handlers.on_error)(&err)
    }
}

/// A local endpoint of the peer-to-peer mesh.
///
/// A `Peer` owns one UDP socket, a registry of every remote peer it has
/// heard from this session, and the keepalive machinery that detects
/// silent peers. Construct it with [`Peer::new`], start it with
/// [`Peer::listen`], exchange messages with [`Peer::send`], and stop it
/// with [`Peer::close`].
pub struct Peer {
    addr: SocketAddr,
    client_id: [u8; 2],
    owner_id: OwnerId,
    config: Config,
    clock: Arc<dyn Clock>,
    /// Transform slots staged before `listen` moves them into the engine.
    transforms: Transforms,
    shared: Option<Arc<Shared<UdpTransport>>>,
    workers: Vec<JoinHandle<()>>,
    shutdown_tx: Option<Sender<()>>,
    done_rx: Option<Receiver<()>>,
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer")
            .field("addr", &self.addr)
            .field("client_id", &self.client_id)
            .field("owner_id", &self.owner_id)
            .field("listening", &self.shared.is_some())
            .finish()
    }
}

fn resolve<A: ToSocketAddrs>(addr: A) -> Result<SocketAddr> {
    addr.to_socket_addrs()?
        .next()
        .ok_or_else(|| {
            ErrorKind::Io(io::Error::new(io::ErrorKind::AddrNotAvailable, "address resolved to nothing"))
        })
}

fn not_listening() -> ErrorKind {
    ErrorKind::Io(io::Error::new(io::ErrorKind::NotConnected, "peer is not listening"))
}

impl Peer {
    /// Creates a peer that will bind to `bind_addr`, identifying itself
    /// with the given client id.
    ///
    /// The client id must be exactly 2 bytes (see
    /// [`peerwire_core::identity::client_id_for_ip`] for deriving one from
    /// the local address); anything else fails with
    /// [`ErrorKind::InvalidClientId`]. Nothing is bound until
    /// [`Peer::listen`].
    pub fn new<A: ToSocketAddrs>(bind_addr: A, client_id: &[u8]) -> Result<Self> {
        Self::with_config(bind_addr, client_id, Config::default())
    }

    /// [`Peer::new`] with explicit configuration.
    pub fn with_config<A: ToSocketAddrs>(
        bind_addr: A,
        client_id: &[u8],
        config: Config,
    ) -> Result<Self> {
        let client_id: [u8; 2] =
            client_id.try_into().map_err(|_| ErrorKind::InvalidClientId)?;
        let addr = resolve(bind_addr)?;
        let owner_id = OwnerId::from_socket_addr(addr, &client_id);

        Ok(Self {
            addr,
            client_id,
            owner_id,
            config,
            clock: Arc::new(SystemClock),
            transforms: Transforms::default(),
            shared: None,
            workers: Vec::new(),
            shutdown_tx: None,
            done_rx: None,
        })
    }

    /// The 2-byte client id this peer stamps into every datagram.
    pub fn client_id(&self) -> [u8; 2] {
        self.client_id
    }

    /// The owner id remote peers will derive for our datagrams, assuming
    /// they observe the configured address. Also the key under which the
    /// encryption hook is invoked for outgoing payloads.
    pub fn owner_id(&self) -> OwnerId {
        self.owner_id
    }

    /// The address the socket is actually bound to (useful when binding
    /// port 0). Fails before [`Peer::listen`].
    pub fn local_addr(&self) -> Result<SocketAddr> {
        let shared = self.shared.as_ref().ok_or_else(not_listening)?;
        Ok(shared.socket.local_addr()?)
    }

    /// Whether [`Peer::listen`] has started the worker loops.
    pub fn is_listening(&self) -> bool {
        self.shared.is_some()
    }

    /// Installs or clears the compression hook. May be called before or
    /// after [`Peer::listen`]; `None` disables the stage.
    pub fn set_compressor(&mut self, compressor: Option<Box<dyn Compressor>>) {
        match &self.shared {
            Some(shared) => shared.state.lock().unwrap().transforms.compressor = compressor,
            None => self.transforms.compressor = compressor,
        }
    }

    /// Installs or clears the encryption hook. May be called before or
    /// after [`Peer::listen`]; `None` disables the stage.
    pub fn set_encrypter(&mut self, encrypter: Option<Box<dyn Encrypter>>) {
        match &self.shared {
            Some(shared) => shared.state.lock().unwrap().transforms.encrypter = encrypter,
            None => self.transforms.encrypter = encrypter,
        }
    }

    /// Binds the socket and starts the receive and keepalive loops.
    ///
    /// `ping_interval` is how often every known peer is pinged; `timeout`
    /// is how long a peer may stay silent before it is dropped with a
    /// `Disconnected` event. A zero value falls back to the corresponding
    /// [`Config`] field (10 s and 30 s by default). Both handlers are
    /// required: passing `None` fails with
    /// [`ErrorKind::InvalidMessageHandler`] /
    /// [`ErrorKind::InvalidErrorHandler`].
    ///
    /// Calling `listen` on an already-listening peer is a no-op.
    pub fn listen(
        &mut self,
        ping_interval: Duration,
        timeout: Duration,
        on_message: Option<MessageHandler>,
        on_error: Option<ErrorHandler>,
    ) -> Result<()> {
        if self.shared.is_some() {
            return Ok(());
        }

        let on_message = on_message.ok_or(ErrorKind::InvalidMessageHandler)?;
        let on_error = on_error.ok_or(ErrorKind::InvalidErrorHandler)?;

        let ping_interval =
            if ping_interval.is_zero() { self.config.ping_interval } else { ping_interval };
        let timeout = if timeout.is_zero() { self.config.idle_timeout } else { timeout };

        let socket = UdpTransport::bind(self.addr, &self.config)?;

        let shared = Arc::new(Shared {
            socket,
            open: AtomicBool::new(true),
            epoch: self.clock.now(),
            client_id: self.client_id,
            own_id: self.owner_id,
            config: self.config.clone(),
            clock: Arc::clone(&self.clock),
            state: Mutex::new(EngineState {
                registry: PeerRegistry::new(),
                scratch: vec![0u8; self.config.packet_size - UDP_HEADER_SIZE],
                sequence: 0,
                transforms: std::mem::take(&mut self.transforms),
            }),
            handlers: Mutex::new(Handlers { on_message, on_error }),
        });

        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
        let (done_tx, done_rx) = crossbeam_channel::bounded(2);

        let recv_shared = Arc::clone(&shared);
        let recv_done = done_tx.clone();
        let recv_worker = thread::Builder::new()
            .name("peerwire-recv".into())
            .spawn(move || {
                dispatch::receive_loop(recv_shared);
                let _ = recv_done.send(());
            })?;

        let tick_shared = Arc::clone(&shared);
        let tick_worker = thread::Builder::new()
            .name("peerwire-tick".into())
            .spawn(move || {
                dispatch::ticker_loop(tick_shared, ping_interval, timeout, shutdown_rx);
                let _ = done_tx.send(());
            })?;

        debug!("Listening on {} with client id {:02x?}", self.addr, self.client_id);

        self.shared = Some(shared);
        self.workers = vec![recv_worker, tick_worker];
        self.shutdown_tx = Some(shutdown_tx);
        self.done_rx = Some(done_rx);
        Ok(())
    }

    /// Sends `data` to `dest` as a `DATA` message.
    pub fn send<A: ToSocketAddrs>(&self, dest: A, data: &[u8]) -> Result<()> {
        self.send_message(dest, data, message::MessageKind::Data.to_u8())
    }

    /// Sends `data` to `dest` under an explicit message type.
    ///
    /// Only `DATA` (0) and host-defined types (55..=255) are accepted
    /// here; the library-internal and reserved values fail with
    /// [`ErrorKind::InvalidPacket`]. Compression and encryption hooks are
    /// applied as installed, and the message is fragmented transparently
    /// when it exceeds a single datagram's budget.
    pub fn send_message<A: ToSocketAddrs>(
        &self,
        dest: A,
        data: &[u8],
        message_type: u8,
    ) -> Result<()> {
        if !message::is_sendable(message_type) {
            return Err(ErrorKind::InvalidPacket);
        }
        let shared = self.shared.as_ref().ok_or_else(not_listening)?;
        let dest = resolve(dest)?;
        shared.send_message(dest, data, message_type)
    }

    /// Returns a snapshot of the known peer with this owner id.
    pub fn get(&self, id: &OwnerId) -> Option<RemotePeer> {
        let shared = self.shared.as_ref()?;
        shared.state.lock().unwrap().registry.get(id).cloned()
    }

    /// Whether a peer with this owner id is currently known.
    pub fn has(&self, id: &OwnerId) -> bool {
        match &self.shared {
            Some(shared) => shared.state.lock().unwrap().registry.has(id),
            None => false,
        }
    }

    /// Seeds the registry with a peer record, so keepalives start flowing
    /// to it before it has sent us anything. No-op if the owner id is
    /// already known (or the peer is not listening); returns whether the
    /// record was added.
    pub fn add(&self, peer: RemotePeer) -> bool {
        match &self.shared {
            Some(shared) => shared.state.lock().unwrap().registry.add(peer),
            None => false,
        }
    }

    /// Drops the peer with this owner id from the registry, returning its
    /// last snapshot. No `Disconnected` event is emitted for explicit
    /// removal.
    pub fn remove(&self, id: &OwnerId) -> Option<RemotePeer> {
        let shared = self.shared.as_ref()?;
        shared.state.lock().unwrap().registry.remove(id)
    }

    /// Snapshots of every currently-known peer.
    pub fn peers(&self) -> Vec<RemotePeer> {
        match &self.shared {
            Some(shared) => {
                shared.state.lock().unwrap().registry.iter().cloned().collect()
            }
            None => Vec::new(),
        }
    }

    /// Number of currently-known peers.
    pub fn peer_count(&self) -> usize {
        match &self.shared {
            Some(shared) => shared.state.lock().unwrap().registry.len(),
            None => 0,
        }
    }

    /// Stops the worker loops and closes the socket. Idempotent; safe to
    /// call whether or not `listen` ever ran. Waits up to the configured
    /// grace window for in-flight work to finish, then detaches.
    ///
    /// Must not be called from inside a handler.
    pub fn close(&mut self) {
        let Some(shared) = self.shared.take() else { return };

        shared.open.store(false, Ordering::Relaxed);
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }

        let mut finished = 0;
        if let Some(done_rx) = self.done_rx.take() {
            let deadline = self.clock.now() + self.config.close_grace;
            while finished < self.workers.len() {
                let left = deadline.saturating_duration_since(self.clock.now());
                match done_rx.recv_timeout(left) {
                    Ok(()) => finished += 1,
                    Err(_) => break,
                }
            }
        }

        if finished < self.workers.len() {
            warn!(
                "{} worker thread(s) did not stop within {:?}; detaching",
                self.workers.len() - finished,
                self.config.close_grace
            );
            self.workers.clear();
        } else {
            for worker in self.workers.drain(..) {
                let _ = worker.join();
            }
        }
        debug!("Closed peer on {}", self.addr);
    }
}

impl Drop for Peer {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handlers() -> (Option<MessageHandler>, Option<ErrorHandler>) {
        (Some(Box::new(|_, _| {})), Some(Box::new(|_| false)))
    }

    #[test]
    fn test_new_rejects_bad_client_id() {
        assert!(matches!(
            Peer::new("127.0.0.1:0", &[1]),
            Err(ErrorKind::InvalidClientId)
        ));
        assert!(matches!(
            Peer::new("127.0.0.1:0", &[1, 2, 3]),
            Err(ErrorKind::InvalidClientId)
        ));
        assert!(Peer::new("127.0.0.1:0", &[1, 2]).is_ok());
    }

    #[test]
    fn test_own_id_matches_identity_derivation() {
        let peer = Peer::new("127.0.0.1:4000", &[0x00, 0x01]).unwrap();
        let expected = OwnerId::from_addr("127.0.0.1".parse().unwrap(), &[0x00, 0x01]);
        assert_eq!(peer.owner_id(), expected);
    }

    #[test]
    fn test_listen_requires_handlers() {
        let mut peer = Peer::new("127.0.0.1:0", &[0, 1]).unwrap();
        let (on_message, on_error) = handlers();

        assert!(matches!(
            peer.listen(Duration::ZERO, Duration::ZERO, None, on_error),
            Err(ErrorKind::InvalidMessageHandler)
        ));
        assert!(matches!(
            peer.listen(Duration::ZERO, Duration::ZERO, on_message, None),
            Err(ErrorKind::InvalidErrorHandler)
        ));
        assert!(!peer.is_listening());
    }

    #[test]
    fn test_listen_is_idempotent_and_close_is_too() {
        let mut peer = Peer::new("127.0.0.1:0", &[0, 1]).unwrap();
        let (on_message, on_error) = handlers();
        peer.listen(Duration::from_secs(1), Duration::from_secs(5), on_message, on_error)
            .unwrap();
        assert!(peer.is_listening());

        // Second listen without handlers must not fail: it is a no-op.
        peer.listen(Duration::ZERO, Duration::ZERO, None, None).unwrap();

        peer.close();
        assert!(!peer.is_listening());
        peer.close();
    }

    #[test]
    fn test_send_before_listen_fails() {
        let peer = Peer::new("127.0.0.1:0", &[0, 1]).unwrap();
        assert!(matches!(peer.send("127.0.0.1:9", b"hi"), Err(ErrorKind::Io(_))));
    }

    #[test]
    fn test_send_after_close_fails() {
        let mut peer = Peer::new("127.0.0.1:0", &[0, 1]).unwrap();
        let (on_message, on_error) = handlers();
        peer.listen(Duration::from_secs(1), Duration::from_secs(5), on_message, on_error)
            .unwrap();
        peer.close();
        assert!(matches!(peer.send("127.0.0.1:9", b"hi"), Err(ErrorKind::Io(_))));
    }

    #[test]
    fn test_public_send_rejects_reserved_types() {
        let peer = Peer::new("127.0.0.1:0", &[0, 1]).unwrap();
        for reserved in [1u8, 2, 3, 4, 5, 42, 54] {
            assert!(matches!(
                peer.send_message("127.0.0.1:9", b"x", reserved),
                Err(ErrorKind::InvalidPacket)
            ));
        }
    }

    #[test]
    fn test_registry_queries_inert_before_listen() {
        let peer = Peer::new("127.0.0.1:0", &[0, 1]).unwrap();
        let id = OwnerId::from_addr("127.0.0.1".parse().unwrap(), &[9, 9]);
        assert!(peer.get(&id).is_none());
        assert!(!peer.has(&id));
        assert_eq!(peer.peer_count(), 0);
        assert!(peer.peers().is_empty());
        assert!(!peer.add(RemotePeer::new("127.0.0.1:9".parse().unwrap(), [9, 9], Instant::now())));
    }
}
