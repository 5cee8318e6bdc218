//! The receive loop, inbound dispatch, and the keepalive ticker.

use std::{
    io,
    net::SocketAddr,
    sync::{atomic::Ordering, Arc},
    time::{Duration, Instant},
};

use crossbeam_channel::Receiver;
use peerwire_core::{
    constants::{ADDR_PREFIX_SIZE, MIN_DATAGRAM_SIZE, UDP_HEADER_SIZE},
    error::{ErrorKind, Result},
    identity::ipv6_octets,
    transport::DatagramSocket,
};
use peerwire_peer::RemotePeer;
use peerwire_protocol::{
    frame::Frame,
    message::{self, MessageKind},
};
use tracing::{debug, error, trace};

use super::Shared;
use crate::event::PeerEvent;

/// What one valid datagram produced, computed under the engine mutex and
/// dispatched outside it.
struct Inbound {
    /// Snapshot of the sender's record after the update.
    snapshot: RemotePeer,
    /// Whether this datagram is the first ever seen from the sender.
    fresh: bool,
    /// The inverse-transformed message, or `None` while a fragmented
    /// message is still incomplete.
    message: Option<Vec<u8>>,
}

/// Blocks on the socket until the tombstone is set or the error handler
/// turns an error fatal.
pub(crate) fn receive_loop<S: DatagramSocket>(shared: Arc<Shared<S>>) {
    // Room for the address prefix plus the largest datagram a conforming
    // sender can emit.
    let mut buf = vec![0u8; ADDR_PREFIX_SIZE + shared.config.packet_size - UDP_HEADER_SIZE];

    while shared.open.load(Ordering::Relaxed) {
        let (size, source) = match shared.socket.recv_from(&mut buf[ADDR_PREFIX_SIZE..]) {
            Ok(received) => received,
            Err(err)
                if matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
            {
                // Bounded read expired; re-check the tombstone.
                continue;
            }
            Err(err) => {
                if shared.report(ErrorKind::Io(err)) {
                    break;
                }
                continue;
            }
        };
        let now = shared.clock.now();

        // Need the framing header plus at least the message-type byte.
        if size < MIN_DATAGRAM_SIZE {
            if shared.report(ErrorKind::InvalidPacket) {
                break;
            }
            continue;
        }

        buf[..ADDR_PREFIX_SIZE].copy_from_slice(&ipv6_octets(source.ip()));

        let inbound = match handle_frame(&shared, &buf[..ADDR_PREFIX_SIZE + size], source, now) {
            Ok(inbound) => inbound,
            Err(err @ ErrorKind::Transform(_)) => {
                // Transform failures drop the datagram but never stop the
                // loop.
                shared.report(err);
                continue;
            }
            Err(err) => {
                if shared.report(err) {
                    break;
                }
                continue;
            }
        };

        if inbound.fresh {
            debug!("Peer {} connected from {}", inbound.snapshot.owner_id(), source);
            shared.emit(&inbound.snapshot, PeerEvent::Connected);
        }

        let Some(message) = inbound.message else {
            continue;
        };
        if dispatch_message(&shared, inbound.snapshot, message, now) {
            break;
        }
    }
    debug!("Receive loop exiting");
}

/// Parses one datagram and updates the sender's record, reassembly slot,
/// and transforms under the engine mutex.
fn handle_frame<S: DatagramSocket>(
    shared: &Shared<S>,
    buf: &[u8],
    source: SocketAddr,
    now: Instant,
) -> Result<Inbound> {
    let frame = Frame::parse(buf)?;
    let owner = frame.owner();
    let flags = frame.flags();
    trace!("{} from {}", frame, source);

    let mut state = shared.state.lock().unwrap();
    let state = &mut *state;

    if !state.registry.has(&owner) {
        state.registry.add(RemotePeer::with_owner(owner, frame.client_id(), source, now));
    }
    let record = state.registry.get_mut(&owner).expect("peer record just ensured");
    record.touch(source, frame.sequence(), now);

    let raw = if flags.is_fragmented() {
        let (index, total) = frame.sub_sequence();
        // Fragment i of a message carries sequence base + i, so the base
        // identifies which message this fragment belongs to.
        let base = frame.sequence().wrapping_sub(index as u16);
        state.registry.accept_fragment(owner, base, total, index, frame.payload(), now)
    } else {
        Some(frame.payload().to_vec())
    };

    let message = match raw {
        Some(mut message) => {
            if flags.is_encrypted() {
                if let Some(encrypter) = &state.transforms.encrypter {
                    message = encrypter.decrypt(&owner, &message)?;
                }
            }
            if flags.is_compressed() {
                if let Some(compressor) = &state.transforms.compressor {
                    message = compressor.decompress(&message)?;
                }
            }
            Some(message)
        }
        None => None,
    };

    let record = state.registry.get_mut(&owner).expect("peer record present");
    let fresh = record.mark_announced();
    let snapshot = record.clone();
    Ok(Inbound { snapshot, fresh, message })
}

/// Routes one complete message: control traffic is consumed here,
/// everything else goes to the application handler. Returns `true` when
/// the error handler asked to stop the loop.
fn dispatch_message<S: DatagramSocket>(
    shared: &Shared<S>,
    snapshot: RemotePeer,
    message: Vec<u8>,
    now: Instant,
) -> bool {
    let Some((&message_type, body)) = message.split_first() else {
        return shared.report(ErrorKind::NoData);
    };

    if message_type == MessageKind::Ping.to_u8() {
        // Echo the sender's timestamp straight back; the round trip is
        // measured entirely on its clock.
        match message::decode_timestamp(body) {
            Ok(timestamp) => {
                let echo = message::encode_timestamp(timestamp);
                if let Err(err) =
                    shared.send_message(snapshot.addr(), &echo, MessageKind::Pong.to_u8())
                {
                    error!("Failed to answer ping from {}: {}", snapshot.owner_id(), err);
                }
                false
            }
            Err(err) => shared.report(err),
        }
    } else if message_type == MessageKind::Pong.to_u8() {
        match message::decode_timestamp(body) {
            Ok(echoed_us) => {
                let rtt_us = shared.micros_at(now).saturating_sub(echoed_us);
                let updated = {
                    let mut state = shared.state.lock().unwrap();
                    state.registry.get_mut(&snapshot.owner_id()).map(|record| {
                        let average = record.record_latency_sample(rtt_us);
                        (record.clone(), average)
                    })
                };
                if let Some((snapshot, average_us)) = updated {
                    let value = average_us.min(u16::MAX as u64) as u16;
                    shared.emit(&snapshot, PeerEvent::Latency(value));
                }
                false
            }
            Err(err) => shared.report(err),
        }
    } else if message::is_reserved_inbound(message_type) {
        // The locally-synthesized kinds and the reserved range have no
        // business arriving on the wire.
        shared.report(ErrorKind::InvalidPacket)
    } else {
        shared.emit(
            &snapshot,
            PeerEvent::Data { message_type, payload: body.to_vec() },
        );
        false
    }
}

/// Fires every `ping_interval` until shut down; each tick ages out silent
/// peers and pings the rest.
pub(crate) fn ticker_loop<S: DatagramSocket>(
    shared: Arc<Shared<S>>,
    ping_interval: Duration,
    timeout: Duration,
    shutdown: Receiver<()>,
) {
    let ticker = crossbeam_channel::tick(ping_interval);
    loop {
        crossbeam_channel::select! {
            recv(ticker) -> _ => {
                if !shared.open.load(Ordering::Relaxed) {
                    break;
                }
                tick(&shared, timeout);
            }
            recv(shutdown) -> _ => break,
        }
    }
    debug!("Ticker loop exiting");
}

/// One keepalive round.
fn tick<S: DatagramSocket>(shared: &Shared<S>, timeout: Duration) {
    let now = shared.clock.now();

    let (dropped, targets) = {
        let mut state = shared.state.lock().unwrap();
        state.registry.drop_stale_reassembly(now, shared.config.reassembly_timeout);

        let dropped: Vec<RemotePeer> = state
            .registry
            .expired(now, timeout)
            .iter()
            .filter_map(|id| state.registry.remove(id))
            .collect();
        (dropped, state.registry.ping_targets())
    };

    for peer in &dropped {
        debug!("Peer {} timed out after {:?} idle", peer.owner_id(), peer.idle_for(now));
        shared.emit(peer, PeerEvent::Disconnected);
    }

    let stamp = message::encode_timestamp(shared.micros_at(now));
    for addr in targets {
        if let Err(err) = shared.send_message(addr, &stamp, MessageKind::Ping.to_u8()) {
            error!("Failed to ping {}: {}", addr, err);
        }
    }
}
