//! The send engine: transforms, header stamping, fragmentation.

use std::{io, net::SocketAddr, sync::atomic::Ordering};

use peerwire_core::{
    constants::{DATA_HEADER_SIZE, FRAGMENT_HEADER_SIZE},
    error::{ErrorKind, Result},
    transport::DatagramSocket,
};
use peerwire_protocol::{fragment, frame, frame::Flags};
use tracing::trace;

use super::Shared;

impl<S: DatagramSocket> Shared<S> {
    /// Builds and writes the datagram(s) carrying one message.
    ///
    /// The message is the type byte followed by `data`; transforms apply
    /// to the whole message so the receiver can only dispatch after
    /// reversing them. Each emitted datagram consumes one sequence
    /// number, fragments included.
    pub(crate) fn send_message(
        &self,
        dest: SocketAddr,
        data: &[u8],
        message_type: u8,
    ) -> Result<()> {
        if !self.open.load(Ordering::Relaxed) {
            return Err(ErrorKind::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "peer is closed",
            )));
        }

        let mut state = self.state.lock().unwrap();
        let state = &mut *state;

        let mut flags = Flags::default();
        let mut message = Vec::with_capacity(data.len() + 1);
        message.push(message_type);
        message.extend_from_slice(data);

        if let Some(compressor) = &state.transforms.compressor {
            message = compressor.compress(&message)?;
            flags.insert(Flags::COMPRESSED);
        }
        if let Some(encrypter) = &state.transforms.encrypter {
            message = encrypter.encrypt(&self.own_id, &message)?;
            flags.insert(Flags::ENCRYPTED);
        }

        if message.len() <= fragment::max_single_message(self.config.packet_size) {
            let sequence = state.next_sequence();
            frame::write_data_header(&mut state.scratch, &self.client_id, flags, sequence);
            state.scratch[DATA_HEADER_SIZE..DATA_HEADER_SIZE + message.len()]
                .copy_from_slice(&message);
            trace!("Sending {} byte datagram (seq {}) to {}", message.len(), sequence, dest);
            self.socket.send_to(&dest, &state.scratch[..DATA_HEADER_SIZE + message.len()])?;
            return Ok(());
        }

        // Validate the fragment count before emitting anything, so an
        // oversized message sends either all its datagrams or none.
        let total = fragment::count_for(message.len(), self.config.packet_size)?;
        flags.insert(Flags::FRAGMENTED);
        trace!("Fragmenting {} byte message into {} datagrams for {}", message.len(), total, dest);

        for (index, chunk) in message.chunks(fragment::chunk_size(self.config.packet_size)).enumerate()
        {
            let sequence = state.next_sequence();
            frame::write_fragment_header(
                &mut state.scratch,
                &self.client_id,
                flags,
                sequence,
                index as u8,
                total,
            );
            state.scratch[FRAGMENT_HEADER_SIZE..FRAGMENT_HEADER_SIZE + chunk.len()]
                .copy_from_slice(chunk);
            self.socket.send_to(&dest, &state.scratch[..FRAGMENT_HEADER_SIZE + chunk.len()])?;
        }
        Ok(())
    }
}
