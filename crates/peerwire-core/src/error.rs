use std::{fmt, io};

/// Convenience alias over the crate error type.
pub type Result<T> = std::result::Result<T, ErrorKind>;

/// Errors that can occur while constructing a peer, processing datagrams,
/// or sending messages.
#[derive(Debug)]
pub enum ErrorKind {
    /// A client id was requested from an unparseable address, or a client
    /// id of the wrong length was supplied.
    InvalidClientId,
    /// An inbound datagram did not satisfy the framing format: too short
    /// for its flags, inconsistent sub-sequence, or a reserved message
    /// type arriving on the wire.
    InvalidPacket,
    /// `listen` was called without a message handler.
    InvalidMessageHandler,
    /// `listen` was called without an error handler.
    InvalidErrorHandler,
    /// An outgoing message would need more fragments than the one-byte
    /// fragment count can express.
    PacketTooLarge(usize),
    /// A datagram carried no payload after inverse transforms.
    NoData,
    /// A payload transform (compression or encryption stage) failed.
    Transform(String),
    /// An I/O error from the underlying transport.
    Io(io::Error),
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::InvalidClientId => write!(f, "Invalid client id specified"),
            ErrorKind::InvalidPacket => write!(f, "Invalid packet format"),
            ErrorKind::InvalidMessageHandler => write!(f, "Invalid message handler"),
            ErrorKind::InvalidErrorHandler => write!(f, "Invalid error handler"),
            ErrorKind::PacketTooLarge(size) => {
                write!(f, "Message of {} bytes exceeds the fragmentable maximum", size)
            }
            ErrorKind::NoData => write!(f, "No data in packet"),
            ErrorKind::Transform(reason) => write!(f, "Payload transform failed: {}", reason),
            ErrorKind::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for ErrorKind {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ErrorKind::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for ErrorKind {
    fn from(err: io::Error) -> Self {
        ErrorKind::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(ErrorKind::InvalidClientId.to_string(), "Invalid client id specified");
        assert_eq!(ErrorKind::InvalidPacket.to_string(), "Invalid packet format");
        assert_eq!(ErrorKind::NoData.to_string(), "No data in packet");
        assert!(ErrorKind::PacketTooLarge(500_000).to_string().contains("500000"));
    }

    #[test]
    fn test_io_conversion_keeps_source() {
        use std::error::Error;

        let err: ErrorKind = io::Error::new(io::ErrorKind::ConnectionRefused, "nope").into();
        assert!(matches!(err, ErrorKind::Io(_)));
        assert!(err.source().is_some());
    }
}
