//! Peer identity derivation.
//!
//! Identity is independent of the transport address a datagram happens to
//! arrive from. Every sender stamps a 2-byte client id (derived from its
//! *private* address) into each datagram; the receiver combines that with
//! the *public* source address it observed to form a 16-byte owner id.
//! Two clients behind the same NAT share a public address but differ in
//! client id; one client keeps its owner id across sessions as long as its
//! public and private addressing is stable.

use std::{
    fmt,
    net::{IpAddr, SocketAddr},
};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use md5::{Digest, Md5};

use crate::error::{ErrorKind, Result};

/// Normalizes an IP address to its 16-byte IPv6 form. IPv4 addresses are
/// mapped (`::ffff:a.b.c.d`).
pub fn ipv6_octets(ip: IpAddr) -> [u8; 16] {
    match ip {
        IpAddr::V4(v4) => v4.to_ipv6_mapped().octets(),
        IpAddr::V6(v6) => v6.octets(),
    }
}

/// Derives a 2-byte client id from the host's local (private) IP address.
///
/// The id is the low two bytes of the IPv6-normalized address: for
/// `192.168.2.101` that is `[0x02, 0x65]`, the part that distinguishes
/// hosts within a typical subnet. IPv6 literals may be enclosed in
/// brackets (`[fe80::1]`).
///
/// Returns [`ErrorKind::InvalidClientId`] if `addr` does not parse as an
/// IP address.
pub fn client_id_for_ip(addr: &str) -> Result<[u8; 2]> {
    let trimmed = addr.strip_prefix('[').unwrap_or(addr);
    let trimmed = trimmed.strip_suffix(']').unwrap_or(trimmed);

    let ip: IpAddr = trimmed.parse().map_err(|_| ErrorKind::InvalidClientId)?;
    let octets = ipv6_octets(ip);
    Ok([octets[14], octets[15]])
}

/// A stable 16-byte identifier for a remote peer.
///
/// It is the MD5 digest of the peer's observed public IPv6 address (16
/// bytes) followed by its client id (2 bytes). It is derived by the
/// receiver, never transmitted, and is *not* a session key or any kind of
/// security credential; MD5 is used purely as a cheap mixing function.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerId([u8; 16]);

impl OwnerId {
    /// Derives the owner id from a normalized source address and client id.
    pub fn derive(source_ipv6: &[u8; 16], client_id: &[u8; 2]) -> Self {
        let mut hasher = Md5::new();
        hasher.update(source_ipv6);
        hasher.update(client_id);
        OwnerId(hasher.finalize().into())
    }

    /// Derives the owner id a receiver would compute for datagrams sent
    /// from `ip` with the given client id.
    pub fn from_addr(ip: IpAddr, client_id: &[u8; 2]) -> Self {
        Self::derive(&ipv6_octets(ip), client_id)
    }

    /// Derives the owner id from a socket address (the port is ignored;
    /// identity survives NAT port rebinding).
    pub fn from_socket_addr(addr: SocketAddr, client_id: &[u8; 2]) -> Self {
        Self::from_addr(addr.ip(), client_id)
    }

    /// Wraps a raw 16-byte digest.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        OwnerId(bytes)
    }

    /// Returns the raw 16-byte digest.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Renders the id as 24 characters of standard, padded base64. Handy
    /// as a log tag or a key into host-supplied key material.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl fmt::Debug for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OwnerId({})", self.to_base64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_from_ipv4() {
        assert_eq!(client_id_for_ip("192.168.2.101").unwrap(), [0x02, 0x65]);
        assert_eq!(client_id_for_ip("192.168.2.102").unwrap(), [0x02, 0x66]);
    }

    #[test]
    fn test_client_id_from_ipv6() {
        assert_eq!(client_id_for_ip("fe80::222:15ff:fe65:b2f9").unwrap(), [0xb2, 0xf9]);
        assert_eq!(client_id_for_ip("fe80::222:15ff:fe65:b2fa").unwrap(), [0xb2, 0xfa]);
    }

    #[test]
    fn test_client_id_accepts_bracketed_literal() {
        assert_eq!(
            client_id_for_ip("[fe80::222:15ff:fe65:b2f9]").unwrap(),
            client_id_for_ip("fe80::222:15ff:fe65:b2f9").unwrap()
        );
    }

    #[test]
    fn test_client_id_rejects_garbage() {
        assert!(matches!(client_id_for_ip("not-an-ip"), Err(ErrorKind::InvalidClientId)));
        assert!(matches!(client_id_for_ip(""), Err(ErrorKind::InvalidClientId)));
    }

    #[test]
    fn test_owner_id_distinguishes_clients_behind_shared_nat() {
        let public: IpAddr = "80.254.11.3".parse().unwrap();
        let a = OwnerId::from_addr(public, &client_id_for_ip("192.168.2.101").unwrap());
        let b = OwnerId::from_addr(public, &client_id_for_ip("192.168.2.102").unwrap());
        assert_ne!(a, b);
    }

    #[test]
    fn test_owner_id_is_deterministic() {
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        let a = OwnerId::from_addr(ip, &[0x00, 0x01]);
        let b = OwnerId::from_addr(ip, &[0x00, 0x01]);
        assert_eq!(a, b);
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_owner_id_matches_digest_of_prefixed_buffer() {
        // The receiver hashes the first 18 bytes of the reconstructed
        // buffer; deriving from parts must agree with that.
        let ip: IpAddr = "10.0.0.7".parse().unwrap();
        let client_id = [0xab, 0xcd];

        let mut buf = [0u8; 18];
        buf[..16].copy_from_slice(&ipv6_octets(ip));
        buf[16..].copy_from_slice(&client_id);

        let direct: [u8; 16] = Md5::digest(buf).into();
        assert_eq!(OwnerId::from_addr(ip, &client_id).as_bytes(), &direct);
    }

    #[test]
    fn test_base64_rendering() {
        let id = OwnerId::from_addr("127.0.0.1".parse().unwrap(), &[0, 1]);
        let encoded = id.to_base64();
        assert_eq!(encoded.len(), 24);
        assert!(encoded.ends_with("=="));
        assert_eq!(format!("{}", id), encoded);
    }
}
