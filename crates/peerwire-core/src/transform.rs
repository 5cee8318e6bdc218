//! Pluggable payload transforms.
//!
//! Two capability pairs can be installed on a peer: a [`Compressor`]
//! (compress/decompress) and an [`Encrypter`] (encrypt/decrypt keyed by the
//! peer owner id). Either slot may be empty, which disables that stage.
//! The built-in implementations are placeholders; real cryptography is
//! host-supplied, with the owner id acting only as a routing tag into the
//! host's key material.

use std::io::{Read, Write};

use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};

use crate::{
    error::{ErrorKind, Result},
    identity::OwnerId,
};

/// A reversible compression scheme applied to outgoing message payloads.
pub trait Compressor: Send {
    /// Compresses a payload.
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Reverses [`Compressor::compress`].
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// A reversible encryption scheme applied to outgoing message payloads.
///
/// The owner id names whose key material applies: the sender's own id on
/// encrypt, the remote sender's id on decrypt. The library stores no keys.
pub trait Encrypter: Send {
    /// Encrypts a payload under the key material for `owner`.
    fn encrypt(&self, owner: &OwnerId, data: &[u8]) -> Result<Vec<u8>>;

    /// Reverses [`Encrypter::encrypt`].
    fn decrypt(&self, owner: &OwnerId, data: &[u8]) -> Result<Vec<u8>>;
}

/// The transform slots installed on a peer. Empty slots disable their
/// stage entirely; no flag is set and no bytes change.
#[derive(Default)]
pub struct Transforms {
    /// Optional compression stage.
    pub compressor: Option<Box<dyn Compressor>>,
    /// Optional encryption stage.
    pub encrypter: Option<Box<dyn Encrypter>>,
}

impl std::fmt::Debug for Transforms {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transforms")
            .field("compressor", &self.compressor.as_ref().map(|_| "<compressor>"))
            .field("encrypter", &self.encrypter.as_ref().map(|_| "<encrypter>"))
            .finish()
    }
}

/// Zlib-backed [`Compressor`].
#[derive(Debug, Clone, Copy)]
pub struct ZlibCompressor {
    level: Compression,
}

impl ZlibCompressor {
    /// Creates a compressor with the default zlib level.
    pub fn new() -> Self {
        Self { level: Compression::default() }
    }

    /// Creates a compressor with an explicit zlib level.
    pub fn with_level(level: Compression) -> Self {
        Self { level }
    }
}

impl Default for ZlibCompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compressor for ZlibCompressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::new(), self.level);
        encoder.write_all(data).map_err(|e| ErrorKind::Transform(e.to_string()))?;
        encoder.finish().map_err(|e| ErrorKind::Transform(e.to_string()))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = ZlibDecoder::new(data);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).map_err(|e| ErrorKind::Transform(e.to_string()))?;
        Ok(out)
    }
}

/// XOR-masking [`Encrypter`] placeholder.
///
/// Masks each byte with the owner id digest, cycled. This provides **no
/// confidentiality whatsoever**; it exists to exercise the encrypted
/// code path and as a template for a real implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct XorEncrypter;

impl XorEncrypter {
    fn mask(owner: &OwnerId, data: &[u8]) -> Vec<u8> {
        let key = owner.as_bytes();
        data.iter().enumerate().map(|(i, b)| b ^ key[i % key.len()]).collect()
    }
}

impl Encrypter for XorEncrypter {
    fn encrypt(&self, owner: &OwnerId, data: &[u8]) -> Result<Vec<u8>> {
        Ok(Self::mask(owner, data))
    }

    fn decrypt(&self, owner: &OwnerId, data: &[u8]) -> Result<Vec<u8>> {
        Ok(Self::mask(owner, data))
    }
}
