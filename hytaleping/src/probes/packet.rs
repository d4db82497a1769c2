//! QUIC Initial datagram used as the probe payload.
//!
//! The datagram is padded to 1200 bytes so that a QUIC stack does not
//! drop it as undersized. It is not a valid Initial (no header
//! protection, no AEAD); it only has to provoke some reply.

use bytes::{BufMut, Bytes, BytesMut};
use hytaleping_common::{
    CONNECTION_ID_LEN, CRYPTO_DATA_LEN, CRYPTO_OFFSET, DCID_OFFSET, FRAME_TYPE_CRYPTO,
    INITIAL_HEADER_BYTE, INITIAL_PACKET_LEN, InitialSecrets, PACKET_NUMBER, QUIC_VERSION_1,
    SCID_OFFSET, TOKEN_LEN, client_hello_fragment, length_field,
};
use rand::{TryCryptoRng, TryRngCore, rngs::OsRng};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PacketError {
    #[error("random source unavailable: {0}")]
    Entropy(String),
}

/// An encoded, fixed-size Initial datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialPacket {
    bytes: Bytes,
}

impl InitialPacket {
    pub fn encode(secrets: &InitialSecrets) -> Self {
        let mut buf = BytesMut::with_capacity(INITIAL_PACKET_LEN);

        buf.put_u8(INITIAL_HEADER_BYTE);
        buf.put_u32(QUIC_VERSION_1);
        buf.put_u8(CONNECTION_ID_LEN as u8);
        buf.put_slice(&secrets.destination_cid);
        buf.put_u8(CONNECTION_ID_LEN as u8);
        buf.put_slice(&secrets.source_cid);
        buf.put_u8(TOKEN_LEN);
        buf.put_u16(length_field());
        buf.put_u8(PACKET_NUMBER);

        // CRYPTO frame
        buf.put_u8(FRAME_TYPE_CRYPTO);
        buf.put_u8(CRYPTO_OFFSET);
        buf.put_u8(CRYPTO_DATA_LEN as u8);
        buf.put_slice(&client_hello_fragment(&secrets.client_random));

        let padding = INITIAL_PACKET_LEN - buf.len();
        buf.put_bytes(0, padding);

        Self { bytes: buf.freeze() }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn destination_cid(&self) -> &[u8] {
        &self.bytes[DCID_OFFSET..DCID_OFFSET + CONNECTION_ID_LEN]
    }

    pub fn source_cid(&self) -> &[u8] {
        &self.bytes[SCID_OFFSET..SCID_OFFSET + CONNECTION_ID_LEN]
    }
}

/// Builds Initial packets with fresh connection IDs and ClientHello
/// random on every call. Defaults to the OS CSPRNG.
#[derive(Debug)]
pub struct PacketBuilder<R = OsRng> {
    rng: R,
}

impl PacketBuilder {
    pub fn new() -> Self {
        Self { rng: OsRng }
    }
}

impl Default for PacketBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: TryCryptoRng> PacketBuilder<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }

    pub fn build(&mut self) -> Result<InitialPacket, PacketError> {
        let mut secrets = InitialSecrets::ZERO;
        self.fill(&mut secrets.destination_cid)?;
        self.fill(&mut secrets.source_cid)?;
        self.fill(&mut secrets.client_random)?;
        Ok(InitialPacket::encode(&secrets))
    }

    fn fill(&mut self, dest: &mut [u8]) -> Result<(), PacketError> {
        self.rng
            .try_fill_bytes(dest)
            .map_err(|e| PacketError::Entropy(e.to_string()))
    }
}
