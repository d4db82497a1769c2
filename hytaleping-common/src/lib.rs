#![no_std]

//! Wire layout of the QUIC Initial datagram sent by the status probe.
//!
//! Values are written as literals, not computed from the encoded
//! sub-buffers: the packet only has to look like an Initial long enough
//! for the server to answer with something.

/// Minimum size of a client Initial datagram (RFC 9000 §14.1).
pub const INITIAL_PACKET_LEN: usize = 1200;

/// Long header, fixed bit, type Initial, 1-byte packet number.
pub const INITIAL_HEADER_BYTE: u8 = 0b1100_0000;
pub const QUIC_VERSION_1: u32 = 0x0000_0001;

pub const CONNECTION_ID_LEN: usize = 8;
pub const TOKEN_LEN: u8 = 0;

/// Payload length written into the 2-byte varint length field.
pub const DECLARED_PAYLOAD_LEN: u16 = 100;
pub const VARINT_2_BYTE_PREFIX: u16 = 0x4000;

pub const PACKET_NUMBER: u8 = 0;

pub const FRAME_TYPE_CRYPTO: u8 = 0x06;
pub const CRYPTO_OFFSET: u8 = 0;
pub const CRYPTO_DATA_LEN: usize = 50;

// TLS ClientHello fragment
pub const HANDSHAKE_CLIENT_HELLO: u8 = 0x01;
pub const CLIENT_HELLO_DECLARED_LEN: u32 = 46;
pub const TLS_LEGACY_VERSION: u16 = 0x0303;
pub const CLIENT_RANDOM_LEN: usize = 32;
pub const TLS_AES_128_GCM_SHA256: u16 = 0x1301;
pub const COMPRESSION_NULL: u8 = 0x00;

// Field offsets inside the datagram
pub const VERSION_OFFSET: usize = 1;
pub const DCID_LEN_OFFSET: usize = 5;
pub const DCID_OFFSET: usize = 6;
pub const SCID_LEN_OFFSET: usize = DCID_OFFSET + CONNECTION_ID_LEN;
pub const SCID_OFFSET: usize = SCID_LEN_OFFSET + 1;
pub const TOKEN_LEN_OFFSET: usize = SCID_OFFSET + CONNECTION_ID_LEN;
pub const LENGTH_OFFSET: usize = TOKEN_LEN_OFFSET + 1;
pub const PACKET_NUMBER_OFFSET: usize = LENGTH_OFFSET + 2;
pub const CRYPTO_FRAME_OFFSET: usize = PACKET_NUMBER_OFFSET + 1;
pub const CRYPTO_DATA_OFFSET: usize = CRYPTO_FRAME_OFFSET + 3;
pub const CLIENT_RANDOM_OFFSET: usize = CRYPTO_DATA_OFFSET + 6;
pub const PADDING_OFFSET: usize = CRYPTO_DATA_OFFSET + CRYPTO_DATA_LEN;

/// Value of the 2-byte length field at [`LENGTH_OFFSET`].
pub const fn length_field() -> u16 {
    VARINT_2_BYTE_PREFIX | DECLARED_PAYLOAD_LEN
}

/// Random material consumed by one Initial packet.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InitialSecrets {
    pub destination_cid: [u8; CONNECTION_ID_LEN],
    pub source_cid: [u8; CONNECTION_ID_LEN],
    pub client_random: [u8; CLIENT_RANDOM_LEN],
}

impl InitialSecrets {
    pub const ZERO: Self = Self {
        destination_cid: [0; CONNECTION_ID_LEN],
        source_cid: [0; CONNECTION_ID_LEN],
        client_random: [0; CLIENT_RANDOM_LEN],
    };
}

/// Synthetic ClientHello carried in the CRYPTO frame, zero-padded to
/// [`CRYPTO_DATA_LEN`] bytes.
pub fn client_hello_fragment(client_random: &[u8; CLIENT_RANDOM_LEN]) -> [u8; CRYPTO_DATA_LEN] {
    let mut out = [0u8; CRYPTO_DATA_LEN];
    let len = CLIENT_HELLO_DECLARED_LEN.to_be_bytes();

    out[0] = HANDSHAKE_CLIENT_HELLO;
    out[1..4].copy_from_slice(&len[1..]);
    out[4..6].copy_from_slice(&TLS_LEGACY_VERSION.to_be_bytes());
    out[6..6 + CLIENT_RANDOM_LEN].copy_from_slice(client_random);

    let mut pos = 6 + CLIENT_RANDOM_LEN;
    // empty session id
    out[pos] = 0;
    pos += 1;
    out[pos..pos + 2].copy_from_slice(&2u16.to_be_bytes());
    pos += 2;
    out[pos..pos + 2].copy_from_slice(&TLS_AES_128_GCM_SHA256.to_be_bytes());
    pos += 2;
    out[pos] = 1;
    out[pos + 1] = COMPRESSION_NULL;

    out
}
