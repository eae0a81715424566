pub mod header;
pub mod keys;
pub mod reader;
pub mod writer;

pub use header::Header;
pub use keys::{PublicKey, SecretKey};
pub use reader::Decryptor;

use blake2::{Blake2b512, Digest};
use chacha20poly1305::Key;

// container framing
//
// a crypt4gh file is a header (magic, version, recipient-keyed packets
// holding the data encryption key) followed by independently encrypted
// 64 KiB data blocks.  adding a recipient touches only the header.
pub const MAGIC: &[u8; 8] = b"crypt4gh";
pub const VERSION: u32 = 1;

pub const SEGMENT_SIZE: usize = 65_536;
pub const NONCE_SIZE: usize = 12;
pub const MAC_SIZE: usize = 16;
pub const CIPHER_SEGMENT_SIZE: usize = SEGMENT_SIZE + NONCE_SIZE + MAC_SIZE;

// header packet encryption method
pub const X25519_CHACHA20_POLY1305: u32 = 0;

// data encryption method carried inside a data-enc-parameters packet
pub const CHACHA20_IETF_POLY1305: u32 = 0;

// header packet types
pub const PACKET_DATA_ENC_PARAMETERS: u32 = 0;

// packet key derivation, shared by the encrypting and decrypting sides
//
// the symmetric key protecting a header packet is the first half of
// blake2b-512 over the x25519 shared secret and both public keys, in
// writer-then-reader order
pub(crate) fn packet_key(shared: &[u8; 32], writer_pub: &[u8; 32], reader_pub: &[u8; 32]) -> Key {
    let digest = Blake2b512::new()
        .chain_update(shared)
        .chain_update(writer_pub)
        .chain_update(reader_pub)
        .finalize();

    *Key::from_slice(&digest[..32])
}
