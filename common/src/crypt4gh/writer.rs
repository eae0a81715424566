use std::io::{Read, Write};

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;

use crate::crypt4gh::header::{Header, HeaderPacket, data_enc_packet_plaintext};
use crate::crypt4gh::keys::{PublicKey, SecretKey};
use crate::crypt4gh::{NONCE_SIZE, SEGMENT_SIZE};
use crate::error::PipelineError;

fn random_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rng().fill_bytes(&mut nonce);
    nonce
}

// rewrite a header so one more recipient can open the container
//
// every packet the given reader keys can open is re-encrypted for the new
// recipient and appended; existing packets (including ones for unknown
// recipients or with unknown methods) are preserved untouched, as are all
// data blocks, which this function never sees.
pub fn add_recipient(
    header: &Header,
    readers: &[SecretKey],
    recipient: &PublicKey,
) -> Result<Header, PipelineError> {
    let mut packets = header.packets.clone();
    let mut added = Vec::new();

    for packet in &header.packets {
        for reader in readers {
            if let Some(plain) = packet.decrypt(reader) {
                added.push(HeaderPacket::encrypt(
                    &plain,
                    reader,
                    recipient,
                    random_nonce(),
                ));
                break;
            }
        }
    }

    if added.is_empty() {
        return Err(PipelineError::DecryptionFailed);
    }

    packets.extend(added);
    Ok(Header { packets })
}

// encrypt a full container: header, then 64 KiB data blocks
//
// used by the token tooling and the test suites; the serving path only
// ever decrypts or rewrites headers.
pub fn encrypt_stream<R: Read, W: Write>(
    input: &mut R,
    out: &mut W,
    writer: &SecretKey,
    recipients: &[PublicKey],
) -> Result<(), PipelineError> {
    if recipients.is_empty() {
        return Err(PipelineError::BadKey("no recipients".into()));
    }

    let mut session_key = [0u8; 32];
    rand::rng().fill_bytes(&mut session_key);

    let packets = recipients
        .iter()
        .map(|recipient| {
            HeaderPacket::encrypt(
                &data_enc_packet_plaintext(&session_key),
                writer,
                recipient,
                random_nonce(),
            )
        })
        .collect();

    let header = Header { packets };
    header
        .write_to(out)
        .map_err(|err| PipelineError::Internal(err.to_string()))?;

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&session_key));

    let mut segment = vec![0u8; SEGMENT_SIZE];

    loop {
        let mut filled = 0;
        while filled < segment.len() {
            let n = input
                .read(&mut segment[filled..])
                .map_err(PipelineError::from_io)?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if filled == 0 {
            return Ok(());
        }

        let nonce = random_nonce();
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), &segment[..filled])
            .expect("in-memory chacha20poly1305 encrypt");

        out.write_all(&nonce)
            .and_then(|()| out.write_all(&ciphertext))
            .map_err(|err| PipelineError::Internal(err.to_string()))?;

        if filled < segment.len() {
            return Ok(());
        }
    }
}
