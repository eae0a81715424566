use std::io::Read;

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};

use crate::crypt4gh::header::Header;
use crate::crypt4gh::keys::SecretKey;
use crate::crypt4gh::{CIPHER_SEGMENT_SIZE, MAC_SIZE, NONCE_SIZE};
use crate::error::PipelineError;

// streaming decryptor
//
// parses the header eagerly (so key failures surface before any plaintext
// is promised) and then decrypts one data block at a time as the caller
// reads.  peak memory is one cipher segment plus one plaintext segment.
pub struct Decryptor<R> {
    inner: R,
    ciphers: Vec<ChaCha20Poly1305>,
    buffer: Vec<u8>,
    pos: usize,
    eof: bool,
}

impl<R> std::fmt::Debug for Decryptor<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decryptor")
            .field("pos", &self.pos)
            .field("eof", &self.eof)
            .finish()
    }
}

impl<R: Read> Decryptor<R> {
    pub fn new(mut inner: R, readers: &[SecretKey]) -> Result<Self, PipelineError> {
        let header = Header::read_from(&mut inner)?;

        let keys = header.data_keys(readers);
        if keys.is_empty() {
            return Err(PipelineError::DecryptionFailed);
        }

        let ciphers = keys
            .iter()
            .map(|key| ChaCha20Poly1305::new(Key::from_slice(key)))
            .collect();

        Ok(Decryptor {
            inner,
            ciphers,
            buffer: Vec::new(),
            pos: 0,
            eof: false,
        })
    }

    // pull and decrypt the next data block; sets eof on a clean end
    fn fill(&mut self) -> std::io::Result<()> {
        let mut segment = vec![0u8; CIPHER_SEGMENT_SIZE];
        let mut filled = 0;

        while filled < segment.len() {
            let n = self.inner.read(&mut segment[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if filled == 0 {
            self.eof = true;
            return Ok(());
        }

        // a block smaller than nonce + mac cannot authenticate
        if filled <= NONCE_SIZE + MAC_SIZE {
            return Err(PipelineError::DecryptionFailed.into());
        }

        let (nonce, ciphertext) = segment[..filled].split_at(NONCE_SIZE);

        let plain = self
            .ciphers
            .iter()
            .find_map(|cipher| cipher.decrypt(Nonce::from_slice(nonce), ciphertext).ok())
            .ok_or(PipelineError::DecryptionFailed)?;

        self.buffer = plain;
        self.pos = 0;
        Ok(())
    }
}

impl<R: Read> Read for Decryptor<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        while self.pos >= self.buffer.len() {
            if self.eof {
                return Ok(0);
            }
            self.fill()?;
        }

        let n = (self.buffer.len() - self.pos).min(buf.len());
        buf[..n].copy_from_slice(&self.buffer[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypt4gh::writer::encrypt_stream;

    #[test]
    fn decrypts_what_the_writer_wrote() {
        let writer_key = SecretKey::from_bytes([1u8; 32]);
        let reader_key = SecretKey::from_bytes([2u8; 32]);

        let plaintext = b"Super super secret file";

        let mut container = Vec::new();
        encrypt_stream(
            &mut plaintext.as_slice(),
            &mut container,
            &writer_key,
            &[reader_key.public()],
        )
        .unwrap();

        let mut decryptor = Decryptor::new(container.as_slice(), &[reader_key]).unwrap();
        let mut out = Vec::new();
        decryptor.read_to_end(&mut out).unwrap();

        assert_eq!(out, plaintext);
    }

    #[test]
    fn multi_segment_payload() {
        let writer_key = SecretKey::from_bytes([1u8; 32]);
        let reader_key = SecretKey::from_bytes([2u8; 32]);

        // three full segments plus a tail
        let plaintext: Vec<u8> = (0..(crate::crypt4gh::SEGMENT_SIZE * 3 + 17))
            .map(|i| (i % 251) as u8)
            .collect();

        let mut container = Vec::new();
        encrypt_stream(
            &mut plaintext.as_slice(),
            &mut container,
            &writer_key,
            &[reader_key.public()],
        )
        .unwrap();

        let mut decryptor = Decryptor::new(container.as_slice(), &[reader_key]).unwrap();
        let mut out = Vec::new();
        decryptor.read_to_end(&mut out).unwrap();

        assert_eq!(out, plaintext);
    }

    #[test]
    fn wrong_key_fails_at_construction() {
        let writer_key = SecretKey::from_bytes([1u8; 32]);
        let reader_key = SecretKey::from_bytes([2u8; 32]);
        let wrong_key = SecretKey::from_bytes([3u8; 32]);

        let mut container = Vec::new();
        encrypt_stream(
            &mut b"payload".as_slice(),
            &mut container,
            &writer_key,
            &[reader_key.public()],
        )
        .unwrap();

        let err = Decryptor::new(container.as_slice(), &[wrong_key]).unwrap_err();
        assert!(matches!(err, PipelineError::DecryptionFailed));
    }

    #[test]
    fn truncated_block_is_an_error() {
        let writer_key = SecretKey::from_bytes([1u8; 32]);
        let reader_key = SecretKey::from_bytes([2u8; 32]);

        let mut container = Vec::new();
        encrypt_stream(
            &mut b"payload".as_slice(),
            &mut container,
            &writer_key,
            &[reader_key.public()],
        )
        .unwrap();

        container.truncate(container.len() - 10);

        let mut decryptor = Decryptor::new(container.as_slice(), &[reader_key]).unwrap();
        let mut out = Vec::new();
        assert!(decryptor.read_to_end(&mut out).is_err());
    }
}
