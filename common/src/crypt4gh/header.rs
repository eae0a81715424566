use std::io::{Read, Write};

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};

use crate::crypt4gh::keys::{PublicKey, SecretKey};
use crate::crypt4gh::{
    CHACHA20_IETF_POLY1305, MAGIC, NONCE_SIZE, PACKET_DATA_ENC_PARAMETERS, VERSION,
    X25519_CHACHA20_POLY1305, packet_key,
};
use crate::error::PipelineError;

// header packets
//
// each packet is encrypted separately for one recipient.  packets with an
// encryption method we do not implement are carried opaquely so a header
// rewrite never drops them.
#[derive(Clone, Debug)]
pub enum HeaderPacket {
    X25519 {
        writer_pubkey: [u8; 32],
        nonce: [u8; NONCE_SIZE],
        // ciphertext plus trailing mac
        payload: Vec<u8>,
    },
    Unsupported {
        method: u32,
        body: Vec<u8>,
    },
}

#[derive(Clone, Debug)]
pub struct Header {
    pub packets: Vec<HeaderPacket>,
}

fn read_u32<R: Read>(r: &mut R) -> std::io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

impl Header {
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self, PipelineError> {
        let mut magic = [0u8; 8];
        r.read_exact(&mut magic)
            .map_err(|_| PipelineError::NotCrypt4gh)?;

        if &magic != MAGIC {
            return Err(PipelineError::NotCrypt4gh);
        }

        let version = read_u32(r).map_err(|_| PipelineError::NotCrypt4gh)?;
        if version != VERSION {
            return Err(PipelineError::NotCrypt4gh);
        }

        let packet_count = read_u32(r).map_err(|_| PipelineError::NotCrypt4gh)?;

        let mut packets = Vec::with_capacity(packet_count as usize);

        for _ in 0..packet_count {
            // the length field counts itself
            let length = read_u32(r).map_err(|_| PipelineError::NotCrypt4gh)?;

            let body_len = (length as usize)
                .checked_sub(4)
                .ok_or(PipelineError::NotCrypt4gh)?;

            let mut body = vec![0u8; body_len];
            r.read_exact(&mut body)
                .map_err(|_| PipelineError::NotCrypt4gh)?;

            packets.push(HeaderPacket::parse(body)?);
        }

        Ok(Header { packets })
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_all(MAGIC)?;
        w.write_all(&VERSION.to_le_bytes())?;
        w.write_all(&(self.packets.len() as u32).to_le_bytes())?;

        for packet in &self.packets {
            let body = packet.to_body();
            w.write_all(&((body.len() + 4) as u32).to_le_bytes())?;
            w.write_all(&body)?;
        }

        Ok(())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_to(&mut buf).expect("writing to a Vec");
        buf
    }

    // collect every data encryption key any of the reader keys can unlock
    pub fn data_keys(&self, readers: &[SecretKey]) -> Vec<[u8; 32]> {
        let mut keys = Vec::new();

        for packet in &self.packets {
            for reader in readers {
                if let Some(plain) = packet.decrypt(reader)
                    && let Some(key) = session_key_from(&plain)
                    && !keys.contains(&key)
                {
                    keys.push(key);
                }
            }
        }

        keys
    }
}

impl HeaderPacket {
    fn parse(body: Vec<u8>) -> Result<Self, PipelineError> {
        if body.len() < 4 {
            return Err(PipelineError::NotCrypt4gh);
        }

        let method = u32::from_le_bytes(body[..4].try_into().expect("4-byte slice"));

        if method != X25519_CHACHA20_POLY1305 {
            return Ok(HeaderPacket::Unsupported {
                method,
                body: body[4..].to_vec(),
            });
        }

        // writer key, nonce, and at least a mac must follow
        if body.len() < 4 + 32 + NONCE_SIZE {
            return Err(PipelineError::NotCrypt4gh);
        }

        let writer_pubkey: [u8; 32] = body[4..36].try_into().expect("32-byte slice");
        let nonce: [u8; NONCE_SIZE] = body[36..36 + NONCE_SIZE]
            .try_into()
            .expect("12-byte slice");

        Ok(HeaderPacket::X25519 {
            writer_pubkey,
            nonce,
            payload: body[36 + NONCE_SIZE..].to_vec(),
        })
    }

    fn to_body(&self) -> Vec<u8> {
        match self {
            HeaderPacket::X25519 {
                writer_pubkey,
                nonce,
                payload,
            } => {
                let mut body = Vec::with_capacity(4 + 32 + NONCE_SIZE + payload.len());
                body.extend_from_slice(&X25519_CHACHA20_POLY1305.to_le_bytes());
                body.extend_from_slice(writer_pubkey);
                body.extend_from_slice(nonce);
                body.extend_from_slice(payload);
                body
            }
            HeaderPacket::Unsupported { method, body } => {
                let mut out = Vec::with_capacity(4 + body.len());
                out.extend_from_slice(&method.to_le_bytes());
                out.extend_from_slice(body);
                out
            }
        }
    }

    // try to open this packet with one reader key
    pub fn decrypt(&self, reader: &SecretKey) -> Option<Vec<u8>> {
        let HeaderPacket::X25519 {
            writer_pubkey,
            nonce,
            payload,
        } = self
        else {
            return None;
        };

        let shared = reader.diffie_hellman(&PublicKey(*writer_pubkey));
        let key = packet_key(&shared, writer_pubkey, &reader.public().0);

        ChaCha20Poly1305::new(&key)
            .decrypt(Nonce::from_slice(nonce), payload.as_slice())
            .ok()
    }

    pub fn encrypt(
        plaintext: &[u8],
        writer: &SecretKey,
        reader: &PublicKey,
        nonce: [u8; NONCE_SIZE],
    ) -> Self {
        let shared = writer.diffie_hellman(reader);
        let writer_pubkey = writer.public().0;
        let key = packet_key(&shared, &writer_pubkey, &reader.0);

        let payload = ChaCha20Poly1305::new(&key)
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .expect("in-memory chacha20poly1305 encrypt");

        HeaderPacket::X25519 {
            writer_pubkey,
            nonce,
            payload,
        }
    }
}

// plaintext of a data-encryption-parameters packet
pub(crate) fn data_enc_packet_plaintext(session_key: &[u8; 32]) -> Vec<u8> {
    let mut plain = Vec::with_capacity(4 + 4 + 32);
    plain.extend_from_slice(&PACKET_DATA_ENC_PARAMETERS.to_le_bytes());
    plain.extend_from_slice(&CHACHA20_IETF_POLY1305.to_le_bytes());
    plain.extend_from_slice(session_key);
    plain
}

fn session_key_from(plain: &[u8]) -> Option<[u8; 32]> {
    if plain.len() != 4 + 4 + 32 {
        return None;
    }

    let packet_type = u32::from_le_bytes(plain[..4].try_into().ok()?);
    let method = u32::from_le_bytes(plain[4..8].try_into().ok()?);

    if packet_type != PACKET_DATA_ENC_PARAMETERS || method != CHACHA20_IETF_POLY1305 {
        return None;
    }

    plain[8..40].try_into().ok()
}
