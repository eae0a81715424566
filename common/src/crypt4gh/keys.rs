use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};

use crate::error::PipelineError;

// crypt4gh key files
//
// both key kinds are armored base64.  a public key decodes straight to the
// 32 raw x25519 bytes; a private key decodes to the c4gh-v1 container:
// magic, kdf name, cipher name, then the (possibly passphrase-wrapped) key
// blob, each string prefixed with a big-endian u16 length.  only
// unprotected keys (kdf and cipher both "none") are accepted here.
const SK_BEGIN: &str = "-----BEGIN CRYPT4GH PRIVATE KEY-----";
const SK_END: &str = "-----END CRYPT4GH PRIVATE KEY-----";
const PK_BEGIN: &str = "-----BEGIN CRYPT4GH PUBLIC KEY-----";
const PK_END: &str = "-----END CRYPT4GH PUBLIC KEY-----";

const KEY_MAGIC: &[u8] = b"c4gh-v1";

#[derive(Clone)]
pub struct SecretKey {
    secret: StaticSecret,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PublicKey(pub [u8; 32]);

fn unarmor(text: &str, begin: &str, end: &str) -> Result<Vec<u8>, PipelineError> {
    let body: String = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && *line != begin && *line != end)
        .collect();

    if !text.contains(begin) {
        return Err(PipelineError::BadKey("missing armor header".into()));
    }

    STANDARD
        .decode(body.as_bytes())
        .map_err(|_| PipelineError::BadKey("invalid base64 in key".into()))
}

// read one u16-length-prefixed string out of the c4gh-v1 container
fn take_string<'a>(data: &mut &'a [u8]) -> Result<&'a [u8], PipelineError> {
    if data.len() < 2 {
        return Err(PipelineError::BadKey("truncated key container".into()));
    }

    let len = u16::from_be_bytes([data[0], data[1]]) as usize;

    if data.len() < 2 + len {
        return Err(PipelineError::BadKey("truncated key container".into()));
    }

    let (value, rest) = data[2..].split_at(len);
    *data = rest;
    Ok(value)
}

impl SecretKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        SecretKey {
            secret: StaticSecret::from(bytes),
        }
    }

    pub fn from_pem(text: &str) -> Result<Self, PipelineError> {
        let decoded = unarmor(text, SK_BEGIN, SK_END)?;

        let mut rest = decoded
            .strip_prefix(KEY_MAGIC)
            .ok_or_else(|| PipelineError::BadKey("not a c4gh-v1 private key".into()))?;

        let kdf = take_string(&mut rest)?;
        if kdf != b"none" {
            return Err(PipelineError::BadKey(
                "passphrase-protected keys are not supported".into(),
            ));
        }

        let cipher = take_string(&mut rest)?;
        if cipher != b"none" {
            return Err(PipelineError::BadKey(
                "passphrase-protected keys are not supported".into(),
            ));
        }

        let blob = take_string(&mut rest)?;
        let bytes: [u8; 32] = blob
            .try_into()
            .map_err(|_| PipelineError::BadKey("private key is not 32 bytes".into()))?;

        Ok(SecretKey::from_bytes(bytes))
    }

    pub fn to_pem(&self) -> String {
        let mut container = Vec::new();
        container.extend_from_slice(KEY_MAGIC);

        let secret_bytes = self.secret.to_bytes();
        for part in [&b"none"[..], &b"none"[..], &secret_bytes[..]] {
            container.extend_from_slice(&(part.len() as u16).to_be_bytes());
            container.extend_from_slice(part);
        }

        format!("{SK_BEGIN}\n{}\n{SK_END}\n", STANDARD.encode(container))
    }

    pub fn public(&self) -> PublicKey {
        PublicKey(X25519Public::from(&self.secret).to_bytes())
    }

    pub(crate) fn diffie_hellman(&self, peer: &PublicKey) -> [u8; 32] {
        *self
            .secret
            .diffie_hellman(&X25519Public::from(peer.0))
            .as_bytes()
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never print the scalar
        f.debug_struct("SecretKey")
            .field("public", &self.public())
            .finish()
    }
}

impl PublicKey {
    pub fn from_pem(text: &str) -> Result<Self, PipelineError> {
        let decoded = unarmor(text, PK_BEGIN, PK_END)?;

        let bytes: [u8; 32] = decoded
            .as_slice()
            .try_into()
            .map_err(|_| PipelineError::BadKey("public key is not 32 bytes".into()))?;

        Ok(PublicKey(bytes))
    }

    pub fn to_pem(&self) -> String {
        format!("{PK_BEGIN}\n{}\n{PK_END}\n", STANDARD.encode(self.0))
    }
}
