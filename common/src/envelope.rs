use std::time::{SystemTime, UNIX_EPOCH};

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Validation, errors::ErrorKind};
use rand::RngCore;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PipelineError;
use api::step::JobPayload;

// the job envelope
//
// a token is a compact JWE (RSA-OAEP + A256GCM, encrypted to this server)
// whose plaintext is a compact JWS (RS256, signed by the repository) over
// the job claims.  open() undoes both layers and checks the time claims;
// seal() is the inverse, used by fpl-token and the test suites.
const JWE_ALG_OAEP: &str = "RSA-OAEP";
const JWE_ALG_OAEP_256: &str = "RSA-OAEP-256";
const JWE_ENC: &str = "A256GCM";

// tolerated clock skew for iat/exp, in seconds
const LEEWAY: u64 = 5;

#[derive(Debug, Serialize, Deserialize)]
struct JweHeader {
    alg: String,
    enc: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    iat: i64,
    exp: i64,

    #[serde(flatten)]
    payload: JobPayload,
}

fn b64(part: &str) -> Result<Vec<u8>, PipelineError> {
    URL_SAFE_NO_PAD
        .decode(part.as_bytes())
        .map_err(|_| PipelineError::BadEnvelope)
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs() as i64
}

// decrypt the outer JWE layer with the server's private key
fn decrypt_jwe(token: &str, server_private_pem: &str) -> Result<Vec<u8>, PipelineError> {
    let parts: Vec<&str> = token.split('.').collect();
    let [protected, encrypted_key, iv, ciphertext, tag] = parts.as_slice() else {
        return Err(PipelineError::BadEnvelope);
    };

    let header: JweHeader =
        serde_json::from_slice(&b64(protected)?).map_err(|_| PipelineError::BadEnvelope)?;

    if header.enc != JWE_ENC {
        debug!({enc = %header.enc}, "unsupported jwe content encryption");
        return Err(PipelineError::BadEnvelope);
    }

    let private_key = RsaPrivateKey::from_pkcs8_pem(server_private_pem)
        .map_err(|err| PipelineError::BadKey(err.to_string()))?;

    let padding = match header.alg.as_str() {
        JWE_ALG_OAEP => Oaep::new::<sha1::Sha1>(),
        JWE_ALG_OAEP_256 => Oaep::new::<sha2::Sha256>(),
        _ => {
            debug!({alg = %header.alg}, "unsupported jwe key algorithm");
            return Err(PipelineError::BadEnvelope);
        }
    };

    let cek = private_key
        .decrypt(padding, &b64(encrypted_key)?)
        .map_err(|_| PipelineError::BadEnvelope)?;

    let cipher = Aes256Gcm::new_from_slice(&cek).map_err(|_| PipelineError::BadEnvelope)?;

    let iv = b64(iv)?;
    if iv.len() != 12 {
        return Err(PipelineError::BadEnvelope);
    }

    // aes-gcm wants ciphertext and tag contiguous
    let mut sealed = b64(ciphertext)?;
    sealed.extend_from_slice(&b64(tag)?);

    cipher
        .decrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: &sealed,
                aad: protected.as_bytes(),
            },
        )
        .map_err(|_| PipelineError::BadEnvelope)
}

// verify the inner JWS layer against the repository's public key and
// validate the time claims
fn verify_jws(jws: &[u8], repo_public_pem: &str) -> Result<JobPayload, PipelineError> {
    let jws = std::str::from_utf8(jws).map_err(|_| PipelineError::BadSignature)?;

    let key = DecodingKey::from_rsa_pem(repo_public_pem.as_bytes())
        .map_err(|err| PipelineError::BadKey(err.to_string()))?;

    let mut validation = Validation::new(Algorithm::RS256);
    validation.leeway = LEEWAY;
    validation.validate_exp = true;

    let data =
        jsonwebtoken::decode::<Claims>(jws, &key, &validation).map_err(|err| {
            match err.kind() {
                ErrorKind::ExpiredSignature => PipelineError::ExpiredToken,
                ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
                    PipelineError::MalformedPayload(err.to_string())
                }
                _ => PipelineError::BadSignature,
            }
        })?;

    // issued-at must not be in the future
    if data.claims.iat > unix_now() + LEEWAY as i64 {
        return Err(PipelineError::ExpiredToken);
    }

    Ok(data.claims.payload)
}

// unwrap a raw token as fetched from the token store
pub fn open(
    token: &[u8],
    server_private_pem: &str,
    repo_public_pem: &str,
) -> Result<JobPayload, PipelineError> {
    let token = std::str::from_utf8(token).map_err(|_| PipelineError::BadEnvelope)?;

    let jws = decrypt_jwe(token.trim(), server_private_pem)?;
    verify_jws(&jws, repo_public_pem)
}

// sign-then-encrypt a payload into a token valid for ttl_secs
pub fn seal(
    payload: &JobPayload,
    ttl_secs: u64,
    repo_private_pem: &str,
    server_public_pem: &str,
) -> Result<String, PipelineError> {
    let now = unix_now();
    let claims = Claims {
        iat: now,
        exp: now + ttl_secs as i64,
        payload: payload.clone(),
    };

    let signing_key = EncodingKey::from_rsa_pem(repo_private_pem.as_bytes())
        .map_err(|err| PipelineError::BadKey(err.to_string()))?;

    let jws = jsonwebtoken::encode(
        &jsonwebtoken::Header::new(Algorithm::RS256),
        &claims,
        &signing_key,
    )
    .map_err(|err| PipelineError::Internal(err.to_string()))?;

    let public_key = RsaPublicKey::from_public_key_pem(server_public_pem)
        .map_err(|err| PipelineError::BadKey(err.to_string()))?;

    let mut cek = [0u8; 32];
    let mut iv = [0u8; 12];
    rand::rng().fill_bytes(&mut cek);
    rand::rng().fill_bytes(&mut iv);

    let encrypted_key = public_key
        .encrypt(&mut rand_core::OsRng, Oaep::new::<sha1::Sha1>(), &cek)
        .map_err(|err| PipelineError::Internal(err.to_string()))?;

    let protected = URL_SAFE_NO_PAD.encode(
        serde_json::to_vec(&JweHeader {
            alg: JWE_ALG_OAEP.to_string(),
            enc: JWE_ENC.to_string(),
        })
        .expect("serializing a jwe header"),
    );

    let cipher = Aes256Gcm::new_from_slice(&cek).expect("32-byte aes key");

    let mut sealed = cipher
        .encrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: jws.as_bytes(),
                aad: protected.as_bytes(),
            },
        )
        .expect("in-memory aes-gcm encrypt");

    let tag = sealed.split_off(sealed.len() - 16);

    Ok([
        protected,
        URL_SAFE_NO_PAD.encode(encrypted_key),
        URL_SAFE_NO_PAD.encode(iv),
        URL_SAFE_NO_PAD.encode(sealed),
        URL_SAFE_NO_PAD.encode(tag),
    ]
    .join("."))
}
