use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use tracing::{Level, debug, info, instrument};

use crate::config::KeyProviderKind;
use crate::crypt4gh::SecretKey;

// names the engine requires in the rsa_keys table
pub const SERVER_PRIVATE_KEY: &str = "server_private_key";
pub const REPO_PUBLIC_KEY: &str = "repo_public_key";

// the on-disk key configuration document, managed by fpl-keys
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct KeyFile {
    #[serde(default)]
    pub hsm_servers: BTreeMap<String, String>,

    #[serde(default)]
    pub rsa_keys: BTreeMap<String, String>,
}

// the repository-held crypt4gh keys, resolved once at startup
#[derive(Clone, Debug, Default)]
pub struct KeyCollection {
    keys: Vec<SecretKey>,
}

impl KeyCollection {
    pub fn new(keys: Vec<SecretKey>) -> Self {
        KeyCollection { keys }
    }

    pub fn keys(&self) -> &[SecretKey] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

// key management service
//
// wraps the json configuration file with the operations the cli and the
// server startup need.  the server builds one of these, validates it, and
// resolves the hsm entries into a KeyCollection; mutation happens only
// through the cli followed by a restart.
#[derive(Debug)]
pub struct KeyService {
    path: PathBuf,
    provider: KeyProviderKind,
    file: KeyFile,
}

impl KeyService {
    #[instrument(level = Level::DEBUG)]
    pub fn load(path: &Path, provider: KeyProviderKind) -> Result<Self> {
        let doc = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read key configuration {}", path.display()))?;

        let file: KeyFile = serde_json::from_str(&doc)
            .with_context(|| format!("failed to parse key configuration {}", path.display()))?;

        debug!(
            {hsm_servers = file.hsm_servers.len(), rsa_keys = file.rsa_keys.len()},
            "loaded key configuration"
        );

        Ok(KeyService {
            path: path.to_path_buf(),
            provider,
            file,
        })
    }

    // create an empty configuration file
    pub fn init(path: &Path, provider: KeyProviderKind) -> Result<Self> {
        let service = KeyService {
            path: path.to_path_buf(),
            provider,
            file: KeyFile::default(),
        };
        service.save()?;
        Ok(service)
    }

    pub fn save(&self) -> Result<()> {
        let doc = serde_json::to_string_pretty(&self.file).context("serializing key file")?;

        std::fs::write(&self.path, doc)
            .with_context(|| format!("failed to write key configuration {}", self.path.display()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // hsm server entries

    pub fn list_hsm_servers(&self) -> &BTreeMap<String, String> {
        &self.file.hsm_servers
    }

    pub fn add_hsm_server(&mut self, name: &str, identifier: &str) -> Result<()> {
        if self.file.hsm_servers.contains_key(name) {
            return Err(anyhow!("HSM server {name:?} already exists"));
        }

        self.file
            .hsm_servers
            .insert(name.to_string(), identifier.to_string());
        self.save()
    }

    pub fn update_hsm_server(&mut self, name: &str, identifier: &str) -> Result<()> {
        if !self.file.hsm_servers.contains_key(name) {
            return Err(anyhow!("HSM server {name:?} not found"));
        }

        self.file
            .hsm_servers
            .insert(name.to_string(), identifier.to_string());
        self.save()
    }

    pub fn remove_hsm_server(&mut self, name: &str) -> Result<()> {
        if !self.file.hsm_servers.contains_key(name) {
            return Err(anyhow!("HSM server {name:?} not found"));
        }

        // the validation step requires at least one crypt4gh key
        if self.file.hsm_servers.len() == 1 {
            return Err(anyhow!(
                "cannot remove the last HSM server, at least one must be configured"
            ));
        }

        self.file.hsm_servers.remove(name);
        self.save()
    }

    // rsa key entries

    pub fn list_rsa_keys(&self) -> Vec<&str> {
        self.file.rsa_keys.keys().map(String::as_str).collect()
    }

    pub fn rsa_key(&self, name: &str) -> Result<&str> {
        self.file
            .rsa_keys
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| anyhow!("RSA key {name:?} not found in configuration"))
    }

    pub fn add_rsa_key(&mut self, name: &str, pem: &str) -> Result<()> {
        validate_rsa_pem(pem).with_context(|| format!("invalid RSA key {name:?}"))?;

        self.file
            .rsa_keys
            .insert(name.to_string(), pem.to_string());
        self.save()
    }

    pub fn remove_rsa_key(&mut self, name: &str) -> Result<()> {
        if self.file.rsa_keys.remove(name).is_none() {
            return Err(anyhow!("RSA key {name:?} not found"));
        }
        self.save()
    }

    // collect everything wrong with this configuration, for startup reports
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for name in [SERVER_PRIVATE_KEY, REPO_PUBLIC_KEY] {
            match self.file.rsa_keys.get(name) {
                None => errors.push(format!("RSA key {name:?} not found in configuration")),
                Some(pem) => {
                    if let Err(err) = validate_rsa_pem(pem) {
                        errors.push(format!("RSA key {name:?} failed to parse: {err}"));
                    }
                }
            }
        }

        if self.file.hsm_servers.is_empty() {
            errors.push("no Crypt4GH keys configured, at least one is required".to_string());
        }

        errors
    }

    // resolve every hsm entry into key material
    pub async fn key_collection(&self, client: &reqwest::Client) -> Result<KeyCollection> {
        let mut keys = Vec::new();

        for (name, identifier) in &self.file.hsm_servers {
            let pem = match self.provider {
                KeyProviderKind::Http => fetch_key(client, identifier)
                    .await
                    .with_context(|| format!("failed to fetch key {name:?}"))?,
                KeyProviderKind::Local => resolve_local(identifier)
                    .with_context(|| format!("failed to resolve key {name:?}"))?,
            };

            let key = SecretKey::from_pem(&pem)
                .map_err(|err| anyhow!("failed to parse key {name:?}: {err}"))?;

            keys.push(key);
        }

        info!({count = keys.len()}, "resolved crypt4gh key collection");
        Ok(KeyCollection::new(keys))
    }
}

fn validate_rsa_pem(pem: &str) -> Result<()> {
    if pem.contains("PRIVATE KEY") {
        RsaPrivateKey::from_pkcs8_pem(pem).context("not a PKCS#8 RSA private key")?;
    } else {
        RsaPublicKey::from_public_key_pem(pem).context("not an SPKI RSA public key")?;
    }
    Ok(())
}

async fn fetch_key(client: &reqwest::Client, url: &str) -> Result<String> {
    let response = client.get(url).send().await?.error_for_status()?;
    Ok(response.text().await?)
}

// local identifiers: env: indirection, a file path, or inline key text
fn resolve_local(identifier: &str) -> Result<String> {
    if let Some(var) = identifier.strip_prefix("env:") {
        return std::env::var(var).with_context(|| format!("environment variable {var} not set"));
    }

    let path = Path::new(identifier);
    if path.is_file() {
        return std::fs::read_to_string(path)
            .with_context(|| format!("failed to read key file {}", path.display()));
    }

    Ok(identifier.to_string())
}
