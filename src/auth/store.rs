//! Docker client config (`config.json`) credential store.
//!
//! Only the inline `auths` section is used. Credential helpers referenced by
//! `credsStore` or `credHelpers` are never executed for uploaded documents.

use std::collections::HashMap;
use std::io::Read;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;

use super::credential::Credential;
use crate::error::{FetchError, Result};

#[derive(Debug, Default, Deserialize)]
struct ConfigDocument {
    #[serde(default)]
    auths: HashMap<String, AuthEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthEntry {
    #[serde(default)]
    auth: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    identitytoken: String,
    #[serde(default)]
    registrytoken: String,
}

/// Parsed credentials keyed by registry, as written by `docker login`.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    auths: HashMap<String, Credential>,
}

impl CredentialStore {
    pub fn from_reader(reader: impl Read) -> Result<Self> {
        let document: ConfigDocument = serde_json::from_reader(reader)
            .map_err(|e| FetchError::CredentialDocument(e.to_string()))?;
        Self::from_document(document)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let document: ConfigDocument = serde_json::from_slice(bytes)
            .map_err(|e| FetchError::CredentialDocument(e.to_string()))?;
        Self::from_document(document)
    }

    fn from_document(document: ConfigDocument) -> Result<Self> {
        let mut auths = HashMap::with_capacity(document.auths.len());
        for (registry, entry) in document.auths {
            let mut credential = Credential {
                username: entry.username,
                password: entry.password,
                auth: String::new(),
                identitytoken: entry.identitytoken,
                registrytoken: entry.registrytoken,
            };
            if !entry.auth.is_empty() {
                let (username, password) = decode_auth(&entry.auth).map_err(|reason| {
                    FetchError::CredentialDocument(format!("auths.{registry}: {reason}"))
                })?;
                credential.username = username;
                credential.password = password;
            }
            auths.insert(registry, credential);
        }
        Ok(Self { auths })
    }

    /// Look up the credential for a registry key. Keys written by older Docker
    /// versions (`https://host/v1/`) still match the bare hostname.
    pub fn get(&self, registry_key: &str) -> Credential {
        if let Some(credential) = self.auths.get(registry_key) {
            return credential.clone();
        }
        self.auths
            .iter()
            .find(|(stored, _)| convert_to_hostname(stored) == registry_key)
            .map(|(_, credential)| credential.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.auths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.auths.is_empty()
    }
}

/// Decode the base64 `user:password` pair of an `auth` field.
fn decode_auth(auth: &str) -> std::result::Result<(String, String), String> {
    let decoded = STANDARD
        .decode(auth)
        .map_err(|e| format!("auth is not valid base64: {e}"))?;
    if decoded.is_empty() {
        return Ok((String::new(), String::new()));
    }
    let decoded = String::from_utf8(decoded).map_err(|_| "auth is not valid UTF-8".to_string())?;
    let (username, password) = decoded
        .split_once(':')
        .ok_or_else(|| "auth must have the form user:password".to_string())?;
    Ok((
        username.to_string(),
        password.trim_matches('\0').to_string(),
    ))
}

/// Strip scheme and path from a registry URL.
fn convert_to_hostname(url: &str) -> &str {
    let stripped = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
        .unwrap_or(url);
    stripped.split('/').next().unwrap_or(stripped)
}
