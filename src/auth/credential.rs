use base64::{engine::general_purpose::URL_SAFE, Engine};
use serde::{Deserialize, Serialize};

use crate::error::{FetchError, Result};

/// Registry credentials in the shape the Docker Engine expects in its
/// `X-Registry-Auth` header. Empty fields are omitted when serialized, so the
/// zero value encodes as `{}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub auth: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub identitytoken: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub registrytoken: String,
}

impl Credential {
    pub fn is_empty(&self) -> bool {
        *self == Credential::default()
    }
}

/// Serialize a credential as JSON and encode it with URL-safe base64
/// (padding kept). This is the exact format the Docker pull and save APIs
/// decode, so it must not change.
pub fn encode_credential(credential: &Credential) -> Result<String> {
    let json = serde_json::to_vec(credential)?;
    Ok(URL_SAFE.encode(json))
}

/// Inverse of [`encode_credential`].
pub fn decode_credential(encoded: &str) -> Result<Credential> {
    let json = URL_SAFE
        .decode(encoded)
        .map_err(|e| FetchError::CredentialDocument(format!("registry auth is not base64: {e}")))?;
    serde_json::from_slice(&json)
        .map_err(|e| FetchError::CredentialDocument(format!("registry auth is not JSON: {e}")))
}
