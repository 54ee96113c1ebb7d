pub mod credential;
pub mod reference;
pub mod store;

pub use credential::{decode_credential, encode_credential, Credential};
pub use reference::ImageName;
pub use store::CredentialStore;

use std::io::Read;

use crate::error::Result;

/// Key under which Docker Hub credentials are stored in client config files.
/// Hardcoded for historical reasons, the Docker CLI still writes it this way.
pub const DEFAULT_AUTH_KEY: &str = "https://index.docker.io/v1/";

/// Registry domains that resolve to [`DEFAULT_AUTH_KEY`].
const DEFAULT_AUTH_KEY_ALIASES: [&str; 2] =
    [reference::DEFAULT_DOMAIN, reference::LEGACY_DEFAULT_DOMAIN];

/// Resolves registry credentials for the duration of one request.
#[derive(Debug, Clone, Default)]
pub enum Authenticator {
    /// Backed by an uploaded Docker client config document.
    StoreBacked(CredentialStore),
    /// No credentials; every registry is accessed anonymously.
    #[default]
    Empty,
}

impl Authenticator {
    pub fn from_reader(reader: impl Read) -> Result<Self> {
        Ok(Authenticator::StoreBacked(CredentialStore::from_reader(
            reader,
        )?))
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(Authenticator::StoreBacked(CredentialStore::from_slice(
            bytes,
        )?))
    }

    pub fn get_credential(&self, registry_key: &str) -> Result<Credential> {
        match self {
            Authenticator::StoreBacked(store) => Ok(store.get(registry_key)),
            Authenticator::Empty => Ok(Credential::default()),
        }
    }
}

/// Derive the credential store key for an image reference.
pub fn registry_key_for(image: &str) -> Result<String> {
    let name = ImageName::parse_normalized(image)?;
    let domain = name.domain();
    if DEFAULT_AUTH_KEY_ALIASES.contains(&domain) {
        Ok(DEFAULT_AUTH_KEY.to_string())
    } else {
        Ok(domain.to_string())
    }
}

/// Resolve and encode the `X-Registry-Auth` value for pulling `image`.
pub fn registry_auth_for(authenticator: &Authenticator, image: &str) -> Result<String> {
    let key = registry_key_for(image)?;
    let credential = authenticator.get_credential(&key)?;
    encode_credential(&credential)
}
