use anyhow::Context;
use async_trait::async_trait;
use bollard::auth::DockerCredentials;
use bollard::image::CreateImageOptions;
use bollard::Docker;
use futures::StreamExt;
use tracing::{debug, info};

use super::{ArchiveStream, ImageRuntime, PullProgress, PullStatus};
use crate::auth::{decode_credential, Credential, ImageName};
use crate::error::{FetchError, Result};

/// Image runtime backed by a Docker Engine reached through bollard.
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect to the Docker daemon. Without an explicit socket path the
    /// usual `DOCKER_HOST` / local socket defaults apply.
    pub fn connect(socket: Option<&str>) -> anyhow::Result<Self> {
        let docker = match socket {
            #[cfg(unix)]
            Some(path) => {
                info!("Connecting to Docker daemon at {}", path);
                Docker::connect_with_unix(path, 120, bollard::API_DEFAULT_VERSION)
            }
            _ => Docker::connect_with_local_defaults(),
        }
        .context("Failed to connect to Docker daemon")?;

        Ok(Self { docker })
    }

    pub async fn ping(&self) -> anyhow::Result<()> {
        self.docker
            .ping()
            .await
            .context("Docker daemon did not answer ping")?;
        Ok(())
    }
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

fn to_docker_credentials(credential: Credential) -> DockerCredentials {
    DockerCredentials {
        username: non_empty(credential.username),
        password: non_empty(credential.password),
        auth: non_empty(credential.auth),
        identitytoken: non_empty(credential.identitytoken),
        registrytoken: non_empty(credential.registrytoken),
        ..Default::default()
    }
}

/// bollard re-encodes `DockerCredentials` into `X-Registry-Auth` itself; an
/// anonymous pull sends no header, which the daemon treats like `e30=`.
fn credentials_for(registry_auth: &str) -> Result<Option<DockerCredentials>> {
    let credential = decode_credential(registry_auth)?;
    Ok((!credential.is_empty()).then(|| to_docker_credentials(credential)))
}

/// The Engine pulls every tag of a repository when neither a tag nor a
/// digest is given, so untagged references get `latest` like `docker pull`.
fn default_tag(name: &ImageName) -> &'static str {
    if name.tag().is_none() && name.digest().is_none() {
        "latest"
    } else {
        ""
    }
}

#[async_trait]
impl ImageRuntime for DockerRuntime {
    async fn pull(&self, image: &str, registry_auth: &str) -> Result<PullProgress> {
        let name = ImageName::parse_normalized(image)?;
        let credentials = credentials_for(registry_auth)?;

        let options = CreateImageOptions {
            from_image: image.to_string(),
            tag: default_tag(&name).to_string(),
            ..Default::default()
        };

        debug!(
            image,
            registry = name.domain(),
            repository = name.path(),
            authenticated = credentials.is_some(),
            "Requesting image pull"
        );

        let docker = self.docker.clone();
        let image = image.to_string();
        let progress = async_stream::stream! {
            let mut pull = docker.create_image(Some(options), None, credentials);
            while let Some(item) = pull.next().await {
                yield match item {
                    Ok(info) => Ok(PullStatus {
                        status: info.status,
                        error: info.error,
                    }),
                    Err(e) => Err(FetchError::pull(&image, e)),
                };
            }
        };
        Ok(progress.boxed())
    }

    async fn save(&self, images: &[String]) -> Result<ArchiveStream> {
        debug!(count = images.len(), "Requesting image export");

        let docker = self.docker.clone();
        let images = images.to_vec();
        let archive = async_stream::stream! {
            let names: Vec<&str> = images.iter().map(String::as_str).collect();
            let mut export = docker.export_images(&names);
            while let Some(chunk) = export.next().await {
                yield chunk.map_err(|e| FetchError::Save(e.to_string()));
            }
        };
        Ok(archive.boxed())
    }
}
