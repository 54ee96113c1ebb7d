use crate::runtime::{DockerRuntime, ImageRuntime};
use crate::server::settings::{ServerSettings, Settings};
use anyhow::Result;
use std::sync::Arc;

/// Shared state of the HTTP server
#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<dyn ImageRuntime>,
    pub server_settings: Arc<ServerSettings>,
}

impl AppState {
    pub fn new(runtime: Arc<dyn ImageRuntime>, server_settings: ServerSettings) -> Self {
        Self {
            runtime,
            server_settings: Arc::new(server_settings),
        }
    }

    /// Connect to the Docker daemon configured in `settings`.
    ///
    /// An unreachable daemon is only logged: requests fail with the
    /// daemon's error until it becomes available.
    pub async fn new_for_server(settings: &Settings) -> Result<Self> {
        let runtime = DockerRuntime::connect(settings.docker.socket.as_deref())?;

        match runtime.ping().await {
            Ok(()) => tracing::info!("✓ Connected to Docker daemon"),
            Err(e) => tracing::warn!("Docker daemon is not reachable yet: {:#}", e),
        }

        Ok(Self::new(Arc::new(runtime), settings.server.clone()))
    }
}
