pub mod docker;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::Result;

pub use docker::DockerRuntime;

/// One progress message of a running pull.
#[derive(Debug, Clone, Default)]
pub struct PullStatus {
    pub status: Option<String>,
    pub error: Option<String>,
}

/// Progress of a pull. The pull only runs to completion while it is polled.
pub type PullProgress = BoxStream<'static, Result<PullStatus>>;

/// A combined `docker save` archive, produced while it is read.
pub type ArchiveStream = BoxStream<'static, Result<Bytes>>;

/// Image API of a container runtime.
///
/// Implementations are shared between concurrent pulls of one request and
/// must not hold per-call state.
#[async_trait]
pub trait ImageRuntime: Send + Sync {
    /// Start pulling `image`. `registry_auth` is the encoded credential as
    /// produced by [`crate::auth::encode_credential`].
    async fn pull(&self, image: &str, registry_auth: &str) -> Result<PullProgress>;

    /// Export `images`, in order, as one tar archive.
    async fn save(&self, images: &[String]) -> Result<ArchiveStream>;
}
