//! Concurrent pull of a set of images followed by a single combined save.

use std::sync::Arc;

use futures::{stream, StreamExt};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::auth::{registry_auth_for, Authenticator};
use crate::error::{FetchError, Result};
use crate::runtime::{ArchiveStream, ImageRuntime};

/// Pull every image concurrently, then export all of them as one archive.
///
/// All pulls share one cancellation scope derived from `cancel`. The first
/// failing pull cancels its siblings and is returned as is; the save step
/// only runs once every pull has succeeded, and it receives `images` in the
/// order given. The returned stream is unconsumed and owned by the caller.
///
/// `images` must not be empty.
pub async fn fetch_and_package(
    runtime: Arc<dyn ImageRuntime>,
    authenticator: Arc<Authenticator>,
    images: Vec<String>,
    cancel: CancellationToken,
) -> Result<ArchiveStream> {
    let fetch_id = Uuid::new_v4();
    info!(%fetch_id, count = images.len(), "Pulling images");

    pull_all(&runtime, &authenticator, &images, &cancel).await.inspect_err(|e| {
        warn!(%fetch_id, stage = %e.stage(), error = %e, "Image pull aborted");
    })?;

    info!(%fetch_id, "All images pulled, exporting archive");
    let mut archive = tokio::select! {
        _ = cancel.cancelled() => return Err(FetchError::Cancelled),
        archive = runtime.save(&images) => archive?,
    };

    // Wait for the first chunk so that a failing export is reported before
    // any part of the response has been sent.
    let first = tokio::select! {
        _ = cancel.cancelled() => return Err(FetchError::Cancelled),
        first = archive.next() => first,
    };
    match first {
        Some(Ok(chunk)) => Ok(stream::once(async move { Ok(chunk) })
            .chain(archive)
            .boxed()),
        Some(Err(e)) => {
            warn!(%fetch_id, error = %e, "Image export failed");
            Err(e)
        }
        None => Ok(stream::empty().boxed()),
    }
}

async fn pull_all(
    runtime: &Arc<dyn ImageRuntime>,
    authenticator: &Arc<Authenticator>,
    images: &[String],
    cancel: &CancellationToken,
) -> Result<()> {
    let scope = cancel.child_token();
    let mut tasks = JoinSet::new();

    for image in images {
        let runtime = runtime.clone();
        let authenticator = authenticator.clone();
        let image = image.clone();
        let scope = scope.clone();
        tasks.spawn(async move {
            tokio::select! {
                biased;
                _ = scope.cancelled() => Err(FetchError::Cancelled),
                result = pull_image(runtime.as_ref(), &authenticator, &image) => result,
            }
        });
    }

    while let Some(joined) = tasks.join_next().await {
        let result = match joined {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(FetchError::Cancelled),
            Err(e) => Err(FetchError::Task(e.to_string())),
        };
        if let Err(e) = result {
            scope.cancel();
            tasks.shutdown().await;
            return Err(e);
        }
    }

    Ok(())
}

/// Resolve credentials for one image, start its pull and drain the progress
/// stream. The pull only completes while its progress is being read; the
/// messages themselves are discarded unless they report an error.
async fn pull_image(
    runtime: &dyn ImageRuntime,
    authenticator: &Authenticator,
    image: &str,
) -> Result<()> {
    let registry_auth = registry_auth_for(authenticator, image)?;

    debug!(image, "Pulling image");
    let mut progress = runtime.pull(image, &registry_auth).await?;
    while let Some(status) = progress.next().await {
        let status = status?;
        if let Some(message) = status.error {
            return Err(FetchError::pull(image, message));
        }
        trace!(image, status = status.status.as_deref(), "Pull progress");
    }
    debug!(image, "Pull complete");

    Ok(())
}
