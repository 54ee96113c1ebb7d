use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use futures::TryStreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::auth::Authenticator;
use crate::images::{fetch_and_package, normalize};
use crate::runtime::{ArchiveStream, DockerRuntime};
use crate::server::settings::Settings;

#[derive(Debug, Clone, clap::Args)]
pub struct SaveArgs {
    /// Image references to export
    pub images: Vec<String>,
    /// File with one image reference per line (`#` starts a comment)
    #[arg(long, short = 'f')]
    pub images_file: Option<PathBuf>,
    /// Docker client config used for registry credentials
    /// (e.g. ~/.docker/config.json)
    #[arg(long, short = 'a')]
    pub auth_file: Option<PathBuf>,
    /// Where to write the archive (stdout when omitted)
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

/// Pull the requested images through the local Docker daemon and write the
/// combined archive to a file or stdout.
pub async fn handle_save(args: SaveArgs) -> Result<()> {
    let images = collect_images(&args.images, args.images_file.as_deref()).await?;
    if images.is_empty() {
        bail!("No images given. Pass image references or --images-file");
    }

    let authenticator = load_authenticator(args.auth_file.as_deref()).await?;

    let settings = Settings::new()?;
    let runtime = DockerRuntime::connect(settings.docker.socket.as_deref())?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling pulls");
            on_interrupt.cancel();
        }
    });

    let archive = fetch_and_package(
        Arc::new(runtime),
        Arc::new(authenticator),
        images,
        cancel,
    )
    .await?;

    let written = match &args.output {
        Some(path) => {
            let file = tokio::fs::File::create(path)
                .await
                .with_context(|| format!("Failed to create {}", path.display()))?;
            write_archive(archive, file).await?
        }
        None => write_archive(archive, tokio::io::stdout()).await?,
    };

    match &args.output {
        Some(path) => info!("✓ Wrote {} bytes to {}", written, path.display()),
        None => info!("✓ Wrote {} bytes to stdout", written),
    }
    Ok(())
}

/// Positional references first, then the lines of `images_file`.
async fn collect_images(images: &[String], images_file: Option<&Path>) -> Result<Vec<String>> {
    let mut lines = images.to_vec();
    if let Some(path) = images_file {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read image list {}", path.display()))?;
        lines.extend(content.lines().map(String::from));
    }
    Ok(normalize(&lines))
}

async fn load_authenticator(auth_file: Option<&Path>) -> Result<Authenticator> {
    match auth_file {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open {}", path.display()))?
                .into_std()
                .await;
            let authenticator = Authenticator::from_reader(std::io::BufReader::new(file))
                .with_context(|| format!("Invalid Docker config {}", path.display()))?;
            Ok(authenticator)
        }
        None => Ok(Authenticator::Empty),
    }
}

async fn write_archive<W>(archive: ArchiveStream, mut out: W) -> Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut reader = StreamReader::new(archive.map_err(std::io::Error::other));
    let written = tokio::io::copy(&mut reader, &mut out)
        .await
        .context("Failed to write archive")?;
    out.flush().await.context("Failed to flush archive")?;
    Ok(written)
}
