//! Turns an archive stream into an HTTP response body.
//!
//! The archive is owned by the body from the moment the response is built,
//! so it is released exactly once: when the last chunk has been sent, when
//! the runtime reports an error mid-stream, or when the client goes away and
//! hyper drops the body.

use axum::{
    body::Body,
    http::header,
    response::{IntoResponse, Response},
};
use futures::{Stream, StreamExt};
use tracing::{info, warn};

use crate::error::FetchError;
use crate::runtime::ArchiveStream;

pub const ARCHIVE_CONTENT_TYPE: &str = "application/x-tar";
pub const ARCHIVE_DISPOSITION: &str = "attachment; filename=\"images.tar\"";

pub fn archive_response(archive: ArchiveStream) -> Response {
    (
        [
            (header::CONTENT_TYPE, ARCHIVE_CONTENT_TYPE),
            (header::CONTENT_DISPOSITION, ARCHIVE_DISPOSITION),
        ],
        Body::from_stream(tracked(archive)),
    )
        .into_response()
}

/// Logs the outcome of a transfer when dropped.
#[derive(Default)]
struct Transfer {
    bytes_sent: u64,
    finished: bool,
    failed: bool,
}

impl Drop for Transfer {
    fn drop(&mut self) {
        if self.finished {
            info!(bytes = self.bytes_sent, "Archive sent");
        } else if self.failed {
            warn!(bytes = self.bytes_sent, "Archive stream failed, response truncated");
        } else {
            warn!(bytes = self.bytes_sent, "Archive transfer abandoned by client");
        }
    }
}

fn tracked(archive: ArchiveStream) -> impl Stream<Item = Result<bytes::Bytes, FetchError>> + Send {
    let transfer = Transfer::default();
    async_stream::stream! {
        let mut transfer = transfer;
        let mut archive = archive;
        while let Some(chunk) = archive.next().await {
            match &chunk {
                Ok(bytes) => transfer.bytes_sent += bytes.len() as u64,
                Err(_) => transfer.failed = true,
            }
            yield chunk;
            if transfer.failed {
                return;
            }
        }
        transfer.finished = true;
    }
}
