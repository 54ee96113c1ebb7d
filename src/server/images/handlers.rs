use std::sync::Arc;

use axum::{
    extract::{Multipart, Query, State},
    response::Response,
};
use tokio_util::sync::CancellationToken;

use super::sink;
use crate::auth::{Authenticator, CredentialStore};
use crate::images::{fetch_and_package, normalize};
use crate::server::error::ServerError;
use crate::server::state::AppState;

/// Multipart field holding the image list, one reference per line.
pub const IMAGES_FIELD: &str = "images.txt";
/// Multipart field holding an optional Docker client config document.
pub const CONFIG_FIELD: &str = "config.json";

/// `GET /tar?image=a&image=b`: anonymous pulls of the listed images.
pub async fn get_tar(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Response, ServerError> {
    let images: Vec<String> = params
        .into_iter()
        .filter(|(key, _)| key == "image")
        .map(|(_, value)| value)
        .collect();

    if images.is_empty() {
        return Err(ServerError::bad_request("missing 'image' query parameter"));
    }

    stream_images(&state, Authenticator::Empty, normalize(&images)).await
}

/// `POST /tar`: multipart upload of an image list and optional credentials.
pub async fn post_tar(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ServerError> {
    let mut image_list = None;
    let mut config_document = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::new(e.status(), e.body_text()))?
    {
        match field.name() {
            Some(IMAGES_FIELD) => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ServerError::new(e.status(), e.body_text()))?;
                image_list = Some(text);
            }
            Some(CONFIG_FIELD) => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ServerError::new(e.status(), e.body_text()))?;
                config_document = Some(bytes);
            }
            other => {
                tracing::debug!("Ignoring multipart field {:?}", other);
            }
        }
    }

    let image_list = image_list
        .ok_or_else(|| ServerError::bad_request(format!("missing '{}' upload", IMAGES_FIELD)))?;

    let authenticator = match config_document {
        Some(document) => {
            let store = CredentialStore::from_slice(&document)?;
            if store.is_empty() {
                tracing::warn!("Uploaded config has no inline auths entries");
            } else {
                tracing::info!(registries = store.len(), "Using uploaded registry credentials");
            }
            Authenticator::StoreBacked(store)
        }
        None => {
            tracing::info!("No authentication info provided, pulling anonymously");
            Authenticator::Empty
        }
    };

    stream_images(&state, authenticator, normalize(image_list.lines())).await
}

async fn stream_images(
    state: &AppState,
    authenticator: Authenticator,
    images: Vec<String>,
) -> Result<Response, ServerError> {
    if images.is_empty() {
        return Err(ServerError::bad_request("no images requested"));
    }

    // Cancelled when the handler returns or is dropped with the connection.
    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();

    let archive = fetch_and_package(
        state.runtime.clone(),
        Arc::new(authenticator),
        images,
        cancel,
    )
    .await?;

    Ok(sink::archive_response(archive))
}
