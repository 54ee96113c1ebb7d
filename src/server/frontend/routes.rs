use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use tera::Tera;

use crate::server::state::AppState;

use super::StaticAssets;

/// Landing page and embedded assets under `base`, which is empty or a path
/// with a leading and no trailing slash.
pub fn frontend_routes(base: &str) -> Router<AppState> {
    let mut router = Router::new()
        .route(&format!("{}/", base), get(serve_index))
        .route(&format!("{}/{{*path}}", base), get(serve_static));

    if !base.is_empty() {
        let index = format!("{}/", base);
        router = router.route(base, get(move || std::future::ready(Redirect::permanent(&index))));
    }

    router
}

async fn serve_index(State(state): State<AppState>) -> Response {
    render_index(&state)
}

async fn serve_static(Path(path): Path<String>) -> Response {
    serve_file(&path)
}

fn render_index(state: &AppState) -> Response {
    let template_content = match StaticAssets::get("index.html.tera") {
        Some(content) => match std::str::from_utf8(&content.data) {
            Ok(s) => s.to_string(),
            Err(e) => {
                tracing::error!("Failed to parse index.html.tera as UTF-8: {}", e);
                return (StatusCode::INTERNAL_SERVER_ERROR, "Template encoding error")
                    .into_response();
            }
        },
        None => {
            tracing::error!("index.html.tera template not found in embedded assets");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Template not found").into_response();
        }
    };

    let mut tera = Tera::default();
    if let Err(e) = tera.add_raw_template("index.html.tera", &template_content) {
        tracing::error!("Failed to parse index.html.tera template: {}", e);
        return (StatusCode::INTERNAL_SERVER_ERROR, "Template error").into_response();
    }

    let mut context = tera::Context::new();
    context.insert("base_url", &state.server_settings.base_path());
    context.insert(
        "max_upload_kib",
        &(state.server_settings.max_upload_bytes / 1024),
    );

    match tera.render("index.html.tera", &context) {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::error!("Failed to render index.html template: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Template rendering error").into_response()
        }
    }
}

fn serve_file(path: &str) -> Response {
    let path = path.trim_start_matches('/');

    // Templates are only served rendered.
    if path.ends_with(".tera") {
        return (StatusCode::NOT_FOUND, "Not found").into_response();
    }

    match StaticAssets::get(path) {
        Some(content) => {
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            (
                [
                    (header::CONTENT_TYPE, mime.as_ref().to_string()),
                    (header::CACHE_CONTROL, "public, max-age=3600".to_string()),
                ],
                content.data,
            )
                .into_response()
        }
        None => (StatusCode::NOT_FOUND, "Not found").into_response(),
    }
}
