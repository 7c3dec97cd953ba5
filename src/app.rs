use std::net::SocketAddr;

use axum::{response::Redirect, routing::get, Router};
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::config::StorageConfig;
use crate::state::AppState;
use crate::{customers, images};

pub fn build_app(state: AppState) -> Router {
    let mut app = Router::new()
        .route("/", get(|| async { Redirect::to("/customers") }))
        .route("/health", get(|| async { "ok" }))
        .merge(customers::router());

    // local uploads are plain files; object-store uploads go through presigned urls
    app = match &state.config.storage {
        StorageConfig::Local { upload_dir } => app.nest_service("/uploads", ServeDir::new(upload_dir)),
        StorageConfig::S3(_) => app.merge(images::handlers::routes()),
    };

    app.nest_service(
        "/default-images",
        ServeDir::new(&state.config.default_images_dir),
    )
    .with_state(state)
    .layer(
        TraceLayer::new_for_http()
            .make_span_with(|req: &axum::http::Request<_>| {
                let method = req.method().clone();
                let uri = req.uri().clone();
                tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
            })
            .on_response(
                |res: &axum::http::Response<_>,
                 _latency: std::time::Duration,
                 span: &tracing::Span| {
                    let status = res.status();
                    span.record("status", tracing::field::display(status));
                    if status.is_server_error() {
                        tracing::error!(%status, "response");
                    } else {
                        tracing::info!(%status, "response");
                    }
                },
            ),
    )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
