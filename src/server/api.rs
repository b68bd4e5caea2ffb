use crate::cli::Args;
use crate::error::RelayError;
use crate::llm::chat::ByteStream;
use crate::models::chat::RelayRequest;
use crate::relay::RelayService;
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use axum::{
    body::Body,
    extract::{ rejection::JsonRejection, State },
    http::header,
    response::{ IntoResponse, Response },
    routing::{ get, post },
    Json,
    Router,
};
use serde::Serialize;
use tower_http::cors::{ Any, CorsLayer };
use log::{ info, warn, error };

pub const CHAT_ROUTE: &str = "/api/chat";
pub const HEALTH_ROUTE: &str = "/health";

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Clone)]
struct AppState {
    relay: Arc<RelayService>,
}

pub fn router(relay: Arc<RelayService>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route(CHAT_ROUTE, post(chat_handler))
        .route(HEALTH_ROUTE, get(health_handler))
        .layer(cors)
        .with_state(AppState { relay })
}

pub async fn start_http_server(
    relay: Arc<RelayService>,
    args: Args
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let addr = args.server_addr.parse::<SocketAddr>()?;
    let app = router(relay);

    if args.enable_tls {
        let (cert_path, key_path) = match (&args.tls_cert_path, &args.tls_key_path) {
            (Some(cert_path), Some(key_path)) => (cert_path, key_path),
            (Some(_), None) | (None, Some(_)) => {
                error!("Both --tls-cert-path and --tls-key-path must be provided to enable TLS.");
                return Err("Missing TLS certificate or key path".into());
            }
            (None, None) => {
                error!("--enable-tls was set but no certificate/key paths provided.");
                return Err("TLS enabled without cert/key".into());
            }
        };

        info!("TLS enabled. Loading certificate from '{}' and key from '{}'", cert_path, key_path);
        let tls_config = axum_server::tls_rustls::RustlsConfig
            ::from_pem_file(cert_path, key_path).await
            .map_err(|e| format!("Failed to load TLS certificate/key: {}", e))?;

        info!("Relay listening on: https://{}{}", addr, CHAT_ROUTE);
        axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service()).await?;
    } else {
        let listener = tokio::net::TcpListener
            ::bind(addr).await
            .map_err(|e|
                format!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e)
            )?;
        info!("Relay listening on: http://{}{}", addr, CHAT_ROUTE);
        axum::serve(listener, app.into_make_service()).await?;
    }

    Ok(())
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

async fn chat_handler(
    State(state): State<AppState>,
    payload: Result<Json<RelayRequest>, JsonRejection>
) -> Response {
    let Json(request) = match payload {
        Ok(json) => json,
        Err(rejection) => {
            error!("Chat API error: {}", rejection.body_text());
            return RelayError::Internal(rejection.body_text()).into_response();
        }
    };

    match state.relay.relay(request).await {
        Ok(stream) => stream_response(stream),
        Err(e) => {
            match &e {
                RelayError::Internal(detail) => error!("Chat API error: {}", detail),
                other => warn!("Chat request failed: {}", other),
            }
            e.into_response()
        }
    }
}

fn stream_response(stream: ByteStream) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Body::from_stream(stream),
    ).into_response()
}
