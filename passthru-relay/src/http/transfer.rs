//! Upload and download endpoints.
//!
//! `POST /upload/{key}` registers a session and blocks until a downloader has
//! taken the payload (or the wait bound expires). `GET /download/{key}`
//! claims that session and streams the payload straight out of the
//! uploader's request body.

use super::client_addr;
use super::pages::{self, ReplyFormat};
use crate::error::RelayError;
use crate::relay::{self, UploadBody};
use crate::server::{PassthruRelay, RelayMetrics};
use crate::session::Session;
use axum::body::Body;
use axum::extract::{ConnectInfo, Path};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use passthru_types::{RelayMetadata, SessionKey, TransferOutcome};
use std::net::SocketAddr;
use std::sync::Arc;

/// Content type used when the file part declares none.
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Upload handler.
pub async fn upload_handler(
    Extension(relay): Extension<Arc<PassthruRelay>>,
    Path(key): Path<String>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let client = client_addr(&relay, &headers, connect_info);
    let format = ReplyFormat::from_headers(&headers);

    let key = match SessionKey::new(key) {
        Ok(key) => key,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let (session, mut wait) = Session::open(key.clone(), UploadBody::new(content_type, body));

    // Dropping the registration, including on cancellation, frees the key.
    let registration = match relay.registry().register(session) {
        Ok(registration) => registration,
        Err(e) => {
            tracing::info!("Upload from {} rejected: {}", client, e);
            RelayMetrics::incr(&relay.metrics().conflicts_total);
            return pages::status_response(format, e.outcome());
        }
    };

    RelayMetrics::incr(&relay.metrics().uploads_total);
    tracing::info!("Upload {:?} from {} waiting for peer", key, client);

    let outcome = wait.run(relay.wait_timeout()).await;
    drop(registration);

    let counter = match outcome {
        TransferOutcome::Ok => &relay.metrics().transfers_ok,
        TransferOutcome::Failed => &relay.metrics().transfers_failed,
        TransferOutcome::TimedOut => &relay.metrics().timeouts_total,
        TransferOutcome::Conflict => &relay.metrics().conflicts_total,
    };
    RelayMetrics::incr(counter);
    tracing::info!("Upload {:?} from {} finished: {}", key, client, outcome);

    pages::status_response(format, outcome)
}

/// Download handler.
pub async fn download_handler(
    Extension(relay): Extension<Arc<PassthruRelay>>,
    Path(key): Path<String>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Response {
    let client = client_addr(&relay, &headers, connect_info);

    let key = SessionKey::new(key).ok();
    let claimed = key
        .as_ref()
        .and_then(|key| relay.registry().lookup(key))
        .and_then(|session| session.claim());

    let (Some(key), Some((upload, link))) = (key, claimed) else {
        RelayMetrics::incr(&relay.metrics().not_found_total);
        tracing::info!("Download from {} for unknown key", client);
        return error_response(RelayError::KeyNotFound);
    };

    RelayMetrics::incr(&relay.metrics().downloads_total);
    tracing::info!("Download {:?} claimed by {}", key, client);

    match relay::open(upload).await {
        Ok((metadata, file)) => {
            tracing::debug!(
                "Relaying {:?}: length={:?} type={:?}",
                key,
                metadata.declared_length,
                metadata.content_type
            );
            let mut stream = file.into_stream(&metadata, link, relay.metrics_arc());
            if metadata.declared_length == Some(0) {
                stream.settle().await;
            }
            download_response(&metadata, Body::from_stream(stream))
        }
        Err(e) => {
            tracing::warn!("Relay {:?} to {} failed before streaming: {}", key, client, e);
            link.finish(e.outcome());
            error_response(e)
        }
    }
}

/// Reply to a downloader whose transfer never started.
fn error_response(error: RelayError) -> Response {
    let status = match error {
        RelayError::KeyNotFound => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, error.to_string()).into_response()
}

/// Build the streamed download response carrying the forwarded metadata.
fn download_response(metadata: &RelayMetadata, body: Body) -> Response {
    let mut response = Response::new(body);
    let headers = response.headers_mut();

    if let Some(length) = metadata.declared_length {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
    }

    let content_type = metadata
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
    headers.insert(CONTENT_TYPE, content_type);

    if let Ok(disposition) = HeaderValue::from_str(&metadata.content_disposition()) {
        headers.insert(CONTENT_DISPOSITION, disposition);
    }

    response
}
