//! Human-facing pages and the status replies sent to uploaders.

use crate::server::PassthruRelay;
use axum::http::header::HOST;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::{Extension, Json};
use passthru_types::{SessionKey, StatusReply, TransferOutcome};
use std::sync::Arc;

/// Header set by the index page's script (and other programmatic clients).
const X_REQUESTED_WITH: &str = "x-requested-with";

/// How an uploader wants to be told the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyFormat {
    /// `{"result": "..."}`
    Json,
    /// Short HTML status page.
    Html,
}

impl ReplyFormat {
    /// Programmatic clients announce themselves with `X-Requested-With: XMLHttpRequest`.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let programmatic = headers
            .get(X_REQUESTED_WITH)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("XMLHttpRequest"));
        if programmatic {
            Self::Json
        } else {
            Self::Html
        }
    }
}

/// HTTP status for each outcome, so all four are distinguishable by code alone.
pub fn status_code(outcome: TransferOutcome) -> StatusCode {
    match outcome {
        TransferOutcome::Ok => StatusCode::OK,
        TransferOutcome::Failed => StatusCode::INTERNAL_SERVER_ERROR,
        TransferOutcome::TimedOut => StatusCode::GATEWAY_TIMEOUT,
        TransferOutcome::Conflict => StatusCode::CONFLICT,
    }
}

fn message(outcome: TransferOutcome) -> &'static str {
    match outcome {
        TransferOutcome::Ok => "Transfer complete.",
        TransferOutcome::Failed => "Transfer failed.",
        TransferOutcome::TimedOut => "Nobody opened the link in time.",
        TransferOutcome::Conflict => "This link is already in use. Start a new transfer.",
    }
}

/// Reply to an uploader.
pub fn status_response(format: ReplyFormat, outcome: TransferOutcome) -> Response {
    let status = status_code(outcome);
    match format {
        ReplyFormat::Json => (status, Json(StatusReply::from(outcome))).into_response(),
        ReplyFormat::Html => (status, Html(status_page(outcome))).into_response(),
    }
}

fn status_page(outcome: TransferOutcome) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>passthru</title></head>
<body>
<h1>passthru</h1>
<p id="result" data-result="{result}">{message}</p>
<p><a href="/">Back</a></p>
</body>
</html>
"#,
        result = outcome.as_str(),
        message = message(outcome),
    )
}

/// Index page: hands out a fresh key and the upload form for it.
pub async fn index_handler(
    Extension(relay): Extension<Arc<PassthruRelay>>,
    headers: HeaderMap,
) -> Html<String> {
    let key = SessionKey::generate();
    let download_url = format!(
        "{}://{}/download/{}",
        display_scheme(&relay),
        display_host(&relay, &headers),
        key
    );
    Html(index_page(&key, &download_url))
}

fn display_scheme(relay: &PassthruRelay) -> &str {
    relay
        .config()
        .server
        .public_scheme
        .as_deref()
        .unwrap_or("http")
}

/// Configured public host, else the request's `Host`, else the bind address.
fn display_host(relay: &PassthruRelay, headers: &HeaderMap) -> String {
    let server = &relay.config().server;
    server
        .public_host
        .clone()
        .or_else(|| {
            headers
                .get(HOST)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .map(str::to_owned)
        })
        .unwrap_or_else(|| server.bind_address.clone())
}

fn index_page(key: &SessionKey, download_url: &str) -> String {
    let key = escape_html(key.as_str());
    let url = escape_html(download_url);
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>passthru</title></head>
<body>
<h1>passthru</h1>
<ol>
  <li>Pick a file and press Send.</li>
  <li>Give the link below to the receiver and ask them to open it.</li>
  <li>Keep this page open until the transfer finishes.</li>
</ol>
<p id="download-url" hidden>Receiver link: <b>{url}</b></p>
<form id="upload-form" action="/upload/{key}" method="POST" enctype="multipart/form-data">
  <input type="hidden" name="size" value="-1">
  File: <input type="file" name="file">
  <input type="submit" value="Send">
</form>
<p id="progress" hidden>Waiting for the receiver…</p>
<script>
document.getElementById('upload-form').addEventListener('submit', function (event) {{
  var form = event.target;
  if (!form.file.files.length) {{ event.preventDefault(); return; }}
  form.size.value = form.file.files[0].size;
  document.getElementById('download-url').hidden = false;
  if (!window.FormData) {{ return; }}
  event.preventDefault();
  var progress = document.getElementById('progress');
  progress.hidden = false;
  var xhr = new XMLHttpRequest();
  xhr.open('POST', form.action);
  xhr.setRequestHeader('X-Requested-With', 'XMLHttpRequest');
  xhr.upload.onprogress = function (e) {{
    if (e.lengthComputable && e.loaded > 2 * 1024 * 1024) {{
      progress.textContent = 'Sending… ' + Math.floor(e.loaded / e.total * 100) + '%';
    }}
  }};
  xhr.onload = function () {{
    var result = 'failed';
    try {{ result = JSON.parse(xhr.responseText).result; }} catch (_) {{}}
    progress.textContent = result === 'ok' ? 'Transfer complete.' : 'Transfer ' + result + '.';
  }};
  xhr.onerror = function () {{ progress.textContent = 'Transfer failed.'; }};
  xhr.send(new FormData(form));
}});
</script>
</body>
</html>
"#
    )
}

/// Escape text for inclusion in HTML element content or attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::http::HeaderValue;

    #[test]
    fn json_requested_via_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(ReplyFormat::from_headers(&headers), ReplyFormat::Html);

        headers.insert(X_REQUESTED_WITH, HeaderValue::from_static("XMLHttpRequest"));
        assert_eq!(ReplyFormat::from_headers(&headers), ReplyFormat::Json);
    }

    #[test]
    fn outcomes_have_distinct_status_codes() {
        let codes: std::collections::HashSet<_> = [
            TransferOutcome::Ok,
            TransferOutcome::Failed,
            TransferOutcome::TimedOut,
            TransferOutcome::Conflict,
        ]
        .into_iter()
        .map(status_code)
        .collect();
        assert_eq!(codes.len(), 4);
    }

    #[test]
    fn status_page_mentions_result() {
        let page = status_page(TransferOutcome::TimedOut);
        assert!(page.contains("data-result=\"timeout\""));
        assert!(page.contains("in time"));
    }

    #[test]
    fn display_host_prefers_configured_host() {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("relay.local:8000"));

        let relay = PassthruRelay::new(Config::default());
        assert_eq!(display_host(&relay, &headers), "relay.local:8000");
        assert_eq!(display_host(&relay, &HeaderMap::new()), "0.0.0.0:8000");

        let mut config = Config::default();
        config.server.public_host = Some("files.example.org".into());
        let relay = PassthruRelay::new(config);
        assert_eq!(display_host(&relay, &headers), "files.example.org");
    }

    #[test]
    fn index_page_links_upload_and_download() {
        let key = SessionKey::new("AbC123").unwrap();
        let page = index_page(&key, "https://files.example.org/download/AbC123");
        assert!(page.contains("action=\"/upload/AbC123\""));
        assert!(page.contains("https://files.example.org/download/AbC123"));
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_html("<a href=\"x\">&'</a>"),
            "&lt;a href=&quot;x&quot;&gt;&amp;&#39;&lt;/a&gt;"
        );
    }
}
