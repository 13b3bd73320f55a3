//! Development server: serves the dist directory and pushes live-reload
//! events over Server-Sent Events.

pub mod reload;

pub use reload::{ReloadEvent, ReloadHub, CLIENT_SCRIPT};

use axum::extract::State;
use axum::http::{header, StatusCode, Uri};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

use crate::config::ServerConfig;
use crate::error::{KilnError, Result};

/// Route of the SSE stream.
pub const RELOAD_PATH: &str = "/__kiln/reload";
/// Route of the reload client script.
pub const CLIENT_PATH: &str = "/__kiln/client.js";

const CLIENT_TAG: &str = "<script src=\"/__kiln/client.js\"></script>";

#[derive(Clone)]
struct AppState {
    root: Arc<PathBuf>,
    hub: ReloadHub,
    live_reload: bool,
}

/// A bound, not yet running, dev server.
pub struct DevServer {
    listener: TcpListener,
    state: AppState,
}

impl DevServer {
    /// Bind to `host:port` from the config. Port 0 picks a free port.
    pub async fn bind(config: &ServerConfig, root: PathBuf, hub: ReloadHub) -> Result<Self> {
        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| KilnError::Server(format!("cannot bind {addr}: {e}")))?;

        Ok(Self {
            listener,
            state: AppState {
                root: Arc::new(root),
                hub,
                live_reload: config.live_reload,
            },
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until the task is dropped.
    pub async fn run(self) -> Result<()> {
        let addr = self.local_addr()?;
        tracing::info!("Serving {:?} at http://{}", self.state.root, addr);
        axum::serve(self.listener, router(self.state))
            .await
            .map_err(|e| KilnError::Server(e.to_string()))
    }
}

fn router(state: AppState) -> Router {
    let mut router = Router::new();
    if state.live_reload {
        router = router
            .route(RELOAD_PATH, get(reload_events))
            .route(CLIENT_PATH, get(client_script));
    }
    router.fallback(serve_file).with_state(state)
}

async fn reload_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    tracing::debug!("Browser connected for live reload");
    // a lagging receiver missed events; a full reload covers them all
    let stream = BroadcastStream::new(state.hub.subscribe())
        .map(|received| received.unwrap_or(ReloadEvent::Reload))
        .map(|event| Ok(Event::default().event(event.name()).data(event.name())));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn client_script() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript; charset=utf-8")],
        CLIENT_SCRIPT,
    )
}

async fn serve_file(State(state): State<AppState>, uri: Uri) -> Response {
    let Some(mut path) = resolve_path(&state.root, uri.path()) else {
        return not_found();
    };
    if path.is_dir() {
        // relative links in the index must resolve inside the directory
        if !uri.path().ends_with('/') {
            let location = match uri.query() {
                Some(query) => format!("{}/?{}", uri.path(), query),
                None => format!("{}/", uri.path()),
            };
            return Redirect::temporary(&location).into_response();
        }
        path.push("index.html");
    }

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(_) => {
            tracing::debug!("404 {}", uri.path());
            return not_found();
        }
    };

    let mime = mime_guess::from_path(&path).first_or_octet_stream();
    let body = if state.live_reload && mime.essence_str() == "text/html" {
        inject_client(&String::from_utf8_lossy(&bytes)).into_bytes()
    } else {
        bytes
    };

    (
        [
            (header::CONTENT_TYPE, mime.to_string()),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        body,
    )
        .into_response()
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not Found").into_response()
}

/// Map a request path onto the served root, refusing anything that would
/// escape it.
fn resolve_path(root: &Path, request_path: &str) -> Option<PathBuf> {
    let decoded = percent_decode(request_path)?;
    let mut path = root.to_path_buf();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => return None,
            s if s.contains('\\') || s.contains('\0') => return None,
            s => path.push(s),
        }
    }
    Some(path)
}

fn percent_decode(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = input.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

/// Insert the reload client before `</body>`, or append it.
fn inject_client(html: &str) -> String {
    // ASCII lowercasing keeps byte offsets aligned
    match html.to_ascii_lowercase().rfind("</body>") {
        Some(pos) => {
            let mut out = String::with_capacity(html.len() + CLIENT_TAG.len());
            out.push_str(&html[..pos]);
            out.push_str(CLIENT_TAG);
            out.push_str(&html[pos..]);
            out
        }
        None => format!("{html}{CLIENT_TAG}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn start(root: &Path, live_reload: bool) -> (SocketAddr, ReloadHub) {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            live_reload,
        };
        let hub = ReloadHub::default();
        let server = DevServer::bind(&config, root.to_path_buf(), hub.clone())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());
        (addr, hub)
    }

    fn site() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html><body><p>home</p></body></html>").unwrap();
        std::fs::create_dir_all(dir.path().join("assets/css")).unwrap();
        std::fs::write(dir.path().join("assets/css/main.min.css"), ".a{color:red}").unwrap();
        dir
    }

    #[test]
    fn test_inject_before_body_close() {
        assert_eq!(
            inject_client("<p>x</p></BODY></html>"),
            format!("<p>x</p>{CLIENT_TAG}</BODY></html>")
        );
        assert_eq!(inject_client("<p>x</p>"), format!("<p>x</p>{CLIENT_TAG}"));
    }

    #[test]
    fn test_resolve_path_rejects_traversal() {
        let root = Path::new("/site");
        assert_eq!(resolve_path(root, "/a/b.css"), Some(PathBuf::from("/site/a/b.css")));
        assert_eq!(resolve_path(root, "/"), Some(PathBuf::from("/site")));
        assert_eq!(resolve_path(root, "/my%20page.html"), Some(PathBuf::from("/site/my page.html")));
        assert_eq!(resolve_path(root, "/../etc/passwd"), None);
        assert_eq!(resolve_path(root, "/%2e%2e/etc/passwd"), None);
        assert_eq!(resolve_path(root, "/bad%zz"), None);
    }

    #[tokio::test]
    async fn test_serves_index_with_reload_client() {
        let dir = site();
        let (addr, _hub) = start(dir.path(), true).await;

        let resp = reqwest::get(format!("http://{addr}/")).await.unwrap();
        assert_eq!(resp.status(), 200);
        assert!(resp.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/html"));
        let body = resp.text().await.unwrap();
        assert!(body.contains(&format!("{CLIENT_TAG}</body>")));

        let css = reqwest::get(format!("http://{addr}/assets/css/main.min.css"))
            .await
            .unwrap();
        assert_eq!(css.headers()[header::CONTENT_TYPE], "text/css");
        assert_eq!(css.text().await.unwrap(), ".a{color:red}");

        let script = reqwest::get(format!("http://{addr}{CLIENT_PATH}")).await.unwrap();
        assert!(script.text().await.unwrap().contains("EventSource"));
    }

    #[tokio::test]
    async fn test_directory_without_slash_redirects() {
        let dir = site();
        std::fs::create_dir_all(dir.path().join("blog")).unwrap();
        std::fs::write(dir.path().join("blog/index.html"), "<p>blog</p>").unwrap();
        let (addr, _hub) = start(dir.path(), true).await;

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();
        let resp = client
            .get(format!("http://{addr}/blog?page=2"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(resp.headers()[header::LOCATION], "/blog/?page=2");

        let body = client
            .get(format!("http://{addr}/blog/"))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(body.starts_with("<p>blog</p>"));
    }

    #[tokio::test]
    async fn test_missing_file_is_404() {
        let dir = site();
        let (addr, _hub) = start(dir.path(), true).await;
        let resp = reqwest::get(format!("http://{addr}/nope.html")).await.unwrap();
        assert_eq!(resp.status(), 404);
    }

    #[tokio::test]
    async fn test_no_injection_when_reload_disabled() {
        let dir = site();
        let (addr, _hub) = start(dir.path(), false).await;

        let body = reqwest::get(format!("http://{addr}/index.html"))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(!body.contains(CLIENT_TAG));

        let resp = reqwest::get(format!("http://{addr}{CLIENT_PATH}")).await.unwrap();
        assert_eq!(resp.status(), 404);
    }

    #[tokio::test]
    async fn test_sse_stream_delivers_events() {
        let dir = site();
        let (addr, hub) = start(dir.path(), true).await;

        let resp = reqwest::get(format!("http://{addr}{RELOAD_PATH}")).await.unwrap();
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/event-stream");
        assert_eq!(hub.subscriber_count(), 1);
        hub.send(ReloadEvent::Css);

        let mut stream = Box::pin(resp.bytes_stream());
        let mut received = String::new();
        tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(chunk) = stream.next().await {
                received.push_str(&String::from_utf8_lossy(&chunk.unwrap()));
                if received.contains("event: css") {
                    break;
                }
            }
        })
        .await
        .unwrap();
        assert!(received.contains("data: css"));
    }
}
