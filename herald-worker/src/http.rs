//! HTTP surface of a worker.
//!
//! - `POST /task`: multiply a comma-separated list of integers
//! - `GET /status`: liveness probe
//!
//! Any other method on these paths gets an empty `405` and the connection is
//! closed.

use crate::task;
use crate::{WorkerError, WorkerResult};
use axum::{
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

pub const TASK_ENDPOINT: &str = "/task";
pub const STATUS_ENDPOINT: &str = "/status";

const TEST_HEADER: &str = "x-test";
const DEBUG_HEADER: &str = "x-debug";
const DEBUG_INFO_HEADER: &str = "x-debug-info";

/// Router serving the worker endpoints.
pub fn router() -> Router {
    Router::new()
        .route(TASK_ENDPOINT, post(handle_task).fallback(close_connection))
        .route(STATUS_ENDPOINT, get(handle_status).fallback(close_connection))
}

fn header_is_true(headers: &HeaderMap, name: &str) -> bool {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.trim().eq_ignore_ascii_case("true"))
}

async fn handle_task(headers: HeaderMap, body: String) -> Response {
    if header_is_true(&headers, TEST_HEADER) {
        return "123\n".into_response();
    }

    let started = Instant::now();
    let product = match task::multiply(&body) {
        Ok(product) => product,
        Err(e) => {
            debug!("Rejecting task: {}", e);
            return (StatusCode::BAD_REQUEST, format!("{}\n", e)).into_response();
        }
    };
    let elapsed = started.elapsed().as_nanos();

    let reply = format!("Result of the multiplication is {}\n", product);
    if header_is_true(&headers, DEBUG_HEADER) {
        let debug_info = format!("Operation took {} ns", elapsed);
        ([(DEBUG_INFO_HEADER, debug_info)], reply).into_response()
    } else {
        reply.into_response()
    }
}

async fn handle_status() -> &'static str {
    "Server is alive"
}

async fn close_connection() -> impl IntoResponse {
    (StatusCode::METHOD_NOT_ALLOWED, [(header::CONNECTION, "close")])
}

/// A running worker HTTP server.
pub struct WorkerServer {
    local_addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl WorkerServer {
    /// Bind `host:port` and serve [`router`] in the background.
    ///
    /// Port 0 picks a free port; see [`WorkerServer::local_addr`].
    pub async fn bind(host: &str, port: u16) -> WorkerResult<Self> {
        let listener = TcpListener::bind((host, port))
            .await
            .map_err(|source| WorkerError::Bind {
                addr: format!("{}:{}", host, port),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| WorkerError::Bind {
            addr: format!("{}:{}", host, port),
            source,
        })?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, router())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = served {
                error!("Worker server on {} failed: {}", local_addr, e);
            }
        });

        info!("Server is listening on {}", local_addr);
        Ok(Self {
            local_addr,
            shutdown_tx,
            handle,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and wait for in-flight requests.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.handle.await {
            error!("Worker server task on {} panicked: {}", self.local_addr, e);
        }
        info!("Server on {} stopped", self.local_addr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use tower::ServiceExt;

    async fn send(request: Request<Body>) -> (StatusCode, HeaderMap, String) {
        let response = router().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, String::from_utf8(body.to_vec()).unwrap())
    }

    fn task_request() -> axum::http::request::Builder {
        Request::builder().method(Method::POST).uri(TASK_ENDPOINT)
    }

    #[tokio::test]
    async fn test_task_multiplies() {
        let request = task_request().body(Body::from("2,3,4")).unwrap();
        let (status, headers, body) = send(request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Result of the multiplication is 24\n");
        assert!(headers.get("x-debug-info").is_none());
    }

    #[tokio::test]
    async fn test_task_debug_header() {
        let request = task_request()
            .header("X-Debug", "TRUE")
            .body(Body::from("10,10"))
            .unwrap();
        let (status, headers, body) = send(request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Result of the multiplication is 100\n");

        let info = headers.get("x-debug-info").unwrap().to_str().unwrap();
        assert!(info.starts_with("Operation took "));
        assert!(info.ends_with(" ns"));
    }

    #[tokio::test]
    async fn test_task_test_header_short_circuits() {
        let request = task_request()
            .header("X-Test", "true")
            .body(Body::from("not numbers"))
            .unwrap();
        let (status, _, body) = send(request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "123\n");
    }

    #[tokio::test]
    async fn test_task_rejects_malformed_numbers() {
        let request = task_request().body(Body::from("2,three")).unwrap();
        let (status, _, body) = send(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("three"));
    }

    #[tokio::test]
    async fn test_status() {
        let request = Request::builder()
            .uri(STATUS_ENDPOINT)
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Server is alive");
    }

    #[tokio::test]
    async fn test_other_methods_close_connection() {
        for (method, uri) in [
            (Method::GET, TASK_ENDPOINT),
            (Method::DELETE, TASK_ENDPOINT),
            (Method::POST, STATUS_ENDPOINT),
        ] {
            let request = Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap();
            let (status, headers, body) = send(request).await;
            assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
            assert_eq!(headers.get(header::CONNECTION).unwrap(), "close");
            assert!(body.is_empty());
        }
    }
}
