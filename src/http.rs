use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::task::{Context, Poll};

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::{LokiMcpError, Result};
use crate::mcp::{process_request, RpcRequest};
use crate::tools::LokiTools;

type Sessions = Arc<RwLock<HashMap<String, mpsc::UnboundedSender<Event>>>>;

#[derive(Clone)]
pub struct AppState {
    pub tools: Arc<LokiTools>,
    pub sessions: Sessions,
    next_session: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(tools: Arc<LokiTools>) -> Self {
        Self {
            tools,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            next_session: Arc::new(AtomicU64::new(1)),
        }
    }

    fn new_session_id(&self) -> String {
        let seq = self.next_session.fetch_add(1, Ordering::Relaxed);
        let started = chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0);
        format!("{started:x}-{seq}")
    }
}

/// Event stream of one SSE client. Dropping it, which axum does when the
/// client disconnects, unregisters the session.
struct SessionStream {
    inner: UnboundedReceiverStream<Event>,
    session_id: String,
    sessions: Sessions,
}

impl Stream for SessionStream {
    type Item = std::result::Result<Event, axum::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx).map(|ev| ev.map(Ok))
    }
}

impl Drop for SessionStream {
    fn drop(&mut self) {
        if let Ok(mut sessions) = self.sessions.write() {
            sessions.remove(&self.session_id);
        }
        debug!(session_id = %self.session_id, "sse session closed");
    }
}

async fn sse_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>> {
    let (tx, rx) = mpsc::unbounded_channel();
    let session_id = state.new_session_id();

    let endpoint_url = format!("/message?session_id={}", session_id);
    let _ = tx.send(Event::default().event("endpoint").data(endpoint_url));

    if let Ok(mut sessions) = state.sessions.write() {
        sessions.insert(session_id.clone(), tx);
    }
    info!(session_id = %session_id, "sse session opened");

    let stream = SessionStream {
        inner: UnboundedReceiverStream::new(rx),
        session_id,
        sessions: state.sessions.clone(),
    };
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[derive(Deserialize)]
struct MessageQuery {
    session_id: String,
}

async fn message_handler(
    State(state): State<AppState>,
    Query(q): Query<MessageQuery>,
    payload: std::result::Result<Json<RpcRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Ok(Json(req)) = payload else {
        return StatusCode::BAD_REQUEST;
    };
    let sender = state
        .sessions
        .read()
        .ok()
        .and_then(|sessions| sessions.get(&q.session_id).cloned());

    let Some(sender) = sender else {
        return StatusCode::NOT_FOUND;
    };

    let tools = state.tools.clone();
    let session_id = q.session_id;
    tokio::spawn(async move {
        let Some(resp) = process_request(tools, req).await else {
            return;
        };
        if let Ok(json_str) = serde_json::to_string(&resp) {
            if sender.send(Event::default().event("message").data(json_str)).is_err() {
                warn!(session_id = %session_id, "sse client gone before reply");
            }
        }
    });
    StatusCode::ACCEPTED
}

async fn health_handler() -> &'static str {
    "ok"
}

pub fn build_router(tools: Arc<LokiTools>) -> Router {
    router_with_state(AppState::new(tools))
}

fn router_with_state(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/sse", get(sse_handler))
        .route("/message", post(message_handler))
        .with_state(state)
}

pub async fn serve_http(tools: Arc<LokiTools>, server: &ServerConfig) -> Result<()> {
    let router = build_router(tools);
    let addr = format!("{}:{}", server.http_addr, server.http_port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| LokiMcpError::ConfigError(format!("bind {addr} failed: {e}")))?;
    info!(addr = %addr, "http transport listening");
    axum::serve(listener, router).await.map_err(|e| e.into())
}

/// Runs both transports. The HTTP server sets the process lifetime: stdin
/// reaching EOF leaves it serving, only a stdio error stops it early.
pub async fn serve_with_stdio<H, S>(http: H, stdio: S) -> Result<()>
where
    H: Future<Output = Result<()>>,
    S: Future<Output = Result<()>>,
{
    tokio::pin!(http);
    tokio::pin!(stdio);
    let mut stdio_done = false;
    loop {
        tokio::select! {
            res = &mut http => return res,
            res = &mut stdio, if !stdio_done => {
                res?;
                stdio_done = true;
                info!("stdin closed, http transport keeps serving");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::body::{to_bytes, Body, BodyDataStream};
    use axum::http::Request;
    use futures::StreamExt;
    use tokio::sync::oneshot;
    use tokio::time::timeout;
    use tower::util::ServiceExt;

    use crate::config::Config;

    fn state() -> AppState {
        let tools = LokiTools::from_config(&Config::new("http://127.0.0.1:9")).unwrap();
        AppState::new(Arc::new(tools))
    }

    fn app() -> Router {
        router_with_state(state())
    }

    fn session_count(state: &AppState) -> usize {
        state.sessions.read().unwrap().len()
    }

    /// Reads one `\n\n`-terminated SSE frame.
    async fn next_frame(body: &mut BodyDataStream) -> String {
        let mut frame = String::new();
        while !frame.contains("\n\n") {
            let chunk = timeout(Duration::from_secs(5), body.next())
                .await
                .expect("sse frame timed out")
                .expect("sse stream ended")
                .unwrap();
            frame.push_str(std::str::from_utf8(&chunk).unwrap());
        }
        frame
    }

    #[tokio::test]
    async fn disconnected_sse_clients_are_unregistered() {
        let state = state();
        for _ in 0..3 {
            let sse = sse_handler(State(state.clone())).await;
            assert_eq!(session_count(&state), 1);
            drop(sse);
        }
        assert_eq!(session_count(&state), 0);
    }

    #[tokio::test]
    async fn concurrent_sse_clients_get_distinct_sessions() {
        let state = state();
        let first = sse_handler(State(state.clone())).await;
        let second = sse_handler(State(state.clone())).await;
        assert_eq!(session_count(&state), 2);
        drop((first, second));
        assert_eq!(session_count(&state), 0);
    }

    #[tokio::test]
    async fn sse_round_trip_delivers_reply_as_message_event() {
        let state = state();
        let app = router_with_state(state.clone());

        let resp = app
            .clone()
            .oneshot(Request::builder().uri("/sse").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let mut body = resp.into_body().into_data_stream();

        let endpoint = next_frame(&mut body).await;
        assert!(endpoint.contains("event: endpoint"), "{endpoint}");
        let url = endpoint
            .lines()
            .find_map(|l| l.strip_prefix("data: "))
            .unwrap()
            .trim()
            .to_string();
        assert!(url.starts_with("/message?session_id="));

        let posted = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(&url)
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"jsonrpc":"2.0","id":7,"method":"ping"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(posted.status(), StatusCode::ACCEPTED);

        let message = next_frame(&mut body).await;
        assert!(message.contains("event: message"), "{message}");
        let data = message
            .lines()
            .find_map(|l| l.strip_prefix("data: "))
            .unwrap();
        let reply: serde_json::Value = serde_json::from_str(data).unwrap();
        assert_eq!(reply["id"], 7);
        assert_eq!(reply["jsonrpc"], "2.0");

        drop(body);
        assert_eq!(session_count(&state), 0);
    }

    #[tokio::test]
    async fn stdio_eof_keeps_http_running() {
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let http = async move {
            let _ = stop_rx.await;
            Ok::<(), LokiMcpError>(())
        };
        let stdio = async { Ok::<(), LokiMcpError>(()) };
        let task = tokio::spawn(serve_with_stdio(http, stdio));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!task.is_finished());

        stop_tx.send(()).unwrap();
        timeout(Duration::from_secs(5), task).await.unwrap().unwrap().unwrap();
    }

    #[tokio::test]
    async fn stdio_error_stops_both_transports() {
        let http = futures::future::pending::<Result<()>>();
        let stdio = async { Err::<(), _>(LokiMcpError::BackendTransport("stdin broken".into())) };
        let res = timeout(Duration::from_secs(5), serve_with_stdio(http, stdio))
            .await
            .unwrap();
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn health_endpoint_responds() {
        let resp = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = to_bytes(resp.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn message_for_unknown_session_is_404() {
        let resp = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/message?session_id=missing")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_message_body_is_400() {
        let resp = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/message?session_id=any")
                    .header("content-type", "application/json")
                    .body(Body::from("not-json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
