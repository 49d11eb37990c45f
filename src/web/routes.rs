// MeshTail - web/routes.rs
//
// Axum router for the live view.
//
//   GET /                 viewer page
//   GET /log?from=N       new lines since cursor N (text/plain)
//                         X-Log-Next: cursor for the next call
//                         X-Log-Reset: 1 when the client must discard its view
//   GET /nodes            selectable sources (JSON)
//   GET /select?mac=HEX   switch the viewed stream, always "OK\n"
//   GET /clear            empty the buffer, always "OK\n"
//
// The /log handler never emits tracing events: with the local stream
// selected at debug level every poll would feed a line back into the ring.

use crate::app::view::LiveView;
use crate::core::model::NodeAddress;
use crate::core::registry::ListedNode;
use crate::util::constants::{HEADER_LOG_NEXT, HEADER_LOG_RESET};
use crate::util::error::SnapshotError;
use axum::extract::{Query, State};
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

const PAGE_TEMPLATE: &str = include_str!("page.html");

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Shared handler state.
#[derive(Clone)]
pub struct WebState {
    pub view: Arc<LiveView>,
    /// Viewer page poll interval, substituted into the page.
    pub poll_interval_ms: u64,
}

/// Build the router for `state`.
pub fn router(state: WebState) -> Router {
    Router::new()
        .route("/", get(page))
        .route("/log", get(log))
        .route("/nodes", get(nodes))
        .route("/select", get(select))
        .route("/clear", get(clear))
        .with_state(state)
}

/// Serve `app` on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "HTTP viewer listening");
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

async fn page(State(state): State<WebState>) -> Html<String> {
    Html(PAGE_TEMPLATE.replace("{{POLL_MS}}", &state.poll_interval_ms.to_string()))
}

/// Cursor from the query string. Absent or non-numeric means 0.
fn parse_cursor(params: &HashMap<String, String>) -> u64 {
    params
        .get("from")
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(0)
}

async fn log(
    State(state): State<WebState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let from = parse_cursor(&params);
    match state.view.snapshot(from) {
        Ok(snapshot) => {
            let next = HeaderValue::from(snapshot.next);
            let reset = HeaderValue::from_static(if snapshot.truncated { "1" } else { "0" });
            (
                [
                    (header::CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN)),
                    (HeaderName::from_static(HEADER_LOG_NEXT), next),
                    (HeaderName::from_static(HEADER_LOG_RESET), reset),
                ],
                snapshot.payload,
            )
                .into_response()
        }
        Err(SnapshotError::OutOfMemory { .. }) => (
            StatusCode::SERVICE_UNAVAILABLE,
            [
                (header::CONTENT_TYPE, TEXT_PLAIN),
                (header::RETRY_AFTER, "1"),
            ],
            "no-mem\n",
        )
            .into_response(),
    }
}

/// JSON shape consumed by the viewer's node dropdown.
#[derive(Debug, Serialize)]
pub struct NodesBody {
    pub selected_mac: NodeAddress,
    pub selected_tag: String,
    pub nodes: Vec<NodeEntry>,
}

#[derive(Debug, Serialize)]
pub struct NodeEntry {
    pub mac: NodeAddress,
    pub tag: String,
    pub local: bool,
    pub selected: bool,
    /// Milliseconds since the last announcement; `null` for the local node
    /// and for a selection that never announced.
    pub last_seen_ms: Option<u64>,
}

impl From<ListedNode> for NodeEntry {
    fn from(n: ListedNode) -> Self {
        Self {
            mac: n.identity.address,
            tag: n.identity.label.as_str().to_string(),
            local: n.is_local,
            selected: n.is_selected,
            last_seen_ms: n
                .last_seen_ago
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
        }
    }
}

async fn nodes(State(state): State<WebState>) -> Json<NodesBody> {
    let listing = state.view.nodes();
    Json(NodesBody {
        selected_mac: listing.selected.address,
        selected_tag: listing.selected.label.as_str().to_string(),
        nodes: listing.nodes.into_iter().map(NodeEntry::from).collect(),
    })
}

async fn select(
    State(state): State<WebState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    match params.get("mac").map(|m| m.parse::<NodeAddress>()) {
        Some(Ok(address)) => {
            state.view.select_address(address);
        }
        Some(Err(e)) => {
            tracing::debug!(error = %e, "Ignoring /select with malformed address");
        }
        None => {}
    }
    ok_text()
}

async fn clear(State(state): State<WebState>) -> Response {
    state.view.clear();
    ok_text()
}

fn ok_text() -> Response {
    ([(header::CONTENT_TYPE, TEXT_PLAIN)], "OK\n").into_response()
}
