//! The session router: HTTP surface of the protocol engine
//!
//! Three entry points keyed by method on `/mcp`:
//! POST carries JSON-RPC, GET opens the session's notification stream,
//! DELETE terminates the session. Routing is driven entirely by the
//! `Mcp-Session-Id` header; only a well-formed `initialize` may create a
//! session.

use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::post,
    Json, Router,
};
use futures_util::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, warn};

use crate::{
    dispatch::Dispatcher,
    protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse},
    session::{ProtocolSession, SessionManager},
    tools::{InMemoryToolRegistry, ToolPack},
};

/// Header carrying the session id on every request after `initialize`
pub const SESSION_ID_HEADER: &str = "mcp-session-id";

/// Shared state behind the `/mcp` routes
#[derive(Clone)]
pub struct McpState {
    pub sessions: Arc<SessionManager>,
    pub dispatcher: Arc<Dispatcher>,
}

impl McpState {
    /// Build state with the tool pack selected at startup
    pub fn new(pack: &dyn ToolPack) -> Self {
        let mut registry = InMemoryToolRegistry::new();
        pack.register(&mut registry);

        Self {
            sessions: Arc::new(SessionManager::new()),
            dispatcher: Arc::new(Dispatcher::new(Arc::new(registry))),
        }
    }
}

/// Create the `/mcp` routes
pub fn mcp_routes(state: McpState) -> Router {
    Router::new()
        .route(
            "/mcp",
            post(mcp_post_handler)
                .get(mcp_sse_handler)
                .delete(mcp_delete_handler),
        )
        .with_state(state)
}

/// Check that the Accept header declares both the JSON and the event-stream
/// media types. `*/*` does not count: the client must name both.
fn accepts_json_and_event_stream(headers: &HeaderMap) -> bool {
    let accept = match headers.get(header::ACCEPT).and_then(|v| v.to_str().ok()) {
        Some(value) => value,
        None => return false,
    };

    let mut json = false;
    let mut event_stream = false;
    for part in accept.split(',') {
        let media_type = part.split(';').next().unwrap_or("").trim();
        match media_type {
            "application/json" => json = true,
            "text/event-stream" => event_stream = true,
            _ => {}
        }
    }
    json && event_stream
}

fn session_id_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// JSON-RPC-shaped error body for transport-level rejections
fn transport_error(status: StatusCode, code: i32, message: &str) -> Response {
    let body = serde_json::json!({
        "jsonrpc": "2.0",
        "error": { "code": code, "message": message },
        "id": null,
    });
    (status, Json(body)).into_response()
}

/// Handle POST requests: create-or-route JSON-RPC
pub async fn mcp_post_handler(
    State(state): State<McpState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !accepts_json_and_event_stream(&headers) {
        return transport_error(
            StatusCode::NOT_ACCEPTABLE,
            -32000,
            "Not Acceptable: Client must accept both application/json and text/event-stream",
        );
    }

    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            debug!(error = %e, "rejecting malformed JSON-RPC envelope");
            let response =
                JsonRpcResponse::error(JsonRpcError::parse_error(e.to_string()), None);
            return (StatusCode::BAD_REQUEST, Json(response)).into_response();
        }
    };

    let session_id = session_id_header(&headers);
    let is_initialize = request.method == "initialize";

    match (session_id, is_initialize) {
        // Common case: an id that resolves to a live session
        (Some(id), false) => match state.sessions.get_session(&id).await {
            Some(session) => respond_in_session(&state, request, session).await,
            None => no_valid_session(),
        },

        // Initialize with a suggested id: honored unless it collides
        (Some(id), true) => {
            if state.sessions.get_session(&id).await.is_some() {
                warn!(session_id = %id, "rejecting initialize with an id bound to a live session");
                return transport_error(
                    StatusCode::BAD_REQUEST,
                    -32000,
                    "Bad Request: Suggested session id is already in use",
                );
            }
            initialize_session(&state, request, Some(id)).await
        }

        // Initialize with no id: the only way to mint a fresh session
        (None, true) => initialize_session(&state, request, None).await,

        (None, false) => no_valid_session(),
    }
}

fn no_valid_session() -> Response {
    transport_error(
        StatusCode::BAD_REQUEST,
        -32000,
        "Bad Request: No valid session ID provided",
    )
}

async fn respond_in_session(
    state: &McpState,
    request: JsonRpcRequest,
    session: Arc<ProtocolSession>,
) -> Response {
    match state.dispatcher.handle_request(request, session).await {
        Some(response) => (StatusCode::OK, Json(response)).into_response(),
        // Notifications expect no response envelope
        None => StatusCode::ACCEPTED.into_response(),
    }
}

async fn initialize_session(
    state: &McpState,
    request: JsonRpcRequest,
    suggested_id: Option<String>,
) -> Response {
    let session = match state.sessions.create_session(suggested_id).await {
        Ok(session) => session,
        Err(err) => return err.into_response(),
    };
    let session_id = session.session_id.clone();

    let response = state.dispatcher.handle_request(request, session).await;

    match response {
        Some(response) if !response.is_error() => {
            let mut http_response = (StatusCode::OK, Json(response)).into_response();
            match HeaderValue::from_str(&session_id) {
                Ok(value) => {
                    http_response.headers_mut().insert(SESSION_ID_HEADER, value);
                }
                Err(_) => {
                    // a session id we cannot echo back is useless to the client
                    state.sessions.remove_session(&session_id).await;
                    return transport_error(
                        StatusCode::BAD_REQUEST,
                        -32000,
                        "Bad Request: Session id is not a valid header value",
                    );
                }
            }
            http_response
        }
        Some(response) => {
            // a malformed initialize must not leave a half-created session
            state.sessions.remove_session(&session_id).await;
            (StatusCode::BAD_REQUEST, Json(response)).into_response()
        }
        None => {
            // initialize is a request, never a notification
            state.sessions.remove_session(&session_id).await;
            transport_error(
                StatusCode::BAD_REQUEST,
                -32600,
                "Invalid Request: initialize requires an id",
            )
        }
    }
}

/// Evicts the session when the stream it belongs to closes, unless a newer
/// subscriber has displaced it in the meantime.
struct SubscriberGuard {
    sessions: Arc<SessionManager>,
    session_id: String,
    generation: u64,
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        let sessions = Arc::clone(&self.sessions);
        let session_id = self.session_id.clone();
        let generation = self.generation;
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                sessions.close_if_current(&session_id, generation).await;
            });
        }
    }
}

/// Handle GET requests: open the session's SSE notification stream
pub async fn mcp_sse_handler(State(state): State<McpState>, headers: HeaderMap) -> Response {
    // Transport-level errors here are plain text, not JSON-RPC
    let session_id = match session_id_header(&headers) {
        Some(id) => id,
        None => {
            return (StatusCode::BAD_REQUEST, "Missing Mcp-Session-Id header").into_response()
        }
    };

    let session = match state.sessions.get_session(&session_id).await {
        Some(session) => session,
        None => return (StatusCode::BAD_REQUEST, "Unknown session id").into_response(),
    };

    let (receiver, generation) = session.subscribe().await;
    let guard = SubscriberGuard {
        sessions: Arc::clone(&state.sessions),
        session_id: session_id.clone(),
        generation,
    };

    debug!(session_id = %session_id, "event stream attached");

    // The guard lives inside the stream closure; dropping the stream
    // (client disconnect or displacement) evicts the session. Once the
    // stream has started, failures can only be logged, never delivered.
    let stream = UnboundedReceiverStream::new(receiver).filter_map(move |notification| {
        let _ = &guard;
        std::future::ready(match serde_json::to_string(&notification) {
            Ok(data) => Some(Ok::<_, Infallible>(
                Event::default().event("message").data(data),
            )),
            Err(e) => {
                warn!(error = %e, "dropping notification that failed to serialize");
                None
            }
        })
    });

    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(15))
                .text("keep-alive"),
        )
        .into_response()
}

/// Handle DELETE requests: terminate the session
pub async fn mcp_delete_handler(State(state): State<McpState>, headers: HeaderMap) -> Response {
    let session_id = match session_id_header(&headers) {
        Some(id) => id,
        None => {
            return (StatusCode::BAD_REQUEST, "Missing Mcp-Session-Id header").into_response()
        }
    };

    if !state.sessions.remove_session(&session_id).await {
        return (StatusCode::BAD_REQUEST, "Unknown session id").into_response();
    }

    Json(serde_json::json!({
        "jsonrpc": "2.0",
        "result": { "status": "terminated" }
    }))
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with_accept(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_accept_requires_both_media_types() {
        assert!(accepts_json_and_event_stream(&headers_with_accept(
            "application/json, text/event-stream"
        )));
        assert!(accepts_json_and_event_stream(&headers_with_accept(
            "text/event-stream;q=0.9, application/json"
        )));

        assert!(!accepts_json_and_event_stream(&headers_with_accept("*/*")));
        assert!(!accepts_json_and_event_stream(&headers_with_accept(
            "application/json"
        )));
        assert!(!accepts_json_and_event_stream(&headers_with_accept(
            "text/event-stream"
        )));
        assert!(!accepts_json_and_event_stream(&HeaderMap::new()));
    }

    #[test]
    fn test_session_id_header_extraction() {
        let mut headers = HeaderMap::new();
        assert!(session_id_header(&headers).is_none());

        headers.insert(SESSION_ID_HEADER, HeaderValue::from_static("abc-123"));
        assert_eq!(session_id_header(&headers).as_deref(), Some("abc-123"));
    }
}
