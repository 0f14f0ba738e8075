//! JSON-RPC endpoint shared by every role.
//!
//! A role implements [`RpcService`]: it names itself and dispatches `method` + `params` to its
//! handlers. [`mcp_router`] turns such a service into an `axum` router serving `POST /mcp`:
//!
//! - the body is parsed as a JSON-RPC 2.0 request (`-32700` / `-32600` otherwise);
//! - the call is dispatched, each request running on its own task;
//! - a handler error becomes a JSON-RPC error whose `data` is a `LEAGUE_ERROR` or `GAME_ERROR`
//!   message carrying `error_code` and `error_description`.
//!
//! Errors are always answered with HTTP 200 so that callers see them as terminal protocol
//! errors rather than transport failures.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::body::Bytes;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::{info, instrument, warn};

use crate::error::{rpc_code, LeagueError};
use crate::logger::{Direction, EventLog};
use crate::protocol::messages::ErrorPayload;
use crate::protocol::{
    new_conversation_id, Envelope, JsonRpcError, JsonRpcRequest, JsonRpcResponse, Message,
    MessageType, JSONRPC_VERSION,
};

/// A role reachable through `POST /mcp`.
pub trait RpcService: Send + Sync + 'static {
    /// Name used in logs, e.g. `referee`.
    fn component(&self) -> &str;

    /// `sender` of the error messages produced by this role.
    fn sender(&self) -> String;

    /// `LEAGUE_ERROR` for the League Manager, `GAME_ERROR` otherwise.
    fn error_message_type(&self) -> MessageType;

    fn events(&self) -> &EventLog;

    fn dispatch(
        self: Arc<Self>,
        method: String,
        params: Value,
    ) -> impl Future<Output = Result<Value, LeagueError>> + Send;
}

/// `POST /mcp` bound to `service`.
pub fn mcp_router<S: RpcService>(service: Arc<S>) -> Router {
    Router::new()
        .route("/mcp", post(mcp_endpoint::<S>))
        .with_state(service)
}

async fn mcp_endpoint<S: RpcService>(
    State(service): State<Arc<S>>,
    body: Bytes,
) -> Json<JsonRpcResponse> {
    Json(handle_request(service, &body).await)
}

#[instrument(skip_all, fields(component = service.component()))]
async fn handle_request<S: RpcService>(service: Arc<S>, body: &[u8]) -> JsonRpcResponse {
    let value: Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "unparseable request");
            return JsonRpcResponse::failure(
                Value::Null,
                JsonRpcError::new(rpc_code::PARSE_ERROR, format!("parse error: {e}")),
            );
        }
    };
    let id = value.get("id").cloned().unwrap_or(Value::Null);
    let request: JsonRpcRequest = match serde_json::from_value(value) {
        Ok(request) => request,
        Err(e) => {
            return JsonRpcResponse::failure(
                id,
                JsonRpcError::new(rpc_code::INVALID_REQUEST, format!("invalid request: {e}")),
            )
        }
    };
    if request.jsonrpc != JSONRPC_VERSION {
        return JsonRpcResponse::failure(
            request.id,
            JsonRpcError::new(
                rpc_code::INVALID_REQUEST,
                format!("unsupported jsonrpc version {:?}", request.jsonrpc),
            ),
        );
    }

    let conversation_id = request
        .params
        .get("conversation_id")
        .and_then(Value::as_str)
        .map(str::to_owned);
    let message_type = request
        .params
        .get("message_type")
        .and_then(|t| serde_json::from_value::<MessageType>(t.clone()).ok());
    if let Some(message_type) = message_type {
        let sender = request.params.get("sender").cloned().unwrap_or(Value::Null);
        service.events().message(
            Direction::Received,
            message_type,
            json!({"method": request.method, "sender": sender, "conversation_id": conversation_id}),
        );
    }

    let method = request.method.clone();
    match service.clone().dispatch(request.method, request.params).await {
        Ok(result) => JsonRpcResponse::success(request.id, result),
        Err(err) => {
            service.events().warning(
                "REQUEST_REJECTED",
                json!({
                    "method": method,
                    "conversation_id": conversation_id,
                    "error_code": err.error_code(),
                    "error": err.to_string(),
                }),
            );
            JsonRpcResponse::failure(
                request.id,
                error_object(&*service, &err, conversation_id),
            )
        }
    }
}

/// JSON-RPC error for `err`, with a full error message in `data`.
pub fn error_object<S: RpcService + ?Sized>(
    service: &S,
    err: &LeagueError,
    conversation_id: Option<String>,
) -> JsonRpcError {
    let envelope = Envelope::new(
        service.error_message_type(),
        service.sender(),
        conversation_id.unwrap_or_else(|| new_conversation_id("error")),
    );
    let payload = ErrorPayload {
        error_code: err.error_code(),
        error_description: err.error_code().map(|c| c.description().to_string()),
        reason: err.to_string(),
    };
    let error = JsonRpcError::new(err.rpc_code(), err.to_string());
    match Message::new(envelope, payload).to_value() {
        Ok(data) => error.with_data(data),
        Err(_) => error,
    }
}

/// Binds `host:port`. Port `0` picks a free port.
pub async fn bind(host: &str, port: u16) -> anyhow::Result<TcpListener> {
    let listener = TcpListener::bind((host, port))
        .await
        .with_context(|| format!("could not bind {host}:{port}"))?;
    Ok(listener)
}

/// Serves `router` until the process is interrupted.
pub async fn serve(listener: TcpListener, router: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = listener.local_addr().context("listener has no address")?;
    info!(%addr, "serving");
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("server stopped with an error")
}

/// `http://host:port/mcp` of a bound listener.
pub fn mcp_endpoint_url(listener: &TcpListener, host: &str) -> anyhow::Result<String> {
    let port = listener.local_addr().context("listener has no address")?.port();
    Ok(format!("http://{host}:{port}/mcp"))
}
