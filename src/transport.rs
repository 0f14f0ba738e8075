//! JSON-RPC client used by every role to reach the others.
//!
//! Connection failures and timeouts are retried with exponential backoff; anything else (HTTP
//! status, remote JSON-RPC error, undecodable body) is terminal and surfaces immediately.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::error::{rpc_code, ErrorCode};
use crate::protocol::{decode_any, JsonRpcError, JsonRpcRequest, JsonRpcResponse, Message};

/// Backoff discipline of [`McpClient::call`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Sleep after the failed attempt number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .mul_f64(self.multiplier.powi(attempt as i32))
    }

    /// Every sleep of a fully failing call, in order.
    pub fn backoff_schedule(&self) -> Vec<Duration> {
        (0..self.max_retries.saturating_sub(1))
            .map(|attempt| self.delay_for(attempt))
            .collect()
    }
}

/// Failure of a single HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExchangeError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    Decode(String),
}

impl ExchangeError {
    fn is_retryable(&self) -> bool {
        matches!(self, ExchangeError::Timeout | ExchangeError::Connect(_))
    }
}

/// One request/response round trip. Split out so retry behaviour can be driven without sockets.
pub trait Exchange: Send + Sync {
    fn post(
        &self,
        endpoint: &str,
        request: &JsonRpcRequest,
        timeout: Duration,
    ) -> impl Future<Output = Result<JsonRpcResponse, ExchangeError>> + Send;
}

/// [`Exchange`] over HTTP with `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct HttpExchange {
    client: reqwest::Client,
}

impl HttpExchange {
    pub fn new(client: reqwest::Client) -> Self {
        HttpExchange { client }
    }
}

fn classify(err: reqwest::Error) -> ExchangeError {
    if err.is_timeout() {
        ExchangeError::Timeout
    } else if let Some(status) = err.status() {
        ExchangeError::Status(status.as_u16())
    } else if err.is_decode() {
        ExchangeError::Decode(err.to_string())
    } else {
        ExchangeError::Connect(err.to_string())
    }
}

impl Exchange for HttpExchange {
    async fn post(
        &self,
        endpoint: &str,
        request: &JsonRpcRequest,
        timeout: Duration,
    ) -> Result<JsonRpcResponse, ExchangeError> {
        let response = self
            .client
            .post(endpoint)
            .timeout(timeout)
            .json(request)
            .send()
            .await
            .map_err(classify)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ExchangeError::Status(status.as_u16()));
        }
        let body = response.bytes().await.map_err(classify)?;
        serde_json::from_slice(&body).map_err(|e| ExchangeError::Decode(e.to_string()))
    }
}

/// Failure of a whole call, after retries.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("{endpoint} timed out after {attempts} attempt(s)")]
    Timeout { endpoint: String, attempts: u32 },

    #[error("could not reach {endpoint} after {attempts} attempt(s): {reason}")]
    Connection {
        endpoint: String,
        attempts: u32,
        reason: String,
    },

    #[error("{endpoint} answered with HTTP status {status}")]
    Http { endpoint: String, status: u16 },

    #[error("{endpoint} returned error {}: {}", error.code, error.message)]
    Rpc { endpoint: String, error: JsonRpcError },

    #[error("malformed exchange with {endpoint}: {reason}")]
    Decode { endpoint: String, reason: String },
}

impl TransportError {
    fn from_exchange(endpoint: &str, err: ExchangeError, attempts: u32) -> Self {
        let endpoint = endpoint.to_string();
        match err {
            ExchangeError::Timeout => TransportError::Timeout { endpoint, attempts },
            ExchangeError::Connect(reason) => TransportError::Connection {
                endpoint,
                attempts,
                reason,
            },
            ExchangeError::Status(status) => TransportError::Http { endpoint, status },
            ExchangeError::Decode(reason) => TransportError::Decode { endpoint, reason },
        }
    }

    /// League code of the failure, when it has one.
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            TransportError::Timeout { .. } => Some(ErrorCode::Timeout),
            TransportError::Connection { .. } => Some(ErrorCode::ConnectionError),
            TransportError::Rpc { error, .. } => error.error_code(),
            TransportError::Http { .. } | TransportError::Decode { .. } => None,
        }
    }

    /// JSON-RPC form of the failure: remote errors pass through, local ones use `-32000`
    /// (single attempt) or `-32001` (retries exhausted).
    pub fn to_rpc_error(&self) -> JsonRpcError {
        match self {
            TransportError::Rpc { error, .. } => error.clone(),
            TransportError::Timeout { attempts, .. }
            | TransportError::Connection { attempts, .. } => {
                let code = if *attempts > 1 {
                    rpc_code::TRANSPORT_ERROR
                } else {
                    rpc_code::LEAGUE_ERROR
                };
                let error = JsonRpcError::new(code, self.to_string());
                match self.error_code() {
                    Some(c) => error.with_data(json!({
                        "error_code": c,
                        "error_description": c.description(),
                    })),
                    None => error,
                }
            }
            TransportError::Http { .. } | TransportError::Decode { .. } => {
                JsonRpcError::new(rpc_code::LEAGUE_ERROR, self.to_string())
            }
        }
    }
}

/// JSON-RPC client with retry and exponential backoff.
#[derive(Debug)]
pub struct McpClient<E = HttpExchange> {
    exchange: E,
    retry: RetryPolicy,
    next_id: AtomicU64,
}

impl McpClient<HttpExchange> {
    pub fn new(retry: RetryPolicy) -> Self {
        McpClient::with_exchange(HttpExchange::default(), retry)
    }
}

impl<E: Exchange> McpClient<E> {
    pub fn with_exchange(exchange: E, retry: RetryPolicy) -> Self {
        McpClient {
            exchange,
            retry,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn exchange(&self) -> &E {
        &self.exchange
    }

    fn request(&self, method: &str, params: Value) -> JsonRpcRequest {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        JsonRpcRequest::new(method, params, id)
    }

    /// Calls `method` on `endpoint`, retrying timeouts and connection failures.
    #[instrument(skip(self, params), fields(attempts = self.retry.max_retries))]
    pub async fn call(
        &self,
        endpoint: &str,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, TransportError> {
        let request = self.request(method, params);
        let attempts = self.retry.max_retries.max(1);
        let mut last = ExchangeError::Timeout;
        for attempt in 0..attempts {
            match self.exchange.post(endpoint, &request, timeout).await {
                Ok(response) => return unwrap_response(endpoint, response),
                Err(err) if err.is_retryable() => {
                    warn!(attempt = attempt + 1, error = %err, "attempt failed");
                    last = err;
                    if attempt + 1 < attempts {
                        let delay = self.retry.delay_for(attempt);
                        debug!(?delay, "backing off");
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(err) => return Err(TransportError::from_exchange(endpoint, err, attempt + 1)),
            }
        }
        Err(TransportError::from_exchange(endpoint, last, attempts))
    }

    /// Single attempt, for notifications the caller must not stall on.
    #[instrument(skip(self, params))]
    pub async fn call_no_retry(
        &self,
        endpoint: &str,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, TransportError> {
        let request = self.request(method, params);
        match self.exchange.post(endpoint, &request, timeout).await {
            Ok(response) => unwrap_response(endpoint, response),
            Err(err) => Err(TransportError::from_exchange(endpoint, err, 1)),
        }
    }

    /// Sends a typed message with retries and decodes the typed reply.
    pub async fn send<P: Serialize, R: DeserializeOwned>(
        &self,
        endpoint: &str,
        method: &str,
        message: &Message<P>,
        timeout: Duration,
    ) -> Result<Message<R>, TransportError> {
        let params = encode(endpoint, message)?;
        let result = self.call(endpoint, method, params, timeout).await?;
        decode_reply(endpoint, result)
    }

    /// [`McpClient::send`] with a single attempt.
    pub async fn send_no_retry<P: Serialize, R: DeserializeOwned>(
        &self,
        endpoint: &str,
        method: &str,
        message: &Message<P>,
        timeout: Duration,
    ) -> Result<Message<R>, TransportError> {
        let params = encode(endpoint, message)?;
        let result = self.call_no_retry(endpoint, method, params, timeout).await?;
        decode_reply(endpoint, result)
    }
}

fn unwrap_response(endpoint: &str, response: JsonRpcResponse) -> Result<Value, TransportError> {
    response
        .into_result()
        .map_err(|error| TransportError::Rpc {
            endpoint: endpoint.to_string(),
            error,
        })
}

fn encode<P: Serialize>(endpoint: &str, message: &Message<P>) -> Result<Value, TransportError> {
    serde_json::to_value(message).map_err(|e| TransportError::Decode {
        endpoint: endpoint.to_string(),
        reason: format!("could not encode request: {e}"),
    })
}

fn decode_reply<R: DeserializeOwned>(
    endpoint: &str,
    result: Value,
) -> Result<Message<R>, TransportError> {
    decode_any(result).map_err(|e| TransportError::Decode {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Mutex};

    use axum::routing::post;
    use axum::{Json, Router};
    use tokio::time::Instant;

    use super::*;

    /// Replays a scripted list of outcomes, then keeps returning the last one.
    struct ScriptedExchange {
        script: Mutex<Vec<Result<JsonRpcResponse, ExchangeError>>>,
        calls: AtomicUsize,
        sent_ids: Mutex<Vec<Value>>,
    }

    impl ScriptedExchange {
        fn new(mut script: Vec<Result<JsonRpcResponse, ExchangeError>>) -> Self {
            script.reverse();
            ScriptedExchange {
                script: Mutex::new(script),
                calls: AtomicUsize::new(0),
                sent_ids: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Exchange for ScriptedExchange {
        async fn post(
            &self,
            _endpoint: &str,
            request: &JsonRpcRequest,
            _timeout: Duration,
        ) -> Result<JsonRpcResponse, ExchangeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.sent_ids.lock().unwrap().push(request.id.clone());
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop().unwrap()
            } else {
                script.last().cloned().unwrap()
            }
        }
    }

    fn ok(result: Value) -> Result<JsonRpcResponse, ExchangeError> {
        Ok(JsonRpcResponse::success(json!(1), result))
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }

    #[test]
    fn backoff_schedule_has_no_sleep_after_last_attempt() {
        assert_eq!(
            policy().backoff_schedule(),
            vec![Duration::from_secs(2), Duration::from_secs(4)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn always_timing_out_makes_three_attempts_then_e001() {
        let client = McpClient::with_exchange(
            ScriptedExchange::new(vec![Err(ExchangeError::Timeout)]),
            policy(),
        );
        let start = Instant::now();
        let err = client
            .call("http://p", "choose_parity", json!({}), Duration::from_secs(1))
            .await
            .unwrap_err();

        assert_eq!(client.exchange().calls(), 3);
        // Sleeps are 2 s then 4 s, the scripted exchange itself takes no time.
        assert_eq!(start.elapsed(), Duration::from_secs(6));
        assert_eq!(err.error_code(), Some(ErrorCode::Timeout));
        let rpc = err.to_rpc_error();
        assert_eq!(rpc.code, rpc_code::TRANSPORT_ERROR);
        assert_eq!(rpc.error_code(), Some(ErrorCode::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn connection_failures_exhaust_to_e009() {
        let client = McpClient::with_exchange(
            ScriptedExchange::new(vec![Err(ExchangeError::Connect("refused".into()))]),
            policy(),
        );
        let err = client
            .call("http://p", "ping", json!({}), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(client.exchange().calls(), 3);
        assert_eq!(err.error_code(), Some(ErrorCode::ConnectionError));
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failures() {
        let client = McpClient::with_exchange(
            ScriptedExchange::new(vec![
                Err(ExchangeError::Timeout),
                Err(ExchangeError::Connect("reset".into())),
                ok(json!({"status": "ok"})),
            ]),
            policy(),
        );
        let result = client
            .call("http://p", "ping", json!({}), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(result, json!({"status": "ok"}));
        assert_eq!(client.exchange().calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn http_status_is_terminal() {
        let client = McpClient::with_exchange(
            ScriptedExchange::new(vec![Err(ExchangeError::Status(500))]),
            policy(),
        );
        let start = Instant::now();
        let err = client
            .call("http://p", "ping", json!({}), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(client.exchange().calls(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(matches!(err, TransportError::Http { status: 500, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn remote_rpc_error_is_terminal_and_keeps_its_code() {
        let error = JsonRpcError::new(rpc_code::LEAGUE_ERROR, "nope")
            .with_data(json!({"error_code": "E012", "error_description": "AUTH_TOKEN_INVALID"}));
        let client = McpClient::with_exchange(
            ScriptedExchange::new(vec![Ok(JsonRpcResponse::failure(json!(1), error.clone()))]),
            policy(),
        );
        let err = client
            .call("http://p", "report_match_result", json!({}), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(client.exchange().calls(), 1);
        assert_eq!(err.error_code(), Some(ErrorCode::AuthTokenInvalid));
        assert_eq!(err.to_rpc_error(), error);
    }

    #[tokio::test(start_paused = true)]
    async fn no_retry_makes_a_single_attempt() {
        let client = McpClient::with_exchange(
            ScriptedExchange::new(vec![Err(ExchangeError::Timeout)]),
            policy(),
        );
        let err = client
            .call_no_retry("http://p", "notify_match_result", json!({}), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(client.exchange().calls(), 1);
        assert_eq!(err.error_code(), Some(ErrorCode::Timeout));
        assert_eq!(err.to_rpc_error().code, rpc_code::LEAGUE_ERROR);
    }

    #[tokio::test]
    async fn request_ids_are_monotonic() {
        let client = McpClient::with_exchange(ScriptedExchange::new(vec![ok(json!(null))]), policy());
        for _ in 0..3 {
            client
                .call_no_retry("http://p", "ping", json!({}), Duration::from_secs(1))
                .await
                .unwrap();
        }
        let ids = client.exchange().sent_ids.lock().unwrap().clone();
        assert_eq!(ids, vec![json!(1), json!(2), json!(3)]);
    }

    async fn serve_router(router: Router) -> (String, tokio::task::JoinHandle<()>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        (format!("http://{addr}/mcp"), handle)
    }

    #[tokio::test]
    async fn http_exchange_round_trip() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            "/mcp",
            post(move |Json(request): Json<JsonRpcRequest>| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Json(JsonRpcResponse::success(
                        request.id,
                        json!({"echo": request.method}),
                    ))
                }
            }),
        );
        let (endpoint, handle) = serve_router(router).await;

        let client = McpClient::new(policy());
        let result = client
            .call(&endpoint, "league_query", json!({}), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(result, json!({"echo": "league_query"}));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        handle.abort();
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_connection_error() {
        let client = McpClient::new(RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(5),
            multiplier: 2.0,
        });
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let err = client
            .call(&format!("http://{addr}/mcp"), "ping", json!({}), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Connection { attempts: 2, .. }));
    }
}
