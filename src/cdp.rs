//! Chrome DevTools Protocol transport.
//!
//! A single browser-level WebSocket carries every command in flat session
//! mode: page-scoped commands are routed with a `sessionId` field and
//! responses are correlated back to callers by auto-incremented command id.
//! Events fan out over a broadcast channel so that page trackers and load
//! waiters can subscribe independently.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::{HarnessError, HarnessResult};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Default per-command response timeout.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Capacity of the event fan-out channel. Lagging subscribers drop old
/// events rather than stalling the reader.
const EVENT_CHANNEL_CAPACITY: usize = 512;

/// An event pushed by the browser.
#[derive(Debug, Clone)]
pub struct CdpEvent {
    /// Event method, e.g. `Page.lifecycleEvent`.
    pub method: String,
    /// Session the event belongs to; `None` for browser-level events.
    pub session_id: Option<String>,
    pub params: Value,
}

#[derive(Debug, serde::Serialize)]
struct CdpCommand<'a> {
    id: u64,
    method: &'a str,
    params: Value,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
}

/// A correlated response to a command.
#[derive(Debug, Clone)]
pub struct CdpResponse {
    pub id: u64,
    pub result: Option<Value>,
    pub error: Option<CdpResponseError>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct CdpResponseError {
    pub code: i64,
    pub message: String,
}

/// Browser-level WebSocket client.
///
/// Cloned freely behind an [`Arc`]; one background task owns the read half
/// and dispatches responses and events.
pub struct CdpClient {
    next_id: AtomicU64,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<CdpResponse>>>>,
    writer: Mutex<WsSink>,
    events: broadcast::Sender<CdpEvent>,
    _reader: tokio::task::JoinHandle<()>,
}

impl CdpClient {
    /// Connect to the browser's DevTools WebSocket endpoint
    /// (`webSocketDebuggerUrl` from `/json/version`).
    pub async fn connect(ws_url: &str) -> HarnessResult<Self> {
        tracing::debug!(url = ws_url, "connecting to DevTools WebSocket");

        let (stream, _) = tokio_tungstenite::connect_async(ws_url)
            .await
            .map_err(|e| HarnessError::Connection {
                url: ws_url.to_string(),
                reason: e.to_string(),
            })?;

        let (writer, reader) = stream.split();
        let pending: Arc<Mutex<HashMap<u64, oneshot::Sender<CdpResponse>>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let reader_handle = tokio::spawn(Self::read_loop(
            reader,
            Arc::clone(&pending),
            event_tx.clone(),
        ));

        Ok(Self {
            next_id: AtomicU64::new(1),
            pending,
            writer: Mutex::new(writer),
            events: event_tx,
            _reader: reader_handle,
        })
    }

    /// Send a browser-level command and wait for its result.
    pub async fn send(&self, method: &str, params: Value) -> HarnessResult<Value> {
        self.send_inner(method, params, None, COMMAND_TIMEOUT).await
    }

    /// Browser-level send with a caller-chosen response timeout.
    pub async fn send_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> HarnessResult<Value> {
        self.send_inner(method, params, None, timeout).await
    }

    /// Send a command scoped to an attached target session.
    pub async fn send_session(
        &self,
        session_id: &str,
        method: &str,
        params: Value,
    ) -> HarnessResult<Value> {
        self.send_inner(method, params, Some(session_id), COMMAND_TIMEOUT)
            .await
    }

    /// Session-scoped send with a caller-chosen response timeout.
    pub async fn send_session_timeout(
        &self,
        session_id: &str,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> HarnessResult<Value> {
        self.send_inner(method, params, Some(session_id), timeout).await
    }

    /// Subscribe to the event stream. Each subscriber sees every event
    /// published after the call.
    pub fn subscribe(&self) -> broadcast::Receiver<CdpEvent> {
        self.events.subscribe()
    }

    async fn send_inner(
        &self,
        method: &str,
        params: Value,
        session_id: Option<&str>,
        timeout: Duration,
    ) -> HarnessResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let cmd = CdpCommand {
            id,
            method,
            params,
            session_id,
        };
        let json = serde_json::to_string(&cmd)?;

        tracing::trace!(id, method, session = ?session_id, "sending CDP command");

        // Register before sending so the response cannot race the insert.
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(id, tx);
        }

        {
            let mut writer = self.writer.lock().await;
            writer
                .send(Message::Text(json))
                .await
                .map_err(|e| HarnessError::Protocol(format!("WebSocket send failed: {e}")))?;
        }

        let response = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(_)) => {
                return Err(HarnessError::Protocol(
                    "response channel closed unexpectedly".to_string(),
                ))
            }
            Err(_) => {
                self.pending.lock().await.remove(&id);
                return Err(HarnessError::CommandTimeout {
                    method: method.to_string(),
                    timeout,
                });
            }
        };

        if let Some(err) = response.error {
            return Err(HarnessError::Cdp {
                code: err.code,
                message: err.message,
            });
        }

        Ok(response.result.unwrap_or(Value::Null))
    }

    async fn read_loop(
        mut reader: WsSource,
        pending: Arc<Mutex<HashMap<u64, oneshot::Sender<CdpResponse>>>>,
        events: broadcast::Sender<CdpEvent>,
    ) {
        while let Some(msg) = reader.next().await {
            let text = match msg {
                Ok(Message::Text(t)) => t,
                Ok(Message::Close(_)) => {
                    tracing::debug!("DevTools WebSocket closed by browser");
                    break;
                }
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "WebSocket read error, stopping reader");
                    break;
                }
            };

            let json: Value = match serde_json::from_str(&text) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(error = %e, "unparseable CDP message");
                    continue;
                }
            };

            if let Some(response) = parse_response(&json) {
                let mut pending = pending.lock().await;
                if let Some(tx) = pending.remove(&response.id) {
                    let _ = tx.send(response);
                }
            } else if let Some(event) = parse_event(&json) {
                // No subscribers is fine; the event is simply dropped.
                let _ = events.send(event);
            }
        }

        // Fail any callers still waiting when the connection drops.
        let mut pending = pending.lock().await;
        for (id, tx) in pending.drain() {
            let _ = tx.send(CdpResponse {
                id,
                result: None,
                error: Some(CdpResponseError {
                    code: -1,
                    message: "WebSocket connection closed".to_string(),
                }),
            });
        }
    }
}

/// Parse a CDP message as a command response (a message with an `id`).
pub fn parse_response(json: &Value) -> Option<CdpResponse> {
    let id = json.get("id")?.as_u64()?;
    Some(CdpResponse {
        id,
        result: json.get("result").cloned(),
        error: json
            .get("error")
            .and_then(|e| serde_json::from_value(e.clone()).ok()),
    })
}

/// Parse a CDP message as an event (a `method` without an `id`).
pub fn parse_event(json: &Value) -> Option<CdpEvent> {
    if json.get("id").is_some() {
        return None;
    }
    Some(CdpEvent {
        method: json.get("method")?.as_str()?.to_string(),
        session_id: json
            .get("sessionId")
            .and_then(|s| s.as_str())
            .map(String::from),
        params: json.get("params").cloned().unwrap_or(Value::Null),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_serialization_browser_scope() {
        let cmd = CdpCommand {
            id: 7,
            method: "Target.createBrowserContext",
            params: serde_json::json!({}),
            session_id: None,
        };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["method"], "Target.createBrowserContext");
        assert!(json.get("sessionId").is_none());
    }

    #[test]
    fn test_command_serialization_session_scope() {
        let cmd = CdpCommand {
            id: 8,
            method: "Page.navigate",
            params: serde_json::json!({"url": "http://localhost:8080"}),
            session_id: Some("SESSION1"),
        };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["sessionId"], "SESSION1");
        assert_eq!(json["params"]["url"], "http://localhost:8080");
    }

    #[test]
    fn test_parse_response_success() {
        let json = serde_json::json!({
            "id": 1,
            "result": {"browserContextId": "CTX"}
        });
        let resp = parse_response(&json).unwrap();
        assert_eq!(resp.id, 1);
        assert!(resp.error.is_none());
        assert_eq!(resp.result.unwrap()["browserContextId"], "CTX");
    }

    #[test]
    fn test_parse_response_error() {
        let json = serde_json::json!({
            "id": 2,
            "error": {"code": -32000, "message": "Target closed"}
        });
        let resp = parse_response(&json).unwrap();
        let err = resp.error.unwrap();
        assert_eq!(err.code, -32000);
        assert_eq!(err.message, "Target closed");
    }

    #[test]
    fn test_parse_event_with_session() {
        let json = serde_json::json!({
            "method": "Page.lifecycleEvent",
            "sessionId": "S1",
            "params": {"frameId": "F1", "name": "DOMContentLoaded"}
        });
        let event = parse_event(&json).unwrap();
        assert_eq!(event.method, "Page.lifecycleEvent");
        assert_eq!(event.session_id.as_deref(), Some("S1"));
        assert_eq!(event.params["frameId"], "F1");
    }

    #[test]
    fn test_parse_event_rejects_response() {
        let json = serde_json::json!({
            "id": 3,
            "method": "Page.navigate",
            "result": {}
        });
        assert!(parse_event(&json).is_none());
    }

    #[test]
    fn test_parse_event_browser_scope() {
        let json = serde_json::json!({
            "method": "Target.targetCreated",
            "params": {"targetInfo": {"targetId": "T1", "type": "page"}}
        });
        let event = parse_event(&json).unwrap();
        assert!(event.session_id.is_none());
    }
}
