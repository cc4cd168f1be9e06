//! Page handles and frame readiness tracking.
//!
//! A [`Page`] is one attached target (tab) inside a browsing context. All
//! page-scoped CDP traffic is routed through its flat-mode session id. A
//! background listener records per-frame lifecycle milestones so readiness
//! waits can be answered without re-asking the browser.
//!
//! Readiness is deliberately a typed outcome, not an error: storefront pages
//! embed decorative frames (payment widgets, analytics pixels) whose load
//! signals are advisory. A frame that never reports ready is skipped, and
//! the scenario moves on.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, trace};

use crate::cdp::CdpClient;
use crate::error::{HarnessError, HarnessResult};

/// How often bounded waits re-check their condition.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Outcome of a best-effort readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    TimedOut,
}

impl Readiness {
    pub fn is_ready(self) -> bool {
        matches!(self, Readiness::Ready)
    }
}

/// A frame attached to a page, as reported by `Page.getFrameTree`.
#[derive(Debug, Clone)]
pub struct FrameInfo {
    pub id: String,
    pub url: String,
}

/// One attached page target.
pub struct Page {
    cdp: Arc<CdpClient>,
    target_id: String,
    session_id: String,
    ready_frames: Arc<Mutex<HashSet<String>>>,
    load_fired: Arc<AtomicBool>,
    listener: tokio::task::JoinHandle<()>,
}

impl Page {
    /// Wrap an attached target: enable the Page and Runtime domains, turn on
    /// lifecycle events, and start the milestone listener.
    pub(crate) async fn attach(
        cdp: Arc<CdpClient>,
        target_id: String,
        session_id: String,
    ) -> HarnessResult<Self> {
        cdp.send_session(&session_id, "Page.enable", json!({})).await?;
        cdp.send_session(&session_id, "Runtime.enable", json!({})).await?;
        cdp.send_session(
            &session_id,
            "Page.setLifecycleEventsEnabled",
            json!({"enabled": true}),
        )
        .await?;

        let ready_frames = Arc::new(Mutex::new(HashSet::new()));
        let load_fired = Arc::new(AtomicBool::new(false));

        let listener = tokio::spawn(milestone_listener(
            cdp.subscribe(),
            session_id.clone(),
            Arc::clone(&ready_frames),
            Arc::clone(&load_fired),
        ));

        debug!(target = %target_id, "page attached");

        Ok(Self {
            cdp,
            target_id,
            session_id,
            ready_frames,
            load_fired,
            listener,
        })
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    /// Navigate and wait only for the navigation to *commit* (the request is
    /// accepted). Rendering completion is [`Page::wait_for_load`].
    pub async fn navigate(&self, url: &str, timeout: Duration) -> HarnessResult<()> {
        self.load_fired.store(false, Ordering::SeqCst);
        self.ready_frames
            .lock()
            .expect("milestone set poisoned")
            .clear();

        let result = self
            .cdp
            .send_session_timeout(
                &self.session_id,
                "Page.navigate",
                json!({"url": url}),
                timeout,
            )
            .await
            .map_err(|e| match e {
                HarnessError::CommandTimeout { .. } => HarnessError::NavigationTimeout {
                    url: url.to_string(),
                    timeout,
                },
                other => other,
            })?;

        if let Some(error_text) = result.get("errorText").and_then(|v| v.as_str()) {
            return Err(HarnessError::NavigationFailed {
                url: url.to_string(),
                reason: error_text.to_string(),
            });
        }

        Ok(())
    }

    /// Evaluate a JavaScript expression in the page, returning its value.
    pub async fn evaluate(&self, expression: &str) -> HarnessResult<Value> {
        let result = self
            .cdp
            .send_session(
                &self.session_id,
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;

        if let Some(exception) = result.get("exceptionDetails") {
            let message = exception
                .get("exception")
                .and_then(|e| e.get("description"))
                .and_then(|d| d.as_str())
                .or_else(|| exception.get("text").and_then(|t| t.as_str()))
                .unwrap_or("unknown exception")
                .to_string();
            return Err(HarnessError::Script(message));
        }

        Ok(result
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Dispatch a left-button press/release pair at page coordinates.
    pub async fn click_at(&self, x: f64, y: f64) -> HarnessResult<()> {
        for event_type in ["mousePressed", "mouseReleased"] {
            self.cdp
                .send_session(
                    &self.session_id,
                    "Input.dispatchMouseEvent",
                    json!({
                        "type": event_type,
                        "x": x,
                        "y": y,
                        "button": "left",
                        "clickCount": 1,
                    }),
                )
                .await?;
        }
        Ok(())
    }

    /// All frames currently attached to this page, main frame first.
    pub async fn frames(&self) -> HarnessResult<Vec<FrameInfo>> {
        let result = self
            .cdp
            .send_session(&self.session_id, "Page.getFrameTree", json!({}))
            .await?;
        let root = result
            .get("frameTree")
            .ok_or_else(|| HarnessError::Protocol("getFrameTree returned no tree".to_string()))?;

        let mut frames = Vec::new();
        collect_frames(root, &mut frames);
        Ok(frames)
    }

    /// Best-effort wait for the page's load milestone.
    pub async fn wait_for_load(&self, timeout: Duration) -> Readiness {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if self.load_fired.load(Ordering::SeqCst) {
                return Readiness::Ready;
            }
            // The load event may have fired before this page attached;
            // readyState covers that case.
            if let Ok(Value::String(state)) = self.evaluate("document.readyState").await {
                if state != "loading" {
                    return Readiness::Ready;
                }
            }
            if tokio::time::Instant::now() >= deadline {
                debug!(target = %self.target_id, "load milestone not reached, continuing");
                return Readiness::TimedOut;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Best-effort wait for one frame's DOMContentLoaded milestone.
    pub async fn wait_for_frame(&self, frame: &FrameInfo, timeout: Duration) -> Readiness {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            {
                let ready = self.ready_frames.lock().expect("milestone set poisoned");
                if ready.contains(&frame.id) {
                    return Readiness::Ready;
                }
            }
            if self.load_fired.load(Ordering::SeqCst) {
                // The whole page finished loading; its frames are as ready
                // as they will ever be.
                return Readiness::Ready;
            }
            if tokio::time::Instant::now() >= deadline {
                debug!(frame = %frame.id, url = %frame.url, "frame readiness timed out, skipping");
                return Readiness::TimedOut;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

impl Drop for Page {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

fn collect_frames(tree: &Value, out: &mut Vec<FrameInfo>) {
    if let Some(frame) = tree.get("frame") {
        let id = frame.get("id").and_then(|v| v.as_str()).unwrap_or_default();
        let url = frame.get("url").and_then(|v| v.as_str()).unwrap_or_default();
        if !id.is_empty() {
            out.push(FrameInfo {
                id: id.to_string(),
                url: url.to_string(),
            });
        }
    }
    if let Some(children) = tree.get("childFrames").and_then(|v| v.as_array()) {
        for child in children {
            collect_frames(child, out);
        }
    }
}

/// Records load milestones for one page session into shared state.
async fn milestone_listener(
    mut events: tokio::sync::broadcast::Receiver<crate::cdp::CdpEvent>,
    session_id: String,
    ready_frames: Arc<Mutex<HashSet<String>>>,
    load_fired: Arc<AtomicBool>,
) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                trace!(skipped, "milestone listener lagged");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        if event.session_id.as_deref() != Some(&session_id) {
            continue;
        }

        match event.method.as_str() {
            "Page.lifecycleEvent" => {
                let name = event.params.get("name").and_then(|v| v.as_str());
                if matches!(name, Some("DOMContentLoaded") | Some("load")) {
                    if let Some(frame_id) = event.params.get("frameId").and_then(|v| v.as_str()) {
                        ready_frames
                            .lock()
                            .expect("milestone set poisoned")
                            .insert(frame_id.to_string());
                    }
                }
            }
            "Page.loadEventFired" | "Page.domContentEventFired" => {
                load_fired.store(true, Ordering::SeqCst);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readiness_is_ready() {
        assert!(Readiness::Ready.is_ready());
        assert!(!Readiness::TimedOut.is_ready());
    }

    #[test]
    fn test_collect_frames_flattens_tree() {
        let tree = json!({
            "frame": {"id": "MAIN", "url": "http://localhost:8080/"},
            "childFrames": [
                {
                    "frame": {"id": "PAY", "url": "https://checkout.razorpay.com/widget"},
                    "childFrames": [
                        {"frame": {"id": "PAY_INNER", "url": "about:blank"}}
                    ]
                },
                {"frame": {"id": "ADS", "url": "about:blank"}}
            ]
        });

        let mut frames = Vec::new();
        collect_frames(&tree, &mut frames);

        let ids: Vec<&str> = frames.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["MAIN", "PAY", "PAY_INNER", "ADS"]);
        assert_eq!(frames[1].url, "https://checkout.razorpay.com/widget");
    }

    #[test]
    fn test_collect_frames_skips_malformed_nodes() {
        let tree = json!({
            "frame": {"url": "no-id-here"},
            "childFrames": [
                {"frame": {"id": "OK", "url": ""}}
            ]
        });

        let mut frames = Vec::new();
        collect_frames(&tree, &mut frames);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].id, "OK");
    }
}
