//! Browser session lifecycle.
//!
//! [`BrowserSession`] owns one Chromium process and the browser-level CDP
//! connection. Each scenario gets exactly one session and one isolated
//! [`BrowsingContext`] (the incognito-profile equivalent); both are released
//! on every exit path. The process is killed from `Drop` as the last line of
//! defense, so a fault mid-scenario cannot leak a browser.

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::cdp::CdpClient;
use crate::error::{HarnessError, HarnessResult};
use crate::page::Page;

/// Configuration for launching the browser process.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Explicit browser binary; `None` probes well-known names.
    pub browser_binary: Option<PathBuf>,

    /// Run without a visible window.
    pub headless: bool,

    /// Initial window size.
    pub window_size: (u32, u32),

    /// Extra process flags appended verbatim.
    pub extra_flags: Vec<String>,

    /// DevTools port (`None` = pick a free port).
    pub devtools_port: Option<u16>,

    /// How long to wait for the DevTools endpoint to come up.
    pub startup_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            browser_binary: None,
            headless: true,
            window_size: (1280, 720),
            extra_flags: vec!["--disable-dev-shm-usage".to_string()],
            devtools_port: None,
            startup_timeout: Duration::from_secs(30),
        }
    }
}

/// An owned Chromium process plus its browser-level CDP connection.
pub struct BrowserSession {
    child: Child,
    cdp: Arc<CdpClient>,
    port: u16,
    // Removed with the session; isolates cookies and storage on disk.
    _profile_dir: tempfile::TempDir,
}

impl BrowserSession {
    /// Launch a browser and connect to its DevTools endpoint.
    pub async fn launch(config: &SessionConfig) -> HarnessResult<Self> {
        let binary = match &config.browser_binary {
            Some(path) => path.clone(),
            None => find_browser()?,
        };
        let port = match config.devtools_port {
            Some(p) => p,
            None => find_free_port()?,
        };
        let profile_dir = tempfile::tempdir()?;

        info!(binary = %binary.display(), port, headless = config.headless, "launching browser");

        let mut cmd = Command::new(&binary);
        cmd.arg(format!("--remote-debugging-port={port}"))
            .arg(format!("--user-data-dir={}", profile_dir.path().display()))
            .arg(format!(
                "--window-size={},{}",
                config.window_size.0, config.window_size.1
            ))
            .arg("--no-first-run")
            .arg("--no-default-browser-check");
        if config.headless {
            cmd.arg("--headless=new");
        }
        for flag in &config.extra_flags {
            cmd.arg(flag);
        }
        cmd.stdout(Stdio::null()).stderr(Stdio::null());

        let child = cmd.spawn().map_err(|e| {
            HarnessError::SessionStartup(format!("failed to spawn {}: {e}", binary.display()))
        })?;

        let ws_url = match discover_ws_url(port, config.startup_timeout).await {
            Ok(url) => url,
            Err(e) => {
                // The process is already running; reap it before bailing.
                kill_browser(child);
                return Err(e);
            }
        };

        let cdp = match CdpClient::connect(&ws_url).await {
            Ok(client) => Arc::new(client),
            Err(e) => {
                kill_browser(child);
                return Err(e);
            }
        };

        info!(port, "browser session established");

        Ok(Self {
            child,
            cdp,
            port,
            _profile_dir: profile_dir,
        })
    }

    pub fn devtools_port(&self) -> u16 {
        self.port
    }

    /// Create an isolated browsing context within this session.
    pub async fn create_context(&self) -> HarnessResult<BrowsingContext> {
        let result = self
            .cdp
            .send("Target.createBrowserContext", json!({}))
            .await?;
        let id = result
            .get("browserContextId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                HarnessError::Protocol("createBrowserContext returned no id".to_string())
            })?
            .to_string();

        debug!(context = %id, "browsing context created");

        Ok(BrowsingContext {
            cdp: Arc::clone(&self.cdp),
            id,
            attached: HashMap::new(),
            order: Vec::new(),
        })
    }

    /// Tear the session down: ask the browser to close, then make sure the
    /// process is gone. Faults here are logged, never propagated, so they
    /// cannot overwrite a scenario's verdict.
    pub async fn shutdown(self) {
        if let Err(e) = self
            .cdp
            .send_timeout("Browser.close", json!({}), Duration::from_secs(2))
            .await
        {
            debug!(error = %e, "Browser.close failed, falling back to signals");
        }
        // Give the graceful path a moment before Drop signals the process.
        sleep(Duration::from_millis(200)).await;
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        kill_browser_in_place(&mut self.child);
    }
}

/// SIGTERM first, then SIGKILL, then reap.
fn kill_browser(mut child: Child) {
    kill_browser_in_place(&mut child);
}

fn kill_browser_in_place(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let pid = Pid::from_raw(child.id() as i32);
        if kill(pid, Signal::SIGTERM).is_ok() {
            std::thread::sleep(Duration::from_millis(300));
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

/// Poll `/json/version` until the browser exposes its WebSocket URL.
async fn discover_ws_url(port: u16, timeout: Duration) -> HarnessResult<String> {
    let version_url = format!("http://127.0.0.1:{port}/json/version");
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()?;

    let start = std::time::Instant::now();
    let mut attempts = 0;

    while start.elapsed() < timeout {
        attempts += 1;
        match client.get(&version_url).send().await {
            Ok(resp) if resp.status().is_success() => {
                let body: serde_json::Value = resp.json().await?;
                if let Some(url) = body.get("webSocketDebuggerUrl").and_then(|v| v.as_str()) {
                    return Ok(url.to_string());
                }
                warn!("/json/version missing webSocketDebuggerUrl");
            }
            Ok(resp) => warn!(status = %resp.status(), "DevTools endpoint returned error"),
            Err(e) => {
                if attempts == 1 {
                    debug!("waiting for DevTools endpoint...");
                }
                // Connection refused is expected while the browser starts.
                if !e.is_connect() {
                    warn!(error = %e, "DevTools discovery error");
                }
            }
        }
        sleep(Duration::from_millis(100)).await;
    }

    Err(HarnessError::DevtoolsDiscovery(attempts))
}

fn find_free_port() -> HarnessResult<u16> {
    use std::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

fn find_browser() -> HarnessResult<PathBuf> {
    let candidates: &[&str] = if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ]
    } else {
        &[
            "chromium",
            "chromium-browser",
            "google-chrome",
            "google-chrome-stable",
        ]
    };

    for candidate in candidates {
        let path = PathBuf::from(candidate);
        if path.is_absolute() {
            if path.exists() {
                return Ok(path);
            }
        } else if let Ok(output) = Command::new("which").arg(candidate).output() {
            if output.status.success() {
                return Ok(path);
            }
        }
    }

    Err(HarnessError::SessionStartup(
        "no Chromium/Chrome binary found; set SessionConfig::browser_binary".to_string(),
    ))
}

/// An isolated cookie/storage scope owning the pages created inside it.
///
/// Actions always resolve against the most recently created page in the
/// context: overlays and payment redirects can spawn a tab that supersedes
/// the original one. The page list is re-derived from the live target set on
/// every call rather than kept as a free-floating "last page" global.
pub struct BrowsingContext {
    cdp: Arc<CdpClient>,
    id: String,
    attached: HashMap<String, Arc<Page>>,
    order: Vec<String>,
}

impl BrowsingContext {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Open a fresh page (tab) in this context.
    pub async fn open_page(&mut self) -> HarnessResult<Arc<Page>> {
        let result = self
            .cdp
            .send(
                "Target.createTarget",
                json!({"url": "about:blank", "browserContextId": self.id}),
            )
            .await?;
        let target_id = result
            .get("targetId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| HarnessError::Protocol("createTarget returned no targetId".to_string()))?
            .to_string();

        self.attach(target_id).await
    }

    /// The page subsequent actions should target: the last page in this
    /// context's page list, refreshed from the live target set.
    pub async fn active_page(&mut self) -> HarnessResult<Arc<Page>> {
        let result = self.cdp.send("Target.getTargets", json!({})).await?;
        let infos = result
            .get("targetInfos")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        for info in &infos {
            let in_context = info.get("browserContextId").and_then(|v| v.as_str()) == Some(&self.id);
            let is_page = info.get("type").and_then(|v| v.as_str()) == Some("page");
            if !in_context || !is_page {
                continue;
            }
            let target_id = match info.get("targetId").and_then(|v| v.as_str()) {
                Some(id) => id.to_string(),
                None => continue,
            };
            if !self.order.contains(&target_id) {
                debug!(target = %target_id, "new page appeared in context");
                self.attach(target_id).await?;
            }
        }

        // Drop pages whose targets have gone away (closed overlays/tabs).
        self.order.retain(|id| {
            let alive = infos
                .iter()
                .any(|info| info.get("targetId").and_then(|v| v.as_str()) == Some(id));
            if !alive {
                self.attached.remove(id);
            }
            alive
        });

        let last = self
            .order
            .last()
            .ok_or_else(|| HarnessError::Protocol("context has no pages".to_string()))?;
        Ok(Arc::clone(&self.attached[last]))
    }

    async fn attach(&mut self, target_id: String) -> HarnessResult<Arc<Page>> {
        let result = self
            .cdp
            .send(
                "Target.attachToTarget",
                json!({"targetId": target_id, "flatten": true}),
            )
            .await?;
        let session_id = result
            .get("sessionId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                HarnessError::Protocol("attachToTarget returned no sessionId".to_string())
            })?
            .to_string();

        let page = Arc::new(
            Page::attach(Arc::clone(&self.cdp), target_id.clone(), session_id).await?,
        );
        self.attached.insert(target_id.clone(), Arc::clone(&page));
        self.order.push(target_id);
        Ok(page)
    }

    /// Dispose the context and every page in it.
    pub async fn dispose(self) -> HarnessResult<()> {
        self.cdp
            .send_timeout(
                "Target.disposeBrowserContext",
                json!({"browserContextId": self.id}),
                Duration::from_secs(5),
            )
            .await?;
        debug!(context = %self.id, "browsing context disposed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_free_port_in_range() {
        let port = find_free_port().unwrap();
        assert!(port > 1024);
    }

    #[test]
    fn test_default_config_matches_scripted_environment() {
        let config = SessionConfig::default();
        assert!(config.headless);
        assert_eq!(config.window_size, (1280, 720));
        assert!(config
            .extra_flags
            .iter()
            .any(|f| f == "--disable-dev-shm-usage"));
    }
}
