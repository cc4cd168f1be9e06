//! Timed interaction primitives.
//!
//! Every action re-resolves its target against the live DOM, waits a fixed
//! settle delay first, and gives up with a typed error when its bounded
//! timeout elapses. The settle delay absorbs the storefront's animations and
//! debounced re-renders; it is part of the executor's contract, not an
//! optimization, because interacting mid-transition changes outcomes.

use std::time::Duration;

use tracing::{debug, trace};

use crate::error::{HarnessError, HarnessResult};
use crate::locator::{resolve, ElementRef};
use crate::page::{Page, Readiness, POLL_INTERVAL};

/// Timing knobs for the executor. Defaults mirror the recorded journeys:
/// 3 s settle before interactions, 5 s per action, 10 s navigation commit,
/// 3 s best-effort load waits.
#[derive(Debug, Clone)]
pub struct ActionConfig {
    /// Fixed pause inserted before click/fill to let the UI settle.
    pub settle: Duration,
    /// Default bound for element resolution and interactability.
    pub action_timeout: Duration,
    /// Bound for a navigation to commit.
    pub nav_timeout: Duration,
    /// Bound for best-effort load/readiness milestones.
    pub load_timeout: Duration,
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(3),
            action_timeout: Duration::from_secs(5),
            nav_timeout: Duration::from_secs(10),
            load_timeout: Duration::from_secs(3),
        }
    }
}

/// Executes single user actions against a page.
pub struct ActionExecutor {
    config: ActionConfig,
}

impl ActionExecutor {
    pub fn new(config: ActionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ActionConfig {
        &self.config
    }

    /// Click the center of the referenced element. Fails with
    /// [`HarnessError::ElementNotFound`] when nothing matches within the
    /// timeout, or [`HarnessError::ActionTimeout`] when a match exists but
    /// never becomes visible.
    pub async fn click(
        &self,
        page: &Page,
        target: &ElementRef,
        timeout: Option<Duration>,
    ) -> HarnessResult<()> {
        let timeout = timeout.unwrap_or(self.config.action_timeout);
        self.settle().await;

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline
                .saturating_duration_since(tokio::time::Instant::now())
                .max(POLL_INTERVAL);
            let element = resolve(page, target, remaining, true).await?;

            if element.visible {
                trace!(target = %target, x = element.x, y = element.y, "clicking");
                return page.click_at(element.x, element.y).await;
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(HarnessError::ActionTimeout {
                    target: target.to_string(),
                    reason: "element never became visible".to_string(),
                    timeout,
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Overwrite the referenced element's value with `payload`. The empty
    /// string clears the field; the write always replaces, never appends.
    pub async fn fill(
        &self,
        page: &Page,
        target: &ElementRef,
        payload: &str,
        timeout: Option<Duration>,
    ) -> HarnessResult<()> {
        let timeout = timeout.unwrap_or(self.config.action_timeout);
        self.settle().await;

        let script = target.fill_script(payload);
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let result = page.evaluate(&script).await?;
            let found = result.get("found").and_then(|v| v.as_bool()).unwrap_or(false);
            let filled = result.get("filled").and_then(|v| v.as_bool()).unwrap_or(false);

            if found && filled {
                trace!(target = %target, len = payload.len(), "filled");
                return Ok(());
            }
            // A found-but-uneditable match is retried too: mid-render the
            // path can land on a placeholder that the real input replaces.
            if tokio::time::Instant::now() >= deadline {
                return Err(fill_expired_error(target, found, timeout));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Navigate the page; returns once the navigation commits.
    pub async fn navigate(&self, page: &Page, url: &str) -> HarnessResult<()> {
        debug!(url, "navigating");
        page.navigate(url, self.config.nav_timeout).await
    }

    /// Best-effort wait for the load milestone; a timeout is reported, not
    /// raised.
    pub async fn wait_for_load(&self, page: &Page, timeout: Option<Duration>) -> Readiness {
        page.wait_for_load(timeout.unwrap_or(self.config.load_timeout))
            .await
    }

    /// Suspend the scenario for a fixed duration.
    pub async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    async fn settle(&self) {
        if !self.config.settle.is_zero() {
            tokio::time::sleep(self.config.settle).await;
        }
    }
}

/// Error for a fill whose deadline expired: a match that never became
/// editable is an actionability failure, no match at all is a lookup
/// failure.
fn fill_expired_error(target: &ElementRef, found: bool, timeout: Duration) -> HarnessError {
    if found {
        HarnessError::ActionTimeout {
            target: target.to_string(),
            reason: "element accepts no text input".to_string(),
            timeout,
        }
    } else {
        HarnessError::ElementNotFound {
            target: target.to_string(),
            timeout,
        }
    }
}
