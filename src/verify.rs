//! End-state verification.
//!
//! After a journey's steps complete, each [`AssertionSpec`] is checked in
//! declared order against the active page, polling up to its own timeout.
//! The first unmet assertion fails the scenario and names itself; later
//! assertions are never evaluated, so the diagnostic always points at the
//! earliest break in the journey's narrative.

use async_trait::async_trait;
use tracing::debug;

use crate::error::{HarnessError, HarnessResult};
use crate::page::{Page, POLL_INTERVAL};
use crate::scenario::AssertionSpec;

/// The verifier's view of a page: can a piece of text be seen right now?
///
/// [`Page`] implements this over the live DOM; tests substitute an in-memory
/// probe.
#[async_trait]
pub trait TextProbe {
    async fn text_visible(&self, text: &str) -> HarnessResult<bool>;
}

#[async_trait]
impl TextProbe for Page {
    async fn text_visible(&self, text: &str) -> HarnessResult<bool> {
        let value = self.evaluate(&visibility_script(text)).await?;
        Ok(value.as_bool().unwrap_or(false))
    }
}

/// Script that reports whether any visible element renders `needle`.
///
/// Matches against an element's combined `innerText`, not individual text
/// nodes: interpolating frameworks split one rendered string across several
/// siblings ("Redwine soap", " × ", "1"), and the needle must still match.
/// The check lands on the innermost element containing the needle so the
/// visibility judgment applies to the text's actual container, not an
/// ancestor. Visibility is judged at the moment of evaluation; detached,
/// hidden, and zero-size containers do not count.
pub fn visibility_script(needle: &str) -> String {
    let needle = serde_json::to_string(needle).unwrap_or_else(|_| "\"\"".to_string());
    format!(
        r#"(() => {{
const needle = {needle};
if (!document.body) return false;
const rendered = (el) => el.innerText || el.textContent || '';
const candidates = [document.body, ...document.body.querySelectorAll('*')];
for (const el of candidates) {{
    if (!rendered(el).includes(needle)) continue;
    // Innermost match only: a child containing the needle will be visited
    // on its own.
    if ([...el.children].some((c) => rendered(c).includes(needle))) continue;
    const rect = el.getBoundingClientRect();
    const style = window.getComputedStyle(el);
    if (rect.width > 0 && rect.height > 0 &&
        style.visibility !== 'hidden' && style.display !== 'none') return true;
}}
return false;
}})()"#
    )
}

/// Check every assertion in order, failing fast on the first unmet one.
pub async fn verify_all<P: TextProbe + Sync>(
    probe: &P,
    assertions: &[AssertionSpec],
) -> HarnessResult<()> {
    for (index, spec) in assertions.iter().enumerate() {
        verify_one(probe, index, spec).await?;
        debug!(index, expectation = %spec, "assertion met");
    }
    Ok(())
}

async fn verify_one<P: TextProbe + Sync>(
    probe: &P,
    index: usize,
    spec: &AssertionSpec,
) -> HarnessResult<()> {
    let deadline = tokio::time::Instant::now() + spec.timeout;

    loop {
        if probe.text_visible(&spec.text).await? == spec.visible {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(HarnessError::AssertionUnmet {
                index,
                expectation: spec.to_string(),
            });
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
