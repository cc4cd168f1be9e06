//! Declarative element references and live resolution.
//!
//! An [`ElementRef`] names an element the way the recorded journeys do: a
//! structural path from the document root (`html/body/div[3]/button`), an
//! optional text predicate, and an ordinal index for ambiguous paths.
//! References are descriptions, never handles: every action re-resolves
//! against the DOM as it is *now*, because the storefront re-renders
//! elements freely between steps. Ambiguity is settled positionally, by the
//! declared index in document order, never by ranking.

use std::fmt;
use std::time::Duration;

use serde_json::Value;

use crate::error::{HarnessError, HarnessResult};
use crate::page::{Page, POLL_INTERVAL};

/// One step of a structural path: a tag name and a 1-based sibling index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathStep {
    pub tag: String,
    pub index: u32,
}

/// Declarative, non-owning description of a target element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementRef {
    pub path: Vec<PathStep>,
    pub text: Option<String>,
    /// Zero-based ordinal among matches of the path + text predicate.
    pub nth: usize,
}

impl ElementRef {
    /// Parse a compact structural path such as
    /// `html/body/div[3]/div[2]/button[2]`. A segment without an index means
    /// the first sibling of that tag. Malformed indexes fall back to 1.
    pub fn path(path: &str) -> Self {
        let steps = path
            .split('/')
            .filter(|seg| !seg.is_empty())
            .map(|seg| match seg.split_once('[') {
                Some((tag, rest)) => PathStep {
                    tag: tag.to_string(),
                    index: rest
                        .trim_end_matches(']')
                        .parse()
                        .unwrap_or(1),
                },
                None => PathStep {
                    tag: seg.to_string(),
                    index: 1,
                },
            })
            .collect();

        Self {
            path: steps,
            text: None,
            nth: 0,
        }
    }

    /// Require the element's rendered text to contain `text`.
    pub fn with_text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    /// Select the `nth` (zero-based) match in document order.
    pub fn nth(mut self, nth: usize) -> Self {
        self.nth = nth;
        self
    }

    /// Render the structural path as an XPath expression.
    pub fn to_xpath(&self) -> String {
        let mut xpath = String::new();
        for step in &self.path {
            if !xpath.is_empty() {
                xpath.push('/');
            }
            xpath.push_str(&step.tag);
            if step.index > 1 {
                xpath.push_str(&format!("[{}]", step.index));
            }
        }
        xpath
    }

    /// JavaScript prelude that binds `el` to the current match, or leaves it
    /// undefined. Shared by the resolution and fill scripts.
    fn selection_js(&self) -> String {
        let xpath = js_string(&self.to_xpath());
        let filter = match &self.text {
            Some(text) => format!(
                "matches = matches.filter((m) => (m.innerText || m.textContent || '').includes({}));",
                js_string(text)
            ),
            None => String::new(),
        };
        format!(
            r#"const snap = document.evaluate({xpath}, document, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
let matches = [];
for (let i = 0; i < snap.snapshotLength; i++) matches.push(snap.snapshotItem(i));
{filter}
const el = matches[{nth}];"#,
            nth = self.nth,
        )
    }

    /// Script that locates the element and reports its geometry and
    /// visibility. Pure read of the current DOM unless `scroll` is set, in
    /// which case the element is scrolled into view first so the reported
    /// center is a valid click point.
    pub fn resolve_script(&self, scroll: bool) -> String {
        let scroll_js = if scroll {
            "el.scrollIntoView({block: 'center', inline: 'center'});"
        } else {
            ""
        };
        format!(
            r#"(() => {{
{selection}
if (!el) return {{found: false, matched: matches.length}};
{scroll_js}
const rect = el.getBoundingClientRect();
const style = window.getComputedStyle(el);
const visible = rect.width > 0 && rect.height > 0 &&
    style.visibility !== 'hidden' && style.display !== 'none';
return {{found: true, matched: matches.length,
    x: rect.x + rect.width / 2, y: rect.y + rect.height / 2, visible}};
}})()"#,
            selection = self.selection_js(),
        )
    }

    /// Script that overwrites the element's value with `payload`, including
    /// the empty string (an explicit clear). Uses the native value setter so
    /// framework-controlled inputs observe the change, then fires `input`
    /// and `change`.
    pub fn fill_script(&self, payload: &str) -> String {
        format!(
            r#"(() => {{
{selection}
if (!el) return {{found: false}};
el.focus();
const value = {value};
if (el instanceof HTMLInputElement || el instanceof HTMLTextAreaElement) {{
    const proto = el instanceof HTMLTextAreaElement
        ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype;
    Object.getOwnPropertyDescriptor(proto, 'value').set.call(el, value);
}} else if (el.isContentEditable) {{
    el.textContent = value;
}} else {{
    return {{found: true, filled: false}};
}}
el.dispatchEvent(new Event('input', {{bubbles: true}}));
el.dispatchEvent(new Event('change', {{bubbles: true}}));
return {{found: true, filled: true}};
}})()"#,
            selection = self.selection_js(),
            value = js_string(payload),
        )
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_xpath())?;
        if let Some(text) = &self.text {
            write!(f, " containing {text:?}")?;
        }
        if self.nth > 0 {
            write!(f, " (match {})", self.nth)?;
        }
        Ok(())
    }
}

/// A snapshot of a resolved element, valid only for the action it was
/// resolved for.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedElement {
    /// Center point in page coordinates.
    pub x: f64,
    pub y: f64,
    pub visible: bool,
    /// How many elements matched the reference.
    pub matched: usize,
}

/// Resolve a reference against the live DOM, re-querying until it matches or
/// the timeout elapses. Never caches: two calls against the same reference
/// can return different elements if the page re-rendered in between.
pub async fn resolve(
    page: &Page,
    target: &ElementRef,
    timeout: Duration,
    scroll: bool,
) -> HarnessResult<ResolvedElement> {
    let script = target.resolve_script(scroll);
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        if let Some(element) = try_resolve(page, &script).await? {
            return Ok(element);
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(HarnessError::ElementNotFound {
                target: target.to_string(),
                timeout,
            });
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

async fn try_resolve(page: &Page, script: &str) -> HarnessResult<Option<ResolvedElement>> {
    let value = page.evaluate(script).await?;
    Ok(parse_resolution(&value))
}

/// Parse the resolution script's return value.
pub fn parse_resolution(value: &Value) -> Option<ResolvedElement> {
    if value.get("found")?.as_bool()? {
        Some(ResolvedElement {
            x: value.get("x")?.as_f64()?,
            y: value.get("y")?.as_f64()?,
            visible: value.get("visible").and_then(|v| v.as_bool()).unwrap_or(false),
            matched: value.get("matched").and_then(|v| v.as_u64()).unwrap_or(0) as usize,
        })
    } else {
        None
    }
}

fn js_string(s: &str) -> String {
    // serde_json string escaping is valid JS string literal escaping.
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    #[test_case("html/body/div[3]/button", "html/body/div[3]/button"; "explicit index kept")]
    #[test_case("html/body/div/button[2]", "html/body/div/button[2]"; "trailing index kept")]
    #[test_case("html/body/div[1]", "html/body/div"; "index one elided")]
    #[test_case("", ""; "empty path")]
    fn test_to_xpath(input: &str, expected: &str) {
        assert_eq!(ElementRef::path(input).to_xpath(), expected);
    }

    #[test]
    fn test_path_parsing() {
        let target = ElementRef::path("html/body/div[3]/div[2]/button");
        assert_eq!(target.path.len(), 5);
        assert_eq!(target.path[2], PathStep { tag: "div".to_string(), index: 3 });
        assert_eq!(target.path[4], PathStep { tag: "button".to_string(), index: 1 });
    }

    #[test]
    fn test_malformed_index_falls_back_to_first() {
        let target = ElementRef::path("html/body/div[x]");
        assert_eq!(target.path[2].index, 1);
    }

    #[test]
    fn test_ordinal_is_embedded_in_script() {
        let target = ElementRef::path("html/body/div/button").nth(1);
        let script = target.resolve_script(false);
        assert!(script.contains("matches[1]"));
    }

    #[test]
    fn test_ordinal_default_is_first_match() {
        let target = ElementRef::path("html/body/div/button");
        assert!(target.resolve_script(false).contains("matches[0]"));
    }

    #[test]
    fn test_text_predicate_is_escaped() {
        let target = ElementRef::path("html/body/a").with_text("Sign \"in\"");
        let script = target.resolve_script(false);
        assert!(script.contains(r#"includes("Sign \"in\"")"#));
    }

    #[test]
    fn test_resolve_script_without_scroll_is_pure() {
        let script = ElementRef::path("html/body/button").resolve_script(false);
        assert!(!script.contains("scrollIntoView"));
    }

    #[test]
    fn test_resolve_script_with_scroll() {
        let script = ElementRef::path("html/body/button").resolve_script(true);
        assert!(script.contains("scrollIntoView"));
    }

    #[test]
    fn test_fill_script_empty_payload_is_explicit_clear() {
        let script = ElementRef::path("html/body/input").fill_script("");
        // The empty string must be written, not skipped.
        assert!(script.contains(r#"const value = "";"#));
        assert!(script.contains("set.call(el, value)"));
        assert!(script.contains("new Event('input'"));
    }

    #[test]
    fn test_fill_script_escapes_payload() {
        let script = ElementRef::path("html/body/input").fill_script("O'Brien \"test\"");
        assert!(script.contains(r#""O'Brien \"test\"""#));
    }

    #[test]
    fn test_parse_resolution_found() {
        let value = json!({"found": true, "matched": 3, "x": 100.5, "y": 40.0, "visible": true});
        let element = parse_resolution(&value).unwrap();
        assert_eq!(element.matched, 3);
        assert!((element.x - 100.5).abs() < f64::EPSILON);
        assert!(element.visible);
    }

    #[test]
    fn test_parse_resolution_not_found() {
        let value = json!({"found": false, "matched": 0});
        assert!(parse_resolution(&value).is_none());
    }

    #[test]
    fn test_display_names_path_text_and_ordinal() {
        let target = ElementRef::path("html/body/div[2]/a")
            .with_text("Open cart")
            .nth(2);
        let shown = target.to_string();
        assert!(shown.contains("html/body/div[2]/a"));
        assert!(shown.contains("Open cart"));
        assert!(shown.contains("match 2"));
    }
}
