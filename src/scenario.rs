//! Scenario data model.
//!
//! A scenario is one scripted user journey: an ordered step list followed by
//! an ordered assertion list. Order is a correctness invariant — a step
//! assumes the side effects of every step before it (an item must be in the
//! cart before "open cart" means anything), and assertions are checked in
//! the order the journey's narrative demands.

use std::fmt;
use std::time::Duration;

use crate::locator::ElementRef;

/// Default bound for a content assertion.
const DEFAULT_ASSERT_TIMEOUT: Duration = Duration::from_secs(30);

/// One scripted user journey.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    pub description: String,
    pub steps: Vec<ScenarioStep>,
    pub assertions: Vec<AssertionSpec>,
}

impl Scenario {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            steps: Vec::new(),
            assertions: Vec::new(),
        }
    }

    pub fn step(mut self, step: ScenarioStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn assert(mut self, assertion: AssertionSpec) -> Self {
        self.assertions.push(assertion);
        self
    }
}

/// One atomic instruction in a journey.
#[derive(Debug, Clone)]
pub enum ScenarioStep {
    /// Load a URL; paths are resolved against the configured base URL.
    Navigate { url: String },

    /// Pointer-activate the referenced element.
    Click {
        target: ElementRef,
        timeout: Option<Duration>,
    },

    /// Replace the referenced element's value (empty string clears).
    Fill {
        target: ElementRef,
        value: String,
        timeout: Option<Duration>,
    },

    /// Best-effort wait for the load milestone; never fatal.
    WaitForLoad { timeout: Option<Duration> },

    /// Fixed pause.
    Sleep { duration: Duration },
}

impl ScenarioStep {
    /// Short label used in verdict diagnostics.
    pub fn label(&self) -> String {
        match self {
            ScenarioStep::Navigate { url } => format!("navigate {url}"),
            ScenarioStep::Click { target, .. } => format!("click {target}"),
            ScenarioStep::Fill { target, value, .. } => {
                if value.is_empty() {
                    format!("clear {target}")
                } else {
                    format!("fill {target}")
                }
            }
            ScenarioStep::WaitForLoad { .. } => "wait for load".to_string(),
            ScenarioStep::Sleep { duration } => format!("sleep {}ms", duration.as_millis()),
        }
    }
}

/// An expected end state: a piece of content that must (or must not) be
/// visible once the journey's steps have run.
#[derive(Debug, Clone)]
pub struct AssertionSpec {
    pub text: String,
    pub visible: bool,
    pub timeout: Duration,
}

impl AssertionSpec {
    /// Expect `text` to be visible somewhere on the active page.
    pub fn visible_text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            visible: true,
            timeout: DEFAULT_ASSERT_TIMEOUT,
        }
    }

    /// Expect `text` to be absent or hidden.
    pub fn hidden_text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            visible: false,
            timeout: DEFAULT_ASSERT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl fmt::Display for AssertionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.visible {
            write!(f, "visible text {:?}", self.text)
        } else {
            write!(f, "no visible text {:?}", self.text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::ElementRef;

    #[test]
    fn test_step_labels() {
        let click = ScenarioStep::Click {
            target: ElementRef::path("html/body/button"),
            timeout: None,
        };
        assert_eq!(click.label(), "click html/body/button");

        let clear = ScenarioStep::Fill {
            target: ElementRef::path("html/body/input"),
            value: String::new(),
            timeout: None,
        };
        assert!(clear.label().starts_with("clear "));
    }

    #[test]
    fn test_assertion_display() {
        let spec = AssertionSpec::visible_text("Open cart");
        assert_eq!(spec.to_string(), "visible text \"Open cart\"");

        let spec = AssertionSpec::hidden_text("Payment Successful");
        assert_eq!(spec.to_string(), "no visible text \"Payment Successful\"");
    }

    #[test]
    fn test_builder_preserves_order() {
        let scenario = Scenario::new("demo", "")
            .step(ScenarioStep::Navigate { url: "/".to_string() })
            .step(ScenarioStep::Sleep { duration: Duration::from_millis(1) })
            .assert(AssertionSpec::visible_text("first"))
            .assert(AssertionSpec::visible_text("second"));
        assert_eq!(scenario.steps.len(), 2);
        assert_eq!(scenario.assertions[0].text, "first");
        assert_eq!(scenario.assertions[1].text, "second");
    }
}
