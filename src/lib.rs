//! Karigai E2E Test Harness
//!
//! This crate drives end-to-end journeys against the Karigai storefront by
//! speaking the Chrome DevTools Protocol directly:
//! - Launches a Chromium process per scenario with an ephemeral profile
//! - Isolates each run in its own browsing context (incognito-equivalent)
//! - Resolves elements freshly against the live DOM on every action
//! - Verifies end-state text visibility in declared order
//! - Tears the browser down on every exit path, verdict already decided
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Scenario Runner (Rust)                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ScenarioRunner                                             │
//! │    ├── BrowserSession::launch() -> CDP over WebSocket       │
//! │    ├── BrowsingContext -> Page (flat-mode sessions)         │
//! │    ├── ActionExecutor: click / fill / navigate / wait       │
//! │    ├── verify_all(assertions) -> first unmet fails          │
//! │    └── teardown: dispose context, shut session down         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Scenario (built in code, journeys module)                  │
//! │    ├── name, description                                    │
//! │    ├── steps: [ScenarioStep]                                │
//! │    │     ├── navigate { url }                               │
//! │    │     ├── click { target, timeout? }                     │
//! │    │     ├── fill { target, value, timeout? }               │
//! │    │     ├── wait_for_load { timeout? }                     │
//! │    │     └── sleep { duration }                             │
//! │    └── assertions: [AssertionSpec { text, visible }]        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod action;
pub mod cdp;
pub mod error;
pub mod journeys;
pub mod locator;
pub mod page;
pub mod runner;
pub mod scenario;
pub mod session;
pub mod verify;

pub use action::{ActionConfig, ActionExecutor};
pub use error::{HarnessError, HarnessResult};
pub use locator::ElementRef;
pub use page::{Page, Readiness};
pub use runner::{RunState, RunnerConfig, ScenarioReport, ScenarioRunner, SuiteReport, Verdict};
pub use scenario::{AssertionSpec, Scenario, ScenarioStep};
pub use session::{BrowserSession, BrowsingContext, SessionConfig};
pub use verify::TextProbe;
