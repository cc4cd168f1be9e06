//! Scenario runner.
//!
//! Drives one scenario at a time through a fixed state machine:
//!
//! ```text
//! Initializing -> Navigating -> Interacting -> Asserting -> Passed
//!                     |              |             |
//!                     +--------------+-------------+-------> Failed
//! ```
//!
//! Every run produces exactly one verdict, and teardown runs on every exit
//! path. A scenario that fails mid-journey still disposes its browsing
//! context and shuts its browser down before the verdict is reported.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::action::{ActionConfig, ActionExecutor};
use crate::error::{HarnessError, HarnessResult};
use crate::scenario::{Scenario, ScenarioStep};
use crate::session::{BrowserSession, BrowsingContext, SessionConfig};
use crate::verify::verify_all;

/// Where the runner currently is in a scenario's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Initializing,
    Navigating,
    Interacting,
    Asserting,
    Passed,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Initializing => "initializing",
            RunState::Navigating => "navigating",
            RunState::Interacting => "interacting",
            RunState::Asserting => "asserting",
            RunState::Passed => "passed",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Runner configuration.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Base URL the scenario's relative paths resolve against.
    pub base_url: String,
    pub session: SessionConfig,
    pub action: ActionConfig,
    /// Bound for per-frame readiness after the initial navigation.
    pub frame_ready_timeout: Duration,
    /// Where to write the JSON suite report (`None` = don't write one).
    pub output_dir: Option<PathBuf>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            session: SessionConfig::default(),
            action: ActionConfig::default(),
            frame_ready_timeout: Duration::from_secs(3),
            output_dir: None,
        }
    }
}

/// Final outcome of one scenario.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verdict {
    Passed,
    Failed { diagnostic: String },
}

impl Verdict {
    pub fn passed(&self) -> bool {
        matches!(self, Verdict::Passed)
    }
}

/// One scenario's report.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    #[serde(flatten)]
    pub verdict: Verdict,
    /// Terminal state of the run; a failure's diagnostic names the phase it
    /// occurred in.
    pub state: RunState,
    pub duration_ms: u64,
    pub steps_completed: usize,
    pub steps_total: usize,
}

/// Aggregated results of a suite run.
#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub reports: Vec<ScenarioReport>,
}

impl SuiteReport {
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    fn aggregate(reports: Vec<ScenarioReport>, duration: Duration) -> Self {
        let passed = reports.iter().filter(|r| r.verdict.passed()).count();
        Self {
            total: reports.len(),
            passed,
            failed: reports.len() - passed,
            duration_ms: duration.as_millis() as u64,
            reports,
        }
    }
}

/// Progress of one in-flight run, folded into the report at the end.
struct RunProgress {
    state: RunState,
    steps_completed: usize,
}

/// Runs scenarios, each in its own browser session.
pub struct ScenarioRunner {
    config: RunnerConfig,
}

impl ScenarioRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run one scenario to a verdict. Never returns an error: every failure
    /// mode, including failure to start the browser, becomes a failed
    /// verdict in the report.
    pub async fn run_scenario(&self, scenario: &Scenario) -> ScenarioReport {
        info!(scenario = %scenario.name, "starting scenario");
        let start = std::time::Instant::now();
        let mut progress = RunProgress {
            state: RunState::Initializing,
            steps_completed: 0,
        };

        let outcome = self.run_to_verdict(scenario, &mut progress).await;
        finish_report(scenario, progress, outcome, start.elapsed())
    }

    /// Session + context bracket around [`Self::drive`]; the release
    /// discipline lives in [`with_teardown`].
    async fn run_to_verdict(
        &self,
        scenario: &Scenario,
        progress: &mut RunProgress,
    ) -> HarnessResult<()> {
        let session = BrowserSession::launch(&self.config.session).await?;
        let context = match session.create_context().await {
            Ok(context) => context,
            Err(e) => {
                session.shutdown().await;
                return Err(e);
            }
        };

        with_teardown(context, session, |mut context| async move {
            let outcome = self.drive(&mut context, scenario, progress).await;
            (context, outcome)
        })
        .await
    }

    async fn drive(
        &self,
        context: &mut BrowsingContext,
        scenario: &Scenario,
        progress: &mut RunProgress,
    ) -> HarnessResult<()> {
        let executor = ActionExecutor::new(self.config.action.clone());
        let page = context.open_page().await?;

        progress.state = RunState::Navigating;
        executor.navigate(&page, &self.config.base_url).await?;
        executor.wait_for_load(&page, None).await;
        self.wait_for_frames(&page).await;

        progress.state = RunState::Interacting;
        for (i, step) in scenario.steps.iter().enumerate() {
            let page = context.active_page().await?;
            self.execute_step(&executor, &page, step)
                .await
                .map_err(|e| HarnessError::StepFailed {
                    step: format!("{} ({})", i + 1, step.label()),
                    reason: e.to_string(),
                })?;
            progress.steps_completed = i + 1;
        }

        progress.state = RunState::Asserting;
        let page = context.active_page().await?;
        verify_all(page.as_ref(), &scenario.assertions).await
    }

    async fn execute_step(
        &self,
        executor: &ActionExecutor,
        page: &crate::page::Page,
        step: &ScenarioStep,
    ) -> HarnessResult<()> {
        match step {
            ScenarioStep::Navigate { url } => {
                let url = join_url(&self.config.base_url, url);
                executor.navigate(page, &url).await?;
                executor.wait_for_load(page, None).await;
                Ok(())
            }
            ScenarioStep::Click { target, timeout } => {
                executor.click(page, target, *timeout).await
            }
            ScenarioStep::Fill {
                target,
                value,
                timeout,
            } => executor.fill(page, target, value, *timeout).await,
            ScenarioStep::WaitForLoad { timeout } => {
                executor.wait_for_load(page, *timeout).await;
                Ok(())
            }
            ScenarioStep::Sleep { duration } => {
                executor.sleep(*duration).await;
                Ok(())
            }
        }
    }

    /// Give each attached frame a chance to report ready. Frames that never
    /// do are skipped; enumeration failures are swallowed because frame
    /// readiness is advisory.
    async fn wait_for_frames(&self, page: &crate::page::Page) {
        let frames = match page.frames().await {
            Ok(frames) => frames,
            Err(e) => {
                warn!(error = %e, "frame enumeration failed, continuing");
                return;
            }
        };
        for frame in &frames {
            page.wait_for_frame(frame, self.config.frame_ready_timeout)
                .await;
        }
    }

    /// Run scenarios one after another, each in a fresh browser.
    pub async fn run_all(&self, scenarios: &[Scenario]) -> SuiteReport {
        let start = std::time::Instant::now();
        let mut reports = Vec::with_capacity(scenarios.len());

        for scenario in scenarios {
            let report = self.run_scenario(scenario).await;
            match &report.verdict {
                Verdict::Passed => info!("  ✓ {}", report.name),
                Verdict::Failed { diagnostic } => info!("  ✗ {} ({diagnostic})", report.name),
            }
            reports.push(report);
        }

        let suite = SuiteReport::aggregate(reports, start.elapsed());
        info!(
            total = suite.total,
            passed = suite.passed,
            failed = suite.failed,
            "suite finished"
        );
        suite
    }

    /// Run scenarios concurrently, one browser per scenario. Reports come
    /// back in the scenarios' declared order regardless of finish order.
    pub async fn run_concurrent(config: RunnerConfig, scenarios: Vec<Scenario>) -> SuiteReport {
        let start = std::time::Instant::now();
        let mut tasks = JoinSet::new();

        for (index, scenario) in scenarios.into_iter().enumerate() {
            let config = config.clone();
            tasks.spawn(async move {
                let runner = ScenarioRunner::new(config);
                (index, runner.run_scenario(&scenario).await)
            });
        }

        let mut indexed = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(entry) => indexed.push(entry),
                Err(e) => error!(error = %e, "scenario task panicked"),
            }
        }
        indexed.sort_by_key(|(index, _)| *index);

        let reports = indexed.into_iter().map(|(_, report)| report).collect();
        SuiteReport::aggregate(reports, start.elapsed())
    }

    /// Write the suite report as pretty JSON under the configured output
    /// directory.
    pub fn write_report(&self, suite: &SuiteReport) -> HarnessResult<Option<PathBuf>> {
        let Some(dir) = &self.config.output_dir else {
            return Ok(None);
        };
        std::fs::create_dir_all(dir)?;
        let path = dir.join("suite-report.json");
        std::fs::write(&path, serde_json::to_string_pretty(suite)?)?;
        info!(path = %path.display(), "suite report written");
        Ok(Some(path))
    }
}

/// Release of one acquired scenario resource. Consuming `self` lets the
/// bracket guarantee each release happens exactly once per run.
#[async_trait]
trait Teardown {
    async fn teardown(self) -> HarnessResult<()>;
}

#[async_trait]
impl Teardown for BrowsingContext {
    async fn teardown(self) -> HarnessResult<()> {
        self.dispose().await
    }
}

#[async_trait]
impl Teardown for BrowserSession {
    async fn teardown(self) -> HarnessResult<()> {
        self.shutdown().await;
        Ok(())
    }
}

/// Drive inside an acquired context/session pair. Both releases run on
/// every exit path, context first; release faults are logged, never
/// returned, so they cannot replace the drive outcome.
async fn with_teardown<C, S, F, Fut>(context: C, session: S, drive: F) -> HarnessResult<()>
where
    C: Teardown + Send,
    S: Teardown + Send,
    F: FnOnce(C) -> Fut,
    Fut: Future<Output = (C, HarnessResult<()>)>,
{
    let (context, outcome) = drive(context).await;
    if let Err(e) = context.teardown().await {
        warn!(error = %e, "context release failed");
    }
    if let Err(e) = session.teardown().await {
        warn!(error = %e, "session release failed");
    }
    outcome
}

/// Fold a finished run into its report: exactly one verdict, terminal
/// state, and a diagnostic naming the phase a failure occurred in.
fn finish_report(
    scenario: &Scenario,
    mut progress: RunProgress,
    outcome: HarnessResult<()>,
    duration: Duration,
) -> ScenarioReport {
    let verdict = match outcome {
        Ok(()) => {
            progress.state = RunState::Passed;
            Verdict::Passed
        }
        Err(e) => {
            let diagnostic = format!("{} phase: {e}", progress.state);
            error!(scenario = %scenario.name, %diagnostic, "scenario failed");
            progress.state = RunState::Failed;
            Verdict::Failed { diagnostic }
        }
    };

    ScenarioReport {
        name: scenario.name.clone(),
        verdict,
        state: progress.state,
        duration_ms: duration.as_millis() as u64,
        steps_completed: progress.steps_completed,
        steps_total: scenario.steps.len(),
    }
}

/// Resolve a scenario URL against the base: absolute URLs pass through,
/// anything else is appended as a path.
pub fn join_url(base: &str, url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!(
            "{}/{}",
            base.trim_end_matches('/'),
            url.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::AssertionSpec;

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url("http://localhost:8080", "/profile"),
            "http://localhost:8080/profile"
        );
        assert_eq!(
            join_url("http://localhost:8080/", "profile"),
            "http://localhost:8080/profile"
        );
        assert_eq!(
            join_url("http://localhost:8080", "https://example.com/x"),
            "https://example.com/x"
        );
    }

    #[test]
    fn test_verdict_serialization() {
        let passed = serde_json::to_value(&Verdict::Passed).unwrap();
        assert_eq!(passed["status"], "passed");

        let failed = serde_json::to_value(&Verdict::Failed {
            diagnostic: "asserting phase: assertion 0 unmet".to_string(),
        })
        .unwrap();
        assert_eq!(failed["status"], "failed");
        assert!(failed["diagnostic"].as_str().unwrap().contains("asserting"));
    }

    #[test]
    fn test_report_serialization_flattens_verdict() {
        let report = ScenarioReport {
            name: "cart_management".to_string(),
            verdict: Verdict::Passed,
            state: RunState::Passed,
            duration_ms: 1234,
            steps_completed: 6,
            steps_total: 6,
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["status"], "passed");
        assert_eq!(value["state"], "passed");
        assert_eq!(value["steps_completed"], 6);
    }

    #[test]
    fn test_suite_aggregation() {
        let reports = vec![
            ScenarioReport {
                name: "a".to_string(),
                verdict: Verdict::Passed,
                state: RunState::Passed,
                duration_ms: 10,
                steps_completed: 2,
                steps_total: 2,
            },
            ScenarioReport {
                name: "b".to_string(),
                verdict: Verdict::Failed {
                    diagnostic: "x".to_string(),
                },
                state: RunState::Failed,
                duration_ms: 20,
                steps_completed: 1,
                steps_total: 3,
            },
        ];
        let suite = SuiteReport::aggregate(reports, Duration::from_millis(30));
        assert_eq!(suite.total, 2);
        assert_eq!(suite.passed, 1);
        assert_eq!(suite.failed, 1);
        assert!(!suite.all_passed());
    }

    #[test]
    fn test_scenario_with_assertions_counts_steps() {
        let scenario = Scenario::new("demo", "")
            .step(ScenarioStep::Sleep {
                duration: Duration::from_millis(1),
            })
            .assert(AssertionSpec::visible_text("x"));
        assert_eq!(scenario.steps.len(), 1);
        assert_eq!(scenario.assertions.len(), 1);
    }

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FakeScope {
        released: Arc<AtomicUsize>,
        fails: bool,
    }

    impl FakeScope {
        fn new(released: &Arc<AtomicUsize>) -> Self {
            Self {
                released: Arc::clone(released),
                fails: false,
            }
        }

        fn failing(released: &Arc<AtomicUsize>) -> Self {
            Self {
                released: Arc::clone(released),
                fails: true,
            }
        }
    }

    #[async_trait]
    impl Teardown for FakeScope {
        async fn teardown(self) -> HarnessResult<()> {
            self.released.fetch_add(1, Ordering::SeqCst);
            if self.fails {
                Err(HarnessError::Protocol("release failed".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn step_error() -> HarnessError {
        HarnessError::StepFailed {
            step: "3 (click html/body/button)".to_string(),
            reason: "element not found".to_string(),
        }
    }

    #[tokio::test]
    async fn test_teardown_runs_once_when_drive_fails() {
        let context_released = Arc::new(AtomicUsize::new(0));
        let session_released = Arc::new(AtomicUsize::new(0));

        let outcome = with_teardown(
            FakeScope::new(&context_released),
            FakeScope::new(&session_released),
            |ctx| async move { (ctx, Err(step_error())) },
        )
        .await;

        assert!(matches!(outcome, Err(HarnessError::StepFailed { .. })));
        assert_eq!(context_released.load(Ordering::SeqCst), 1);
        assert_eq!(session_released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_teardown_runs_once_on_success() {
        let context_released = Arc::new(AtomicUsize::new(0));
        let session_released = Arc::new(AtomicUsize::new(0));

        let outcome = with_teardown(
            FakeScope::new(&context_released),
            FakeScope::new(&session_released),
            |ctx| async move { (ctx, Ok(())) },
        )
        .await;

        assert!(outcome.is_ok());
        assert_eq!(context_released.load(Ordering::SeqCst), 1);
        assert_eq!(session_released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_release_fault_does_not_replace_outcome() {
        let context_released = Arc::new(AtomicUsize::new(0));
        let session_released = Arc::new(AtomicUsize::new(0));

        let outcome = with_teardown(
            FakeScope::failing(&context_released),
            FakeScope::failing(&session_released),
            |ctx| async move { (ctx, Ok(())) },
        )
        .await;

        // Both releases still ran and their faults were swallowed.
        assert!(outcome.is_ok());
        assert_eq!(context_released.load(Ordering::SeqCst), 1);
        assert_eq!(session_released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_run_reports_terminal_state_and_phase() {
        let scenario = Scenario::new("demo", "").step(ScenarioStep::Sleep {
            duration: Duration::from_millis(1),
        });
        let progress = RunProgress {
            state: RunState::Interacting,
            steps_completed: 2,
        };

        let report = finish_report(
            &scenario,
            progress,
            Err(step_error()),
            Duration::from_millis(10),
        );

        assert_eq!(report.state, RunState::Failed);
        match &report.verdict {
            Verdict::Failed { diagnostic } => {
                assert!(diagnostic.contains("interacting phase"));
                assert!(diagnostic.contains("step 3"));
            }
            Verdict::Passed => panic!("expected a failed verdict"),
        }
        assert_eq!(report.steps_completed, 2);
    }

    #[test]
    fn test_successful_run_reports_passed_state() {
        let scenario = Scenario::new("demo", "");
        let progress = RunProgress {
            state: RunState::Asserting,
            steps_completed: 0,
        };

        let report = finish_report(&scenario, progress, Ok(()), Duration::from_millis(5));
        assert_eq!(report.state, RunState::Passed);
        assert!(report.verdict.passed());
    }
}
