//! Conformance test suite for persistence backends.
//!
//! A backend-agnostic suite that any [`Persistence`] configuration (local
//! store over any medium, or any [`RemoteStore`](crate::RemoteStore)) can
//! run to verify that it keeps the shared read-after-write semantics. The
//! suite covers:
//!
//! - **Runs**: id and timestamp assignment, round-trips, ordering, patch merging
//! - **Artefacts**: default kind, exact run filtering, unknown-run rejection
//! - **Audit**: append-only round-trips, newest-first ordering, limits
//! - **Concurrency**: parallel writers sharing one facade lose nothing
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty facade for each test:
//!
//! ```ignore
//! use runledger_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn local_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         Persistence::local(LocalStore::in_memory())
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod artefacts;
mod audit;
mod concurrent;
mod runs;

use std::fmt;
use std::future::Future;

use crate::facade::Persistence;
use crate::record::{ActorType, Impact, NewArtefact, NewRun, RunRecord};

/// Outcome of one check, e.g. `audit/limit_caps_newest_first`.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// One of `runs`, `artefacts`, `audit`, `concurrent`.
    pub category: String,
    pub name: String,
    pub passed: bool,
    /// What the backend did instead, when the check failed.
    pub message: Option<String>,
}

impl TestResult {
    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: result.is_ok(),
            message: result.err(),
        }
    }
}

/// Every check of one suite run against one facade factory.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl ConformanceReport {
    fn new(results: Vec<TestResult>) -> Self {
        let passed = results.iter().filter(|r| r.passed).count();
        Self {
            total: results.len(),
            failed: results.len() - passed,
            passed,
            results,
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &TestResult> {
        self.results.iter().filter(|r| !r.passed)
    }

    /// `(passed, total)` for one category.
    pub fn category(&self, category: &str) -> (usize, usize) {
        let in_category = self.results.iter().filter(|r| r.category == category);
        in_category.fold((0, 0), |(passed, total), r| {
            (passed + usize::from(r.passed), total + 1)
        })
    }
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "persistence conformance {}/{}", self.passed, self.total)?;
        for category in ["runs", "artefacts", "audit", "concurrent"] {
            let (passed, total) = self.category(category);
            write!(f, " {category}={passed}/{total}")?;
        }
        writeln!(f)?;
        for r in self.failures() {
            let why = r.message.as_deref().unwrap_or("no detail");
            writeln!(f, "  {}/{}: {why}", r.category, r.name)?;
        }
        Ok(())
    }
}

/// Run every check against facades built by `factory`, one fresh empty
/// facade per check.
pub async fn run_conformance_suite<F, Fut>(factory: F) -> ConformanceReport
where
    F: Fn() -> Fut,
    Fut: Future<Output = Persistence>,
{
    let mut results = Vec::new();

    results.extend(runs::run_run_tests(&factory).await);
    results.extend(artefacts::run_artefact_tests(&factory).await);
    results.extend(audit::run_audit_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    ConformanceReport::new(results)
}

// ── Helpers: record constructors with sensible defaults ──────────────────────

fn make_run(input_ref: &str) -> NewRun {
    NewRun::new(
        ActorType::Teacher,
        "teacher-1",
        Impact::Formative,
        "w1",
        "v1",
    )
    .with_input(input_ref)
}

fn make_artefact(run_id: &str, kind: Option<&str>) -> NewArtefact {
    NewArtefact {
        id: None,
        run_id: run_id.to_string(),
        kind: kind.map(str::to_string),
        provider: Some("conformance".to_string()),
        model: Some("model-x".to_string()),
        content: format!("artefact for {run_id}"),
    }
}

/// Save a run and unwrap the stored record.
async fn saved_run(p: &Persistence, input_ref: &str) -> Result<RunRecord, String> {
    p.save_run(make_run(input_ref))
        .await
        .map_err(|e| format!("save_run: {e}"))?
        .into_data()
        .ok_or_else(|| "save_run returned no data".to_string())
}

fn expect<T: PartialEq + fmt::Debug>(what: &str, expected: T, actual: T) -> Result<(), String> {
    if expected == actual {
        Ok(())
    } else {
        Err(format!("{what}: expected {expected:?}, got {actual:?}"))
    }
}
