use crate::{PipecheckError, PipelineOutcome, PipelineResult, SessionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Outcome of a whole suite run, in test-case order.
#[derive(Clone, Debug, PartialEq)]
pub struct SuiteResult {
    pub session_id: SessionId,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub skipped: usize,
    pub results: Vec<PipelineResult>,
    pub duration: Duration,
}

impl SuiteResult {
    pub fn all_passed(&self) -> bool {
        self.passed == self.total
    }

    /// Process exit status for a runner: 0 iff every pipeline passed.
    pub fn exit_code(&self) -> i32 {
        if self.all_passed() { 0 } else { 1 }
    }

    pub fn result(&self, name: &str) -> Option<&PipelineResult> {
        self.results.iter().find(|result| result.name == name)
    }

    pub fn to_document(&self) -> ResultsDocument {
        ResultsDocument {
            total: self.total,
            passed: self.passed,
            failed: self.failed,
            errors: self.errors,
            skipped: self.skipped,
            results: self.results.iter().map(PipelineReport::from_result).collect(),
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<(), PipecheckError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.to_document())?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), "results written");
        Ok(())
    }
}

/// The JSON results document handed to report generators.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResultsDocument {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub skipped: usize,
    pub results: Vec<PipelineReport>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub name: String,
    pub test_passed: bool,
    /// Seconds.
    pub duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failing_node: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<BTreeMap<String, Value>>,
}

impl PipelineReport {
    pub fn from_result(result: &PipelineResult) -> Self {
        Self {
            name: result.name.clone(),
            test_passed: result.passed(),
            duration: result.duration.as_secs_f64(),
            error: result.error.as_ref().map(ToString::to_string),
            error_kind: result.error.as_ref().map(|error| error.kind().to_string()),
            failing_node: result.failing_node().map(str::to_string),
            output: (!result.state.is_empty()).then(|| result.state.clone()),
        }
    }
}

/// Folds pipeline results into suite-level counts.
#[derive(Debug)]
pub struct ResultsAggregator {
    session_id: SessionId,
    results: Vec<PipelineResult>,
}

impl ResultsAggregator {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            results: Vec::new(),
        }
    }

    pub fn record(&mut self, result: PipelineResult) {
        self.results.push(result);
    }

    pub fn finish(self, duration: Duration) -> SuiteResult {
        let count = |outcome: PipelineOutcome| {
            self.results
                .iter()
                .filter(|result| result.outcome == outcome)
                .count()
        };
        let passed = count(PipelineOutcome::Passed);
        let failed = count(PipelineOutcome::Failed);
        let errors = count(PipelineOutcome::Errored);
        let skipped = count(PipelineOutcome::Skipped);

        tracing::info!(
            session = %self.session_id,
            total = self.results.len(),
            passed,
            failed,
            errors,
            skipped,
            duration_ms = duration.as_millis() as u64,
            "suite finished"
        );

        SuiteResult {
            session_id: self.session_id,
            total: self.results.len(),
            passed,
            failed,
            errors,
            skipped,
            results: self.results,
            duration,
        }
    }
}
