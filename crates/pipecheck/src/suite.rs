use crate::handlers::ExecutorRegistry;
use crate::{
    HttpPlatformClient, PipecheckError, PipelineDefinition, PipelineEngine, PipelineError,
    PipelineResult, RemoteBackend, ResultsAggregator, Session, SharedPipelineBackend, SuiteConfig,
    SuiteResult, load_pipeline,
};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

#[derive(Clone, Debug, PartialEq)]
pub enum CaseSource {
    /// Raw YAML, resolved against the session environment when scheduled.
    Document(String),
    Definition(PipelineDefinition),
}

/// One test case: a pipeline and the name it is reported under until it
/// loads.
#[derive(Clone, Debug, PartialEq)]
pub struct TestCase {
    pub name: String,
    pub source: CaseSource,
}

impl TestCase {
    pub fn from_document(name: impl Into<String>, document: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: CaseSource::Document(document.into()),
        }
    }

    pub fn from_definition(definition: PipelineDefinition) -> Self {
        Self {
            name: definition.name.clone(),
            source: CaseSource::Definition(definition),
        }
    }
}

/// Reads every `*.yaml` / `*.yml` file in `dir`, sorted by file name. Each
/// case is named after its file stem.
pub fn load_cases_from_dir(dir: &Path) -> Result<Vec<TestCase>, PipecheckError> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == "yaml" || ext == "yml");
        if path.is_file() && is_yaml {
            paths.push(path);
        }
    }
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    paths
        .into_iter()
        .map(|path| {
            let name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
            let document = std::fs::read_to_string(&path)?;
            Ok(TestCase::from_document(name, document))
        })
        .collect()
}

/// Runs independent pipelines through a backend on a bounded worker pool.
pub struct SuiteRunner {
    backend: SharedPipelineBackend,
    config: SuiteConfig,
}

impl SuiteRunner {
    pub fn new(backend: SharedPipelineBackend, config: SuiteConfig) -> Self {
        Self { backend, config }
    }

    /// Builds the backend the config asks for: the remote platform when
    /// `remote` is set, otherwise a local engine over `executors` running
    /// with the `engine` settings.
    pub fn from_config(config: SuiteConfig, executors: ExecutorRegistry) -> Self {
        let backend: SharedPipelineBackend = match &config.remote {
            Some(remote) => {
                tracing::info!(base_url = %remote.base_url, "running suite on remote platform");
                let platform = Arc::new(HttpPlatformClient::new(remote));
                Arc::new(
                    RemoteBackend::new(platform, remote)
                        .with_verdict_key(config.engine.verdict_key.clone()),
                )
            }
            None => Arc::new(PipelineEngine::new(executors).with_config(config.engine.clone())),
        };
        Self::new(backend, config)
    }

    pub fn config(&self) -> &SuiteConfig {
        &self.config
    }

    /// Results come back in case order whatever order the pipelines finish in.
    pub async fn run(&self, cases: Vec<TestCase>, session: &Session) -> SuiteResult {
        let started = Instant::now();
        let concurrency = self.config.effective_concurrency();
        tracing::info!(
            session = %session.id,
            cases = cases.len(),
            concurrency,
            "starting suite"
        );

        let semaphore = Arc::new(Semaphore::new(concurrency));
        let halted = Arc::new(AtomicBool::new(false));
        let names: Vec<String> = cases.iter().map(|case| case.name.clone()).collect();
        let mut tasks = JoinSet::new();

        for (index, case) in cases.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            let halted = halted.clone();
            let backend = self.backend.clone();
            let session = session.clone();
            let timeout = self.config.pipeline_timeout();
            let stop_on_first_failure = self.config.stop_on_first_failure;

            tasks.spawn(async move {
                let Ok(permit) = semaphore.acquire_owned().await else {
                    return (index, PipelineResult::skipped(case.name));
                };
                if stop_on_first_failure && halted.load(Ordering::SeqCst) {
                    tracing::info!(case = %case.name, "skipping case after earlier failure");
                    return (index, PipelineResult::skipped(case.name));
                }

                let result = run_case(backend, case, &session, timeout).await;
                if stop_on_first_failure && result.is_failure() {
                    halted.store(true, Ordering::SeqCst);
                }
                drop(permit);
                (index, result)
            });
        }

        let mut slots: Vec<Option<PipelineResult>> = vec![None; names.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(error) => tracing::error!(error = %error, "pipeline task did not complete"),
            }
        }

        let mut aggregator = ResultsAggregator::new(session.id.clone());
        for (slot, name) in slots.into_iter().zip(names) {
            aggregator.record(slot.unwrap_or_else(|| {
                PipelineResult::aborted(
                    name,
                    PipelineError::Aborted("pipeline task did not report a result".to_string()),
                    Duration::ZERO,
                )
            }));
        }
        aggregator.finish(started.elapsed())
    }
}

async fn run_case(
    backend: SharedPipelineBackend,
    case: TestCase,
    session: &Session,
    timeout: Option<Duration>,
) -> PipelineResult {
    let started = Instant::now();
    let TestCase { name, source } = case;
    let run = async {
        match source {
            CaseSource::Definition(definition) => backend.run_pipeline(&definition, session).await,
            CaseSource::Document(document) => {
                match load_pipeline(&document, session.env.values()) {
                    Ok(definition) => backend.run_pipeline(&definition, session).await,
                    Err(error) => {
                        tracing::warn!(case = %name, error = %error, "pipeline failed to load");
                        PipelineResult::aborted(&name, error, started.elapsed())
                    }
                }
            }
        }
    };

    let Some(limit) = timeout else {
        return run.await;
    };
    match tokio::time::timeout(limit, run).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(case = %name, timeout_secs = limit.as_secs_f64(), "pipeline timed out");
            PipelineResult::aborted(&name, PipelineError::Timeout(limit), started.elapsed())
        }
    }
}
