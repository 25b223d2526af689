use crate::{
    PipecheckError, PipelineBackend, PipelineDefinition, PipelineError, PipelineResult,
    RemoteConfig, Session, SessionId,
};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Execution status reported by a remote platform.
#[derive(Clone, Debug, PartialEq)]
pub enum RemoteStatus {
    Pending,
    Running,
    Completed { state: BTreeMap<String, Value> },
    Failed { message: String },
}

#[async_trait]
pub trait RemotePlatform: Send + Sync {
    /// Submits a pipeline and returns the platform's execution id.
    async fn submit(
        &self,
        session: &SessionId,
        definition: &PipelineDefinition,
    ) -> Result<String, PipecheckError>;

    async fn status(
        &self,
        session: &SessionId,
        execution_id: &str,
    ) -> Result<RemoteStatus, PipecheckError>;
}

pub type SharedRemotePlatform = Arc<dyn RemotePlatform>;

/// Runs pipelines on a remote platform, polling at a fixed interval until
/// the execution settles or `max_wait` elapses.
pub struct RemoteBackend {
    platform: SharedRemotePlatform,
    poll_interval: Duration,
    max_wait: Duration,
    verdict_key: String,
}

impl RemoteBackend {
    pub fn new(platform: SharedRemotePlatform, config: &RemoteConfig) -> Self {
        Self {
            platform,
            poll_interval: config.poll_interval(),
            max_wait: config.max_wait(),
            verdict_key: crate::DEFAULT_VERDICT_KEY.to_string(),
        }
    }

    pub fn with_verdict_key(mut self, verdict_key: impl Into<String>) -> Self {
        self.verdict_key = verdict_key.into();
        self
    }
}

#[async_trait]
impl PipelineBackend for RemoteBackend {
    async fn run_pipeline(
        &self,
        definition: &PipelineDefinition,
        session: &Session,
    ) -> PipelineResult {
        let started = Instant::now();
        let remote_error = |error: PipecheckError| {
            PipelineResult::aborted(
                &definition.name,
                PipelineError::Remote(error.to_string()),
                started.elapsed(),
            )
        };

        let execution_id = match self.platform.submit(&session.id, definition).await {
            Ok(id) => id,
            Err(error) => return remote_error(error),
        };
        tracing::info!(
            pipeline = %definition.name,
            session = %session.id,
            execution = %execution_id,
            "submitted pipeline to remote platform"
        );

        loop {
            match self.platform.status(&session.id, &execution_id).await {
                Ok(RemoteStatus::Completed { state }) => {
                    return PipelineResult::completed(
                        &definition.name,
                        state,
                        Vec::new(),
                        started.elapsed(),
                        &self.verdict_key,
                    );
                }
                Ok(RemoteStatus::Failed { message }) => {
                    return PipelineResult::aborted(
                        &definition.name,
                        PipelineError::Remote(message),
                        started.elapsed(),
                    );
                }
                Ok(RemoteStatus::Pending | RemoteStatus::Running) => {}
                Err(error) => return remote_error(error),
            }

            if started.elapsed() + self.poll_interval > self.max_wait {
                return PipelineResult::aborted(
                    &definition.name,
                    PipelineError::Timeout(self.max_wait),
                    started.elapsed(),
                );
            }
            tracing::debug!(execution = %execution_id, "remote execution still running");
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// HTTP client for the platform's execution API.
#[derive(Clone, Debug)]
pub struct HttpPlatformClient {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpPlatformClient {
    pub fn new(config: &RemoteConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.clone(),
            api_token: config.api_token.clone(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.api_token.as_deref() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn read_json(response: reqwest::Response) -> Result<Value, PipecheckError> {
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| PipecheckError::Remote(format!("http read body failed: {err}")))?;
        if !status.is_success() {
            return Err(PipecheckError::Remote(format!(
                "platform returned status {}: {text}",
                status.as_u16()
            )));
        }
        serde_json::from_str(&text)
            .map_err(|err| PipecheckError::Remote(format!("http json decode failed: {err}")))
    }
}

#[async_trait]
impl RemotePlatform for HttpPlatformClient {
    async fn submit(
        &self,
        session: &SessionId,
        definition: &PipelineDefinition,
    ) -> Result<String, PipecheckError> {
        let request = self
            .client
            .post(self.endpoint(&format!("/api/v1/sessions/{session}/executions")))
            .json(&json!({ "pipeline": definition }));
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|err| PipecheckError::Remote(format!("http post failed: {err}")))?;
        let payload = Self::read_json(response).await?;
        payload
            .get("execution_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| PipecheckError::Remote("missing execution_id".to_string()))
    }

    async fn status(
        &self,
        session: &SessionId,
        execution_id: &str,
    ) -> Result<RemoteStatus, PipecheckError> {
        let request = self.client.get(self.endpoint(&format!(
            "/api/v1/sessions/{session}/executions/{execution_id}"
        )));
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|err| PipecheckError::Remote(format!("http get failed: {err}")))?;
        parse_status(&Self::read_json(response).await?)
    }
}

/// Decodes `{status, state?, error?}` from the platform's status endpoint.
pub fn parse_status(payload: &Value) -> Result<RemoteStatus, PipecheckError> {
    let status = payload
        .get("status")
        .and_then(Value::as_str)
        .ok_or_else(|| PipecheckError::Remote("missing status".to_string()))?;
    match status {
        "pending" | "queued" => Ok(RemoteStatus::Pending),
        "running" => Ok(RemoteStatus::Running),
        "completed" | "succeeded" => {
            let state = match payload.get("state") {
                Some(Value::Object(fields)) => fields
                    .iter()
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect(),
                Some(Value::Null) | None => BTreeMap::new(),
                Some(_) => {
                    return Err(PipecheckError::Remote(
                        "state must be an object".to_string(),
                    ));
                }
            };
            Ok(RemoteStatus::Completed { state })
        }
        "failed" | "error" => Ok(RemoteStatus::Failed {
            message: payload
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("remote execution failed")
                .to_string(),
        }),
        other => Err(PipecheckError::Remote(format!(
            "unknown execution status '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EnvSnapshot, PipelineOutcome, parse_pipeline};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    struct ScriptedPlatform {
        statuses: Mutex<VecDeque<RemoteStatus>>,
        polls: Mutex<usize>,
    }

    #[async_trait]
    impl RemotePlatform for ScriptedPlatform {
        async fn submit(
            &self,
            _session: &SessionId,
            _definition: &PipelineDefinition,
        ) -> Result<String, PipecheckError> {
            Ok("exec-1".to_string())
        }

        async fn status(
            &self,
            _session: &SessionId,
            _execution_id: &str,
        ) -> Result<RemoteStatus, PipecheckError> {
            *self.polls.lock().expect("poll counter lock") += 1;
            Ok(self
                .statuses
                .lock()
                .expect("status queue lock")
                .pop_front()
                .unwrap_or(RemoteStatus::Running))
        }
    }

    fn definition() -> PipelineDefinition {
        parse_pipeline(
            r#"
name: remote smoke
entry_point: a
nodes:
  - id: a
    type: code
    code: "function main() { return true; }"
"#,
        )
        .expect("document should parse")
    }

    fn config() -> RemoteConfig {
        RemoteConfig {
            poll_interval_ms: 1_000,
            max_wait_secs: 10,
            ..RemoteConfig::new("http://platform.invalid")
        }
    }

    fn session() -> Session {
        Session::with_id("7e57abcd".into(), EnvSnapshot::new())
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn remote_backend_polls_until_completed() {
        let platform = Arc::new(ScriptedPlatform::default());
        platform.statuses.lock().expect("lock").extend([
            RemoteStatus::Pending,
            RemoteStatus::Running,
            RemoteStatus::Completed {
                state: BTreeMap::from([("test_passed".to_string(), json!(true))]),
            },
        ]);
        let backend = RemoteBackend::new(platform.clone(), &config());

        let result = backend.run_pipeline(&definition(), &session()).await;

        assert_eq!(result.outcome, PipelineOutcome::Passed);
        assert_eq!(*platform.polls.lock().expect("lock"), 3);
        assert_eq!(result.duration, Duration::from_secs(2));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn remote_backend_never_settles_expected_timeout() {
        let platform = Arc::new(ScriptedPlatform::default());
        let backend = RemoteBackend::new(platform, &config());

        let result = backend.run_pipeline(&definition(), &session()).await;

        assert_eq!(result.outcome, PipelineOutcome::Errored);
        assert_eq!(
            result.error,
            Some(PipelineError::Timeout(Duration::from_secs(10)))
        );
        assert!(result.duration <= Duration::from_secs(10));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn remote_backend_failed_execution_expected_remote_error() {
        let platform = Arc::new(ScriptedPlatform::default());
        platform
            .statuses
            .lock()
            .expect("lock")
            .push_back(RemoteStatus::Failed {
                message: "worker crashed".to_string(),
            });
        let backend = RemoteBackend::new(platform, &config());

        let result = backend.run_pipeline(&definition(), &session()).await;

        assert_eq!(
            result.error,
            Some(PipelineError::Remote("worker crashed".to_string()))
        );
    }

    #[test]
    fn parse_status_payloads_expected_variants() {
        assert_eq!(
            parse_status(&json!({"status": "queued"})).expect("pending"),
            RemoteStatus::Pending
        );
        assert_eq!(
            parse_status(&json!({"status": "completed", "state": {"items": [1]}}))
                .expect("completed"),
            RemoteStatus::Completed {
                state: BTreeMap::from([("items".to_string(), json!([1]))]),
            }
        );
        assert_eq!(
            parse_status(&json!({"status": "failed", "error": "boom"})).expect("failed"),
            RemoteStatus::Failed {
                message: "boom".to_string()
            }
        );
        assert!(parse_status(&json!({"status": "exploded"})).is_err());
        assert!(parse_status(&json!({})).is_err());
    }

    #[test]
    fn endpoint_joins_base_and_path() {
        let client = HttpPlatformClient::new(&RemoteConfig::new("https://platform.example.com/"));
        assert_eq!(
            client.endpoint("/api/v1/sessions/abc/executions"),
            "https://platform.example.com/api/v1/sessions/abc/executions"
        );
    }
}
