use crate::PipecheckError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

pub const ENVIRONMENT_FILE_NAME: &str = "environment.json";

const SESSION_ID_LENGTH: usize = 8;

/// Short opaque identifier scoping one suite run.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        let mut id = Uuid::new_v4().simple().to_string();
        id.truncate(SESSION_ID_LENGTH);
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

pub fn new_session() -> SessionId {
    SessionId::generate()
}

/// Key-value environment captured at setup and read-only afterwards.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvSnapshot {
    values: BTreeMap<String, String>,
}

impl EnvSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_process() -> Self {
        std::env::vars().collect()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, String)> for EnvSnapshot {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// A suite run's identity plus the environment every pipeline in it reads.
#[derive(Clone, Debug)]
pub struct Session {
    pub id: SessionId,
    pub env: Arc<EnvSnapshot>,
}

impl Session {
    pub fn new(env: EnvSnapshot) -> Self {
        Self::with_id(new_session(), env)
    }

    pub fn with_id(id: SessionId, env: EnvSnapshot) -> Self {
        Self {
            id,
            env: Arc::new(env),
        }
    }

    pub fn load(store: &dyn EnvironmentStore, id: SessionId) -> Result<Self, PipecheckError> {
        let env = store.load(&id)?;
        Ok(Self::with_id(id, env))
    }
}

/// Persisted environment snapshots, namespaced by session id.
pub trait EnvironmentStore: Send + Sync {
    fn save(&self, session: &SessionId, snapshot: &EnvSnapshot) -> Result<(), PipecheckError>;
    fn load(&self, session: &SessionId) -> Result<EnvSnapshot, PipecheckError>;
    fn remove(&self, session: &SessionId) -> Result<(), PipecheckError>;
}

#[derive(Debug, Default)]
pub struct MemoryEnvironmentStore {
    snapshots: Mutex<HashMap<SessionId, EnvSnapshot>>,
}

impl MemoryEnvironmentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EnvironmentStore for MemoryEnvironmentStore {
    fn save(&self, session: &SessionId, snapshot: &EnvSnapshot) -> Result<(), PipecheckError> {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session.clone(), snapshot.clone());
        Ok(())
    }

    fn load(&self, session: &SessionId) -> Result<EnvSnapshot, PipecheckError> {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session)
            .cloned()
            .ok_or_else(|| PipecheckError::UnknownSession(session.to_string()))
    }

    fn remove(&self, session: &SessionId) -> Result<(), PipecheckError> {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session);
        Ok(())
    }
}

/// Stores each snapshot at `<root>/<session_id>/environment.json`.
#[derive(Clone, Debug)]
pub struct FsEnvironmentStore {
    root: PathBuf,
}

impl FsEnvironmentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn session_dir(&self, session: &SessionId) -> Result<PathBuf, PipecheckError> {
        let id = session.as_str();
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
        if !valid {
            return Err(PipecheckError::UnknownSession(id.to_string()));
        }
        Ok(self.root.join(id))
    }

    pub fn snapshot_path(&self, session: &SessionId) -> Result<PathBuf, PipecheckError> {
        Ok(self.session_dir(session)?.join(ENVIRONMENT_FILE_NAME))
    }
}

impl EnvironmentStore for FsEnvironmentStore {
    fn save(&self, session: &SessionId, snapshot: &EnvSnapshot) -> Result<(), PipecheckError> {
        let path = self.snapshot_path(session)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_vec_pretty(snapshot)?)?;
        tracing::debug!(session = %session, path = %path.display(), "saved environment snapshot");
        Ok(())
    }

    fn load(&self, session: &SessionId) -> Result<EnvSnapshot, PipecheckError> {
        let path = self.snapshot_path(session)?;
        if !path.is_file() {
            return Err(PipecheckError::UnknownSession(session.to_string()));
        }
        Ok(serde_json::from_slice(&fs::read(&path)?)?)
    }

    fn remove(&self, session: &SessionId) -> Result<(), PipecheckError> {
        let dir = self.session_dir(session)?;
        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        Ok(())
    }
}
