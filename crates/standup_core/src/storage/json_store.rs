use crate::config::app_dir;
use crate::error::AppError;
use crate::model::TaskRecord;
use crate::model::task::sequence_of;
use crate::settings::SettingsStore;
use crate::storage::{TaskFilter, TaskStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

pub const SCHEMA_VERSION: u32 = 1;
const STORE_FILE_NAME: &str = "tasks.json";
const SETTINGS_FILE_NAME: &str = "settings.json";
const STORE_ENV_VAR: &str = "STANDUP_STORE_PATH";
const SETTINGS_ENV_VAR: &str = "STANDUP_SETTINGS_PATH";

#[derive(Debug, Serialize, Deserialize)]
struct StoredTasks {
    schema_version: u32,
    #[serde(default)]
    last_sequence: u64,
    tasks: Vec<TaskRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskState {
    pub tasks: Vec<TaskRecord>,
    pub last_sequence: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredSettings {
    schema_version: u32,
    #[serde(default)]
    settings: BTreeMap<String, Value>,
}

/// Configured path, then the environment, then the app directory.
pub fn store_path(configured: Option<&Path>) -> Result<PathBuf, AppError> {
    resolve_path(configured, STORE_ENV_VAR, STORE_FILE_NAME)
}

pub fn settings_path(configured: Option<&Path>) -> Result<PathBuf, AppError> {
    resolve_path(configured, SETTINGS_ENV_VAR, SETTINGS_FILE_NAME)
}

fn resolve_path(
    configured: Option<&Path>,
    env_var: &str,
    file_name: &str,
) -> Result<PathBuf, AppError> {
    if let Some(path) = configured {
        return Ok(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(env_var)
        && !path.trim().is_empty()
    {
        return Ok(PathBuf::from(path));
    }

    Ok(app_dir()?.join(file_name))
}

pub fn load_state(path: &Path) -> Result<TaskState, AppError> {
    if !path.exists() {
        return Ok(TaskState::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|err| AppError::storage(format!("{}: {}", path.display(), err)))?;
    let stored: StoredTasks =
        serde_json::from_str(&content).map_err(|err| AppError::invalid_data(err.to_string()))?;

    if stored.schema_version != SCHEMA_VERSION {
        return Err(AppError::invalid_data("schema_version mismatch"));
    }

    let mut seen = HashSet::new();
    for task in &stored.tasks {
        if !seen.insert(task.id()) {
            return Err(AppError::invalid_data(format!(
                "duplicate task id '{}'",
                task.id()
            )));
        }
    }

    Ok(TaskState {
        tasks: stored.tasks,
        last_sequence: stored.last_sequence,
    })
}

pub fn save_state(path: &Path, state: &TaskState) -> Result<(), AppError> {
    let stored = StoredTasks {
        schema_version: SCHEMA_VERSION,
        last_sequence: state.last_sequence,
        tasks: state.tasks.to_vec(),
    };
    let content = serde_json::to_string_pretty(&stored)
        .map_err(|err| AppError::invalid_data(err.to_string()))?;
    write_atomically(path, &content)
}

/// Writes a sibling temp file and renames it over `path`, so readers see
/// either the old or the new content.
fn write_atomically(path: &Path, content: &str) -> Result<(), AppError> {
    let storage_err = |err: std::io::Error| AppError::storage(format!("{}: {}", path.display(), err));

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(storage_err)?;
    }

    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);
    std::fs::write(&temp_path, content).map_err(storage_err)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let permissions = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&temp_path, permissions).map_err(storage_err)?;
    }

    std::fs::rename(&temp_path, path).map_err(storage_err)
}

/// Task datastore backed by one JSON file, re-read on every call.
#[derive(Debug, Clone)]
pub struct JsonTaskStore {
    path: PathBuf,
}

impl JsonTaskStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TaskStore for JsonTaskStore {
    fn get(&self, id: &str) -> Result<Option<TaskRecord>, AppError> {
        Ok(load_state(&self.path)?
            .tasks
            .into_iter()
            .find(|task| task.id() == id))
    }

    fn list(&self, filter: TaskFilter) -> Result<Vec<TaskRecord>, AppError> {
        Ok(load_state(&self.path)?
            .tasks
            .into_iter()
            .filter(|task| filter.matches(task))
            .collect())
    }

    fn put(&mut self, task: &TaskRecord) -> Result<(), AppError> {
        let mut state = load_state(&self.path)?;
        match state.tasks.iter_mut().find(|stored| stored.id() == task.id()) {
            Some(stored) => *stored = task.clone(),
            None => state.tasks.push(task.clone()),
        }
        save_state(&self.path, &state)
    }

    fn next_id(&mut self) -> Result<u64, AppError> {
        let mut state = load_state(&self.path)?;
        let highest_stored = state
            .tasks
            .iter()
            .filter_map(|task| sequence_of(task.id()))
            .max()
            .unwrap_or(0);
        state.last_sequence = state.last_sequence.max(highest_stored) + 1;
        save_state(&self.path, &state)?;
        Ok(state.last_sequence)
    }
}

/// App settings backed by one JSON file, re-read on every call.
#[derive(Debug, Clone)]
pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> Result<BTreeMap<String, Value>, AppError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let content = std::fs::read_to_string(&self.path)
            .map_err(|err| AppError::storage(format!("{}: {}", self.path.display(), err)))?;
        let stored: StoredSettings = serde_json::from_str(&content).map_err(|err| {
            AppError::invalid_data(format!("invalid JSON in {}: {}", self.path.display(), err))
        })?;

        if stored.schema_version != SCHEMA_VERSION {
            return Err(AppError::invalid_data("settings schema_version mismatch"));
        }

        Ok(stored.settings)
    }
}

impl SettingsStore for JsonSettingsStore {
    fn get(&self, key: &str, default: Value) -> Result<Value, AppError> {
        Ok(self.load()?.remove(key).unwrap_or(default))
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), AppError> {
        let mut settings = self.load()?;
        settings.insert(key.to_string(), value);
        let stored = StoredSettings {
            schema_version: SCHEMA_VERSION,
            settings,
        };
        let content = serde_json::to_string_pretty(&stored)
            .map_err(|err| AppError::invalid_data(err.to_string()))?;
        write_atomically(&self.path, &content)
    }

    fn entries(&self) -> Result<BTreeMap<String, Value>, AppError> {
        self.load()
    }
}
