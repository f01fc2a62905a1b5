use crate::error::AppError;
use crate::model::TaskRecord;
use crate::model::task::sequence_of;
use crate::settings::SettingsStore;
use crate::storage::{TaskFilter, TaskStore};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Default, Clone)]
pub struct MemoryTaskStore {
    tasks: Vec<TaskRecord>,
    last_sequence: u64,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tasks(tasks: Vec<TaskRecord>) -> Self {
        Self {
            tasks,
            last_sequence: 0,
        }
    }
}

impl TaskStore for MemoryTaskStore {
    fn get(&self, id: &str) -> Result<Option<TaskRecord>, AppError> {
        Ok(self.tasks.iter().find(|task| task.id() == id).cloned())
    }

    fn list(&self, filter: TaskFilter) -> Result<Vec<TaskRecord>, AppError> {
        Ok(self
            .tasks
            .iter()
            .filter(|task| filter.matches(task))
            .cloned()
            .collect())
    }

    fn put(&mut self, task: &TaskRecord) -> Result<(), AppError> {
        match self.tasks.iter_mut().find(|stored| stored.id() == task.id()) {
            Some(stored) => *stored = task.clone(),
            None => self.tasks.push(task.clone()),
        }
        Ok(())
    }

    fn next_id(&mut self) -> Result<u64, AppError> {
        let highest_stored = self
            .tasks
            .iter()
            .filter_map(|task| sequence_of(task.id()))
            .max()
            .unwrap_or(0);
        self.last_sequence = self.last_sequence.max(highest_stored) + 1;
        Ok(self.last_sequence)
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemorySettings {
    values: BTreeMap<String, Value>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &str, default: Value) -> Result<Value, AppError> {
        Ok(self.values.get(key).cloned().unwrap_or(default))
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), AppError> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    fn entries(&self) -> Result<BTreeMap<String, Value>, AppError> {
        Ok(self.values.clone())
    }
}
