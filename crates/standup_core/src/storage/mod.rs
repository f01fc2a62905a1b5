//! Datastore collaborators for task records.

pub mod json_store;
pub mod memory;

use crate::error::AppError;
use crate::model::TaskRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskFilter {
    /// Records that are not soft-deleted.
    Active,
    Archived,
    All,
}

impl TaskFilter {
    pub fn matches(self, task: &TaskRecord) -> bool {
        match self {
            Self::Active => !task.is_deleted(),
            Self::Archived => task.is_deleted(),
            Self::All => true,
        }
    }
}

pub trait TaskStore {
    fn get(&self, id: &str) -> Result<Option<TaskRecord>, AppError>;

    /// Matching records in creation order.
    fn list(&self, filter: TaskFilter) -> Result<Vec<TaskRecord>, AppError>;

    /// Inserts or replaces the record with the same id as one atomic write.
    fn put(&mut self, task: &TaskRecord) -> Result<(), AppError>;

    /// Allocates the next id sequence number. Never returns a number at or
    /// below one already handed out or stored.
    fn next_id(&mut self) -> Result<u64, AppError>;
}
