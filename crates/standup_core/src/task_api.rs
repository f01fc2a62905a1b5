use crate::analytics::{self, AnalyticsReport, StandupSummary};
use crate::dates;
use crate::error::AppError;
use crate::model::ledger::SOURCE_STANDUP;
use crate::model::{TaskPatch, TaskRecord};
use crate::settings::{AnalyticsOptions, SettingsStore, TaskPolicy};
use crate::storage::{TaskFilter, TaskStore};
use time::Date;

pub fn create_task(
    tasks: &mut dyn TaskStore,
    settings: &dyn SettingsStore,
    patch: TaskPatch,
) -> Result<TaskRecord, AppError> {
    create_task_at(tasks, settings, patch, dates::local_today())
}

pub fn update_task(
    tasks: &mut dyn TaskStore,
    settings: &dyn SettingsStore,
    id: &str,
    patch: TaskPatch,
) -> Result<TaskRecord, AppError> {
    update_task_at(tasks, settings, id, patch, dates::local_today())
}

/// Stand-up style plan change: the new text becomes current and the previous
/// plan stays in the history. `source` defaults to "standup update".
pub fn append_action_plan(
    tasks: &mut dyn TaskStore,
    settings: &dyn SettingsStore,
    id: &str,
    text: &str,
    source: Option<&str>,
) -> Result<TaskRecord, AppError> {
    let source = source
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(SOURCE_STANDUP);
    update_task(tasks, settings, id, TaskPatch::new().plan(text, source))
}

pub fn soft_delete_task(tasks: &mut dyn TaskStore, id: &str) -> Result<TaskRecord, AppError> {
    let mut task = get_task(&*tasks, id)?;
    if task.soft_delete() {
        tasks.put(&task)?;
        tracing::info!(id = task.id(), "task archived");
    }
    Ok(task)
}

pub fn restore_task(tasks: &mut dyn TaskStore, id: &str) -> Result<TaskRecord, AppError> {
    let mut task = get_task(&*tasks, id)?;
    if !task.is_deleted() {
        return Err(AppError::validation(format!(
            "task '{}' is not deleted",
            task.id()
        )));
    }
    task.restore();
    tasks.put(&task)?;
    tracing::info!(id = task.id(), "task restored");
    Ok(task)
}

/// Looks up a task by id, deleted ones included.
pub fn get_task(tasks: &dyn TaskStore, id: &str) -> Result<TaskRecord, AppError> {
    let trimmed_id = id.trim();
    if trimmed_id.is_empty() {
        return Err(AppError::invalid_input("id is required"));
    }

    tasks
        .get(trimmed_id)?
        .ok_or_else(|| AppError::not_found(format!("task '{trimmed_id}' not found")))
}

pub fn list_tasks(tasks: &dyn TaskStore, filter: TaskFilter) -> Result<Vec<TaskRecord>, AppError> {
    tasks.list(filter)
}

pub fn analytics_report(
    tasks: &dyn TaskStore,
    settings: &dyn SettingsStore,
) -> Result<AnalyticsReport, AppError> {
    let options = AnalyticsOptions::resolve(settings)?;
    let active = tasks.list(TaskFilter::Active)?;
    analytics::summarize(&active, &options, dates::local_today())
}

pub fn standup_summary(
    tasks: &dyn TaskStore,
    settings: &dyn SettingsStore,
) -> Result<StandupSummary, AppError> {
    let options = AnalyticsOptions::resolve(settings)?;
    let active = tasks.list(TaskFilter::Active)?;
    analytics::standup_summary(&active, &options, dates::local_today())
}

fn create_task_at(
    tasks: &mut dyn TaskStore,
    settings: &dyn SettingsStore,
    patch: TaskPatch,
    today: Date,
) -> Result<TaskRecord, AppError> {
    let policy = TaskPolicy::resolve(settings)?;
    // Validate before allocating so rejected input does not consume an id.
    patch.validate(&policy)?;

    let id = policy.format_id(tasks.next_id()?);
    let task = TaskRecord::create(id, patch, &policy, today)?;
    tasks.put(&task)?;
    tracing::info!(id = task.id(), status = task.status(), "task created");

    Ok(task)
}

fn update_task_at(
    tasks: &mut dyn TaskStore,
    settings: &dyn SettingsStore,
    id: &str,
    patch: TaskPatch,
    today: Date,
) -> Result<TaskRecord, AppError> {
    let mut task = get_task(&*tasks, id)?;
    if task.is_deleted() {
        return Err(AppError::not_found(format!("task '{}' is deleted", task.id())));
    }

    let policy = TaskPolicy::resolve(settings)?;
    let changes = task.update(patch, &policy, today)?;
    if changes.any() {
        tasks.put(&task)?;
    }
    tracing::debug!(id = task.id(), ?changes, "task updated");

    Ok(task)
}

#[cfg(test)]
mod tests {
    use super::{
        append_action_plan, create_task_at, get_task, list_tasks, restore_task, soft_delete_task,
        update_task_at,
    };
    use crate::model::{ScalarField, TaskPatch};
    use crate::settings::{ID_PREFIX, STATUS_OPTIONS, SettingsStore};
    use crate::storage::memory::{MemorySettings, MemoryTaskStore};
    use crate::storage::{TaskFilter, TaskStore};
    use serde_json::json;
    use time::{Date, Month};

    fn today() -> Date {
        Date::from_calendar_date(2025, Month::June, 2).unwrap()
    }

    fn open_settings() -> MemorySettings {
        let mut settings = MemorySettings::new();
        settings
            .set(STATUS_OPTIONS, json!(["Open", "In Progress", "Completed"]))
            .unwrap();
        settings.set("initial_status", json!("Open")).unwrap();
        settings
    }

    #[test]
    fn create_then_append_plan() {
        let mut tasks = MemoryTaskStore::new();
        let settings = open_settings();

        let created = create_task_at(
            &mut tasks,
            &settings,
            TaskPatch::new().set(ScalarField::Status, "Open"),
            today(),
        )
        .unwrap();
        let updated = append_action_plan(
            &mut tasks,
            &settings,
            created.id(),
            "investigate root cause",
            None,
        )
        .unwrap();

        assert_eq!(created.id(), "T001");
        assert_eq!(updated.current_action_plan(), "investigate root cause");
        assert_eq!(updated.action_plan_history().len(), 1);
        assert_eq!(
            updated.action_plan_history().history()[0].source(),
            "standup update"
        );
        assert_eq!(tasks.get("T001").unwrap().unwrap(), updated);
    }

    #[test]
    fn create_rejects_invalid_status_without_consuming_id() {
        let mut tasks = MemoryTaskStore::new();
        let settings = open_settings();

        let err = create_task_at(
            &mut tasks,
            &settings,
            TaskPatch::new().set(ScalarField::Status, "Not Started"),
            today(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "validation_error");

        let created = create_task_at(&mut tasks, &settings, TaskPatch::new(), today()).unwrap();
        assert_eq!(created.id(), "T001");
        assert_eq!(created.status(), "Open");
    }

    #[test]
    fn id_prefix_change_applies_to_next_create() {
        let mut tasks = MemoryTaskStore::new();
        let mut settings = open_settings();

        create_task_at(&mut tasks, &settings, TaskPatch::new(), today()).unwrap();
        settings.set(ID_PREFIX, json!("BUG")).unwrap();
        let second = create_task_at(&mut tasks, &settings, TaskPatch::new(), today()).unwrap();

        assert_eq!(second.id(), "BUG002");
    }

    #[test]
    fn deleted_ids_are_never_reused() {
        let mut tasks = MemoryTaskStore::new();
        let settings = open_settings();

        create_task_at(&mut tasks, &settings, TaskPatch::new(), today()).unwrap();
        let second = create_task_at(&mut tasks, &settings, TaskPatch::new(), today()).unwrap();
        soft_delete_task(&mut tasks, second.id()).unwrap();
        let third = create_task_at(&mut tasks, &settings, TaskPatch::new(), today()).unwrap();

        assert_eq!(third.id(), "T003");
        assert!(get_task(&tasks, "T002").unwrap().is_deleted());
    }

    #[test]
    fn soft_delete_twice_is_a_no_op() {
        let mut tasks = MemoryTaskStore::new();
        let settings = open_settings();
        let created = create_task_at(&mut tasks, &settings, TaskPatch::new(), today()).unwrap();

        let first = soft_delete_task(&mut tasks, created.id()).unwrap();
        let second = soft_delete_task(&mut tasks, created.id()).unwrap();

        assert_eq!(first, second);
        assert!(list_tasks(&tasks, TaskFilter::Active).unwrap().is_empty());
        assert_eq!(list_tasks(&tasks, TaskFilter::Archived).unwrap().len(), 1);
    }

    #[test]
    fn restore_brings_task_back() {
        let mut tasks = MemoryTaskStore::new();
        let settings = open_settings();
        let created = create_task_at(&mut tasks, &settings, TaskPatch::new(), today()).unwrap();

        let err = restore_task(&mut tasks, created.id()).unwrap_err();
        assert_eq!(err.code(), "validation_error");

        soft_delete_task(&mut tasks, created.id()).unwrap();
        let restored = restore_task(&mut tasks, created.id()).unwrap();
        assert!(!restored.is_deleted());
        assert_eq!(list_tasks(&tasks, TaskFilter::Active).unwrap().len(), 1);
    }

    #[test]
    fn update_rejects_deleted_and_missing_tasks() {
        let mut tasks = MemoryTaskStore::new();
        let settings = open_settings();
        let created = create_task_at(&mut tasks, &settings, TaskPatch::new(), today()).unwrap();
        soft_delete_task(&mut tasks, created.id()).unwrap();

        let err = update_task_at(
            &mut tasks,
            &settings,
            "T001",
            TaskPatch::new().set(ScalarField::Priority, "High"),
            today(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "not_found");

        let err = update_task_at(&mut tasks, &settings, "T404", TaskPatch::new(), today())
            .unwrap_err();
        assert_eq!(err.code(), "not_found");

        let err = get_task(&tasks, "  ").unwrap_err();
        assert_eq!(err.code(), "invalid_input");
    }

    #[test]
    fn update_merges_custom_fields_and_persists() {
        let mut tasks = MemoryTaskStore::new();
        let settings = open_settings();
        create_task_at(
            &mut tasks,
            &settings,
            TaskPatch::new().custom("Owner", json!("ana")),
            today(),
        )
        .unwrap();

        update_task_at(
            &mut tasks,
            &settings,
            "T001",
            TaskPatch::new()
                .set(ScalarField::Status, "In Progress")
                .custom("Sprint", json!(4)),
            today(),
        )
        .unwrap();

        let stored = tasks.get("T001").unwrap().unwrap();
        assert_eq!(stored.status(), "In Progress");
        assert_eq!(stored.custom_fields().get("Owner"), Some(&json!("ana")));
        assert_eq!(stored.custom_fields().get("Sprint"), Some(&json!(4)));
    }

    #[test]
    fn empty_plan_update_is_rejected() {
        let mut tasks = MemoryTaskStore::new();
        let settings = open_settings();
        create_task_at(&mut tasks, &settings, TaskPatch::new(), today()).unwrap();

        let err = append_action_plan(&mut tasks, &settings, "T001", "  ", None).unwrap_err();

        assert_eq!(err.code(), "validation_error");
        assert!(
            tasks
                .get("T001")
                .unwrap()
                .unwrap()
                .action_plan_history()
                .is_empty()
        );
    }
}
