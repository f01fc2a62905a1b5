use crate::error::AppError;
use crate::model::custom_fields::render_cell;
use crate::model::{ScalarField, TaskRecord};
use crate::reconcile::columns::{self, Column};
use crate::storage::{TaskFilter, TaskStore};
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    pub rows: usize,
    pub columns: Vec<String>,
}

/// Writes every active task as CSV, fixed columns first.
pub fn export_csv<W: Write>(tasks: &dyn TaskStore, output: W) -> Result<ExportSummary, AppError> {
    let records = tasks.list(TaskFilter::Active)?;
    write_tasks_csv(&records, output)
}

pub fn write_tasks_csv<W: Write>(
    records: &[TaskRecord],
    output: W,
) -> Result<ExportSummary, AppError> {
    let custom_keys = custom_keys_in_order(records);
    let mut header: Vec<String> = columns::fixed_columns()
        .into_iter()
        .map(str::to_string)
        .collect();
    header.extend(custom_keys.iter().cloned());

    let mut writer = csv::Writer::from_writer(output);
    writer.write_record(&header).map_err(csv_error)?;

    for task in records {
        let mut row = Vec::with_capacity(header.len());
        row.push(task.id().to_string());
        row.extend(
            ScalarField::ALL
                .iter()
                .map(|field| task.scalar(*field).unwrap_or_default().to_string()),
        );
        row.push(task.current_action_plan().to_string());
        row.extend(custom_keys.iter().map(|key| {
            task.custom_fields()
                .get(key)
                .map(render_cell)
                .unwrap_or_default()
        }));
        writer.write_record(&row).map_err(csv_error)?;
    }
    writer
        .flush()
        .map_err(|err| AppError::io(format!("failed to flush CSV output: {err}")))?;

    tracing::info!(rows = records.len(), columns = header.len(), "csv export written");
    Ok(ExportSummary {
        rows: records.len(),
        columns: header,
    })
}

/// Custom keys in first-seen order across `records`. Keys that would not read
/// back as the same custom column (fixed or ignored names, surrounding
/// whitespace) are left out.
pub fn custom_keys_in_order(records: &[TaskRecord]) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for task in records {
        for key in task.custom_fields().keys() {
            if keys.contains(key) {
                continue;
            }
            if columns::classify(key) != Column::Custom(key.clone()) {
                tracing::warn!(key = %key, "custom field would not round-trip; not exported");
                continue;
            }
            keys.push(key.clone());
        }
    }
    keys
}

fn csv_error(err: csv::Error) -> AppError {
    AppError::io(format!("failed to write CSV: {err}"))
}
