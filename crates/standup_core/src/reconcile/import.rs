use crate::dates;
use crate::error::AppError;
use crate::model::custom_fields::render_cell;
use crate::model::ledger::SOURCE_CSV_IMPORT;
use crate::model::{ScalarField, TaskPatch, TaskRecord};
use crate::reconcile::columns::{self, Column};
use crate::settings::{SettingsStore, TaskPolicy};
use crate::storage::TaskStore;
use serde::Serialize;
use serde_json::Value;
use std::io::Read;
use time::Date;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportMode {
    /// Update matched rows and insert the rest as new tasks.
    #[default]
    Upsert,
    /// Update matched rows; unmatched rows are skipped.
    UpdateOnly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RowOutcome {
    Inserted {
        row_number: usize,
        id: String,
    },
    Updated {
        row_number: usize,
        id: String,
        plan_appended: bool,
    },
    Unchanged {
        row_number: usize,
        id: String,
        plan_appended: bool,
    },
    Skipped {
        row_number: usize,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRow {
    pub row_number: usize,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AbortedImport {
    pub row_number: usize,
    pub code: String,
    pub message: String,
}

/// Per-run counts. Row numbers are 1-based and exclude the header line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub plan_appends: usize,
    pub skipped: Vec<SkippedRow>,
    pub outcomes: Vec<RowOutcome>,
    /// Set when the datastore failed and stopped the run; earlier rows stay applied.
    pub aborted: Option<AbortedImport>,
}

impl ImportReport {
    fn record(&mut self, outcome: RowOutcome) {
        match &outcome {
            RowOutcome::Inserted { .. } => self.inserted += 1,
            RowOutcome::Updated { plan_appended, .. } => {
                self.updated += 1;
                if *plan_appended {
                    self.plan_appends += 1;
                }
            }
            RowOutcome::Unchanged { plan_appended, .. } => {
                self.unchanged += 1;
                if *plan_appended {
                    self.plan_appends += 1;
                }
            }
            RowOutcome::Skipped { row_number, reason } => self.skipped.push(SkippedRow {
                row_number: *row_number,
                reason: reason.clone(),
            }),
        }
        self.outcomes.push(outcome);
    }

    fn skip(&mut self, row_number: usize, err: &AppError) {
        tracing::warn!(row_number, error = %err, "csv row skipped");
        self.record(RowOutcome::Skipped {
            row_number,
            reason: err.to_string(),
        });
    }

    pub fn is_complete(&self) -> bool {
        self.aborted.is_none()
    }
}

/// Why a row did not reconcile. `Rejected` skips the row; `Store` means the
/// datastore itself failed and the run stops.
#[derive(Debug)]
enum RowError {
    Rejected(AppError),
    Store(AppError),
}

impl From<AppError> for RowError {
    fn from(err: AppError) -> Self {
        RowError::Rejected(err)
    }
}

/// One data row split by column class. Cells are raw strings.
#[derive(Debug, Default)]
struct Row {
    id: String,
    scalars: Vec<(ScalarField, String)>,
    plan: Option<String>,
    custom: Vec<(String, String)>,
}

impl Row {
    fn from_record(columns: &[Column], record: &csv::StringRecord) -> Self {
        let mut row = Row::default();
        for (column, cell) in columns.iter().zip(record.iter()) {
            match column {
                Column::Id => row.id = cell.trim().to_string(),
                Column::Scalar(field) => row.scalars.push((*field, cell.to_string())),
                Column::ActionPlan => row.plan = Some(cell.to_string()),
                Column::Custom(key) => row.custom.push((key.clone(), cell.to_string())),
                Column::Ignored => {}
            }
        }
        row
    }

    fn plan_text(&self) -> Option<&str> {
        self.plan
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }

    /// Patch for a new record: only non-empty cells count.
    fn insert_patch(&self) -> TaskPatch {
        let mut patch = TaskPatch::new();
        for (field, cell) in &self.scalars {
            if !cell.trim().is_empty() {
                patch.scalars.insert(*field, cell.trim().to_string());
            }
        }
        if let Some(text) = self.plan_text() {
            patch = patch.plan(text, SOURCE_CSV_IMPORT);
        }
        for (key, cell) in &self.custom {
            if !cell.trim().is_empty() {
                patch.custom_fields.insert(key.clone(), Value::String(cell.clone()));
            }
        }
        patch
    }

    /// Patch for a matched record. Empty scalar cells clear the field,
    /// except status and created_date which keep the stored value. Empty
    /// custom cells and cells equal to the stored rendering are left alone.
    fn update_patch(&self, existing: &TaskRecord) -> TaskPatch {
        let mut patch = TaskPatch::new();
        for (field, cell) in &self.scalars {
            let value = cell.trim();
            if value.is_empty()
                && matches!(field, ScalarField::Status | ScalarField::CreatedDate)
            {
                continue;
            }
            patch.scalars.insert(*field, value.to_string());
        }
        if let Some(text) = self.plan_text() {
            patch = patch.plan(text, SOURCE_CSV_IMPORT);
        }
        for (key, cell) in &self.custom {
            if cell.trim().is_empty() {
                continue;
            }
            let stored = existing.custom_fields().get(key).map(render_cell);
            if stored.as_deref() == Some(cell.as_str()) {
                continue;
            }
            patch.custom_fields.insert(key.clone(), Value::String(cell.clone()));
        }
        patch
    }
}

/// Reconciles every data row of `input` against `tasks`, one record write
/// per row. Rows that fail validation are skipped and reported; any datastore
/// error stops the run.
pub fn import_csv<R: Read>(
    input: R,
    tasks: &mut dyn TaskStore,
    settings: &dyn SettingsStore,
    mode: ImportMode,
) -> Result<ImportReport, AppError> {
    let policy = TaskPolicy::resolve(settings)?;
    import_rows(input, tasks, &policy, mode, dates::local_today())
}

fn import_rows<R: Read>(
    input: R,
    tasks: &mut dyn TaskStore,
    policy: &TaskPolicy,
    mode: ImportMode,
    today: Date,
) -> Result<ImportReport, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(input);
    let headers = reader
        .headers()
        .map_err(|err| AppError::invalid_data(format!("unreadable CSV header: {err}")))?
        .clone();
    let columns: Vec<Column> = headers.iter().map(columns::classify).collect();
    tracing::debug!(?columns, "csv header classified");

    let mut report = ImportReport::default();
    for (index, record) in reader.records().enumerate() {
        let row_number = index + 1;
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                report.skip(row_number, &AppError::validation(format!("unreadable row: {err}")));
                continue;
            }
        };

        let row = Row::from_record(&columns, &record);
        match reconcile_row(row_number, &row, tasks, policy, mode, today) {
            Ok(outcome) => report.record(outcome),
            Err(RowError::Store(err)) => {
                tracing::error!(row_number, error = %err, "csv import aborted");
                report.aborted = Some(AbortedImport {
                    row_number,
                    code: err.code().to_string(),
                    message: err.message().to_string(),
                });
                break;
            }
            Err(RowError::Rejected(err)) => report.skip(row_number, &err),
        }
    }

    tracing::info!(
        inserted = report.inserted,
        updated = report.updated,
        unchanged = report.unchanged,
        plan_appends = report.plan_appends,
        skipped = report.skipped.len(),
        aborted = report.aborted.is_some(),
        "csv import finished"
    );
    Ok(report)
}

fn reconcile_row(
    row_number: usize,
    row: &Row,
    tasks: &mut dyn TaskStore,
    policy: &TaskPolicy,
    mode: ImportMode,
    today: Date,
) -> Result<RowOutcome, RowError> {
    let matched = if row.id.is_empty() {
        None
    } else {
        match tasks.get(&row.id).map_err(RowError::Store)? {
            Some(task) if !task.is_deleted() => Some(task),
            Some(_) => {
                tracing::debug!(row_number, id = %row.id, "row id belongs to a deleted task");
                None
            }
            None => None,
        }
    };

    match matched {
        Some(existing) => update_existing(row_number, row, existing, tasks, policy, today),
        None if mode == ImportMode::UpdateOnly => {
            let err = if row.id.is_empty() {
                AppError::not_found("row has no id")
            } else {
                AppError::not_found(format!("no active task with id '{}'", row.id))
            };
            Err(err.into())
        }
        None => insert_new(row_number, row, tasks, policy, today),
    }
}

fn insert_new(
    row_number: usize,
    row: &Row,
    tasks: &mut dyn TaskStore,
    policy: &TaskPolicy,
    today: Date,
) -> Result<RowOutcome, RowError> {
    let patch = row.insert_patch();
    patch.validate(policy)?;

    let id = policy.format_id(tasks.next_id().map_err(RowError::Store)?);
    let task = TaskRecord::create(id, patch, policy, today)?;
    tasks.put(&task).map_err(RowError::Store)?;
    tracing::debug!(row_number, id = task.id(), "csv row inserted");

    Ok(RowOutcome::Inserted {
        row_number,
        id: task.id().to_string(),
    })
}

fn update_existing(
    row_number: usize,
    row: &Row,
    existing: TaskRecord,
    tasks: &mut dyn TaskStore,
    policy: &TaskPolicy,
    today: Date,
) -> Result<RowOutcome, RowError> {
    let patch = row.update_patch(&existing);
    log_overrides(&existing, &patch);

    let mut task = existing;
    let changes = task.update(patch, policy, today)?;
    if changes.any() {
        tasks.put(&task).map_err(RowError::Store)?;
    }

    let id = task.id().to_string();
    let plan_appended = changes.plan_appended;
    if changes.fields_changed() {
        Ok(RowOutcome::Updated {
            row_number,
            id,
            plan_appended,
        })
    } else {
        Ok(RowOutcome::Unchanged {
            row_number,
            id,
            plan_appended,
        })
    }
}

/// Stored status and priority lose to the incoming row; record when that happens.
fn log_overrides(existing: &TaskRecord, patch: &TaskPatch) {
    for field in [ScalarField::Status, ScalarField::Priority] {
        if let Some(incoming) = patch.scalars.get(&field) {
            let stored = existing.scalar(field).unwrap_or_default();
            if stored != incoming.as_str() {
                tracing::debug!(
                    id = existing.id(),
                    field = field.column(),
                    stored,
                    incoming = incoming.as_str(),
                    "csv value replaces stored value"
                );
            }
        }
    }
}
