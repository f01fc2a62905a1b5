//! CSV reconciliation: bulk import into the task store and export back out.

pub mod columns;
pub mod export;
pub mod import;

pub use export::{ExportSummary, export_csv, write_tasks_csv};
pub use import::{ImportMode, ImportReport, RowOutcome, SkippedRow, import_csv};
