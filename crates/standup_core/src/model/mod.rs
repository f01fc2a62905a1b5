pub mod custom_fields;
pub mod ledger;
pub mod task;

pub use custom_fields::CustomFields;
pub use ledger::{ActionPlanLedger, LedgerEntry};
pub use task::{Changes, DueState, PlanUpdate, ScalarField, TaskPatch, TaskRecord};
