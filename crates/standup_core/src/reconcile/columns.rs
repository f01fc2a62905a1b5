use crate::config::canonical_name;
use crate::model::ScalarField;

pub const ID_COLUMN: &str = "id";
pub const ACTION_PLAN_COLUMN: &str = "current_action_plan";

/// Derived or history columns that other exports may carry; never imported.
const IGNORED_COLUMNS: [&str; 5] = [
    "action_plan_history",
    "deleted",
    "is_overdue",
    "due_today",
    "due_soon",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Column {
    Id,
    Scalar(ScalarField),
    ActionPlan,
    Ignored,
    /// Any other header, kept verbatim (trimmed) as the custom-field key.
    Custom(String),
}

pub fn classify(header: &str) -> Column {
    let trimmed = header.trim();
    let Some(canonical) = canonical_name(trimmed) else {
        return if trimmed.is_empty() {
            Column::Ignored
        } else {
            Column::Custom(trimmed.to_string())
        };
    };

    if canonical == ID_COLUMN {
        Column::Id
    } else if canonical == ACTION_PLAN_COLUMN {
        Column::ActionPlan
    } else if let Some(field) = ScalarField::from_column(&canonical) {
        Column::Scalar(field)
    } else if IGNORED_COLUMNS.contains(&canonical.as_str()) {
        Column::Ignored
    } else {
        Column::Custom(trimmed.to_string())
    }
}

/// Fixed export columns in their documented order.
pub fn fixed_columns() -> Vec<&'static str> {
    let mut columns = vec![ID_COLUMN];
    columns.extend(ScalarField::ALL.iter().map(|field| field.column()));
    columns.push(ACTION_PLAN_COLUMN);
    columns
}
