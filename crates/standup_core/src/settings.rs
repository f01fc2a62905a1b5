//! App settings collaborator and the policies derived from it.
//!
//! Settings are read when an operation starts and never cached beyond it, so
//! a changed setting applies to the next create, edit or import.

use crate::error::AppError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;

pub const STATUS_OPTIONS: &str = "status_options";
pub const INITIAL_STATUS: &str = "initial_status";
pub const COMPLETED_STATUS: &str = "completed_status";
pub const ID_PREFIX: &str = "id_prefix";
pub const ID_WIDTH: &str = "id_width";
pub const TYPE_OPTIONS: &str = "type_options";
pub const PRIORITY_OPTIONS: &str = "priority_options";
pub const HIGH_PRIORITIES: &str = "high_priorities";
pub const PRODUCT_OPTIONS: &str = "product_options";
pub const MODULE_OPTIONS: &str = "module_options";
pub const CUSTOM_COLUMNS: &str = "custom_columns";

pub trait SettingsStore {
    /// Returns the stored value for `key`, or `default` when unset.
    fn get(&self, key: &str, default: Value) -> Result<Value, AppError>;

    fn set(&mut self, key: &str, value: Value) -> Result<(), AppError>;

    fn entries(&self) -> Result<BTreeMap<String, Value>, AppError>;
}

pub fn default_value(key: &str) -> Value {
    match key {
        STATUS_OPTIONS => json!([
            "Not Started",
            "In Progress",
            "Completed",
            "Pending from User",
            "On Hold"
        ]),
        INITIAL_STATUS => json!("Not Started"),
        COMPLETED_STATUS => json!("Completed"),
        ID_PREFIX => json!("T"),
        ID_WIDTH => json!(3),
        TYPE_OPTIONS => json!(["Bug", "Feature", "Task"]),
        PRIORITY_OPTIONS => json!(["Low", "Medium", "High", "Critical"]),
        HIGH_PRIORITIES => json!(["High", "Critical"]),
        PRODUCT_OPTIONS => json!(["Finance", "Procurement", "OIC", "ROSS", "E-Invoice"]),
        MODULE_OPTIONS => json!([
            "Authentication",
            "Dashboard",
            "Reports",
            "Settings",
            "User Management",
            "Task Management"
        ]),
        CUSTOM_COLUMNS => json!([]),
        _ => Value::Null,
    }
}

pub const KNOWN_KEYS: [&str; 11] = [
    STATUS_OPTIONS,
    INITIAL_STATUS,
    COMPLETED_STATUS,
    ID_PREFIX,
    ID_WIDTH,
    TYPE_OPTIONS,
    PRIORITY_OPTIONS,
    HIGH_PRIORITIES,
    PRODUCT_OPTIONS,
    MODULE_OPTIONS,
    CUSTOM_COLUMNS,
];

/// Every known setting with its default filled in, plus any extra stored keys.
pub fn effective_settings(store: &dyn SettingsStore) -> Result<BTreeMap<String, Value>, AppError> {
    let mut resolved = store.entries()?;
    for key in KNOWN_KEYS {
        if !resolved.contains_key(key) {
            resolved.insert(key.to_string(), default_value(key));
        }
    }
    if let Some(columns) = resolved.get_mut(CUSTOM_COLUMNS) {
        *columns = serde_json::to_value(normalize_custom_columns(columns))
            .map_err(|err| AppError::invalid_data(err.to_string()))?;
    }
    Ok(resolved)
}

fn get_or_default(store: &dyn SettingsStore, key: &str) -> Result<Value, AppError> {
    store.get(key, default_value(key))
}

fn string_setting(store: &dyn SettingsStore, key: &str) -> Result<String, AppError> {
    match get_or_default(store, key)? {
        Value::String(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        other => Err(AppError::invalid_data(format!(
            "setting '{key}' must be a non-empty string, got {other}"
        ))),
    }
}

fn string_list_setting(store: &dyn SettingsStore, key: &str) -> Result<Vec<String>, AppError> {
    let value = get_or_default(store, key)?;
    let items = value.as_array().ok_or_else(|| {
        AppError::invalid_data(format!("setting '{key}' must be a list of strings"))
    })?;

    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(|text| text.trim().to_string())
                .ok_or_else(|| {
                    AppError::invalid_data(format!("setting '{key}' must be a list of strings"))
                })
        })
        .collect()
}

/// Identity and status rules applied to every record mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskPolicy {
    pub allowed_statuses: Vec<String>,
    pub initial_status: String,
    pub id_prefix: String,
    pub id_width: usize,
}

impl TaskPolicy {
    pub fn resolve(store: &dyn SettingsStore) -> Result<Self, AppError> {
        let allowed_statuses = string_list_setting(store, STATUS_OPTIONS)?;
        if allowed_statuses.is_empty() {
            return Err(AppError::invalid_data("setting 'status_options' is empty"));
        }

        let id_width = get_or_default(store, ID_WIDTH)?
            .as_u64()
            .filter(|width| (1..=12).contains(width))
            .ok_or_else(|| AppError::invalid_data("setting 'id_width' must be between 1 and 12"))?;

        // Ids are read back as prefix plus trailing digits.
        let id_prefix = string_setting(store, ID_PREFIX)?;
        if id_prefix.ends_with(|ch: char| ch.is_ascii_digit()) {
            return Err(AppError::invalid_data(format!(
                "setting 'id_prefix' must not end in a digit, got '{id_prefix}'"
            )));
        }

        Ok(Self {
            allowed_statuses,
            initial_status: string_setting(store, INITIAL_STATUS)?,
            id_prefix,
            id_width: id_width as usize,
        })
    }

    pub fn check_status(&self, status: &str) -> Result<(), AppError> {
        let trimmed = status.trim();
        if trimmed.is_empty() {
            return Err(AppError::validation("status is required"));
        }
        if !self.allowed_statuses.iter().any(|allowed| allowed == trimmed) {
            return Err(AppError::validation(format!(
                "invalid status '{trimmed}' (allowed: {})",
                self.allowed_statuses.join(", ")
            )));
        }
        Ok(())
    }

    pub fn format_id(&self, sequence: u64) -> String {
        format!("{}{:0width$}", self.id_prefix, sequence, width = self.id_width)
    }
}

/// Inputs for the analytics and stand-up summaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyticsOptions {
    pub completed_status: String,
    pub high_priorities: Vec<String>,
}

impl AnalyticsOptions {
    pub fn resolve(store: &dyn SettingsStore) -> Result<Self, AppError> {
        Ok(Self {
            completed_status: string_setting(store, COMPLETED_STATUS)?,
            high_priorities: string_list_setting(store, HIGH_PRIORITIES)?,
        })
    }
}

impl Default for AnalyticsOptions {
    fn default() -> Self {
        Self {
            completed_status: "Completed".to_string(),
            high_priorities: vec!["High".to_string(), "Critical".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomColumn {
    pub name: String,
    #[serde(rename = "type", default = "text_kind")]
    pub kind: String,
}

fn text_kind() -> String {
    "text".to_string()
}

/// Accepts both bare names and `{name, type}` objects; drops anything else.
pub fn normalize_custom_columns(value: &Value) -> Vec<CustomColumn> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match item {
            Value::String(name) if !name.trim().is_empty() => Some(CustomColumn {
                name: name.trim().to_string(),
                kind: text_kind(),
            }),
            Value::Object(_) => serde_json::from_value::<CustomColumn>(item.clone())
                .ok()
                .filter(|column| !column.name.trim().is_empty()),
            _ => None,
        })
        .collect()
}

pub fn custom_columns(store: &dyn SettingsStore) -> Result<Vec<CustomColumn>, AppError> {
    Ok(normalize_custom_columns(&get_or_default(store, CUSTOM_COLUMNS)?))
}

/// Registers a custom column; re-adding an existing name updates its kind.
pub fn add_custom_column(
    store: &mut dyn SettingsStore,
    name: &str,
    kind: &str,
) -> Result<Vec<CustomColumn>, AppError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation("column name is required"));
    }

    let mut columns = custom_columns(&*store)?;
    let kind = if kind.trim().is_empty() {
        text_kind()
    } else {
        kind.trim().to_string()
    };
    match columns.iter_mut().find(|column| column.name == trimmed) {
        Some(existing) => existing.kind = kind,
        None => columns.push(CustomColumn {
            name: trimmed.to_string(),
            kind,
        }),
    }

    let value =
        serde_json::to_value(&columns).map_err(|err| AppError::invalid_data(err.to_string()))?;
    store.set(CUSTOM_COLUMNS, value)?;
    Ok(columns)
}
