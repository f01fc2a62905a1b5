use crate::dates;
use crate::error::AppError;
use crate::model::custom_fields::{self, CustomFields};
use crate::model::ledger::{ActionPlanLedger, LedgerEntry};
use crate::settings::TaskPolicy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use time::Date;

/// Days ahead of the due date at which a task counts as due soon.
const DUE_SOON_DAYS: i64 = 3;

/// The fixed scalar columns of a task, in export order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScalarField {
    Type,
    Product,
    Module,
    Description,
    Status,
    Priority,
    Category,
    CreatedDate,
    DueDate,
    StatusUpdateDate,
    ActionPlanStatus,
}

impl ScalarField {
    pub const ALL: [ScalarField; 11] = [
        ScalarField::Type,
        ScalarField::Product,
        ScalarField::Module,
        ScalarField::Description,
        ScalarField::Status,
        ScalarField::Priority,
        ScalarField::Category,
        ScalarField::CreatedDate,
        ScalarField::DueDate,
        ScalarField::StatusUpdateDate,
        ScalarField::ActionPlanStatus,
    ];

    pub fn column(self) -> &'static str {
        match self {
            Self::Type => "type",
            Self::Product => "product",
            Self::Module => "module",
            Self::Description => "description",
            Self::Status => "status",
            Self::Priority => "priority",
            Self::Category => "category",
            Self::CreatedDate => "created_date",
            Self::DueDate => "due_date",
            Self::StatusUpdateDate => "status_update_date",
            Self::ActionPlanStatus => "action_plan_status",
        }
    }

    pub fn from_column(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.column() == name)
    }

    pub fn is_date(self) -> bool {
        matches!(
            self,
            Self::CreatedDate | Self::DueDate | Self::StatusUpdateDate
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanUpdate {
    pub text: String,
    pub source: String,
}

/// Partial change set for a task.
///
/// A scalar mapped to an empty string clears an optional field. `created_date`
/// is honored only at creation; custom-field values of `null` remove the key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub scalars: BTreeMap<ScalarField, String>,
    pub action_plan: Option<PlanUpdate>,
    pub custom_fields: BTreeMap<String, Value>,
}

impl TaskPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: ScalarField, value: &str) -> Self {
        self.scalars.insert(field, value.to_string());
        self
    }

    pub fn plan(mut self, text: &str, source: &str) -> Self {
        self.action_plan = Some(PlanUpdate {
            text: text.to_string(),
            source: source.to_string(),
        });
        self
    }

    pub fn custom(mut self, key: &str, value: Value) -> Self {
        self.custom_fields.insert(key.to_string(), value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.scalars.is_empty() && self.action_plan.is_none() && self.custom_fields.is_empty()
    }

    /// Checks every part of the patch without touching any record.
    pub fn validate(&self, policy: &TaskPolicy) -> Result<(), AppError> {
        for (field, raw) in &self.scalars {
            let value = raw.trim();
            if *field == ScalarField::Status {
                policy.check_status(value)?;
            } else if field.is_date() && !value.is_empty() {
                dates::parse_flexible(value)
                    .map_err(|err| AppError::validation(format!("{}: {}", field.column(), err.message())))?;
            }
        }

        if let Some(plan) = &self.action_plan
            && plan.text.trim().is_empty()
        {
            return Err(AppError::validation("action plan text is required"));
        }

        Ok(())
    }
}

/// What an update actually changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Changes {
    pub scalars: bool,
    pub custom_fields: bool,
    pub plan_appended: bool,
}

impl Changes {
    pub fn fields_changed(&self) -> bool {
        self.scalars || self.custom_fields
    }

    pub fn any(&self) -> bool {
        self.fields_changed() || self.plan_appended
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueState {
    Overdue,
    DueToday,
    DueSoon,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    id: String,
    #[serde(rename = "type", default)]
    task_type: Option<String>,
    #[serde(default)]
    product: Option<String>,
    #[serde(default)]
    module: Option<String>,
    #[serde(default)]
    description: Option<String>,
    status: String,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    category: Option<String>,
    created_date: String,
    #[serde(default)]
    due_date: Option<String>,
    #[serde(default)]
    status_update_date: Option<String>,
    #[serde(default)]
    action_plan_status: Option<String>,
    #[serde(default)]
    action_plan_history: ActionPlanLedger,
    #[serde(default, with = "custom_fields::column")]
    custom_fields: CustomFields,
    #[serde(default)]
    deleted: bool,
}

impl TaskRecord {
    /// Builds a new record under an already allocated `id`.
    pub fn create(
        id: String,
        patch: TaskPatch,
        policy: &TaskPolicy,
        today: Date,
    ) -> Result<Self, AppError> {
        let mut patch = patch;
        let status = patch
            .scalars
            .remove(&ScalarField::Status)
            .map(|value| value.trim().to_string())
            .unwrap_or_else(|| policy.initial_status.clone());
        policy.check_status(&status)?;
        patch.validate(policy)?;

        let created_date = match patch.scalars.remove(&ScalarField::CreatedDate) {
            Some(raw) if !raw.trim().is_empty() => dates::normalize(&raw)?,
            _ => dates::format_iso(today)?,
        };

        let mut record = Self {
            id,
            task_type: None,
            product: None,
            module: None,
            description: None,
            status,
            priority: None,
            category: None,
            created_date,
            due_date: None,
            status_update_date: None,
            action_plan_status: None,
            action_plan_history: ActionPlanLedger::new(),
            custom_fields: CustomFields::new(),
            deleted: false,
        };
        let snapshot = record.clone();
        record.apply(patch, today)?;
        record.check_invariants(&snapshot)?;

        Ok(record)
    }

    /// Applies `patch` as one unit: on error the record is left untouched.
    pub fn update(
        &mut self,
        patch: TaskPatch,
        policy: &TaskPolicy,
        today: Date,
    ) -> Result<Changes, AppError> {
        patch.validate(policy)?;

        if let Some(raw) = patch.scalars.get(&ScalarField::CreatedDate)
            && !raw.trim().is_empty()
            && dates::normalize(raw)? != self.created_date
        {
            return Err(AppError::validation("created_date cannot be changed"));
        }

        let mut next = self.clone();
        let changes = next.apply(patch, today)?;
        next.check_invariants(self)?;
        *self = next;

        Ok(changes)
    }

    /// Marks the record deleted. Returns false when it already was.
    pub fn soft_delete(&mut self) -> bool {
        let changed = !self.deleted;
        self.deleted = true;
        changed
    }

    pub fn restore(&mut self) -> bool {
        let changed = self.deleted;
        self.deleted = false;
        changed
    }

    fn apply(&mut self, patch: TaskPatch, today: Date) -> Result<Changes, AppError> {
        let mut changes = Changes::default();
        let explicit_status_date = patch.scalars.contains_key(&ScalarField::StatusUpdateDate);

        for (field, raw) in patch.scalars {
            let value = raw.trim();
            match field {
                ScalarField::CreatedDate => {}
                ScalarField::Status => {
                    if value != self.status {
                        self.status = value.to_string();
                        if !explicit_status_date {
                            self.status_update_date = Some(dates::format_iso(today)?);
                        }
                        changes.scalars = true;
                    }
                }
                _ => {
                    let next = if value.is_empty() {
                        None
                    } else if field.is_date() {
                        Some(dates::normalize(value)?)
                    } else {
                        Some(value.to_string())
                    };
                    if let Some(slot) = self.optional_slot(field)
                        && *slot != next
                    {
                        *slot = next;
                        changes.scalars = true;
                    }
                }
            }
        }

        if let Some(plan) = patch.action_plan {
            self.action_plan_history
                .append(LedgerEntry::new(&plan.source, &plan.text)?)?;
            changes.plan_appended = true;
        }

        changes.custom_fields = self.custom_fields.merge(patch.custom_fields);

        Ok(changes)
    }

    fn optional_slot(&mut self, field: ScalarField) -> Option<&mut Option<String>> {
        match field {
            ScalarField::Type => Some(&mut self.task_type),
            ScalarField::Product => Some(&mut self.product),
            ScalarField::Module => Some(&mut self.module),
            ScalarField::Description => Some(&mut self.description),
            ScalarField::Priority => Some(&mut self.priority),
            ScalarField::Category => Some(&mut self.category),
            ScalarField::DueDate => Some(&mut self.due_date),
            ScalarField::StatusUpdateDate => Some(&mut self.status_update_date),
            ScalarField::ActionPlanStatus => Some(&mut self.action_plan_status),
            ScalarField::Status | ScalarField::CreatedDate => None,
        }
    }

    fn check_invariants(&self, before: &TaskRecord) -> Result<(), AppError> {
        if self.id != before.id {
            return Err(AppError::invalid_data("task id changed during update"));
        }
        if self.created_date != before.created_date {
            return Err(AppError::invalid_data("created_date changed during update"));
        }
        if self.status.trim().is_empty() {
            return Err(AppError::invalid_data("status became empty"));
        }
        if self.action_plan_history.len() < before.action_plan_history.len()
            || self.action_plan_history.history()[..before.action_plan_history.len()]
                != *before.action_plan_history.history()
        {
            return Err(AppError::invalid_data("action plan history was rewritten"));
        }
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn created_date(&self) -> &str {
        &self.created_date
    }

    pub fn due_date(&self) -> Option<&str> {
        self.due_date.as_deref()
    }

    pub fn scalar(&self, field: ScalarField) -> Option<&str> {
        match field {
            ScalarField::Type => self.task_type.as_deref(),
            ScalarField::Product => self.product.as_deref(),
            ScalarField::Module => self.module.as_deref(),
            ScalarField::Description => self.description.as_deref(),
            ScalarField::Status => Some(&self.status),
            ScalarField::Priority => self.priority.as_deref(),
            ScalarField::Category => self.category.as_deref(),
            ScalarField::CreatedDate => Some(&self.created_date),
            ScalarField::DueDate => self.due_date.as_deref(),
            ScalarField::StatusUpdateDate => self.status_update_date.as_deref(),
            ScalarField::ActionPlanStatus => self.action_plan_status.as_deref(),
        }
    }

    pub fn current_action_plan(&self) -> &str {
        self.action_plan_history.current()
    }

    pub fn action_plan_history(&self) -> &ActionPlanLedger {
        &self.action_plan_history
    }

    pub fn custom_fields(&self) -> &CustomFields {
        &self.custom_fields
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn due_state(&self, today: Date, completed_status: &str) -> Result<DueState, AppError> {
        let Some(due_date) = self.due_date.as_deref() else {
            return Ok(DueState::None);
        };
        if self.status == completed_status {
            return Ok(DueState::None);
        }

        let due = dates::parse_iso(due_date)?;
        let days_left = (due - today).whole_days();
        Ok(if days_left < 0 {
            DueState::Overdue
        } else if days_left == 0 {
            DueState::DueToday
        } else if days_left <= DUE_SOON_DAYS {
            DueState::DueSoon
        } else {
            DueState::None
        })
    }
}

/// Numeric part of an id such as `T042`. Id prefixes never end in a digit,
/// so every trailing digit belongs to the sequence.
pub fn sequence_of(id: &str) -> Option<u64> {
    let digits_start = id
        .char_indices()
        .rev()
        .take_while(|(_, ch)| ch.is_ascii_digit())
        .last()
        .map(|(index, _)| index)?;
    id[digits_start..].parse().ok()
}
