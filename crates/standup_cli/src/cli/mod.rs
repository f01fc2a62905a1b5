use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use standup_core::config::{ConfigOverrides, canonical_name};
use standup_core::error::AppError;
use standup_core::model::{ScalarField, TaskPatch};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "standup", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Output JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Override configuration values (format KEY=VALUE)
    #[arg(long = "config-override", value_name = "KEY=VALUE", global = true)]
    pub config_override: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Add a new task
    ///
    /// Example: standup add --type Bug --description "Login fails" --plan "reproduce"
    Add {
        #[command(flatten)]
        fields: TaskFields,
        /// Initial action plan
        #[arg(long)]
        plan: Option<String>,
    },
    /// Edit a task's fields; an empty value clears an optional field
    ///
    /// Example: standup edit T001 --priority High --field Sprint=4
    Edit {
        id: String,
        #[command(flatten)]
        fields: TaskFields,
        /// New action plan; the previous one stays in the history
        #[arg(long)]
        plan: Option<String>,
    },
    /// Record a stand-up action plan update
    ///
    /// Example: standup plan T001 "escalated to team lead"
    Plan {
        id: String,
        text: String,
        /// Ledger source label
        #[arg(long)]
        source: Option<String>,
    },
    /// Archive a task
    ///
    /// Example: standup delete T001
    Delete { id: String },
    /// Bring an archived task back
    ///
    /// Example: standup restore T001
    Restore { id: String },
    /// Show details of a task, including the action plan history
    ///
    /// Example: standup show T001
    Show { id: String },
    /// List tasks
    ///
    /// Example: standup list
    /// Example: standup list --archived
    List {
        /// Only archived tasks
        #[arg(long, conflicts_with = "all")]
        archived: bool,
        /// Active and archived tasks
        #[arg(long)]
        all: bool,
    },
    /// Reconcile a CSV file into the task store
    ///
    /// Example: standup import tasks.csv
    /// Example: standup import tasks.csv --update-only
    Import {
        file: PathBuf,
        /// Only update rows whose id matches an active task
        #[arg(long)]
        update_only: bool,
    },
    /// Export active tasks as CSV
    ///
    /// Example: standup export --output tasks.csv
    Export {
        /// Write to a file instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
    /// Show completion analytics
    ///
    /// Example: standup analytics
    /// Example: standup analytics --csv --output report.csv
    Analytics {
        /// Write the sectioned CSV report
        #[arg(long, conflicts_with = "standup")]
        csv: bool,
        /// Show the short stand-up summary instead
        #[arg(long)]
        standup: bool,
        #[arg(long, short = 'o', requires = "csv")]
        output: Option<PathBuf>,
    },
    /// Read or change app settings
    Settings {
        #[command(subcommand)]
        action: SettingsCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum SettingsCommand {
    /// Print every setting with defaults filled in
    ///
    /// Example: standup settings show
    Show,
    /// Set a setting; VALUE is parsed as JSON, or taken as text
    ///
    /// Example: standup settings set id_prefix BUG
    /// Example: standup settings set status_options '["Open","Closed"]'
    Set { key: String, value: String },
    /// Register a custom column
    ///
    /// Example: standup settings add-column Owner
    AddColumn {
        name: String,
        #[arg(long, default_value = "text")]
        kind: String,
    },
}

/// Scalar and custom-field flags shared by `add` and `edit`.
#[derive(Args, Debug, Default)]
pub struct TaskFields {
    #[arg(long = "type", value_name = "TYPE")]
    pub task_type: Option<String>,
    #[arg(long)]
    pub product: Option<String>,
    #[arg(long)]
    pub module: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub status: Option<String>,
    #[arg(long)]
    pub priority: Option<String>,
    #[arg(long)]
    pub category: Option<String>,
    #[arg(long, value_name = "DATE")]
    pub created_date: Option<String>,
    #[arg(long, value_name = "DATE")]
    pub due_date: Option<String>,
    #[arg(long, value_name = "DATE")]
    pub status_update_date: Option<String>,
    #[arg(long)]
    pub action_plan_status: Option<String>,
    /// Custom field (format KEY=VALUE; VALUE is parsed as JSON, or taken as
    /// text; `null` removes the field)
    #[arg(long = "field", value_name = "KEY=VALUE")]
    pub custom: Vec<String>,
}

impl TaskFields {
    fn scalars(&self) -> [(ScalarField, Option<&String>); 11] {
        [
            (ScalarField::Type, self.task_type.as_ref()),
            (ScalarField::Product, self.product.as_ref()),
            (ScalarField::Module, self.module.as_ref()),
            (ScalarField::Description, self.description.as_ref()),
            (ScalarField::Status, self.status.as_ref()),
            (ScalarField::Priority, self.priority.as_ref()),
            (ScalarField::Category, self.category.as_ref()),
            (ScalarField::CreatedDate, self.created_date.as_ref()),
            (ScalarField::DueDate, self.due_date.as_ref()),
            (ScalarField::StatusUpdateDate, self.status_update_date.as_ref()),
            (ScalarField::ActionPlanStatus, self.action_plan_status.as_ref()),
        ]
    }

    /// Builds the patch for these flags plus an optional plan update.
    pub fn to_patch(&self, plan: Option<&str>, plan_source: &str) -> Result<TaskPatch, AppError> {
        let mut patch = TaskPatch::new();
        for (field, value) in self.scalars() {
            if let Some(value) = value {
                patch = patch.set(field, value);
            }
        }
        if let Some(text) = plan {
            patch = patch.plan(text, plan_source);
        }
        for raw in &self.custom {
            let (key, value) = parse_custom_field(raw)?;
            patch = patch.custom(&key, value);
        }
        Ok(patch)
    }
}

/// Parses `KEY=VALUE`. The value is JSON when it parses as JSON, text otherwise.
pub fn parse_custom_field(raw: &str) -> Result<(String, Value), AppError> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| AppError::invalid_input("custom field must be in KEY=VALUE format"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(AppError::invalid_input("custom field name cannot be empty"));
    }
    Ok((key.to_string(), parse_loose_json(value)))
}

/// JSON if `raw` is valid JSON, otherwise the trimmed text as a string.
pub fn parse_loose_json(raw: &str) -> Value {
    let trimmed = raw.trim();
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOverrideTarget {
    StorePath,
    SettingsPath,
    LogFilter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedConfigOverride {
    pub target: ConfigOverrideTarget,
    pub value: String,
}

/// Parse a raw `KEY=VALUE` override string into a structured target.
pub fn parse_config_override(raw: &str) -> Result<ParsedConfigOverride, String> {
    let trimmed = raw.trim();
    let (key_raw, value_raw) = trimmed
        .split_once('=')
        .ok_or_else(|| "override must be in KEY=VALUE format".to_string())?;

    let value = value_raw.trim().to_string();
    let canonical_field =
        canonical_name(key_raw).ok_or_else(|| "override key cannot be empty".to_string())?;

    let target = match canonical_field.as_str() {
        "store_path" | "store" => ConfigOverrideTarget::StorePath,
        "settings_path" | "settings" => ConfigOverrideTarget::SettingsPath,
        "log_filter" | "log" => ConfigOverrideTarget::LogFilter,
        other => return Err(format!("unknown config field '{other}'")),
    };
    if value.is_empty() {
        return Err(format!("override '{canonical_field}' needs a value"));
    }

    Ok(ParsedConfigOverride { target, value })
}

/// Folds every `--config-override` into one set; later flags win.
pub fn collect_overrides(raw: &[String]) -> Result<ConfigOverrides, AppError> {
    let mut overrides = ConfigOverrides::default();
    for item in raw {
        let parsed = parse_config_override(item).map_err(AppError::invalid_input)?;
        match parsed.target {
            ConfigOverrideTarget::StorePath => overrides.store_path = Some(parsed.value.into()),
            ConfigOverrideTarget::SettingsPath => {
                overrides.settings_path = Some(parsed.value.into())
            }
            ConfigOverrideTarget::LogFilter => overrides.log_filter = Some(parsed.value),
        }
    }
    Ok(overrides)
}
