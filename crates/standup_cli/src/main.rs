use clap::Parser;
use clap::error::ErrorKind;
use serde_json::{Map, Value, json};
use standup_cli::cli::{Cli, Command, SettingsCommand, collect_overrides, parse_loose_json};
use standup_core::analytics::{self, AnalyticsReport, Breakdown, StandupSummary};
use standup_core::config::{self, Config};
use standup_core::dates;
use standup_core::error::AppError;
use standup_core::model::ledger::{SOURCE_EDIT, SOURCE_STANDUP};
use standup_core::model::custom_fields::render_cell;
use standup_core::model::{DueState, ScalarField, TaskRecord};
use standup_core::reconcile::{self, ImportMode, ImportReport};
use standup_core::settings::{
    AnalyticsOptions, KNOWN_KEYS, SettingsStore, add_custom_column, effective_settings,
};
use standup_core::storage::TaskFilter;
use standup_core::storage::json_store::{self, JsonSettingsStore, JsonTaskStore};
use standup_core::task_api;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;
use tabled::settings::Style;
use tabled::{Table, Tabled};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Tabled)]
struct TaskRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Type")]
    task_type: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Priority")]
    priority: String,
    #[tabled(rename = "Due")]
    due: String,
    #[tabled(rename = "Description")]
    description: String,
    #[tabled(rename = "Action Plan")]
    plan: String,
}

#[derive(Tabled)]
struct BreakdownRow {
    #[tabled(rename = "Group")]
    name: String,
    #[tabled(rename = "Total")]
    total: usize,
    #[tabled(rename = "Completed")]
    completed: usize,
    #[tabled(rename = "Rate (%)")]
    rate: f64,
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(config.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER))
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn io_error(path: &Path, err: io::Error) -> AppError {
    AppError::io(format!("{}: {}", path.display(), err))
}

fn due_label(task: &TaskRecord, today: time::Date, completed_status: &str) -> Result<String, AppError> {
    let Some(due_date) = task.due_date() else {
        return Ok("-".to_string());
    };
    let suffix = match task.due_state(today, completed_status)? {
        DueState::Overdue => " (overdue)",
        DueState::DueToday => " (today)",
        DueState::DueSoon => " (soon)",
        DueState::None => "",
    };
    Ok(format!("{due_date}{suffix}"))
}

fn task_json(task: &TaskRecord) -> Value {
    let mut object = Map::new();
    object.insert("id".to_string(), json!(task.id()));
    for field in ScalarField::ALL {
        object.insert(field.column().to_string(), json!(task.scalar(field)));
    }
    object.insert(
        "current_action_plan".to_string(),
        json!(task.current_action_plan()),
    );
    object.insert(
        "action_plan_history".to_string(),
        json!(task.action_plan_history().history()),
    );
    let custom: Map<String, Value> = task
        .custom_fields()
        .iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    object.insert("custom_fields".to_string(), Value::Object(custom));
    object.insert("deleted".to_string(), json!(task.is_deleted()));
    Value::Object(object)
}

fn print_task_json(task: &TaskRecord) {
    println!("{}", task_json(task));
}

fn print_task_details(task: &TaskRecord) {
    println!("ID: {}", task.id());
    for field in ScalarField::ALL {
        println!("{}: {}", field.column(), task.scalar(field).unwrap_or("-"));
    }
    if task.is_deleted() {
        println!("deleted: yes");
    }
    println!("current_action_plan: {}", task.current_action_plan());

    let history = task.action_plan_history().history();
    if !history.is_empty() {
        println!("action_plan_history:");
        for entry in history {
            println!("  {} [{}] {}", entry.timestamp(), entry.source(), entry.text());
        }
    }
    if !task.custom_fields().is_empty() {
        println!("custom_fields:");
        for (key, value) in task.custom_fields().iter() {
            println!("  {}: {}", key, render_cell(value));
        }
    }
}

fn print_tasks_plain(tasks: &[TaskRecord], completed_status: &str) -> Result<(), AppError> {
    if tasks.is_empty() {
        println!("No tasks.");
        return Ok(());
    }

    let today = dates::local_today();
    let mut rows = Vec::with_capacity(tasks.len());
    for task in tasks {
        rows.push(TaskRow {
            id: task.id().to_string(),
            task_type: task.scalar(ScalarField::Type).unwrap_or("-").to_string(),
            status: task.status().to_string(),
            priority: task.scalar(ScalarField::Priority).unwrap_or("-").to_string(),
            due: due_label(task, today, completed_status)?,
            description: task
                .scalar(ScalarField::Description)
                .unwrap_or("-")
                .to_string(),
            plan: task.current_action_plan().to_string(),
        });
    }
    let mut table = Table::new(rows);
    table.with(Style::psql());
    println!("{table}");
    Ok(())
}

fn print_tasks_json(tasks: &[TaskRecord]) {
    let payload: Vec<Value> = tasks.iter().map(task_json).collect();
    println!("{}", Value::Array(payload));
}

fn print_import_report(path: &Path, report: &ImportReport) {
    println!(
        "Imported {}: {} inserted, {} updated, {} unchanged, {} plan appends, {} skipped",
        path.display(),
        report.inserted,
        report.updated,
        report.unchanged,
        report.plan_appends,
        report.skipped.len()
    );
    for skipped in &report.skipped {
        println!("  row {}: {}", skipped.row_number, skipped.reason);
    }
}

fn print_breakdown(title: &str, groups: &BTreeMap<String, Breakdown>) {
    if groups.is_empty() {
        return;
    }
    let rows = groups.iter().map(|(name, group)| BreakdownRow {
        name: name.clone(),
        total: group.total,
        completed: group.completed,
        rate: group.completion_rate,
    });
    let mut table = Table::new(rows);
    table.with(Style::psql());
    println!("\n{title}\n{table}");
}

fn print_report_plain(report: &AnalyticsReport) {
    println!("Total tasks: {}", report.total_tasks);
    println!(
        "Completed: {} ({}%)",
        report.completed_tasks, report.overall_completion_rate
    );
    println!("Overdue: {}", report.overdue_tasks);
    println!("Avg created per day (30 days): {}", report.avg_tasks_per_day);
    for (status, count) in &report.by_status {
        println!("  {status}: {count}");
    }
    print_breakdown("By type", &report.by_type);
    print_breakdown("By product", &report.by_product);
    print_breakdown("By module", &report.by_module);
    print_breakdown("By priority", &report.by_priority);
    print_breakdown("By category", &report.by_category);
}

fn print_summary_plain(summary: &StandupSummary) {
    println!("Active tasks: {}", summary.total);
    println!("In progress: {}", summary.in_progress);
    println!("Completed this week: {}", summary.completed_this_week);
    println!("Open high priority: {}", summary.high_priority_open);
    let list = |ids: &[String]| {
        if ids.is_empty() {
            "-".to_string()
        } else {
            ids.join(", ")
        }
    };
    println!("Overdue: {}", list(&summary.overdue_open));
    println!("Due today: {}", list(&summary.due_today));
}

fn open_stores(config: &Config) -> Result<(JsonTaskStore, JsonSettingsStore), AppError> {
    let tasks = JsonTaskStore::new(json_store::store_path(config.store_path.as_deref())?);
    let settings =
        JsonSettingsStore::new(json_store::settings_path(config.settings_path.as_deref())?);
    tracing::debug!(store = %tasks.path().display(), "stores opened");
    Ok((tasks, settings))
}

fn run_command(cli: Cli, config: &Config) -> Result<(), AppError> {
    let (mut tasks, mut settings) = open_stores(config)?;

    match cli.command {
        Command::Add { fields, plan } => {
            let patch = fields.to_patch(plan.as_deref(), SOURCE_STANDUP)?;
            let task = task_api::create_task(&mut tasks, &settings, patch)?;
            if cli.json {
                print_task_json(&task);
            } else {
                println!("Added task: {} ({})", task.id(), task.status());
            }
        }
        Command::Edit { id, fields, plan } => {
            let patch = fields.to_patch(plan.as_deref(), SOURCE_EDIT)?;
            if patch.is_empty() {
                return Err(AppError::invalid_input("nothing to change"));
            }
            let task = task_api::update_task(&mut tasks, &settings, &id, patch)?;
            if cli.json {
                print_task_json(&task);
            } else {
                println!("Updated task: {}", task.id());
            }
        }
        Command::Plan { id, text, source } => {
            let task =
                task_api::append_action_plan(&mut tasks, &settings, &id, &text, source.as_deref())?;
            if cli.json {
                print_task_json(&task);
            } else {
                println!("Updated action plan: {}", task.id());
            }
        }
        Command::Delete { id } => {
            let task = task_api::soft_delete_task(&mut tasks, &id)?;
            if cli.json {
                print_task_json(&task);
            } else {
                println!("Deleted task: {}", task.id());
            }
        }
        Command::Restore { id } => {
            let task = task_api::restore_task(&mut tasks, &id)?;
            if cli.json {
                print_task_json(&task);
            } else {
                println!("Restored task: {}", task.id());
            }
        }
        Command::Show { id } => {
            let task = task_api::get_task(&tasks, &id)?;
            if cli.json {
                print_task_json(&task);
            } else {
                print_task_details(&task);
            }
        }
        Command::List { archived, all } => {
            let filter = if all {
                TaskFilter::All
            } else if archived {
                TaskFilter::Archived
            } else {
                TaskFilter::Active
            };
            let listed = task_api::list_tasks(&tasks, filter)?;
            if cli.json {
                print_tasks_json(&listed);
            } else {
                let options = AnalyticsOptions::resolve(&settings)?;
                print_tasks_plain(&listed, &options.completed_status)?;
            }
        }
        Command::Import { file, update_only } => {
            let mode = if update_only {
                ImportMode::UpdateOnly
            } else {
                ImportMode::Upsert
            };
            let input = File::open(&file).map_err(|err| io_error(&file, err))?;
            let report =
                reconcile::import_csv(BufReader::new(input), &mut tasks, &settings, mode)?;
            if cli.json {
                println!("{}", json!(report));
            } else {
                print_import_report(&file, &report);
            }
            if let Some(aborted) = &report.aborted {
                return Err(AppError::storage(format!(
                    "import stopped at row {}: {} - {}",
                    aborted.row_number, aborted.code, aborted.message
                )));
            }
        }
        Command::Export { output } => match output {
            Some(path) => {
                let file = File::create(&path).map_err(|err| io_error(&path, err))?;
                let summary = reconcile::export_csv(&tasks, BufWriter::new(file))?;
                if cli.json {
                    println!("{}", json!(summary));
                } else {
                    println!("Exported {} tasks to {}", summary.rows, path.display());
                }
            }
            None => {
                reconcile::export_csv(&tasks, io::stdout().lock())?;
            }
        },
        Command::Analytics {
            csv,
            standup,
            output,
        } => {
            if standup {
                let summary = task_api::standup_summary(&tasks, &settings)?;
                if cli.json {
                    println!("{}", json!(summary));
                } else {
                    print_summary_plain(&summary);
                }
                return Ok(());
            }

            let report = task_api::analytics_report(&tasks, &settings)?;
            if csv {
                let generated_at = dates::now_rfc3339()?;
                match output {
                    Some(path) => {
                        let file = File::create(&path).map_err(|err| io_error(&path, err))?;
                        let mut writer = BufWriter::new(file);
                        analytics::write_report_csv(&report, &generated_at, &mut writer)?;
                        writer.flush().map_err(|err| io_error(&path, err))?;
                        if !cli.json {
                            println!("Wrote analytics report to {}", path.display());
                        }
                    }
                    None => analytics::write_report_csv(&report, &generated_at, io::stdout().lock())?,
                }
            } else if cli.json {
                println!("{}", json!(report));
            } else {
                print_report_plain(&report);
            }
        }
        Command::Settings { action } => match action {
            SettingsCommand::Show => {
                let resolved = effective_settings(&settings)?;
                if cli.json {
                    println!("{}", json!(resolved));
                } else {
                    for (key, value) in &resolved {
                        println!("{key}: {value}");
                    }
                }
            }
            SettingsCommand::Set { key, value } => {
                let key = config::canonical_name(&key)
                    .filter(|key| KNOWN_KEYS.contains(&key.as_str()))
                    .ok_or_else(|| AppError::invalid_input(format!("unknown setting '{key}'")))?;
                let value = parse_loose_json(&value);
                settings.set(&key, value.clone())?;
                tracing::info!(key = %key, "setting updated");
                if cli.json {
                    println!("{}", json!({ "key": key, "value": value }));
                } else {
                    println!("Updated setting: {key} = {value}");
                }
            }
            SettingsCommand::AddColumn { name, kind } => {
                let columns = add_custom_column(&mut settings, &name, &kind)?;
                if cli.json {
                    println!("{}", json!(columns));
                } else {
                    println!("Added column: {} ({})", name.trim(), kind.trim());
                }
            }
        },
    }

    Ok(())
}

fn normalize_parse_error(err: clap::Error) -> AppError {
    let rendered = err.to_string();
    let first_line = rendered.lines().next().unwrap_or("invalid command").trim();
    let message = first_line
        .strip_prefix("error: ")
        .unwrap_or(first_line)
        .to_string();
    AppError::invalid_input(message)
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            err.exit()
        }
        Err(err) => {
            eprintln!("ERROR: {}", normalize_parse_error(err));
            std::process::exit(1);
        }
    };

    let overrides = match collect_overrides(&cli.config_override) {
        Ok(overrides) => overrides,
        Err(err) => {
            eprintln!("ERROR: {}", err);
            std::process::exit(1);
        }
    };
    let loaded = config::load_config_with_fallback();
    let config = config::merge_overrides(&loaded.config, &overrides);
    init_logging(&config);
    if let Some(err) = loaded.error {
        tracing::warn!(error = %err, "config file ignored, using defaults");
    }

    if let Err(err) = run_command(cli, &config) {
        eprintln!("ERROR: {}", err);
        std::process::exit(1);
    }
}
