//! Dashboard numbers computed over active tasks.

use crate::dates;
use crate::error::AppError;
use crate::model::{DueState, ScalarField, TaskRecord};
use crate::settings::AnalyticsOptions;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use time::{Date, Duration};

const UNKNOWN: &str = "Unknown";
const IN_PROGRESS: &str = "In Progress";
const TREND_WINDOW_DAYS: i64 = 30;
const WEEK_DAYS: i64 = 7;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Breakdown {
    pub total: usize,
    pub completed: usize,
    pub completion_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalyticsReport {
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub overdue_tasks: usize,
    pub overall_completion_rate: f64,
    pub avg_tasks_per_day: f64,
    pub by_status: BTreeMap<String, usize>,
    pub by_type: BTreeMap<String, Breakdown>,
    pub by_category: BTreeMap<String, Breakdown>,
    pub by_product: BTreeMap<String, Breakdown>,
    pub by_module: BTreeMap<String, Breakdown>,
    pub by_priority: BTreeMap<String, Breakdown>,
    /// Completed tasks keyed by their created date.
    pub completion_trend: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StandupSummary {
    pub total: usize,
    pub completed_this_week: usize,
    pub high_priority_open: usize,
    pub in_progress: usize,
    pub overdue_open: Vec<String>,
    pub due_today: Vec<String>,
}

/// Percentage rounded to one decimal place.
fn rate(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (part as f64 / total as f64 * 1000.0).round() / 10.0
}

fn label(task: &TaskRecord, field: ScalarField) -> String {
    task.scalar(field)
        .filter(|value| !value.trim().is_empty())
        .unwrap_or(UNKNOWN)
        .to_string()
}

fn tally(groups: &mut BTreeMap<String, Breakdown>, key: String, completed: bool) {
    let entry = groups.entry(key).or_default();
    entry.total += 1;
    if completed {
        entry.completed += 1;
    }
}

fn finish(groups: &mut BTreeMap<String, Breakdown>) {
    for group in groups.values_mut() {
        group.completion_rate = rate(group.completed, group.total);
    }
}

fn created_on_or_after(task: &TaskRecord, since: Date) -> bool {
    dates::parse_iso(task.created_date())
        .map(|created| created >= since)
        .unwrap_or(false)
}

pub fn summarize(
    tasks: &[TaskRecord],
    options: &AnalyticsOptions,
    today: Date,
) -> Result<AnalyticsReport, AppError> {
    let mut report = AnalyticsReport {
        total_tasks: tasks.len(),
        ..AnalyticsReport::default()
    };
    let window_start = today - Duration::days(TREND_WINDOW_DAYS);
    let mut recent = 0;

    for task in tasks {
        let completed = task.status() == options.completed_status;
        if completed {
            report.completed_tasks += 1;
            *report
                .completion_trend
                .entry(task.created_date().to_string())
                .or_default() += 1;
        }
        if task.due_state(today, &options.completed_status)? == DueState::Overdue {
            report.overdue_tasks += 1;
        }
        if created_on_or_after(task, window_start) {
            recent += 1;
        }

        *report.by_status.entry(task.status().to_string()).or_default() += 1;
        tally(&mut report.by_type, label(task, ScalarField::Type), completed);
        tally(&mut report.by_category, label(task, ScalarField::Category), completed);
        tally(&mut report.by_product, label(task, ScalarField::Product), completed);
        tally(&mut report.by_module, label(task, ScalarField::Module), completed);
        tally(&mut report.by_priority, label(task, ScalarField::Priority), completed);
    }

    for groups in [
        &mut report.by_type,
        &mut report.by_category,
        &mut report.by_product,
        &mut report.by_module,
        &mut report.by_priority,
    ] {
        finish(groups);
    }

    report.overall_completion_rate = rate(report.completed_tasks, report.total_tasks);
    report.avg_tasks_per_day = (recent as f64 / TREND_WINDOW_DAYS as f64 * 10.0).round() / 10.0;

    Ok(report)
}

pub fn standup_summary(
    tasks: &[TaskRecord],
    options: &AnalyticsOptions,
    today: Date,
) -> Result<StandupSummary, AppError> {
    let week_start = today - Duration::days(WEEK_DAYS);
    let mut summary = StandupSummary {
        total: tasks.len(),
        ..StandupSummary::default()
    };

    for task in tasks {
        let completed = task.status() == options.completed_status;
        if completed && created_on_or_after(task, week_start) {
            summary.completed_this_week += 1;
        }
        if task.status() == IN_PROGRESS {
            summary.in_progress += 1;
        }
        if !completed
            && task
                .scalar(ScalarField::Priority)
                .is_some_and(|priority| options.high_priorities.iter().any(|high| high == priority))
        {
            summary.high_priority_open += 1;
        }
        match task.due_state(today, &options.completed_status)? {
            DueState::Overdue => summary.overdue_open.push(task.id().to_string()),
            DueState::DueToday => summary.due_today.push(task.id().to_string()),
            DueState::DueSoon | DueState::None => {}
        }
    }

    Ok(summary)
}

fn write_row<W: Write>(writer: &mut csv::Writer<W>, fields: &[String]) -> Result<(), AppError> {
    writer
        .write_record(fields)
        .map_err(|err| AppError::io(err.to_string()))
}

fn write_section<W: Write>(
    writer: &mut csv::Writer<W>,
    title: &str,
    dimension: &str,
    groups: &BTreeMap<String, Breakdown>,
) -> Result<(), AppError> {
    write_row(writer, &[title.to_string()])?;
    write_row(
        writer,
        &[
            dimension.to_string(),
            "Total Tasks".to_string(),
            "Completed".to_string(),
            "Completion Rate (%)".to_string(),
        ],
    )?;
    for (name, group) in groups {
        write_row(
            writer,
            &[
                name.clone(),
                group.total.to_string(),
                group.completed.to_string(),
                group.completion_rate.to_string(),
            ],
        )?;
    }
    write_row(writer, &[String::new()])
}

/// Writes the sectioned analytics CSV report.
pub fn write_report_csv<W: Write>(
    report: &AnalyticsReport,
    generated_at: &str,
    output: W,
) -> Result<(), AppError> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(output);

    write_row(&mut writer, &["Stand-up Analytics Report".to_string()])?;
    write_row(
        &mut writer,
        &["Generated on".to_string(), generated_at.to_string()],
    )?;
    write_row(&mut writer, &[String::new()])?;

    write_row(&mut writer, &["SUMMARY METRICS".to_string()])?;
    write_row(&mut writer, &["Metric".to_string(), "Value".to_string()])?;
    let metrics = [
        ("Total Tasks", report.total_tasks.to_string()),
        ("Completed Tasks", report.completed_tasks.to_string()),
        ("Overdue Tasks", report.overdue_tasks.to_string()),
        (
            "Overall Completion Rate (%)",
            report.overall_completion_rate.to_string(),
        ),
        ("Avg Tasks Per Day (30d)", report.avg_tasks_per_day.to_string()),
    ];
    for (name, value) in metrics {
        write_row(&mut writer, &[name.to_string(), value])?;
    }
    write_row(&mut writer, &[String::new()])?;

    write_row(&mut writer, &["STATUS BREAKDOWN".to_string()])?;
    write_row(&mut writer, &["Status".to_string(), "Tasks".to_string()])?;
    for (status, count) in &report.by_status {
        write_row(&mut writer, &[status.clone(), count.to_string()])?;
    }
    write_row(&mut writer, &[String::new()])?;

    write_section(&mut writer, "PRODUCT PERFORMANCE", "Product", &report.by_product)?;
    write_section(&mut writer, "MODULE PERFORMANCE", "Module", &report.by_module)?;
    write_section(&mut writer, "PRIORITY DISTRIBUTION", "Priority", &report.by_priority)?;
    write_section(&mut writer, "TASK TYPES", "Type", &report.by_type)?;
    write_section(&mut writer, "CATEGORIES", "Category", &report.by_category)?;

    writer.flush().map_err(|err| AppError::io(err.to_string()))
}
