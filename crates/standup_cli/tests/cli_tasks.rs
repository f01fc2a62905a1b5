use std::path::PathBuf;
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

struct Paths {
    store: PathBuf,
    settings: PathBuf,
    config: PathBuf,
}

impl Paths {
    fn new(name: &str) -> Self {
        Self {
            store: temp_path(&format!("{name}-tasks.json")),
            settings: temp_path(&format!("{name}-settings.json")),
            config: temp_path(&format!("{name}-config.json")),
        }
    }

    fn cleanup(&self) {
        std::fs::remove_file(&self.store).ok();
        std::fs::remove_file(&self.settings).ok();
        std::fs::remove_file(&self.config).ok();
    }
}

fn temp_path(file_name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("standup-{nanos}-{file_name}"))
}

fn run(paths: &Paths, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_standup"))
        .args(args)
        .env("STANDUP_STORE_PATH", &paths.store)
        .env("STANDUP_SETTINGS_PATH", &paths.settings)
        .env("STANDUP_CONFIG_PATH", &paths.config)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run standup")
}

fn stdout_json(output: &Output) -> serde_json::Value {
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn add_then_plan_keeps_history() {
    let paths = Paths::new("cli-plan");

    let created = stdout_json(&run(
        &paths,
        &[
            "add",
            "--status",
            "In Progress",
            "--description",
            "Login fails",
            "--plan",
            "investigate root cause",
            "--json",
        ],
    ));
    let planned = run(&paths, &["plan", "T001", "escalated to team lead"]);
    let shown = stdout_json(&run(&paths, &["show", "T001", "--json"]));
    paths.cleanup();

    assert_eq!(created["id"], "T001");
    assert_eq!(created["current_action_plan"], "investigate root cause");
    assert!(planned.status.success());
    assert_eq!(
        String::from_utf8_lossy(&planned.stdout).trim(),
        "Updated action plan: T001"
    );

    let history = shown["action_plan_history"].as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["text"], "investigate root cause");
    assert_eq!(history[1]["source"], "standup update");
    assert_eq!(shown["current_action_plan"], "escalated to team lead");
    assert_eq!(shown["description"], "Login fails");
}

#[test]
fn add_rejects_unknown_status() {
    let paths = Paths::new("cli-bad-status");

    let output = run(&paths, &["add", "--status", "Bogus"]);
    let store_written = paths.store.exists();
    paths.cleanup();

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ERROR: validation_error - invalid status 'Bogus'"));
    assert!(!store_written);
}

#[test]
fn edit_clears_fields_and_merges_custom_fields() {
    let paths = Paths::new("cli-edit");

    run(&paths, &["add", "--priority", "High", "--field", "Owner=ana"]);
    let edited = run(
        &paths,
        &["edit", "T001", "--priority", "", "--field", "Sprint=4"],
    );
    let shown = stdout_json(&run(&paths, &["show", "T001", "--json"]));
    let empty_edit = run(&paths, &["edit", "T001"]);
    paths.cleanup();

    assert!(edited.status.success());
    assert_eq!(shown["priority"], serde_json::Value::Null);
    assert_eq!(shown["custom_fields"]["Owner"], "ana");
    assert_eq!(shown["custom_fields"]["Sprint"], 4);
    assert!(
        String::from_utf8_lossy(&empty_edit.stderr)
            .contains("ERROR: invalid_input - nothing to change")
    );
}

#[test]
fn delete_and_restore_move_task_between_lists() {
    let paths = Paths::new("cli-delete");

    run(&paths, &["add", "--description", "old"]);
    let deleted = run(&paths, &["delete", "T001"]);
    let active = stdout_json(&run(&paths, &["list", "--json"]));
    let archived = stdout_json(&run(&paths, &["list", "--archived", "--json"]));
    let restored = run(&paths, &["restore", "T001"]);
    let active_after = stdout_json(&run(&paths, &["list", "--json"]));
    let restore_again = run(&paths, &["restore", "T001"]);
    paths.cleanup();

    assert_eq!(
        String::from_utf8_lossy(&deleted.stdout).trim(),
        "Deleted task: T001"
    );
    assert_eq!(active.as_array().unwrap().len(), 0);
    assert_eq!(archived[0]["id"], "T001");
    assert_eq!(archived[0]["deleted"], true);
    assert!(restored.status.success());
    assert_eq!(active_after.as_array().unwrap().len(), 1);
    assert!(
        String::from_utf8_lossy(&restore_again.stderr).contains("ERROR: validation_error")
    );
}

#[test]
fn deleted_ids_are_not_reused() {
    let paths = Paths::new("cli-ids");

    run(&paths, &["add"]);
    run(&paths, &["add"]);
    run(&paths, &["delete", "T002"]);
    let third = stdout_json(&run(&paths, &["add", "--json"]));
    paths.cleanup();

    assert_eq!(third["id"], "T003");
}

#[test]
fn show_missing_task_fails() {
    let paths = Paths::new("cli-missing");

    let output = run(&paths, &["show", "T404"]);
    paths.cleanup();

    assert_eq!(output.status.code(), Some(1));
    assert_eq!(
        String::from_utf8_lossy(&output.stderr).trim(),
        "ERROR: not_found - task 'T404' not found"
    );
}

#[test]
fn list_prints_table() {
    let paths = Paths::new("cli-list");

    run(
        &paths,
        &[
            "add",
            "--type",
            "Bug",
            "--due-date",
            "2020-01-01",
            "--description",
            "stale",
        ],
    );
    let output = run(&paths, &["list"]);
    paths.cleanup();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("ID"));
    assert!(stdout.contains("T001"));
    assert!(stdout.contains("2020-01-01 (overdue)"));
}
