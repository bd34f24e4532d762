//! End-to-end tests driving the compiled binary against a temporary database.
//!
//! Entries are scheduled far in the future so the real clock never activates
//! them.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use serde_json::Value;
use tempfile::TempDir;

fn stagetimer_binary() -> String {
    env!("CARGO_BIN_EXE_stagetimer").to_string()
}

fn stagetimer(temp: &Path) -> Command {
    let mut command = Command::new(stagetimer_binary());
    command
        .env("HOME", temp)
        .env("XDG_CONFIG_HOME", temp.join(".config"))
        .env("STAGETIMER_DATABASE_PATH", temp.join("data/stagetimer.db"))
        .env("STAGETIMER_TICK_INTERVAL_MS", "50")
        .env_remove("RUST_LOG");
    command
}

fn run_ok(temp: &Path, args: &[&str]) -> String {
    let output = stagetimer(temp).args(args).output().unwrap();
    assert!(
        output.status.success(),
        "stagetimer {args:?} should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).unwrap()
}

fn run_err(temp: &Path, args: &[&str]) -> Output {
    let output = stagetimer(temp).args(args).output().unwrap();
    assert!(!output.status.success(), "stagetimer {args:?} should fail");
    output
}

fn write_schedule(temp: &Path) -> std::path::PathBuf {
    let file = temp.join("schedule.json");
    std::fs::write(
        &file,
        r#"[
            {"date": "2099-07-10", "label": "Opener", "start": "18:00", "end": "19:00"},
            {"date": "2099-07-10", "label": "Headliner", "start": "23:00", "end": "01:00"}
        ]"#,
    )
    .unwrap();
    file
}

/// Test the schedule can be imported, extended, listed and trimmed.
#[test]
fn test_schedule_lifecycle() {
    let temp = TempDir::new().unwrap();
    let file = write_schedule(temp.path());

    let imported = run_ok(temp.path(), &["schedule", "import", file.to_str().unwrap()]);
    assert_eq!(imported.trim(), "Imported 2 entries");

    let added = run_ok(
        temp.path(),
        &[
            "schedule", "add", "--date", "2099-07-11", "--start", "00:30", "--end", "02:00", "--label",
            "Closer",
        ],
    );
    assert!(added.starts_with("Added 2099-07-11 00:30-02:00 Closer"));

    let clash = run_err(
        temp.path(),
        &[
            "schedule", "add", "--date", "2099-07-11", "--start", "00:00", "--end", "00:45", "--label",
            "Clash",
        ],
    );
    let stderr = String::from_utf8_lossy(&clash.stderr);
    assert!(stderr.contains("2 time conflict(s) found"), "{stderr}");

    let listed: Value = serde_json::from_str(&run_ok(temp.path(), &["schedule", "list", "--json"])).unwrap();
    let labels: Vec<&str> = listed["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["label"].as_str().unwrap())
        .collect();
    assert_eq!(labels, vec!["Opener", "Headliner", "Closer"]);
    assert_eq!(listed["entries"][1]["end_date"], "2099-07-11");
    assert_eq!(listed["all_dates"], serde_json::json!(["2099-07-10", "2099-07-11"]));

    run_ok(temp.path(), &["schedule", "remove", "0"]);
    let listed: Value = serde_json::from_str(&run_ok(temp.path(), &["schedule", "list", "--json"])).unwrap();
    assert_eq!(listed["entries"].as_array().unwrap().len(), 2);

    run_err(temp.path(), &["schedule", "remove", "7"]);
}

/// Test settings validation and their effect on the status snapshot.
#[test]
fn test_settings_and_status() {
    let temp = TempDir::new().unwrap();

    let rejected = run_err(temp.path(), &["settings", "warn", "--orange", "3", "--red", "5"]);
    assert!(!rejected.stderr.is_empty());

    run_ok(temp.path(), &["settings", "warn", "--orange", "8", "--red", "2"]);
    run_ok(temp.path(), &["settings", "logo-size", "20"]);

    let status: Value = serde_json::from_str(&run_ok(temp.path(), &["status", "--json"])).unwrap();
    assert_eq!(status["status"], "idle");
    assert_eq!(status["warn_orange_seconds"], 480);
    assert_eq!(status["warn_red_seconds"], 120);

    let shown = run_ok(temp.path(), &["settings", "show"]);
    assert!(shown.contains("Logo size: 20%"));
}

/// Test assets and history commands on a fresh database.
#[test]
fn test_assets_and_empty_history() {
    let temp = TempDir::new().unwrap();

    run_ok(temp.path(), &["asset", "set", "Headliner", "logos/headliner.png"]);
    assert_eq!(
        run_ok(temp.path(), &["asset", "list"]).trim(),
        "Headliner: logos/headliner.png"
    );
    run_ok(temp.path(), &["asset", "remove", "Headliner"]);
    run_err(temp.path(), &["asset", "remove", "Headliner"]);

    assert_eq!(
        run_ok(temp.path(), &["history", "list"]).trim(),
        "No history recorded."
    );
}

/// Test the timer service streams JSON lines and obeys console commands.
#[test]
fn test_run_console_session() {
    let temp = TempDir::new().unwrap();
    let file = write_schedule(temp.path());
    run_ok(temp.path(), &["schedule", "import", file.to_str().unwrap()]);

    let mut child = stagetimer(temp.path())
        .arg("run")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    {
        let mut stdin = child.stdin.take().unwrap();
        stdin
            .write_all(b"adjust 5\nmessage 10 Doors open\nstatus\nquit\n")
            .unwrap();
    }
    let output = child.wait_with_output().unwrap();
    assert!(
        output.status.success(),
        "run should exit cleanly: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let lines: Vec<Value> = String::from_utf8(output.stdout)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    let replies: Vec<&Value> = lines
        .iter()
        .filter(|line| line.get("reply").is_some() || line.get("error").is_some())
        .collect();
    assert_eq!(replies.len(), 4);
    assert_eq!(replies[0]["error"], "no entry is playing");
    assert_eq!(replies[1]["reply"], "message sent");
    assert_eq!(replies[2]["reply"], "idle");
    assert_eq!(replies[3]["reply"], "bye");
    assert!(
        lines
            .iter()
            .any(|line| line["event"] == "message" && line["text"] == "Doors open")
    );
}
