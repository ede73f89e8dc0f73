use std::process::Command;

fn bounty_review(dir: &std::path::Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_bounty-review"));
    cmd.current_dir(dir).env("NO_COLOR", "1");
    cmd
}

#[test]
fn init_creates_valid_toml() {
    let dir = tempfile::tempdir().unwrap();

    let output = bounty_review(dir.path()).arg("init").output().unwrap();

    assert!(
        output.status.success(),
        "bounty-review init failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let config_path = dir.path().join(".bounty-review.toml");
    assert!(config_path.exists(), ".bounty-review.toml should exist");

    let content = std::fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("[github]"));
    assert!(content.contains("[queue]"));
    assert!(content.contains("[sweep]"));

    let config: bounty_core::BountyConfig = toml::from_str(&content).unwrap();
    assert_eq!(config.queue.attempts, 1);
}

#[test]
fn init_refuses_if_exists() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(".bounty-review.toml"), "# existing").unwrap();

    let output = bounty_review(dir.path()).arg("init").output().unwrap();

    assert!(!output.status.success());
    let content = std::fs::read_to_string(dir.path().join(".bounty-review.toml")).unwrap();
    assert_eq!(content, "# existing");
}

#[test]
fn doctor_reports_checks_as_json() {
    let dir = tempfile::tempdir().unwrap();

    let output = bounty_review(dir.path())
        .args(["doctor", "--format", "json"])
        .env("BOUNTY_DB_PATH", dir.path().join("db/reviews.db"))
        .output()
        .unwrap();

    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let names: Vec<&str> = report["checks"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|c| c["name"].as_str())
        .collect();
    assert!(names.contains(&"config_file"));
    assert!(names.contains(&"database"));
    assert!(dir.path().join("db/reviews.db").exists());
}

#[test]
fn show_missing_review_fails() {
    let dir = tempfile::tempdir().unwrap();

    let output = bounty_review(dir.path())
        .args(["show", "https://github.com/o/r", "--bounty", "B1"])
        .env("BOUNTY_DB_PATH", dir.path().join("reviews.db"))
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("no review found"));
}

#[test]
fn submit_then_list_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("reviews.db");

    let output = bounty_review(dir.path())
        .args([
            "submit",
            "https://github.com/o/r/pull/7",
            "--bounty",
            "B1",
            "--requirements",
            "Implement X",
        ])
        .env("BOUNTY_DB_PATH", &db)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "submit failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let output = bounty_review(dir.path())
        .args(["jobs", "--format", "json"])
        .env("BOUNTY_DB_PATH", &db)
        .output()
        .unwrap();
    assert!(output.status.success());
    let jobs: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let jobs = jobs.as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["queue"], "github:generateContext");
    assert_eq!(jobs[0]["status"], "queued");
    assert_eq!(jobs[0]["bountyId"], "B1");
}
