#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn refine(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("refine").unwrap();
    cmd.current_dir(dir.path())
        .env("REFINE_ROOT", dir.path())
        .env_remove("RUST_LOG");
    cmd
}

fn init_workspace(dir: &TempDir) {
    refine(dir).arg("init").assert().success();
}

fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

/// A generator/reviewer/stage script that ignores its input and prints a
/// fixed JSON document. Returns the command line to pass to `refine run`.
#[cfg(unix)]
fn oracle_script(dir: &TempDir, name: &str, response: &str) -> String {
    let path = dir.path().join(name);
    std::fs::write(
        &path,
        format!("#!/bin/sh\ncat > /dev/null\ncat <<'JSON'\n{response}\nJSON\n"),
    )
    .unwrap();
    format!("sh {}", path.display())
}

const CLEAN_FILES: &str = r#"{"files": {"app.py": "def add(a, b):\n    return a + b\n"}}"#;
const STUB_FILES: &str = r#"{"files": {"app.py": "def run():\n    pass\n"}}"#;

// ---------------------------------------------------------------------------
// refine init / config
// ---------------------------------------------------------------------------

#[test]
fn init_creates_workspace() {
    let dir = TempDir::new().unwrap();
    refine(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("created: .refine/config.yaml"));
    assert!(dir.path().join(".refine/projects").is_dir());
    assert!(dir.path().join(".refine/config.yaml").exists());
}

#[test]
fn init_is_idempotent() {
    let dir = TempDir::new().unwrap();
    init_workspace(&dir);
    refine(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("exists:  .refine/config.yaml"));
}

#[test]
fn config_validate_default_is_clean() {
    let dir = TempDir::new().unwrap();
    init_workspace(&dir);
    refine(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"));
}

#[test]
fn config_validate_reports_errors() {
    let dir = TempDir::new().unwrap();
    init_workspace(&dir);
    std::fs::write(
        dir.path().join(".refine/config.yaml"),
        "iteration:\n  max_iterations: 0\n",
    )
    .unwrap();
    refine(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error]"))
        .stderr(predicate::str::contains("config validation found errors"));
}

#[test]
fn config_show_json() {
    let dir = TempDir::new().unwrap();
    init_workspace(&dir);
    let output = refine(&dir)
        .args(["config", "show", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let config = stdout_json(&output);
    assert_eq!(config["iteration"]["max_iterations"], 3);
    assert_eq!(config["memory"]["snippet_limit"], 10);
}

#[test]
fn commands_require_init() {
    let dir = TempDir::new().unwrap();
    refine(&dir)
        .args(["config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not initialized"));
}

// ---------------------------------------------------------------------------
// refine analyze
// ---------------------------------------------------------------------------

fn write_unfinished(dir: &TempDir) {
    std::fs::write(
        dir.path().join("app.py"),
        "# TODO: add validation\ndef run():\n    pass\n",
    )
    .unwrap();
}

#[test]
fn analyze_lists_issues() {
    let dir = TempDir::new().unwrap();
    write_unfinished(&dir);
    refine(&dir)
        .args(["analyze", "app.py"])
        .assert()
        .success()
        .stdout(predicate::str::contains("app.py:1"))
        .stdout(predicate::str::contains("todo"))
        .stdout(predicate::str::contains("incomplete_stub"));
}

#[test]
fn analyze_json_output() {
    let dir = TempDir::new().unwrap();
    write_unfinished(&dir);
    let output = refine(&dir)
        .args(["analyze", "app.py", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let issues = stdout_json(&output);
    let issues = issues.as_array().unwrap();
    assert_eq!(issues.len(), 2);
    assert_eq!(issues[0]["line"], 1);
    assert_eq!(issues[0]["severity"], "medium");
    assert_eq!(issues[1]["category"], "incomplete_stub");
    assert_eq!(issues[1]["severity"], "high");
}

#[test]
fn analyze_summary() {
    let dir = TempDir::new().unwrap();
    write_unfinished(&dir);
    refine(&dir)
        .args(["analyze", ".", "--summary"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Issues found:  2"))
        .stdout(predicate::str::contains("Complete 1 TODO items"));
}

#[test]
fn analyze_clean_directory() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("src")).unwrap();
    std::fs::write(dir.path().join("src/lib.py"), "def add(a, b):\n    return a + b\n").unwrap();
    refine(&dir)
        .args(["analyze", "src"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No issues found"));
}

#[test]
fn analyze_missing_path_fails() {
    let dir = TempDir::new().unwrap();
    refine(&dir)
        .args(["analyze", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("path not found"));
}

// ---------------------------------------------------------------------------
// refine run / project / memory
// ---------------------------------------------------------------------------

#[cfg(unix)]
#[test]
fn run_accepted_writes_output() {
    let dir = TempDir::new().unwrap();
    init_workspace(&dir);
    let generator = oracle_script(&dir, "gen.sh", CLEAN_FILES);

    refine(&dir)
        .args(["run", "a calculator", "--generator", &generator])
        .args(["--project", "calc", "--out", "out"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Status:      accepted"))
        .stdout(predicate::str::contains("Iterations:  1/3"));
    assert!(dir.path().join("out/app.py").exists());

    refine(&dir)
        .args(["project", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("calc"))
        .stdout(predicate::str::contains("accepted"));

    refine(&dir)
        .args(["project", "show", "calc"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Input:      a calculator"));
}

#[cfg(unix)]
#[test]
fn run_exhausted_exits_with_code_2() {
    let dir = TempDir::new().unwrap();
    init_workspace(&dir);
    let generator = oracle_script(&dir, "gen.sh", STUB_FILES);

    let output = refine(&dir)
        .args(["run", "stubs", "--generator", &generator, "--project", "stubs", "--json"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let report = stdout_json(&output);
    assert_eq!(report["status"], "exhausted");
    assert_eq!(report["accepted"], false);
    assert_eq!(report["history"].as_array().unwrap().len(), 3);
    assert_eq!(report["history"][2]["iteration"], 3);
    assert_eq!(report["files"][0], "app.py");

    // a finished project is not rerun
    refine(&dir)
        .args(["run", "stubs", "--generator", &generator, "--project", "stubs"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("project already exists"));
}

#[cfg(unix)]
#[test]
fn run_with_failing_generator_packages_readme() {
    let dir = TempDir::new().unwrap();
    init_workspace(&dir);
    let path = dir.path().join("fail.sh");
    std::fs::write(&path, "#!/bin/sh\necho 'no model' >&2\nexit 1\n").unwrap();
    let generator = format!("sh {}", path.display());

    refine(&dir)
        .args(["run", "weather app", "--generator", &generator, "--project", "weather"])
        .args(["--out", "out"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("Status:      failed"));
    let readme = std::fs::read_to_string(dir.path().join("out/README.md")).unwrap();
    assert!(readme.contains("weather app"));
    assert!(readme.contains("no model"));
}

#[cfg(unix)]
#[test]
fn run_with_stage_and_external_reviewer() {
    let dir = TempDir::new().unwrap();
    init_workspace(&dir);
    let generator = oracle_script(&dir, "gen.sh", STUB_FILES);
    let reviewer = oracle_script(
        &dir,
        "review.sh",
        r#"{"score": 95, "issues": [], "recommendations": []}"#,
    );
    let docs = oracle_script(&dir, "docs.sh", r#"{"files": {"docs/usage.md": "usage"}}"#);

    let output = refine(&dir)
        .args(["run", "x", "--generator", &generator, "--reviewer", &reviewer])
        .args(["--stage", &format!("docs={docs}"), "--project", "staged", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let report = stdout_json(&output);
    assert_eq!(report["status"], "accepted");
    assert_eq!(report["stages"][0]["name"], "docs");
    assert_eq!(report["stages"][0]["status"], "completed");
    let files: Vec<&str> = report["files"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|f| f.as_str())
        .collect();
    assert_eq!(files, vec!["app.py", "docs/usage.md"]);
}

#[test]
fn run_rejects_malformed_stage() {
    let dir = TempDir::new().unwrap();
    init_workspace(&dir);
    refine(&dir)
        .args(["run", "x", "--generator", "sh", "--stage", "no-command"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("expected NAME=CMD"));
}

#[test]
fn run_rejects_unknown_generator() {
    let dir = TempDir::new().unwrap();
    init_workspace(&dir);
    refine(&dir)
        .args(["run", "x", "--generator", "not-a-real-refine-generator"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("command not found"));
}

#[cfg(unix)]
#[test]
fn memory_commands_after_run() {
    let dir = TempDir::new().unwrap();
    init_workspace(&dir);
    let generator = oracle_script(&dir, "gen.sh", STUB_FILES);
    refine(&dir)
        .args(["run", "x", "--generator", &generator, "--project", "mem"])
        .assert()
        .code(2);

    refine(&dir)
        .args(["memory", "history", "mem"])
        .assert()
        .success()
        .stdout(predicate::str::contains("## Iteration 3"))
        .stdout(predicate::str::contains("Status: needs_improvement"));

    refine(&dir)
        .args(["memory", "feedback", "mem", "rename run() to main()"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Feedback recorded"));

    refine(&dir)
        .args(["memory", "context", "mem"])
        .assert()
        .success()
        .stdout(predicate::str::contains("# Project Context: mem"))
        .stdout(predicate::str::contains("- rename run() to main()"))
        .stdout(predicate::str::contains("### app.py"));
}

#[test]
fn memory_for_unknown_project_fails() {
    let dir = TempDir::new().unwrap();
    init_workspace(&dir);
    refine(&dir)
        .args(["memory", "context", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("project not found: ghost"));
}

#[test]
fn project_list_empty() {
    let dir = TempDir::new().unwrap();
    init_workspace(&dir);
    refine(&dir)
        .args(["project", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No projects."));
}
