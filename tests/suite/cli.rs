//! The `lintbridge` binary, driven as a subprocess.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

use crate::common::{EVENT_TIMEOUT, FakeAnalyzer, UNEXPECTED_TOKEN};

/// Stand-in for `python3`: reports a version, claims every package, and
/// runs analyzer scripts with `/bin/sh`.
fn fake_runtime(dir: &Path) -> PathBuf {
    let path = dir.join("fake-python");
    std::fs::write(
        &path,
        "#!/bin/sh\ncase \"$1\" in\n  --version) echo 'Python 3.12.1'; exit 0 ;;\n  -c) exit 0 ;;\nesac\nexec /bin/sh \"$@\"\n",
    )
    .unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn write_config(analyzer: &FakeAnalyzer) -> PathBuf {
    let runtime = fake_runtime(analyzer.dir.path());
    let path = analyzer.path("config.toml");
    std::fs::write(
        &path,
        format!(
            "[lint]\nrequest_timeout_ms = 5000\n\n\
             [lint.runtime]\ncandidates = [\"{}\"]\n\n\
             [lint.languages.csml]\nentry_point = \"{}\"\nextensions = [\"csml\"]\n",
            runtime.display(),
            analyzer.script.display()
        ),
    )
    .unwrap();
    path
}

fn lintbridge(analyzer: &FakeAnalyzer) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_lintbridge"));
    command
        .env("HOME", analyzer.dir.path())
        .current_dir(analyzer.dir.path())
        .arg("--config")
        .arg(write_config(analyzer))
        .kill_on_drop(true);
    command
}

async fn run(mut command: Command) -> Output {
    tokio::time::timeout(Duration::from_secs(30), command.output())
        .await
        .expect("lintbridge did not finish")
        .expect("failed to run lintbridge")
}

#[tokio::test]
async fn check_reports_errors_and_fails() {
    let analyzer = FakeAnalyzer::constant(UNEXPECTED_TOKEN);
    let file = analyzer.path("rules.csml");
    std::fs::write(&file, "rule {\n? -> allow\n}\n").unwrap();

    let mut command = lintbridge(&analyzer);
    command.arg("check").arg(&file);
    let output = run(command).await;

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(output.status.code(), Some(1), "stdout: {stdout}");
    assert!(
        stdout.contains("rules.csml:2:1: error: Unexpected token [replace-with-C]"),
        "stdout: {stdout}"
    );
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("1 diagnostic(s) in 1 file(s) (E:1 W:0)"),
        "stderr: {stderr}"
    );
}

#[tokio::test]
async fn check_fix_rewrites_the_flagged_span() {
    let analyzer = FakeAnalyzer::constant(UNEXPECTED_TOKEN);
    let file = analyzer.path("rules.csml");
    std::fs::write(&file, "rule {\n? -> allow\n}\n").unwrap();

    let mut command = lintbridge(&analyzer);
    command.arg("check").arg("--fix").arg(&file);
    run(command).await;

    assert_eq!(
        std::fs::read_to_string(&file).unwrap(),
        "rule {\nC -> allow\n}\n"
    );
}

#[tokio::test]
async fn check_clean_file_succeeds() {
    let analyzer = FakeAnalyzer::constant("[]");
    let file = analyzer.path("clean.csml");
    std::fs::write(&file, "rule {}\n").unwrap();

    let mut command = lintbridge(&analyzer);
    command.arg("check").arg(&file);
    let output = run(command).await;

    assert!(output.status.success());
    assert!(output.stdout.is_empty());
}

#[tokio::test]
async fn check_rejects_unknown_file_types() {
    let analyzer = FakeAnalyzer::constant("[]");
    let file = analyzer.path("notes.txt");
    std::fs::write(&file, "hello").unwrap();

    let mut command = lintbridge(&analyzer);
    command.arg("check").arg(&file);
    let output = run(command).await;

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("no analyzer registered"));
}

#[tokio::test]
async fn serve_bridges_events_and_code_actions() {
    let analyzer = FakeAnalyzer::constant(UNEXPECTED_TOKEN);
    let mut command = lintbridge(&analyzer);
    command
        .arg("serve")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());
    let mut child = command.spawn().unwrap();
    let mut stdin = child.stdin.take().unwrap();
    let mut stdout = BufReader::new(child.stdout.take().unwrap()).lines();

    let open = serde_json::json!({
        "type": "open",
        "uri": "file:///work/rules.csml",
        "languageId": "csml",
        "text": "rule {\n? -> allow\n}\n"
    });
    stdin
        .write_all(format!("{open}\n").as_bytes())
        .await
        .unwrap();

    let line = tokio::time::timeout(EVENT_TIMEOUT, stdout.next_line())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let published: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(published["type"], "diagnostics");
    assert_eq!(published["sequence"], 1);
    assert_eq!(published["diagnostics"][0]["severity"], "error");
    assert_eq!(published["diagnostics"][0]["range"]["end"]["character"], 1);

    let request = serde_json::json!({
        "type": "codeAction",
        "id": 7,
        "uri": "file:///work/rules.csml",
        "range": {
            "start": { "line": 1, "character": 0 },
            "end": { "line": 1, "character": 1 }
        }
    });
    stdin
        .write_all(format!("{request}\n").as_bytes())
        .await
        .unwrap();

    let line = tokio::time::timeout(EVENT_TIMEOUT, stdout.next_line())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let reply: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(reply["type"], "codeActions");
    assert_eq!(reply["id"], 7);
    assert_eq!(reply["actions"][0]["edit"]["newText"], "C");
    assert_eq!(reply["actions"][0]["isPreferred"], true);

    stdin.write_all(b"{\"type\":\"shutdown\"}\n").await.unwrap();
    let status = tokio::time::timeout(Duration::from_secs(10), child.wait())
        .await
        .unwrap()
        .unwrap();
    assert!(status.success());
}
