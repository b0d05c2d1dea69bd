use assert_cmd::Command;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

fn repo_root() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .parent()
        .and_then(|p| p.parent())
        .expect("expected crates/<name> layout")
        .to_path_buf()
}

fn lesson_fixture() -> PathBuf {
    let fixture = repo_root()
        .join("fixtures")
        .join("lessons")
        .join("hidrostatica.json");
    assert!(fixture.exists(), "fixture missing: {}", fixture.display());
    fixture
}

fn cli() -> Command {
    Command::new(assert_cmd::cargo_bin!("lectio-cli"))
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

#[test]
fn repair_prints_document_and_diagnostics() {
    let output = cli()
        .args(["repair", lesson_fixture().to_string_lossy().as_ref()])
        .assert()
        .success()
        .get_output()
        .clone();
    let json = stdout_json(&output);
    assert_eq!(json["document"]["blocks"].as_array().map(Vec::len), Some(12));
    assert_eq!(json["diagnostics"]["mode"]["mode"], "deterministicOnly");
}

#[test]
fn check_reads_stdin_and_reports_warnings() {
    let output = cli()
        .args(["check", "-"])
        .write_stdin(r#"[{"kind":"quiz"},{"kind":"paragraph","text":"a"}]"#)
        .assert()
        .success()
        .get_output()
        .clone();
    let json = stdout_json(&output);
    let warnings = json["blockWarnings"].as_array().expect("blockWarnings array");
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0]["code"], "unknownKind");
}

#[test]
fn render_html_to_file() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let out = tmp.path().join("lesson.html");

    cli()
        .args([
            "render",
            "--format",
            "html",
            "--out",
            out.to_string_lossy().as_ref(),
            lesson_fixture().to_string_lossy().as_ref(),
        ])
        .assert()
        .success();

    let html = fs::read_to_string(&out).expect("read html");
    assert!(html.starts_with("<article class=\"lectio-document\">"));
    assert!(html.contains("lectio-diagram"));
    assert!(!html.contains("<script"));
}

#[test]
fn render_json_keeps_block_order() {
    let output = cli()
        .args(["render", lesson_fixture().to_string_lossy().as_ref()])
        .assert()
        .success()
        .get_output()
        .clone();
    let json = stdout_json(&output);
    assert_eq!(json["node"], "document");
    let children = json["children"].as_array().expect("children");
    assert_eq!(children.len(), 12);
    for (i, child) in children.iter().enumerate() {
        assert_eq!(child["id"], format!("block-{i}"));
    }
}

#[test]
fn diagram_command_normalizes_before_rendering() {
    let output = cli()
        .args(["diagram"])
        .write_stdin("```mermaid\ngraph TD; A → B\n```")
        .assert()
        .success()
        .get_output()
        .clone();
    let json = stdout_json(&output);
    assert_eq!(json["recognized"], true);
    assert_eq!(json["normalized"], "graph TD; A --> B");
    assert_eq!(json["view"]["state"], "rendered");
}

#[test]
fn yaml_config_overrides_the_id_prefix() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let config = tmp.path().join("lectio.yaml");
    fs::write(&config, "render:\n  idPrefix: aula\n").expect("write config");

    let output = cli()
        .args(["diagram", "--config", config.to_string_lossy().as_ref()])
        .write_stdin("graph TD\nA --> B")
        .assert()
        .success()
        .get_output()
        .clone();
    let json = stdout_json(&output);
    let render_id = json["view"]["renderId"].as_str().expect("renderId");
    assert!(render_id.starts_with("aula-"), "{render_id}");
}

#[test]
fn usage_errors_exit_with_2() {
    cli().args(["render", "--format", "pdf"]).assert().code(2);
}

#[test]
fn malformed_input_exits_with_1() {
    cli()
        .args(["repair"])
        .write_stdin("{ not json")
        .assert()
        .code(1);
}
