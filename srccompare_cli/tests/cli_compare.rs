use serde_json::Value;
use srccompare_core::archive::build_zip;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn run_cli(args: &[&str]) -> Output {
    let exe = env!("CARGO_BIN_EXE_srccompare");
    let config_dir = TempDir::new().expect("config dir");
    Command::new(exe)
        .args(args)
        .env("XDG_CONFIG_HOME", config_dir.path())
        .env("APPDATA", config_dir.path())
        .env("HOME", config_dir.path())
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run srccompare")
}

fn run_cli_json(args: &[&str]) -> Value {
    let output = run_cli(args);
    assert!(
        output.status.success(),
        "command failed: {}\n{}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8(output.stdout).expect("stdout not utf-8");
    serde_json::from_str(&stdout).expect("invalid json output")
}

fn write_zip(dir: &Path, name: &str, files: &[(&str, &str)]) -> PathBuf {
    let entries: Vec<(&str, &[u8])> = files
        .iter()
        .map(|(path, contents)| (*path, contents.as_bytes()))
        .collect();
    let bytes = build_zip(name, &entries).expect("build zip");
    let path = dir.join(name);
    fs::write(&path, bytes).expect("write zip");
    path
}

fn arg(path: &Path) -> &str {
    path.to_str().expect("utf-8 path")
}

#[test]
fn test_compare_sources_json() {
    let temp = TempDir::new().unwrap();
    let left = write_zip(
        temp.path(),
        "left.zip",
        &[
            ("src/Same.java", "class Same {}\n"),
            ("src/Changed.java", "class Changed {\n    int a;\n}\n"),
            ("src/Removed.java", "class Removed {}\n"),
            ("src/Old.java", "class Moving {\n    void run() {}\n}\n"),
        ],
    );
    let right = write_zip(
        temp.path(),
        "right.zip",
        &[
            ("src/Same.java", "class Same {}\r\n"),
            ("src/Changed.java", "class Changed {\n    int b;\n}\n"),
            ("src/Added.java", "class Added {}\n"),
            ("src/New.java", "class Moving {\n    void run() {}\n}\n"),
        ],
    );

    let report = run_cli_json(&[
        "compare",
        arg(&left),
        arg(&right),
        "--mode",
        "source-vs-source",
        "--include-unchanged",
        "--json",
    ]);

    assert!(report["added"]["src/Added.java"]["diff"]
        .as_str()
        .unwrap()
        .contains("+class Added {}"));
    assert!(report["deleted"]["src/Removed.java"].is_object());
    assert!(report["modified"]["src/Changed.java"]["diff"]
        .as_str()
        .unwrap()
        .contains("-    int a;\n+    int b;\n"));

    let renamed = report["renamed"].as_array().unwrap();
    assert_eq!(renamed.len(), 1);
    assert_eq!(renamed[0]["from"], "src/Old.java");
    assert_eq!(renamed[0]["to"], "src/New.java");

    assert_eq!(report["unchanged"], serde_json::json!(["src/Same.java"]));
    let steps = report["timing"]["steps"].as_array().unwrap();
    assert_eq!(steps[0]["label"], "Read sources (left)");
    assert!(report["timing"]["totalDurationSeconds"].is_number());
}

#[test]
fn test_single_java_files_are_wrapped() {
    let temp = TempDir::new().unwrap();
    let left_dir = temp.path().join("left");
    let right_dir = temp.path().join("right");
    fs::create_dir_all(&left_dir).unwrap();
    fs::create_dir_all(&right_dir).unwrap();

    let left = left_dir.join("Example.java");
    let right = right_dir.join("Example.java");
    fs::write(&left, "class Example {\n    int x;\n}\n").unwrap();
    fs::write(&right, "class Example {\n    long x;\n}\n").unwrap();

    let report = run_cli_json(&["compare", arg(&left), arg(&right), "-U", "0", "--json"]);
    assert_eq!(
        report["modified"]["Example.java"]["diff"],
        "--- Example.java_orig\n+++ Example.java_rev\n@@ -2,1 +2,1 @@\n-    int x;\n+    long x;\n"
    );
    assert!(report["unchanged"].is_null());
}

#[test]
fn test_text_output_lists_changes() {
    let temp = TempDir::new().unwrap();
    let left = write_zip(temp.path(), "a.jar", &[("A.java", "class A {}\n")]);
    let right = write_zip(temp.path(), "b.jar", &[("B.txt", "notes\n")]);

    let output = run_cli(&["compare", arg(&left), arg(&right), "--no-color"]);
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("  A  B.txt"));
    assert!(stdout.contains("  D  A.java"));
    assert!(stdout.contains("+++ B.txt_rev"));
    assert!(stdout.contains("Render file diffs"));
    assert!(!stdout.contains("\x1b["));
}

#[test]
fn test_malformed_archive_reports_structured_error() {
    let temp = TempDir::new().unwrap();
    let left = write_zip(temp.path(), "good.zip", &[("A.java", "class A {}\n")]);
    let broken = temp.path().join("broken.jar");
    fs::write(&broken, b"not a zip archive").unwrap();

    let output = run_cli(&["compare", arg(&left), arg(&broken), "--json"]);
    assert_eq!(output.status.code(), Some(1));

    let stdout = String::from_utf8(output.stdout).unwrap();
    let report: Value = serde_json::from_str(&stdout).expect("error json");
    assert_eq!(report["error"]["kind"], "ArchiveReadError");
    assert!(report["error"]["message"]
        .as_str()
        .unwrap()
        .contains("broken.jar"));
    assert!(report.get("added").is_none());
}

#[test]
fn test_missing_input_fails() {
    let temp = TempDir::new().unwrap();
    let left = write_zip(temp.path(), "left.zip", &[("A.java", "class A {}\n")]);
    let missing = temp.path().join("missing.zip");

    let output = run_cli(&["compare", arg(&left), arg(&missing), "--json"]);
    assert_eq!(output.status.code(), Some(1));

    let report: Value = serde_json::from_slice(&output.stdout).expect("error json");
    assert_eq!(report["error"]["kind"], "IoError");
}

#[test]
fn test_class_vs_source_rejects_invalid_classes() {
    let temp = TempDir::new().unwrap();
    let classes = write_zip(temp.path(), "classes.jar", &[("pkg/A.class", "not bytecode")]);
    let sources = write_zip(temp.path(), "sources.zip", &[("pkg/A.java", "class A {}\n")]);

    let output = run_cli(&[
        "compare",
        arg(&classes),
        arg(&sources),
        "--mode",
        "class-vs-source",
        "--json",
    ]);
    assert_eq!(output.status.code(), Some(1));

    let report: Value = serde_json::from_slice(&output.stdout).expect("error json");
    assert_eq!(report["error"]["kind"], "DecompileError");
    assert!(report["error"]["message"]
        .as_str()
        .unwrap()
        .contains("pkg/A.class"));
}

#[test]
fn test_explicit_config_file() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("srccompare.toml");
    fs::write(&config, "context_lines = 0\ninclude_unchanged = true\n").unwrap();

    let left = write_zip(
        temp.path(),
        "l.zip",
        &[("A.java", "a\nb\nc\n"), ("Same.java", "same\n")],
    );
    let right = write_zip(
        temp.path(),
        "r.zip",
        &[("A.java", "a\nX\nc\n"), ("Same.java", "same\n")],
    );

    let report = run_cli_json(&[
        "compare",
        arg(&left),
        arg(&right),
        "--config",
        arg(&config),
        "--json",
    ]);
    assert_eq!(
        report["modified"]["A.java"]["diff"],
        "--- A.java_orig\n+++ A.java_rev\n@@ -2,1 +2,1 @@\n-b\n+X\n"
    );
    assert_eq!(report["unchanged"], serde_json::json!(["Same.java"]));
}

#[test]
fn test_init_config_writes_defaults() {
    let config_dir = TempDir::new().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_srccompare"))
        .arg("init-config")
        .env("XDG_CONFIG_HOME", config_dir.path())
        .env("APPDATA", config_dir.path())
        .env("HOME", config_dir.path())
        .output()
        .expect("failed to run srccompare");
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("srccompare.toml"));
}
