/// Integration tests for the compiler driver and the conceptionc binary

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use conception_bytecode::Artifact;
use conception_compiler::{Category, CompileOutcome, Compiler, Severity, SourceInput};

const HELLO: &str = r#"unit HelloWorld {
  fun main(args) {
    println("Hello, World");
  }
}
"#;

fn compile_text(dir: &Path, unit: &str, source: &str) -> CompileOutcome {
    Compiler::new()
        .compile(unit, SourceInput::Text(source), dir)
        .expect("compilation should not hit an I/O error")
}

fn conceptionc_bin() -> PathBuf {
    if let Some(path) = option_env!("CARGO_BIN_EXE_conceptionc") {
        return PathBuf::from(path);
    }

    let mut exe = std::env::current_exe().expect("test executable path should be known");
    exe.pop();
    if exe.file_name().and_then(|name| name.to_str()) == Some("deps") {
        exe.pop();
    }
    exe.join("conceptionc")
}

#[test]
fn test_artifact_is_loadable_by_unit_name() {
    let dir = tempfile::tempdir().unwrap();
    let outcome = compile_text(dir.path(), "HelloWorld", HELLO);

    let (artifact, warnings) = match outcome {
        CompileOutcome::Success { artifact, warnings } => (artifact, warnings),
        other => panic!("expected success, got {:?}", other),
    };
    assert!(warnings.is_empty());
    assert_eq!(artifact, dir.path().join("HelloWorld.unit"));

    let loaded = Artifact::read_from(dir.path(), "HelloWorld").unwrap();
    assert_eq!(loaded.unit, "HelloWorld");
    assert_eq!(loaded.source_file, "HelloWorld.seed");
    let (_, main) = loaded.function("main").expect("main should be compiled");
    assert_eq!(main.arity, 1);
}

#[test]
fn test_declared_name_must_match_requested_unit() {
    let dir = tempfile::tempdir().unwrap();
    let source = "unit Goodbye {\n  fun main(args) {}\n}\n";
    let outcome = compile_text(dir.path(), "HelloWorld", source);

    let diagnostics = match outcome {
        CompileOutcome::Failure { diagnostics } => diagnostics,
        other => panic!("expected failure, got {:?}", other),
    };
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].category, Category::NamingContract);
    assert_eq!(diagnostics[0].file, "HelloWorld.seed");
    assert!(diagnostics[0].message.contains("Goodbye"));
    assert!(!dir.path().join("HelloWorld.unit").exists());
    assert!(!dir.path().join("Goodbye.unit").exists());
}

#[test]
fn test_file_name_must_match_requested_unit() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("Other.seed");
    fs::write(&file, HELLO.replace("HelloWorld", "Other")).unwrap();

    let outcome = Compiler::new()
        .compile("HelloWorld", SourceInput::File(&file), dir.path())
        .unwrap();
    assert!(!outcome.is_success());
    assert_eq!(outcome.diagnostics()[0].category, Category::NamingContract);
    assert_eq!((outcome.diagnostics()[0].line, outcome.diagnostics()[0].column), (1, 1));
}

#[test]
fn test_syntax_error_reports_position() {
    let dir = tempfile::tempdir().unwrap();
    let source = "unit HelloWorld {\n  fun main(args) {\n    println(\"a\")\n  }\n}\n";
    let outcome = compile_text(dir.path(), "HelloWorld", source);

    let diagnostics = outcome.diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].category, Category::Syntax);
    assert_eq!(diagnostics[0].line, 4);
    assert!(outcome.diagnostic_text().starts_with("HelloWorld.seed:4:"));
}

#[test]
fn test_diagnostics_keep_emission_order() {
    let dir = tempfile::tempdir().unwrap();
    let source = r#"unit HelloWorld {
  fun main(args) {
    println(missing);
    helper(1, 2);
    break;
  }

  fun helper(x) {
    return x;
  }
}
"#;
    let outcome = compile_text(dir.path(), "HelloWorld", source);
    let categories: Vec<_> = outcome.diagnostics().iter().map(|d| d.category).collect();
    assert_eq!(
        categories,
        vec![Category::UndefinedVariable, Category::ArityMismatch, Category::LoopControl]
    );
    let lines: Vec<_> = outcome.diagnostics().iter().map(|d| d.line).collect();
    assert_eq!(lines, vec![3, 4, 5]);
}

#[test]
fn test_warnings_do_not_fail_compilation() {
    let dir = tempfile::tempdir().unwrap();
    let source = "unit HelloWorld {\n  fun main(args) {\n    var unused = 1;\n  }\n}\n";
    let outcome = compile_text(dir.path(), "HelloWorld", source);

    assert!(outcome.is_success());
    assert_eq!(outcome.diagnostics().len(), 1);
    assert_eq!(outcome.diagnostics()[0].severity, Severity::Warning);
}

#[test]
fn test_recompiling_overwrites_artifact() {
    let dir = tempfile::tempdir().unwrap();
    assert!(compile_text(dir.path(), "HelloWorld", HELLO).is_success());

    let second = HELLO.replace("fun main(args) {", "fun helper() {\n    return 1;\n  }\n\n  fun main(args) {");
    assert!(compile_text(dir.path(), "HelloWorld", &second).is_success());

    let loaded = Artifact::read_from(dir.path(), "HelloWorld").unwrap();
    assert!(loaded.function("helper").is_some());
}

#[test]
fn test_conceptionc_writes_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("HelloWorld.seed");
    fs::write(&source, HELLO).unwrap();
    let out = dir.path().join("out");

    let output = Command::new(conceptionc_bin())
        .arg(&source)
        .arg("-o")
        .arg(&out)
        .output()
        .expect("conceptionc should execute");

    assert_eq!(output.status.code(), Some(0));
    assert!(out.join("HelloWorld.unit").exists());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Wrote:"), "unexpected stdout: {stdout}");
}

#[test]
fn test_conceptionc_reports_json_diagnostics() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("HelloWorld.seed");
    fs::write(&source, "unit HelloWorld {\n  fun main(args) {\n    nope();\n  }\n}\n").unwrap();

    let output = Command::new(conceptionc_bin())
        .arg(&source)
        .arg("--message-format")
        .arg("json")
        .output()
        .expect("conceptionc should execute");

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let first = stdout.lines().next().expect("one diagnostic line");
    let value: serde_json::Value = serde_json::from_str(first).unwrap();
    assert_eq!(value["severity"], "error");
    assert_eq!(value["category"], "undefined_function");
    assert_eq!(value["line"], 3);
}

#[test]
fn test_conceptionc_json_stdout_holds_only_diagnostics() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("HelloWorld.seed");
    fs::write(&source, "unit HelloWorld {\n  fun main(args) {\n    var unused = 1;\n  }\n}\n").unwrap();

    let output = Command::new(conceptionc_bin())
        .arg(&source)
        .arg("-v")
        .arg("--message-format")
        .arg("json")
        .output()
        .expect("conceptionc should execute");

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<_> = stdout.lines().collect();
    assert_eq!(lines.len(), 1, "unexpected stdout: {stdout}");
    let value: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(value["severity"], "warning");
    assert!(String::from_utf8_lossy(&output.stderr).contains("Wrote:"));
}
