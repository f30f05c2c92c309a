//! Integration tests for the `pyxstub` binary.
//!
//! Each test copies the fixture package into a temporary directory and
//! runs `pyxstub generate` on it.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn copy_dir(from: &Path, to: &Path) {
    std::fs::create_dir_all(to).unwrap();
    for entry in std::fs::read_dir(from).unwrap() {
        let entry = entry.unwrap();
        let target = to.join(entry.file_name());
        if entry.path().is_dir() {
            copy_dir(&entry.path(), &target);
        } else {
            std::fs::copy(entry.path(), target).unwrap();
        }
    }
}

/// A fresh copy of the `shapes` fixture package.
fn shapes_package() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("shapes");
    copy_dir(&fixtures_dir().join("shapes"), &root);
    (dir, root)
}

fn pyxstub(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_pyxstub"))
        .args(args)
        .env("NO_COLOR", "1")
        .output()
        .expect("failed to run pyxstub")
}

fn read(path: PathBuf) -> String {
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("cannot read {}: {}", path.display(), e))
}

// ────────────────────────────────────────────────────────────────────────────
// Writing stubs
// ────────────────────────────────────────────────────────────────────────────

#[test]
fn test_generate_writes_stubs_next_to_sources() {
    let (_dir, root) = shapes_package();
    let output = pyxstub(&["generate", root.to_str().unwrap(), "--color", "never"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    assert_eq!(
        read(root.join("geometry/point.pyi")),
        "class Point:\n    \"\"\"\n    A 2D point.\n    \"\"\"\n    x: object\n    y: object\n    def __init__(self, x: float, y: float) -> None: ...\n"
    );
    assert_eq!(
        read(root.join("geometry/ops.pyi")),
        "from shapes.geometry.point import Point\n\ndef distance(a: object, b: object) -> float: ...\n\ndef midpoint(a: Point, b: Point) -> Point:\n    \"\"\"\n    Point halfway between a and b.\n    \"\"\"\n"
    );
    assert_eq!(
        read(root.join("__init__.pyi")),
        "\"\"\"\nShape primitives.\n\"\"\"\n\nfrom .geometry.point import Point as Point\n"
    );
    assert_eq!(read(root.join("geometry/__init__.pyi")), "");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("shapes.geometry.ops"));
    assert!(stdout.contains("Generated 4 of 4 modules"));
}

#[test]
fn test_dry_run_prints_without_writing() {
    let (_dir, root) = shapes_package();
    let output = pyxstub(&["generate", root.to_str().unwrap(), "--dry-run"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("def distance(a: object, b: object) -> float: ..."));
    assert!(!root.join("geometry/ops.pyi").exists());
}

#[test]
fn test_explicit_config_replaces_package_config() {
    let (dir, root) = shapes_package();
    let config = dir.path().join("other.toml");
    std::fs::write(&config, "[stubgen]\nheader = false\nopaque-type = \"Any\"\n").unwrap();

    let output = pyxstub(&["generate", root.to_str().unwrap(), "--config", config.to_str().unwrap()]);
    assert!(output.status.success());
    let ops = read(root.join("geometry/ops.pyi"));
    assert!(ops.contains("from typing import Any\n"));
    assert!(ops.contains("def distance(a: Any, b: Any) -> Any: ..."));
}

// ────────────────────────────────────────────────────────────────────────────
// Diagnostics and exit codes
// ────────────────────────────────────────────────────────────────────────────

#[test]
fn test_json_report() {
    let (_dir, root) = shapes_package();
    std::fs::write(
        root.join("geometry/extra.pyx"),
        "def make() -> Missing:\n    pass\n",
    )
    .unwrap();

    let output = pyxstub(&["generate", root.to_str().unwrap(), "--format", "json"]);
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let modules = report["modules"].as_array().unwrap();
    assert_eq!(modules.len(), 5);
    assert!(modules.iter().all(|m| m["status"] == "generated"));

    let diagnostics = report["diagnostics"].as_array().unwrap();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0]["code"], "W0001");
    assert_eq!(diagnostics[0]["module"], "shapes.geometry.extra");
    assert_eq!(diagnostics[0]["labels"][0]["start_line"], 1);
}

#[test]
fn test_parse_failure_exits_with_error() {
    let (_dir, root) = shapes_package();
    std::fs::write(root.join("broken.pyx"), "def f(:\n    s = 'open\n").unwrap();

    let output = pyxstub(&["generate", root.to_str().unwrap(), "--color", "never"]);
    assert_eq!(output.status.code(), Some(1));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("E0001"), "stderr: {}", stderr);
    assert!(!root.join("broken.pyi").exists());
    assert!(root.join("geometry/point.pyi").exists());
}

#[test]
fn test_missing_package_dir_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let output = pyxstub(&["generate", dir.path().join("nope").to_str().unwrap()]);
    assert!(!output.status.success());
}

#[test]
fn test_excluded_sources_are_skipped() {
    let (_dir, root) = shapes_package();
    std::fs::create_dir_all(root.join("build")).unwrap();
    std::fs::write(root.join("build/gen.pyx"), "def f(:\n").unwrap();
    std::fs::write(
        root.join("pyxstub.toml"),
        "[stubgen]\nheader = false\nexclude = [\"build\"]\n",
    )
    .unwrap();

    let output = pyxstub(&["generate", root.to_str().unwrap()]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(!root.join("build/gen.pyi").exists());
}
