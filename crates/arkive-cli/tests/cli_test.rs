use arkive_testing::{fixtures, TestDir};
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

fn arkive() -> Command {
    let mut cmd = Command::cargo_bin("arkive").unwrap();
    cmd.env_remove("ARKIVE_PASSWORD").env_remove("ARKIVE_CONFIG");
    cmd
}

#[test]
fn test_cli_version() {
    arkive()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("arkive"));
}

#[test]
fn test_cli_help() {
    arkive()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("A multi-format archive tool"));
}

#[test]
fn test_interactive_flag_exists() {
    arkive()
        .args(["extract", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--interactive"));
}

#[test]
fn test_pack_extract_basic() {
    let test_dir = TestDir::new().unwrap();
    let input = test_dir.create_file("input.txt", b"Test content").unwrap();
    let archive = test_dir.join("test.tar.gz");
    let output = test_dir.join("output");

    arkive()
        .arg("pack")
        .arg(&input)
        .arg("-o")
        .arg(&archive)
        .assert()
        .success();
    assert!(archive.exists());

    arkive()
        .arg("extract")
        .arg(&archive)
        .arg("-o")
        .arg(&output)
        .assert()
        .success();

    assert_eq!(
        fs::read_to_string(output.join("input.txt")).unwrap(),
        "Test content"
    );
}

#[test]
fn test_pack_each_format_and_list() {
    let test_dir = TestDir::new().unwrap();
    let tree = fixtures::create_project_tree(&test_dir, "project").unwrap();

    for format in ["zip", "tar.gz", "tar.xz", "tar.zst", "7z"] {
        let archive = test_dir.join(&format!("out.{}", format));
        arkive()
            .args(["-q", "pack"])
            .arg(&tree)
            .arg("-o")
            .arg(&archive)
            .args(["-f", format])
            .assert()
            .success();

        arkive()
            .args(["-q", "list"])
            .arg(&archive)
            .assert()
            .success()
            .stdout(predicate::str::contains("project/src/main.rs"));

        arkive()
            .args(["-q", "verify"])
            .arg(&archive)
            .assert()
            .success()
            .stdout(predicate::str::starts_with("OK:"));
    }
}

#[test]
fn test_list_json() {
    let test_dir = TestDir::new().unwrap();
    let input = test_dir.create_file("docs/a.md", b"# a").unwrap();
    let archive = test_dir.join("docs.zip");

    arkive()
        .args(["-q", "pack"])
        .arg(input.parent().unwrap())
        .arg("-o")
        .arg(&archive)
        .assert()
        .success();

    let output = arkive()
        .args(["-q", "list", "--json"])
        .arg(&archive)
        .output()
        .unwrap();
    assert!(output.status.success());
    let entries: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let paths: Vec<_> = entries
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["path"].as_str().unwrap().to_string())
        .collect();
    assert!(paths.contains(&"docs/a.md".to_string()));
}

#[test]
fn test_info_reports_format() {
    let test_dir = TestDir::new().unwrap();
    let input = test_dir.create_file("file.txt", b"hello").unwrap();
    let archive = test_dir.join("file.tar.xz");

    arkive()
        .args(["-q", "pack"])
        .arg(&input)
        .arg("-o")
        .arg(&archive)
        .assert()
        .success();

    arkive()
        .args(["-q", "info"])
        .arg(&archive)
        .assert()
        .success()
        .stdout(predicate::str::contains("tar.xz"))
        .stdout(predicate::str::contains("Files:         1"));
}

#[test]
fn test_extract_only_patterns() {
    let test_dir = TestDir::new().unwrap();
    let tree = fixtures::create_project_tree(&test_dir, "project").unwrap();
    let archive = test_dir.join("project.zip");
    let output = test_dir.join("out");

    arkive()
        .args(["-q", "pack"])
        .arg(&tree)
        .arg("-o")
        .arg(&archive)
        .assert()
        .success();

    arkive()
        .args(["-q", "extract"])
        .arg(&archive)
        .arg("-o")
        .arg(&output)
        .args(["--only", "project/src"])
        .assert()
        .success();

    assert!(output.join("project/src/main.rs").is_file());
    assert!(!output.join("project/README.md").exists());
}

#[test]
fn test_extract_hoist() {
    let test_dir = TestDir::new().unwrap();
    let tree = fixtures::create_project_tree(&test_dir, "project").unwrap();
    let archive = test_dir.join("project.tar.zst");
    let output = test_dir.join("out");

    arkive()
        .args(["-q", "pack"])
        .arg(&tree)
        .arg("-o")
        .arg(&archive)
        .assert()
        .success();

    arkive()
        .args(["-q", "extract", "--hoist"])
        .arg(&archive)
        .arg("-o")
        .arg(&output)
        .assert()
        .success();

    assert!(output.join("README.md").is_file());
    assert!(!output.join("project").exists());
}

#[test]
fn test_extract_missing_archive_fails() {
    let test_dir = TestDir::new().unwrap();

    arkive()
        .args(["-q", "extract"])
        .arg(test_dir.join("missing.zip"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("File not found"));
}

#[test]
fn test_corrupted_archive_message() {
    let test_dir = TestDir::new().unwrap();
    let archive = test_dir.create_file("broken.zip", b"PK\x03\x04 not really a zip").unwrap();

    arkive()
        .args(["-q", "list"])
        .arg(&archive)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("damaged"));
}

#[test]
fn test_unknown_format_rejected() {
    let test_dir = TestDir::new().unwrap();
    let input = test_dir.create_file("a.txt", b"a").unwrap();

    arkive()
        .args(["-q", "pack"])
        .arg(&input)
        .arg("-o")
        .arg(test_dir.join("a.rar"))
        .args(["-f", "rar"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Unsupported format"));
}

#[test]
fn test_level_out_of_range_rejected() {
    let test_dir = TestDir::new().unwrap();
    let input = test_dir.create_file("a.txt", b"a").unwrap();

    arkive()
        .args(["-q", "pack"])
        .arg(&input)
        .arg("-o")
        .arg(test_dir.join("a.tar.gz"))
        .args(["-l", "15"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid options"));
}

#[test]
fn test_estimate() {
    let test_dir = TestDir::new().unwrap();
    test_dir.create_file("data/a.bin", &vec![0u8; 1000]).unwrap();

    arkive()
        .args(["-q", "estimate"])
        .arg(test_dir.join("data"))
        .args(["-f", "tar.xz"])
        .assert()
        .success()
        .stdout(predicate::str::diff("300\n"));
}

#[test]
fn test_config_show_uses_explicit_file() {
    let test_dir = TestDir::new().unwrap();
    let config = test_dir
        .create_file("config.toml", b"[pack]\ndefault_format = \"zip\"\n")
        .unwrap();

    arkive()
        .args(["-q", "config", "--show", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("default_format = \"zip\""));
}
