//! End-to-end tests for the terrastream binary.
//!
//! Every test points `--config` at a temporary file so the user's
//! `~/.terrastream` is never read or written.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

/// Run a CLI command and capture output.
fn run_cli(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_terrastream"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute CLI command")
}

/// Assert a command succeeded.
fn assert_success(output: &Output, context: &str) {
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        panic!("{} failed:\nstdout: {}\nstderr: {}", context, stdout, stderr);
    }
}

/// Writes a small single-threaded config logging into `dir/logs`.
fn write_config(dir: &Path) -> PathBuf {
    let path = dir.join("config.ini");
    let content = format!(
        "[terrain]\ntile_size = 5\nmax_level_of_detail = 5\n\n\
         [scheduler]\nworkers = 0\n\n\
         [logging]\ndirectory = {}\nstdout = false\n",
        dir.join("logs").display()
    );
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_config_init_then_show() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.ini");
    let path_arg = path.to_str().unwrap();

    assert_success(&run_cli(&["--config", path_arg, "config", "init"]), "config init");
    assert!(path.exists());

    let output = run_cli(&["--config", path_arg, "config", "show"]);
    assert_success(&output, "config show");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[terrain]"));
    assert!(stdout.contains("tile_size = 17"));

    let output = run_cli(&["--config", path_arg, "config", "init"]);
    assert!(!output.status.success(), "second init should refuse to overwrite");
}

#[test]
fn test_invalid_config_exits_with_error() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.ini");
    std::fs::write(&path, "[terrain]\nprofile = cube\n").unwrap();

    let output = run_cli(&["--config", path.to_str().unwrap(), "config", "show"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("terrain.profile"), "stderr: {stderr}");
}

#[test]
fn test_simulate_runs_and_logs() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path());

    let output = run_cli(&[
        "--config",
        config.to_str().unwrap(),
        "simulate",
        "--frames",
        "90",
        "--fps",
        "0",
        "--speed",
        "0.01",
    ]);
    assert_success(&output, "simulate");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Simulation Summary"));
    assert!(stdout.contains("Frames:           90"));

    let log = std::fs::read_to_string(temp.path().join("logs").join("terrastream.log")).unwrap();
    assert!(log.contains("Terrain root tiles created"));
    assert!(log.contains("Simulation finished"));
}
