//! Integration tests for the grwm binary.
//!
//! Nothing here touches the network: every `run` case fails validation
//! before a session is created.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper to create a grwm Command isolated from the caller's environment
fn grwm(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("grwm");
    cmd.current_dir(dir.path())
        .env_remove("GRWM_PORT")
        .env_remove("GRWM_HOST")
        .env_remove("RUST_LOG");
    cmd
}

fn temp_dir() -> TempDir {
    TempDir::new().unwrap()
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_grwm_help() {
        let dir = temp_dir();
        grwm(&dir)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("serve"))
            .stdout(predicate::str::contains("run"));
    }

    #[test]
    fn test_grwm_version() {
        let dir = temp_dir();
        grwm(&dir)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_missing_subcommand_fails() {
        let dir = temp_dir();
        grwm(&dir).assert().failure();
    }
}

// =============================================================================
// Config Command Tests
// =============================================================================

mod config_command {
    use super::*;

    #[test]
    fn test_config_show_defaults() {
        let dir = temp_dir();
        grwm(&dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No config file, using defaults"))
            .stdout(predicate::str::contains("[pipeline]"))
            .stdout(predicate::str::contains("max_retries = 3"));
    }

    #[test]
    fn test_config_show_reads_local_file() {
        let dir = temp_dir();
        fs::write(dir.path().join("grwm.toml"), "[server]\nport = 9123\n").unwrap();
        grwm(&dir)
            .arg("config")
            .assert()
            .success()
            .stdout(predicate::str::contains("# Config file: grwm.toml"))
            .stdout(predicate::str::contains("port = 9123"));
    }

    #[test]
    fn test_config_validate_rejects_zero_retries() {
        let dir = temp_dir();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[pipeline]\nmax_retries = 0\n").unwrap();
        grwm(&dir)
            .arg("--config")
            .arg(&path)
            .args(["config", "validate"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("pipeline.max_retries"));
    }

    #[test]
    fn test_config_validate_reports_parse_errors() {
        let dir = temp_dir();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[pipeline\n").unwrap();
        grwm(&dir)
            .arg("--config")
            .arg(&path)
            .args(["config", "validate"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to parse config file"));
    }

    #[test]
    fn test_config_validate_missing_file() {
        let dir = temp_dir();
        grwm(&dir)
            .args(["--config", "does-not-exist.toml", "config", "validate"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to read config file"));
    }

    #[test]
    fn test_config_init_writes_once() {
        let dir = temp_dir();
        grwm(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created grwm.toml"));

        let written = fs::read_to_string(dir.path().join("grwm.toml")).unwrap();
        assert!(written.contains("[github]"));

        grwm(&dir)
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration is valid."));

        grwm(&dir)
            .args(["config", "init"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("already exists"));
    }
}

// =============================================================================
// Run Command Validation
// =============================================================================

mod run_command {
    use super::*;

    #[test]
    fn test_run_rejects_invalid_username() {
        let dir = temp_dir();
        grwm(&dir)
            .args(["run", "not_a_login!"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("not a valid GitHub username"));
    }

    #[test]
    fn test_run_rejects_unknown_style() {
        let dir = temp_dir();
        grwm(&dir)
            .args(["run", "octocat", "--style", "baroque"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid style: baroque"));
    }

    #[test]
    fn test_run_rejects_unknown_tone() {
        let dir = temp_dir();
        grwm(&dir)
            .args(["run", "octocat", "--tone", "pirate"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid tone: pirate"));
    }
}
