use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::time::Duration;
use tempfile::tempdir;

fn skinscan(data_path: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("skinscan").unwrap();
    cmd.timeout(Duration::from_secs(5));
    cmd.arg("--data-path").arg(data_path);
    cmd
}

#[test]
fn test_missing_config_file() {
    let dir = tempdir().unwrap();

    skinscan(dir.path())
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "marketplace_domains: [\"amazon.com\"]",
        ))
        .stdout(predicate::str::contains("provider: simulated"));
}

#[test]
fn test_invalid_toml_config() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("config.toml");

    let invalid_configs = vec![
        ("incomplete_section", "[backend\nfunctions_url = "),
        ("wrong_type", "[scan]\nmax_upload_bytes = \"big\""),
        ("unknown_provider", "[scan]\nprovider = \"webcam_ai\""),
        ("domains_not_list", "[extraction]\nmarketplace_domains = 123"),
    ];

    for (test_name, invalid_content) in invalid_configs {
        fs::write(&config_path, invalid_content).unwrap();

        let output = skinscan(dir.path()).arg("config").output().unwrap();

        assert!(!output.status.success(), "Test '{test_name}' should fail");
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(
            stderr.contains("Invalid config format"),
            "Test '{test_name}' should have config-related error message, got: {stderr}"
        );
        assert!(!stderr.contains("panic"));
    }
}

#[test]
fn test_partial_config_uses_defaults() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("config.toml"),
        "[backend]\nfunctions_url = \"https://abc.example.co\"\n",
    )
    .unwrap();

    skinscan(dir.path())
        .args(["config", "get", "functions_url"])
        .assert()
        .success()
        .stdout(predicate::str::contains("https://abc.example.co"));
    skinscan(dir.path())
        .args(["config", "get", "marketplace_domains"])
        .assert()
        .success()
        .stdout(predicate::str::contains("amazon.com"));
}

#[test]
fn test_unknown_key_is_rejected() {
    let dir = tempdir().unwrap();

    skinscan(dir.path())
        .args(["config", "get", "allowed_domains"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown key"));
}

#[test]
fn test_invalid_values_are_rejected() {
    let dir = tempdir().unwrap();

    let cases = [
        ("provider", "webcam_ai", "Unknown provider"),
        ("functions_url", "ftp://example.com", "http"),
        ("functions_url", "not a url", "Invalid URL"),
        ("marketplace_domains", "amazon.com,bad domain!", "invalid characters"),
        ("model_endpoint", "://missing-scheme", "Invalid URL"),
    ];
    for (key, value, message) in cases {
        skinscan(dir.path())
            .args(["config", "set", key, value])
            .assert()
            .failure()
            .stderr(predicate::str::contains(message));
    }

    // Nothing invalid was persisted.
    skinscan(dir.path())
        .args(["config", "get", "provider"])
        .assert()
        .success()
        .stdout(predicate::str::contains("provider: simulated"));
}

#[test]
fn test_real_model_without_endpoint_fails_scan() {
    let dir = tempdir().unwrap();

    skinscan(dir.path())
        .args(["config", "set", "provider", "real_model"])
        .assert()
        .success();

    skinscan(dir.path())
        .args(["scan", "--headless"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("model_endpoint is not set"));
}

#[cfg(unix)]
#[test]
fn test_config_permission_errors() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    skinscan(dir.path()).arg("config").assert().success();

    let config_path = dir.path().join("config.toml");
    let mut perms = fs::metadata(&config_path).unwrap().permissions();
    perms.set_mode(0o444);
    fs::set_permissions(&config_path, perms).unwrap();

    // Root ignores file modes, so only check that nothing panics.
    let output = skinscan(dir.path())
        .args(["config", "set", "anon_key", "new-key"])
        .output()
        .unwrap();
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("Permission") || stderr.contains("denied"));
    }
    assert!(!String::from_utf8_lossy(&output.stderr).contains("panic"));

    let mut perms = fs::metadata(&config_path).unwrap().permissions();
    perms.set_mode(0o644);
    fs::set_permissions(&config_path, perms).unwrap();
}
