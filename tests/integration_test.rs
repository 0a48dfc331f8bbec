use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::tempdir;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn skinscan(data_path: &Path) -> Command {
    let mut cmd = Command::cargo_bin("skinscan").unwrap();
    cmd.timeout(Duration::from_secs(30));
    cmd.arg("--data-path").arg(data_path);
    cmd
}

fn configure_backend(data_path: &Path, functions_url: &str) {
    skinscan(data_path)
        .args(["config", "set", "functions_url", functions_url])
        .assert()
        .success();
    skinscan(data_path)
        .args(["config", "set", "anon_key", "anon-test-key"])
        .assert()
        .success();
}

#[test]
fn test_config_set_get() {
    let dir = tempdir().unwrap();

    skinscan(dir.path())
        .args(["config", "set", "marketplace_domains", "amazon.com,sephora.com"])
        .assert()
        .success();

    skinscan(dir.path())
        .args(["config", "get", "marketplace_domains"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sephora.com"));
}

#[test]
fn test_headless_scan_with_image() {
    let dir = tempdir().unwrap();
    let photo = dir.path().join("face.png");
    image::RgbImage::from_pixel(64, 48, image::Rgb([200, 160, 140]))
        .save(&photo)
        .unwrap();

    skinscan(dir.path())
        .args(["scan", "--headless", "--image"])
        .arg(&photo)
        .assert()
        .success()
        .stdout(predicate::str::contains("Camera: face.png (64x48)"))
        .stdout(predicate::str::contains("Initializing scan"))
        .stdout(predicate::str::contains("Finalizing results..."))
        .stdout(predicate::str::contains("[100%] Scan complete"))
        .stdout(predicate::str::contains("Skin Tone:"))
        .stdout(predicate::str::contains("Skincare Focus:"));
}

#[test]
fn test_chat_requires_backend_configuration() {
    let dir = tempdir().unwrap();

    skinscan(dir.path())
        .args(["chat", "What helps dry skin?"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("not configured"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_chat_against_mock_backend() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/functions/v1/skincare-ai"))
        .and(header("apikey", "anon-test-key"))
        .and(body_partial_json(json!({"action": "chat", "message": "What helps dry skin?"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": "## Hydration\nTry **CeraVe Moisturizing Cream** (https://www.amazon.com/dp/B00TTD9BRC)"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let data_path = dir.path().to_path_buf();
    let uri = server.uri();

    let output = tokio::task::spawn_blocking(move || {
        configure_backend(&data_path, &uri);
        skinscan(&data_path)
            .args(["chat", "What helps dry skin?"])
            .output()
            .unwrap()
    })
    .await
    .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Hydration\nTry CeraVe Moisturizing Cream (https://www.amazon.com/dp/B00TTD9BRC)"));
    assert!(stdout.contains("• Try CeraVe Moisturizing Cream - https://www.amazon.com/dp/B00TTD9BRC"));
    assert!(!stdout.contains("Saved to your history"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_routine_saves_history_for_signed_in_user() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/functions/v1/skincare-ai"))
        .and(header("Authorization", "Bearer user-token"))
        .and(body_partial_json(json!({
            "action": "generate-routine",
            "skin_type": "oily",
            "concerns": ["acne", "redness"],
            "include_actives": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": "Morning: Gentle Gel Cleanser"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/functions/v1/skincare-history"))
        .and(body_partial_json(json!({"action": "save-chat"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "chatId": "chat-1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let data_path = dir.path().to_path_buf();
    let uri = server.uri();

    let output = tokio::task::spawn_blocking(move || {
        configure_backend(&data_path, &uri);
        skinscan(&data_path)
            .args(["config", "set", "access_token", "user-token"])
            .assert()
            .success();
        skinscan(&data_path)
            .args([
                "routine",
                "--skin-type",
                "oily",
                "--concern",
                "acne",
                "--concern",
                "redness",
                "--include-actives",
            ])
            .output()
            .unwrap()
    })
    .await
    .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Morning: Gentle Gel Cleanser"));
    assert!(stdout.contains("Saved to your history"));
}

#[test]
fn test_history_needs_access_token() {
    let dir = tempdir().unwrap();
    configure_backend(dir.path(), "https://project.example.co");

    skinscan(dir.path())
        .args(["history", "scan"])
        .assert()
        .success()
        .stdout(predicate::str::contains("History needs a signed-in user"));
}

#[test]
fn test_defaults_are_written_on_first_run() {
    let dir = tempdir().unwrap();

    skinscan(dir.path()).arg("config").assert().success();

    let content = fs::read_to_string(dir.path().join("config.toml")).unwrap();
    assert!(content.contains("frame_interval_ms = 33"));
    assert!(content.contains("max_upload_bytes = 5242880"));
    assert!(content.contains("provider = \"simulated\""));
}
