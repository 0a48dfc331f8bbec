use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::tempdir;

fn skinscan(data_path: &Path) -> Command {
    let mut cmd = Command::cargo_bin("skinscan").unwrap();
    cmd.timeout(Duration::from_secs(5));
    cmd.arg("--data-path").arg(data_path);
    cmd
}

#[test]
fn test_non_image_upload_is_rejected() {
    let dir = tempdir().unwrap();
    let notes = dir.path().join("notes.txt");
    fs::write(&notes, "not a photo").unwrap();

    skinscan(dir.path())
        .args(["scan", "--headless", "--image"])
        .arg(&notes)
        .assert()
        .failure()
        .stdout(predicate::str::contains("Please select an image file"));
}

#[test]
fn test_disguised_upload_is_rejected() {
    let dir = tempdir().unwrap();
    let fake = dir.path().join("selfie.jpg");
    fs::write(&fake, "#!/bin/sh\necho pwned\n").unwrap();

    skinscan(dir.path())
        .args(["scan", "--headless", "--image"])
        .arg(&fake)
        .assert()
        .failure()
        .stdout(predicate::str::contains("Please select an image file"));
}

#[test]
fn test_oversized_upload_is_rejected() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("config.toml"),
        "[scan]\nmax_upload_bytes = 64\n",
    )
    .unwrap();
    let photo = dir.path().join("face.png");
    image::RgbImage::from_fn(64, 64, |x, y| image::Rgb([(x * 4) as u8, (y * 4) as u8, (x ^ y) as u8]))
        .save(&photo)
        .unwrap();

    skinscan(dir.path())
        .args(["scan", "--headless", "--image"])
        .arg(&photo)
        .assert()
        .failure()
        .stdout(predicate::str::contains("Image too large"));
}

#[test]
fn test_secrets_are_masked() {
    let dir = tempdir().unwrap();

    skinscan(dir.path())
        .args(["config", "set", "access_token", "eyJhbGciOiJIUzI1NiJ9.secret"])
        .assert()
        .success()
        .stdout(predicate::str::contains("eyJh****"))
        .stdout(predicate::str::contains("secret").not());

    skinscan(dir.path())
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("eyJhbGciOiJIUzI1NiJ9").not());
}

#[test]
fn test_lookalike_marketplace_domains_are_rejected() {
    let dir = tempdir().unwrap();

    for domain in ["amazon.com/evil", "amazon.com?x=1", "amazon .com", "https://amazon.com"] {
        skinscan(dir.path())
            .args(["config", "set", "marketplace_domains", domain])
            .assert()
            .failure();
    }
}
