use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;
use vgc_lib::{ErrorCategory, VgcOutput};

/// Run `vgc` isolated from the caller's environment and central config.
fn run_vgc(home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_vgc"))
        .args(args)
        .env("HOME", home)
        .env_remove("VGC_API_KEY")
        .env_remove("VGC_SERVER_URL")
        .env_remove("RUST_LOG")
        .output()
        .expect("run vgc")
}

fn parse_error(stdout: &[u8]) -> vgc_lib::ErrorOutput {
    match serde_json::from_slice(stdout).expect("output should be valid JSON") {
        VgcOutput::Error(out) => out,
        other => panic!("expected error output, got {:?}", other),
    }
}

fn write_manifest(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("checkout.yaml");
    std::fs::write(
        &path,
        "app_name: shop\nbrowsers:\n  - { name: chrome, width: 800, height: 600 }\nchecks:\n  - url: https://shop.test/cart\n    tag: cart\n",
    )
    .expect("write manifest");
    path
}

#[test]
fn missing_manifest_is_a_config_error() {
    let dir = TempDir::new().expect("tempdir");
    let manifest = dir.path().join("missing.yaml");

    let output = run_vgc(dir.path(), &["check", "--manifest", manifest.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(2));
    let err = parse_error(&output.stdout);
    assert_eq!(err.error.category, ErrorCategory::Config);
    assert!(err.error.message.contains("missing.yaml"));
}

#[test]
fn invalid_config_exits_with_fatal_code() {
    let dir = TempDir::new().expect("tempdir");
    let cfg_path = dir.path().join("vgc.toml");
    std::fs::write(&cfg_path, "concurrency = 0\n").expect("write config");
    let manifest = write_manifest(dir.path());

    let output = run_vgc(
        dir.path(),
        &[
            "check",
            "--manifest",
            manifest.to_str().unwrap(),
            "--config",
            cfg_path.to_str().unwrap(),
        ],
    );

    assert_eq!(output.status.code(), Some(2));
    let err = parse_error(&output.stdout);
    assert!(err.error.message.contains("concurrency"));
}

#[test]
fn check_without_api_key_fails_the_test() {
    let dir = TempDir::new().expect("tempdir");
    let manifest = write_manifest(dir.path());

    let output = run_vgc(dir.path(), &["check", "--manifest", manifest.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(1));
    let err = parse_error(&output.stdout);
    assert_eq!(err.error.category, ErrorCategory::Auth);
}

#[test]
fn status_requires_render_ids() {
    let dir = TempDir::new().expect("tempdir");

    let output = run_vgc(dir.path(), &["status"]);

    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn unknown_browser_spec_is_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let manifest = write_manifest(dir.path());

    let output = run_vgc(
        dir.path(),
        &[
            "check",
            "--manifest",
            manifest.to_str().unwrap(),
            "--browser",
            "chrome-800-600",
        ],
    );

    assert_eq!(output.status.code(), Some(2));
}
