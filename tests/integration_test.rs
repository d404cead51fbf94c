use std::fs;
use std::process::{Command, Stdio};
use std::time::Duration;
use tokio::time::sleep;

// Process-level smoke tests: start the binary the way an MCP host would and
// verify it comes up (or refuses to) based on its configuration.

fn write_config(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("sources.toml");
    fs::write(
        &path,
        r#"
        [[sources]]
        tool_name = "example"
        display_name = "Example Docs"
        urls = []
        "#,
    )
    .expect("Failed to write test config");
    path
}

#[tokio::test]
async fn test_stdio_server_startup() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config_path = write_config(dir.path());

    let mut child = Command::new("cargo")
        .args([
            "run",
            "--",
            "--server-type",
            "stdio",
            "--config",
            config_path.to_str().unwrap(),
        ])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("Failed to start server");

    // Give it time to load config and enter the serve loop.
    sleep(Duration::from_secs(5)).await;

    // Still running means startup succeeded.
    assert!(
        child.try_wait().expect("Failed to poll server").is_none(),
        "stdio server exited prematurely"
    );

    child.kill().expect("Failed to kill server process");
}

#[tokio::test]
async fn test_missing_config_is_fatal() {
    let mut child = Command::new("cargo")
        .args([
            "run",
            "--",
            "--server-type",
            "stdio",
            "--config",
            "/nonexistent/sources.toml",
        ])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("Failed to start server");

    // The process must exit on its own with a failure status.
    let mut status = None;
    for _ in 0..60 {
        if let Some(s) = child.try_wait().expect("Failed to poll server") {
            status = Some(s);
            break;
        }
        sleep(Duration::from_secs(1)).await;
    }

    let status = match status {
        Some(s) => s,
        None => {
            child.kill().expect("Failed to kill server process");
            panic!("server kept running despite missing configuration");
        }
    };
    assert!(!status.success(), "expected a non-zero exit status");
}
