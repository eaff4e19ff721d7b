mod common;

use common::{stderr, stdout, CliHarness};

#[test]
fn test_help_lists_roles() {
    let harness = CliHarness::new();
    let output = harness.run(&["--help"]);

    assert!(output.status.success());
    let help = stdout(&output);
    assert!(help.contains("host"), "help should list the host role");
    assert!(help.contains("guest"), "help should list the guest role");
    assert!(!help.contains("completion"), "completion stays hidden");
}

#[test]
fn test_host_help_shows_flags() {
    let harness = CliHarness::new();
    let output = harness.run(&["host", "--help"]);

    assert!(output.status.success());
    let help = stdout(&output);
    for flag in ["--socket", "--dial", "--persistent", "--clipboard", "--config"] {
        assert!(help.contains(flag), "missing {flag}");
    }
}

#[test]
fn test_completion_script_is_printed() {
    let harness = CliHarness::new();
    let output = harness.run(&["completion", "bash"]);

    assert!(output.status.success());
    assert!(stdout(&output).contains("clipbridge"));
}

#[test]
fn test_unknown_backend_is_a_usage_error() {
    let harness = CliHarness::new();
    let output = harness.run(&["guest", "--clipboard", "carrier-pigeon"]);

    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_unknown_config_key_fails_before_start() {
    let harness = CliHarness::new();
    let config = harness.write_config(r#"{"sokcet": "/tmp/x.sock"}"#);
    let output = harness.run_with_config(&config, &["host"]);

    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.starts_with("Error: Configuration error"), "{err}");
    assert!(err.contains("sokcet"), "{err}");
}

#[test]
fn test_missing_explicit_config_fails() {
    let harness = CliHarness::new();
    let missing = harness.path("absent.json");
    let output = harness.run_with_config(&missing, &["guest"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("absent.json"));
}

#[test]
fn test_guest_without_device_exits_with_error() {
    let harness = CliHarness::new();
    let device = harness.path("vport0p1");
    let device = device.to_str().expect("non-UTF-8 temp path");
    let output = harness.run(&["--clipboard", "poll", "guest", "--device", device]);

    // Either the clipboard or the port is unavailable; both are fatal.
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Error:"));
}
