use serial_test::serial;

use crate::harness::{F3TestHarness, PROBE_COUNTERFEIT};

fn stdout(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
#[serial]
fn test_cli_probe_lists_tools() {
    let h = F3TestHarness::new("cli_probe");
    h.install_native_cui();

    let output = h.run_cli(&["probe"]);
    assert!(output.status.success(), "f3l probe failed: {}", stderr(&output));

    let out = stdout(&output);
    assert!(out.contains("✓ f3write"), "output:\n{}", out);
    assert!(out.contains("✗ f3probe"), "output:\n{}", out);
    assert!(out.contains("version  8.0"), "output:\n{}", out);
    assert!(out.contains("quick    unsupported"), "output:\n{}", out);

    h.install_tool("f3probe", Some("8.0"), PROBE_COUNTERFEIT);
    h.install_tool("f3fix", Some("8.0"), "exit 0\n");
    let out = stdout(&h.run_cli(&["probe"]));
    assert!(out.contains("quick    supported"), "output:\n{}", out);
}

#[test]
#[serial]
fn test_cli_probe_json() {
    let h = F3TestHarness::new("cli_probe_json");
    h.install_native_cui();

    let output = h.run_cli(&["probe", "--json"]);
    assert!(output.status.success(), "f3l probe failed: {}", stderr(&output));

    let caps: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("probe --json prints JSON");
    assert!(caps["write"].is_string());
    assert!(caps["probe"].is_null());
    assert_eq!(caps["quick_mode_supported"], false);
    assert_eq!(caps["shows_progress"], true);
}

#[test]
#[serial]
fn test_cli_without_tools() {
    let h = F3TestHarness::new("cli_no_tools");

    let output = h.run_cli(&["probe"]);
    assert_eq!(output.status.code(), Some(129));

    let mount = h.mount_path();
    let output = h.run_cli(&["check", mount.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(129));
    assert!(stderr(&output).contains("Error:"), "stderr:\n{}", stderr(&output));
}

#[test]
#[serial]
fn test_cli_legacy_check() {
    let h = F3TestHarness::new("cli_check");
    h.install_native_cui();

    let mount = h.mount_path();
    let output = h.run_cli(&["check", mount.to_str().unwrap()]);
    assert!(output.status.success(), "f3l check failed: {}", stderr(&output));

    let out = stdout(&output);
    assert!(out.contains("Stage 2"), "output:\n{}", out);
    assert!(out.contains("✗ The device failed the check"), "output:\n{}", out);
    assert!(out.contains("Availability:        75.00%"), "output:\n{}", out);
}

#[test]
#[serial]
fn test_cli_check_json() {
    let h = F3TestHarness::new("cli_check_json");
    h.install_native_cui();

    let mount = h.mount_path();
    let output = h.run_cli(&["check", mount.to_str().unwrap(), "--json"]);
    assert!(output.status.success(), "f3l check failed: {}", stderr(&output));

    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("check --json prints only the report");
    assert_eq!(report["success"], false);
    assert_eq!(report["availability"], 0.75);
    assert_eq!(report["reported_free"], "4.00 GB");
}

#[test]
#[serial]
fn test_cli_exit_codes() {
    let h = F3TestHarness::new("cli_exit_codes");
    h.install_native_cui();

    let missing = h.mount_path().join("gone");
    let output = h.run_cli(&["check", missing.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(128), "stderr:\n{}", stderr(&output));

    let device = h.device_path();
    let output = h.run_cli(&["check", device.to_str().unwrap(), "--quick"]);
    assert_eq!(output.status.code(), Some(133), "stderr:\n{}", stderr(&output));

    // Quick-only flags need --quick.
    let mount = h.mount_path();
    let output = h.run_cli(&["check", mount.to_str().unwrap(), "--fix"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
#[serial]
fn test_cli_quick_check_and_fix() {
    let h = F3TestHarness::new("cli_fix");
    h.install_native_cui();
    h.install_tool("f3probe", Some("8.0"), PROBE_COUNTERFEIT);
    h.install_tool("f3fix", Some("8.0"), "echo 'F3 fix 8.0'\n");

    let device = h.device_path();
    let output = h.run_cli(&["check", device.to_str().unwrap(), "--quick", "--fix"]);
    assert!(output.status.success(), "f3l check failed: {}", stderr(&output));

    let out = stdout(&output);
    assert!(out.contains("Last usable sector:  16777215"), "output:\n{}", out);
    assert!(out.contains("Capacity fixed"), "output:\n{}", out);
}

#[test]
#[serial]
fn test_cli_completions() {
    let h = F3TestHarness::new("cli_completions");

    let output = h.run_cli(&["completions", "bash"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("f3l"));
}
