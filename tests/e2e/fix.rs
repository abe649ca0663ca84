use f3_launcher::report::Measurement;
use f3_launcher::{EngineError, EngineHandle, ErrorCode, EventReceiver, Status};
use serial_test::serial;

use crate::harness::{errors, statuses, wait_for_run, F3TestHarness, PROBE_COUNTERFEIT};

const RECORD_ARGS: &str = "echo \"$@\" > \"$(dirname \"$0\")/fix-args\"\necho 'F3 fix 8.0'\n";

/// Run a quick check of the harness device and wait for it to finish.
async fn quick_check(h: &F3TestHarness) -> (EngineHandle, EventReceiver) {
    let (engine, mut events) = h.engine().await;
    assert!(engine.set_option("mode", "quick").await);
    engine.start_check(h.device_path()).await.unwrap();
    wait_for_run(&engine, &mut events).await;
    assert_eq!(engine.status(), Status::Finished);
    (engine, events)
}

#[tokio::test]
#[serial]
async fn test_fix_counterfeit_device() {
    let h = F3TestHarness::new("fix");
    h.install_native_cui();
    h.install_tool("f3probe", Some("8.0"), PROBE_COUNTERFEIT);
    h.install_tool("f3fix", Some("8.0"), RECORD_ARGS);
    let (engine, mut events) = quick_check(&h).await;

    engine.start_fix().await.unwrap();
    let events_seen = wait_for_run(&engine, &mut events).await;

    assert!(errors(&events_seen).is_empty(), "events: {:?}", events_seen);
    assert_eq!(statuses(&events_seen).first(), Some(&Status::Running));
    assert_eq!(statuses(&events_seen).last(), Some(&Status::Finished));

    let args = h.tool_output("fix-args").expect("f3fix ran");
    assert_eq!(
        args.trim(),
        format!("--last-sec=16777215 {}", h.device_path().display())
    );

    let report = engine.report().unwrap();
    assert!(report.is_fixed());
    assert_eq!(report.reported_free, Measurement::Fixed);
    assert_eq!(report.last_sector, Some(16_777_215));

    // Already fixed: nothing left to do.
    assert_eq!(
        engine.start_fix().await,
        Err(EngineError::Rejected(ErrorCode::NoReport))
    );
    assert_eq!(engine.status(), Status::Finished);
}

#[tokio::test]
#[serial]
async fn test_fix_without_f3fix() {
    let h = F3TestHarness::new("fix_missing");
    h.install_native_cui();
    h.install_tool("f3probe", Some("8.0"), PROBE_COUNTERFEIT);
    let (engine, _events) = quick_check(&h).await;

    assert_eq!(
        engine.start_fix().await,
        Err(EngineError::Rejected(ErrorCode::NoFix))
    );
    assert_eq!(engine.status(), Status::Finished);
    assert!(engine.report().is_some());
}

#[tokio::test]
#[serial]
async fn test_fix_refuses_oversize_sector() {
    let h = F3TestHarness::new("fix_oversize");
    h.install_native_cui();
    h.install_tool(
        "f3probe",
        Some("8.0"),
        &PROBE_COUNTERFEIT.replace("16777215", "3000000000"),
    );
    h.install_tool("f3fix", Some("8.0"), RECORD_ARGS);
    let (engine, _events) = quick_check(&h).await;

    assert_eq!(engine.report().unwrap().last_sector, Some(3_000_000_000));
    assert_eq!(
        engine.start_fix().await,
        Err(EngineError::Rejected(ErrorCode::Oversize))
    );
    assert!(h.tool_output("fix-args").is_none(), "f3fix must not run");
}

#[tokio::test]
#[serial]
async fn test_failed_fix_drops_the_report() {
    let h = F3TestHarness::new("fix_fails");
    h.install_native_cui();
    h.install_tool("f3probe", Some("8.0"), PROBE_COUNTERFEIT);
    h.install_tool(
        "f3fix",
        Some("8.0"),
        "echo 'Operation not permitted' >&2\nexit 1\n",
    );
    let (engine, mut events) = quick_check(&h).await;

    engine.start_fix().await.unwrap();
    let events = wait_for_run(&engine, &mut events).await;

    assert_eq!(errors(&events), vec![ErrorCode::NoPermission]);
    assert_eq!(statuses(&events).last(), Some(&Status::Ready));
    assert_eq!(engine.status(), Status::Ready);
    assert!(engine.report().is_none());
}

#[tokio::test]
#[serial]
async fn test_genuine_device_has_nothing_to_fix() {
    let h = F3TestHarness::new("fix_genuine");
    h.install_native_cui();
    h.install_tool("f3probe", Some("8.0"), crate::harness::PROBE_GENUINE);
    h.install_tool("f3fix", Some("8.0"), RECORD_ARGS);
    let (engine, _events) = quick_check(&h).await;

    let report = engine.report().unwrap();
    assert!(report.success);
    assert!(!report.capacity_mismatch());
    assert_eq!(
        engine.start_fix().await,
        Err(EngineError::Rejected(ErrorCode::NoReport))
    );
    assert!(h.tool_output("fix-args").is_none());
}

#[tokio::test]
#[serial]
async fn test_fix_targets_the_device_the_report_came_from() {
    let h = F3TestHarness::new("fix_second_device");
    h.install_native_cui();
    h.install_tool("f3probe", Some("8.0"), PROBE_COUNTERFEIT);
    h.install_tool("f3fix", Some("8.0"), RECORD_ARGS);
    let (engine, mut events) = quick_check(&h).await;

    // The second device delivers its report, then the tool fails.
    let second = h.mount_path().join("second.img");
    std::fs::write(&second, b"").unwrap();
    h.install_tool(
        "f3probe",
        Some("8.0"),
        r#"
echo REPORT_BEGIN
echo "availability: 0.5"
echo "last sector: 100"
echo REPORT_END
exit 3
"#,
    );
    engine.start_check(&second).await.unwrap();
    wait_for_run(&engine, &mut events).await;
    assert_eq!(engine.status(), Status::Finished);
    assert_eq!(engine.error_code(), ErrorCode::Unknown);
    assert_eq!(engine.report().unwrap().last_sector, Some(100));

    engine.start_fix().await.unwrap();
    wait_for_run(&engine, &mut events).await;

    let args = h.tool_output("fix-args").expect("f3fix ran");
    assert_eq!(args.trim(), format!("--last-sec=100 {}", second.display()));
}

#[tokio::test]
#[serial]
async fn test_failed_check_forgets_the_previous_device() {
    let h = F3TestHarness::new("fix_after_failure");
    h.install_native_cui();
    h.install_tool("f3probe", Some("8.0"), PROBE_COUNTERFEIT);
    h.install_tool("f3fix", Some("8.0"), RECORD_ARGS);
    let (engine, mut events) = quick_check(&h).await;

    h.install_tool("f3probe", Some("8.0"), "exit 3\n");
    engine.start_check(h.device_path()).await.unwrap();
    wait_for_run(&engine, &mut events).await;
    assert_eq!(engine.status(), Status::Ready);

    assert_eq!(
        engine.start_fix().await,
        Err(EngineError::Rejected(ErrorCode::NoReport))
    );
    assert!(h.tool_output("fix-args").is_none());
}
