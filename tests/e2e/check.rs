use f3_launcher::report::Measurement;
use f3_launcher::{EngineEvent, ErrorCode, StageInfo, Status};
use serial_test::serial;

use crate::harness::{errors, statuses, wait_for_run, F3TestHarness};

#[tokio::test]
#[serial]
async fn test_legacy_check_with_native_output() {
    let h = F3TestHarness::new("legacy_native");
    h.install_native_cui();
    let (engine, mut events) = h.engine().await;

    engine.start_check(h.mount_path()).await.unwrap();
    let events = wait_for_run(&engine, &mut events).await;

    assert_eq!(
        statuses(&events),
        vec![
            Status::Running,
            Status::Staged,
            Status::Progressed,
            Status::Staged,
            Status::Finished
        ],
        "events: {:?}",
        events
    );
    assert!(errors(&events).is_empty(), "events: {:?}", events);

    let EngineEvent::StatusChanged(progressed) = &events[2] else {
        panic!("expected a status change, got {:?}", events[2]);
    };
    assert_eq!(
        progressed.stage,
        StageInfo {
            stage: 1,
            progress: 5000
        }
    );

    let report = engine.report().expect("finished run has a report");
    assert_eq!(engine.status(), Status::Finished);
    assert_eq!(engine.error_code(), ErrorCode::Ok);
    assert_eq!(report.reported_free.to_string(), "4.00 GB");
    assert_eq!(report.writing_speed.to_string(), "12.34 MB/s");
    assert_eq!(report.reading_speed.to_string(), "20.00 MB/s");
    assert_eq!(report.availability(), Some(0.75));
    assert!(!report.success);
    assert!(!engine.is_active());
}

#[tokio::test]
#[serial]
async fn test_tagged_output_across_phases() {
    let h = F3TestHarness::new("tagged");
    h.install_tool(
        "f3write",
        Some("8.0"),
        "echo STAGE 1\necho PROGRESS 50\necho PROGRESS 100\n",
    );
    h.install_tool(
        "f3read",
        Some("8.0"),
        r#"
echo STAGE 2
echo PROGRESS 42.37
echo REPORT_BEGIN
echo "writing speed: 4.10 MB/s"
echo "reported free: 16.00 GB"
echo "actual free: 16.00 GB"
echo "lost space: 0.00 Byte"
echo "success: yes"
echo REPORT_END
"#,
    );
    let (engine, mut events) = h.engine().await;

    engine.start_check(h.mount_path()).await.unwrap();
    let events = wait_for_run(&engine, &mut events).await;

    let stages: Vec<StageInfo> = events
        .iter()
        .filter_map(|event| match event {
            EngineEvent::StatusChanged(change) => Some(change.stage),
            EngineEvent::Error(_) => None,
        })
        .collect();
    assert_eq!(
        stages,
        vec![
            StageInfo::default(),
            StageInfo {
                stage: 1,
                progress: -1
            },
            StageInfo {
                stage: 1,
                progress: 5000
            },
            StageInfo {
                stage: 1,
                progress: 10000
            },
            StageInfo {
                stage: 2,
                progress: -1
            },
            StageInfo {
                stage: 2,
                progress: 4237
            },
            StageInfo {
                stage: 2,
                progress: 4237
            },
        ],
        "events: {:?}",
        events
    );

    let Some(EngineEvent::StatusChanged(last)) = events.last() else {
        panic!("expected a final status change, got {:?}", events);
    };
    assert_eq!(last.status, Status::Finished);
    let report = last.report.as_ref().expect("Finished carries the report");
    assert!(report.success);
    assert_eq!(report.reading_speed, Measurement::Unavailable);
    assert_eq!(report.availability(), Some(1.0));
}

#[tokio::test]
#[serial]
async fn test_cached_files_skip_the_write_phase() {
    let h = F3TestHarness::new("cache_found");
    h.install_tool("f3write", Some("8.0"), "echo 'should not run' >&2\nexit 1\n");
    h.install_tool("f3read", Some("8.0"), crate::harness::READ_NATIVE);
    std::fs::write(h.mount_path().join("1.h2w"), b"").unwrap();
    let (engine, mut events) = h.engine().await;

    assert!(engine.set_option("cache", "write").await);
    engine.start_check(h.mount_path()).await.unwrap();
    let events = wait_for_run(&engine, &mut events).await;

    assert_eq!(
        statuses(&events),
        vec![Status::Running, Status::Staged, Status::Finished],
        "events: {:?}",
        events
    );
    assert!(errors(&events).is_empty());
    assert_eq!(engine.error_code(), ErrorCode::Ok);
}

#[tokio::test]
#[serial]
async fn test_missing_cache_runs_everything_and_says_so() {
    let h = F3TestHarness::new("cache_missing");
    h.install_native_cui();
    let (engine, mut events) = h.engine().await;

    assert!(engine.set_option("cache", "write").await);
    engine.start_check(h.mount_path()).await.unwrap();
    let events = wait_for_run(&engine, &mut events).await;

    assert_eq!(
        events.last(),
        Some(&EngineEvent::Error(ErrorCode::CacheNotFound))
    );
    assert_eq!(statuses(&events).last(), Some(&Status::Finished));
    assert_eq!(engine.status(), Status::Finished);
    assert!(engine.report().is_some());
}

#[tokio::test]
#[serial]
async fn test_old_tools_run_without_progress() {
    let h = F3TestHarness::new("no_progress");
    let refuse_flag = r#"
case "$1" in --show-progress=*) echo "unrecognized option" >&2; exit 64;; esac
"#;
    h.install_tool(
        "f3write",
        None,
        &format!("{}{}", refuse_flag, crate::harness::WRITE_NATIVE),
    );
    h.install_tool(
        "f3read",
        None,
        &format!("{}{}", refuse_flag, crate::harness::READ_NATIVE),
    );
    let (engine, mut events) = h.engine().await;

    engine.start_check(h.mount_path()).await.unwrap();
    let events = wait_for_run(&engine, &mut events).await;

    assert_eq!(events[0], EngineEvent::Error(ErrorCode::NoProgress));
    assert_eq!(errors(&events), vec![ErrorCode::NoProgress]);
    assert_eq!(engine.status(), Status::Finished);
}

#[tokio::test]
#[serial]
async fn test_quick_check_reports_counterfeit() {
    let h = F3TestHarness::new("quick");
    h.install_native_cui();
    h.install_tool("f3probe", Some("8.0"), crate::harness::PROBE_COUNTERFEIT);
    let (engine, mut events) = h.engine().await;

    assert!(engine.set_option("mode", "quick").await);
    engine.start_check(h.device_path()).await.unwrap();
    let events = wait_for_run(&engine, &mut events).await;

    // No f3fix installed: advised up front, the check still runs.
    assert_eq!(events[0], EngineEvent::Error(ErrorCode::NoFix));
    assert_eq!(
        statuses(&events),
        vec![Status::Running, Status::Staged, Status::Finished]
    );

    let report = engine.report().unwrap();
    assert!(!report.success);
    assert!(report.capacity_mismatch());
    assert_eq!(report.last_sector, Some(16_777_215));
    assert_eq!(report.availability(), Some(0.5));
    assert_eq!(report.block_size.to_string(), "512.00 Byte (2^9 Bytes)");
}

#[tokio::test]
#[serial]
async fn test_options_are_locked_during_a_run() {
    let h = F3TestHarness::new("locked");
    h.install_tool("f3write", Some("8.0"), "exec sleep 30\n");
    h.install_tool("f3read", Some("8.0"), crate::harness::READ_NATIVE);
    let (engine, mut events) = h.engine().await;

    engine.start_check(h.mount_path()).await.unwrap();
    assert!(engine.is_active());
    assert!(!engine.set_option("mode", "quick").await);
    assert_eq!(engine.option("mode").as_deref(), Some("legacy"));
    assert_eq!(
        engine.start_check(h.mount_path()).await,
        Err(f3_launcher::EngineError::Busy)
    );

    engine.stop_check().await;
    wait_for_run(&engine, &mut events).await;
    assert!(engine.set_option("mode", "quick").await);
}
