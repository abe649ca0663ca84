use std::time::{Duration, Instant};

use f3_launcher::{ErrorCode, Status};
use serial_test::serial;

use crate::harness::{errors, statuses, wait_for_event, wait_for_run, F3TestHarness};

#[tokio::test]
#[serial]
async fn test_stop_terminates_gracefully() {
    let h = F3TestHarness::new("stop_graceful");
    h.install_tool("f3write", Some("8.0"), "echo PROGRESS 10\nexec sleep 30\n");
    h.install_tool("f3read", Some("8.0"), crate::harness::READ_NATIVE);
    let (engine, mut events) = h.engine().await;

    engine.start_check(h.mount_path()).await.unwrap();
    wait_for_event(&mut events, |e| e.status() == Some(Status::Progressed)).await;

    engine.stop_check().await;

    let rest = wait_for_run(&engine, &mut events).await;
    assert_eq!(statuses(&rest), vec![Status::Stopped]);
    assert!(errors(&rest).is_empty());
    assert_eq!(engine.status(), Status::Stopped);
    assert!(engine.report().is_none());
    assert!(!engine.is_active());
}

#[tokio::test]
#[serial]
async fn test_stop_kills_a_tool_that_ignores_sigterm() {
    let h = F3TestHarness::new("stop_forced");
    h.install_tool(
        "f3write",
        Some("8.0"),
        "trap '' TERM\necho PROGRESS 10\nwhile true; do sleep 1; done\n",
    );
    h.install_tool("f3read", Some("8.0"), crate::harness::READ_NATIVE);
    let (engine, mut events) = h.engine().await;

    engine.start_check(h.mount_path()).await.unwrap();
    wait_for_event(&mut events, |e| e.status() == Some(Status::Progressed)).await;

    let started = Instant::now();
    engine.stop_check().await;
    assert!(started.elapsed() >= Duration::from_millis(300));

    let rest = wait_for_run(&engine, &mut events).await;
    assert_eq!(statuses(&rest), vec![Status::Stopped]);
    assert!(errors(&rest).is_empty());
    assert_eq!(engine.status(), Status::Stopped);
    assert_eq!(engine.error_code(), ErrorCode::Ok);
}

#[tokio::test]
#[serial]
async fn test_new_run_after_stop() {
    let h = F3TestHarness::new("stop_restart");
    h.install_tool("f3write", Some("8.0"), "exec sleep 30\n");
    h.install_tool("f3read", Some("8.0"), crate::harness::READ_NATIVE);
    let (engine, mut events) = h.engine().await;

    engine.start_check(h.mount_path()).await.unwrap();
    engine.stop_check().await;
    wait_for_run(&engine, &mut events).await;
    assert_eq!(engine.status(), Status::Stopped);

    h.install_tool("f3write", Some("8.0"), crate::harness::WRITE_NATIVE);
    engine.start_check(h.mount_path()).await.unwrap();
    let events = wait_for_run(&engine, &mut events).await;

    assert_eq!(statuses(&events).first(), Some(&Status::Running));
    assert_eq!(engine.status(), Status::Finished);
}

#[tokio::test]
#[serial]
async fn test_dropping_the_engine_stops_the_tool() {
    let h = F3TestHarness::new("stop_drop");
    let pid_file = h.bin_dir().join("pid");
    h.install_tool(
        "f3write",
        Some("8.0"),
        &format!("echo $$ > {}\necho PROGRESS 1\nexec sleep 30\n", pid_file.display()),
    );
    h.install_tool("f3read", Some("8.0"), crate::harness::READ_NATIVE);
    let (engine, mut events) = h.engine().await;

    engine.start_check(h.mount_path()).await.unwrap();
    wait_for_event(&mut events, |e| e.status() == Some(Status::Progressed)).await;
    let pid: i32 = std::fs::read_to_string(&pid_file)
        .unwrap()
        .trim()
        .parse()
        .unwrap();

    drop(engine);
    // The engine task ends once it has stopped the tool, closing the stream.
    tokio::time::timeout(Duration::from_secs(5), async {
        while events.recv().await.is_some() {}
    })
    .await
    .expect("engine task ends");

    let alive = nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_ok();
    assert!(!alive, "tool process {} survived the engine", pid);
}
