// ABOUTME: Integration tests for process termination and two-phase process logs
// ABOUTME: Spawns real children in their own process groups so signals never reach the test runner

use tempfile::TempDir;
use vrooli_sandbox::{LoggerConfig, ProcessLogger, ProcessTracker, KILLED_EXIT_CODE};

#[cfg(unix)]
#[tokio::test]
async fn test_kill_all_is_idempotent() {
    let tracker = ProcessTracker::default();

    let mut child = tokio::process::Command::new("sleep")
        .arg("30")
        .process_group(0)
        .spawn()
        .unwrap();
    let pid = child.id().unwrap();
    let reaper = tokio::spawn(async move { child.wait().await });

    let tracked = tracker.track("S", pid, "sleep 30", None).await;
    assert_eq!(tracked.pgid, pid);

    assert_eq!(tracker.kill_all("S").await.unwrap(), 1);
    let stopped = tracker.find(pid).await.unwrap();
    assert!(stopped.stopped_at.is_some());
    assert_eq!(stopped.exit_code, Some(KILLED_EXIT_CODE));

    assert_eq!(tracker.kill_all("S").await.unwrap(), 0);
    assert_eq!(tracker.find(pid).await.unwrap(), stopped);

    let status = reaper.await.unwrap().unwrap();
    assert!(!status.success());
    assert!(tracker.get_running_processes("S").await.is_empty());
}

#[tokio::test]
async fn test_pending_log_finalizes_to_pid_path() {
    let dir = TempDir::new().unwrap();
    let logger = ProcessLogger::new(LoggerConfig::new(dir.path()));

    let pending = logger.create_pending_log("S").await.unwrap();
    let temp_path = pending.writer.path().await;
    pending.writer.write(b"early\n").await.unwrap();

    let writer = logger.finalize_log(pending, 777).await;
    writer.write(b"late\n").await.unwrap();

    let text = logger.read_log("S", 777, 0, 0).await.unwrap();
    assert!(text.contains("early\n"));
    assert!(text.contains("late\n"));
    assert!(!temp_path.exists());
    assert_eq!(writer.path().await, logger.log_path("S", 777));
    assert_eq!(writer.pid().await, Some(777));

    let info = logger.get_log("S", 777).await.unwrap();
    assert!(info.is_active);
    logger.close_log("S", 777, 0).await.unwrap();
    assert!(!logger.get_log("S", 777).await.unwrap().is_active);
}

#[tokio::test]
async fn test_close_unknown_log_is_not_found() {
    let dir = TempDir::new().unwrap();
    let logger = ProcessLogger::new(LoggerConfig::new(dir.path()));
    assert!(matches!(
        logger.close_log("S", 1, 0).await,
        Err(vrooli_sandbox::LoggerError::NotFound { pid: 1, .. })
    ));
}
