// ABOUTME: Integration tests for the sandbox manager against SQLite and real child processes
// ABOUTME: Covers exec orchestration, timeouts, review flows and ordered idempotent deletion

#![cfg(unix)]

use sqlx::sqlite::SqlitePoolOptions;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;
use vrooli_sandbox::{
    ChangeKind, CreateSandboxRequest, ExecProfile, ExecRequest, ManagerConfig, OwnerType,
    SandboxError, SandboxManager, SandboxStatus, SandboxStore, TrackerError, KILLED_EXIT_CODE,
};

struct Fixture {
    manager: SandboxManager,
    project: TempDir,
    base: TempDir,
}

async fn fixture() -> Fixture {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let store = SandboxStore::new(pool);
    store.init().await.unwrap();

    let project = TempDir::new().unwrap();
    let scope = project.path().join("app");
    fs::create_dir_all(&scope).unwrap();
    fs::write(scope.join("edit.txt"), "before\n").unwrap();

    let base = TempDir::new().unwrap();
    let manager = SandboxManager::new(store, ManagerConfig::new(base.path()));
    Fixture {
        manager,
        project,
        base,
    }
}

fn create_request(fx: &Fixture) -> CreateSandboxRequest {
    CreateSandboxRequest {
        scope_path: "app".into(),
        project_root: fx.project.path().display().to_string(),
        owner: "agent-7".into(),
        owner_type: OwnerType::Agent,
        metadata: Default::default(),
    }
}

fn shell(sandbox_id: &str, script: &str) -> ExecRequest {
    ExecRequest::new(sandbox_id, "sh").arg("-c").arg(script)
}

#[tokio::test]
async fn test_create_builds_overlay() {
    let fx = fixture().await;
    let sandbox = fx.manager.create(create_request(&fx)).await.unwrap();

    assert_eq!(sandbox.status, SandboxStatus::Active);
    assert!(fx
        .base
        .path()
        .join(&sandbox.id)
        .join("upper/edit.txt")
        .exists());
    assert_eq!(fx.manager.get(&sandbox.id).await.unwrap().status, SandboxStatus::Active);
    assert_eq!(fx.manager.list(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_create_rejects_escaping_scope() {
    let fx = fixture().await;
    let mut request = create_request(&fx);
    request.scope_path = "../outside".into();
    assert!(matches!(
        fx.manager.create(request).await,
        Err(SandboxError::InvalidScope(_))
    ));
    assert!(fx.manager.list(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_execute_captures_output_and_exit_code() {
    let fx = fixture().await;
    let sandbox = fx.manager.create(create_request(&fx)).await.unwrap();

    let result = fx
        .manager
        .execute(shell(&sandbox.id, "echo hello; echo oops >&2; exit 3"))
        .await
        .unwrap();

    assert_eq!(result.exit_code, 3);
    assert!(!result.timed_out);
    assert!(result.output.contains("hello\n"));
    assert!(result.output.contains("oops\n"));
    assert!(result.output.contains("=== Process Exited: code 3"));
    assert!(result
        .log_path
        .ends_with(format!("logs/{}.log", result.pid)));

    let status = fx
        .manager
        .get_process_status(&sandbox.id, result.pid)
        .await
        .unwrap();
    assert!(!status.running);
    assert_eq!(status.process.exit_code, Some(3));

    let tail = fx
        .manager
        .get_process_logs(&sandbox.id, result.pid, 1, 0)
        .await
        .unwrap();
    assert!(tail.starts_with("=== Process Exited: code 3"));
}

#[tokio::test]
async fn test_execute_timeout_kills_process() {
    let fx = fixture().await;
    let sandbox = fx.manager.create(create_request(&fx)).await.unwrap();

    let request = ExecRequest::new(&sandbox.id, "sleep")
        .arg("30")
        .with_timeout(Duration::from_millis(200));
    let result = fx.manager.execute(request).await.unwrap();

    assert!(result.timed_out);
    assert_eq!(result.exit_code, KILLED_EXIT_CODE);
    assert!(fx.manager.stats().await.total_running == 0);
}

#[tokio::test]
async fn test_spawn_failure_leaves_no_pending_log() {
    let fx = fixture().await;
    let sandbox = fx.manager.create(create_request(&fx)).await.unwrap();

    let err = fx
        .manager
        .execute(ExecRequest::new(&sandbox.id, "vrooli-no-such-binary-7f3a"))
        .await
        .unwrap_err();
    assert!(matches!(err, SandboxError::Spawn { .. }));

    let logs = fx.base.path().join(&sandbox.id).join("logs");
    let leftovers: Vec<_> = fs::read_dir(&logs)
        .map(|entries| entries.filter_map(|e| e.ok()).collect())
        .unwrap_or_default();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn test_ended_session_rejects_process_and_cleans_up() {
    let fx = fixture().await;
    let sandbox = fx.manager.create(create_request(&fx)).await.unwrap();
    let session = fx.manager.tracker().start_session(&sandbox.id).await;
    fx.manager.tracker().end_session(&session, false).await.unwrap();

    let mut request = shell(&sandbox.id, "sleep 30");
    request.session_id = Some(session.clone());
    let err = fx.manager.execute(request).await.unwrap_err();
    assert!(matches!(
        err,
        SandboxError::Tracker(TrackerError::SessionEnded(_))
    ));

    assert!(fx.manager.list_processes(&sandbox.id).await.is_empty());
    assert!(fx.manager.tracker().get_session(&session).await.unwrap().pids.is_empty());
    let logs = fx.base.path().join(&sandbox.id).join("logs");
    let leftovers: Vec<_> = fs::read_dir(&logs)
        .map(|entries| entries.filter_map(|e| e.ok()).collect())
        .unwrap_or_default();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn test_profiles_label_the_child() {
    let fx = fixture().await;
    let sandbox = fx.manager.create(create_request(&fx)).await.unwrap();

    let mut request = shell(&sandbox.id, "echo profile=$VROOLI_SANDBOX_PROFILE id=$VROOLI_SANDBOX_ID");
    request.profile = ExecProfile::Restricted;
    let result = fx.manager.execute(request).await.unwrap();

    assert!(result.output.contains("profile=restricted"));
    assert!(result.output.contains(&format!("id={}", sandbox.id)));
}

#[tokio::test]
async fn test_start_and_stop_process() {
    let fx = fixture().await;
    let sandbox = fx.manager.create(create_request(&fx)).await.unwrap();

    let started = fx
        .manager
        .start_process(ExecRequest::new(&sandbox.id, "sleep").arg("30"))
        .await
        .unwrap();
    assert_eq!(started.pgid, started.pid);

    let status = fx
        .manager
        .get_process_status(&sandbox.id, started.pid)
        .await
        .unwrap();
    assert!(status.running);
    assert_eq!(fx.manager.stats().await.sandboxes_with_running, 1);

    fx.manager
        .stop_process(&sandbox.id, started.pid)
        .await
        .unwrap();
    let status = fx
        .manager
        .get_process_status(&sandbox.id, started.pid)
        .await
        .unwrap();
    assert!(!status.running);
    assert_eq!(status.process.exit_code, Some(KILLED_EXIT_CODE));

    assert!(matches!(
        fx.manager.get_process_status("other", started.pid).await,
        Err(SandboxError::Tracker(_))
    ));
}

#[tokio::test]
async fn test_diff_and_approve() {
    let fx = fixture().await;
    let sandbox = fx.manager.create(create_request(&fx)).await.unwrap();

    fx.manager
        .execute(shell(&sandbox.id, "echo after > edit.txt; echo new > added.txt"))
        .await
        .unwrap();

    let changes = fx.manager.diff(&sandbox.id).await.unwrap();
    let kinds: Vec<_> = changes.iter().map(|c| (c.path.as_str(), c.kind)).collect();
    assert_eq!(
        kinds,
        vec![
            ("added.txt", ChangeKind::Added),
            ("edit.txt", ChangeKind::Modified)
        ]
    );

    fx.manager.approve(&sandbox.id).await.unwrap();
    let lower = fx.project.path().join("app");
    assert_eq!(fs::read_to_string(lower.join("edit.txt")).unwrap(), "after\n");
    assert_eq!(fs::read_to_string(lower.join("added.txt")).unwrap(), "new\n");
    assert_eq!(
        fx.manager.get(&sandbox.id).await.unwrap().status,
        SandboxStatus::Approved
    );

    assert!(matches!(
        fx.manager.execute(shell(&sandbox.id, "true")).await,
        Err(SandboxError::Validation(_))
    ));
    assert!(matches!(
        fx.manager.reject(&sandbox.id).await,
        Err(SandboxError::InvalidTransition { .. })
    ));
}

#[tokio::test]
async fn test_reject_discards_changes() {
    let fx = fixture().await;
    let sandbox = fx.manager.create(create_request(&fx)).await.unwrap();

    fx.manager
        .execute(shell(&sandbox.id, "echo after > edit.txt"))
        .await
        .unwrap();
    fx.manager.reject(&sandbox.id).await.unwrap();

    let lower = fx.project.path().join("app");
    assert_eq!(fs::read_to_string(lower.join("edit.txt")).unwrap(), "before\n");
    assert!(!fx.base.path().join(&sandbox.id).join("upper").exists());
}

#[tokio::test]
async fn test_stop_and_start_cycle() {
    let fx = fixture().await;
    let sandbox = fx.manager.create(create_request(&fx)).await.unwrap();

    let stopped = fx.manager.stop(&sandbox.id).await.unwrap();
    assert_eq!(stopped.status, SandboxStatus::Stopped);
    assert!(matches!(
        fx.manager.execute(shell(&sandbox.id, "true")).await,
        Err(SandboxError::Validation(_))
    ));

    let started = fx.manager.start(&sandbox.id).await.unwrap();
    assert_eq!(started.status, SandboxStatus::Active);
    assert_eq!(fx.manager.start(&sandbox.id).await.unwrap().status, SandboxStatus::Active);
}

#[tokio::test]
async fn test_delete_is_ordered_and_idempotent() {
    let fx = fixture().await;
    let sandbox = fx.manager.create(create_request(&fx)).await.unwrap();

    let started = fx
        .manager
        .start_process(ExecRequest::new(&sandbox.id, "sleep").arg("30"))
        .await
        .unwrap();

    fx.manager.delete(&sandbox.id).await.unwrap();

    assert!(!vrooli_sandbox::is_running(started.pid));
    assert!(!fx.base.path().join(&sandbox.id).exists());
    assert!(fx.manager.list_processes(&sandbox.id).await.is_empty());
    assert!(matches!(
        fx.manager.get(&sandbox.id).await,
        Err(SandboxError::NotFound(_))
    ));

    fx.manager.delete(&sandbox.id).await.unwrap();
    fx.manager.delete("never-existed").await.unwrap();
}
