// ABOUTME: Best-effort registry of processes spawned inside sandboxes
// ABOUTME: Group-aware SIGTERM/SIGKILL termination, liveness probes and process sessions

use chrono::Utc;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::{sleep, Instant};
use vrooli_core::new_id;

use crate::error::{TrackerError, TrackerResult};
use crate::types::{ProcessSession, ProcessStats, TrackedProcess};

/// Exit code recorded for processes the tracker terminated.
pub const KILLED_EXIT_CODE: i32 = -1;

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Time between SIGTERM and SIGKILL.
    pub grace_period: Duration,
    /// Time after SIGKILL before the liveness re-check.
    pub kill_wait: Duration,
    /// Poll cadence of `wait_for_process`.
    pub poll_interval: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_millis(100),
            kill_wait: Duration::from_millis(50),
            poll_interval: Duration::from_millis(100),
        }
    }
}

pub struct ProcessTracker {
    config: TrackerConfig,
    processes: RwLock<HashMap<String, Vec<TrackedProcess>>>,
    sessions: RwLock<HashMap<String, ProcessSession>>,
}

impl ProcessTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            processes: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Register `pid`. The process group falls back to the pid when it cannot be read.
    pub async fn track(
        &self,
        sandbox_id: &str,
        pid: u32,
        command: &str,
        session_id: Option<&str>,
    ) -> TrackedProcess {
        let process = TrackedProcess {
            pid,
            pgid: signals::process_group(pid),
            sandbox_id: sandbox_id.to_string(),
            command: command.to_string(),
            started_at: Utc::now(),
            stopped_at: None,
            exit_code: None,
            session_id: session_id.map(str::to_string),
        };

        self.processes
            .write()
            .await
            .entry(sandbox_id.to_string())
            .or_default()
            .push(process.clone());
        process
    }

    pub async fn start_session(&self, sandbox_id: &str) -> String {
        let id = new_id();
        self.sessions.write().await.insert(
            id.clone(),
            ProcessSession {
                id: id.clone(),
                sandbox_id: sandbox_id.to_string(),
                pids: Vec::new(),
                started_at: Utc::now(),
                ended_at: None,
            },
        );
        id
    }

    pub async fn track_in_session(
        &self,
        session_id: &str,
        pid: u32,
        command: &str,
    ) -> TrackerResult<TrackedProcess> {
        let sandbox_id = {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .get_mut(session_id)
                .ok_or_else(|| TrackerError::SessionNotFound(session_id.to_string()))?;
            if session.ended_at.is_some() {
                return Err(TrackerError::SessionEnded(session_id.to_string()));
            }
            session.pids.push(pid);
            session.sandbox_id.clone()
        };
        Ok(self.track(&sandbox_id, pid, command, Some(session_id)).await)
    }

    pub async fn get_session(&self, session_id: &str) -> Option<ProcessSession> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Mark the session ended, optionally terminating its processes.
    pub async fn end_session(&self, session_id: &str, kill_processes: bool) -> TrackerResult<()> {
        let pids = {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .get_mut(session_id)
                .ok_or_else(|| TrackerError::SessionNotFound(session_id.to_string()))?;
            if session.ended_at.is_none() {
                session.ended_at = Some(Utc::now());
            }
            session.pids.clone()
        };

        if !kill_processes {
            return Ok(());
        }

        let mut survivors = Vec::new();
        for pid in pids {
            match self.kill_process(pid).await {
                Ok(()) | Err(TrackerError::NotTracked(_)) => {}
                Err(TrackerError::StillRunning { pids }) => survivors.extend(pids),
                Err(e) => return Err(e),
            }
        }
        if survivors.is_empty() {
            Ok(())
        } else {
            Err(TrackerError::StillRunning { pids: survivors })
        }
    }

    pub async fn get_processes(&self, sandbox_id: &str) -> Vec<TrackedProcess> {
        self.processes
            .read()
            .await
            .get(sandbox_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Processes not yet marked stopped whose pid answers a zero-signal probe.
    pub async fn get_running_processes(&self, sandbox_id: &str) -> Vec<TrackedProcess> {
        self.get_processes(sandbox_id)
            .await
            .into_iter()
            .filter(|p| !p.has_stopped() && is_running(p.pid))
            .collect()
    }

    pub async fn find(&self, pid: u32) -> Option<TrackedProcess> {
        self.processes
            .read()
            .await
            .values()
            .flat_map(|list| list.iter())
            .filter(|p| p.pid == pid)
            .last()
            .cloned()
    }

    /// Terminate every live process of the sandbox in registration order.
    /// Returns how many processes were marked stopped.
    pub async fn kill_all(&self, sandbox_id: &str) -> TrackerResult<usize> {
        let targets: Vec<(u32, u32)> = self
            .get_processes(sandbox_id)
            .await
            .into_iter()
            .filter(|p| !p.has_stopped())
            .map(|p| (p.pid, p.pgid))
            .collect();
        if targets.is_empty() {
            return Ok(0);
        }

        let survivors = self.terminate(&targets).await;
        let stopped: Vec<u32> = targets
            .iter()
            .map(|(pid, _)| *pid)
            .filter(|pid| !survivors.contains(pid))
            .collect();
        self.record_stopped(&stopped, KILLED_EXIT_CODE).await;

        if survivors.is_empty() {
            Ok(stopped.len())
        } else {
            Err(TrackerError::StillRunning { pids: survivors })
        }
    }

    /// Single-pid variant of [`kill_all`](Self::kill_all).
    pub async fn kill_process(&self, pid: u32) -> TrackerResult<()> {
        let process = self.find(pid).await.ok_or(TrackerError::NotTracked(pid))?;
        if process.has_stopped() {
            return Ok(());
        }

        let survivors = self.terminate(&[(process.pid, process.pgid)]).await;
        if survivors.is_empty() {
            self.record_stopped(&[pid], KILLED_EXIT_CODE).await;
            Ok(())
        } else {
            Err(TrackerError::StillRunning { pids: survivors })
        }
    }

    /// Poll until `pid` stops answering the liveness probe or `timeout` elapses.
    ///
    /// The real exit status is not observable this way, so a natural exit is
    /// recorded as code 0 unless one was already known.
    pub async fn wait_for_process(&self, pid: u32, timeout: Duration) -> TrackerResult<()> {
        let started = Instant::now();
        let deadline = started + timeout;
        loop {
            if !is_running(pid) {
                self.record_stopped(&[pid], 0).await;
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(TrackerError::Timeout {
                    pid,
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
            sleep(self.config.poll_interval).await;
        }
    }

    /// Record an exit status observed by whoever owns the child handle.
    pub async fn mark_exited(&self, pid: u32, exit_code: i32) {
        self.record_stopped(&[pid], exit_code).await;
    }

    /// Drop tracking state for the sandbox. Logs are untouched.
    pub async fn cleanup(&self, sandbox_id: &str) -> usize {
        let removed = self
            .processes
            .write()
            .await
            .remove(sandbox_id)
            .map(|list| list.len())
            .unwrap_or(0);
        self.sessions
            .write()
            .await
            .retain(|_, session| session.sandbox_id != sandbox_id);
        removed
    }

    pub async fn get_all_stats(&self) -> ProcessStats {
        let processes = self.processes.read().await;
        let mut stats = ProcessStats::default();
        for list in processes.values() {
            stats.total_tracked += list.len();
            let running = list
                .iter()
                .filter(|p| !p.has_stopped() && is_running(p.pid))
                .count();
            stats.total_running += running;
            if running > 0 {
                stats.sandboxes_with_running += 1;
            }
        }
        stats
    }

    /// SIGTERM, grace period, SIGKILL to group then pid, short wait.
    /// Returns the pids still alive afterwards.
    async fn terminate(&self, targets: &[(u32, u32)]) -> Vec<u32> {
        let live: Vec<(u32, u32)> = targets
            .iter()
            .copied()
            .filter(|(pid, _)| is_running(*pid))
            .collect();
        if live.is_empty() {
            return Vec::new();
        }

        for (pid, pgid) in &live {
            signals::terminate(*pid, *pgid);
        }
        sleep(self.config.grace_period).await;

        let mut escalated = false;
        for (pid, pgid) in &live {
            if is_running(*pid) {
                signals::kill(*pid, *pgid);
                escalated = true;
            }
        }
        if escalated {
            sleep(self.config.kill_wait).await;
        }

        live.into_iter()
            .map(|(pid, _)| pid)
            .filter(|pid| is_running(*pid))
            .collect()
    }

    async fn record_stopped(&self, pids: &[u32], exit_code: i32) {
        let now = Utc::now();
        let mut processes = self.processes.write().await;
        for process in processes.values_mut().flat_map(|list| list.iter_mut()) {
            if pids.contains(&process.pid) && !process.has_stopped() {
                process.stopped_at = Some(now);
                process.exit_code = Some(exit_code);
            }
        }
    }
}

impl Default for ProcessTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

/// True when a zero-signal probe on `pid` succeeds.
pub fn is_running(pid: u32) -> bool {
    signals::probe(pid)
}

#[cfg(unix)]
mod signals {
    use nix::sys::signal::{kill as send, killpg, Signal};
    use nix::unistd::{getpgid, getpgrp, Pid};

    fn to_pid(pid: u32) -> Option<Pid> {
        match i32::try_from(pid) {
            Ok(raw) if raw > 0 => Some(Pid::from_raw(raw)),
            _ => None,
        }
    }

    pub fn probe(pid: u32) -> bool {
        to_pid(pid).is_some_and(|pid| send(pid, None).is_ok())
    }

    pub fn process_group(pid: u32) -> u32 {
        to_pid(pid)
            .and_then(|p| getpgid(Some(p)).ok())
            .map(|pgid| pgid.as_raw() as u32)
            .unwrap_or(pid)
    }

    /// Our own group is never signalled as a whole.
    fn group_target(pgid: u32) -> Option<Pid> {
        if pgid <= 1 || pgid == getpgrp().as_raw() as u32 {
            return None;
        }
        to_pid(pgid)
    }

    pub fn terminate(pid: u32, pgid: u32) {
        if let Some(group) = group_target(pgid) {
            if killpg(group, Signal::SIGTERM).is_ok() {
                return;
            }
        }
        if let Some(pid) = to_pid(pid) {
            let _ = send(pid, Signal::SIGTERM);
        }
    }

    pub fn kill(pid: u32, pgid: u32) {
        if let Some(group) = group_target(pgid) {
            let _ = killpg(group, Signal::SIGKILL);
        }
        if let Some(pid) = to_pid(pid) {
            let _ = send(pid, Signal::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
mod signals {
    pub fn probe(_pid: u32) -> bool {
        false
    }

    pub fn process_group(pid: u32) -> u32 {
        pid
    }

    pub fn terminate(_pid: u32, _pgid: u32) {}

    pub fn kill(_pid: u32, _pgid: u32) {}
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn spawn_sleeper() -> std::process::Child {
        use std::os::unix::process::CommandExt;
        std::process::Command::new("sleep")
            .arg("30")
            .process_group(0)
            .spawn()
            .unwrap()
    }

    #[tokio::test]
    async fn test_track_resolves_process_group() {
        let tracker = ProcessTracker::default();
        let mut child = spawn_sleeper();
        let pid = child.id();

        let tracked = tracker.track("sb-1", pid, "sleep 30", None).await;
        assert_eq!(tracked.pgid, pid);
        assert_eq!(tracker.get_running_processes("sb-1").await.len(), 1);

        let _ = child.kill();
        let _ = child.wait();
    }

    #[tokio::test]
    async fn test_untrackable_pid_falls_back_to_pid_for_group() {
        let tracker = ProcessTracker::default();
        let tracked = tracker.track("sb-1", u32::MAX - 1, "ghost", None).await;
        assert_eq!(tracked.pgid, u32::MAX - 1);
        assert!(tracker.get_running_processes("sb-1").await.is_empty());
    }

    #[tokio::test]
    async fn test_wait_for_process_records_zero_exit() {
        let tracker = ProcessTracker::default();
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        tracker.track("sb-2", pid, "true", None).await;
        let _ = child.wait();

        tracker
            .wait_for_process(pid, Duration::from_secs(2))
            .await
            .unwrap();
        let process = tracker.find(pid).await.unwrap();
        assert_eq!(process.exit_code, Some(0));
        assert!(process.stopped_at.is_some());
    }

    #[tokio::test]
    async fn test_wait_for_process_times_out() {
        let tracker = ProcessTracker::default();
        let mut child = spawn_sleeper();
        let pid = child.id();

        let err = tracker
            .wait_for_process(pid, Duration::from_millis(150))
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::Timeout { .. }));

        let _ = child.kill();
        let _ = child.wait();
    }

    #[tokio::test]
    async fn test_sessions_group_processes() {
        let tracker = ProcessTracker::default();
        let session = tracker.start_session("sb-3").await;
        tracker.track_in_session(&session, 999_999, "a").await.unwrap();
        tracker.track_in_session(&session, 999_998, "b").await.unwrap();

        let recorded = tracker.get_session(&session).await.unwrap();
        assert_eq!(recorded.pids, vec![999_999, 999_998]);
        assert_eq!(tracker.get_processes("sb-3").await.len(), 2);

        tracker.end_session(&session, true).await.unwrap();
        assert!(tracker.get_session(&session).await.unwrap().ended_at.is_some());
        assert!(matches!(
            tracker.track_in_session(&session, 999_997, "c").await,
            Err(TrackerError::SessionEnded(_))
        ));
        assert!(matches!(
            tracker.track_in_session("missing", 1, "x").await,
            Err(TrackerError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cleanup_removes_state() {
        let tracker = ProcessTracker::default();
        tracker.track("sb-4", 999_997, "x", None).await;
        assert_eq!(tracker.cleanup("sb-4").await, 1);
        assert!(tracker.get_processes("sb-4").await.is_empty());
        assert_eq!(tracker.get_all_stats().await, ProcessStats::default());
    }
}
