// ABOUTME: Per-process log files under <baseDir>/<sandboxId>/logs/<pid>.log
// ABOUTME: Two-phase pending logs, bounded tail reads, polling streams and sandbox cleanup

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use vrooli_core::short_id;

use crate::error::{LoggerError, LoggerResult};
use crate::types::ProcessLogInfo;

/// Bytes read from the end of a file to answer a tail request.
pub const TAIL_READ_BYTES: u64 = 8192;
pub const STREAM_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

const LOGS_DIR: &str = "logs";
const PENDING_PREFIX: &str = "pending_";
const SIZE_LIMIT_MARKER: &str = "\n=== Log size limit reached, further output discarded ===\n";

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub base_dir: PathBuf,
    /// Output beyond this many bytes is discarded.
    pub max_log_size: u64,
    /// Keep log files when a sandbox's logs are cleaned up.
    pub retain_logs: bool,
}

impl LoggerConfig {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            max_log_size: DEFAULT_MAX_LOG_SIZE,
            retain_logs: false,
        }
    }
}

struct WriterState {
    file: Option<File>,
    path: PathBuf,
    pid: Option<u32>,
    size_bytes: u64,
    capped: bool,
}

/// Append-only sink for one process's output.
pub struct LogWriter {
    sandbox_id: String,
    started_at: DateTime<Utc>,
    max_size: u64,
    state: Mutex<WriterState>,
}

impl LogWriter {
    pub fn sandbox_id(&self) -> &str {
        &self.sandbox_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub async fn path(&self) -> PathBuf {
        self.state.lock().await.path.clone()
    }

    pub async fn pid(&self) -> Option<u32> {
        self.state.lock().await.pid
    }

    pub async fn size_bytes(&self) -> u64 {
        self.state.lock().await.size_bytes
    }

    /// Append `data`. Output past the size limit is dropped but still reported
    /// as written so pipe pumps keep draining the child.
    pub async fn write(&self, data: &[u8]) -> LoggerResult<usize> {
        let mut state = self.state.lock().await;
        let WriterState {
            file,
            path,
            size_bytes,
            capped,
            ..
        } = &mut *state;
        let file = file
            .as_mut()
            .ok_or_else(|| LoggerError::Closed(path.display().to_string()))?;

        if *capped {
            return Ok(data.len());
        }

        let room = self.max_size.saturating_sub(*size_bytes) as usize;
        let (chunk, hit_limit) = if data.len() > room {
            (&data[..room], true)
        } else {
            (data, false)
        };

        file.write_all(chunk)
            .await
            .map_err(|e| LoggerError::io(&*path, e))?;
        *size_bytes += chunk.len() as u64;
        if hit_limit {
            file.write_all(SIZE_LIMIT_MARKER.as_bytes())
                .await
                .map_err(|e| LoggerError::io(&*path, e))?;
            *capped = true;
        }
        file.flush().await.map_err(|e| LoggerError::io(&*path, e))?;
        Ok(data.len())
    }

    async fn write_line(&self, line: &str) -> LoggerResult<()> {
        let mut state = self.state.lock().await;
        let WriterState { file, path, .. } = &mut *state;
        let file = file
            .as_mut()
            .ok_or_else(|| LoggerError::Closed(path.display().to_string()))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| LoggerError::io(&*path, e))?;
        file.flush().await.map_err(|e| LoggerError::io(&*path, e))
    }

    async fn close(&self, footer: Option<String>) -> LoggerResult<()> {
        let mut state = self.state.lock().await;
        let Some(mut file) = state.file.take() else {
            return Ok(());
        };
        if let Some(footer) = footer {
            file.write_all(footer.as_bytes())
                .await
                .map_err(|e| LoggerError::io(&state.path, e))?;
        }
        file.flush()
            .await
            .map_err(|e| LoggerError::io(&state.path, e))?;
        file.sync_all()
            .await
            .map_err(|e| LoggerError::io(&state.path, e))
    }
}

/// A log opened before the child's pid is known.
pub struct PendingLog {
    pub temp_id: String,
    pub sandbox_id: String,
    pub writer: Arc<LogWriter>,
}

pub struct ProcessLogger {
    config: LoggerConfig,
    writers: RwLock<HashMap<String, Arc<LogWriter>>>,
    /// Finalized logs whose rename failed, still at their pending path.
    retained: RwLock<HashMap<String, PathBuf>>,
}

impl ProcessLogger {
    pub fn new(config: LoggerConfig) -> Self {
        Self {
            config,
            writers: RwLock::new(HashMap::new()),
            retained: RwLock::new(HashMap::new()),
        }
    }

    pub fn logs_dir(&self, sandbox_id: &str) -> PathBuf {
        self.config.base_dir.join(sandbox_id).join(LOGS_DIR)
    }

    pub fn log_path(&self, sandbox_id: &str, pid: u32) -> PathBuf {
        self.logs_dir(sandbox_id).join(format!("{}.log", pid))
    }

    /// Open `<pid>.log` (truncating) with a header and register its writer.
    pub async fn create_log(&self, sandbox_id: &str, pid: u32) -> LoggerResult<Arc<LogWriter>> {
        let path = self.log_path(sandbox_id, pid);
        let writer = self.open_writer(sandbox_id, path, Some(pid)).await?;
        writer
            .write_line(&header(sandbox_id, Some(pid), writer.started_at))
            .await?;
        self.writers
            .write()
            .await
            .insert(writer_key(sandbox_id, pid), writer.clone());
        Ok(writer)
    }

    /// Open `pending_<tempId>.log` for a child that has not been spawned yet.
    pub async fn create_pending_log(&self, sandbox_id: &str) -> LoggerResult<PendingLog> {
        let temp_id = short_id();
        let path = self
            .logs_dir(sandbox_id)
            .join(format!("{}{}.log", PENDING_PREFIX, temp_id));
        let writer = self.open_writer(sandbox_id, path, None).await?;
        writer
            .write_line(&header(sandbox_id, None, writer.started_at))
            .await?;
        Ok(PendingLog {
            temp_id,
            sandbox_id: sandbox_id.to_string(),
            writer,
        })
    }

    /// Move a pending log to `<pid>.log` and register it under the pid.
    ///
    /// A failed rename keeps the temp path; the writer stays usable either way.
    pub async fn finalize_log(&self, pending: PendingLog, pid: u32) -> Arc<LogWriter> {
        let target = self.log_path(&pending.sandbox_id, pid);
        let key = writer_key(&pending.sandbox_id, pid);
        {
            let mut state = pending.writer.state.lock().await;
            if tokio::fs::rename(&state.path, &target).await.is_ok() {
                state.path = target;
            } else {
                self.retained
                    .write()
                    .await
                    .insert(key.clone(), state.path.clone());
            }
            state.pid = Some(pid);
        }
        self.writers
            .write()
            .await
            .insert(key, pending.writer.clone());
        pending.writer
    }

    /// Close and remove a pending log whose process never started.
    pub async fn abort_pending_log(&self, pending: PendingLog) -> LoggerResult<()> {
        pending.writer.close(None).await?;
        let path = pending.writer.path().await;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LoggerError::io(&path, e)),
        }
    }

    /// Append the exit footer, close the file and deregister the writer.
    pub async fn close_log(&self, sandbox_id: &str, pid: u32, exit_code: i32) -> LoggerResult<()> {
        let writer = self
            .writers
            .write()
            .await
            .remove(&writer_key(sandbox_id, pid))
            .ok_or_else(|| LoggerError::NotFound {
                sandbox_id: sandbox_id.to_string(),
                pid,
            })?;
        writer
            .close(Some(format!(
                "=== Process Exited: code {} | {} ===\n",
                exit_code,
                Utc::now().to_rfc3339()
            )))
            .await
    }

    pub async fn is_active(&self, sandbox_id: &str, pid: u32) -> bool {
        self.writers
            .read()
            .await
            .contains_key(&writer_key(sandbox_id, pid))
    }

    /// Metadata for one log. Activity comes from the registry, not the file.
    pub async fn get_log(&self, sandbox_id: &str, pid: u32) -> LoggerResult<ProcessLogInfo> {
        let path = self.resolve_path(sandbox_id, pid).await;
        let metadata = tokio::fs::metadata(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LoggerError::NotFound {
                    sandbox_id: sandbox_id.to_string(),
                    pid,
                }
            } else {
                LoggerError::io(&path, e)
            }
        })?;

        Ok(ProcessLogInfo {
            sandbox_id: sandbox_id.to_string(),
            pid,
            path,
            size_bytes: metadata.len(),
            is_active: self.is_active(sandbox_id, pid).await,
            modified_at: metadata.modified().ok().map(DateTime::<Utc>::from),
        })
    }

    /// Every `<pid>.log` in the sandbox, ordered by pid.
    pub async fn list_logs(&self, sandbox_id: &str) -> LoggerResult<Vec<ProcessLogInfo>> {
        let dir = self.logs_dir(sandbox_id);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(LoggerError::io(&dir, e)),
        };

        let mut pids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| LoggerError::io(&dir, e))?
        {
            let name = entry.file_name();
            let Some(pid) = name
                .to_str()
                .and_then(|n| n.strip_suffix(".log"))
                .and_then(|stem| stem.parse::<u32>().ok())
            else {
                continue;
            };
            pids.push(pid);
        }
        pids.sort_unstable();

        let mut logs = Vec::with_capacity(pids.len());
        for pid in pids {
            if let Ok(info) = self.get_log(sandbox_id, pid).await {
                logs.push(info);
            }
        }
        Ok(logs)
    }

    /// Last `tail` lines when `tail > 0`, otherwise everything from `offset`.
    pub async fn read_log(
        &self,
        sandbox_id: &str,
        pid: u32,
        tail: usize,
        offset: u64,
    ) -> LoggerResult<String> {
        let path = self.resolve_path(sandbox_id, pid).await;
        let mut file = open_existing(&path, sandbox_id, pid).await?;
        let len = file
            .metadata()
            .await
            .map_err(|e| LoggerError::io(&path, e))?
            .len();

        if tail > 0 {
            let start = len.saturating_sub(TAIL_READ_BYTES);
            let bytes = read_from(&mut file, &path, start).await?;
            let text = String::from_utf8_lossy(&bytes);
            let mut lines: Vec<&str> = text.lines().collect();
            // The first line is partial when the read started mid-file
            if start > 0 && !lines.is_empty() {
                lines.remove(0);
            }
            let keep = lines.len().saturating_sub(tail);
            return Ok(lines[keep..].join("\n"));
        }

        let bytes = read_from(&mut file, &path, offset.min(len)).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Follow the log from its current end, calling `on_chunk` with new bytes.
    ///
    /// Returns once the writer is deregistered and everything has been read,
    /// or `LoggerError::Cancelled` when `cancel` fires first.
    pub async fn stream_log<F>(
        &self,
        sandbox_id: &str,
        pid: u32,
        cancel: CancellationToken,
        mut on_chunk: F,
    ) -> LoggerResult<()>
    where
        F: FnMut(&[u8]) + Send,
    {
        let path = self.resolve_path(sandbox_id, pid).await;
        let mut file = open_existing(&path, sandbox_id, pid).await?;
        let mut position = file
            .seek(SeekFrom::End(0))
            .await
            .map_err(|e| LoggerError::io(&path, e))?;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(LoggerError::Cancelled),
                _ = tokio::time::sleep(STREAM_POLL_INTERVAL) => {}
            }

            // Check before reading so the final bytes are not missed
            let active = self.is_active(sandbox_id, pid).await;
            let len = file
                .metadata()
                .await
                .map_err(|e| LoggerError::io(&path, e))?
                .len();
            if len > position {
                let bytes = read_from(&mut file, &path, position).await?;
                position += bytes.len() as u64;
                if !bytes.is_empty() {
                    on_chunk(&bytes);
                }
            }
            if !active && position >= len {
                return Ok(());
            }
        }
    }

    /// Close every writer of the sandbox and remove its logs directory
    /// unless logs are retained.
    pub async fn cleanup_sandbox_logs(&self, sandbox_id: &str) -> LoggerResult<()> {
        let prefix = format!("{}/", sandbox_id);
        self.retained
            .write()
            .await
            .retain(|k, _| !k.starts_with(&prefix));
        let closing: Vec<Arc<LogWriter>> = {
            let mut writers = self.writers.write().await;
            let keys: Vec<String> = writers
                .keys()
                .filter(|k| k.starts_with(&prefix))
                .cloned()
                .collect();
            keys.iter().filter_map(|k| writers.remove(k)).collect()
        };

        let mut first_error = None;
        for writer in closing {
            if let Err(e) = writer.close(None).await {
                first_error.get_or_insert(e);
            }
        }

        if !self.config.retain_logs {
            let dir = self.logs_dir(sandbox_id);
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    first_error.get_or_insert(LoggerError::io(&dir, e));
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn open_writer(
        &self,
        sandbox_id: &str,
        path: PathBuf,
        pid: Option<u32>,
    ) -> LoggerResult<Arc<LogWriter>> {
        let dir = self.logs_dir(sandbox_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| LoggerError::io(&dir, e))?;
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .await
            .map_err(|e| LoggerError::io(&path, e))?;

        Ok(Arc::new(LogWriter {
            sandbox_id: sandbox_id.to_string(),
            started_at: Utc::now(),
            max_size: self.config.max_log_size,
            state: Mutex::new(WriterState {
                file: Some(file),
                path,
                pid,
                size_bytes: 0,
                capped: false,
            }),
        }))
    }

    /// Active writer path, then a retained pending path, then the pid path.
    async fn resolve_path(&self, sandbox_id: &str, pid: u32) -> PathBuf {
        let key = writer_key(sandbox_id, pid);
        let writer = self.writers.read().await.get(&key).cloned();
        if let Some(writer) = writer {
            return writer.path().await;
        }
        if let Some(path) = self.retained.read().await.get(&key) {
            return path.clone();
        }
        self.log_path(sandbox_id, pid)
    }
}

fn writer_key(sandbox_id: &str, pid: u32) -> String {
    format!("{}/{}", sandbox_id, pid)
}

fn header(sandbox_id: &str, pid: Option<u32>, started_at: DateTime<Utc>) -> String {
    match pid {
        Some(pid) => format!(
            "=== Process Log: sandbox {} | pid {} | started {} ===\n",
            sandbox_id,
            pid,
            started_at.to_rfc3339()
        ),
        None => format!(
            "=== Process Log: sandbox {} | started {} ===\n",
            sandbox_id,
            started_at.to_rfc3339()
        ),
    }
}

async fn open_existing(path: &Path, sandbox_id: &str, pid: u32) -> LoggerResult<File> {
    File::open(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            LoggerError::NotFound {
                sandbox_id: sandbox_id.to_string(),
                pid,
            }
        } else {
            LoggerError::io(path, e)
        }
    })
}

async fn read_from(file: &mut File, path: &Path, start: u64) -> LoggerResult<Vec<u8>> {
    file.seek(SeekFrom::Start(start))
        .await
        .map_err(|e| LoggerError::io(path, e))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .await
        .map_err(|e| LoggerError::io(path, e))?;
    Ok(bytes)
}
