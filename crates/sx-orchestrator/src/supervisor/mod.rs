//! Engine process supervisor
//!
//! Owns the single sing-box subprocess and drives its lifecycle:
//!
//! ```text
//! Stopped -> Starting -> Running -> Stopping -> Stopped
//!                           |
//!                           +-> Crashed -> Stopped   (unexpected exit)
//! ```
//!
//! # Locking
//!
//! `start`, `stop` and `restart` are serialized by one async mutex around the
//! process slot. Lifecycle state is published through a `watch` channel, so
//! readers never touch that mutex.
//!
//! Each running engine has a monitor task that owns the `Child`. The monitor
//! waits for either process exit (a crash, reported straight to the status
//! channel) or the handle's stop token (graceful termination, bounded by the
//! stop grace, then a forced kill). Crash reporting therefore never depends on
//! whoever currently holds the lock.
//!
//! # Stop during start
//!
//! The mutex is fair, so a `stop()` issued while `start()` is mid-flight queues
//! behind it: the start completes (or fails) first and the stop then tears the
//! new process down. No spawn is ever abandoned half way.
//!
//! # Cancellation
//!
//! Lifecycle calls may be dropped mid-flight (an HTTP client giving up, a
//! timeout). A dropped start resets the published state to `Stopped`; the
//! half-launched child dies with its `Child`. A dropped stop leaves the handle
//! in the slot and the monitor finishes the termination on its own, publishing
//! `Stopped` once the process is gone. The slot only gives up a handle after
//! its process has been reaped, so `start()` cannot overlap a dying engine.

mod binary;
mod logs;

pub use binary::{engine_file_name, locate_engine_binary};
pub use logs::LogBuffer;

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use sx_core::api::{EngineInfo, LogStream};
use sx_core::config::EngineConfig;
use sx_core::time::current_time_millis;
use sx_core::types::{EngineState, ExitReport};
use sx_core::ProcessError;

/// Time allowed for the engine to be reaped after a forced kill. A stop that
/// outlasts `stop_grace + KILL_WAIT` fails with `StopTimeout`.
const KILL_WAIT: Duration = Duration::from_secs(2);

/// How long a failed startup waits for the stderr reader to drain.
const STDERR_DRAIN: Duration = Duration::from_millis(200);

/// Settings controlling how the engine is launched and stopped
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    /// Engine binary; located on demand when unset
    pub binary: Option<PathBuf>,
    /// Engine arguments
    pub args: Vec<String>,
    /// Working directory
    pub working_dir: Option<PathBuf>,
    /// Minimum lifetime before a start counts as successful
    pub startup_grace: Duration,
    /// Wait after the termination request before killing
    pub stop_grace: Duration,
    /// Output lines kept in the log buffer
    pub log_capacity: usize,
}

impl From<&EngineConfig> for SupervisorSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            args: config.args.clone(),
            working_dir: config.working_dir.clone(),
            startup_grace: config.startup_grace,
            stop_grace: config.stop_grace,
            log_capacity: config.log_capacity,
        }
    }
}

/// Published lifecycle state of the engine
#[derive(Debug, Clone, Default)]
pub struct SupervisorStatus {
    /// Current state
    pub state: EngineState,
    /// Pid of the live process
    pub pid: Option<u32>,
    /// When the current run reached `Running`
    pub started_at: Option<Instant>,
    /// Incremented on every start attempt
    pub run_id: u64,
    /// How the previous run ended
    pub last_exit: Option<ExitReport>,
}

impl SupervisorStatus {
    /// Whether the engine is up
    pub fn is_running(&self) -> bool {
        self.state == EngineState::Running
    }

    /// Time since the current run started, zero when not running
    pub fn uptime(&self) -> Duration {
        match (self.state, self.started_at) {
            (EngineState::Running | EngineState::Stopping, Some(at)) => at.elapsed(),
            _ => Duration::ZERO,
        }
    }

    /// API view of the state
    pub fn info(&self) -> EngineInfo {
        EngineInfo {
            state: self.state,
            pid: self.pid,
        }
    }
}

/// Result of a successful `stop()`
#[derive(Debug, Clone)]
pub enum StopOutcome {
    /// Nothing was running; nothing was done
    NotRunning,
    /// The engine was stopped
    Stopped(ExitReport),
}

/// A live engine process
struct ProcessHandle {
    run_id: u64,
    pid: Option<u32>,
    config: Arc<Value>,
    stop: CancellationToken,
    monitor: JoinHandle<Result<ExitReport, ProcessError>>,
}

#[derive(Default)]
struct Slot {
    /// Present from a successful launch until stopped or reaped after a crash
    handle: Option<ProcessHandle>,
    /// Config of the most recent successful start
    last_config: Option<Arc<Value>>,
}

/// Supervisor for the engine subprocess
pub struct Supervisor {
    settings: SupervisorSettings,
    slot: Mutex<Slot>,
    status: Arc<watch::Sender<SupervisorStatus>>,
    logs: Arc<LogBuffer>,
    runs: AtomicU64,
}

impl Supervisor {
    /// Create a supervisor with no engine running
    pub fn new(settings: SupervisorSettings) -> Self {
        let (status, _) = watch::channel(SupervisorStatus::default());
        let logs = Arc::new(LogBuffer::new(settings.log_capacity));
        Self {
            settings,
            slot: Mutex::new(Slot::default()),
            status: Arc::new(status),
            logs,
            runs: AtomicU64::new(0),
        }
    }

    /// Current lifecycle state, without taking the lifecycle lock
    pub fn status(&self) -> SupervisorStatus {
        self.status.borrow().clone()
    }

    /// Subscribe to lifecycle changes
    pub fn subscribe(&self) -> watch::Receiver<SupervisorStatus> {
        self.status.subscribe()
    }

    /// Captured engine output
    pub fn logs(&self) -> &Arc<LogBuffer> {
        &self.logs
    }

    /// Launch settings
    pub fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    /// Config the engine was last started with
    pub async fn last_config(&self) -> Option<Arc<Value>> {
        self.slot.lock().await.last_config.clone()
    }

    /// Start the engine with `config`.
    ///
    /// Fails with `AlreadyRunning` unless the engine is stopped. The config is
    /// serialized to JSON and written to the engine's stdin. The start only
    /// succeeds once the process has survived the startup grace period.
    pub async fn start(&self, config: Value) -> Result<EngineInfo, ProcessError> {
        let mut slot = self.slot.lock().await;
        self.start_locked(&mut slot, Arc::new(config)).await
    }

    /// Stop the engine.
    ///
    /// Idempotent: returns `StopOutcome::NotRunning` without side effects when
    /// nothing is running.
    pub async fn stop(&self) -> Result<StopOutcome, ProcessError> {
        let mut slot = self.slot.lock().await;
        self.stop_locked(&mut slot).await
    }

    /// Stop then start, atomically with respect to other lifecycle calls.
    ///
    /// Uses `config` when given, otherwise the config of the current or most
    /// recent run. A failed stop aborts the restart.
    pub async fn restart(&self, config: Option<Value>) -> Result<EngineInfo, ProcessError> {
        let mut slot = self.slot.lock().await;

        let config = match config {
            Some(config) => Arc::new(config),
            None => slot
                .handle
                .as_ref()
                .map(|h| Arc::clone(&h.config))
                .or_else(|| slot.last_config.clone())
                .ok_or(ProcessError::NoConfig)?,
        };

        if let Err(e) = self.stop_locked(&mut slot).await {
            tracing::error!("Restart aborted, engine stop failed: {}", e);
            return Err(e);
        }

        self.start_locked(&mut slot, config).await
    }

    async fn start_locked(
        &self,
        slot: &mut Slot,
        config: Arc<Value>,
    ) -> Result<EngineInfo, ProcessError> {
        self.reap(slot).await;
        if let Some(handle) = &slot.handle {
            return Err(ProcessError::AlreadyRunning { pid: handle.pid });
        }

        let payload =
            serde_json::to_vec(config.as_ref()).map_err(|e| ProcessError::Serialize(e.to_string()))?;
        let program = match &self.settings.binary {
            Some(path) => path.clone(),
            None => locate_engine_binary()?,
        };

        let run_id = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        self.status.send_modify(|s| {
            s.state = EngineState::Starting;
            s.pid = None;
            s.started_at = None;
            s.run_id = run_id;
        });
        let mut pending = PendingStart {
            status: self.status.as_ref(),
            run_id,
            armed: true,
        };

        let child = match self.launch(&program, payload).await {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!("Engine failed to start: {}", e);
                return Err(e);
            }
        };
        pending.armed = false;

        let pid = child.id();
        self.status.send_modify(|s| {
            s.state = EngineState::Running;
            s.pid = pid;
            s.started_at = Some(Instant::now());
        });

        let stop = CancellationToken::new();
        let monitor = tokio::spawn(monitor(
            child,
            run_id,
            stop.clone(),
            self.settings.stop_grace,
            Arc::clone(&self.status),
        ));

        slot.handle = Some(ProcessHandle {
            run_id,
            pid,
            config: Arc::clone(&config),
            stop,
            monitor,
        });
        slot.last_config = Some(config);

        tracing::info!(pid = ?pid, "Engine running ({})", program.display());
        Ok(EngineInfo {
            state: EngineState::Running,
            pid,
        })
    }

    async fn stop_locked(&self, slot: &mut Slot) -> Result<StopOutcome, ProcessError> {
        self.reap(slot).await;
        let Some(handle) = slot.handle.as_mut() else {
            return Ok(StopOutcome::NotRunning);
        };

        let run_id = handle.run_id;
        self.status.send_if_modified(|s| {
            // An exit the monitor already published must not be overwritten.
            if s.run_id != run_id || s.state != EngineState::Running {
                return false;
            }
            s.state = EngineState::Stopping;
            true
        });
        tracing::info!(pid = ?handle.pid, "Stopping engine");

        // The handle stays in the slot until the monitor has reaped the
        // process; the monitor publishes the final state.
        handle.stop.cancel();
        let deadline = self.settings.stop_grace + KILL_WAIT;
        let joined = match tokio::time::timeout(deadline, &mut handle.monitor).await {
            Ok(joined) => joined,
            Err(_) => {
                tracing::error!(pid = ?handle.pid, "Engine still alive {:?} after stop", deadline);
                return Err(ProcessError::StopTimeout(deadline));
            }
        };
        slot.handle = None;

        let result = match joined {
            Ok(result) => result,
            Err(e) => {
                self.status.send_modify(|s| {
                    if s.run_id == run_id {
                        s.state = EngineState::Stopped;
                        s.pid = None;
                        s.started_at = None;
                    }
                });
                Err(ProcessError::Io(std::io::Error::other(format!(
                    "engine monitor failed: {}",
                    e
                ))))
            }
        };

        match result {
            Ok(report) => {
                tracing::info!("Engine stopped ({})", report.reason);
                Ok(StopOutcome::Stopped(report))
            }
            Err(e) => Err(e),
        }
    }

    /// Drop the handle of a process whose monitor has already observed its exit.
    async fn reap(&self, slot: &mut Slot) {
        let finished = slot
            .handle
            .as_ref()
            .map_or(false, |h| h.monitor.is_finished());
        if !finished {
            return;
        }
        if let Some(handle) = slot.handle.take() {
            match handle.monitor.await {
                Ok(Ok(report)) => {
                    tracing::debug!(pid = ?handle.pid, "Reaped exited engine ({})", report.reason)
                }
                Ok(Err(e)) => tracing::debug!(pid = ?handle.pid, "Reaped engine: {}", e),
                Err(e) => tracing::debug!(pid = ?handle.pid, "Engine monitor failed: {}", e),
            }
        }
    }

    /// Spawn the process, feed it the config and wait out the startup grace.
    async fn launch(&self, program: &Path, payload: Vec<u8>) -> Result<Child, ProcessError> {
        let mut cmd = Command::new(program);
        cmd.args(&self.settings.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.settings.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| ProcessError::Spawn(format!("{}: {}", program.display(), e)))?;

        // The engine may never read stdin; the pipe must not block the lock holder.
        if let Some(mut stdin) = child.stdin.take() {
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&payload).await {
                    tracing::debug!("Failed to write engine config: {}", e);
                    return;
                }
                let _ = stdin.shutdown().await;
            });
        }
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(logs::capture(stdout, LogStream::Stdout, Arc::clone(&self.logs)));
        }
        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(logs::capture(stderr, LogStream::Stderr, Arc::clone(&self.logs))));

        match tokio::time::timeout(self.settings.startup_grace, child.wait()).await {
            Err(_) => Ok(child),
            Ok(Ok(status)) => {
                if let Some(task) = stderr_task {
                    let _ = tokio::time::timeout(STDERR_DRAIN, task).await;
                }
                let mut reason = format!("engine exited during startup ({})", describe_exit(&status));
                if let Some(line) = self.logs.last_stderr() {
                    reason.push_str(": ");
                    reason.push_str(&line);
                }
                Err(ProcessError::Spawn(reason))
            }
            Ok(Err(e)) => {
                let _ = child.start_kill();
                Err(ProcessError::Io(e))
            }
        }
    }
}

/// Resets the published state of a start whose caller went away mid-launch
struct PendingStart<'a> {
    status: &'a watch::Sender<SupervisorStatus>,
    run_id: u64,
    armed: bool,
}

impl Drop for PendingStart<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let run_id = self.run_id;
        self.status.send_modify(|s| {
            if s.run_id == run_id {
                s.state = EngineState::Stopped;
                s.pid = None;
                s.started_at = None;
            }
        });
    }
}

/// Watch one engine run until it exits or is asked to stop.
///
/// Publishes `Stopped` for its run once the process is gone, whether or not
/// anyone is still waiting on the stop.
async fn monitor(
    mut child: Child,
    run_id: u64,
    stop: CancellationToken,
    grace: Duration,
    status: Arc<watch::Sender<SupervisorStatus>>,
) -> Result<ExitReport, ProcessError> {
    let pid = child.id();

    let result = tokio::select! {
        result = child.wait() => {
            let requested = stop.is_cancelled();
            let report = match result {
                Ok(exit) => exit_report(&exit, requested, None),
                Err(e) => ExitReport {
                    code: None,
                    reason: format!("wait failed: {}", e),
                    requested,
                    at: current_time_millis(),
                },
            };

            if !requested {
                tracing::warn!(pid = ?pid, "Engine exited unexpectedly ({})", report.reason);
                status.send_modify(|s| {
                    if s.run_id == run_id {
                        s.state = EngineState::Crashed;
                        s.last_exit = Some(report.clone());
                    }
                });
            }
            Ok(report)
        }
        _ = stop.cancelled() => terminate(&mut child, pid, grace).await,
    };

    status.send_modify(|s| {
        if s.run_id == run_id {
            s.state = EngineState::Stopped;
            s.pid = None;
            s.started_at = None;
            if let Ok(report) = &result {
                s.last_exit = Some(report.clone());
            }
        }
    });
    result
}

/// Request graceful exit, then kill once `grace` has passed.
///
/// Waits for the killed process without a bound; `stop()` bounds its own wait.
async fn terminate(
    child: &mut Child,
    pid: Option<u32>,
    grace: Duration,
) -> Result<ExitReport, ProcessError> {
    request_termination(child, pid);

    if let Ok(result) = tokio::time::timeout(grace, child.wait()).await {
        return Ok(exit_report(&result?, true, None));
    }

    tracing::warn!(pid = ?pid, "Engine still alive after {:?}, killing", grace);
    if let Err(e) = child.start_kill() {
        tracing::debug!("Kill failed: {}", e);
    }
    let exit = child.wait().await?;
    Ok(exit_report(&exit, true, Some("killed after grace period")))
}

#[cfg(unix)]
fn request_termination(child: &mut Child, pid: Option<u32>) {
    if let Some(pid) = pid {
        // SAFETY: the pid belongs to our own child, which has not been reaped yet.
        if unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) } == 0 {
            return;
        }
    }
    let _ = child.start_kill();
}

#[cfg(not(unix))]
fn request_termination(child: &mut Child, _pid: Option<u32>) {
    let _ = child.start_kill();
}

fn exit_report(status: &ExitStatus, requested: bool, note: Option<&str>) -> ExitReport {
    let mut reason = describe_exit(status);
    if let Some(note) = note {
        reason.push_str(", ");
        reason.push_str(note);
    }
    ExitReport {
        code: status.code(),
        reason,
        requested,
        at: current_time_millis(),
    }
}

fn describe_exit(status: &ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exit code {}", code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("killed by signal {}", signal);
        }
    }
    "terminated".to_string()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn settings(script: &str) -> SupervisorSettings {
        SupervisorSettings {
            binary: Some(PathBuf::from("/bin/sh")),
            args: vec!["-c".to_string(), script.to_string()],
            working_dir: None,
            startup_grace: Duration::from_millis(100),
            stop_grace: Duration::from_secs(2),
            log_capacity: 50,
        }
    }

    #[tokio::test]
    async fn test_stop_when_stopped_is_noop() {
        let supervisor = Supervisor::new(settings("exec sleep 30"));
        let mut rx = supervisor.subscribe();

        let outcome = supervisor.stop().await.unwrap();
        assert!(matches!(outcome, StopOutcome::NotRunning));
        assert!(!rx.has_changed().unwrap());
        assert_eq!(supervisor.status().state, EngineState::Stopped);
    }

    #[tokio::test]
    async fn test_restart_without_any_config() {
        let supervisor = Supervisor::new(settings("exec sleep 30"));
        let err = supervisor.restart(None).await.unwrap_err();
        assert!(matches!(err, ProcessError::NoConfig));
    }

    #[tokio::test]
    async fn test_early_exit_is_spawn_error() {
        let supervisor = Supervisor::new(settings("echo 'FATAL decode config' >&2; exit 3"));

        let err = supervisor.start(serde_json::json!({})).await.unwrap_err();
        match err {
            ProcessError::Spawn(reason) => {
                assert!(reason.contains("exit code 3"), "{}", reason);
                assert!(reason.contains("FATAL decode config"), "{}", reason);
            }
            other => panic!("expected spawn error, got {:?}", other),
        }
        assert_eq!(supervisor.status().state, EngineState::Stopped);
        assert!(supervisor.status().pid.is_none());
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let mut s = settings("");
        s.binary = Some(PathBuf::from("/nonexistent/sing-box"));
        let supervisor = Supervisor::new(s);

        let err = supervisor.start(serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ProcessError::Spawn(_)));
        assert_eq!(supervisor.status().state, EngineState::Stopped);
    }

    #[tokio::test]
    async fn test_output_is_captured() {
        let supervisor = Supervisor::new(settings("echo booting; exec sleep 30"));
        supervisor.start(serde_json::json!({})).await.unwrap();

        let mut captured = false;
        for _ in 0..50 {
            if supervisor.logs().snapshot().iter().any(|l| l.line == "booting") {
                captured = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(captured);

        supervisor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_abandoned_start_resets_state() {
        let mut s = settings("exec sleep 30");
        s.startup_grace = Duration::from_millis(500);
        let supervisor = Supervisor::new(s);

        let abandoned =
            tokio::time::timeout(Duration::from_millis(50), supervisor.start(serde_json::json!({})))
                .await;
        assert!(abandoned.is_err());

        let status = supervisor.status();
        assert_eq!(status.state, EngineState::Stopped);
        assert!(status.pid.is_none());

        supervisor.start(serde_json::json!({})).await.unwrap();
        assert!(matches!(supervisor.stop().await.unwrap(), StopOutcome::Stopped(_)));
    }

    #[tokio::test]
    async fn test_abandoned_stop_still_completes() {
        let mut s = settings("trap '' TERM; while :; do sleep 0.1; done");
        s.stop_grace = Duration::from_millis(300);
        let supervisor = Supervisor::new(s);
        supervisor.start(serde_json::json!({})).await.unwrap();

        let abandoned = tokio::time::timeout(Duration::from_millis(100), supervisor.stop()).await;
        assert!(abandoned.is_err());
        assert_eq!(supervisor.status().state, EngineState::Stopping);
        assert!(matches!(
            supervisor.start(serde_json::json!({})).await,
            Err(ProcessError::AlreadyRunning { .. })
        ));

        // A second stop picks up the termination already under way.
        let outcome = tokio::time::timeout(Duration::from_secs(5), supervisor.stop())
            .await
            .unwrap()
            .unwrap();
        let StopOutcome::Stopped(report) = outcome else {
            panic!("the engine was still being stopped");
        };
        assert!(report.reason.contains("killed after grace period"), "{}", report.reason);

        let status = supervisor.status();
        assert_eq!(status.state, EngineState::Stopped);
        assert!(status.pid.is_none());
        assert_eq!(status.last_exit, Some(report));
    }

    #[tokio::test]
    async fn test_abandoned_stop_publishes_stopped_on_exit() {
        let mut s = settings("trap '' TERM; while :; do sleep 0.1; done");
        s.stop_grace = Duration::from_millis(200);
        let supervisor = Supervisor::new(s);
        supervisor.start(serde_json::json!({})).await.unwrap();
        let mut rx = supervisor.subscribe();

        let abandoned = tokio::time::timeout(Duration::from_millis(50), supervisor.stop()).await;
        assert!(abandoned.is_err());

        tokio::time::timeout(
            Duration::from_secs(5),
            rx.wait_for(|s| s.state == EngineState::Stopped),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(supervisor.status().pid.is_none());

        supervisor.stop().await.unwrap();
        assert_eq!(supervisor.status().state, EngineState::Stopped);
    }

    #[tokio::test]
    async fn test_stop_timeout_keeps_engine_slot() {
        let mut s = settings("exec sleep 30");
        s.stop_grace = Duration::from_millis(50);
        let supervisor = Supervisor::new(s);

        // An engine that never goes away, even after a kill.
        let monitor = tokio::spawn(std::future::pending::<Result<ExitReport, ProcessError>>());
        supervisor.status.send_modify(|s| {
            s.state = EngineState::Running;
            s.pid = Some(4242);
            s.run_id = 1;
        });
        supervisor.slot.lock().await.handle = Some(ProcessHandle {
            run_id: 1,
            pid: Some(4242),
            config: Arc::new(serde_json::json!({})),
            stop: CancellationToken::new(),
            monitor,
        });

        let err = supervisor.stop().await.unwrap_err();
        assert!(matches!(err, ProcessError::StopTimeout(_)));
        assert_eq!(supervisor.status().state, EngineState::Stopping);
        assert_eq!(supervisor.status().pid, Some(4242));

        let err = supervisor.start(serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ProcessError::AlreadyRunning { pid: Some(4242) }));
        let err = supervisor.restart(None).await.unwrap_err();
        assert!(matches!(err, ProcessError::StopTimeout(_)));

        if let Some(handle) = supervisor.slot.lock().await.handle.take() {
            handle.monitor.abort();
        };
    }

    #[test]
    fn test_uptime_zero_when_stopped() {
        let status = SupervisorStatus {
            started_at: Some(Instant::now()),
            ..SupervisorStatus::default()
        };
        assert_eq!(status.uptime(), Duration::ZERO);
    }
}
