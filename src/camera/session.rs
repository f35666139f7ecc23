//! Stream session and capture process supervision
//!
//! `StreamSession` owns the single live capture subprocess. Start
//! attempts are serialized through `start_lock`, so the conflict check
//! cannot interleave with another start. The child's stdout is pumped
//! into the broadcaster; stderr is logged; exit is observed by a
//! watcher task that flips `running` back to false.

use bytes::BytesMut;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use parking_lot::RwLock;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};

use crate::config::CameraConfig;
use crate::error::AppError;
use crate::signaling::PeerRegistry;
use crate::stream::ChunkBroadcaster;
use crate::Result;

use super::quality::{CaptureCommand, QualityProfile, StreamQuality};

/// Read buffer size for the capture stdout pump
const READ_BUF_SIZE: usize = 16 * 1024;

/// Exit watcher poll interval
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Stream session
///
/// Singleton record of whether (and at what quality) the relay is
/// streaming, plus the owned subprocess handle. Constructed once at
/// startup and shared behind an `Arc`.
pub struct StreamSession {
    config: CameraConfig,
    broadcaster: Arc<ChunkBroadcaster>,
    peers: Arc<PeerRegistry>,
    child: Mutex<Option<Child>>,
    running: AtomicBool,
    quality: RwLock<StreamQuality>,
    /// Serializes start attempts; held across the readiness wait
    start_lock: Mutex<()>,
    /// Bumped on every spawn so stale exit watchers stand down
    generation: AtomicU64,
}

impl StreamSession {
    pub fn new(
        config: CameraConfig,
        broadcaster: Arc<ChunkBroadcaster>,
        peers: Arc<PeerRegistry>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            broadcaster,
            peers,
            child: Mutex::new(None),
            running: AtomicBool::new(false),
            quality: RwLock::new(StreamQuality::Medium),
            start_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
        })
    }

    /// Whether a capture process is currently live
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Quality of the current (or last) session
    pub fn quality(&self) -> StreamQuality {
        *self.quality.read()
    }

    /// Start the capture process at the given quality.
    ///
    /// Fails with `AlreadyStreaming` if a session is live. Spawns the
    /// primary command, falling back once to the alternate command on a
    /// spawn error. Resolves after the first output chunk is observed,
    /// or after the ready grace period with the child still alive;
    /// a child that dies before then surfaces as `SpawnFailed`.
    pub async fn start(self: &Arc<Self>, quality: StreamQuality) -> Result<StreamQuality> {
        let _guard = self.start_lock.lock().await;

        if self.running.load(Ordering::SeqCst) {
            return Err(AppError::AlreadyStreaming);
        }

        let profile = quality.profile();
        info!(
            "Starting camera with quality: {} ({}x{} @ {}fps, {} bps)",
            quality, profile.width, profile.height, profile.framerate, profile.bitrate
        );

        let mut child = match self.spawn(&self.config.primary, &profile) {
            Ok(child) => child,
            Err(primary_err) => {
                warn!(
                    "Camera process error: {} ({}), trying fallback {}",
                    primary_err,
                    self.config.primary.program(),
                    self.config.fallback.program()
                );
                self.spawn(&self.config.fallback, &profile).map_err(|e| {
                    AppError::SpawnFailed(format!(
                        "{}: {}; {}: {}",
                        self.config.primary.program(),
                        primary_err,
                        self.config.fallback.program(),
                        e
                    ))
                })?
            }
        };

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Internal("capture process has no stdout".to_string()))?;
        let (ready_tx, ready_rx) = oneshot::channel();
        {
            let broadcaster = self.broadcaster.clone();
            let peers = self.peers.clone();
            tokio::spawn(async move {
                pump_stdout(stdout, broadcaster, peers, ready_tx).await;
            });
        }

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                log_stderr(stderr).await;
            });
        }

        *self.child.lock().await = Some(child);
        self.running.store(true, Ordering::SeqCst);
        *self.quality.write() = quality;
        self.spawn_exit_watcher(generation);

        self.await_readiness(ready_rx).await?;

        info!("Camera streaming ({})", quality);
        Ok(quality)
    }

    /// Stop the capture process.
    ///
    /// Idempotent: with no live handle this only clears `running`.
    /// The child gets SIGTERM and a bounded grace period before SIGKILL.
    pub async fn stop(&self) {
        let child = self.child.lock().await.take();
        self.running.store(false, Ordering::SeqCst);

        let Some(mut child) = child else {
            debug!("Stop requested with no active capture process");
            return;
        };

        if let Some(pid) = child.id() {
            info!("Stopping capture process (pid {})", pid);
            if let Err(e) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                warn!("Failed to signal capture process {}: {}", pid, e);
            }
        }

        let grace = Duration::from_millis(self.config.stop_grace_ms);
        tokio::spawn(async move {
            match tokio::time::timeout(grace, child.wait()).await {
                Ok(Ok(status)) => debug!("Capture process exited: {}", status),
                Ok(Err(e)) => warn!("Failed to reap capture process: {}", e),
                Err(_) => {
                    warn!("Capture process ignored SIGTERM, killing");
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill capture process: {}", e);
                    }
                }
            }
        });
    }

    /// Restart at `quality` after `delay`.
    ///
    /// Used by the quality-change paths: the acknowledgment goes out
    /// before this completes, and the delay gives the old process time
    /// to release the camera. Failures are logged, not surfaced.
    pub fn schedule_restart(self: &Arc<Self>, quality: StreamQuality, delay: Duration) {
        let session = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = session.start(quality).await {
                warn!("Failed to restart capture after quality change: {}", e);
            }
        });
    }

    fn spawn(&self, command: &CaptureCommand, profile: &QualityProfile) -> std::io::Result<Child> {
        let args = command.build_args(profile);
        debug!("Spawning {} {}", command.program(), args.join(" "));
        Command::new(command.program())
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
    }

    /// Wait for the first output chunk or the grace period.
    async fn await_readiness(&self, ready_rx: oneshot::Receiver<()>) -> Result<()> {
        let grace = Duration::from_millis(self.config.ready_grace_ms);
        match tokio::time::timeout(grace, ready_rx).await {
            // first chunk observed
            Ok(Ok(())) => Ok(()),
            // output closed before any data arrived
            Ok(Err(_)) => {
                let child = self.child.lock().await.take();
                self.running.store(false, Ordering::SeqCst);
                let detail = match child {
                    Some(mut child) => {
                        let _ = child.start_kill();
                        match child.wait().await {
                            Ok(status) => status.to_string(),
                            Err(_) => "output closed".to_string(),
                        }
                    }
                    None => "output closed".to_string(),
                };
                Err(AppError::SpawnFailed(format!(
                    "capture process produced no output ({})",
                    detail
                )))
            }
            // grace elapsed; accept optimistically if the child is alive
            Err(_) => {
                let mut guard = self.child.lock().await;
                let alive = matches!(guard.as_mut().map(|c| c.try_wait()), Some(Ok(None)));
                if alive {
                    debug!("No output within grace period, proceeding optimistically");
                    return Ok(());
                }
                *guard = None;
                drop(guard);
                self.running.store(false, Ordering::SeqCst);
                Err(AppError::SpawnFailed(
                    "capture process exited before producing output".to_string(),
                ))
            }
        }
    }

    /// Observe unexpected child exit and flip `running` back to false.
    fn spawn_exit_watcher(self: &Arc<Self>, generation: u64) {
        let session = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(EXIT_POLL_INTERVAL);
            loop {
                interval.tick().await;

                // a newer start replaced this process
                if session.generation.load(Ordering::SeqCst) != generation {
                    break;
                }

                let mut guard = session.child.lock().await;
                match guard.as_mut() {
                    Some(child) => match child.try_wait() {
                        Ok(Some(status)) => {
                            info!("Camera process exited with {}", status);
                            *guard = None;
                            drop(guard);
                            session.running.store(false, Ordering::SeqCst);
                            break;
                        }
                        Ok(None) => {}
                        Err(e) => {
                            warn!("Failed to poll capture process: {}", e);
                        }
                    },
                    // cleared by stop()
                    None => break,
                }
            }
        });
    }
}

/// Forward capture stdout to the fan-out, chunk by chunk, verbatim.
async fn pump_stdout(
    mut stdout: ChildStdout,
    broadcaster: Arc<ChunkBroadcaster>,
    peers: Arc<PeerRegistry>,
    ready_tx: oneshot::Sender<()>,
) {
    let mut ready = Some(ready_tx);
    let mut buf = BytesMut::with_capacity(READ_BUF_SIZE);
    loop {
        buf.reserve(READ_BUF_SIZE);
        match stdout.read_buf(&mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let chunk = buf.split().freeze();
                if let Some(tx) = ready.take() {
                    let _ = tx.send(());
                }
                broadcaster.broadcast(chunk.clone());
                peers.broadcast_data(&chunk);
            }
            Err(e) => {
                warn!("Capture stdout read error: {}", e);
                break;
            }
        }
    }
    debug!("Capture output stream ended");
}

/// Log capture stderr line by line; never forwarded to viewers.
async fn log_stderr(stderr: ChildStderr) {
    let reader = BufReader::new(stderr);
    let mut lines = reader.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => debug!("[capture] {}", line),
            Ok(None) => break,
            Err(e) => {
                warn!("[capture] error reading stderr: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tokio::sync::mpsc;

    fn sh(script: &str) -> CaptureCommand {
        CaptureCommand::Custom {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
        }
    }

    fn missing() -> CaptureCommand {
        CaptureCommand::Custom {
            program: "/nonexistent/capture-cmd".to_string(),
            args: vec![],
        }
    }

    fn test_config(primary: CaptureCommand, fallback: CaptureCommand) -> CameraConfig {
        CameraConfig {
            primary,
            fallback,
            ready_grace_ms: 300,
            signaling_restart_delay_ms: 50,
            legacy_restart_delay_ms: 50,
            stop_grace_ms: 300,
            report_unknown_peer: false,
        }
    }

    fn make_session(config: CameraConfig) -> Arc<StreamSession> {
        StreamSession::new(config, ChunkBroadcaster::new(), PeerRegistry::new())
    }

    #[tokio::test]
    async fn test_double_start_conflicts() {
        let session = make_session(test_config(sh("printf x; sleep 30"), missing()));

        session.start(StreamQuality::High).await.unwrap();
        assert!(session.is_running());
        assert_eq!(session.quality(), StreamQuality::High);

        let err = session.start(StreamQuality::Low).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyStreaming));
        assert!(session.is_running());

        session.stop().await;
        assert!(!session.is_running());
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_a_noop() {
        let session = make_session(test_config(sh("sleep 30"), missing()));
        session.stop().await;
        session.stop().await;
        assert!(!session.is_running());
    }

    #[tokio::test]
    async fn test_fallback_after_primary_spawn_failure() {
        let session = make_session(test_config(missing(), sh("printf y; sleep 30")));

        let quality = session.start(StreamQuality::Medium).await.unwrap();
        assert_eq!(quality, StreamQuality::Medium);
        assert!(session.is_running());

        session.stop().await;
    }

    #[tokio::test]
    async fn test_both_spawn_failures_surface() {
        let session = make_session(test_config(missing(), missing()));

        let err = session.start(StreamQuality::Medium).await.unwrap_err();
        assert!(matches!(err, AppError::SpawnFailed(_)));
        assert!(!session.is_running());
    }

    #[tokio::test]
    async fn test_exit_is_observed_asynchronously() {
        let session = make_session(test_config(sh("printf x"), missing()));

        session.start(StreamQuality::Medium).await.unwrap();

        // the watcher polls every 200ms; give it a couple of rounds
        tokio::time::sleep(Duration::from_millis(700)).await;
        assert!(!session.is_running());

        // and a fresh start is possible again
        let session2_cfg = test_config(sh("printf x; sleep 30"), missing());
        drop(session);
        let session = make_session(session2_cfg);
        session.start(StreamQuality::Low).await.unwrap();
        session.stop().await;
    }

    #[tokio::test]
    async fn test_early_exit_without_output_fails_start() {
        let session = make_session(test_config(sh("exit 3"), missing()));

        let err = session.start(StreamQuality::Medium).await.unwrap_err();
        assert!(matches!(err, AppError::SpawnFailed(_)));
        assert!(!session.is_running());
    }

    #[tokio::test]
    async fn test_output_reaches_viewers_verbatim() {
        let broadcaster = ChunkBroadcaster::new();
        let peers = PeerRegistry::new();
        let session = StreamSession::new(
            test_config(sh("printf 'AAAA'; sleep 30"), missing()),
            broadcaster.clone(),
            peers,
        );

        let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();
        broadcaster.register(tx);

        session.start(StreamQuality::Medium).await.unwrap();

        let chunk = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("no chunk within 2s")
            .unwrap();
        assert_eq!(chunk, Bytes::from_static(b"AAAA"));

        session.stop().await;
    }

    #[tokio::test]
    async fn test_scheduled_restart_applies_new_quality() {
        let session = make_session(test_config(sh("printf x; sleep 30"), missing()));

        session.start(StreamQuality::Medium).await.unwrap();
        session.stop().await;
        session.schedule_restart(StreamQuality::Low, Duration::from_millis(50));

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(session.is_running());
        assert_eq!(session.quality(), StreamQuality::Low);

        session.stop().await;
    }
}
