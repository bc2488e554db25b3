//! Long-lived interactive CLI session in a pseudo-terminal.
//!
//! ```text
//! InteractiveSession::spawn
//!     │
//!     ├─ reader thread   ← blocking reads on the PTY master, split into
//!     │                    lines, filtered, sent on a bounded channel
//!     │
//!     └─ session task    ← sole consumer of the request queue; waits for
//!                          the first prompt, then runs one exchange at a
//!                          time through the transcript collector
//! ```
//!
//! The session is created once and never respawned. If the CLI exits, the
//! readiness watch flips to [`Readiness::Closed`] and every later request
//! fails with [`BridgeError::SessionClosed`].

use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::classify::detect_upstream_status;
use crate::collector::{
    await_prompt, collect_transcript, CollectTimings, Ending, TranscriptCollector,
};
use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::filter::{is_prompt, strip_ansi, FilteredLine, NoiseRules};
use crate::types::Answer;

const LINE_BUFFER: usize = 1024;
const REQUEST_QUEUE: usize = 64;
const CTRL_C: u8 = 0x03;

/// Lifecycle of the shared session, observed through a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Spawned, waiting for the first prompt.
    Starting,
    /// Prompt seen; accepting questions.
    Ready,
    /// The CLI is blocked on interactive login. Fixed out of band.
    AuthRequired,
    /// The CLI exited or never became ready. Permanent.
    Closed,
}

enum SessionCommand {
    Ask {
        question: String,
        model: Option<String>,
        reply: oneshot::Sender<Result<Answer, BridgeError>>,
    },
    Shutdown(oneshot::Sender<()>),
}

// ─── InteractiveSession ───────────────────────────────────────────────────

/// Handle to the single interactive session. Cheap to share behind the
/// bridge; every call goes through the session task's queue.
pub struct InteractiveSession {
    commands: mpsc::Sender<SessionCommand>,
    ready: watch::Receiver<Readiness>,
    startup_timeout: Duration,
    exchange_timeout: Duration,
}

impl InteractiveSession {
    /// Spawn the CLI in a pseudo-terminal and start the reader and session
    /// tasks. Must be called from within a Tokio runtime.
    pub fn spawn(config: &BridgeConfig) -> Result<Self, BridgeError> {
        let pty = native_pty_system();
        let pair = pty
            .openpty(PtySize {
                rows: 50,
                cols: 200,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| BridgeError::ProcessSpawnFailure(format!("openpty: {e}")))?;

        let mut cmd = CommandBuilder::new(&config.executable);
        for (key, value) in std::env::vars() {
            cmd.env(key, value);
        }
        cmd.env("TERM", "xterm-256color");
        for (k, v) in config.child_env() {
            cmd.env(k, v);
        }
        cmd.cwd(&config.home_dir);

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| BridgeError::ProcessSpawnFailure(format!("{}: {e}", config.executable)))?;
        // The child holds its own copy; ours would keep the PTY open past exit.
        drop(pair.slave);
        info!(pid = ?child.process_id(), executable = %config.executable, "interactive gemini session spawned");

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| BridgeError::ProcessSpawnFailure(format!("pty reader: {e}")))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| BridgeError::ProcessSpawnFailure(format!("pty writer: {e}")))?;

        let (line_tx, line_rx) = mpsc::channel(LINE_BUFFER);
        let rules = NoiseRules::with_extra(config.noise.iter().cloned());
        tokio::task::spawn_blocking(move || read_loop(reader, rules, line_tx));

        let (ready_tx, ready_rx) = watch::channel(Readiness::Starting);
        let (cmd_tx, cmd_rx) = mpsc::channel(REQUEST_QUEUE);

        let task = SessionTask {
            child: Some(child),
            _master: Mutex::new(pair.master),
            writer: Arc::new(Mutex::new(writer)),
            lines: line_rx,
            ready: ready_tx,
            current_model: None,
            timings: CollectTimings {
                quiet: config.quiet_period(),
                overall: config.timeout(),
            },
            startup_timeout: config.startup_timeout(),
            grace: config.grace_period(),
        };
        tokio::spawn(task.run(cmd_rx));

        Ok(InteractiveSession {
            commands: cmd_tx,
            ready: ready_rx,
            startup_timeout: config.startup_timeout(),
            exchange_timeout: config.timeout() + config.startup_timeout(),
        })
    }

    pub fn readiness(&self) -> Readiness {
        *self.ready.borrow()
    }

    /// Wait (bounded by the startup timeout) until the session has left
    /// [`Readiness::Starting`], and return the state it settled in.
    pub async fn wait_ready(&self) -> Result<Readiness, BridgeError> {
        let mut ready = self.ready.clone();
        let settled = tokio::time::timeout(
            self.startup_timeout,
            ready.wait_for(|r| *r != Readiness::Starting),
        )
        .await
        .map_err(|_| BridgeError::Timeout(self.startup_timeout))?
        .map(|r| *r)
        .map_err(|_| BridgeError::SessionClosed)?;
        Ok(settled)
    }

    /// Queue one question and wait for its answer.
    pub async fn ask(&self, question: &str, model: Option<&str>) -> Result<Answer, BridgeError> {
        match self.wait_ready().await? {
            Readiness::Ready => {}
            Readiness::AuthRequired => return Err(BridgeError::AuthRequired),
            Readiness::Starting | Readiness::Closed => return Err(BridgeError::SessionClosed),
        }

        let (reply, rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::Ask {
                question: question.to_string(),
                model: model.map(str::to_string),
                reply,
            })
            .await
            .map_err(|_| BridgeError::SessionClosed)?;

        // The session task bounds each exchange itself; this covers a wedged
        // task so callers never block forever.
        tokio::time::timeout(self.exchange_timeout, rx)
            .await
            .map_err(|_| BridgeError::Timeout(self.exchange_timeout))?
            .map_err(|_| BridgeError::SessionClosed)?
    }

    /// Interrupt the CLI, give it the grace period, then kill it.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(SessionCommand::Shutdown(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }
}

// ─── Session task ─────────────────────────────────────────────────────────

type PtyWriter = Arc<Mutex<Box<dyn Write + Send>>>;

struct SessionTask {
    // Taken (and reaped) on termination.
    child: Option<Box<dyn Child + Send + Sync>>,
    // Dropping the master closes the PTY.
    _master: Mutex<Box<dyn MasterPty + Send>>,
    writer: PtyWriter,
    lines: mpsc::Receiver<FilteredLine>,
    ready: watch::Sender<Readiness>,
    current_model: Option<String>,
    timings: CollectTimings,
    startup_timeout: Duration,
    grace: Duration,
}

impl SessionTask {
    async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        let initial = match await_prompt(&mut self.lines, self.startup_timeout).await {
            Ok(()) => Readiness::Ready,
            Err(BridgeError::AuthRequired) => Readiness::AuthRequired,
            Err(e) => {
                warn!(error = %e, "gemini session never became ready");
                Readiness::Closed
            }
        };
        info!(state = ?initial, "interactive session settled");
        let _ = self.ready.send(initial);

        while let Some(command) = commands.recv().await {
            match command {
                SessionCommand::Ask {
                    question,
                    model,
                    reply,
                } => {
                    // The caller gave up while queued; its question is never typed.
                    if reply.is_closed() {
                        debug!("skipping question abandoned by its caller");
                        continue;
                    }
                    let result = match *self.ready.borrow() {
                        Readiness::Ready => None,
                        Readiness::AuthRequired => Some(Err(BridgeError::AuthRequired)),
                        Readiness::Starting | Readiness::Closed => {
                            Some(Err(BridgeError::SessionClosed))
                        }
                    };
                    let result = match result {
                        Some(early) => early,
                        None => self.exchange(&question, model.as_deref()).await,
                    };
                    self.update_readiness(&result);
                    let _ = reply.send(result);
                }
                SessionCommand::Shutdown(done) => {
                    self.terminate().await;
                    let _ = done.send(());
                    return;
                }
            }
        }

        // Every handle dropped.
        self.terminate().await;
    }

    async fn exchange(&mut self, question: &str, model: Option<&str>) -> Result<Answer, BridgeError> {
        // Leftovers from the previous exchange (late footer redraws) would
        // otherwise be read as part of this answer.
        while self.lines.try_recv().is_ok() {}

        if let Some(model) = model {
            if self.current_model.as_deref() != Some(model) {
                debug!(model, "switching model in-band");
                self.write_line(&format!("/model {model}")).await?;
                if let Err(e) = await_prompt(&mut self.lines, self.startup_timeout).await {
                    self.lose_sync(&e).await;
                    return Err(e);
                }
                self.current_model = Some(model.to_string());
            }
        }

        // Enter would submit early, so the question goes in as one line.
        let typed = question.split_whitespace().collect::<Vec<_>>().join(" ");
        self.write_line(&typed).await?;

        let transcript = collect_transcript(
            &mut self.lines,
            TranscriptCollector::new(&typed),
            self.timings,
        )
        .await;

        if transcript.ending.needs_resync() {
            if let Err(e) = self.resync(transcript.ending).await {
                self.lose_sync(&e).await;
            }
        }

        let status = detect_upstream_status(&transcript.diagnostics, None);
        match transcript.answer {
            Ok(text) => Ok(Answer {
                text,
                status,
                stats: serde_json::Value::Null,
            }),
            Err(e @ (BridgeError::NoResponse | BridgeError::Timeout(_))) => match status {
                Some(status) => Err(BridgeError::from_status(status)),
                None => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    /// Bring the CLI back to its input prompt after an exchange that ended
    /// without one, discarding whatever it still prints for that exchange.
    async fn resync(&mut self, ending: Ending) -> Result<(), BridgeError> {
        if ending == Ending::Deadline {
            warn!("gemini exchange hit its deadline; interrupting");
            self.write_bytes(vec![CTRL_C]).await?;
        } else {
            debug!("answer went quiet; waiting for the prompt");
        }
        await_prompt(&mut self.lines, self.startup_timeout).await
    }

    /// The CLI can no longer be trusted to be at its prompt.
    async fn lose_sync(&mut self, cause: &BridgeError) {
        if matches!(cause, BridgeError::AuthRequired) {
            self.ready.send_if_modified(|r| {
                let changed = *r == Readiness::Ready;
                if changed {
                    *r = Readiness::AuthRequired;
                }
                changed
            });
            return;
        }
        warn!(error = %cause, "gemini session lost its prompt; closing");
        self.terminate().await;
    }

    fn update_readiness(&mut self, result: &Result<Answer, BridgeError>) {
        if *self.ready.borrow() == Readiness::Closed {
            return;
        }
        let next = if self.lines.is_closed() && self.lines.is_empty() {
            Readiness::Closed
        } else if matches!(result, Err(BridgeError::AuthRequired)) {
            Readiness::AuthRequired
        } else {
            return;
        };
        if *self.ready.borrow() != next {
            warn!(state = ?next, "interactive session is no longer ready");
            let _ = self.ready.send(next);
        }
    }

    async fn write_line(&self, text: &str) -> Result<(), BridgeError> {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(b'\r');
        self.write_bytes(bytes).await
    }

    async fn write_bytes(&self, bytes: Vec<u8>) -> Result<(), BridgeError> {
        let writer = Arc::clone(&self.writer);
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut w = writer
                .lock()
                .map_err(|_| std::io::Error::other("pty writer poisoned"))?;
            w.write_all(&bytes)?;
            w.flush()
        })
        .await
        .map_err(|e| BridgeError::Io(std::io::Error::other(e.to_string())))??;
        Ok(())
    }

    /// Interrupt, wait the grace period, kill if still running, and reap.
    async fn terminate(&mut self) {
        let Some(mut child) = self.child.take() else {
            let _ = self.ready.send(Readiness::Closed);
            return;
        };

        let _ = self.write_bytes(vec![CTRL_C]).await;
        tokio::time::sleep(self.grace).await;
        match child.try_wait() {
            Ok(Some(status)) => debug!(?status, "gemini session exited after interrupt"),
            _ => {
                warn!("gemini session ignored interrupt; killing");
                let _ = child.kill();
            }
        }
        match tokio::task::spawn_blocking(move || child.wait()).await {
            Ok(Ok(status)) => debug!(?status, "gemini session reaped"),
            Ok(Err(e)) => warn!(error = %e, "failed to reap gemini session"),
            Err(e) => warn!(error = %e, "reaper task failed"),
        }
        let _ = self.ready.send(Readiness::Closed);
    }
}

// ─── Reader ───────────────────────────────────────────────────────────────

/// Blocking PTY reader: splits output into lines, filters each one, and
/// forwards it. An unterminated tail that already reads as the input prompt
/// is forwarded too, since the CLI draws its prompt without a newline.
fn read_loop(mut reader: Box<dyn Read + Send>, rules: NoiseRules, tx: mpsc::Sender<FilteredLine>) {
    let mut buf = [0u8; 4096];
    let mut pending: Vec<u8> = Vec::new();

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                // EIO once the child side closes.
                debug!(error = %e, "pty read ended");
                break;
            }
        };
        pending.extend_from_slice(&buf[..n]);

        while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]).into_owned();
            if tx.blocking_send(rules.filter(&line)).is_err() {
                return;
            }
        }

        if !pending.is_empty() {
            let tail = String::from_utf8_lossy(&pending).into_owned();
            if is_prompt(&strip_ansi(&tail)) {
                pending.clear();
                if tx.blocking_send(rules.filter(&tail)).is_err() {
                    return;
                }
            }
        }
    }

    if !pending.is_empty() {
        let tail = String::from_utf8_lossy(&pending).into_owned();
        let _ = tx.blocking_send(rules.filter(&tail));
    }
}
