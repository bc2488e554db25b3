use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::config::BridgeConfig;
use crate::error::BridgeError;

// ─── Capture ──────────────────────────────────────────────────────────────

/// Everything a headless CLI run printed, stdout and stderr interleaved in
/// arrival order, one entry per line.
#[derive(Debug, Default)]
pub(crate) struct Capture {
    pub blob: String,
    pub timed_out: bool,
    pub exit_code: Option<i32>,
}

/// Spawn `cmd`, drain both output streams into one blob, and wait for exit.
///
/// The whole run is bounded by `bound`. On expiry the child is killed and
/// whatever was captured so far is returned with `timed_out` set.
pub(crate) async fn capture(mut cmd: Command, bound: Duration) -> Result<Capture, BridgeError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let program = cmd.as_std().get_program().to_string_lossy().into_owned();
    let mut child = cmd
        .spawn()
        .map_err(|e| BridgeError::ProcessSpawnFailure(format!("{program}: {e}")))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| BridgeError::ProcessSpawnFailure("stdout not captured".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| BridgeError::ProcessSpawnFailure("stderr not captured".into()))?;

    // Both readers feed one channel so the blob keeps arrival order.
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let out_task = tokio::spawn(pump(stdout, tx.clone()));
    let err_task = tokio::spawn(pump(stderr, tx));

    let mut out = Capture::default();
    let run = async {
        while let Some(line) = rx.recv().await {
            out.blob.push_str(&line);
            out.blob.push('\n');
        }
        child.wait().await
    };

    let result = tokio::time::timeout(bound, run).await;
    match result {
        Ok(Ok(status)) => {
            out.exit_code = status.code();
        }
        Ok(Err(e)) => return Err(BridgeError::Io(e)),
        Err(_) => {
            tracing::warn!(program = %program, bound_secs = bound.as_secs(), "gemini run timed out; killing");
            out.timed_out = true;
            let _ = child.kill().await;
            out_task.abort();
            err_task.abort();
            while let Ok(line) = rx.try_recv() {
                out.blob.push_str(&line);
                out.blob.push('\n');
            }
        }
    }

    Ok(out)
}

async fn pump<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\r', '\n'])
                    .to_string();
                if tx.send(line).is_err() {
                    break;
                }
            }
        }
    }
}

// ─── Command builder ──────────────────────────────────────────────────────

/// `<exe> --prompt <question> --output-format json [--model <model>]` with
/// the credential environment overrides applied.
pub(crate) fn build_command(config: &BridgeConfig, question: &str, model: Option<&str>) -> Command {
    let mut cmd = Command::new(&config.executable);
    cmd.arg("--prompt")
        .arg(question)
        .arg("--output-format")
        .arg("json");

    if let Some(model) = model {
        cmd.arg("--model").arg(model);
    }

    for (k, v) in config.child_env() {
        cmd.env(k, v);
    }

    cmd
}

/// Resolve the CLI executable the way a shell would.
pub fn resolve_executable(executable: &str) -> Option<PathBuf> {
    which::which(executable).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[tokio::test]
    async fn captures_stdout_and_stderr() {
        let out = capture(sh("echo one; echo two >&2; echo three"), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(!out.timed_out);
        assert_eq!(out.exit_code, Some(0));
        for line in ["one", "two", "three"] {
            assert!(out.blob.lines().any(|l| l == line), "missing {line}: {:?}", out.blob);
        }
    }

    #[tokio::test]
    async fn sequential_writes_keep_arrival_order() {
        let out = capture(
            sh("echo first >&2; sleep 0.2; echo second; sleep 0.2; echo third >&2"),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert_eq!(out.blob, "first\nsecond\nthird\n");
    }

    #[tokio::test]
    async fn non_zero_exit_is_reported_not_failed() {
        let out = capture(sh("echo oops; exit 3"), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.exit_code, Some(3));
        assert_eq!(out.blob, "oops\n");
    }

    #[tokio::test]
    async fn timeout_kills_and_keeps_partial_output() {
        let started = std::time::Instant::now();
        let out = capture(sh("echo early; exec sleep 10"), Duration::from_millis(300))
            .await
            .unwrap();
        assert!(out.timed_out);
        assert!(out.blob.contains("early"));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn missing_executable_is_spawn_failure() {
        let err = capture(
            Command::new("__nonexistent_gemini_xyz__"),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        match err {
            BridgeError::ProcessSpawnFailure(msg) => {
                assert!(msg.contains("__nonexistent_gemini_xyz__"), "got {msg}")
            }
            other => panic!("expected ProcessSpawnFailure, got {other:?}"),
        }
    }

    #[test]
    fn command_carries_prompt_model_and_env() {
        let cfg = BridgeConfig::default();
        let cmd = build_command(&cfg, "What is 2+2?", Some("gemini-2.5-flash"));
        let std = cmd.as_std();
        let args: Vec<_> = std.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            [
                "--prompt",
                "What is 2+2?",
                "--output-format",
                "json",
                "--model",
                "gemini-2.5-flash"
            ]
        );
        let envs: Vec<_> = std
            .get_envs()
            .map(|(k, v)| {
                (
                    k.to_string_lossy().into_owned(),
                    v.map(|v| v.to_string_lossy().into_owned()),
                )
            })
            .collect();
        assert!(envs.contains(&("GEMINI_CONFIG_DIR".into(), Some("/app/.gemini".into()))));
        assert!(envs.contains(&("HOME".into(), Some("/app".into()))));
    }

    #[test]
    fn command_without_model_omits_flag() {
        let cmd = build_command(&BridgeConfig::default(), "hi", None);
        assert!(!cmd
            .as_std()
            .get_args()
            .any(|a| a.to_string_lossy() == "--model"));
    }

    #[test]
    fn resolve_executable_finds_sh() {
        assert!(resolve_executable("sh").is_some());
        assert!(resolve_executable("__nonexistent_gemini_xyz__").is_none());
    }
}
