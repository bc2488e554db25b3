use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::classify::{detect_upstream_status, mentions_model_not_found, model_not_found};
use crate::config::{BridgeConfig, Strategy};
use crate::error::BridgeError;
use crate::extract::parse_response;
use crate::filter::{is_auth_wait, strip_ansi};
use crate::process::{self, Capture};
use crate::session::{InteractiveSession, Readiness};
use crate::types::Answer;

// ─── Bridge ───────────────────────────────────────────────────────────────

/// Single entry point for asking the CLI a question.
///
/// The answer-extraction strategy is chosen once, at construction, from
/// [`BridgeConfig::strategy`]. Either way at most one exchange runs against
/// the CLI at a time and every call ends in exactly one outcome.
///
/// ```rust,ignore
/// let bridge = Bridge::new(BridgeConfig::default())?;
/// let answer = bridge.ask("What is 2+2?", None).await?;
/// if let Some(status) = &answer.status {
///     // degraded: answer salvaged alongside e.g. a rate limit
/// }
/// println!("{}", answer.text);
/// ```
pub struct Bridge {
    backend: Backend,
}

enum Backend {
    Headless(HeadlessRunner),
    Interactive(InteractiveSession),
}

impl Bridge {
    /// Build the bridge. The interactive strategy spawns its session here,
    /// so this must run inside a Tokio runtime.
    pub fn new(config: BridgeConfig) -> Result<Self, BridgeError> {
        match process::resolve_executable(&config.executable) {
            Some(path) => info!(executable = %path.display(), strategy = config.strategy.as_str(), "gemini bridge configured"),
            None => warn!(
                executable = %config.executable,
                "gemini executable not found on PATH; requests will fail until it is installed"
            ),
        }

        let backend = match config.strategy {
            Strategy::Headless => Backend::Headless(HeadlessRunner::new(config)),
            Strategy::Interactive => Backend::Interactive(InteractiveSession::spawn(&config)?),
        };
        Ok(Bridge { backend })
    }

    pub fn strategy(&self) -> Strategy {
        match self.backend {
            Backend::Headless(_) => Strategy::Headless,
            Backend::Interactive(_) => Strategy::Interactive,
        }
    }

    /// `None` for the headless strategy, which has no long-lived session.
    pub fn readiness(&self) -> Option<Readiness> {
        match &self.backend {
            Backend::Headless(_) => None,
            Backend::Interactive(session) => Some(session.readiness()),
        }
    }

    /// Ask one question. An empty question is rejected before anything is
    /// spawned; an empty model hint means "let the CLI choose".
    pub async fn ask(&self, question: &str, model: Option<&str>) -> Result<Answer, BridgeError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(BridgeError::InvalidInput);
        }
        let model = model.map(str::trim).filter(|m| !m.is_empty());

        match &self.backend {
            Backend::Headless(runner) => runner.ask(question, model).await,
            Backend::Interactive(session) => session.ask(question, model).await,
        }
    }

    /// Release the CLI. A no-op for the headless strategy.
    pub async fn shutdown(&self) {
        if let Backend::Interactive(session) = &self.backend {
            session.shutdown().await;
        }
    }
}

// ─── Headless ─────────────────────────────────────────────────────────────

/// One fresh process per question, serialized by a lock so two runs never
/// race on the console or the shared credential directory.
struct HeadlessRunner {
    config: BridgeConfig,
    lock: Mutex<()>,
}

impl HeadlessRunner {
    fn new(config: BridgeConfig) -> Self {
        HeadlessRunner {
            config,
            lock: Mutex::new(()),
        }
    }

    async fn ask(&self, question: &str, model: Option<&str>) -> Result<Answer, BridgeError> {
        let _guard = self.lock.lock().await;
        debug!(model = model.unwrap_or("auto"), "running headless gemini");

        let cmd = process::build_command(&self.config, question, model);
        let capture = process::capture(cmd, self.config.timeout()).await?;
        debug!(
            exit_code = ?capture.exit_code,
            timed_out = capture.timed_out,
            bytes = capture.blob.len(),
            "headless gemini finished"
        );
        interpret(&capture, self.config.timeout())
    }
}

/// Map a finished (or timed-out) run to the bridge outcome.
fn interpret(capture: &Capture, bound: std::time::Duration) -> Result<Answer, BridgeError> {
    match interpret_blob(&capture.blob) {
        Err(BridgeError::EmptyResponse | BridgeError::NoResponse) if capture.timed_out => {
            Err(BridgeError::Timeout(bound))
        }
        other => other,
    }
}

fn interpret_blob(blob: &str) -> Result<Answer, BridgeError> {
    if blob.trim().is_empty() {
        return Err(BridgeError::EmptyResponse);
    }

    if let Some(parsed) = parse_response(blob) {
        let status = detect_upstream_status(blob, Some(&parsed));
        let text = parsed.response.trim();
        if !text.is_empty() {
            return Ok(Answer {
                text: text.to_string(),
                status,
                stats: parsed.stats,
            });
        }
        if let Some(status) = status {
            return Err(BridgeError::from_status(status));
        }
        if is_auth_wait(blob) {
            return Err(BridgeError::AuthRequired);
        }
        return Err(BridgeError::EmptyResponse);
    }

    // No payload: the raw text is the answer unless it is a known failure.
    if is_auth_wait(blob) {
        return Err(BridgeError::AuthRequired);
    }
    if mentions_model_not_found(blob) {
        return Err(BridgeError::UpstreamModelNotFound {
            status: model_not_found(),
        });
    }
    let text = blob
        .lines()
        .map(strip_ansi)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();
    if text.is_empty() {
        return Err(BridgeError::EmptyResponse);
    }
    Ok(Answer {
        status: detect_upstream_status(blob, None),
        text,
        stats: serde_json::Value::Null,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn capture(blob: &str, timed_out: bool) -> Capture {
        Capture {
            blob: blob.to_string(),
            timed_out,
            exit_code: if timed_out { None } else { Some(0) },
        }
    }

    const BOUND: Duration = Duration::from_secs(90);

    #[test]
    fn payload_answer_is_trimmed_and_keeps_stats() {
        let blob = "Loaded cached credentials.\n{\"response\":\"  4\\n\",\"stats\":{\"models\":{\"m\":{}}}}\n";
        let answer = interpret(&capture(blob, false), BOUND).unwrap();
        assert_eq!(answer.text, "4");
        assert!(answer.status.is_none());
        assert!(answer.stats["models"]["m"].is_object());
    }

    #[test]
    fn rate_limited_answer_is_salvaged_with_status() {
        let blob = "Attempt 1 failed with status 429. [{\"error\":{\"code\":429}}] {\"response\":\"ok\",\"stats\":{\"models\":{}}}";
        let answer = interpret(&capture(blob, false), BOUND).unwrap();
        assert_eq!(answer.text, "ok");
        assert_eq!(answer.status.unwrap().http_status, 429);
    }

    #[test]
    fn structured_error_without_answer_is_classified() {
        let blob = r#"{"response":"","error":{"type":"RESOURCE_EXHAUSTED","message":"No capacity","code":429}}"#;
        match interpret(&capture(blob, false), BOUND).unwrap_err() {
            BridgeError::UpstreamRateLimited { status } => {
                assert_eq!(status.code, "RESOURCE_EXHAUSTED");
                assert_eq!(status.message, "No capacity");
            }
            other => panic!("expected rate limit, got {other:?}"),
        }
    }

    #[test]
    fn payload_without_answer_or_status_is_empty() {
        let err = interpret(&capture(r#"{"response":"","stats":{}}"#, false), BOUND).unwrap_err();
        assert!(matches!(err, BridgeError::EmptyResponse));
    }

    #[test]
    fn raw_text_fallback_is_answer() {
        let blob = "\x1b[1mThe answer is 4.\x1b[0m\n";
        let answer = interpret(&capture(blob, false), BOUND).unwrap();
        assert_eq!(answer.text, "The answer is 4.");
        assert!(answer.stats.is_null());
    }

    #[test]
    fn raw_rate_limit_text_keeps_status() {
        let blob = "Too Many Requests, but here is something anyway";
        let answer = interpret(&capture(blob, false), BOUND).unwrap();
        assert_eq!(answer.status.unwrap().http_status, 429);
    }

    #[test]
    fn raw_model_not_found_is_error_with_hint() {
        let blob = "Error: ModelNotFoundError: models/gemini-9 is not found";
        match interpret(&capture(blob, false), BOUND).unwrap_err() {
            BridgeError::UpstreamModelNotFound { status } => {
                assert_eq!(status.http_status, 404);
                assert!(status.message.contains("gemini-2.5-flash"));
            }
            other => panic!("expected model not found, got {other:?}"),
        }
    }

    #[test]
    fn auth_wait_is_auth_required() {
        let err = interpret(&capture("Waiting for auth...", true), BOUND).unwrap_err();
        assert!(matches!(err, BridgeError::AuthRequired));
    }

    #[test]
    fn empty_blob_is_empty_response() {
        let err = interpret(&capture("  \n", false), BOUND).unwrap_err();
        assert!(matches!(err, BridgeError::EmptyResponse));
    }

    #[test]
    fn empty_blob_after_timeout_is_timeout() {
        let err = interpret(&capture("", true), BOUND).unwrap_err();
        assert!(matches!(err, BridgeError::Timeout(d) if d == BOUND));
    }

    #[test]
    fn partial_output_after_timeout_is_salvaged() {
        let answer = interpret(&capture("partial thoughts", true), BOUND).unwrap();
        assert_eq!(answer.text, "partial thoughts");
    }

    #[cfg(unix)]
    mod headless {
        use super::*;
        use crate::testing::fake_cli;
        use std::sync::Arc;
        use tempfile::TempDir;

        /// Echoes the prompt back inside a JSON payload; fails loudly if two
        /// runs ever overlap.
        const ECHO_CLI: &str = r#"
if ! mkdir "$HOME/inflight" 2>/dev/null; then
  echo '{"response":"","error":{"type":"Overlap","message":"concurrent run","code":409}}'
  exit 1
fi
echo "Loaded cached credentials." >&2
sleep 0.05
printf '{"response":"echo: %s","stats":{"models":{}}}\n' "$2"
rmdir "$HOME/inflight"
"#;

        fn bridge(dir: &TempDir, body: &str, timeout_secs: u64) -> Bridge {
            let exe = fake_cli(dir, body);
            Bridge::new(BridgeConfig {
                executable: exe.display().to_string(),
                home_dir: dir.path().to_path_buf(),
                timeout_secs,
                ..Default::default()
            })
            .unwrap()
        }

        #[tokio::test]
        async fn ask_returns_payload_answer() {
            let dir = TempDir::new().unwrap();
            let b = bridge(&dir, ECHO_CLI, 10);
            assert_eq!(b.strategy(), Strategy::Headless);
            assert!(b.readiness().is_none());
            let answer = b.ask("  hello  ", Some("")).await.unwrap();
            assert_eq!(answer.text, "echo: hello");
        }

        #[tokio::test]
        async fn empty_question_never_spawns() {
            let dir = TempDir::new().unwrap();
            let marker = dir.path().join("spawned");
            let b = bridge(&dir, &format!("touch {}\n", marker.display()), 10);
            let err = b.ask("   ", None).await.unwrap_err();
            assert!(matches!(err, BridgeError::InvalidInput));
            assert!(!marker.exists());
        }

        #[tokio::test]
        async fn concurrent_asks_are_serialized_and_not_interleaved() {
            let dir = TempDir::new().unwrap();
            let b = Arc::new(bridge(&dir, ECHO_CLI, 10));

            let mut handles = Vec::new();
            for i in 0..6 {
                let b = b.clone();
                handles.push(tokio::spawn(async move {
                    let q = format!("question-{i}");
                    (q.clone(), b.ask(&q, None).await)
                }));
            }
            for h in handles {
                let (q, result) = h.await.unwrap();
                let answer = result.unwrap();
                assert_eq!(answer.text, format!("echo: {q}"));
            }
        }

        #[tokio::test]
        async fn silent_hang_times_out_within_bound() {
            let dir = TempDir::new().unwrap();
            let b = bridge(&dir, "exec sleep 30\n", 1);
            let started = std::time::Instant::now();
            let err = b.ask("hello", None).await.unwrap_err();
            assert!(matches!(err, BridgeError::Timeout(_)), "got {err:?}");
            assert!(started.elapsed() < Duration::from_secs(10));
        }

        #[tokio::test]
        async fn model_hint_is_forwarded() {
            let dir = TempDir::new().unwrap();
            let b = bridge(
                &dir,
                r#"printf '{"response":"%s"}\n' "$*""#,
                10,
            );
            let answer = b.ask("hi", Some("gemini-2.5-flash")).await.unwrap();
            assert_eq!(
                answer.text,
                "--prompt hi --output-format json --model gemini-2.5-flash"
            );
        }

        #[tokio::test]
        async fn missing_executable_is_spawn_failure() {
            let b = Bridge::new(BridgeConfig {
                executable: "__nonexistent_gemini_xyz__".into(),
                ..Default::default()
            })
            .unwrap();
            let err = b.ask("hello", None).await.unwrap_err();
            assert!(matches!(err, BridgeError::ProcessSpawnFailure(_)));
        }
    }

    #[cfg(unix)]
    mod interactive {
        use super::*;
        use crate::testing::fake_cli;
        use tempfile::TempDir;

        #[tokio::test]
        async fn wedged_cli_times_out_and_closes_session() {
            let dir = TempDir::new().unwrap();
            let exe = fake_cli(
                &dir,
                "printf '> Type your message or @path/to/file\\n'\n\
                 while IFS= read -r line; do exec sleep 30; done\n",
            );
            let b = Bridge::new(BridgeConfig {
                executable: exe.display().to_string(),
                home_dir: dir.path().to_path_buf(),
                strategy: Strategy::Interactive,
                timeout_secs: 1,
                startup_timeout_secs: 2,
                grace_period_ms: 100,
                ..Default::default()
            })
            .unwrap();
            assert_eq!(b.strategy(), Strategy::Interactive);

            let started = std::time::Instant::now();
            let err = b.ask("hello", None).await.unwrap_err();
            assert!(matches!(err, BridgeError::Timeout(_)), "got {err:?}");
            assert!(started.elapsed() < Duration::from_secs(6));

            assert_eq!(b.readiness(), Some(Readiness::Closed));
            let err = b.ask("again", None).await.unwrap_err();
            assert!(matches!(err, BridgeError::SessionClosed), "got {err:?}");
            b.shutdown().await;
        }
    }
}
