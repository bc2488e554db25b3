//! Answer assembly for the interactive session.
//!
//! [`TranscriptCollector`] is a pure state machine over [`FilteredLine`]s;
//! [`collect_transcript`] drives it from a channel and supplies the clock
//! (quiet period and overall bound). Keeping time out of the state machine
//! lets the heuristics be tested line by line.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::BridgeError;
use crate::filter::{is_auth_wait, is_error_report, is_prompt, FilteredLine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    /// Question sent, nothing useful seen yet.
    Idle,
    /// At least one answer line collected.
    Collecting,
    /// Prompt redrawn after the answer; no further lines are accepted.
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Done,
}

/// Why a transcript stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ending {
    /// The input prompt was redrawn after the answer.
    Prompt,
    /// Output paused for the quiet period mid-answer.
    Quiet,
    /// The overall bound passed.
    Deadline,
    /// The CLI asked for authentication.
    AuthWait,
    /// The line stream ended.
    Closed,
}

impl Ending {
    /// True when the CLI may still be writing output for this exchange.
    pub fn needs_resync(self) -> bool {
        matches!(self, Ending::Quiet | Ending::Deadline)
    }
}

/// Result of one exchange as seen by the collector.
#[derive(Debug)]
pub struct Transcript {
    pub answer: Result<String, BridgeError>,
    /// Non-answer lines seen during the exchange (decoration and error
    /// reports). Upstream status is classified from these, never from the
    /// answer body.
    pub diagnostics: String,
    pub ending: Ending,
}

#[derive(Debug)]
pub struct TranscriptCollector {
    question: String,
    state: CollectorState,
    buf: String,
    diagnostics: String,
}

impl TranscriptCollector {
    pub fn new(question: &str) -> Self {
        TranscriptCollector {
            question: question.trim().to_string(),
            state: CollectorState::Idle,
            buf: String::new(),
            diagnostics: String::new(),
        }
    }

    pub fn state(&self) -> CollectorState {
        self.state
    }

    pub fn is_collecting(&self) -> bool {
        self.state == CollectorState::Collecting
    }

    /// Consume one line.
    ///
    /// Returns `Err(AuthRequired)` as soon as the CLI reports it is waiting
    /// for authentication, whatever the state.
    pub fn feed(&mut self, line: &FilteredLine) -> Result<Step, BridgeError> {
        if self.state == CollectorState::Done {
            return Ok(Step::Done);
        }
        if is_auth_wait(&line.clean) {
            return Err(BridgeError::AuthRequired);
        }
        // terminal echo of the typed question
        if !self.question.is_empty() && line.clean.contains(&self.question) {
            return Ok(Step::Continue);
        }
        if self.state == CollectorState::Collecting && is_prompt(&line.clean) {
            self.state = CollectorState::Done;
            return Ok(Step::Done);
        }
        // An error report is the CLI's reply to this question, but not answer text.
        if is_error_report(&line.clean) {
            self.note(&line.clean);
            self.state = CollectorState::Collecting;
            return Ok(Step::Continue);
        }
        if line.is_noise {
            self.note(&line.clean);
            return Ok(Step::Continue);
        }

        self.state = CollectorState::Collecting;
        self.buf.push_str(&line.clean);
        self.buf.push('\n');
        Ok(Step::Continue)
    }

    /// The collected answer, or `NoResponse` if nothing was ever collected.
    pub fn finish(self) -> Result<String, BridgeError> {
        let answer = self.buf.trim();
        if answer.is_empty() {
            return Err(BridgeError::NoResponse);
        }
        Ok(answer.to_string())
    }

    pub fn diagnostics(&self) -> &str {
        &self.diagnostics
    }

    /// Close the exchange. An empty buffer is `Timeout(bound)` when the
    /// deadline ended it and `NoResponse` otherwise.
    pub fn conclude(self, ending: Ending, bound: Duration) -> Transcript {
        let answer = match self.buf.trim() {
            "" if ending == Ending::Deadline => Err(BridgeError::Timeout(bound)),
            "" => Err(BridgeError::NoResponse),
            text => Ok(text.to_string()),
        };
        Transcript {
            answer,
            diagnostics: self.diagnostics,
            ending,
        }
    }

    fn note(&mut self, clean: &str) {
        let trimmed = clean.trim();
        if !trimmed.is_empty() {
            self.diagnostics.push_str(trimmed);
            self.diagnostics.push('\n');
        }
    }
}

// ─── Async drivers ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct CollectTimings {
    /// Silence after collection started that counts as end-of-answer.
    pub quiet: Duration,
    /// Upper bound for the whole exchange.
    pub overall: Duration,
}

/// Feed lines from `lines` into `collector` until it reaches `Done`, the
/// quiet period elapses mid-answer, the overall bound passes, or the stream
/// ends. The returned [`Ending`] tells the caller whether the CLI may still
/// be mid-answer.
pub async fn collect_transcript(
    lines: &mut mpsc::Receiver<FilteredLine>,
    mut collector: TranscriptCollector,
    timings: CollectTimings,
) -> Transcript {
    let deadline = Instant::now() + timings.overall;
    loop {
        let now = Instant::now();
        if now >= deadline {
            return collector.conclude(Ending::Deadline, timings.overall);
        }
        let remaining = deadline - now;
        let quiet_applies = collector.is_collecting() && timings.quiet < remaining;
        let wait = if quiet_applies {
            timings.quiet
        } else {
            remaining
        };

        match tokio::time::timeout(wait, lines.recv()).await {
            Ok(Some(line)) => match collector.feed(&line) {
                Ok(Step::Done) => return collector.conclude(Ending::Prompt, timings.overall),
                Ok(Step::Continue) => {}
                Err(e) => {
                    return Transcript {
                        answer: Err(e),
                        diagnostics: collector.diagnostics,
                        ending: Ending::AuthWait,
                    }
                }
            },
            Ok(None) => return collector.conclude(Ending::Closed, timings.overall),
            Err(_) if quiet_applies => {
                tracing::debug!(quiet_ms = timings.quiet.as_millis() as u64, "answer went quiet");
                return collector.conclude(Ending::Quiet, timings.overall);
            }
            Err(_) => {}
        }
    }
}

/// Wait for the input prompt to be drawn, discarding everything else.
///
/// Used at session start and after in-band commands such as `/model`.
pub async fn await_prompt(
    lines: &mut mpsc::Receiver<FilteredLine>,
    bound: Duration,
) -> Result<(), BridgeError> {
    let wait = async {
        while let Some(line) = lines.recv().await {
            if is_auth_wait(&line.clean) {
                return Err(BridgeError::AuthRequired);
            }
            if is_prompt(&line.clean) {
                return Ok(());
            }
        }
        Err(BridgeError::SessionClosed)
    };
    tokio::time::timeout(bound, wait)
        .await
        .map_err(|_| BridgeError::Timeout(bound))?
}
