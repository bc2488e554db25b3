//! `gemini-bridge` — single-flight driver for the `gemini` CLI.
//!
//! Turns one question into one answer, with the CLI's terminal noise and
//! upstream failures (quota exhaustion, unknown model, missing credentials)
//! mapped to typed outcomes.
//!
//! # Architecture
//!
//! ```text
//! Bridge::ask(question, model)
//!     │
//!     ├─ Headless     ← one `gemini --prompt … --output-format json` per call
//!     │     │            stdout+stderr captured into one blob
//!     │     ▼
//!     │  extract      ← last balanced `{…}` in the blob → ParsedResponse
//!     │     ▼
//!     │  classify     ← structured code, then rate-limit / model-not-found text
//!     │
//!     └─ Interactive  ← one long-lived `gemini` in a pseudo-terminal
//!           │            reader thread → filter → mpsc of FilteredLine
//!           ▼
//!        collector    ← echo / noise / prompt state machine → answer text
//! ```
//!
//! # Quick start
//!
//! ```rust,ignore
//! use gemini_bridge::{Bridge, BridgeConfig};
//!
//! let bridge = Bridge::new(BridgeConfig::default())?;
//! let answer = bridge.ask("What is 2+2?", Some("gemini-2.5-flash")).await?;
//! println!("{}", answer.text);
//! ```

pub mod bridge;
pub mod classify;
pub mod collector;
pub mod config;
pub mod error;
pub mod extract;
pub mod filter;
pub mod session;
pub mod types;

pub(crate) mod process;

#[cfg(test)]
mod testing;

pub use bridge::Bridge;
pub use classify::detect_upstream_status;
pub use config::{BridgeConfig, Strategy};
pub use error::{BridgeError, ConfigError};
pub use extract::{extract_last_json_object, parse_response};
pub use filter::{filter_line, is_error_report, strip_ansi, FilteredLine, NoiseRules};
pub use process::resolve_executable;
pub use session::Readiness;
pub use types::{Answer, ErrorInfo, ParsedResponse, UpstreamStatus};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, BridgeError>;
