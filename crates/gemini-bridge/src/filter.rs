//! Line-level cleanup for terminal output.
//!
//! [`filter_line`] strips ANSI/VT control sequences from one line of raw
//! PTY output and decides whether what is left is signal or decoration
//! (banners, box art, the re-drawn input prompt, footers). The noise
//! vocabulary is an explicit list in [`NoiseRules`]; the CLI's banner text is
//! fixed per release, so new entries are added here rather than inferred.

use std::sync::OnceLock;

use regex::Regex;

/// One line of terminal output after cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilteredLine {
    pub clean: String,
    pub is_noise: bool,
}

// ─── ANSI stripping ───────────────────────────────────────────────────────

static ANSI_RE: OnceLock<Regex> = OnceLock::new();

fn ansi_re() -> &'static Regex {
    ANSI_RE.get_or_init(|| {
        Regex::new(concat!(
            // CSI: cursor movement, SGR colour/style, erase, private modes (?25l)
            r"\x1b\[[0-9;?<>=!]*[ -/]*[@-~]",
            // OSC: window title, colour queries; BEL or ST terminated
            r"|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)",
            // DCS / SOS / PM / APC strings
            r"|\x1b[PX^_][^\x1b]*\x1b\\",
            // charset designation
            r"|\x1b[()*+][0-9A-Za-z]",
            // keypad modes and remaining two-byte escapes
            r"|\x1b[=>0-9A-Za-z\\]",
        ))
        .unwrap()
    })
}

/// Remove every control sequence from `raw`.
///
/// Carriage returns inside a line mean the terminal overwrote what came
/// before, so only the text after the last one is kept. Stray C0 control
/// characters (other than tab) are dropped after sequence removal, which makes
/// the function idempotent.
pub fn strip_ansi(raw: &str) -> String {
    let stripped = ansi_re().replace_all(raw, "");
    let visible = stripped
        .trim_end_matches(['\r', '\n'])
        .rsplit('\r')
        .next()
        .unwrap_or_default();
    visible
        .chars()
        .filter(|c| *c == '\t' || !c.is_control())
        .collect()
}

// ─── Noise vocabulary ─────────────────────────────────────────────────────

/// Box-drawing and block-art glyphs used by the CLI's banner and frames.
const BOX_CHARS: &[char] = &['╭', '╮', '╰', '╯', '│', '─', '░', '█', '▀', '▄'];

const BANNER_SUBSTRINGS: &[&str] = &[
    "Tips for getting started",
    "Ask questions, edit files",
    "Be specific for the best results",
    "Create GEMINI.md",
    "/help for more information",
    "Warning you are running",
    "This warning can be disabled",
    "Enable \"Preview features\"",
    "Learn more at",
    "Gemini 3 Flash and Pro",
    "with Gemini",
];

const FOOTER_SUBSTRINGS: &[&str] = &[
    "no sandbox",
    "sandbox-exec",
    "Auto (Gemini",
    "/model",
];

const PROMPT_PLACEHOLDER: &str = "Type your message or @path/to/file";

const AUTH_WAIT_SUBSTRINGS: &[&str] = &["Waiting for auth", "Please set an Auth method"];

const ERROR_REPORT_MARKERS: &[&str] = &["[API Error", "Error when talking to Gemini API"];

static MENU_RE: OnceLock<Regex> = OnceLock::new();
static CONTEXT_BADGE_RE: OnceLock<Regex> = OnceLock::new();

fn menu_re() -> &'static Regex {
    // Only selector-marked entries; plain numbered lists are answer content.
    MENU_RE.get_or_init(|| Regex::new(r"^[●○◯❯›]\s*\d+[.)]\s+\S").unwrap())
}

fn context_badge_re() -> &'static Regex {
    CONTEXT_BADGE_RE.get_or_init(|| Regex::new(r"\(\d{1,3}% context left\)").unwrap())
}

/// The set of rules deciding whether a clean line is decoration.
///
/// [`NoiseRules::default`] carries the vocabulary for the current CLI
/// release. Deployments pinned to other releases add substrings through
/// [`NoiseRules::with_extra`].
#[derive(Debug, Clone, Default)]
pub struct NoiseRules {
    extra: Vec<String>,
}

impl NoiseRules {
    pub fn with_extra<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        NoiseRules {
            extra: extra
                .into_iter()
                .map(Into::into)
                .filter(|s: &String| !s.is_empty())
                .collect(),
        }
    }

    pub fn filter(&self, raw: &str) -> FilteredLine {
        let clean = strip_ansi(raw);
        let is_noise = self.is_noise(&clean);
        FilteredLine { clean, is_noise }
    }

    pub fn is_noise(&self, clean: &str) -> bool {
        let trimmed = clean.trim();
        if trimmed.is_empty() {
            return true;
        }
        if trimmed.contains(BOX_CHARS) {
            return true;
        }
        if is_prompt(trimmed) {
            return true;
        }
        if trimmed.starts_with('~') {
            return true;
        }
        if BANNER_SUBSTRINGS.iter().any(|s| trimmed.contains(s))
            || FOOTER_SUBSTRINGS.iter().any(|s| trimmed.contains(s))
        {
            return true;
        }
        if menu_re().is_match(trimmed) || context_badge_re().is_match(trimmed) {
            return true;
        }
        self.extra.iter().any(|s| trimmed.contains(s.as_str()))
    }
}

/// Clean and classify one line with the default vocabulary.
pub fn filter_line(raw: &str) -> FilteredLine {
    static DEFAULT: OnceLock<NoiseRules> = OnceLock::new();
    DEFAULT.get_or_init(NoiseRules::default).filter(raw)
}

/// True when `clean` is the CLI's input prompt being drawn again, which is
/// how the interactive session signals it is ready for the next input.
pub fn is_prompt(clean: &str) -> bool {
    let trimmed = clean.trim_start();
    trimmed.starts_with('>') || trimmed.contains(PROMPT_PLACEHOLDER)
}

/// True when the CLI is blocked waiting for interactive authentication.
pub fn is_auth_wait(text: &str) -> bool {
    AUTH_WAIT_SUBSTRINGS.iter().any(|s| text.contains(s))
}

/// True when `clean` is the CLI reporting a failed request (`✕ [API Error: ...]`)
/// rather than answer text.
pub fn is_error_report(clean: &str) -> bool {
    let trimmed = clean.trim_start();
    trimmed.starts_with('✕') || ERROR_REPORT_MARKERS.iter().any(|s| trimmed.contains(s))
}
