use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

/// How the bridge talks to the CLI. Fixed for the bridge's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// One `gemini --output-format json` process per question.
    #[default]
    Headless,
    /// One long-lived session in a pseudo-terminal, scraped line by line.
    Interactive,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Headless => "headless",
            Strategy::Interactive => "interactive",
        }
    }
}

impl std::str::FromStr for Strategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "headless" => Ok(Strategy::Headless),
            "interactive" | "pty" => Ok(Strategy::Interactive),
            other => Err(ConfigError::Invalid(format!(
                "unknown strategy '{other}' (expected 'headless' or 'interactive')"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// BridgeConfig
// ---------------------------------------------------------------------------

/// Everything the bridge needs to spawn and supervise the CLI.
///
/// Loaded from YAML with every field optional; missing fields take the
/// deployment defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub strategy: Strategy,
    #[serde(default = "default_executable")]
    pub executable: String,
    /// Value for `HOME` and `XDG_CONFIG_HOME` in the child environment.
    #[serde(default = "default_home_dir")]
    pub home_dir: PathBuf,
    /// Credential directory (`GEMINI_CONFIG_DIR`). Defaults to `<home_dir>/.gemini`.
    #[serde(default)]
    pub config_dir: Option<PathBuf>,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_quiet_period_ms")]
    pub quiet_period_ms: u64,
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
    /// Extra variables set on the child, after the fixed overrides.
    #[serde(default)]
    pub extra_env: BTreeMap<String, String>,
    /// Extra noise substrings for the interactive line filter.
    #[serde(default)]
    pub noise: Vec<String>,
}

fn default_executable() -> String {
    "gemini".to_string()
}

fn default_home_dir() -> PathBuf {
    PathBuf::from("/app")
}

fn default_user() -> String {
    "root".to_string()
}

fn default_timeout_secs() -> u64 {
    90
}

fn default_quiet_period_ms() -> u64 {
    2_000
}

fn default_startup_timeout_secs() -> u64 {
    30
}

fn default_grace_period_ms() -> u64 {
    500
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            executable: default_executable(),
            home_dir: default_home_dir(),
            config_dir: None,
            user: default_user(),
            timeout_secs: default_timeout_secs(),
            quiet_period_ms: default_quiet_period_ms(),
            startup_timeout_secs: default_startup_timeout_secs(),
            grace_period_ms: default_grace_period_ms(),
            extra_env: BTreeMap::new(),
            noise: Vec::new(),
        }
    }
}

impl BridgeConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let cfg: BridgeConfig = serde_yaml::from_str(&data)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.executable.trim().is_empty() {
            return Err(ConfigError::Invalid("executable must not be empty".into()));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout_secs must be positive".into()));
        }
        if self.startup_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "startup_timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn config_dir(&self) -> PathBuf {
        self.config_dir
            .clone()
            .unwrap_or_else(|| self.home_dir.join(".gemini"))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    /// The environment overrides applied to every spawned CLI process, in
    /// application order.
    pub fn child_env(&self) -> Vec<(String, String)> {
        let home = self.home_dir.display().to_string();
        let mut env = vec![
            ("HOME".to_string(), home.clone()),
            (
                "GEMINI_CONFIG_DIR".to_string(),
                self.config_dir().display().to_string(),
            ),
            ("XDG_CONFIG_HOME".to_string(), home),
            ("USER".to_string(), self.user.clone()),
        ];
        env.extend(self.extra_env.iter().map(|(k, v)| (k.clone(), v.clone())));
        env
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_match_deployment_layout() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.strategy, Strategy::Headless);
        assert_eq!(cfg.executable, "gemini");
        assert_eq!(cfg.config_dir(), PathBuf::from("/app/.gemini"));
        assert_eq!(cfg.timeout(), Duration::from_secs(90));
        assert_eq!(cfg.quiet_period(), Duration::from_secs(2));
    }

    #[test]
    fn child_env_orders_fixed_overrides_before_extras() {
        let mut cfg = BridgeConfig::default();
        cfg.extra_env.insert("GEMINI_API_KEY".into(), "k".into());
        let env = cfg.child_env();
        let keys: Vec<&str> = env.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            keys,
            ["HOME", "GEMINI_CONFIG_DIR", "XDG_CONFIG_HOME", "USER", "GEMINI_API_KEY"]
        );
        assert_eq!(env[0].1, "/app");
    }

    #[test]
    fn load_partial_yaml_fills_defaults() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "strategy: interactive\ntimeout_secs: 30\nnoise: [\"Update available\"]").unwrap();
        let cfg = BridgeConfig::load(f.path()).unwrap();
        assert_eq!(cfg.strategy, Strategy::Interactive);
        assert_eq!(cfg.timeout_secs, 30);
        assert_eq!(cfg.executable, "gemini");
        assert_eq!(cfg.noise, vec!["Update available".to_string()]);
    }

    #[test]
    fn load_rejects_zero_timeout() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "timeout_secs: 0").unwrap();
        let err = BridgeConfig::load(f.path()).unwrap_err();
        assert!(err.to_string().contains("timeout_secs"));
    }

    #[test]
    fn load_missing_file_names_path() {
        let err = BridgeConfig::load(Path::new("/nonexistent/bridge.yaml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/bridge.yaml"));
    }

    #[test]
    fn strategy_parses_case_insensitively() {
        assert_eq!("Headless".parse::<Strategy>().unwrap(), Strategy::Headless);
        assert_eq!("pty".parse::<Strategy>().unwrap(), Strategy::Interactive);
        assert!("telepathy".parse::<Strategy>().is_err());
    }
}
