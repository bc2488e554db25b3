use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use gemini_bridge::{BridgeConfig, Strategy};

/// Bridge settings shared by every subcommand.
///
/// Layering: built-in defaults, then the YAML file from `--config`, then any
/// flag or environment variable given here.
#[derive(Args, Debug, Default, Clone)]
pub struct BridgeArgs {
    /// YAML file with bridge settings
    #[arg(long, global = true, env = "GEMINI_WRAPPER_CONFIG")]
    pub config: Option<PathBuf>,

    /// gemini executable (name on PATH or absolute path)
    #[arg(long, global = true, env = "GEMINI_BIN")]
    pub gemini_bin: Option<String>,

    /// HOME for the gemini process
    #[arg(long, global = true, env = "GEMINI_HOME")]
    pub home: Option<PathBuf>,

    /// Credential directory (default: <home>/.gemini)
    #[arg(long, global = true, env = "GEMINI_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    /// Answer extraction strategy: headless or interactive
    #[arg(long, global = true, env = "GEMINI_BRIDGE_STRATEGY")]
    pub strategy: Option<Strategy>,

    /// Per-request timeout in seconds
    #[arg(long, global = true, env = "GEMINI_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,
}

impl BridgeArgs {
    pub fn resolve(&self) -> Result<BridgeConfig> {
        let mut cfg = match &self.config {
            Some(path) => BridgeConfig::load(path)
                .with_context(|| format!("loading bridge config from {}", path.display()))?,
            None => BridgeConfig::default(),
        };

        if let Some(bin) = &self.gemini_bin {
            cfg.executable = bin.clone();
        }
        if let Some(home) = &self.home {
            cfg.home_dir = home.clone();
        }
        if let Some(dir) = &self.config_dir {
            cfg.config_dir = Some(dir.clone());
        }
        if let Some(strategy) = self.strategy {
            cfg.strategy = strategy;
        }
        if let Some(secs) = self.timeout_secs {
            cfg.timeout_secs = secs;
        }

        cfg.validate()?;
        Ok(cfg)
    }
}
