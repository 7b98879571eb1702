//! Runtime configuration for claude-relay.
//!
//! Configuration can be loaded from a JSON file or constructed programmatically.
//! Command-line flags override file values, which override built-in defaults.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "claude-relay", version, about = "OpenAI-compatible chat API server for the Claude CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the relay server.
    Serve(ServeArgs),

    /// Verify that the Claude CLI binary can be found, then exit.
    Check {
        /// Path to the Claude CLI binary.
        #[arg(long)]
        claude_path: Option<String>,
    },
}

/// Arguments for the `serve` subcommand.
#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// HTTP listen address (host:port).
    #[arg(long)]
    pub listen: Option<String>,

    /// Path to the Claude CLI binary.
    #[arg(long)]
    pub claude_path: Option<String>,

    /// Backend timeout in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Backend (Claude CLI) configuration.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Model alias table.
    #[serde(default)]
    pub models: ModelMap,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address (e.g. "127.0.0.1:52014").
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_listen() -> String {
    "127.0.0.1:52014".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

/// Claude CLI invocation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Binary name or path; bare names are resolved through $PATH.
    #[serde(default = "default_cli_path")]
    pub cli_path: String,

    /// Kill a completion subprocess after this many seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_cli_path() -> String {
    "claude".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            cli_path: default_cli_path(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Maps client-facing model names to models the CLI accepts.
///
/// Lookups are case-insensitive; alias keys should be stored lowercase.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelMap {
    aliases: BTreeMap<String, String>,
}

impl Default for ModelMap {
    fn default() -> Self {
        let aliases = [
            ("sonnet", "sonnet"),
            ("opus", "opus"),
            ("haiku", "haiku"),
            ("claude-3-sonnet", "sonnet"),
            ("claude-3-opus", "opus"),
            ("claude-3-haiku", "haiku"),
            ("claude-sonnet-4", "sonnet"),
            ("claude-opus-4", "opus"),
        ]
        .into_iter()
        .map(|(alias, model)| (alias.to_string(), model.to_string()))
        .collect();
        Self { aliases }
    }
}

impl ModelMap {
    /// Resolve a client-facing model name to the CLI model identifier.
    /// Returns `None` when the name has no mapping.
    pub fn resolve(&self, alias: &str) -> Option<&str> {
        self.aliases
            .get(alias)
            .or_else(|| self.aliases.get(alias.to_ascii_lowercase().as_str()))
            .map(String::as_str)
    }

    /// Distinct CLI model identifiers, sorted.
    pub fn canonical_models(&self) -> Vec<String> {
        let unique: BTreeSet<&String> = self.aliases.values().collect();
        unique.into_iter().cloned().collect()
    }

    /// Number of aliases in the table.
    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    /// Whether the table has no aliases.
    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults for missing fields.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&data)?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }

    /// Apply `serve` flags on top of file-loaded values. Flags win over the
    /// CLAUDE_CLI_PATH environment variable, which wins over the file.
    pub fn apply_overrides(&mut self, args: &ServeArgs) {
        if let Some(listen) = &args.listen {
            self.server.listen = listen.clone();
        }
        match &args.claude_path {
            Some(path) => self.backend.cli_path = path.clone(),
            None => {
                if let Ok(path) = std::env::var("CLAUDE_CLI_PATH") {
                    if !path.is_empty() {
                        self.backend.cli_path = path;
                    }
                }
            }
        }
        if let Some(timeout) = args.timeout {
            self.backend.timeout_secs = timeout;
        }
    }
}
