use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::policy::{RestartLimit, RestartPolicy};

pub const DEFAULT_CONFIG_FILE: &str = "relaunch.toml";

/// A configured process: either a bare command string or a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawEntry {
	Command(String),
	Record(EntryRecord),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryRecord {
	pub command: String,
	#[serde(default)]
	pub working_directory: Option<PathBuf>,
	#[serde(default)]
	pub interpreter: Option<PathBuf>,
}

impl RawEntry {
	pub fn command(&self) -> &str {
		match self {
			RawEntry::Command(cmd) => cmd,
			RawEntry::Record(rec) => &rec.command,
		}
	}
}

impl From<&str> for RawEntry {
	fn from(cmd: &str) -> Self {
		RawEntry::Command(cmd.to_string())
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	#[serde(default = "default_log_dir")]
	pub log_dir: PathBuf,
	#[serde(default = "default_true")]
	pub restart_on_failure: bool,
	#[serde(default = "default_max_restarts")]
	pub max_restarts: RestartLimit,
	#[serde(default = "default_poll_interval_ms")]
	pub poll_interval_ms: u64,
	#[serde(default = "default_stop_grace_ms")]
	pub stop_grace_ms: u64,
	#[serde(default)]
	pub scripts: ScriptDefaults,
	pub processes: Vec<RawEntry>,
}

/// How script-type commands are recognized and launched.
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptDefaults {
	#[serde(default = "default_interpreter")]
	pub interpreter: PathBuf,
	#[serde(default = "default_extensions")]
	pub extensions: Vec<String>,
	#[serde(default = "default_search_path_var")]
	pub search_path_var: String,
	#[serde(default = "default_unbuffered_var")]
	pub unbuffered_var: String,
}

impl Default for ScriptDefaults {
	fn default() -> Self {
		Self {
			interpreter: default_interpreter(),
			extensions: default_extensions(),
			search_path_var: default_search_path_var(),
			unbuffered_var: default_unbuffered_var(),
		}
	}
}

fn default_log_dir() -> PathBuf {
	PathBuf::from("logs")
}
fn default_true() -> bool {
	true
}
fn default_max_restarts() -> RestartLimit {
	RestartLimit::Capped(3)
}
fn default_poll_interval_ms() -> u64 {
	500
}
fn default_stop_grace_ms() -> u64 {
	3000
}
fn default_interpreter() -> PathBuf {
	PathBuf::from("python3")
}
fn default_extensions() -> Vec<String> {
	vec!["py".to_string()]
}
fn default_search_path_var() -> String {
	"PYTHONPATH".to_string()
}
fn default_unbuffered_var() -> String {
	"PYTHONUNBUFFERED".to_string()
}

impl Config {
	pub fn from_toml(content: &str, path: &Path) -> Result<Self> {
		toml::from_str(content).map_err(|source| ConfigError::Parse {
			path: path.to_path_buf(),
			source,
		})
	}

	pub fn load(path: &Path) -> Result<Self> {
		let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
			path: path.to_path_buf(),
			source,
		})?;
		Self::from_toml(&content, path)
	}

	pub fn policy(&self) -> RestartPolicy {
		RestartPolicy::new(self.restart_on_failure, self.max_restarts)
	}

	pub fn poll_interval(&self) -> Duration {
		Duration::from_millis(self.poll_interval_ms.max(1))
	}

	pub fn stop_grace(&self) -> Duration {
		Duration::from_millis(self.stop_grace_ms)
	}
}
