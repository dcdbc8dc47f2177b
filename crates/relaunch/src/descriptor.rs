//! Turns configured entries into fully resolved process descriptions.

use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::config::{Config, RawEntry, ScriptDefaults};
use crate::error::ConfigError;
use crate::logs;

#[cfg(windows)]
const SEARCH_PATH_SEPARATOR: &str = ";";
#[cfg(not(windows))]
const SEARCH_PATH_SEPARATOR: &str = ":";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LaunchKind {
	/// Run through an interpreter: `[interpreter, script]`.
	Script,
	/// Whitespace-split command line, run directly.
	Command,
}

/// Immutable description of one slot, resolved once at startup.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessSpec {
	pub index: usize,
	pub name: String,
	pub command: String,
	pub kind: LaunchKind,
	pub path: PathBuf,
	pub working_dir: PathBuf,
	pub interpreter: Option<PathBuf>,
	pub program: PathBuf,
	pub args: Vec<String>,
	pub log_file: PathBuf,
	#[serde(skip)]
	search_path_var: String,
	#[serde(skip)]
	unbuffered_var: String,
}

/// Everything needed to resolve entries relative to the supervisor.
#[derive(Debug, Clone)]
pub struct Resolver {
	pub base_dir: PathBuf,
	pub log_dir: PathBuf,
	pub scripts: ScriptDefaults,
}

impl Resolver {
	pub fn new(base_dir: impl Into<PathBuf>, log_dir: impl AsRef<Path>, scripts: ScriptDefaults) -> Self {
		let base_dir = base_dir.into();
		let log_dir = absolutize(&base_dir, log_dir.as_ref());
		Self {
			base_dir,
			log_dir,
			scripts,
		}
	}

	pub fn from_config(config: &Config, base_dir: impl Into<PathBuf>) -> Self {
		Self::new(base_dir, &config.log_dir, config.scripts.clone())
	}

	/// Resolves every entry in order. Never fails; see [`ProcessSpec::verify`].
	pub fn resolve_all(&self, entries: &[RawEntry]) -> Vec<ProcessSpec> {
		entries
			.iter()
			.enumerate()
			.map(|(index, entry)| self.resolve(index, entry))
			.collect()
	}

	pub fn resolve(&self, index: usize, entry: &RawEntry) -> ProcessSpec {
		let (command, cwd_override, interp_override) = match entry {
			RawEntry::Command(cmd) => (cmd.trim(), None, None),
			RawEntry::Record(rec) => (
				rec.command.trim(),
				rec.working_directory.as_deref(),
				rec.interpreter.as_deref(),
			),
		};

		if self.is_script(command) {
			self.resolve_script(index, command, cwd_override, interp_override)
		} else {
			self.resolve_command(index, command, cwd_override)
		}
	}

	fn is_script(&self, command: &str) -> bool {
		Path::new(command)
			.extension()
			.and_then(|e| e.to_str())
			.map(|ext| self.scripts.extensions.iter().any(|known| known.eq_ignore_ascii_case(ext)))
			.unwrap_or(false)
	}

	fn resolve_script(
		&self,
		index: usize,
		command: &str,
		cwd_override: Option<&Path>,
		interp_override: Option<&Path>,
	) -> ProcessSpec {
		let path = absolutize(&self.base_dir, Path::new(command));
		let script_dir = parent_or(&path, &self.base_dir);
		let working_dir = cwd_override
			.map(|dir| absolutize(&self.base_dir, dir))
			.unwrap_or_else(|| script_dir.clone());

		// The bare file name only resolves when running from the script's own directory.
		let script_arg = if working_dir == script_dir {
			file_name(&path)
		} else {
			path.to_string_lossy().to_string()
		};

		let interpreter = interp_override
			.map(Path::to_path_buf)
			.unwrap_or_else(|| self.scripts.interpreter.clone());

		ProcessSpec {
			index,
			name: file_name(&path),
			command: command.to_string(),
			kind: LaunchKind::Script,
			log_file: self.log_file_for(&path),
			program: interpreter.clone(),
			args: vec![script_arg],
			interpreter: Some(interpreter),
			working_dir,
			path,
			search_path_var: self.scripts.search_path_var.clone(),
			unbuffered_var: self.scripts.unbuffered_var.clone(),
		}
	}

	fn resolve_command(&self, index: usize, command: &str, cwd_override: Option<&Path>) -> ProcessSpec {
		let mut tokens = command.split_whitespace();
		let program = tokens.next().unwrap_or("");
		let args: Vec<String> = tokens.map(str::to_string).collect();

		let (path, default_dir) = if program.is_empty() {
			(self.base_dir.clone(), self.base_dir.clone())
		} else if program.contains(std::path::MAIN_SEPARATOR) || program.contains('/') {
			let path = absolutize(&self.base_dir, Path::new(program));
			let dir = parent_or(&path, &self.base_dir);
			(path, dir)
		} else {
			let path = search_path(program).unwrap_or_else(|| self.base_dir.join(program));
			(path, self.base_dir.clone())
		};

		let working_dir = cwd_override
			.map(|dir| absolutize(&self.base_dir, dir))
			.unwrap_or(default_dir);

		let name = if program.is_empty() {
			format!("entry-{}", index)
		} else {
			file_name(&path)
		};

		ProcessSpec {
			index,
			log_file: if program.is_empty() {
				logs::log_file_path(&self.log_dir, &name)
			} else {
				self.log_file_for(&path)
			},
			name,
			command: command.to_string(),
			kind: LaunchKind::Command,
			program: path.clone(),
			args,
			interpreter: None,
			working_dir,
			path,
			search_path_var: self.scripts.search_path_var.clone(),
			unbuffered_var: self.scripts.unbuffered_var.clone(),
		}
	}

	fn log_file_for(&self, path: &Path) -> PathBuf {
		let stem = path
			.file_stem()
			.map(|s| s.to_string_lossy().to_string())
			.unwrap_or_else(|| file_name(path));
		logs::log_file_path(&self.log_dir, &stem)
	}
}

impl ProcessSpec {
	/// Checks that the command is non-empty and its path exists.
	pub fn verify(&self) -> Result<(), ConfigError> {
		if self.command.trim().is_empty() {
			return Err(ConfigError::EmptyCommand { index: self.index });
		}
		if !self.path.exists() {
			return Err(ConfigError::NotFound {
				name: self.name.clone(),
				path: self.path.clone(),
			});
		}
		Ok(())
	}

	pub fn command_line(&self) -> String {
		let mut parts = vec![self.program.to_string_lossy().to_string()];
		parts.extend(self.args.iter().cloned());
		parts.join(" ")
	}

	/// Variables layered over the inherited environment when spawning.
	pub fn env_overrides(&self) -> Vec<(String, OsString)> {
		self.env_overrides_with(|key| std::env::var_os(key))
	}

	pub fn env_overrides_with(&self, lookup: impl Fn(&str) -> Option<OsString>) -> Vec<(String, OsString)> {
		let mut vars = Vec::new();

		if !self.search_path_var.is_empty() {
			let mut value = self.working_dir.clone().into_os_string();
			if let Some(existing) = lookup(&self.search_path_var).filter(|v| !v.is_empty()) {
				value.push(SEARCH_PATH_SEPARATOR);
				value.push(existing);
			}
			vars.push((self.search_path_var.clone(), value));
		}

		if !self.unbuffered_var.is_empty() && lookup(&self.unbuffered_var).is_none() {
			vars.push((self.unbuffered_var.clone(), OsString::from("1")));
		}

		vars
	}
}

fn absolutize(base: &Path, path: &Path) -> PathBuf {
	if path.is_absolute() {
		path.to_path_buf()
	} else {
		base.join(path)
	}
}

fn parent_or(path: &Path, fallback: &Path) -> PathBuf {
	path.parent()
		.filter(|p| !p.as_os_str().is_empty())
		.map(Path::to_path_buf)
		.unwrap_or_else(|| fallback.to_path_buf())
}

fn file_name(path: &Path) -> String {
	path.file_name()
		.map(|n| n.to_string_lossy().to_string())
		.unwrap_or_else(|| path.to_string_lossy().to_string())
}

fn search_path(program: &str) -> Option<PathBuf> {
	let paths = std::env::var_os("PATH")?;
	std::env::split_paths(&paths)
		.map(|dir| dir.join(program))
		.find(|candidate| candidate.is_file())
}
