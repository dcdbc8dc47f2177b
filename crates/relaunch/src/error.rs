use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("failed to read {}: {source}", path.display())]
	Read {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to parse {}: {source}", path.display())]
	Parse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},

	#[error("entry {index}: empty command")]
	EmptyCommand { index: usize },

	#[error("{name}: not found: {}", path.display())]
	NotFound { name: String, path: PathBuf },
}

#[derive(Error, Debug)]
pub enum SpawnError {
	#[error("failed to create output pipe: {0}")]
	Pipe(#[source] std::io::Error),

	#[error("failed to open log file {}: {source}", path.display())]
	LogFile {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("spawn failed: {0}")]
	Spawn(#[source] std::io::Error),
}

#[derive(Error, Debug)]
pub enum StopError {
	#[error("failed to signal pid {pid} with {signal}: {source}")]
	Signal {
		pid: u32,
		signal: nix::sys::signal::Signal,
		#[source]
		source: nix::Error,
	},

	#[error("failed to wait for pid {pid}: {source}")]
	Wait {
		pid: u32,
		#[source]
		source: std::io::Error,
	},

	#[error("pid {pid} still running after SIGKILL")]
	Unreaped { pid: u32 },
}

pub type Result<T, E = ConfigError> = std::result::Result<T, E>;
