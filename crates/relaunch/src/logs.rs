use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

pub const LOG_EXTENSION: &str = "log";

pub fn log_file_path(log_dir: &Path, stem: &str) -> PathBuf {
	log_dir.join(format!("{}.{}", stem, LOG_EXTENSION))
}

pub fn ensure_log_dir(log_dir: &Path) -> std::io::Result<()> {
	fs::create_dir_all(log_dir)
}

/// Opens a slot's log for appending. Existing content is never truncated.
pub fn open_append(path: &Path) -> std::io::Result<File> {
	if let Some(parent) = path.parent() {
		fs::create_dir_all(parent)?;
	}
	OpenOptions::new().create(true).append(true).open(path)
}
