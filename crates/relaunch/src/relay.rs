use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::task::JoinHandle;

use crate::console::Console;
use crate::logs;

/// Longest chunk held in memory while waiting for a newline.
const MAX_LINE: usize = 64 * 1024;

/// Append-only log file for one slot.
pub struct LogSink {
	file: File,
	path: PathBuf,
}

impl LogSink {
	pub fn open(path: &Path) -> std::io::Result<Self> {
		Ok(Self {
			file: logs::open_append(path)?,
			path: path.to_path_buf(),
		})
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Writes a chunk verbatim and flushes it.
	pub fn write(&mut self, data: &[u8]) -> std::io::Result<()> {
		self.file.write_all(data)?;
		self.file.flush()
	}
}

/// Relay of the previous generation of a slot. The next relay waits for it
/// before writing so generations never interleave in the log.
pub struct Predecessor {
	pub handle: JoinHandle<u64>,
	pub wait: Duration,
}

impl Predecessor {
	/// Waits up to `wait` for the previous relay, then aborts it. Returns
	/// whether it finished on its own.
	pub async fn settle(mut self, slot: &str) -> bool {
		match tokio::time::timeout(self.wait, &mut self.handle).await {
			Ok(_) => true,
			Err(_) => {
				tracing::debug!(slot = %slot, "previous output stream still open, abandoning it");
				self.handle.abort();
				false
			}
		}
	}
}

/// Starts draining `reader` into the console and `sink`, after `previous`
/// has settled. The task resolves to the number of lines relayed once the
/// stream ends.
pub fn spawn_relay<R>(
	slot: String,
	reader: R,
	sink: LogSink,
	console: Console,
	previous: Option<Predecessor>,
) -> JoinHandle<u64>
where
	R: AsyncRead + Unpin + Send + 'static,
{
	tokio::spawn(async move {
		if let Some(previous) = previous {
			previous.settle(&slot).await;
		}
		relay(slot, reader, sink, console).await
	})
}

pub async fn relay<R>(slot: String, reader: R, mut sink: LogSink, console: Console) -> u64
where
	R: AsyncRead + Unpin,
{
	let mut reader = BufReader::new(reader);
	let mut buf = Vec::with_capacity(1024);
	let mut lines = 0u64;
	let mut sink_failed = false;

	loop {
		buf.clear();
		let n = match (&mut reader).take(MAX_LINE as u64).read_until(b'\n', &mut buf).await {
			Ok(0) => break,
			Ok(n) => n,
			Err(e) => {
				tracing::debug!(slot = %slot, error = %e, "output stream closed");
				break;
			}
		};

		let complete = buf.ends_with(b"\n");
		let text = trim_line_ending(&buf);
		console.line(&slot, &String::from_utf8_lossy(text));

		// A short chunk without a newline is the tail of the stream.
		if !complete && n < MAX_LINE {
			buf.push(b'\n');
		}
		if let Err(e) = sink.write(&buf) {
			if !sink_failed {
				tracing::warn!(slot = %slot, path = %sink.path().display(), error = %e, "failed to write log");
				sink_failed = true;
			}
		}
		lines += 1;
	}

	lines
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
	let line = line.strip_suffix(b"\n").unwrap_or(line);
	line.strip_suffix(b"\r").unwrap_or(line)
}
