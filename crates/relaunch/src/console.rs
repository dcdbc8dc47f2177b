use owo_colors::{AnsiColors, OwoColorize};
use std::io::{IsTerminal, Write};
use std::sync::Arc;
use tokio::sync::broadcast;

const PALETTE: [AnsiColors; 6] = [
	AnsiColors::Cyan,
	AnsiColors::Green,
	AnsiColors::Yellow,
	AnsiColors::Magenta,
	AnsiColors::Blue,
	AnsiColors::BrightRed,
];

const NOTICE_PREFIX: &str = "[relaunch]";

/// One line of child output as it appeared on the console.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleLine {
	pub slot: String,
	pub text: String,
}

/// Shared console stream. Lines from different slots interleave freely.
#[derive(Clone)]
pub struct Console {
	inner: Arc<Inner>,
}

struct Inner {
	echo: bool,
	color: bool,
	sender: broadcast::Sender<ConsoleLine>,
}

impl Console {
	pub fn new(echo: bool, color: bool) -> Self {
		let (sender, _) = broadcast::channel(1024);
		Self {
			inner: Arc::new(Inner { echo, color, sender }),
		}
	}

	/// Echoes to stdout, colored when stdout is a terminal.
	pub fn stdout() -> Self {
		Self::new(true, std::io::stdout().is_terminal())
	}

	/// Broadcast only; nothing is printed.
	pub fn silent() -> Self {
		Self::new(false, false)
	}

	pub fn line(&self, slot: &str, text: &str) {
		if self.inner.echo {
			let mut out = std::io::stdout().lock();
			let _ = if self.inner.color {
				let prefix = format!("[{}]", slot);
				writeln!(out, "{} {}", prefix.color(color_for(slot)), text)
			} else {
				writeln!(out, "[{}] {}", slot, text)
			};
		}

		let _ = self.inner.sender.send(ConsoleLine {
			slot: slot.to_string(),
			text: text.to_string(),
		});
	}

	/// Prints a supervisor notice tagged `[relaunch]`. Notices are not
	/// broadcast; lifecycle observers subscribe to supervisor events instead.
	pub fn notice(&self, text: &str) {
		if !self.inner.echo {
			return;
		}
		let mut out = std::io::stdout().lock();
		let _ = if self.inner.color {
			writeln!(out, "{} {}", NOTICE_PREFIX.bold(), text.dimmed())
		} else {
			writeln!(out, "{} {}", NOTICE_PREFIX, text)
		};
	}

	pub fn subscribe(&self) -> broadcast::Receiver<ConsoleLine> {
		self.inner.sender.subscribe()
	}
}

fn color_for(slot: &str) -> AnsiColors {
	let hash = slot.bytes().fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
	PALETTE[hash % PALETTE.len()]
}
