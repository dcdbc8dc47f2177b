use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SlotState {
	NotStarted,
	Running { pid: u32 },
	Exited { code: Option<i32> },
	Terminating { pid: u32 },
	Killed,
	Stopped,
	Skipped,
}

impl SlotState {
	pub fn is_running(&self) -> bool {
		matches!(self, SlotState::Running { .. } | SlotState::Terminating { .. })
	}

	pub fn is_terminal(&self) -> bool {
		matches!(self, SlotState::Stopped | SlotState::Killed | SlotState::Skipped)
	}
}

/// Lifecycle notifications published by the supervision loop.
#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorEvent {
	Skipped { slot: String, reason: String },
	Started { slot: String, pid: u32, dir: PathBuf },
	SpawnFailed { slot: String, error: String },
	Exited { slot: String, code: Option<i32> },
	Restarting { slot: String, attempt: u32 },
	GaveUp { slot: String, restarts: u32 },
	Stopping { slot: String, pid: u32 },
	Killed { slot: String, pid: u32 },
	StopFailed { slot: String, error: String },
	ShutdownRequested,
	Completed,
}

impl SupervisorEvent {
	pub fn slot(&self) -> Option<&str> {
		match self {
			SupervisorEvent::Skipped { slot, .. }
			| SupervisorEvent::Started { slot, .. }
			| SupervisorEvent::SpawnFailed { slot, .. }
			| SupervisorEvent::Exited { slot, .. }
			| SupervisorEvent::Restarting { slot, .. }
			| SupervisorEvent::GaveUp { slot, .. }
			| SupervisorEvent::Stopping { slot, .. }
			| SupervisorEvent::Killed { slot, .. }
			| SupervisorEvent::StopFailed { slot, .. } => Some(slot),
			SupervisorEvent::ShutdownRequested | SupervisorEvent::Completed => None,
		}
	}
}

impl fmt::Display for SupervisorEvent {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SupervisorEvent::Skipped { slot, reason } => write!(f, "skipping {}: {}", slot, reason),
			SupervisorEvent::Started { slot, pid, dir } => {
				write!(f, "started {} (pid {}) in {}", slot, pid, dir.display())
			}
			SupervisorEvent::SpawnFailed { slot, error } => write!(f, "{} failed to start: {}", slot, error),
			SupervisorEvent::Exited { slot, code: Some(code) } => write!(f, "{} exited with code {}", slot, code),
			SupervisorEvent::Exited { slot, code: None } => write!(f, "{} was terminated by a signal", slot),
			SupervisorEvent::Restarting { slot, attempt } => write!(f, "restarting {} (attempt {})", slot, attempt),
			SupervisorEvent::GaveUp { slot, restarts } => {
				write!(f, "{} will not be restarted (restarts: {})", slot, restarts)
			}
			SupervisorEvent::Stopping { slot, pid } => write!(f, "stopping {} (pid {})", slot, pid),
			SupervisorEvent::Killed { slot, pid } => write!(f, "killed {} (pid {}) after grace period", slot, pid),
			SupervisorEvent::StopFailed { slot, error } => write!(f, "failed to stop {}: {}", slot, error),
			SupervisorEvent::ShutdownRequested => write!(f, "shutdown requested, stopping all processes"),
			SupervisorEvent::Completed => write!(f, "all processes finished"),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
	/// Every slot reached a terminal state on its own.
	Completed,
	/// The shutdown signal fired.
	Shutdown,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotReport {
	pub name: String,
	pub state: SlotState,
	pub restarts: u32,
	pub stop_requested: bool,
	pub last_exit: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
	pub outcome: RunOutcome,
	pub slots: Vec<SlotReport>,
}

impl RunSummary {
	pub fn slot(&self, name: &str) -> Option<&SlotReport> {
		self.slots.iter().find(|s| s.name == name)
	}
}
