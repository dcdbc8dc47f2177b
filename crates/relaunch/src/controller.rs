use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::net::unix::pipe;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::console::Console;
use crate::descriptor::ProcessSpec;
use crate::error::{SpawnError, StopError};
use crate::relay::{self, LogSink, Predecessor};
use crate::types::{SlotReport, SlotState};

/// Result of a non-blocking liveness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll {
	/// No process and nothing to report.
	Idle,
	Running,
	Exited(Option<i32>),
	/// The last start attempt failed; reported once.
	SpawnFailed,
}

#[derive(Debug)]
pub enum StopOutcome {
	NotRunning,
	Terminated { pid: u32 },
	Killed { pid: u32 },
	Failed(StopError),
}

/// Owns one slot: its spec, the live child, and its restart history.
pub struct ProcessController {
	spec: ProcessSpec,
	state: SlotState,
	child: Option<Child>,
	relay: Option<JoinHandle<u64>>,
	restarts: u32,
	stop_requested: bool,
	last_exit: Option<i32>,
	spawn_failed: bool,
}

impl ProcessController {
	pub fn new(spec: ProcessSpec) -> Self {
		Self {
			spec,
			state: SlotState::NotStarted,
			child: None,
			relay: None,
			restarts: 0,
			stop_requested: false,
			last_exit: None,
			spawn_failed: false,
		}
	}

	pub fn spec(&self) -> &ProcessSpec {
		&self.spec
	}

	pub fn name(&self) -> &str {
		&self.spec.name
	}

	pub fn state(&self) -> SlotState {
		self.state
	}

	pub fn restarts(&self) -> u32 {
		self.restarts
	}

	pub fn stop_requested(&self) -> bool {
		self.stop_requested
	}

	pub fn pid(&self) -> Option<u32> {
		self.child.as_ref().and_then(|c| c.id())
	}

	/// Marks a slot that will never be started.
	pub fn skip(&mut self) {
		self.state = SlotState::Skipped;
	}

	/// Marks an exited slot as finished for good.
	pub fn finish(&mut self) {
		self.child = None;
		self.state = SlotState::Stopped;
	}

	/// Spawns a new generation with stdout and stderr merged into one pipe
	/// drained by a relay task.
	pub fn start(&mut self, console: &Console) -> Result<u32, SpawnError> {
		self.launch(console, None)
	}

	/// Starts the next generation after an automatic restart decision. It
	/// runs right away; its relay holds its output until the previous
	/// generation's relay has finished, or `relay_wait` has passed.
	pub fn restart(&mut self, console: &Console, relay_wait: Duration) -> Result<u32, SpawnError> {
		self.restarts += 1;
		let previous = self.relay.take().map(|handle| Predecessor {
			handle,
			wait: relay_wait,
		});
		self.launch(console, previous)
	}

	fn launch(&mut self, console: &Console, mut previous: Option<Predecessor>) -> Result<u32, SpawnError> {
		match self.spawn(console, &mut previous) {
			Ok(pid) => {
				self.state = SlotState::Running { pid };
				self.spawn_failed = false;
				Ok(pid)
			}
			Err(e) => {
				self.relay = previous.map(|p| p.handle);
				self.state = SlotState::NotStarted;
				self.spawn_failed = true;
				Err(e)
			}
		}
	}

	fn spawn(&mut self, console: &Console, previous: &mut Option<Predecessor>) -> Result<u32, SpawnError> {
		let sink = LogSink::open(&self.spec.log_file).map_err(|source| SpawnError::LogFile {
			path: self.spec.log_file.clone(),
			source,
		})?;

		let (tx, rx) = pipe::pipe().map_err(SpawnError::Pipe)?;
		let stdout = tx.into_blocking_fd().map_err(SpawnError::Pipe)?;
		let stderr = stdout.try_clone().map_err(SpawnError::Pipe)?;

		// The command holds the write ends; it must be dropped before the
		// relay can observe end-of-stream.
		let child = {
			let mut cmd = Command::new(&self.spec.program);
			cmd.args(&self.spec.args)
				.current_dir(&self.spec.working_dir)
				.envs(self.spec.env_overrides())
				.stdin(Stdio::null())
				.stdout(Stdio::from(stdout))
				.stderr(Stdio::from(stderr))
				.process_group(0)
				.kill_on_drop(true);
			cmd.spawn().map_err(SpawnError::Spawn)?
		};

		let pid = child.id().unwrap_or(0);
		self.relay = Some(relay::spawn_relay(
			self.spec.name.clone(),
			rx,
			sink,
			console.clone(),
			previous.take(),
		));
		self.child = Some(child);
		Ok(pid)
	}

	/// Waits up to `wait` for the current relay to reach end-of-stream and
	/// aborts it otherwise. Returns whether it finished.
	pub async fn drain_relay(&mut self, wait: Duration) -> bool {
		match self.relay.take() {
			Some(handle) => Predecessor { handle, wait }.settle(&self.spec.name).await,
			None => true,
		}
	}

	pub fn poll(&mut self) -> Poll {
		if self.spawn_failed {
			self.spawn_failed = false;
			return Poll::SpawnFailed;
		}

		let Some(child) = self.child.as_mut() else {
			return Poll::Idle;
		};
		let pid = child.id();

		match child.try_wait() {
			Ok(None) => Poll::Running,
			Ok(Some(status)) => {
				let code = self.reap(status);
				if let Some(pid) = pid {
					self.clear_group(pid);
				}
				self.state = SlotState::Exited { code };
				Poll::Exited(code)
			}
			Err(e) => {
				tracing::warn!(slot = %self.spec.name, error = %e, "failed to poll process");
				self.child = None;
				self.last_exit = None;
				self.state = SlotState::Exited { code: None };
				Poll::Exited(None)
			}
		}
	}

	fn reap(&mut self, status: ExitStatus) -> Option<i32> {
		self.child = None;
		self.last_exit = status.code();
		self.last_exit
	}

	/// Terminates whatever is left in the exited generation's process group.
	/// Background descendants would otherwise keep the output pipe open.
	fn clear_group(&self, pid: u32) {
		if signal_group(pid, Signal::SIGTERM).is_ok() {
			tracing::debug!(slot = %self.spec.name, pid, "terminated leftover processes");
		}
	}

	/// Requests a permanent stop: SIGTERM to the process group, then SIGKILL
	/// once `grace` has passed. Failures are returned, never propagated.
	pub async fn stop(&mut self, grace: Duration) -> StopOutcome {
		self.stop_requested = true;

		let Some(child) = self.child.as_mut() else {
			if !self.state.is_terminal() {
				self.state = SlotState::Stopped;
			}
			return StopOutcome::NotRunning;
		};

		if let Ok(Some(status)) = child.try_wait() {
			self.reap(status);
			self.state = SlotState::Stopped;
			return StopOutcome::NotRunning;
		}

		let pid = child.id().unwrap_or(0);
		self.state = SlotState::Terminating { pid };

		match signal_group(pid, Signal::SIGTERM) {
			Ok(()) => {
				let waited = tokio::time::timeout(grace, child.wait()).await;
				match waited {
					Ok(Ok(status)) => {
						self.reap(status);
						self.state = SlotState::Stopped;
						return StopOutcome::Terminated { pid };
					}
					Ok(Err(source)) => {
						self.finish();
						return StopOutcome::Failed(StopError::Wait { pid, source });
					}
					Err(_) => {}
				}
			}
			Err(e) => {
				tracing::warn!(slot = %self.spec.name, error = %e, "graceful stop failed, escalating");
			}
		}

		if let Err(e) = signal_group(pid, Signal::SIGKILL) {
			if child.start_kill().is_err() {
				self.finish();
				return StopOutcome::Failed(e);
			}
		}

		let waited = tokio::time::timeout(grace, child.wait()).await;
		match waited {
			Ok(Ok(status)) => {
				self.reap(status);
				self.state = SlotState::Killed;
				StopOutcome::Killed { pid }
			}
			Ok(Err(source)) => {
				self.finish();
				StopOutcome::Failed(StopError::Wait { pid, source })
			}
			Err(_) => {
				self.finish();
				StopOutcome::Failed(StopError::Unreaped { pid })
			}
		}
	}

	pub fn report(&self) -> SlotReport {
		SlotReport {
			name: self.spec.name.clone(),
			state: self.state,
			restarts: self.restarts,
			stop_requested: self.stop_requested,
			last_exit: self.last_exit,
		}
	}
}

fn signal_group(pid: u32, signal: Signal) -> Result<(), StopError> {
	killpg(Pid::from_raw(pid as i32), signal).map_err(|source| StopError::Signal { pid, signal, source })
}
