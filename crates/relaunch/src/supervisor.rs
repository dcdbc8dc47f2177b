use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

use crate::config::Config;
use crate::console::Console;
use crate::controller::{Poll, ProcessController, StopOutcome};
use crate::descriptor::{ProcessSpec, Resolver};
use crate::error::SpawnError;
use crate::logs;
use crate::policy::RestartPolicy;
use crate::types::*;

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
	pub log_dir: PathBuf,
	pub policy: RestartPolicy,
	pub poll_interval: Duration,
	pub stop_grace: Duration,
}

impl SupervisorConfig {
	pub fn from_config(config: &Config, resolver: &Resolver) -> Self {
		Self {
			log_dir: resolver.log_dir.clone(),
			policy: config.policy(),
			poll_interval: config.poll_interval(),
			stop_grace: config.stop_grace(),
		}
	}
}

/// Owns every slot for the lifetime of one run.
pub struct Supervisor {
	slots: Vec<ProcessController>,
	config: SupervisorConfig,
	console: Console,
	events: broadcast::Sender<SupervisorEvent>,
}

impl Supervisor {
	pub fn new(specs: Vec<ProcessSpec>, config: SupervisorConfig, console: Console) -> Self {
		let (events, _) = broadcast::channel(1024);
		Self {
			slots: specs.into_iter().map(ProcessController::new).collect(),
			config,
			console,
			events,
		}
	}

	/// Resolves every configured entry against `base_dir`.
	pub fn from_config(config: &Config, base_dir: &Path, console: Console) -> Self {
		let resolver = Resolver::from_config(config, base_dir);
		let specs = resolver.resolve_all(&config.processes);
		Self::new(specs, SupervisorConfig::from_config(config, &resolver), console)
	}

	pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
		self.events.subscribe()
	}

	pub fn slots(&self) -> &[ProcessController] {
		&self.slots
	}

	/// Runs until every slot is terminal or `shutdown` resolves.
	pub async fn run<F>(mut self, shutdown: F) -> RunSummary
	where
		F: Future<Output = ()>,
	{
		if let Err(e) = logs::ensure_log_dir(&self.config.log_dir) {
			tracing::warn!(path = %self.config.log_dir.display(), error = %e, "failed to create log directory");
		}

		self.start_all();

		let mut ticker = tokio::time::interval(self.config.poll_interval);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
		tokio::pin!(shutdown);

		loop {
			if self.all_terminal() {
				break;
			}
			tokio::select! {
				_ = &mut shutdown => {
					return self.shutdown().await;
				}
				_ = ticker.tick() => {
					self.tick();
				}
			}
		}

		for slot in &mut self.slots {
			slot.drain_relay(self.config.stop_grace).await;
		}
		self.emit(SupervisorEvent::Completed);
		self.summary(RunOutcome::Completed)
	}

	fn start_all(&mut self) {
		for i in 0..self.slots.len() {
			if let Err(e) = self.slots[i].spec().verify() {
				self.slots[i].skip();
				let slot = self.slots[i].name().to_string();
				self.emit(SupervisorEvent::Skipped {
					slot,
					reason: e.to_string(),
				});
				continue;
			}
			self.launch(i);
		}
	}

	fn launch(&mut self, i: usize) {
		let result = self.slots[i].start(&self.console);
		self.report_start(i, result);
	}

	fn report_start(&self, i: usize, result: Result<u32, SpawnError>) {
		let slot = &self.slots[i];
		let event = match result {
			Ok(pid) => SupervisorEvent::Started {
				slot: slot.name().to_string(),
				pid,
				dir: slot.spec().working_dir.clone(),
			},
			Err(e) => SupervisorEvent::SpawnFailed {
				slot: slot.name().to_string(),
				error: e.to_string(),
			},
		};
		self.emit(event);
	}

	fn all_terminal(&self) -> bool {
		self.slots.iter().all(|s| s.state().is_terminal())
	}

	/// One polling pass over every slot. Never waits on a child or its
	/// output.
	fn tick(&mut self) {
		for i in 0..self.slots.len() {
			match self.slots[i].poll() {
				Poll::Idle | Poll::Running => continue,
				Poll::Exited(code) => {
					let slot = self.slots[i].name().to_string();
					self.emit(SupervisorEvent::Exited { slot, code });
				}
				// already reported when the start attempt failed
				Poll::SpawnFailed => {}
			}
			self.decide(i);
		}
	}

	fn decide(&mut self, i: usize) {
		let slot = &mut self.slots[i];
		if self.config.policy.allows(slot.restarts()) {
			let attempt = slot.restarts() + 1;
			let name = slot.name().to_string();
			self.emit(SupervisorEvent::Restarting { slot: name, attempt });
			let result = self.slots[i].restart(&self.console, self.config.stop_grace);
			self.report_start(i, result);
		} else {
			slot.finish();
			let event = SupervisorEvent::GaveUp {
				slot: slot.name().to_string(),
				restarts: slot.restarts(),
			};
			self.emit(event);
		}
	}

	/// Stops every slot concurrently and returns without waiting for relays.
	async fn shutdown(mut self) -> RunSummary {
		self.emit(SupervisorEvent::ShutdownRequested);

		let grace = self.config.stop_grace;
		let mut stops = JoinSet::new();
		for (i, mut slot) in self.slots.drain(..).enumerate() {
			let events = self.events.clone();
			let console = self.console.clone();
			stops.spawn(async move {
				if let Some(pid) = slot.pid() {
					emit(&events, &console, SupervisorEvent::Stopping { slot: slot.name().to_string(), pid });
				}
				let name = slot.name().to_string();
				match slot.stop(grace).await {
					StopOutcome::Killed { pid } => emit(&events, &console, SupervisorEvent::Killed { slot: name, pid }),
					StopOutcome::Failed(e) => emit(
						&events,
						&console,
						SupervisorEvent::StopFailed {
							slot: name,
							error: e.to_string(),
						},
					),
					StopOutcome::NotRunning | StopOutcome::Terminated { .. } => {}
				}
				(i, slot)
			});
		}

		let mut stopped = Vec::new();
		while let Some(joined) = stops.join_next().await {
			match joined {
				Ok(pair) => stopped.push(pair),
				Err(e) => tracing::error!(error = %e, "stop task failed"),
			}
		}
		stopped.sort_by_key(|(i, _)| *i);
		self.slots = stopped.into_iter().map(|(_, slot)| slot).collect();

		self.summary(RunOutcome::Shutdown)
	}

	fn summary(&self, outcome: RunOutcome) -> RunSummary {
		RunSummary {
			outcome,
			slots: self.slots.iter().map(ProcessController::report).collect(),
		}
	}

	fn emit(&self, event: SupervisorEvent) {
		emit(&self.events, &self.console, event);
	}
}

/// Publishes a lifecycle event to subscribers, the console and the log.
fn emit(events: &broadcast::Sender<SupervisorEvent>, console: &Console, event: SupervisorEvent) {
	console.notice(&event.to_string());
	match &event {
		SupervisorEvent::Skipped { slot, reason } => {
			tracing::warn!(slot = %slot, reason = %reason, "skipping");
		}
		SupervisorEvent::Started { slot, pid, dir } => {
			tracing::info!(slot = %slot, pid, dir = %dir.display(), "started");
		}
		SupervisorEvent::SpawnFailed { slot, error } => {
			tracing::warn!(slot = %slot, error = %error, "failed to start");
		}
		SupervisorEvent::Exited { slot, code } => {
			tracing::info!(slot = %slot, code = ?code, "exited");
		}
		SupervisorEvent::Restarting { slot, attempt } => {
			tracing::info!(slot = %slot, attempt, "restarting");
		}
		SupervisorEvent::GaveUp { slot, restarts } => {
			tracing::warn!(slot = %slot, restarts, "will not restart");
		}
		SupervisorEvent::Stopping { slot, pid } => {
			tracing::info!(slot = %slot, pid, "terminating");
		}
		SupervisorEvent::Killed { slot, pid } => {
			tracing::warn!(slot = %slot, pid, "killed after grace period");
		}
		SupervisorEvent::StopFailed { slot, error } => {
			tracing::warn!(slot = %slot, error = %error, "stop failed");
		}
		SupervisorEvent::ShutdownRequested => {
			tracing::info!("shutdown requested, stopping all processes");
		}
		SupervisorEvent::Completed => {
			tracing::info!("all processes finished");
		}
	}
	let _ = events.send(event);
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::{RawEntry, ScriptDefaults};
	use crate::policy::RestartLimit;
	use std::sync::atomic::{AtomicU32, Ordering};

	static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

	fn temp_dir(name: &str) -> PathBuf {
		let n = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
		let dir = std::env::temp_dir().join(format!("relaunch-sup-{}-{}-{}", std::process::id(), n, name));
		let _ = std::fs::create_dir_all(&dir);
		dir
	}

	fn supervisor(dir: &Path, scripts: &[(&str, &str)], policy: RestartPolicy) -> Supervisor {
		let resolver = Resolver::new(
			dir,
			"logs",
			ScriptDefaults {
				interpreter: "/bin/sh".into(),
				extensions: vec!["sh".into()],
				..ScriptDefaults::default()
			},
		);
		let entries: Vec<RawEntry> = scripts
			.iter()
			.map(|(name, body)| {
				std::fs::write(dir.join(name), body).unwrap();
				RawEntry::from(*name)
			})
			.collect();
		let config = SupervisorConfig {
			log_dir: resolver.log_dir.clone(),
			policy,
			poll_interval: Duration::from_millis(20),
			stop_grace: Duration::from_millis(500),
		};
		Supervisor::new(resolver.resolve_all(&entries), config, Console::silent())
	}

	async fn tick_until(sup: &mut Supervisor, done: impl Fn(&Supervisor) -> bool) {
		for _ in 0..250 {
			if done(&*sup) {
				return;
			}
			tokio::time::sleep(Duration::from_millis(20)).await;
			sup.tick();
		}
		panic!("condition not reached");
	}

	#[tokio::test]
	async fn stopped_slot_is_never_restarted() {
		let dir = temp_dir("stop-requested");
		let policy = RestartPolicy::new(true, RestartLimit::Unlimited);
		let mut sup = supervisor(&dir, &[("quick.sh", "sleep 0.2\nexit 1\n")], policy);
		sup.start_all();

		// stop() on a live slot sets the flag; the slot must stay terminal
		sup.slots[0].stop(Duration::from_millis(500)).await;
		for _ in 0..10 {
			sup.tick();
		}
		assert_eq!(sup.slots[0].restarts(), 0);
		assert!(sup.slots[0].state().is_terminal());
		assert!(sup.all_terminal());

		let _ = std::fs::remove_dir_all(&dir);
	}

	#[tokio::test]
	async fn restart_disabled_exits_once() {
		let dir = temp_dir("no-restart");
		let policy = RestartPolicy::new(false, RestartLimit::Capped(5));
		let mut sup = supervisor(&dir, &[("fail.sh", "exit 1\n")], policy);
		let mut events = sup.subscribe();
		sup.start_all();

		tick_until(&mut sup, Supervisor::all_terminal).await;
		assert_eq!(sup.slots[0].restarts(), 0);
		assert_eq!(sup.slots[0].state(), SlotState::Stopped);

		let mut gave_up = false;
		while let Ok(ev) = events.try_recv() {
			assert!(!matches!(ev, SupervisorEvent::Restarting { .. }));
			gave_up |= matches!(ev, SupervisorEvent::GaveUp { restarts: 0, .. });
		}
		assert!(gave_up);

		let _ = std::fs::remove_dir_all(&dir);
	}

	#[tokio::test]
	async fn missing_script_is_skipped() {
		let dir = temp_dir("skip");
		let mut sup = supervisor(&dir, &[], RestartPolicy::never());
		let spec = Resolver::new(&dir, "logs", ScriptDefaults::default()).resolve(0, &RawEntry::from("ghost.py"));
		sup.slots.push(ProcessController::new(spec));

		let summary = sup.run(std::future::pending::<()>()).await;
		assert_eq!(summary.outcome, RunOutcome::Completed);
		assert_eq!(summary.slots[0].state, SlotState::Skipped);

		let _ = std::fs::remove_dir_all(&dir);
	}
}
