use clap::{Args, Parser, Subcommand};
use owo_colors::OwoColorize;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use relaunch::config::{Config, DEFAULT_CONFIG_FILE};
use relaunch::{Console, ProcessSpec, Resolver, RunOutcome, Supervisor};

#[derive(Debug, Parser)]
#[command(name = "relaunch", version, about = "Launch, log, and restart a set of processes")]
struct Cli {
	#[command(subcommand)]
	command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
	/// Run every configured process until all finish or Ctrl-C
	Run {
		#[command(flatten)]
		config: ConfigArgs,
		/// Print process output without colored prefixes
		#[arg(long)]
		no_color: bool,
		/// Only write process output to log files
		#[arg(short, long)]
		quiet: bool,
	},
	/// Resolve and verify the configured processes without starting them
	Check {
		#[command(flatten)]
		config: ConfigArgs,
		/// Print the resolved entries as JSON
		#[arg(long)]
		json: bool,
	},
}

#[derive(Debug, Args)]
struct ConfigArgs {
	/// Path to the config file
	#[arg(short, long, env = "RELAUNCH_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
	config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
	let cli = Cli::parse();

	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
		.with_writer(std::io::stderr)
		.init();

	match cli.command {
		Command::Run {
			config,
			no_color,
			quiet,
		} => cmd_run(&config.config, no_color, quiet).await,
		Command::Check { config, json } => cmd_check(&config.config, json),
	}
}

fn load(path: &Path) -> Option<(Config, PathBuf)> {
	let config = match Config::load(path) {
		Ok(c) => c,
		Err(e) => {
			eprintln!("error: {}", e);
			return None;
		}
	};
	match std::env::current_dir() {
		Ok(dir) => Some((config, dir)),
		Err(e) => {
			eprintln!("error: cannot determine working directory: {}", e);
			None
		}
	}
}

async fn cmd_run(path: &Path, no_color: bool, quiet: bool) -> ExitCode {
	let Some((config, base_dir)) = load(path) else {
		return ExitCode::FAILURE;
	};

	let console = if quiet {
		Console::silent()
	} else if no_color {
		Console::new(true, false)
	} else {
		Console::stdout()
	};

	let supervisor = Supervisor::from_config(&config, &base_dir, console);
	tracing::info!(
		processes = config.processes.len(),
		restart_on_failure = config.restart_on_failure,
		max_restarts = %config.max_restarts,
		"supervisor starting"
	);

	let summary = supervisor
		.run(async {
			if let Err(e) = tokio::signal::ctrl_c().await {
				tracing::error!(error = %e, "failed to listen for Ctrl-C");
				std::future::pending::<()>().await;
			}
		})
		.await;

	if summary.outcome == RunOutcome::Shutdown {
		tracing::info!("all processes stopped");
	}
	ExitCode::SUCCESS
}

#[derive(Serialize)]
struct CheckedEntry<'a> {
	#[serde(flatten)]
	spec: &'a ProcessSpec,
	ok: bool,
	error: Option<String>,
}

fn cmd_check(path: &Path, json: bool) -> ExitCode {
	let Some((config, base_dir)) = load(path) else {
		return ExitCode::FAILURE;
	};

	let resolver = Resolver::from_config(&config, &base_dir);
	let specs = resolver.resolve_all(&config.processes);
	let checked: Vec<CheckedEntry> = specs
		.iter()
		.map(|spec| {
			let error = spec.verify().err().map(|e| e.to_string());
			CheckedEntry {
				spec,
				ok: error.is_none(),
				error,
			}
		})
		.collect();
	let all_ok = checked.iter().all(|c| c.ok);

	if json {
		match serde_json::to_string_pretty(&checked) {
			Ok(out) => println!("{}", out),
			Err(e) => {
				eprintln!("error: {}", e);
				return ExitCode::FAILURE;
			}
		}
	} else {
		println!(
			"{} {} (restart_on_failure={}, max_restarts={})",
			"logs".dimmed(),
			resolver.log_dir.display(),
			config.restart_on_failure,
			config.max_restarts
		);
		for entry in &checked {
			let dot = if entry.ok { "●".green().to_string() } else { "●".red().to_string() };
			println!(" {} {}", dot, entry.spec.name.bold());
			println!("     {} {}", "run".dimmed(), entry.spec.command_line());
			println!("     {} {}", "cwd".dimmed(), entry.spec.working_dir.display());
			println!("     {} {}", "log".dimmed(), entry.spec.log_file.display());
			if let Some(ref err) = entry.error {
				println!("     {}", err.red());
			}
		}
	}

	if all_ok {
		ExitCode::SUCCESS
	} else {
		ExitCode::FAILURE
	}
}
