//! # relaunch
//!
//! Launch a fixed set of programs, tee their output to per-process log
//! files and a shared console, and restart them when they exit.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use relaunch::{Config, Console, Supervisor};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let config = Config::from_toml(
//! 	r#"
//! 	max_restarts = 2
//! 	processes = ["worker.py", { command = "./bin/server --port 8080" }]
//! 	"#,
//! 	"relaunch.toml".as_ref(),
//! )
//! .unwrap();
//!
//! let base_dir = std::env::current_dir().unwrap();
//! let sup = Supervisor::from_config(&config, &base_dir, Console::stdout());
//! let summary = sup
//! 	.run(async {
//! 		let _ = tokio::signal::ctrl_c().await;
//! 	})
//! 	.await;
//! println!("{:?}", summary.outcome);
//! # }
//! ```

pub mod config;
pub mod console;
pub mod controller;
pub mod descriptor;
pub mod error;
pub mod logs;
pub mod policy;
pub mod relay;
pub mod supervisor;
pub mod types;

pub use config::{Config, RawEntry};
pub use console::Console;
pub use controller::ProcessController;
pub use descriptor::{ProcessSpec, Resolver};
pub use policy::{RestartLimit, RestartPolicy};
pub use supervisor::{Supervisor, SupervisorConfig};
pub use types::*;
