//! taskgate engine - OS-facing enforcement for focus sessions
//!
//! This crate provides the runtime half of taskgate:
//! - `platform` - the `ProcessControl` seam over the operating system
//! - `scanner` - snapshot of running processes
//! - `terminator` - graceful-then-forced process termination
//! - `poller` - background scan/match/terminate loop
//! - `controller` - actor owning the focus session, unlock evaluator, and poller
//! - `config` - TOML configuration
//! - `tasks` - task snapshot file reading
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      taskgate engine                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │ControllerHandle │────▶│     ControllerActor         │   │
//! │  │   (clonable)    │     │ (focus + unlock state owner)│   │
//! │  └─────────────────┘     └──────────────┬──────────────┘   │
//! │                                         │ start / stop      │
//! │                                         ▼                   │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │ ProcessScanner  │◀────│     RestrictionPoller       │   │
//! │  │ProcessTerminator│     │  (cancellable tokio task)   │   │
//! │  └────────┬────────┘     └─────────────────────────────┘   │
//! │           ▼                                                 │
//! │     ProcessControl (sysinfo / libc)                         │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod config;
pub mod controller;
pub mod platform;
pub mod poller;
pub mod scanner;
pub mod tasks;
pub mod terminator;

pub use config::{ConfigError, EngineConfig};
pub use controller::{
    spawn_controller, ControllerError, ControllerHandle, ControllerSnapshot, FocusEvent,
};
pub use platform::{ProcessControl, SystemProcessControl};
pub use poller::{PollerConfig, RestrictionPoller};
pub use scanner::ProcessScanner;
pub use tasks::{read_tasks, TaskFileError};
pub use terminator::ProcessTerminator;
