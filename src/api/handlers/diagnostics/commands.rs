//! Closed set of read-only diagnostics commands.
//!
//! Command names map onto [`DiagnosticCommand`] by exact string comparison.
//! Adding a command means adding a variant; nothing here interprets caller
//! input beyond that lookup.

use serde::Serialize;
use serde_json::{json, Value};
use std::{
    fmt,
    time::{Duration, Instant},
};
use sysinfo::System;
use thiserror::Error;

const BYTES_PER_MB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticCommand {
    SystemInfo,
    MemoryUsage,
    Uptime,
    ProcessInfo,
    Version,
    HostInfo,
}

impl DiagnosticCommand {
    pub const ALL: [Self; 6] = [
        Self::SystemInfo,
        Self::MemoryUsage,
        Self::Uptime,
        Self::ProcessInfo,
        Self::Version,
        Self::HostInfo,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::SystemInfo => "systemInfo",
            Self::MemoryUsage => "memoryUsage",
            Self::Uptime => "uptime",
            Self::ProcessInfo => "processInfo",
            Self::Version => "version",
            Self::HostInfo => "hostInfo",
        }
    }

    /// Exact, case-sensitive lookup.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|command| command.name() == name)
    }

    #[must_use]
    pub fn allowed_names() -> Vec<&'static str> {
        Self::ALL.iter().map(|command| command.name()).collect()
    }
}

impl fmt::Display for DiagnosticCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiagnosticsError {
    #[error("Invalid command")]
    InvalidCommand { allowed: Vec<&'static str> },
}

impl DiagnosticsError {
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::InvalidCommand { allowed } => {
                format!(
                    "Command is not allowed. Allowed commands: {}",
                    allowed.join(", ")
                )
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandOutput {
    pub command: DiagnosticCommand,
    pub result: Value,
}

impl Serialize for DiagnosticCommand {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// Runs diagnostics commands against the current host and process.
#[derive(Debug)]
pub struct Diagnostics {
    started_at: Instant,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl Diagnostics {
    /// Uptime is measured from process start, not from construction.
    #[must_use]
    pub fn new() -> Self {
        Self::starting_at(process_started_at())
    }

    #[must_use]
    pub fn starting_at(started_at: Instant) -> Self {
        Self { started_at }
    }

    /// Look up `name` in the allowlist and run the matching command.
    ///
    /// # Errors
    /// Returns `DiagnosticsError::InvalidCommand` for any name outside the
    /// allowlist.
    pub fn execute(&self, name: &str) -> Result<CommandOutput, DiagnosticsError> {
        let command = DiagnosticCommand::parse(name).ok_or_else(|| {
            DiagnosticsError::InvalidCommand {
                allowed: DiagnosticCommand::allowed_names(),
            }
        })?;
        Ok(CommandOutput {
            command,
            result: self.run(command),
        })
    }

    #[must_use]
    pub fn run(&self, command: DiagnosticCommand) -> Value {
        match command {
            DiagnosticCommand::SystemInfo => self.system_info(),
            DiagnosticCommand::MemoryUsage => memory_usage(),
            DiagnosticCommand::Uptime => self.uptime(),
            DiagnosticCommand::ProcessInfo => process_info(),
            DiagnosticCommand::Version => version(),
            DiagnosticCommand::HostInfo => host_info(),
        }
    }

    fn uptime_seconds(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }

    fn system_info(&self) -> Value {
        json!({
            "platform": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
            "uptime": self.uptime_seconds(),
        })
    }

    fn uptime(&self) -> Value {
        json!({
            "seconds": self.uptime_seconds(),
            "formatted": format_uptime(self.started_at.elapsed().as_secs()),
        })
    }
}

/// Process start as an `Instant`, derived from the OS-reported run time.
/// Falls back to now when the process table is unavailable.
fn process_started_at() -> Instant {
    let now = Instant::now();
    let run_time = sysinfo::get_current_pid().ok().and_then(|pid| {
        let mut system = System::new();
        system.refresh_process(pid);
        system.process(pid).map(sysinfo::Process::run_time)
    });
    run_time
        .and_then(|seconds| now.checked_sub(Duration::from_secs(seconds)))
        .unwrap_or(now)
}

fn memory_usage() -> Value {
    let mut system = System::new();
    system.refresh_memory();

    let process = sysinfo::get_current_pid().ok().and_then(|pid| {
        system.refresh_process(pid);
        system
            .process(pid)
            .map(|process| (process.memory(), process.virtual_memory()))
    });

    json!({
        "rss": process.map(|(rss, _)| format_mb(rss)),
        "virtual": process.map(|(_, virt)| format_mb(virt)),
        "systemTotal": format_mb(system.total_memory()),
        "systemUsed": format_mb(system.used_memory()),
        "systemAvailable": format_mb(system.available_memory()),
    })
}

fn process_info() -> Value {
    json!({
        "pid": std::process::id(),
        "platform": std::env::consts::OS,
        "rustVersion": crate::built_info::RUSTC_VERSION,
    })
}

fn version() -> Value {
    json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "commit": crate::GIT_COMMIT_HASH,
        "rust": crate::built_info::RUSTC_VERSION,
        "platform": std::env::consts::OS,
    })
}

fn host_info() -> Value {
    let load = System::load_average();
    json!({
        "hostname": System::host_name(),
        "cpus": std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get),
        "loadAverage": [load.one, load.five, load.fifteen],
        "systemUptime": System::uptime(),
    })
}

/// Rounded megabytes, e.g. `"12 MB"`.
fn format_mb(bytes: u64) -> String {
    format!("{} MB", (bytes + BYTES_PER_MB / 2) / BYTES_PER_MB)
}

/// Compact duration such as `"1d 2h 3m 4s"`; zero components are omitted.
fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;
    let secs = seconds % 60;

    let parts: Vec<String> = [(days, "d"), (hours, "h"), (minutes, "m"), (secs, "s")]
        .into_iter()
        .filter(|(value, _)| *value > 0)
        .map(|(value, unit)| format!("{value}{unit}"))
        .collect();

    if parts.is_empty() {
        "0s".to_string()
    } else {
        parts.join(" ")
    }
}
