// src/types.rs

use std::str::FromStr;

use serde::Deserialize;

/// Shape of the shortcut URI handed to the intermediary launcher.
///
/// - `NoColon`: `scheme://<entry>`
/// - `WithColon`: `scheme://:<entry>`
/// - `Instance`: `scheme://<instance>/<entry>`
/// - `Auto`: pick one from the rest of the settings (never probes at runtime).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShortcutFormat {
    #[default]
    Auto,
    NoColon,
    WithColon,
    Instance,
}

impl FromStr for ShortcutFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "" | "auto" => Ok(ShortcutFormat::Auto),
            "no_colon" => Ok(ShortcutFormat::NoColon),
            "with_colon" => Ok(ShortcutFormat::WithColon),
            "instance" => Ok(ShortcutFormat::Instance),
            other => Err(format!(
                "invalid shortcut_format: {other} (expected \"auto\", \"no_colon\", \"with_colon\" or \"instance\")"
            )),
        }
    }
}

/// How a job's target process ended, as far as we could observe it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    /// Direct child with a real exit code.
    Code(i32),
    /// Direct child ended without an exit code (killed by a signal).
    Terminated,
    /// Discovered (non-child) process disappeared from the process table.
    /// Its exit code is not observable.
    Detached,
}

impl ProcessExit {
    pub fn code(&self) -> Option<i32> {
        match self {
            ProcessExit::Code(c) => Some(*c),
            _ => None,
        }
    }
}

/// Which of the two wait failures fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    /// Indirect discovery never found a matching process.
    NeverAppeared,
    /// The process was found (or spawned) but did not exit in time.
    NeverExited,
}

/// Result of waiting on a target process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Exited(ProcessExit),
    TimedOut(TimeoutKind),
}
