// src/process/command.rs

//! Command-line construction for the editor and the intermediary launcher.
//!
//! Arguments are always kept as an argv vector and handed to the OS without
//! a shell, so paths with spaces need no quoting and no argument ever
//! contains embedded quote characters.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::config::EnvironmentSettings;
use crate::errors::{PatcherError, Result};
use crate::types::ShortcutFormat;

/// Program plus arguments, ready to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Human-readable rendering for logs and `plan` output only.
    pub fn display(&self) -> String {
        let mut out = quote_for_display(&self.program.to_string_lossy());
        for arg in &self.args {
            out.push(' ');
            out.push_str(&quote_for_display(arg));
        }
        out
    }

    /// Build a tokio command with stdio detached from our terminal.
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        cmd
    }
}

fn quote_for_display(s: &str) -> String {
    if s.contains(char::is_whitespace) {
        format!("\"{s}\"")
    } else {
        s.to_string()
    }
}

/// Everything the editor needs on its command line for one job.
#[derive(Debug, Clone)]
pub struct EditorInvocation<'a> {
    /// Value after `-script:`; a full path (direct) or bare file name
    /// (through the launcher).
    pub script_arg: String,
    pub script_dir: &'a Path,
    pub log_path: &'a Path,
    pub game_data_path: &'a Path,
    pub game_variant_flag: Option<&'a str>,
    pub unsafe_edit_flags: &'a [String],
    pub use_cache: bool,
}

/// Editor arguments shared by both launch modes.
///
/// `[<game flag>] -script:<x> -S:<dir> <unsafe flags...> -L:<log> -D:<data> [-cache]`
pub fn editor_args(inv: &EditorInvocation<'_>) -> Vec<String> {
    let mut args = Vec::with_capacity(6 + inv.unsafe_edit_flags.len());
    if let Some(flag) = inv.game_variant_flag.filter(|f| !f.trim().is_empty()) {
        args.push(flag.trim().to_string());
    }
    args.push(format!("-script:{}", inv.script_arg));
    args.push(format!("-S:{}", inv.script_dir.display()));
    args.extend(
        inv.unsafe_edit_flags
            .iter()
            .filter(|f| !f.trim().is_empty())
            .cloned(),
    );
    args.push(format!("-L:{}", inv.log_path.display()));
    args.push(format!("-D:{}", inv.game_data_path.display()));
    if inv.use_cache {
        args.push("-cache".to_string());
    }
    args
}

/// Direct mode: run the editor as our own child.
pub fn direct_command(editor_executable: &Path, inv: &EditorInvocation<'_>) -> CommandLine {
    CommandLine::new(editor_executable, editor_args(inv))
}

/// Resolve the shortcut format actually used.
///
/// `Auto` never probes: it uses the instance form when an instance name is
/// configured and the with-colon form otherwise.
pub fn effective_shortcut_format(env: &EnvironmentSettings) -> ShortcutFormat {
    match env.shortcut_format {
        ShortcutFormat::Auto if env.instance_name.is_some() => ShortcutFormat::Instance,
        ShortcutFormat::Auto => ShortcutFormat::WithColon,
        other => other,
    }
}

/// Build the launcher shortcut URI for the configured entry.
pub fn shortcut_uri(env: &EnvironmentSettings) -> Result<String> {
    let entry = env.entry_name.as_deref().ok_or_else(|| {
        PatcherError::ConfigError(
            "[Environment].entry_name is required when use_intermediary is true".to_string(),
        )
    })?;
    let scheme = env.shortcut_scheme.trim_end_matches("://");

    let uri = match effective_shortcut_format(env) {
        ShortcutFormat::NoColon => format!("{scheme}://{entry}"),
        ShortcutFormat::Instance => {
            let instance = env.instance_name.as_deref().ok_or_else(|| {
                PatcherError::ConfigError(
                    "[Environment].shortcut_format = \"instance\" needs instance_name".to_string(),
                )
            })?;
            format!("{scheme}://{instance}/{entry}")
        }
        ShortcutFormat::WithColon | ShortcutFormat::Auto => format!("{scheme}://:{entry}"),
    };
    Ok(uri)
}

/// Intermediary mode: `<launcher> -p <profile> <uri> -a <editor args...>`.
pub fn intermediary_command(
    env: &EnvironmentSettings,
    editor_arguments: Vec<String>,
) -> Result<CommandLine> {
    let launcher = env.intermediary_executable.as_ref().ok_or_else(|| {
        PatcherError::ConfigError(
            "[Environment].intermediary_executable is not set".to_string(),
        )
    })?;

    let mut args = Vec::with_capacity(4 + editor_arguments.len());
    if let Some(profile) = env.profile_name.as_deref() {
        args.push("-p".to_string());
        args.push(profile.to_string());
    }
    args.push(shortcut_uri(env)?);
    if !editor_arguments.is_empty() {
        args.push("-a".to_string());
        args.extend(editor_arguments);
    }

    Ok(CommandLine::new(launcher, args))
}
