#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use toml::{Table, Value};

use autopatcher::config::{ConfigProvider, JobSpec};

/// A throwaway editor installation on disk.
///
/// Layout under the temp dir:
///
/// ```text
/// editor/                 editor executable lives here
/// editor/Edit Scripts/    staged scripts
/// editor/Edit Scripts/Output/
/// scripts/                our job scripts (+ optional lib/)
/// data/Fallout4.esm       game data marker
/// output/                 canonical output dir
/// ```
pub struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create sandbox dir");
        let sandbox = Self { dir };
        for sub in [
            sandbox.edit_scripts_dir(),
            sandbox.editor_output_dir(),
            sandbox.scripts_dir(),
            sandbox.data_dir(),
            sandbox.output_dir(),
        ] {
            fs::create_dir_all(&sub).expect("create sandbox subdir");
        }
        fs::write(sandbox.data_dir().join("Fallout4.esm"), b"TES4").expect("write esm");
        sandbox
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn editor_dir(&self) -> PathBuf {
        self.root().join("editor")
    }

    pub fn edit_scripts_dir(&self) -> PathBuf {
        self.editor_dir().join("Edit Scripts")
    }

    pub fn editor_output_dir(&self) -> PathBuf {
        self.edit_scripts_dir().join("Output")
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.root().join("scripts")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root().join("data")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root().join("output")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.output_dir().join("logs")
    }

    /// Path the editor executable is configured at (may not exist).
    pub fn editor_executable(&self) -> PathBuf {
        self.editor_dir().join("FakeEdit.sh")
    }

    pub fn write_script(&self, file_name: &str, contents: &str) -> PathBuf {
        let path = self.scripts_dir().join(file_name);
        fs::write(&path, contents).expect("write job script");
        path
    }

    /// Put a file into `scripts/lib/`.
    pub fn write_library_file(&self, file_name: &str, contents: &str) -> PathBuf {
        let dir = self.scripts_dir().join("lib");
        fs::create_dir_all(&dir).expect("create lib dir");
        let path = dir.join(file_name);
        fs::write(&path, contents).expect("write lib file");
        path
    }

    /// Files currently in the editor's script directory (names only).
    pub fn edit_scripts_entries(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.edit_scripts_dir())
            .expect("read Edit Scripts")
            .map(|e| e.expect("dir entry").file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    /// Install an executable shell script as the editor.
    ///
    /// The preamble parses `-L:<log>` into `$LOG` and sets `$OUT` to the
    /// editor output dir; `body` runs after it.
    #[cfg(unix)]
    pub fn install_fake_editor(&self, body: &str) -> PathBuf {
        let path = self.editor_executable();
        write_executable(&path, &fake_editor_script(&self.editor_output_dir(), body));
        path
    }

    /// Install an executable shell script at an arbitrary path.
    #[cfg(unix)]
    pub fn install_executable(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create executable dir");
        }
        write_executable(&path, contents);
        path
    }
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new()
    }
}

/// Shell preamble shared by fake editors and launchers.
pub fn fake_editor_script(output_dir: &Path, body: &str) -> String {
    format!(
        "#!/bin/sh\n\
         LOG=\"\"\n\
         for a in \"$@\"; do\n\
         \x20 case \"$a\" in\n\
         \x20   -L:*) LOG=\"${{a#-L:}}\" ;;\n\
         \x20 esac\n\
         done\n\
         OUT='{}'\n\
         {}\n",
        output_dir.display(),
        body
    )
}

#[cfg(unix)]
fn write_executable(path: &Path, contents: &str) {
    use std::os::unix::fs::PermissionsExt;

    fs::write(path, contents).expect("write executable");
    let mut perms = fs::metadata(path).expect("stat executable").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).expect("chmod executable");
}

/// Builds `autopatcher.toml` contents for a sandbox.
pub struct ConfigBuilder {
    paths: Table,
    environment: Table,
    parameters: Table,
    scripts: Table,
    jobs: Option<Vec<JobSpec>>,
    extra: String,
}

impl ConfigBuilder {
    /// Required paths pointing into the sandbox, fast timeouts.
    pub fn for_sandbox(sandbox: &Sandbox) -> Self {
        let mut builder = Self {
            paths: Table::new(),
            environment: Table::new(),
            parameters: Table::new(),
            scripts: Table::new(),
            jobs: None,
            extra: String::new(),
        };
        builder = builder
            .path("editor_executable", &sandbox.editor_executable())
            .path("scripts_dir", &sandbox.scripts_dir())
            .path("game_data_path", &sandbox.data_dir())
            .path("output_dir", &sandbox.output_dir())
            .param("execution_timeout_secs", 10_i64)
            .param("verification_timeout_secs", 1_i64)
            .param("poll_interval_ms", 50_i64);
        builder
    }

    pub fn path(mut self, key: &str, value: &Path) -> Self {
        self.paths
            .insert(key.to_string(), Value::String(value.display().to_string()));
        self
    }

    pub fn env(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.environment.insert(key.to_string(), value.into());
        self
    }

    pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.to_string(), value.into());
        self
    }

    pub fn script(mut self, key: &str, file_name: &str) -> Self {
        self.scripts
            .insert(key.to_string(), Value::String(file_name.to_string()));
        self
    }

    pub fn job(mut self, job: JobSpec) -> Self {
        self.jobs.get_or_insert_with(Vec::new).push(job);
        self
    }

    /// Raw TOML appended verbatim (e.g. `[[Verification.fallback]]`).
    pub fn raw(mut self, toml: &str) -> Self {
        self.extra.push_str(toml);
        self.extra.push('\n');
        self
    }

    pub fn to_toml(&self) -> String {
        let mut root = Table::new();
        root.insert("Paths".into(), Value::Table(self.paths.clone()));
        root.insert("Environment".into(), Value::Table(self.environment.clone()));
        root.insert("Parameters".into(), Value::Table(self.parameters.clone()));
        root.insert("Scripts".into(), Value::Table(self.scripts.clone()));
        if let Some(jobs) = &self.jobs {
            let rows = jobs
                .iter()
                .map(|job| {
                    let mut t = Table::new();
                    t.insert("script_key".into(), Value::String(job.script_key.clone()));
                    t.insert(
                        "success_marker".into(),
                        Value::String(job.success_marker.clone()),
                    );
                    t.insert(
                        "expected_outputs".into(),
                        Value::Array(
                            job.expected_outputs
                                .iter()
                                .cloned()
                                .map(Value::String)
                                .collect(),
                        ),
                    );
                    Value::Table(t)
                })
                .collect();
            root.insert("Jobs".into(), Value::Array(rows));
        }
        let mut text = toml::to_string(&root).expect("serialize config");
        text.push('\n');
        text.push_str(&self.extra);
        text
    }

    /// Write `autopatcher.toml` into the sandbox root and return its path.
    pub fn write(&self, sandbox: &Sandbox) -> PathBuf {
        let path = sandbox.root().join("autopatcher.toml");
        fs::write(&path, self.to_toml()).expect("write config");
        path
    }

    /// Parse into a provider anchored at the sandbox root.
    pub fn provider(&self, sandbox: &Sandbox) -> ConfigProvider {
        ConfigProvider::from_toml_str(sandbox.root().join("autopatcher.toml"), &self.to_toml())
            .expect("parse config")
    }
}
