#![cfg(unix)]

use std::error::Error;
use std::fs;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use autopatcher::config::{ConfigProvider, JobSpec};
use autopatcher::fs::RealFileSystem;
use autopatcher::job::{JobRunner, JobState};
use autopatcher_test_utils::builders::{fake_editor_script, ConfigBuilder, Sandbox};
use autopatcher_test_utils::fakes::{process, FakeProcessTable};
use autopatcher_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

const MARKER: &str = "[AutoPatcher] Extraction finished.";

fn extract_job(outputs: &[&str]) -> JobSpec {
    JobSpec::new("extract", MARKER, outputs)
}

fn direct_config(sandbox: &Sandbox) -> ConfigBuilder {
    sandbox.write_script("Extract.pas", "begin end.");
    ConfigBuilder::for_sandbox(sandbox).script("extract", "Extract.pas")
}

fn build_runner(cfg: &ConfigProvider, table: &FakeProcessTable) -> Result<JobRunner, Box<dyn Error>> {
    Ok(JobRunner::from_config(
        cfg,
        Arc::new(RealFileSystem),
        table.boxed(),
    )?)
}

fn read(path: std::path::PathBuf) -> String {
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("reading {}: {e}", path.display()))
}

#[tokio::test]
async fn direct_success_collects_outputs_and_cleans_up() -> TestResult {
    init_tracing();
    let sandbox = Sandbox::new();
    sandbox.write_library_file("AutoPatcherLib.pas", "library");
    sandbox.install_fake_editor(&format!(
        "echo 'loading plugins'\n\
         echo '{MARKER}' >> \"$LOG\"\n\
         echo '[]' > \"$OUT/weapon_ammo_map.json\"\n\
         echo 'ammo' > \"$OUT/unique_ammo_for_mapping.ini\"\n\
         exit 0"
    ));
    let cfg = direct_config(&sandbox).provider(&sandbox);
    let mut runner = build_runner(&cfg, &FakeProcessTable::empty())?;

    let job = extract_job(&["weapon_ammo_map.json", "unique_ammo_for_mapping.ini"]);
    assert!(with_timeout(runner.run(&job)).await);

    assert_eq!(
        runner.history(),
        [
            JobState::Idle,
            JobState::Preparing,
            JobState::Executing,
            JobState::Verifying,
            JobState::Collecting,
            JobState::Cleaning,
            JobState::Succeeded,
        ]
    );
    assert_eq!(read(sandbox.output_dir().join("weapon_ammo_map.json")), "[]\n");
    assert_eq!(read(sandbox.output_dir().join("unique_ammo_for_mapping.ini")), "ammo\n");

    // Staged script and library are gone again.
    assert_eq!(sandbox.edit_scripts_entries(), vec!["Output"]);
    assert!(!sandbox.editor_dir().join("lib").exists());

    // Session log and captured stdout stay behind for diagnosis.
    let logs: Vec<String> = fs::read_dir(sandbox.logs_dir())?
        .map(|e| e.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect::<Result<_, _>>()?;
    assert!(logs.iter().any(|n| n.ends_with(".stdout.log")), "{logs:?}");
    assert!(
        logs.iter().any(|n| n.starts_with("Extract_") && !n.ends_with(".stdout.log")),
        "{logs:?}"
    );
    Ok(())
}

#[tokio::test]
async fn artifact_presence_is_enough_when_collection_completes() -> TestResult {
    init_tracing();
    let sandbox = Sandbox::new();
    sandbox.install_fake_editor("echo '{}' > \"$OUT/leveled_lists.json\"\nexit 0");
    let cfg = direct_config(&sandbox).provider(&sandbox);
    let mut runner = build_runner(&cfg, &FakeProcessTable::empty())?;

    assert!(with_timeout(runner.run(&extract_job(&["leveled_lists.json"]))).await);
    assert!(sandbox.output_dir().join("leveled_lists.json").is_file());
    Ok(())
}

#[tokio::test]
async fn tentative_success_with_missing_outputs_fails() -> TestResult {
    init_tracing();
    let sandbox = Sandbox::new();
    sandbox.install_fake_editor("echo '{}' > \"$OUT/a.json\"\nexit 0");
    let cfg = direct_config(&sandbox).provider(&sandbox);
    let mut runner = build_runner(&cfg, &FakeProcessTable::empty())?;

    assert!(!with_timeout(runner.run(&extract_job(&["a.json", "b.json"]))).await);
    assert_eq!(runner.state(), JobState::Failed);
    // Partial results are kept.
    assert!(sandbox.output_dir().join("a.json").is_file());
    Ok(())
}

#[tokio::test]
async fn nonzero_exit_fails_even_with_marker() -> TestResult {
    init_tracing();
    let sandbox = Sandbox::new();
    sandbox.install_fake_editor(&format!(
        "echo '{MARKER}' >> \"$LOG\"\necho '[]' > \"$OUT/a.json\"\nexit 3"
    ));
    let cfg = direct_config(&sandbox).provider(&sandbox);
    let mut runner = build_runner(&cfg, &FakeProcessTable::empty())?;

    assert!(!with_timeout(runner.run(&extract_job(&["a.json"]))).await);
    assert!(!runner.history().contains(&JobState::Collecting));
    assert!(!sandbox.output_dir().join("a.json").exists());
    assert_eq!(sandbox.edit_scripts_entries(), vec!["Output"]);
    Ok(())
}

#[tokio::test]
async fn marker_success_tolerates_missing_outputs_unless_strict() -> TestResult {
    init_tracing();
    let sandbox = Sandbox::new();
    sandbox.install_fake_editor(&format!("echo '{MARKER}' >> \"$LOG\"\nexit 0"));
    let job = extract_job(&["never_written.json"]);

    let lenient = direct_config(&sandbox).provider(&sandbox);
    let mut runner_a = build_runner(&lenient, &FakeProcessTable::empty())?;
    assert!(with_timeout(runner_a.run(&job)).await);

    let strict = direct_config(&sandbox)
        .param("strict_collection", true)
        .provider(&sandbox);
    let mut runner_b = build_runner(&strict, &FakeProcessTable::empty())?;
    assert!(!with_timeout(runner_b.run(&job)).await);
    Ok(())
}

#[tokio::test]
async fn hung_editor_is_killed_after_the_budget() -> TestResult {
    init_tracing();
    let sandbox = Sandbox::new();
    sandbox.install_fake_editor("exec sleep 30");
    let cfg = direct_config(&sandbox)
        .param("execution_timeout_secs", 1_i64)
        .provider(&sandbox);
    let mut runner = build_runner(&cfg, &FakeProcessTable::empty())?;

    let started = Instant::now();
    assert!(!with_timeout(runner.run(&extract_job(&["a.json"]))).await);
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(runner.state(), JobState::Failed);
    // Timeout still passes through salvage collection and cleanup.
    assert!(runner.history().contains(&JobState::Collecting));
    assert!(runner.history().contains(&JobState::Cleaning));
    assert_eq!(sandbox.edit_scripts_entries(), vec!["Output"]);
    Ok(())
}

#[tokio::test]
async fn missing_game_data_fails_before_staging() -> TestResult {
    init_tracing();
    let sandbox = Sandbox::new();
    sandbox.install_fake_editor("exit 0");
    fs::remove_file(sandbox.data_dir().join("Fallout4.esm"))?;
    let cfg = direct_config(&sandbox).provider(&sandbox);
    let mut runner = build_runner(&cfg, &FakeProcessTable::empty())?;

    assert!(!with_timeout(runner.run(&extract_job(&[]))).await);
    assert_eq!(
        runner.history(),
        [
            JobState::Idle,
            JobState::Preparing,
            JobState::Cleaning,
            JobState::Failed,
        ]
    );
    assert_eq!(sandbox.edit_scripts_entries(), vec!["Output"]);
    Ok(())
}

#[tokio::test]
async fn launch_failure_restores_a_preinstalled_library() -> TestResult {
    init_tracing();
    let sandbox = Sandbox::new();
    sandbox.write_library_file("AutoPatcherLib.pas", "fresh library");
    let destinations = [
        sandbox.edit_scripts_dir().join("lib"),
        sandbox.editor_dir().join("lib"),
    ];
    for dest in &destinations {
        fs::create_dir_all(dest)?;
        fs::write(dest.join("UserLib.pas"), "user library")?;
    }
    // No editor installed: spawning fails after staging.
    assert!(!sandbox.editor_executable().exists());
    let cfg = direct_config(&sandbox).provider(&sandbox);
    let mut runner = build_runner(&cfg, &FakeProcessTable::empty())?;

    assert!(!with_timeout(runner.run(&extract_job(&[]))).await);

    let history = runner.history();
    assert!(history.contains(&JobState::Executing), "{history:?}");
    assert_eq!(history.last(), Some(&JobState::Failed));

    assert_eq!(sandbox.edit_scripts_entries(), vec!["Output", "lib"]);
    for dest in &destinations {
        assert_eq!(read(dest.join("UserLib.pas")), "user library");
        assert!(!dest.join("AutoPatcherLib.pas").exists());
    }
    for dir in [sandbox.editor_dir(), sandbox.edit_scripts_dir()] {
        let leftovers: Vec<String> = fs::read_dir(&dir)?
            .map(|e| e.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .filter(|name| name.contains(".backup_"))
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?} left in {}", dir.display());
    }
    Ok(())
}

#[tokio::test]
async fn unknown_script_key_fails_immediately() -> TestResult {
    init_tracing();
    let sandbox = Sandbox::new();
    let cfg = direct_config(&sandbox).provider(&sandbox);
    let mut runner = build_runner(&cfg, &FakeProcessTable::empty())?;

    assert!(!runner.run(&JobSpec::new("nope", MARKER, &[])).await);
    assert_eq!(runner.history(), [JobState::Idle, JobState::Failed]);
    Ok(())
}

#[test]
fn plan_builds_the_direct_command_without_staging() -> TestResult {
    let sandbox = Sandbox::new();
    let cfg = direct_config(&sandbox).provider(&sandbox);
    let runner = build_runner(&cfg, &FakeProcessTable::empty())?;

    let cmd = runner.plan(&extract_job(&[]))?;
    assert_eq!(cmd.program, sandbox.editor_executable());
    let script_arg = cmd
        .args
        .iter()
        .find(|a| a.starts_with("-script:"))
        .ok_or("no -script: argument")?;
    assert!(script_arg.contains(&sandbox.edit_scripts_dir().display().to_string()));
    assert!(cmd.args.iter().all(|a| a != "-cache"));
    assert_eq!(sandbox.edit_scripts_entries(), vec!["Output"]);
    Ok(())
}

fn launcher_config(sandbox: &Sandbox, launcher_body: &str) -> ConfigBuilder {
    let launcher = sandbox.install_executable(
        "mo2/ModOrganizer.sh",
        &fake_editor_script(&sandbox.editor_output_dir(), launcher_body),
    );
    direct_config(sandbox)
        .env("use_intermediary", true)
        .env("intermediary_executable", launcher.display().to_string())
        .env("entry_name", "FakeEdit")
        .env("profile_name", "Default")
}

#[tokio::test]
async fn launcher_started_editor_is_discovered_and_verified() -> TestResult {
    init_tracing();
    let sandbox = Sandbox::new();
    // The launcher plays the editor's part: it writes the log and outputs.
    let cfg = launcher_config(
        &sandbox,
        &format!("echo '{MARKER}' >> \"$LOG\"\necho '[]' > \"$OUT/a.json\"\nexit 0"),
    )
    .provider(&sandbox);

    let table = FakeProcessTable::new();
    let editor_start = SystemTime::now() + Duration::from_secs(2);
    table.push_snapshot(Ok(vec![
        process(1, "init", SystemTime::UNIX_EPOCH),
        process(4242, "FakeEdit.sh", editor_start),
    ]));
    table.keep_alive(4242, 10);
    let mut runner = build_runner(&cfg, &table)?;

    assert!(with_timeout(runner.run(&extract_job(&["a.json"]))).await);
    assert!(table.snapshot_calls() >= 1);
    assert!(table.killed().is_empty(), "an exited editor is not killed");
    assert!(sandbox.output_dir().join("a.json").is_file());
    assert_eq!(sandbox.edit_scripts_entries(), vec!["Output"]);
    Ok(())
}

#[tokio::test]
async fn launcher_editor_that_never_appears_times_out() -> TestResult {
    init_tracing();
    let sandbox = Sandbox::new();
    let cfg = launcher_config(&sandbox, "exit 0")
        .param("execution_timeout_secs", 1_i64)
        .provider(&sandbox);
    let table = FakeProcessTable::empty();
    let mut runner = build_runner(&cfg, &table)?;

    assert!(!with_timeout(runner.run(&extract_job(&["a.json"]))).await);
    assert!(table.snapshot_calls() >= 2);
    assert!(table.killed().is_empty(), "nothing was found, nothing to kill");
    assert_eq!(sandbox.edit_scripts_entries(), vec!["Output"]);
    Ok(())
}

#[tokio::test]
async fn lingering_discovered_editor_is_killed_in_cleanup() -> TestResult {
    init_tracing();
    let sandbox = Sandbox::new();
    let cfg = launcher_config(&sandbox, "exit 0")
        .param("execution_timeout_secs", 1_i64)
        .provider(&sandbox);
    let table = FakeProcessTable::new();
    table.push_snapshot(Ok(vec![process(
        99,
        "FakeEdit.sh",
        SystemTime::now() + Duration::from_secs(2),
    )]));
    table.keep_alive(99, usize::MAX);
    let mut runner = build_runner(&cfg, &table)?;

    assert!(!with_timeout(runner.run(&extract_job(&[]))).await);
    assert_eq!(table.killed(), vec![99]);
    Ok(())
}
