use std::time::{Duration, SystemTime, UNIX_EPOCH};

use autopatcher::process::table::normalize_image_name;
use autopatcher::process::{select_target_process, ProcessTableError, ProcessWaiter};
use autopatcher::types::{ProcessExit, TimeoutKind, WaitOutcome};
use autopatcher_test_utils::fakes::{process, FakeProcessTable};
use autopatcher_test_utils::{init_tracing, with_timeout};

const POLL: Duration = Duration::from_millis(10);
const TOLERANCE: Duration = Duration::from_secs(1);

fn waiter(table: &FakeProcessTable) -> ProcessWaiter {
    ProcessWaiter::new(table.boxed(), POLL, TOLERANCE)
}

#[test]
fn image_names_match_case_insensitively_without_exe() {
    let launched = SystemTime::now();
    let p = process(10, "FO4Edit.EXE", launched);
    assert!(p.matches_image("fo4edit"));
    assert!(p.matches_image("C:\\Tools\\FO4Edit\\FO4Edit.exe"));
    assert!(p.matches_image("/opt/xedit/fo4edit.exe"));
    assert!(!p.matches_image("FO4Edit64.exe"));
    assert!(!p.matches_image(""));

    assert_eq!(normalize_image_name("C:\\A\\B\\xEdit.Exe"), "xedit");
    assert_eq!(normalize_image_name("  SSEEdit  "), "sseedit");
}

#[test]
fn exe_path_counts_when_name_is_truncated() {
    let mut p = process(11, "FO4Edit64-trun", SystemTime::now());
    p.exe = Some("/opt/xedit/FO4Edit64-truncated.exe".into());
    assert!(p.matches_image("FO4Edit64-Truncated.exe"));
}

#[test]
fn selection_respects_tolerance_window() {
    let launched = UNIX_EPOCH + Duration::from_millis(1_000_500);
    let table = vec![
        process(1, "FO4Edit.exe", launched - Duration::from_secs(30)),
        process(2, "FO4Edit.exe", launched - Duration::from_millis(900)),
        process(3, "FO4Edit.exe", launched + Duration::from_secs(2)),
    ];

    // The 30s-old instance predates our launch and is never picked.
    let picked = select_target_process(&table, "FO4Edit.exe", launched, TOLERANCE);
    assert_eq!(picked.map(|p| p.pid), Some(2));

    let strict = select_target_process(&table, "FO4Edit.exe", launched, Duration::ZERO);
    assert_eq!(strict.map(|p| p.pid), Some(3));

    let stale_only = vec![process(1, "FO4Edit.exe", launched - Duration::from_secs(30))];
    assert!(select_target_process(&stale_only, "FO4Edit.exe", launched, TOLERANCE).is_none());
}

#[test]
fn second_granular_start_times_match_a_sub_second_tolerance() {
    // Launched at 10.9s; the editor really started at 10.95s but the OS
    // reports whole seconds.
    let launched = UNIX_EPOCH + Duration::from_millis(10_900);
    let half = Duration::from_millis(500);

    let same_second = vec![process(3, "FO4Edit.exe", UNIX_EPOCH + Duration::from_secs(10))];
    let picked = select_target_process(&same_second, "FO4Edit.exe", launched, half);
    assert_eq!(picked.map(|p| p.pid), Some(3));

    let previous_second = vec![process(2, "FO4Edit.exe", UNIX_EPOCH + Duration::from_secs(9))];
    assert!(select_target_process(&previous_second, "FO4Edit.exe", launched, half).is_none());
}

#[test]
fn earliest_candidate_wins_and_ties_keep_order() {
    let launched = SystemTime::now();
    let at = launched + Duration::from_secs(1);
    let table = vec![
        process(7, "notepad.exe", launched),
        process(8, "fo4edit.exe", at + Duration::from_secs(1)),
        process(9, "FO4Edit.exe", at),
        process(4, "FO4EDIT", at),
    ];

    let picked = select_target_process(&table, "FO4Edit.exe", launched, TOLERANCE);
    assert_eq!(picked.map(|p| p.pid), Some(9));
}

#[tokio::test]
async fn never_appearing_target_times_out() {
    init_tracing();
    let table = FakeProcessTable::empty();
    let mut waiter = waiter(&table);

    let (outcome, found) = with_timeout(waiter.discover_and_wait(
        "FO4Edit.exe",
        SystemTime::now(),
        Duration::from_millis(100),
    ))
    .await;

    assert_eq!(outcome, WaitOutcome::TimedOut(TimeoutKind::NeverAppeared));
    assert!(found.is_none());
    assert!(table.snapshot_calls() >= 2, "should poll more than once");
}

#[tokio::test]
async fn discovered_target_that_exits_is_detached() {
    init_tracing();
    let launched = SystemTime::now();
    let table = FakeProcessTable::new();
    table
        .push_snapshot(Ok(Vec::new()))
        .push_snapshot(Ok(vec![process(4242, "FO4Edit.exe", launched)]));
    table.keep_alive(4242, 3);
    let mut waiter = waiter(&table);

    let (outcome, found) = with_timeout(waiter.discover_and_wait(
        "FO4Edit.exe",
        launched,
        Duration::from_secs(5),
    ))
    .await;

    assert_eq!(outcome, WaitOutcome::Exited(ProcessExit::Detached));
    assert_eq!(found.map(|p| p.pid), Some(4242));
    assert!(table.killed().is_empty(), "waiting never kills");
}

#[tokio::test]
async fn unbounded_budget_still_waits_normally() {
    init_tracing();
    let launched = SystemTime::now();
    let table = FakeProcessTable::new();
    table.push_snapshot(Ok(vec![process(51, "FO4Edit.exe", launched)]));
    table.keep_alive(51, 2);
    let mut waiter = waiter(&table);

    let (outcome, _) =
        with_timeout(waiter.discover_and_wait("FO4Edit.exe", launched, Duration::MAX)).await;

    assert_eq!(outcome, WaitOutcome::Exited(ProcessExit::Detached));
}

#[tokio::test]
async fn discovered_target_that_lingers_never_exits() {
    init_tracing();
    let launched = SystemTime::now();
    let table = FakeProcessTable::new();
    table.push_snapshot(Ok(vec![process(77, "FO4Edit.exe", launched)]));
    table.keep_alive(77, usize::MAX);
    let mut waiter = waiter(&table);

    let (outcome, found) = with_timeout(waiter.discover_and_wait(
        "FO4Edit.exe",
        launched,
        Duration::from_millis(100),
    ))
    .await;

    assert_eq!(outcome, WaitOutcome::TimedOut(TimeoutKind::NeverExited));
    assert_eq!(found.map(|p| p.pid), Some(77));
    assert!(table.killed().is_empty());
}

#[tokio::test]
async fn transient_table_errors_are_retried() {
    init_tracing();
    let launched = SystemTime::now();
    let table = FakeProcessTable::new();
    table
        .push_snapshot(Err(ProcessTableError::PermissionDenied(1)))
        .push_snapshot(Err(ProcessTableError::Vanished(2)))
        .push_snapshot(Ok(vec![process(5, "FO4Edit.exe", launched)]));
    let mut waiter = waiter(&table);

    let (outcome, found) = with_timeout(waiter.discover_and_wait(
        "FO4Edit.exe",
        launched,
        Duration::from_secs(5),
    ))
    .await;

    assert_eq!(found.map(|p| p.pid), Some(5));
    assert_eq!(outcome, WaitOutcome::Exited(ProcessExit::Detached));
    assert_eq!(table.snapshot_calls(), 3);
}

#[tokio::test]
async fn unsupported_table_gives_up_immediately() {
    init_tracing();
    let table = FakeProcessTable::new();
    table.push_snapshot(Err(ProcessTableError::Unsupported));
    let mut waiter = waiter(&table);

    let (outcome, _) = with_timeout(waiter.discover_and_wait(
        "FO4Edit.exe",
        SystemTime::now(),
        Duration::from_secs(10),
    ))
    .await;

    assert_eq!(outcome, WaitOutcome::TimedOut(TimeoutKind::NeverAppeared));
    assert_eq!(table.snapshot_calls(), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn direct_child_exit_code_is_reported() -> anyhow::Result<()> {
    init_tracing();
    let waiter = waiter(&FakeProcessTable::empty());
    let mut child = tokio::process::Command::new("sh")
        .args(["-c", "exit 3"])
        .spawn()?;

    let outcome = with_timeout(waiter.wait_direct(&mut child, Duration::from_secs(10))).await?;
    assert_eq!(outcome, WaitOutcome::Exited(ProcessExit::Code(3)));
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn direct_child_over_budget_is_left_running() -> anyhow::Result<()> {
    init_tracing();
    let waiter = waiter(&FakeProcessTable::empty());
    let mut child = tokio::process::Command::new("sleep")
        .arg("5")
        .kill_on_drop(true)
        .spawn()?;

    let outcome = with_timeout(waiter.wait_direct(&mut child, Duration::from_millis(100))).await?;
    assert_eq!(outcome, WaitOutcome::TimedOut(TimeoutKind::NeverExited));
    assert!(child.try_wait()?.is_none(), "waiter must not kill the child");

    child.kill().await?;
    Ok(())
}
