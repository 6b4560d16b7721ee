//! Restart-loop behavior of the supervisor: two log lines per cycle, the
//! fixed delay between launches, unbounded restarts and log append-only
//! semantics.

use artovix_bot::supervisor::Supervisor;
use std::path::Path;
use std::time::{Duration, Instant};

const TICK: Duration = Duration::from_millis(50);

fn log_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(ToString::to_string)
        .collect()
}

fn shell_supervisor(script: &str, log: &Path, delay: Duration) -> Supervisor {
    Supervisor::with_delay(
        "/bin/sh",
        vec!["-c".to_string(), script.to_string()],
        log,
        delay,
    )
    .expect("supervisor construction")
}

#[test]
fn one_cycle_produces_exactly_two_lines_for_any_exit_code() {
    for code in [0, 1, 7, 42] {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = dir.path().join("restart.log");

        let mut sup = shell_supervisor(&format!("exit {code}"), &log, TICK);
        sup.run_cycle().expect("cycle");

        let lines = log_lines(&log);
        assert_eq!(lines.len(), 2, "exit code {code}: {lines:?}");
        assert!(lines[0].contains("starting"), "{}", lines[0]);
        assert!(
            lines[1].contains(&format!("exited with code {code}, restarting")),
            "{}",
            lines[1]
        );
    }
}

#[test]
fn clean_exit_is_restarted_like_a_crash() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = dir.path().join("restart.log");
    let launches = dir.path().join("launches");

    let mut sup = shell_supervisor(
        &format!("echo x >> {}; exit 0", launches.display()),
        &log,
        TICK,
    );
    sup.run_cycles(3).expect("cycles");

    let count = std::fs::read_to_string(&launches)
        .expect("launch marker file")
        .lines()
        .count();
    assert_eq!(count, 3);
}

#[test]
fn waits_at_least_the_fixed_delay_between_launches() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = dir.path().join("restart.log");
    let delay = Duration::from_millis(300);

    let mut sup = shell_supervisor("exit 1", &log, delay);
    let started = Instant::now();
    sup.run_cycles(2).expect("cycles");

    // Two cycles sleep twice; the child itself is near-instant.
    assert!(started.elapsed() >= delay * 2, "elapsed {:?}", started.elapsed());
}

#[test]
fn restarts_are_unbounded_across_consecutive_crashes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = dir.path().join("restart.log");
    let launches = dir.path().join("launches");

    let cycles = 8;
    let mut sup = shell_supervisor(
        &format!("echo x >> {}; exit 1", launches.display()),
        &log,
        TICK,
    );
    sup.run_cycles(cycles).expect("cycles");

    let count = std::fs::read_to_string(&launches)
        .expect("launch marker file")
        .lines()
        .count();
    assert_eq!(count, cycles);

    let lines = log_lines(&log);
    assert_eq!(lines.len(), cycles * 2);
}

#[test]
fn log_is_append_only_with_a_stable_prefix() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = dir.path().join("restart.log");

    let mut sup = shell_supervisor("exit 1", &log, TICK);
    sup.run_cycles(2).expect("cycles");
    let before = log_lines(&log);
    assert_eq!(before.len(), 4);

    // A fresh supervisor on the same log must extend it, not rewrite it.
    let mut sup = shell_supervisor("exit 1", &log, TICK);
    sup.run_cycle().expect("cycle");

    let after = log_lines(&log);
    assert_eq!(after.len(), 6);
    assert_eq!(&after[..4], &before[..]);
}

#[test]
fn crash_loop_then_clean_exit_scenario() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = dir.path().join("restart.log");
    let counter = dir.path().join("count");

    // Exits 1 on the first three runs, 0 afterwards.
    let script = format!(
        "n=$(cat {c} 2>/dev/null || echo 0); n=$((n+1)); echo $n > {c}; \
         if [ $n -le 3 ]; then exit 1; else exit 0; fi",
        c = counter.display()
    );

    let mut sup = shell_supervisor(&script, &log, TICK);
    sup.run_cycles(4).expect("cycles");

    let lines = log_lines(&log);
    // Match on the event prefix after the timestamp; plain "starting"
    // would also hit the "restarting in N seconds" tail of exit lines.
    let starting: Vec<_> = lines.iter().filter(|l| l.contains("] starting")).collect();
    let exited: Vec<_> = lines.iter().filter(|l| l.contains("] exited")).collect();

    assert_eq!(starting.len(), 4);
    assert_eq!(exited.len(), 4);
    for line in &exited[..3] {
        assert!(line.contains("exited with code 1"), "{line}");
    }
    assert!(exited[3].contains("exited with code 0"), "{}", exited[3]);
}

#[test]
fn unlaunchable_child_is_logged_and_retried() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = dir.path().join("restart.log");

    let mut sup = Supervisor::with_delay(
        dir.path().join("no-such-binary"),
        vec![],
        &log,
        TICK,
    )
    .expect("supervisor construction");
    sup.run_cycles(2).expect("cycles");

    let lines = log_lines(&log);
    assert_eq!(lines.len(), 4);
    assert!(lines[1].contains("failed to start"), "{}", lines[1]);
    assert!(lines[3].contains("failed to start"), "{}", lines[3]);
}
