//! Fleet-wide operation tests
//!
//! Listing, kill-all, remove-all, search-all and shutdown over several live
//! processes.

#![cfg(unix)]

mod common;

use common::{cmd, pid_alive, supervisor, wait_until_finished, TIMEOUT};
use procman_supervisor::reply;
use procman_supervisor::SessionState;

#[test]
fn test_kill_all_terminates_every_process() {
    let supervisor = supervisor();
    let pids: Vec<u32> = (0..4)
        .map(|_| {
            supervisor
                .start_process(cmd(&["sleep", "10"]), TIMEOUT)
                .unwrap()
        })
        .collect();

    supervisor.kill_all(TIMEOUT).unwrap();

    for pid in pids {
        assert_eq!(
            supervisor.status_of(pid).unwrap().state,
            SessionState::Completed
        );
        assert!(!pid_alive(pid), "pid {pid} survived kill_all");
    }
}

#[test]
fn test_kill_all_skips_finished_processes() {
    let supervisor = supervisor();
    let done = supervisor.start_process(cmd(&["true"]), TIMEOUT).unwrap();
    assert!(wait_until_finished(&supervisor, done));
    let running = supervisor
        .start_process(cmd(&["sleep", "10"]), TIMEOUT)
        .unwrap();

    assert!(supervisor.kill_all(TIMEOUT).is_ok());
    assert!(!pid_alive(running));
}

#[test]
fn test_list_is_sorted_by_pid() {
    let supervisor = supervisor();
    let mut pids: Vec<u32> = (0..3)
        .map(|_| {
            supervisor
                .start_process(cmd(&["sleep", "10"]), TIMEOUT)
                .unwrap()
        })
        .collect();
    pids.sort_unstable();

    let listed = supervisor.list();
    assert_eq!(listed.iter().map(|e| e.pid).collect::<Vec<_>>(), pids);
    assert!(listed.iter().all(|e| e.state.is_running()));
    assert!(listed.iter().all(|e| e.command == cmd(&["sleep", "10"])));

    supervisor.shutdown(TIMEOUT).unwrap();
}

#[test]
fn test_list_rechecks_liveness() {
    let supervisor = supervisor();
    let pid = supervisor
        .start_process(cmd(&["echo", "bye"]), TIMEOUT)
        .unwrap();

    assert!(common::wait_for(|| {
        supervisor
            .list()
            .iter()
            .any(|e| e.pid == pid && e.state == SessionState::Completed)
    }));
}

#[test]
fn test_remove_all_keeps_running_processes() {
    let supervisor = supervisor();
    let running = supervisor
        .start_process(cmd(&["sleep", "10"]), TIMEOUT)
        .unwrap();
    let finished = supervisor
        .start_process(cmd(&["echo", "finished"]), TIMEOUT)
        .unwrap();
    assert!(wait_until_finished(&supervisor, finished));

    supervisor.remove_all().unwrap();

    assert_eq!(supervisor.len(), 1);
    assert!(supervisor.status_of(running).is_ok());
    assert!(supervisor.status_of(finished).is_err());

    supervisor.kill(running, TIMEOUT).unwrap();
    supervisor.remove_all().unwrap();
    assert!(supervisor.is_empty());
}

#[test]
fn test_search_all_only_reports_matching_processes() {
    let supervisor = supervisor();
    let apple = supervisor
        .start_process(cmd(&["echo", "apple pie"]), TIMEOUT)
        .unwrap();
    let banana = supervisor
        .start_process(cmd(&["echo", "banana split"]), TIMEOUT)
        .unwrap();
    assert!(wait_until_finished(&supervisor, apple));
    assert!(wait_until_finished(&supervisor, banana));

    let report = supervisor.search_all("exact", "apple", 0).unwrap();
    assert_eq!(report.matches, vec![(apple, vec!["apple pie".to_string()])]);
    assert!(report.failures.is_empty());

    let reply = reply::search_all_reply(supervisor.search_all("glob", "*i*", 0));
    let mut pids: Vec<i64> = reply.iter().map(|(pid, _)| *pid).collect();
    pids.sort_unstable();
    let mut expected = vec![i64::from(apple), i64::from(banana)];
    expected.sort_unstable();
    assert_eq!(pids, expected);
}

#[test]
fn test_search_all_invalid_pattern_reply() {
    let supervisor = supervisor();
    let reply = reply::search_all_reply(supervisor.search_all("regex", "([", 0));
    assert_eq!(reply.len(), 1);
    assert_eq!(reply[0].0, reply::SENTINEL_PID);
    assert!(reply[0].1[0].starts_with("ERROR: Invalid search pattern"));
}

#[test]
fn test_shutdown_releases_everything() {
    let supervisor = supervisor();
    let sleeper = supervisor
        .start_process(cmd(&["sleep", "10"]), TIMEOUT)
        .unwrap();
    let echo = supervisor
        .start_process(cmd(&["echo", "hi"]), TIMEOUT)
        .unwrap();

    supervisor.shutdown(TIMEOUT).unwrap();

    assert!(supervisor.is_empty());
    assert!(!pid_alive(sleeper));
    assert!(!pid_alive(echo));
}
