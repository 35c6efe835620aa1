//! Output search tests against a real process.

#![cfg(unix)]

mod common;

use common::{cmd, supervisor, wait_until_finished, TIMEOUT};
use procman_supervisor::reply;
use procman_supervisor::ProcessError;
use procman_supervisor::ProcessSupervisor;

fn greek_letters() -> (ProcessSupervisor, u32) {
    let supervisor = supervisor();
    let pid = supervisor
        .start_process(cmd(&["echo", "Alpha\nBeta\nGamma\nDelta"]), TIMEOUT)
        .unwrap();
    assert!(wait_until_finished(&supervisor, pid));
    (supervisor, pid)
}

#[test]
fn test_exact_search() {
    let (supervisor, pid) = greek_letters();
    assert_eq!(
        supervisor.search_output(pid, "exact", "eta", 0).unwrap(),
        vec!["Beta"]
    );
    assert_eq!(
        supervisor.search_output(pid, "string", "a", 0).unwrap(),
        vec!["Alpha", "Beta", "Gamma", "Delta"]
    );
}

#[test]
fn test_regex_search() {
    let (supervisor, pid) = greek_letters();
    assert_eq!(
        supervisor
            .search_output(pid, "regex", "^(Beta|Delta)$", 0)
            .unwrap(),
        vec!["Beta", "Delta"]
    );
    assert_eq!(
        supervisor.search_output(pid, "regex", "mm", 0).unwrap(),
        vec!["Gamma"]
    );
}

#[test]
fn test_glob_search() {
    let (supervisor, pid) = greek_letters();
    assert_eq!(
        supervisor.search_output(pid, "glob", "*ta", 0).unwrap(),
        vec!["Beta", "Delta"]
    );
    assert_eq!(
        supervisor.search_output(pid, "wildcard", "?amma", 0).unwrap(),
        vec!["Gamma"]
    );
    assert!(supervisor
        .search_output(pid, "glob", "eta", 0)
        .unwrap()
        .is_empty());
}

#[test]
fn test_search_limit_keeps_latest_matches() {
    let (supervisor, pid) = greek_letters();
    assert_eq!(
        supervisor.search_output(pid, "exact", "a", 2).unwrap(),
        vec!["Gamma", "Delta"]
    );
}

#[test]
fn test_search_errors() {
    let (supervisor, pid) = greek_letters();
    assert!(matches!(
        supervisor.search_output(pid, "soundex", "x", 0),
        Err(ProcessError::Validation(_))
    ));
    assert!(matches!(
        supervisor.search_output(pid, "regex", "(", 0),
        Err(ProcessError::Search(_))
    ));

    let lines = reply::lines_reply(supervisor.search_output(pid, "exact", "", 0));
    assert_eq!(lines, vec!["ERROR: Search pattern cannot be empty"]);
}
