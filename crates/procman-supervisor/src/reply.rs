//! String renderings of operation results for tool transports.
//!
//! Transports report outcomes as plain strings rather than structured
//! errors: `"success"` / `"failed: ..."` for commands, an `"ERROR: ..."` line
//! in place of output lines, and a sentinel pid for fan-out failures.

use crate::supervisor::SearchAllReport;
use crate::Result;

/// Pid used in `search_all_reply` for the entry carrying errors.
pub const SENTINEL_PID: i64 = -1;

pub fn status_reply<T>(result: &Result<T>) -> String {
    match result {
        Ok(_) => "success".to_string(),
        Err(e) => format!("failed: {}", e),
    }
}

pub fn lines_reply(result: Result<Vec<String>>) -> Vec<String> {
    match result {
        Ok(lines) => lines,
        Err(e) => vec![format!("ERROR: {}", e)],
    }
}

pub fn search_all_reply(result: Result<SearchAllReport>) -> Vec<(i64, Vec<String>)> {
    let report = match result {
        Ok(report) => report,
        Err(e) => return vec![(SENTINEL_PID, vec![format!("ERROR: {}", e)])],
    };

    let failure = report.failure();
    let mut reply: Vec<(i64, Vec<String>)> = report
        .matches
        .into_iter()
        .map(|(pid, lines)| (i64::from(pid), lines))
        .collect();
    if let Some(e) = failure {
        reply.push((SENTINEL_PID, vec![format!("ERROR: {}", e)]));
    }
    reply
}
