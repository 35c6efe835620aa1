//! Byte-budgeted line buffer holding captured process output.

use std::collections::VecDeque;

use tracing::debug;
use tracing::warn;

use crate::matcher::LineMatcher;

/// Ordered lines, oldest first, whose total UTF-8 size never exceeds
/// `capacity_bytes`.
///
/// When full, the oldest lines are evicted to make room. A single line larger
/// than the whole budget is cut down to its trailing `capacity_bytes` bytes
/// (moved forward to the next character boundary if the cut would split a
/// character) and then occupies the buffer alone.
#[derive(Debug)]
pub struct OutputBuffer {
    capacity_bytes: usize,
    size_bytes: usize,
    lines: VecDeque<String>,
}

fn last_n<T>(items: impl DoubleEndedIterator<Item = T>, count: usize) -> Vec<T> {
    if count == 0 {
        return items.collect();
    }
    let mut tail: Vec<T> = items.rev().take(count).collect();
    tail.reverse();
    tail
}

fn tail_on_char_boundary(line: &str, max_bytes: usize) -> &str {
    let mut start = line.len() - max_bytes;
    while !line.is_char_boundary(start) {
        start += 1;
    }
    &line[start..]
}

impl OutputBuffer {
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            capacity_bytes,
            size_bytes: 0,
            lines: VecDeque::new(),
        }
    }

    pub fn capacity_bytes(&self) -> usize {
        self.capacity_bytes
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn append(&mut self, line: impl Into<String>) {
        let mut line = line.into();

        if line.len() > self.capacity_bytes {
            warn!(
                size = line.len(),
                capacity = self.capacity_bytes,
                "Line exceeds buffer capacity, keeping its tail"
            );
            line = tail_on_char_boundary(&line, self.capacity_bytes).to_string();
        }

        let mut evicted = 0usize;
        while self.size_bytes + line.len() > self.capacity_bytes {
            match self.lines.pop_front() {
                Some(old) => {
                    self.size_bytes -= old.len();
                    evicted += 1;
                }
                None => break,
            }
        }
        if evicted > 0 {
            debug!(evicted, "Evicted old lines to make space");
        }

        self.size_bytes += line.len();
        self.lines.push_back(line);
    }

    /// The last `max_lines` lines in append order; `0` returns everything.
    pub fn lines(&self, max_lines: usize) -> Vec<String> {
        last_n(self.lines.iter().cloned(), max_lines)
    }

    /// Matching lines in append order, keeping the last `max_lines`
    /// matches; `0` returns every match.
    pub fn search(&self, matcher: &LineMatcher, max_lines: usize) -> Vec<String> {
        let matches: Vec<String> = self
            .lines
            .iter()
            .filter(|line| matcher.is_match(line))
            .cloned()
            .collect();
        last_n(matches.into_iter(), max_lines)
    }

    pub fn clear(&mut self) {
        debug!(
            lines = self.lines.len(),
            bytes = self.size_bytes,
            "Clearing output buffer"
        );
        self.lines.clear();
        self.size_bytes = 0;
    }
}
