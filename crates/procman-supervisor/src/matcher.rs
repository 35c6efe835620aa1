//! Line matching for output searches.

use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::Deserialize;
use serde::Serialize;

use crate::error::ProcessError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Substring match.
    Exact,
    /// Unanchored regular expression.
    Regex,
    /// Shell-style wildcard against the whitespace-trimmed line.
    Glob,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Exact => "exact",
            SearchMode::Regex => "regex",
            SearchMode::Glob => "glob",
        }
    }
}

impl FromStr for SearchMode {
    type Err = ProcessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" | "string" => Ok(SearchMode::Exact),
            "regex" => Ok(SearchMode::Regex),
            "glob" | "wildcard" => Ok(SearchMode::Glob),
            _ => Err(ProcessError::Validation(format!(
                "Invalid search type: {}. Must be 'exact', 'regex', or 'glob'",
                s
            ))),
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated, compiled search request.
///
/// Compiling once lets a fan-out search reuse the same matcher for every
/// session.
#[derive(Debug, Clone)]
pub enum LineMatcher {
    Exact(String),
    Regex(Regex),
    Glob(glob::Pattern),
}

impl LineMatcher {
    pub fn new(mode: SearchMode, pattern: &str) -> Result<Self, ProcessError> {
        if pattern.is_empty() {
            return Err(ProcessError::Validation(
                "Search pattern cannot be empty".to_string(),
            ));
        }

        match mode {
            SearchMode::Exact => Ok(LineMatcher::Exact(pattern.to_string())),
            SearchMode::Regex => Regex::new(pattern)
                .map(LineMatcher::Regex)
                .map_err(|e| ProcessError::Search(e.to_string())),
            SearchMode::Glob => glob::Pattern::new(pattern)
                .map(LineMatcher::Glob)
                .map_err(|e| ProcessError::Search(e.to_string())),
        }
    }

    /// Parse `mode` and compile `pattern` in one step.
    pub fn parse(mode: &str, pattern: &str) -> Result<Self, ProcessError> {
        Self::new(mode.parse()?, pattern)
    }

    pub fn mode(&self) -> SearchMode {
        match self {
            LineMatcher::Exact(_) => SearchMode::Exact,
            LineMatcher::Regex(_) => SearchMode::Regex,
            LineMatcher::Glob(_) => SearchMode::Glob,
        }
    }

    pub fn is_match(&self, line: &str) -> bool {
        match self {
            LineMatcher::Exact(needle) => line.contains(needle.as_str()),
            LineMatcher::Regex(regex) => regex.is_match(line),
            LineMatcher::Glob(pattern) => pattern.matches(line.trim()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_aliases() {
        assert_eq!("exact".parse::<SearchMode>().unwrap(), SearchMode::Exact);
        assert_eq!("string".parse::<SearchMode>().unwrap(), SearchMode::Exact);
        assert_eq!("REGEX".parse::<SearchMode>().unwrap(), SearchMode::Regex);
        assert_eq!("wildcard".parse::<SearchMode>().unwrap(), SearchMode::Glob);
        assert_eq!(" glob ".parse::<SearchMode>().unwrap(), SearchMode::Glob);
    }

    #[test]
    fn test_unknown_mode_is_validation_error() {
        let err = "fuzzy".parse::<SearchMode>().unwrap_err();
        assert!(matches!(err, ProcessError::Validation(_)));
        assert!(err.to_string().contains("fuzzy"));
    }

    #[test]
    fn test_empty_pattern_is_validation_error() {
        for mode in [SearchMode::Exact, SearchMode::Regex, SearchMode::Glob] {
            let err = LineMatcher::new(mode, "").unwrap_err();
            assert!(matches!(err, ProcessError::Validation(_)), "{mode}");
        }
    }

    #[test]
    fn test_invalid_regex_is_search_error() {
        let err = LineMatcher::new(SearchMode::Regex, "([unclosed").unwrap_err();
        assert!(matches!(err, ProcessError::Search(_)));
    }

    #[test]
    fn test_invalid_glob_is_search_error() {
        let err = LineMatcher::new(SearchMode::Glob, "[").unwrap_err();
        assert!(matches!(err, ProcessError::Search(_)));
    }

    #[test]
    fn test_exact_is_substring() {
        let matcher = LineMatcher::new(SearchMode::Exact, "eta").unwrap();
        assert!(matcher.is_match("Beta"));
        assert!(!matcher.is_match("Alpha"));
    }

    #[test]
    fn test_regex_is_unanchored() {
        let matcher = LineMatcher::new(SearchMode::Regex, r"err\w+").unwrap();
        assert!(matcher.is_match("fatal error: disk full"));
        assert!(!matcher.is_match("all good"));
    }

    #[test]
    fn test_glob_matches_trimmed_line() {
        let matcher = LineMatcher::new(SearchMode::Glob, "*ta").unwrap();
        assert!(matcher.is_match("  Beta  "));
        assert!(matcher.is_match("Delta"));
        assert!(!matcher.is_match("Gamma"));

        let matcher = LineMatcher::new(SearchMode::Glob, "file?.[ch]").unwrap();
        assert!(matcher.is_match("file1.c"));
        assert!(matcher.is_match("fileX.h"));
        assert!(!matcher.is_match("file10.c"));
    }

    #[test]
    fn test_glob_star_crosses_slashes() {
        let matcher = LineMatcher::new(SearchMode::Glob, "*.rs").unwrap();
        assert!(matcher.is_match("src/lib.rs"));
    }

    #[test]
    fn test_parse_combines_mode_and_pattern() {
        let matcher = LineMatcher::parse("wildcard", "a*").unwrap();
        assert_eq!(matcher.mode(), SearchMode::Glob);
        assert!(LineMatcher::parse("nope", "a*").is_err());
    }
}
