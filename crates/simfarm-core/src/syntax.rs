//! Syntax pre-check results.
//!
//! Compilers tend to repeat the same diagnostic (once per including unit,
//! once per pass), so reports are deduplicated before the error count is
//! used to accept or reject a job.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A single diagnostic produced by a pre-check
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyntaxError {
    pub file: Option<String>,
    pub line: Option<u32>,
    pub message: String,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>) -> Self {
        SyntaxError {
            file: None,
            line: None,
            message: message.into(),
        }
    }

    pub fn at(file: impl Into<String>, line: u32, message: impl Into<String>) -> Self {
        SyntaxError {
            file: Some(file.into()),
            line: Some(line),
            message: message.into(),
        }
    }
}

/// Outcome of a job's pre-check
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxReport {
    pub errors: Vec<SyntaxError>,
}

impl SyntaxReport {
    pub fn new(errors: Vec<SyntaxError>) -> Self {
        SyntaxReport {
            errors: dedup_errors(errors),
        }
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Remove repeated diagnostics, keeping the first occurrence of each.
pub fn dedup_errors(errors: Vec<SyntaxError>) -> Vec<SyntaxError> {
    let mut seen = HashSet::with_capacity(errors.len());
    errors
        .into_iter()
        .filter(|e| seen.insert(e.clone()))
        .collect()
}

/// Extract `path:line: error: message` (optionally `path:line:col: ...`)
/// diagnostics from compiler output. Warnings and other lines are ignored.
pub fn parse_compiler_output(output: &str) -> Vec<SyntaxError> {
    output.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<SyntaxError> {
    let (location, message) = line.split_once(": error:")?;
    let message = message.trim();

    let mut segments: Vec<&str> = location.trim().split(':').collect();
    // file:line:col; the column is not kept
    if segments.len() >= 3
        && segments[segments.len() - 1].parse::<u32>().is_ok()
        && segments[segments.len() - 2].parse::<u32>().is_ok()
    {
        segments.pop();
    }

    match segments.split_last() {
        Some((line_no, file)) if !file.is_empty() => match line_no.parse::<u32>() {
            Ok(n) => Some(SyntaxError::at(file.join(":"), n, message)),
            Err(_) => Some(SyntaxError::new(message)),
        },
        _ => Some(SyntaxError::new(message)),
    }
}
