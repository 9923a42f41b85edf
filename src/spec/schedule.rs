// src/spec/schedule.rs

//! Schedule expression parsing.
//!
//! Accepts:
//! - named cadences: `@hourly`, `@daily`, `@weekly`, `@monthly`, `@yearly`
//! - 5-field cron (`min hour dom month dow`), normalized by prepending a
//!   seconds field
//! - 6/7-field cron as understood by the `cron` crate

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

/// A validated schedule expression.
///
/// Keeps the original expression for display/artifacts and the parsed cron
/// schedule for tick computation. Equality is on the original expression.
#[derive(Debug, Clone)]
pub struct Schedule {
    expression: String,
    inner: cron::Schedule,
}

impl Schedule {
    /// Parse a schedule expression, returning a human-readable reason on
    /// failure (callers wrap it into a `ValidationError` with job context).
    pub fn parse(expression: &str) -> Result<Self, String> {
        let normalized = normalize(expression)?;
        let inner = cron::Schedule::from_str(&normalized)
            .map_err(|e| format!("invalid schedule expression '{expression}': {e}"))?;
        Ok(Self {
            expression: expression.to_string(),
            inner,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Ticks strictly after the given instant, in order.
    pub fn ticks_after(&self, after: DateTime<Utc>) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        self.inner.after(&after)
    }

    pub fn next_tick(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.ticks_after(after).next()
    }
}

impl PartialEq for Schedule {
    fn eq(&self, other: &Self) -> bool {
        self.expression == other.expression
    }
}

impl Eq for Schedule {}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

/// Map named cadences and 5-field cron onto the 6-field form the `cron`
/// crate parses (`sec min hour dom month dow`).
fn normalize(expression: &str) -> Result<String, String> {
    let expr = expression.trim();
    if expr.is_empty() {
        return Err("schedule expression must not be empty".to_string());
    }

    if let Some(cadence) = expr.strip_prefix('@') {
        return match cadence.to_lowercase().as_str() {
            "hourly" => Ok("0 0 * * * *".to_string()),
            "daily" | "midnight" => Ok("0 0 0 * * *".to_string()),
            "weekly" => Ok("0 0 0 * * SUN".to_string()),
            "monthly" => Ok("0 0 0 1 * *".to_string()),
            "yearly" | "annually" => Ok("0 0 0 1 1 *".to_string()),
            other => Err(format!("unknown named cadence '@{other}'")),
        };
    }

    match expr.split_whitespace().count() {
        5 => Ok(format!("0 {expr}")),
        6 | 7 => Ok(expr.to_string()),
        n => Err(format!(
            "cron expression must have 5, 6 or 7 fields (got {n})"
        )),
    }
}
