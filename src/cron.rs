//! Cron evaluation utilities.
//!
//! This module computes the next trigger instant for a cron expression
//! evaluated in an IANA timezone. Expressions are standard 5-field Unix
//! cron (minute, hour, day-of-month, month, day-of-week); they are
//! normalized to the 6-field format (with seconds) required by the `cron`
//! crate. Evaluation happens in the target zone's wall-clock time and the
//! result is converted back to UTC for storage.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;

use crate::error::SchedulerError;

/// Convert a 5-field Unix cron expression to 6-field format.
///
/// The `cron` crate requires 6 fields (sec min hour dom month dow). This
/// prepends "0 " so 5-field expressions fire at second 0 of each match;
/// 6-field input passes through unchanged.
fn normalize_cron_expr(cron_expr: &str) -> String {
    let fields: Vec<&str> = cron_expr.split_whitespace().collect();
    if fields.len() == 5 {
        format!("0 {}", cron_expr)
    } else {
        cron_expr.to_string()
    }
}

/// Parse a cron expression, rejecting malformed syntax eagerly.
pub fn parse_cron(cron_expr: &str) -> Result<Schedule, SchedulerError> {
    let normalized = normalize_cron_expr(cron_expr);
    Schedule::from_str(&normalized).map_err(|err| SchedulerError::InvalidCronExpression {
        expression: cron_expr.to_string(),
        detail: err.to_string(),
    })
}

/// Resolve an IANA zone name, rejecting unknown zones eagerly.
pub fn parse_timezone(timezone: &str) -> Result<Tz, SchedulerError> {
    timezone
        .parse::<Tz>()
        .map_err(|_| SchedulerError::InvalidTimezone {
            timezone: timezone.to_string(),
        })
}

/// Validate a cron expression and timezone pair without computing anything.
///
/// Used by the Schedule Manager to fail fast before any write.
pub fn validate_schedule_expression(cron_expr: &str, timezone: &str) -> Result<(), SchedulerError> {
    parse_cron(cron_expr)?;
    parse_timezone(timezone)?;
    Ok(())
}

/// Compute the next trigger instant strictly after `now`.
///
/// The result is deterministic for a given `(cron_expr, timezone, now)`
/// triple and is never equal to `now`, even when `now` falls exactly on a
/// trigger point. Cron fields are matched against local wall-clock time in
/// the given zone, so a daily 09:00 schedule tracks local time across DST
/// transitions.
pub fn compute_next_cron_time(
    cron_expr: &str,
    timezone: &str,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, SchedulerError> {
    let schedule = parse_cron(cron_expr)?;
    let tz = parse_timezone(timezone)?;

    let now_local = now.with_timezone(&tz);
    schedule
        .after(&now_local)
        .next()
        .map(|next| next.with_timezone(&Utc))
        .ok_or_else(|| SchedulerError::InvalidCronExpression {
            expression: cron_expr.to_string(),
            detail: "no future occurrence".to_string(),
        })
}
