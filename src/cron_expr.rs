//! Standard 5-field cron expression validation (spec.md §6): `*`, integer,
//! range `a-b`, list `a,b,c`, step `*/n` or `a-b/n`. No seconds field, no
//! macros. This is lexical/semantic validation only — firing is computed by
//! `scheduling::job` via the `cron` crate, which accepts a wider syntax than
//! we want to expose to callers.

use regex::Regex;
use std::sync::OnceLock;

use crate::error::{Error, Result};

const FIELD_NAMES: [&str; 5] = ["minute", "hour", "day-of-month", "month", "day-of-week"];

fn field_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\*|[0-9]+)(-[0-9]+)?(/[0-9]+)?(,(\*|[0-9]+)(-[0-9]+)?(/[0-9]+)?)*$").unwrap()
    })
}

/// Validate a 5-field cron expression, returning the split fields on
/// success.
pub fn validate(expr: &str) -> Result<[String; 5]> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(Error::InvalidInput(format!(
            "cron expression must have exactly 5 fields, got {}: '{expr}'",
            fields.len()
        )));
    }

    let re = field_regex();
    for (name, field) in FIELD_NAMES.iter().zip(fields.iter()) {
        if !re.is_match(field) {
            return Err(Error::InvalidInput(format!(
                "invalid {name} field '{field}' in cron expression '{expr}'"
            )));
        }
        for item in field.split(',') {
            validate_step_range(name, item)?;
        }
    }

    Ok([
        fields[0].to_string(),
        fields[1].to_string(),
        fields[2].to_string(),
        fields[3].to_string(),
        fields[4].to_string(),
    ])
}

fn validate_step_range(name: &str, item: &str) -> Result<()> {
    let (base, step) = match item.split_once('/') {
        Some((b, s)) => (b, Some(s)),
        None => (item, None),
    };

    if let Some(step) = step {
        if step.is_empty() || step.parse::<u32>().is_err() || step == "0" {
            return Err(Error::InvalidInput(format!(
                "invalid step '{step}' in {name} field"
            )));
        }
    }

    if base == "*" {
        return Ok(());
    }

    if let Some((lo, hi)) = base.split_once('-') {
        let lo: u32 = lo
            .parse()
            .map_err(|_| Error::InvalidInput(format!("invalid range start in {name} field")))?;
        let hi: u32 = hi
            .parse()
            .map_err(|_| Error::InvalidInput(format!("invalid range end in {name} field")))?;
        if lo > hi {
            return Err(Error::InvalidInput(format!(
                "range start exceeds end in {name} field: '{base}'"
            )));
        }
    } else {
        base.parse::<u32>()
            .map_err(|_| Error::InvalidInput(format!("invalid value in {name} field: '{base}'")))?;
    }

    Ok(())
}

/// Returns `Some(hour)` when the hour field is fully literal (a single
/// integer, not `*`, a range, a list, or a step) — the only case the
/// partial schedule-compatibility check in spec.md §4.2/§9 can reason about.
pub fn literal_hour(expr: &str) -> Option<u32> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    let hour = fields.get(1)?;
    hour.parse::<u32>().ok()
}

/// Backup-coupling semantic check (spec.md §4.2): identical schedules are
/// rejected; when both schedules are fully literal on the hour field, the
/// backup hour must be strictly greater than the cronjob hour. This check
/// is intentionally partial — spec.md §9 records it as unresolved whether
/// the source's hour-only comparison was a bug, and preserves it verbatim.
pub fn validate_backup_schedule_after_cronjob(cron_schedule: &str, backup_schedule: &str) -> Result<()> {
    if cron_schedule == backup_schedule {
        return Err(Error::PreconditionFailed(
            "backup schedule must differ from cronjob schedule".to_string(),
        ));
    }

    if let (Some(cron_hour), Some(backup_hour)) =
        (literal_hour(cron_schedule), literal_hour(backup_schedule))
    {
        if backup_hour <= cron_hour {
            return Err(Error::PreconditionFailed(format!(
                "backup schedule hour ({backup_hour}) must be strictly greater than cronjob schedule hour ({cron_hour})"
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_standard_forms() {
        assert!(validate("0 2 * * *").is_ok());
        assert!(validate("*/15 * * * *").is_ok());
        assert!(validate("0 0 1,15 * *").is_ok());
        assert!(validate("0 9-17 * * 1-5").is_ok());
        assert!(validate("0 0-23/2 * * *").is_ok());
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert!(validate("0 2 * *").is_err());
        assert!(validate("0 2 * * * *").is_err());
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(validate("0 2 * * 8-3").is_err());
        assert!(validate("a b c d e").is_err());
        assert!(validate("0 2 * * */0").is_err());
    }

    #[test]
    fn backup_must_differ_and_fire_after() {
        assert!(validate_backup_schedule_after_cronjob("0 2 * * *", "0 2 * * *").is_err());
        assert!(validate_backup_schedule_after_cronjob("0 2 * * *", "0 1 * * *").is_err());
        assert!(validate_backup_schedule_after_cronjob("0 2 * * *", "0 3 * * *").is_ok());
        // Non-literal hour fields bypass the (partial) semantic check.
        assert!(validate_backup_schedule_after_cronjob("0 */2 * * *", "0 1 * * *").is_ok());
    }
}
