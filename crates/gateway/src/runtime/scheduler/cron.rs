//! Timezone-aware cron evaluator. Five fields: minute, hour, day of
//! month, month, day of week (0 = Sunday).

use chrono::{DateTime, Datelike, Timelike, Utc};

/// Parse a timezone name, falling back to UTC on anything unknown.
pub fn parse_tz(tz: &str) -> chrono_tz::Tz {
    tz.parse::<chrono_tz::Tz>().unwrap_or(chrono_tz::UTC)
}

/// Does one cron field accept a value? Supports `*`, `*/N`, lists, and
/// ranges.
fn field_accepts(field: &str, value: u32) -> bool {
    if field == "*" {
        return true;
    }
    if let Some(step) = field.strip_prefix("*/") {
        if let Ok(n) = step.parse::<u32>() {
            return n > 0 && value % n == 0;
        }
    }
    for part in field.split(',') {
        if let Some((lo, hi)) = part.split_once('-') {
            if let (Ok(lo), Ok(hi)) = (lo.parse::<u32>(), hi.parse::<u32>()) {
                if value >= lo && value <= hi {
                    return true;
                }
            }
        } else if part.parse::<u32>() == Ok(value) {
            return true;
        }
    }
    false
}

/// Does a local naive datetime match a 5-field expression?
fn matches_naive(cron: &str, dt: &chrono::NaiveDateTime) -> bool {
    let fields: Vec<&str> = cron.split_whitespace().collect();
    if fields.len() != 5 {
        return false;
    }
    field_accepts(fields[0], dt.minute())
        && field_accepts(fields[1], dt.hour())
        && field_accepts(fields[2], dt.day())
        && field_accepts(fields[3], dt.month())
        && field_accepts(fields[4], dt.weekday().num_days_from_sunday())
}

/// Is a cron expression well-formed enough to evaluate?
pub fn is_valid(cron: &str) -> bool {
    cron.split_whitespace().count() == 5
}

/// Next occurrence strictly after `after`, evaluated in `tz`, returned in
/// UTC. Local times inside a DST gap are skipped; ambiguous (fall-back)
/// times resolve to the earlier mapping.
pub fn next_occurrence(
    cron: &str,
    after: &DateTime<Utc>,
    tz: chrono_tz::Tz,
) -> Option<DateTime<Utc>> {
    use chrono::TimeZone;

    if !is_valid(cron) {
        return None;
    }

    let local = after.with_timezone(&tz).naive_local();
    let to_next_minute = 60 - local.second() as i64;
    let mut candidate = local + chrono::Duration::seconds(to_next_minute);
    candidate = candidate.with_second(0).unwrap_or(candidate);

    // Scan at minute granularity, bounded to one year.
    for _ in 0..(366 * 24 * 60) {
        if matches_naive(cron, &candidate) {
            match tz.from_local_datetime(&candidate) {
                chrono::LocalResult::Single(dt) => return Some(dt.with_timezone(&Utc)),
                chrono::LocalResult::Ambiguous(earliest, _) => {
                    return Some(earliest.with_timezone(&Utc))
                }
                chrono::LocalResult::None => {} // DST gap
            }
        }
        candidate += chrono::Duration::minutes(1);
    }
    None
}
