use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value;

pub(crate) const DEFAULT_COUNTRY_CODE: &str = "1";

const PHONE_NOISE: [char; 5] = ['-', '.', '(', ')', ' '];

/// Strips punctuation and prefixes `+<country_code>` unless the number already carries one.
pub fn format_phone(raw: &str, country_code: &str) -> String {
    let cleaned: String = raw.trim().chars().filter(|c| !PHONE_NOISE.contains(c)).collect();
    if cleaned.is_empty() || cleaned.starts_with('+') {
        return cleaned;
    }
    let code = country_code.trim().trim_start_matches('+');
    format!("+{code}{cleaned}")
}

/// Resolves a dotted path (`applications.0.jobs.0.id`) against a native record.
pub(crate) fn lookup<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    if let Some(direct) = record.as_object().and_then(|object| object.get(path)) {
        return Some(direct);
    }

    path.split('.').try_fold(record, |current, segment| match current {
        Value::Object(object) => object.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|idx| items.get(idx)),
        _ => None,
    })
}

/// Marker for arrays/objects offered to a canonical string field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NotScalar;

/// Scalar rendering used for canonical string fields; blank strings count as absent.
pub(crate) fn scalar_text(value: &Value) -> Result<Option<String>, NotScalar> {
    match value {
        Value::Null => Ok(None),
        Value::String(text) => {
            let trimmed = text.trim();
            Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
        }
        Value::Number(number) => Ok(Some(number.to_string())),
        Value::Bool(flag) => Ok(Some(flag.to_string())),
        Value::Array(_) | Value::Object(_) => Err(NotScalar),
    }
}

/// Accepts RFC 3339, bare dates, and epoch timestamps (seconds or milliseconds).
pub(crate) fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }

    if let Ok(epoch) = trimmed.parse::<i64>() {
        // Values past year 2286 in seconds are treated as milliseconds.
        return if epoch.abs() >= 10_000_000_000 {
            Utc.timestamp_millis_opt(epoch).single()
        } else {
            Utc.timestamp_opt(epoch, 0).single()
        };
    }

    None
}

pub(crate) fn normalize_status_key(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn format_phone_strips_noise_and_prefixes_country_code() {
        assert_eq!(format_phone("555-0123", "1"), "+15550123");
        assert_eq!(format_phone("+15550123", "1"), "+15550123");
        assert_eq!(format_phone("(555) 010.0199", "+44"), "+445550100199");
        assert_eq!(format_phone(" ", "1"), "");
    }

    #[test]
    fn lookup_walks_objects_and_arrays() {
        let record = json!({
            "email_addresses": [{ "value": "ada@example.com" }],
            "First Name": "Ada",
            "meta": { "score": 4 }
        });
        assert_eq!(
            lookup(&record, "email_addresses.0.value"),
            Some(&json!("ada@example.com"))
        );
        assert_eq!(lookup(&record, "First Name"), Some(&json!("Ada")));
        assert_eq!(lookup(&record, "meta.score"), Some(&json!(4)));
        assert!(lookup(&record, "email_addresses.3.value").is_none());
    }

    #[test]
    fn parse_timestamp_supports_rfc3339_dates_and_epochs() {
        let expected = NaiveDate::from_ymd_opt(2025, 9, 24)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
            .and_utc();
        assert_eq!(parse_timestamp("2025-09-24T10:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("1758708000000"), Some(expected));
        assert_eq!(parse_timestamp("1758708000"), Some(expected));
        assert_eq!(
            parse_timestamp("2025-09-30"),
            NaiveDate::from_ymd_opt(2025, 9, 30)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .map(|dt| dt.and_utc())
        );
        assert!(parse_timestamp("  ").is_none());
        assert!(parse_timestamp("not-a-date").is_none());
    }
}
