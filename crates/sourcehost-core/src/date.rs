//! Date parsing for the `std.parse_date` import (spec.md §4.4).
//!
//! Plugins hand the host a scraped date string in one of three shapes:
//! a format string with the historical token set, a natural-language
//! relative phrase ("3 hours ago", "3小时前", "yesterday"), or nothing
//! parseable by either, in which case we fall back to native ISO/RFC
//! parsing via `chrono`.

use chrono::{DateTime, Datelike, Duration, FixedOffset, Local, NaiveDateTime, TimeZone, Timelike, Utc};
use regex::Regex;
use std::sync::OnceLock;

/// Resolve `timezone` into an offset. `"UTC"` forces offset zero, `"current"`
/// means the host's local offset; anything else is parsed as a fixed
/// `+HH:MM`/`-HHMM` offset string, defaulting to UTC if unparseable.
fn resolve_offset(timezone: &str) -> FixedOffset {
    match timezone {
        "UTC" => FixedOffset::east_opt(0).unwrap(),
        "current" => *Local::now().offset(),
        other => parse_offset_string(other).unwrap_or_else(|| FixedOffset::east_opt(0).unwrap()),
    }
}

fn parse_offset_string(s: &str) -> Option<FixedOffset> {
    DateTime::parse_from_str(&format!("2000-01-01T00:00:00{s}"), "%Y-%m-%dT%H:%M:%S%:z")
        .ok()
        .map(|dt| *dt.offset())
        .or_else(|| {
            let normalized = s.replace(':', "");
            let (sign, digits) = normalized.split_at(1);
            let sign = if sign == "-" { -1 } else { 1 };
            if digits.len() == 4 {
                let hours: i32 = digits[0..2].parse().ok()?;
                let minutes: i32 = digits[2..4].parse().ok()?;
                FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
            } else {
                None
            }
        })
}

/// Translate the historical token set (`yyyy`, `MM`, `dd`, `HH`, `mm`, `ss`,
/// `a` for am/pm, `Z`/`ZZZZZ` for timezone offsets) into a `chrono`
/// strftime-style format string.
fn translate_format_tokens(format: &str) -> String {
    let mut out = String::with_capacity(format.len());
    let mut chars = format.chars().peekable();
    while let Some(c) = chars.next() {
        let mut run = String::new();
        run.push(c);
        while chars.peek() == Some(&c) {
            run.push(chars.next().unwrap());
        }
        let translated = match (c, run.len()) {
            ('y', 4) => "%Y".to_string(),
            ('y', 2) => "%y".to_string(),
            ('y', _) => "%Y".to_string(),
            ('M', 4) => "%B".to_string(),
            ('M', 3) => "%b".to_string(),
            ('M', 2) => "%m".to_string(),
            ('M', 1) => "%-m".to_string(),
            ('d', 2) => "%d".to_string(),
            ('d', 1) => "%-d".to_string(),
            ('H', 2) => "%H".to_string(),
            ('H', 1) => "%-H".to_string(),
            ('h', _) => "%I".to_string(),
            ('m', 2) => "%M".to_string(),
            ('m', 1) => "%-M".to_string(),
            ('s', 2) => "%S".to_string(),
            ('s', 1) => "%-S".to_string(),
            ('a', _) => "%p".to_string(),
            ('Z', 5) => "%:z".to_string(),
            ('Z', _) => "%z".to_string(),
            _ => run.clone(),
        };
        out.push_str(&translated);
    }
    out
}

struct RelativePhrase {
    pattern: Regex,
    unit_seconds: i64,
}

fn relative_phrase_table() -> &'static [RelativePhrase] {
    static TABLE: OnceLock<Vec<RelativePhrase>> = OnceLock::new();
    TABLE.get_or_init(|| {
        vec![
            RelativePhrase { pattern: Regex::new(r"^(\d+)\s*(?:second|sec)s?\s*ago$").unwrap(), unit_seconds: 1 },
            RelativePhrase { pattern: Regex::new(r"^(\d+)\s*(?:minute|min)s?\s*ago$").unwrap(), unit_seconds: 60 },
            RelativePhrase { pattern: Regex::new(r"^(\d+)\s*(?:hour|hr)s?\s*ago$").unwrap(), unit_seconds: 3600 },
            RelativePhrase { pattern: Regex::new(r"^(\d+)\s*days?\s*ago$").unwrap(), unit_seconds: 86_400 },
            RelativePhrase { pattern: Regex::new(r"^(\d+)\s*weeks?\s*ago$").unwrap(), unit_seconds: 604_800 },
            RelativePhrase { pattern: Regex::new(r"^(\d+)\s*months?\s*ago$").unwrap(), unit_seconds: 2_592_000 },
            RelativePhrase { pattern: Regex::new(r"^(\d+)\s*years?\s*ago$").unwrap(), unit_seconds: 31_536_000 },
            RelativePhrase { pattern: Regex::new(r"^(\d+)\s*秒前$").unwrap(), unit_seconds: 1 },
            RelativePhrase { pattern: Regex::new(r"^(\d+)\s*分钟前$").unwrap(), unit_seconds: 60 },
            RelativePhrase { pattern: Regex::new(r"^(\d+)\s*分前$").unwrap(), unit_seconds: 60 },
            RelativePhrase { pattern: Regex::new(r"^(\d+)\s*분\s*전$").unwrap(), unit_seconds: 60 },
            RelativePhrase { pattern: Regex::new(r"^(\d+)\s*小时前$").unwrap(), unit_seconds: 3600 },
            RelativePhrase { pattern: Regex::new(r"^(\d+)\s*時間前$").unwrap(), unit_seconds: 3600 },
            RelativePhrase { pattern: Regex::new(r"^(\d+)\s*시간\s*전$").unwrap(), unit_seconds: 3600 },
            RelativePhrase { pattern: Regex::new(r"^(\d+)\s*天前$").unwrap(), unit_seconds: 86_400 },
            RelativePhrase { pattern: Regex::new(r"^(\d+)\s*日前$").unwrap(), unit_seconds: 86_400 },
            RelativePhrase { pattern: Regex::new(r"^(\d+)\s*일\s*전$").unwrap(), unit_seconds: 86_400 },
            RelativePhrase { pattern: Regex::new(r"^(\d+)\s*주\s*전$").unwrap(), unit_seconds: 604_800 },
            RelativePhrase { pattern: Regex::new(r"^(\d+)\s*周前$").unwrap(), unit_seconds: 604_800 },
            RelativePhrase { pattern: Regex::new(r"^(\d+)\s*週間前$").unwrap(), unit_seconds: 604_800 },
        ]
    })
}

/// Phrases that name a fixed point rather than a duration-before-now.
fn fixed_relative_seconds(trimmed: &str) -> Option<i64> {
    match trimmed {
        "just now" | "たった今" | "방금" | "刚刚" | "刚才" => Some(0),
        "yesterday" | "昨日" | "어제" | "昨天" => Some(86_400),
        "today" | "今日" | "오늘" | "今天" => Some(0),
        _ => None,
    }
}

/// Parse `value` using `format`/`locale`/`timezone`, returning seconds since
/// the Unix epoch (spec.md §4.4 `parse_date`).
///
/// Order of attempts: (1) natural-language relative phrases, in at least
/// English/Chinese/Japanese/Korean; (2) the supplied `format` with the
/// historical token set, if non-empty; (3) native ISO 8601 / RFC 2822
/// fallback.
pub fn parse_date(value: &str, format: &str, _locale: &str, timezone: &str, now: DateTime<Utc>) -> Option<i64> {
    let trimmed = value.trim();

    if let Some(offset_secs) = fixed_relative_seconds(&trimmed.to_lowercase()) {
        return Some((now - Duration::seconds(offset_secs)).timestamp());
    }
    let lower = trimmed.to_lowercase();
    for phrase in relative_phrase_table() {
        if let Some(caps) = phrase.pattern.captures(&lower).or_else(|| phrase.pattern.captures(trimmed)) {
            if let Some(n) = caps.get(1).and_then(|m| m.as_str().parse::<i64>().ok()) {
                return Some((now - Duration::seconds(n * phrase.unit_seconds)).timestamp());
            }
        }
    }

    if !format.is_empty() {
        let chrono_format = translate_format_tokens(format);
        let offset = resolve_offset(timezone);
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, &chrono_format) {
            return Some(offset.from_local_datetime(&naive).single()?.timestamp());
        }
        if let Ok(date) = chrono::NaiveDate::parse_from_str(trimmed, &chrono_format) {
            let naive = date.and_hms_opt(0, 0, 0)?;
            return Some(offset.from_local_datetime(&naive).single()?.timestamp());
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.timestamp());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.timestamp());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S") {
        let offset = resolve_offset(timezone);
        return Some(offset.from_local_datetime(&naive).single()?.timestamp());
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        let offset = resolve_offset(timezone);
        let naive = date.and_hms_opt(0, 0, 0)?;
        return Some(offset.from_local_datetime(&naive).single()?.timestamp());
    }

    None
}

pub fn current_date_seconds(now: DateTime<Utc>) -> f64 {
    now.timestamp() as f64 + now.timestamp_subsec_millis() as f64 / 1000.0
}

pub fn utc_offset_seconds() -> i64 {
    Local::now().offset().local_minus_utc() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn parses_english_relative_phrases() {
        let now = fixed_now();
        let ts = parse_date("3 hours ago", "", "en", "UTC", now).unwrap();
        assert_eq!(ts, (now - Duration::hours(3)).timestamp());
    }

    #[test]
    fn parses_cjk_relative_phrases() {
        let now = fixed_now();
        assert_eq!(parse_date("3小时前", "", "zh", "UTC", now).unwrap(), (now - Duration::hours(3)).timestamp());
        assert_eq!(parse_date("3時間前", "", "ja", "UTC", now).unwrap(), (now - Duration::hours(3)).timestamp());
        assert_eq!(parse_date("3시간 전", "", "ko", "UTC", now).unwrap(), (now - Duration::hours(3)).timestamp());
    }

    #[test]
    fn parses_yesterday_and_just_now() {
        let now = fixed_now();
        assert_eq!(parse_date("yesterday", "", "en", "UTC", now).unwrap(), (now - Duration::days(1)).timestamp());
        assert_eq!(parse_date("just now", "", "en", "UTC", now).unwrap(), now.timestamp());
    }

    #[test]
    fn parses_explicit_format_with_utc() {
        let now = fixed_now();
        let ts = parse_date("2024-03-15 08:30:00", "yyyy-MM-dd HH:mm:ss", "en", "UTC", now).unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 3, 15, 8, 30, 0).unwrap().timestamp();
        assert_eq!(ts, expected);
    }

    #[test]
    fn falls_back_to_iso8601() {
        let now = fixed_now();
        let ts = parse_date("2024-03-15T08:30:00Z", "", "en", "UTC", now).unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 3, 15, 8, 30, 0).unwrap().timestamp());
    }

    #[test]
    fn unparseable_input_returns_none() {
        let now = fixed_now();
        assert!(parse_date("not a date at all", "", "en", "UTC", now).is_none());
    }
}
