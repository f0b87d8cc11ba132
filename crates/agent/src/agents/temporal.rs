//! Deterministic resolution of temporal phrases (English and Russian).
//!
//! Rules, relative to "now" in the user's UTC offset:
//!
//! | Phrase | Resolves to |
//! |--------|-------------|
//! | tomorrow / завтра | next calendar day, 09:00 |
//! | today / сегодня (no time given) | today, 18:00 |
//! | in an hour / через час | now + 1h |
//! | bare weekday | nearest upcoming occurrence, 09:00 |
//!
//! An explicit `HH:MM` in the text replaces the default hour. Nothing here
//! fails: unparseable input yields `None` and a warning.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc, Weekday};
use tracing::warn;

const MORNING: (u32, u32) = (9, 0);
const EVENING: (u32, u32) = (18, 0);

const WEEKDAYS: &[(&str, Weekday)] = &[
    ("monday", Weekday::Mon),
    ("tuesday", Weekday::Tue),
    ("wednesday", Weekday::Wed),
    ("thursday", Weekday::Thu),
    ("friday", Weekday::Fri),
    ("saturday", Weekday::Sat),
    ("sunday", Weekday::Sun),
    ("понедельник", Weekday::Mon),
    ("вторник", Weekday::Tue),
    ("среда", Weekday::Wed),
    ("среду", Weekday::Wed),
    ("четверг", Weekday::Thu),
    ("пятница", Weekday::Fri),
    ("пятницу", Weekday::Fri),
    ("суббота", Weekday::Sat),
    ("субботу", Weekday::Sat),
    ("воскресенье", Weekday::Sun),
];

/// Parse a timestamp produced by extraction.
///
/// Accepts RFC 3339, naive `YYYY-MM-DD[T ]HH:MM[:SS]` (read in `offset`)
/// and a bare date (09:00 in `offset`).
pub fn parse_timestamp(raw: &str, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return local_to_utc(naive, offset);
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return local_to_utc(date.and_time(hm(MORNING)), offset);
    }

    warn!(value = %raw, "Unparseable timestamp, ignoring");
    None
}

/// Resolve the first temporal phrase found in `text`.
pub fn resolve_relative(text: &str, now: DateTime<FixedOffset>) -> Option<DateTime<Utc>> {
    let words = words(text);
    let has = |needles: &[&str]| words.iter().any(|w| needles.contains(&w.as_str()));
    let explicit = explicit_time(&words);

    if let Some(delta) = relative_duration(&words) {
        return now.checked_add_signed(delta).map(|at| at.with_timezone(&Utc));
    }

    let (days_ahead, default_time) = if has(&["послезавтра"]) || text.to_lowercase().contains("day after tomorrow") {
        (2, MORNING)
    } else if has(&["tomorrow", "завтра"]) {
        (1, MORNING)
    } else if has(&["today", "tonight", "сегодня"]) {
        (0, EVENING)
    } else if let Some(target) = words
        .iter()
        .find_map(|w| WEEKDAYS.iter().find(|(name, _)| *name == w.as_str()).map(|(_, day)| *day))
    {
        (days_until(now.weekday(), target), MORNING)
    } else {
        return None;
    };

    let date = now.date_naive() + Duration::days(days_ahead);
    let time = explicit.unwrap_or_else(|| hm(default_time));
    local_to_utc(date.and_time(time), *now.offset())
}

/// Extraction timestamp if usable, else the local rules applied to `text`.
pub fn resolve(extracted: Option<&str>, text: &str, now: DateTime<FixedOffset>) -> Option<DateTime<Utc>> {
    extracted
        .and_then(|raw| parse_timestamp(raw, *now.offset()))
        .or_else(|| resolve_relative(text, now))
}

/// Whether `text` mentions a time or date the rules understand.
pub fn mentions_time(text: &str, now: DateTime<FixedOffset>) -> bool {
    resolve_relative(text, now).is_some() || explicit_time(&words(text)).is_some()
}

fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric() && c != ':')
                .trim_end_matches(':')
                .to_string()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

fn relative_duration(words: &[String]) -> Option<Duration> {
    for (i, word) in words.iter().enumerate() {
        if word != "in" && word != "через" {
            continue;
        }
        let next = words.get(i + 1).map(String::as_str).unwrap_or_default();
        let unit = words.get(i + 2).map(String::as_str).unwrap_or_default();

        match next {
            "час" | "часик" => return Some(Duration::hours(1)),
            "полчаса" => return Some(Duration::minutes(30)),
            _ => {}
        }

        let count = match next {
            "an" | "a" | "one" => Some(1),
            n => n.parse::<i64>().ok(),
        };
        let Some(count) = count else { continue };

        let delta = if unit.starts_with("hour") || unit.starts_with("час") {
            Duration::try_hours(count)
        } else if unit.starts_with("min") || unit.starts_with("минут") {
            Duration::try_minutes(count)
        } else {
            continue;
        };
        if delta.is_none() {
            warn!(count, unit, "Relative time out of range, ignoring");
        }
        return delta;
    }
    None
}

fn explicit_time(words: &[String]) -> Option<NaiveTime> {
    words.iter().find_map(|w| {
        let (h, m) = w.split_once(':')?;
        if h.is_empty() || h.len() > 2 || m.len() != 2 {
            return None;
        }
        NaiveTime::from_hms_opt(h.parse().ok()?, m.parse().ok()?, 0)
    })
}

fn days_until(today: Weekday, target: Weekday) -> i64 {
    let diff = (i64::from(target.num_days_from_monday()) - i64::from(today.num_days_from_monday()) + 7) % 7;
    if diff == 0 { 7 } else { diff }
}

fn hm((h, m): (u32, u32)) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap_or_default()
}

fn local_to_utc(naive: NaiveDateTime, offset: FixedOffset) -> Option<DateTime<Utc>> {
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn moscow() -> FixedOffset {
        FixedOffset::east_opt(3 * 3600).unwrap()
    }

    /// Saturday 2026-10-17 10:00 +03:00
    fn now() -> DateTime<FixedOffset> {
        moscow().with_ymd_and_hms(2026, 10, 17, 10, 0, 0).unwrap()
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn reference_day_is_saturday() {
        assert_eq!(now().weekday(), Weekday::Sat);
    }

    #[test]
    fn tomorrow_is_next_day_at_nine() {
        assert_eq!(resolve_relative("remind me tomorrow", now()), Some(utc(2026, 10, 18, 6, 0)));
        assert_eq!(resolve_relative("Завтра купить молоко", now()), Some(utc(2026, 10, 18, 6, 0)));
    }

    #[test]
    fn today_without_time_is_six_pm() {
        assert_eq!(resolve_relative("позвонить маме сегодня", now()), Some(utc(2026, 10, 17, 15, 0)));
    }

    #[test]
    fn in_an_hour_is_now_plus_one_hour() {
        assert_eq!(resolve_relative("in an hour", now()), Some(utc(2026, 10, 17, 8, 0)));
        assert_eq!(resolve_relative("через час выключить духовку", now()), Some(utc(2026, 10, 17, 8, 0)));
        assert_eq!(resolve_relative("через 2 часа", now()), Some(utc(2026, 10, 17, 9, 0)));
        assert_eq!(resolve_relative("in 15 minutes", now()), Some(utc(2026, 10, 17, 7, 15)));
    }

    #[test]
    fn weekday_is_next_occurrence_at_nine() {
        assert_eq!(resolve_relative("в понедельник", now()), Some(utc(2026, 10, 19, 6, 0)));
        assert_eq!(resolve_relative("on Friday", now()), Some(utc(2026, 10, 23, 6, 0)));
        // same weekday means a week ahead
        assert_eq!(resolve_relative("в субботу", now()), Some(utc(2026, 10, 24, 6, 0)));
    }

    #[test]
    fn explicit_time_overrides_default_hour() {
        assert_eq!(resolve_relative("завтра в 15:30", now()), Some(utc(2026, 10, 18, 12, 30)));
        assert_eq!(resolve_relative("послезавтра", now()), Some(utc(2026, 10, 19, 6, 0)));
    }

    #[test]
    fn no_phrase_is_none() {
        assert_eq!(resolve_relative("купил хлеб за 45 рублей", now()), None);
        assert!(!mentions_time("купил хлеб", now()));
        assert!(mentions_time("в 19:00 созвон", now()));
    }

    #[test]
    fn huge_relative_amounts_resolve_to_nothing() {
        assert_eq!(resolve_relative("remind me in 99999999999999 hours", now()), None);
        assert_eq!(resolve_relative("через 9223372036854775807 минут", now()), None);
        // in range for Duration, but past the last representable date
        assert_eq!(resolve_relative("in 20000000000 hours", now()), None);
        assert!(!mentions_time("remind me in 99999999999999 hours", now()));
    }

    #[test]
    fn timestamps_parse_without_failing() {
        assert_eq!(parse_timestamp("2026-10-18T09:00:00+03:00", moscow()), Some(utc(2026, 10, 18, 6, 0)));
        assert_eq!(parse_timestamp("2026-10-18T09:00", moscow()), Some(utc(2026, 10, 18, 6, 0)));
        assert_eq!(parse_timestamp("2026-10-18", moscow()), Some(utc(2026, 10, 18, 6, 0)));
        assert_eq!(parse_timestamp("next tuesday-ish", moscow()), None);
        assert_eq!(parse_timestamp("", moscow()), None);
    }

    #[test]
    fn extraction_timestamp_wins_over_text() {
        let resolved = resolve(Some("2026-12-31T20:00:00Z"), "завтра", now());
        assert_eq!(resolved, Some(utc(2026, 12, 31, 20, 0)));
        let fallback = resolve(Some("garbage"), "завтра", now());
        assert_eq!(fallback, Some(utc(2026, 10, 18, 6, 0)));
    }
}
